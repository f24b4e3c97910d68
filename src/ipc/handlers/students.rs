use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::record::Student;
use crate::store::StoreError;
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn store_err(e: StoreError) -> HandlerErr {
    let message = e.to_string();
    match e {
        StoreError::DuplicateCode(code) => HandlerErr {
            code: "duplicate_code",
            message,
            details: Some(json!({ "code": code })),
        },
        StoreError::NotFound(code) => HandlerErr {
            code: "not_found",
            message,
            details: Some(json!({ "code": code })),
        },
    }
}

/// The stored fields plus every derived value, so the GUI renders a row
/// without re-deriving anything.
fn student_json(s: &Student) -> serde_json::Value {
    json!({
        "code": s.code,
        "name": s.name,
        "c1": s.c1,
        "c2": s.c2,
        "c3": s.c3,
        "exam": s.exam,
        "coursework": s.coursework(),
        "total": s.total(),
        "percentage": s.percentage(),
        "grade": s.grade(),
    })
}

/// Range checks for the add workflow. These live at the IPC boundary, not
/// in the store: the store enforces code uniqueness and nothing else.
fn parse_new_student(params: &serde_json::Value) -> Result<Student, HandlerErr> {
    fn bad(message: &str, details: Option<serde_json::Value>) -> HandlerErr {
        HandlerErr {
            code: "bad_params",
            message: message.to_string(),
            details,
        }
    }

    let Some(code) = params.get("code").and_then(|v| v.as_i64()) else {
        return Err(bad("missing or non-integer code", None));
    };
    let name = params
        .get("name")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .unwrap_or("")
        .to_string();
    if name.is_empty() {
        return Err(bad("name must not be empty", None));
    }
    // The roster line format has no quoting, so a comma here would split
    // the row into seven fields on the next load.
    if name.contains(',') {
        return Err(bad(
            "name must not contain commas",
            Some(json!({ "name": name })),
        ));
    }

    let mut marks = [0i64; 4];
    for (slot, field) in marks.iter_mut().zip(["c1", "c2", "c3", "exam"]) {
        let Some(v) = params.get(field).and_then(|v| v.as_i64()) else {
            return Err(bad(
                "missing or non-integer mark",
                Some(json!({ "field": field })),
            ));
        };
        *slot = v;
    }
    let [c1, c2, c3, exam] = marks;

    for (field, v) in [("c1", c1), ("c2", c2), ("c3", c3)] {
        if !(0..=20).contains(&v) {
            return Err(bad(
                "coursework marks must be 0-20",
                Some(json!({ "field": field, "value": v })),
            ));
        }
    }
    if !(0..=100).contains(&exam) {
        return Err(bad(
            "exam mark must be 0-100",
            Some(json!({ "value": exam })),
        ));
    }

    Ok(Student {
        code,
        name,
        c1,
        c2,
        c3,
        exam,
    })
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    let rows: Vec<serde_json::Value> = roster.students().iter().map(student_json).collect();
    ok(
        &req.id,
        json!({ "students": rows, "studentCount": roster.len() }),
    )
}

fn handle_students_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    let Some(code) = req.params.get("code").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing params.code", None);
    };
    match roster.get(code) {
        Some(s) => ok(&req.id, json!({ "student": student_json(s) })),
        None => err(
            &req.id,
            "not_found",
            "no student with that code",
            Some(json!({ "code": code })),
        ),
    }
}

fn handle_students_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_mut() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    let student = match parse_new_student(&req.params) {
        Ok(s) => s,
        Err(e) => return e.response(&req.id),
    };
    let row = student_json(&student);
    match roster.add(student) {
        Ok(()) => ok(
            &req.id,
            json!({ "student": row, "studentCount": roster.len() }),
        ),
        Err(e) => store_err(e).response(&req.id),
    }
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_mut() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    let Some(code) = req.params.get("code").and_then(|v| v.as_i64()) else {
        return err(&req.id, "bad_params", "missing params.code", None);
    };
    match roster.delete(code) {
        Ok(removed) => ok(
            &req.id,
            json!({ "deleted": student_json(&removed), "studentCount": roster.len() }),
        ),
        Err(e) => store_err(e).response(&req.id),
    }
}

fn handle_students_highest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    match roster.highest() {
        Some(s) => ok(&req.id, json!({ "student": student_json(s) })),
        None => err(&req.id, "empty_roster", "no student records available", None),
    }
}

fn handle_students_lowest(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    match roster.lowest() {
        Some(s) => ok(&req.id, json!({ "student": student_json(s) })),
        None => err(&req.id, "empty_roster", "no student records available", None),
    }
}

fn handle_students_sort_by_total(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_mut() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    // Direction comes from the caller every time; whether calls alternate
    // is the GUI's policy, not the store's.
    let Some(ascending) = req.params.get("ascending").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing params.ascending", None);
    };
    roster.sort_by_total(ascending);
    let rows: Vec<serde_json::Value> = roster.students().iter().map(student_json).collect();
    ok(
        &req.id,
        json!({ "ascending": ascending, "students": rows }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.get" => Some(handle_students_get(state, req)),
        "students.add" => Some(handle_students_add(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.highest" => Some(handle_students_highest(state, req)),
        "students.lowest" => Some(handle_students_lowest(state, req)),
        "students.sortByTotal" => Some(handle_students_sort_by_total(state, req)),
        _ => None,
    }
}
