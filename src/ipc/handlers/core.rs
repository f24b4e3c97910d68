use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::RosterStore;
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "rosterPath": state.roster.as_ref().map(|r| r.path().to_string_lossy().to_string())
        }),
    )
}

fn handle_roster_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match RosterStore::open(&path) {
        Ok(store) => {
            let count = store.len();
            state.roster = Some(store);
            ok(
                &req.id,
                json!({ "rosterPath": path.to_string_lossy(), "studentCount": count }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path.to_string_lossy() })),
        ),
    }
}

fn handle_roster_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_mut() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    match roster.reload() {
        Ok(()) => ok(&req.id, json!({ "studentCount": roster.len() })),
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": roster.path().to_string_lossy() })),
        ),
    }
}

fn handle_roster_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    match roster.save() {
        Ok(()) => ok(
            &req.id,
            json!({
                "rosterPath": roster.path().to_string_lossy(),
                "studentCount": roster.len()
            }),
        ),
        // The in-memory roster is still intact; the caller may retry.
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": roster.path().to_string_lossy() })),
        ),
    }
}

fn handle_roster_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    ok(
        &req.id,
        json!({
            "studentCount": roster.len(),
            "averagePercentage": roster.average_percentage(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "roster.select" => Some(handle_roster_select(state, req)),
        "roster.reload" => Some(handle_roster_reload(state, req)),
        "roster.save" => Some(handle_roster_save(state, req)),
        "roster.summary" => Some(handle_roster_summary(state, req)),
        _ => None,
    }
}
