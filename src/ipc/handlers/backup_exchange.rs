use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::RosterStore;
use serde_json::json;
use std::path::PathBuf;

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn handle_backup_export_roster_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };
    let roster_path = req
        .params
        .get("rosterPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.roster.as_ref().map(|r| r.path().to_path_buf()));
    let Some(roster_path) = roster_path else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };

    let out = PathBuf::from(&out_path);
    let export = match backup::export_roster_bundle(&roster_path, &out) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path,
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "rosterSha256": export.roster_sha256
        }),
    )
}

fn handle_backup_import_roster_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let in_path = match req.params.get("inPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing inPath", None),
    };
    let roster_path = req
        .params
        .get("rosterPath")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| state.roster.as_ref().map(|r| r.path().to_path_buf()));
    let Some(roster_path) = roster_path else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };

    let src = PathBuf::from(&in_path);
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": in_path })),
        );
    }

    let import = match backup::import_roster_bundle(&src, &roster_path) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": src.to_string_lossy() })),
            )
        }
    };

    // Reopen so the in-memory roster reflects the imported file.
    match RosterStore::open(&roster_path) {
        Ok(store) => {
            let count = store.len();
            state.roster = Some(store);
            ok(
                &req.id,
                json!({
                    "ok": true,
                    "rosterPath": roster_path.to_string_lossy(),
                    "bundleFormatDetected": import.bundle_format_detected,
                    "rosterSha256": import.roster_sha256,
                    "studentCount": count
                }),
            )
        }
        Err(e) => err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": roster_path.to_string_lossy() })),
        ),
    }
}

fn handle_exchange_export_roster_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(roster) = state.roster.as_ref() else {
        return err(&req.id, "no_roster", "select a roster first", None);
    };
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing outPath", None),
    };

    let mut csv = String::from("code,name,c1,c2,c3,exam,coursework,total,percentage,grade\n");
    for s in roster.students() {
        csv.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            s.code,
            csv_quote(&s.name),
            s.c1,
            s.c2,
            s.c3,
            s.exam,
            s.coursework(),
            s.total(),
            s.percentage(),
            s.grade()
        ));
    }

    let out = PathBuf::from(&out_path);
    if let Some(parent) = out.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
    }
    if let Err(e) = std::fs::write(&out, csv) {
        return err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": out_path })),
        );
    }

    ok(
        &req.id,
        json!({ "ok": true, "rowsExported": roster.len(), "path": out_path }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportRosterBundle" => Some(handle_backup_export_roster_bundle(state, req)),
        "backup.importRosterBundle" => Some(handle_backup_import_roster_bundle(state, req)),
        "exchange.exportRosterCsv" => Some(handle_exchange_export_roster_csv(state, req)),
        _ => None,
    }
}
