use serde_json::json;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_marksd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn marksd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .expect("error code")
}

#[test]
fn bundle_export_import_restores_the_roster() {
    let workspace = temp_dir("marksd-bundle-roundtrip");
    let roster_path = workspace.join("studentMarks.txt");
    let bundle_out = workspace.join("roster.backup.zip");
    let content = "2\n1,Alice,18,17,19,80\n2,Bob,10,10,10,40\n";
    std::fs::write(&roster_path, content).expect("seed roster");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.select",
        json!({ "path": roster_path.to_string_lossy() }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "backup.exportRosterBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("marksd-roster-v1")
    );
    assert_eq!(exported.get("entryCount").and_then(|v| v.as_i64()), Some(2));
    let sha = exported
        .get("rosterSha256")
        .and_then(|v| v.as_str())
        .expect("sha")
        .to_string();
    assert_eq!(sha.len(), 64);

    // The bundle is a real zip archive.
    let mut sig = [0u8; 4];
    std::fs::File::open(&bundle_out)
        .expect("open bundle")
        .read_exact(&mut sig)
        .expect("read signature");
    assert_eq!(sig, [0x50, 0x4B, 0x03, 0x04]);

    // Shrink the roster, then restore from the bundle.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "students.delete",
        json!({ "code": 1 }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "4", "roster.save", json!({}));
    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.importRosterBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    assert_eq!(imported.get("studentCount").and_then(|v| v.as_i64()), Some(2));
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("marksd-roster-v1")
    );
    assert_eq!(
        std::fs::read_to_string(&roster_path).expect("read roster"),
        content
    );

    let alice = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "students.get",
        json!({ "code": 1 }),
    );
    assert_eq!(
        alice
            .get("student")
            .and_then(|s| s.get("name"))
            .and_then(|v| v.as_str()),
        Some("Alice")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bundle_errors_are_reported_with_stable_codes() {
    let workspace = temp_dir("marksd-bundle-errors");
    let roster_path = workspace.join("studentMarks.txt");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    // No roster selected and no explicit rosterPath.
    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "backup.exportRosterBundle",
        json!({ "outPath": workspace.join("out.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "no_roster");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "roster.select",
        json!({ "path": roster_path.to_string_lossy() }),
    );

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "backup.exportRosterBundle",
        json!({}),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "backup.importRosterBundle",
        json!({ "inPath": workspace.join("absent.zip").to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "not_found");

    // Not a zip at all.
    let not_zip = workspace.join("not-a-bundle.zip");
    std::fs::write(&not_zip, "plain text").expect("seed file");
    let resp = request(
        &mut stdin,
        &mut reader,
        "5",
        "backup.importRosterBundle",
        json!({ "inPath": not_zip.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "io_failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn csv_export_includes_derived_columns() {
    let workspace = temp_dir("marksd-bundle-csv");
    let roster_path = workspace.join("studentMarks.txt");
    let csv_out = workspace.join("roster.csv");
    std::fs::write(&roster_path, "2\n1,Alice,18,17,19,80\n2,Bob,10,10,10,40\n")
        .expect("seed roster");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "roster.select",
        json!({ "path": roster_path.to_string_lossy() }),
    );
    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "exchange.exportRosterCsv",
        json!({ "outPath": csv_out.to_string_lossy() }),
    );
    assert_eq!(exported.get("rowsExported").and_then(|v| v.as_i64()), Some(2));

    let csv = std::fs::read_to_string(&csv_out).expect("read csv");
    let mut lines = csv.lines();
    assert_eq!(
        lines.next(),
        Some("code,name,c1,c2,c3,exam,coursework,total,percentage,grade")
    );
    assert_eq!(lines.next(), Some("1,Alice,18,17,19,80,54,134,83.75,A"));
    assert_eq!(lines.next(), Some("2,Bob,10,10,10,40,30,70,43.75,D"));
    assert_eq!(lines.next(), None);

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
