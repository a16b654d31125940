#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
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
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "expected ok response for {}: {}",
        method,
        value
    );
    value.get("result").cloned().expect("result")
}

/// Sends the request and asserts it fails with the given error code.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
    expected_code: &str,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "expected error response for {}: {}",
        method,
        value
    );
    let code = value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("missing");
    assert_eq!(code, expected_code, "unexpected error code: {}", value);
    value
}

pub fn caller(id: &str, role: &str) -> serde_json::Value {
    json!({ "id": id, "role": role })
}

/// Spawns the sidecar and selects a fresh workspace.
pub fn open_workspace(prefix: &str) -> (Child, ChildStdin, BufReader<ChildStdout>, PathBuf) {
    let workspace = temp_dir(prefix);
    let (child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    (child, stdin, reader, workspace)
}

/// Standard campus fixture shared by the attendance suites:
/// course c1 with batches b1 (sub1 Algorithms + sub2 Databases; students
/// st1, st2) and b2 (sub1; student st3). Staff: t1 teaches sub1@b1,
/// t2 teaches sub2@b1, coord1 coordinates b1.
pub fn seed_campus(workspace: &Path) -> Seeder {
    let s = Seeder::open(workspace);
    s.course("c1", "BSc Computer Science", true);
    s.batch("b1", "c1", "2026 Batch A", true);
    s.batch("b2", "c1", "2026 Batch B", true);
    s.subject("sub1", "Algorithms");
    s.subject("sub2", "Databases");
    s.link_subject("b1", "sub1", 0);
    s.link_subject("b1", "sub2", 1);
    s.link_subject("b2", "sub1", 0);
    s.student("st1", "Asha Rao");
    s.student("st2", "Ravi Iyer");
    s.student("st3", "Meera Nair");
    s.enroll("b1", "st1", 0);
    s.enroll("b1", "st2", 1);
    s.enroll("b2", "st3", 0);
    s.staff("t1", "Prof. Menon");
    s.staff("t2", "Dr. Bose");
    s.staff("coord1", "Prof. Kulkarni");
    s.assign_teacher("t1", "b1", "sub1");
    s.assign_teacher("t2", "b1", "sub2");
    s.assign_coordinator("coord1", "b1");
    s
}

/// Writes fixture rows straight into the workspace database, the way
/// the ERP's CRUD layer populates it in production. Call after
/// `workspace.select` has created the schema.
pub struct Seeder {
    conn: Connection,
}

impl Seeder {
    pub fn open(workspace: &Path) -> Seeder {
        let conn = Connection::open(workspace.join("campus.sqlite3")).expect("open workspace db");
        Seeder { conn }
    }

    pub fn course(&self, id: &str, name: &str, is_active: bool) {
        self.conn
            .execute(
                "INSERT INTO courses(id, name, is_active) VALUES(?, ?, ?)",
                (id, name, is_active as i64),
            )
            .expect("insert course");
    }

    pub fn set_batch_active(&self, id: &str, is_active: bool) {
        self.conn
            .execute(
                "UPDATE batches SET is_active = ? WHERE id = ?",
                (is_active as i64, id),
            )
            .expect("update batch");
    }

    pub fn batch(&self, id: &str, course_id: &str, name: &str, is_active: bool) {
        self.conn
            .execute(
                "INSERT INTO batches(id, course_id, name, is_active) VALUES(?, ?, ?, ?)",
                (id, course_id, name, is_active as i64),
            )
            .expect("insert batch");
    }

    pub fn subject(&self, id: &str, name: &str) {
        self.conn
            .execute("INSERT INTO subjects(id, name) VALUES(?, ?)", (id, name))
            .expect("insert subject");
    }

    pub fn student(&self, id: &str, name: &str) {
        self.conn
            .execute("INSERT INTO students(id, name) VALUES(?, ?)", (id, name))
            .expect("insert student");
    }

    pub fn staff(&self, id: &str, name: &str) {
        self.conn
            .execute("INSERT INTO staff(id, name) VALUES(?, ?)", (id, name))
            .expect("insert staff");
    }

    pub fn link_subject(&self, batch_id: &str, subject_id: &str, sort_order: i64) {
        self.conn
            .execute(
                "INSERT INTO batch_subjects(batch_id, subject_id, sort_order) VALUES(?, ?, ?)",
                (batch_id, subject_id, sort_order),
            )
            .expect("insert batch_subject");
    }

    pub fn enroll(&self, batch_id: &str, student_id: &str, sort_order: i64) {
        self.conn
            .execute(
                "INSERT INTO batch_students(batch_id, student_id, sort_order) VALUES(?, ?, ?)",
                (batch_id, student_id, sort_order),
            )
            .expect("insert batch_student");
    }

    pub fn assign_teacher(&self, staff_id: &str, batch_id: &str, subject_id: &str) {
        self.conn
            .execute(
                "INSERT INTO staff_assignments(staff_id, batch_id, subject_id, role)
                 VALUES(?, ?, ?, 'teacher')",
                (staff_id, batch_id, subject_id),
            )
            .expect("insert teacher assignment");
    }

    pub fn assign_coordinator(&self, staff_id: &str, batch_id: &str) {
        self.conn
            .execute(
                "INSERT INTO staff_assignments(staff_id, batch_id, subject_id, role)
                 VALUES(?, ?, NULL, 'coordinator')",
                (staff_id, batch_id),
            )
            .expect("insert coordinator assignment");
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        student_id: &str,
        subject_id: &str,
        batch_id: &str,
        staff_id: &str,
        date: &str,
        session_type: &str,
        is_present: bool,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO attendance_records(
                    id, student_id, subject_id, batch_id, staff_id, date, session_type, is_present
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
                (
                    &id,
                    student_id,
                    subject_id,
                    batch_id,
                    staff_id,
                    date,
                    session_type,
                    is_present as i64,
                ),
            )
            .expect("insert attendance record");
        id
    }
}
