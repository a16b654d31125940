use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("campus.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batches_course ON batches(course_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_subjects(
            batch_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(batch_id, subject_id),
            FOREIGN KEY(batch_id) REFERENCES batches(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_subjects_batch ON batch_subjects(batch_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batch_students(
            batch_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(batch_id, student_id),
            FOREIGN KEY(batch_id) REFERENCES batches(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_students_batch ON batch_students(batch_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_batch_students_student ON batch_students(student_id)",
        [],
    )?;

    // role is 'teacher' (subject_id set) or 'coordinator' (subject_id NULL,
    // covers the whole batch).
    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff_assignments(
            staff_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            subject_id TEXT,
            role TEXT NOT NULL DEFAULT 'teacher',
            UNIQUE(staff_id, batch_id, subject_id),
            FOREIGN KEY(staff_id) REFERENCES staff(id),
            FOREIGN KEY(batch_id) REFERENCES batches(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_assignments_staff ON staff_assignments(staff_id, batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            staff_id TEXT NOT NULL,
            date TEXT NOT NULL,
            session_type TEXT NOT NULL,
            is_present INTEGER NOT NULL,
            UNIQUE(student_id, subject_id, batch_id, date, session_type),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            FOREIGN KEY(batch_id) REFERENCES batches(id),
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_class
         ON attendance_records(subject_id, batch_id, session_type, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student
         ON attendance_records(student_id, subject_id, batch_id, session_type)",
        [],
    )?;

    // Older workspaces predate soft-deletion; add the flags if missing.
    ensure_is_active(&conn, "courses")?;
    ensure_is_active(&conn, "batches")?;

    Ok(conn)
}

fn ensure_is_active(conn: &Connection, table: &str) -> anyhow::Result<()> {
    if table_has_column(conn, table, "is_active")? {
        return Ok(());
    }
    let sql = format!("ALTER TABLE {table} ADD COLUMN is_active INTEGER NOT NULL DEFAULT 1");
    conn.execute(&sql, [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
