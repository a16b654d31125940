use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};

use super::{
    AttendanceRecord, AttendanceStore, BatchRow, CourseRow, OrgDirectory, SessionType,
    StoreError, StudentRow, SubjectRow,
};

/// Workspace-backed store. rusqlite is synchronous, so the connection
/// sits behind a mutex; every trait call locks, queries, and returns.
/// Fan-out stays bounded by the engine's semaphore either way.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        SqliteStore {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Poisoning only happens if a holder panicked; propagating the
        // panic is the right move for a workspace daemon.
        self.conn.lock().expect("sqlite connection poisoned")
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn decode_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| StoreError::InvalidDate(raw.to_string()))
}

fn decode_session_type(raw: &str) -> Result<SessionType, StoreError> {
    SessionType::parse(raw).ok_or_else(|| StoreError::InvalidSessionType(raw.to_string()))
}

fn collect_records(
    conn: &Connection,
    sql: &str,
    binds: &[&dyn rusqlite::ToSql],
) -> Result<Vec<AttendanceRecord>, StoreError> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map(binds, |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
                r.get::<_, i64>(7)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    let mut out = Vec::with_capacity(rows.len());
    for (id, student_id, subject_id, batch_id, staff_id, date, session_type, is_present) in rows
    {
        out.push(AttendanceRecord {
            id,
            student_id,
            subject_id,
            batch_id,
            staff_id,
            date: decode_date(&date)?,
            session_type: decode_session_type(&session_type)?,
            is_present: is_present != 0,
        });
    }
    Ok(out)
}

const RECORD_COLUMNS: &str =
    "id, student_id, subject_id, batch_id, staff_id, date, session_type, is_present";

#[async_trait]
impl OrgDirectory for SqliteStore {
    async fn course(&self, course_id: &str) -> Result<Option<CourseRow>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name, is_active FROM courses WHERE id = ?",
            [course_id],
            |r| {
                Ok(CourseRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    is_active: r.get::<_, i64>(2)? != 0,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn batch(&self, batch_id: &str) -> Result<Option<BatchRow>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, course_id, name, is_active FROM batches WHERE id = ?",
            [batch_id],
            |r| {
                Ok(BatchRow {
                    id: r.get(0)?,
                    course_id: r.get(1)?,
                    name: r.get(2)?,
                    is_active: r.get::<_, i64>(3)? != 0,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn subject(&self, subject_id: &str) -> Result<Option<SubjectRow>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name FROM subjects WHERE id = ?",
            [subject_id],
            |r| {
                Ok(SubjectRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn student(&self, student_id: &str) -> Result<Option<StudentRow>, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, name FROM students WHERE id = ?",
            [student_id],
            |r| {
                Ok(StudentRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    async fn active_courses(&self) -> Result<Vec<CourseRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT id, name, is_active FROM courses WHERE is_active = 1 ORDER BY rowid")
            .map_err(db_err)?;
        stmt.query_map([], |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                name: r.get(1)?,
                is_active: r.get::<_, i64>(2)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
    }

    async fn active_batches(&self, course_id: &str) -> Result<Vec<BatchRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, course_id, name, is_active
                 FROM batches
                 WHERE course_id = ? AND is_active = 1
                 ORDER BY rowid",
            )
            .map_err(db_err)?;
        stmt.query_map([course_id], |r| {
            Ok(BatchRow {
                id: r.get(0)?,
                course_id: r.get(1)?,
                name: r.get(2)?,
                is_active: r.get::<_, i64>(3)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
    }

    async fn batch_subjects(&self, batch_id: &str) -> Result<Vec<SubjectRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT s.id, s.name
                 FROM batch_subjects bs
                 JOIN subjects s ON s.id = bs.subject_id
                 WHERE bs.batch_id = ?
                 ORDER BY bs.sort_order, bs.rowid",
            )
            .map_err(db_err)?;
        stmt.query_map([batch_id], |r| {
            Ok(SubjectRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
    }

    async fn batch_students(&self, batch_id: &str) -> Result<Vec<StudentRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT st.id, st.name
                 FROM batch_students bm
                 JOIN students st ON st.id = bm.student_id
                 WHERE bm.batch_id = ?
                 ORDER BY bm.sort_order, bm.rowid",
            )
            .map_err(db_err)?;
        stmt.query_map([batch_id], |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
    }

    async fn batches_of_student(&self, student_id: &str) -> Result<Vec<BatchRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT b.id, b.course_id, b.name, b.is_active
                 FROM batch_students bm
                 JOIN batches b ON b.id = bm.batch_id
                 WHERE bm.student_id = ? AND b.is_active = 1
                 ORDER BY bm.rowid",
            )
            .map_err(db_err)?;
        stmt.query_map([student_id], |r| {
            Ok(BatchRow {
                id: r.get(0)?,
                course_id: r.get(1)?,
                name: r.get(2)?,
                is_active: r.get::<_, i64>(3)? != 0,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)
    }

    async fn is_batch_subject(
        &self,
        batch_id: &str,
        subject_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT 1 FROM batch_subjects WHERE batch_id = ? AND subject_id = ?",
            (batch_id, subject_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map(|v| v.is_some())
        .map_err(db_err)
    }

    async fn is_batch_member(
        &self,
        batch_id: &str,
        student_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT 1 FROM batch_students WHERE batch_id = ? AND student_id = ?",
            (batch_id, student_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map(|v| v.is_some())
        .map_err(db_err)
    }

    async fn is_staff_assigned(
        &self,
        staff_id: &str,
        batch_id: &str,
        subject_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        // Coordinator rows carry subject_id NULL and cover the batch.
        conn.query_row(
            "SELECT 1 FROM staff_assignments
             WHERE staff_id = ? AND batch_id = ?
               AND (subject_id = ? OR (subject_id IS NULL AND role = 'coordinator'))",
            (staff_id, batch_id, subject_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map(|v| v.is_some())
        .map_err(db_err)
    }

    async fn is_batch_coordinator(
        &self,
        staff_id: &str,
        batch_id: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT 1 FROM staff_assignments
             WHERE staff_id = ? AND batch_id = ? AND role = 'coordinator'",
            (staff_id, batch_id),
            |r| r.get::<_, i64>(0),
        )
        .optional()
        .map(|v| v.is_some())
        .map_err(db_err)
    }
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    // Type filtering happens after decoding, not in SQL: a row whose
    // session_type fails to parse must surface as a store error rather
    // than fall out of the WHERE clause unseen.
    async fn records_for_class(
        &self,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records
             WHERE subject_id = ? AND batch_id = ?
             ORDER BY date, rowid"
        );
        let records = collect_records(&conn, &sql, &[&subject_id, &batch_id])?;
        Ok(records
            .into_iter()
            .filter(|r| r.session_type == session_type)
            .collect())
    }

    async fn records_for_student(
        &self,
        student_id: &str,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM attendance_records
             WHERE student_id = ? AND subject_id = ? AND batch_id = ?
             ORDER BY date, rowid"
        );
        let records = collect_records(&conn, &sql, &[&student_id, &subject_id, &batch_id])?;
        Ok(records
            .into_iter()
            .filter(|r| r.session_type == session_type)
            .collect())
    }

    async fn record(&self, record_id: &str) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.lock();
        let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ?");
        let mut found = collect_records(&conn, &sql, &[&record_id])?;
        Ok(found.pop())
    }

    async fn set_record_presence(
        &self,
        record_id: &str,
        is_present: bool,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        {
            let conn = self.lock();
            let changed = conn
                .execute(
                    "UPDATE attendance_records SET is_present = ? WHERE id = ?",
                    (is_present as i64, record_id),
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Ok(None);
            }
        }
        self.record(record_id).await
    }
}
