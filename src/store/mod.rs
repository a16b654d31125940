#[cfg(test)]
mod memory;
mod sqlite;

#[cfg(test)]
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Closed session-type enum. The store boundary parses strictly; an
/// unrecognized value in persisted data is a store error, never a
/// silently-empty bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionType {
    Lecture,
    Lab,
}

impl SessionType {
    pub const ALL: [SessionType; 2] = [SessionType::Lecture, SessionType::Lab];

    pub fn parse(s: &str) -> Option<SessionType> {
        match s {
            "lecture" => Some(SessionType::Lecture),
            "lab" => Some(SessionType::Lab),
            _ => None,
        }
    }
}

/// One persisted attendance fact. A session is derived: the set of
/// distinct `date` values among records for a (subject, batch, type).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub batch_id: String,
    pub staff_id: String,
    pub date: NaiveDate,
    pub session_type: SessionType,
    pub is_present: bool,
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct BatchRow {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Backend(String),
    #[error("invalid session type in store: {0:?}")]
    InvalidSessionType(String),
    #[error("invalid date in store: {0:?}")]
    InvalidDate(String),
}

/// Course → batch → subject/student containment, plus staff assignment
/// lookups for access scoping. List methods return rows in the
/// directory's own (insertion) order; rollup output follows it.
#[async_trait]
pub trait OrgDirectory: Send + Sync {
    async fn course(&self, course_id: &str) -> Result<Option<CourseRow>, StoreError>;
    async fn batch(&self, batch_id: &str) -> Result<Option<BatchRow>, StoreError>;
    async fn subject(&self, subject_id: &str) -> Result<Option<SubjectRow>, StoreError>;
    async fn student(&self, student_id: &str) -> Result<Option<StudentRow>, StoreError>;

    async fn active_courses(&self) -> Result<Vec<CourseRow>, StoreError>;
    async fn active_batches(&self, course_id: &str) -> Result<Vec<BatchRow>, StoreError>;
    async fn batch_subjects(&self, batch_id: &str) -> Result<Vec<SubjectRow>, StoreError>;
    async fn batch_students(&self, batch_id: &str) -> Result<Vec<StudentRow>, StoreError>;

    /// Active batches the student belongs to.
    async fn batches_of_student(&self, student_id: &str) -> Result<Vec<BatchRow>, StoreError>;

    async fn is_batch_subject(
        &self,
        batch_id: &str,
        subject_id: &str,
    ) -> Result<bool, StoreError>;
    async fn is_batch_member(
        &self,
        batch_id: &str,
        student_id: &str,
    ) -> Result<bool, StoreError>;

    /// True when the staff member teaches (batch, subject) or coordinates
    /// the batch. A coordinator assignment covers every subject of its
    /// batch.
    async fn is_staff_assigned(
        &self,
        staff_id: &str,
        batch_id: &str,
        subject_id: &str,
    ) -> Result<bool, StoreError>;
    async fn is_batch_coordinator(
        &self,
        staff_id: &str,
        batch_id: &str,
    ) -> Result<bool, StoreError>;
}

/// Read interface over persisted attendance events. Rollups only read;
/// `set_record_presence` is the one narrow write behind the toggle
/// entry point.
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// All records for a (subject, batch, type), present or not.
    async fn records_for_class(
        &self,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    /// One student's records within a (subject, batch, type).
    async fn records_for_student(
        &self,
        student_id: &str,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;

    async fn record(&self, record_id: &str) -> Result<Option<AttendanceRecord>, StoreError>;

    /// Sets the presence flag of one record; returns the updated record,
    /// or None when the id is unknown.
    async fn set_record_presence(
        &self,
        record_id: &str,
        is_present: bool,
    ) -> Result<Option<AttendanceRecord>, StoreError>;
}
