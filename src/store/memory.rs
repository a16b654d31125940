use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use super::{
    AttendanceRecord, AttendanceStore, BatchRow, CourseRow, OrgDirectory, SessionType,
    StoreError, StudentRow, SubjectRow,
};

#[derive(Debug, Clone)]
struct Assignment {
    staff_id: String,
    batch_id: String,
    subject_id: Option<String>,
    coordinator: bool,
}

/// In-memory store for tests and embedders without a workspace. Lists
/// preserve insertion order, matching the directory-order contract.
#[derive(Default)]
pub struct MemoryStore {
    courses: Mutex<Vec<CourseRow>>,
    batches: Mutex<Vec<BatchRow>>,
    subjects: Mutex<Vec<SubjectRow>>,
    students: Mutex<Vec<StudentRow>>,
    batch_subjects: Mutex<Vec<(String, String)>>,
    batch_students: Mutex<Vec<(String, String)>>,
    assignments: Mutex<Vec<Assignment>>,
    records: Mutex<Vec<AttendanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn add_course(&self, id: &str, name: &str, is_active: bool) {
        self.courses.lock().unwrap().push(CourseRow {
            id: id.to_string(),
            name: name.to_string(),
            is_active,
        });
    }

    pub fn add_batch(&self, id: &str, course_id: &str, name: &str, is_active: bool) {
        self.batches.lock().unwrap().push(BatchRow {
            id: id.to_string(),
            course_id: course_id.to_string(),
            name: name.to_string(),
            is_active,
        });
    }

    pub fn add_subject(&self, id: &str, name: &str) {
        self.subjects.lock().unwrap().push(SubjectRow {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn add_student(&self, id: &str, name: &str) {
        self.students.lock().unwrap().push(StudentRow {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn link_subject(&self, batch_id: &str, subject_id: &str) {
        self.batch_subjects
            .lock()
            .unwrap()
            .push((batch_id.to_string(), subject_id.to_string()));
    }

    pub fn enroll(&self, batch_id: &str, student_id: &str) {
        self.batch_students
            .lock()
            .unwrap()
            .push((batch_id.to_string(), student_id.to_string()));
    }

    pub fn assign_teacher(&self, staff_id: &str, batch_id: &str, subject_id: &str) {
        self.assignments.lock().unwrap().push(Assignment {
            staff_id: staff_id.to_string(),
            batch_id: batch_id.to_string(),
            subject_id: Some(subject_id.to_string()),
            coordinator: false,
        });
    }

    pub fn assign_coordinator(&self, staff_id: &str, batch_id: &str) {
        self.assignments.lock().unwrap().push(Assignment {
            staff_id: staff_id.to_string(),
            batch_id: batch_id.to_string(),
            subject_id: None,
            coordinator: true,
        });
    }

    /// Inserts a record and returns its generated id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_record(
        &self,
        student_id: &str,
        subject_id: &str,
        batch_id: &str,
        staff_id: &str,
        date: NaiveDate,
        session_type: SessionType,
        is_present: bool,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        self.records.lock().unwrap().push(AttendanceRecord {
            id: id.clone(),
            student_id: student_id.to_string(),
            subject_id: subject_id.to_string(),
            batch_id: batch_id.to_string(),
            staff_id: staff_id.to_string(),
            date,
            session_type,
            is_present,
        });
        id
    }
}

#[async_trait]
impl OrgDirectory for MemoryStore {
    async fn course(&self, course_id: &str) -> Result<Option<CourseRow>, StoreError> {
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == course_id)
            .cloned())
    }

    async fn batch(&self, batch_id: &str) -> Result<Option<BatchRow>, StoreError> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == batch_id)
            .cloned())
    }

    async fn subject(&self, subject_id: &str) -> Result<Option<SubjectRow>, StoreError> {
        Ok(self
            .subjects
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == subject_id)
            .cloned())
    }

    async fn student(&self, student_id: &str) -> Result<Option<StudentRow>, StoreError> {
        Ok(self
            .students
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == student_id)
            .cloned())
    }

    async fn active_courses(&self) -> Result<Vec<CourseRow>, StoreError> {
        Ok(self
            .courses
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn active_batches(&self, course_id: &str) -> Result<Vec<BatchRow>, StoreError> {
        Ok(self
            .batches
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.course_id == course_id && b.is_active)
            .cloned()
            .collect())
    }

    async fn batch_subjects(&self, batch_id: &str) -> Result<Vec<SubjectRow>, StoreError> {
        let links = self.batch_subjects.lock().unwrap();
        let subjects = self.subjects.lock().unwrap();
        let mut out = Vec::new();
        for (b, s) in links.iter() {
            if b != batch_id {
                continue;
            }
            if let Some(row) = subjects.iter().find(|row| row.id == *s) {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    async fn batch_students(&self, batch_id: &str) -> Result<Vec<StudentRow>, StoreError> {
        let links = self.batch_students.lock().unwrap();
        let students = self.students.lock().unwrap();
        let mut out = Vec::new();
        for (b, s) in links.iter() {
            if b != batch_id {
                continue;
            }
            if let Some(row) = students.iter().find(|row| row.id == *s) {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    async fn batches_of_student(&self, student_id: &str) -> Result<Vec<BatchRow>, StoreError> {
        let links = self.batch_students.lock().unwrap();
        let batches = self.batches.lock().unwrap();
        let mut out = Vec::new();
        for (b, s) in links.iter() {
            if s != student_id {
                continue;
            }
            if let Some(row) = batches.iter().find(|row| row.id == *b && row.is_active) {
                out.push(row.clone());
            }
        }
        Ok(out)
    }

    async fn is_batch_subject(
        &self,
        batch_id: &str,
        subject_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .batch_subjects
            .lock()
            .unwrap()
            .iter()
            .any(|(b, s)| b == batch_id && s == subject_id))
    }

    async fn is_batch_member(
        &self,
        batch_id: &str,
        student_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .batch_students
            .lock()
            .unwrap()
            .iter()
            .any(|(b, s)| b == batch_id && s == student_id))
    }

    async fn is_staff_assigned(
        &self,
        staff_id: &str,
        batch_id: &str,
        subject_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.assignments.lock().unwrap().iter().any(|a| {
            a.staff_id == staff_id
                && a.batch_id == batch_id
                && (a.subject_id.as_deref() == Some(subject_id) || a.coordinator)
        }))
    }

    async fn is_batch_coordinator(
        &self,
        staff_id: &str,
        batch_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .assignments
            .lock()
            .unwrap()
            .iter()
            .any(|a| a.staff_id == staff_id && a.batch_id == batch_id && a.coordinator))
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn records_for_class(
        &self,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.subject_id == subject_id
                    && r.batch_id == batch_id
                    && r.session_type == session_type
            })
            .cloned()
            .collect())
    }

    async fn records_for_student(
        &self,
        student_id: &str,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.student_id == student_id
                    && r.subject_id == subject_id
                    && r.batch_id == batch_id
                    && r.session_type == session_type
            })
            .cloned()
            .collect())
    }

    async fn record(&self, record_id: &str) -> Result<Option<AttendanceRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == record_id)
            .cloned())
    }

    async fn set_record_presence(
        &self,
        record_id: &str,
        is_present: bool,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let mut records = self.records.lock().unwrap();
        let Some(rec) = records.iter_mut().find(|r| r.id == record_id) else {
            return Ok(None);
        };
        rec.is_present = is_present;
        Ok(Some(rec.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_preserves_insertion_order() {
        let store = MemoryStore::new();
        store.add_batch("b1", "c1", "Batch 1", true);
        store.add_subject("s2", "Physics");
        store.add_subject("s1", "Maths");
        store.link_subject("b1", "s2");
        store.link_subject("b1", "s1");

        let subjects = store.batch_subjects("b1").await.unwrap();
        let ids: Vec<&str> = subjects.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }

    #[tokio::test]
    async fn set_record_presence_unknown_id_is_none() {
        let store = MemoryStore::new();
        let updated = store.set_record_presence("nope", true).await.unwrap();
        assert!(updated.is_none());
    }
}
