pub mod composite;
pub mod rollup;
pub mod sessions;
pub mod student;

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use log::debug;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::EngineConfig;
use crate::error::StatsError;
use crate::stats::rollup::{BatchNode, BranchError, CourseNode, Rollup, SubjectNode};
use crate::stats::sessions::SessionCount;
use crate::stats::student::{compute_student_stat, StudentAttendanceStat};
use crate::store::{AttendanceRecord, AttendanceStore, OrgDirectory, SessionType};

/// One row of a student's self-service dashboard: their stat for a
/// single (batch, subject) they are enrolled in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverviewEntry {
    pub batch_id: String,
    pub batch_name: String,
    pub subject_id: String,
    pub subject_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<StudentAttendanceStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BranchError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverview {
    pub student_id: String,
    pub name: String,
    pub entries: Vec<StudentOverviewEntry>,
}

/// The aggregation engine over the Organization Directory and the
/// Attendance Record Store. Everything here recomputes from records at
/// query time; nothing is cached or persisted.
pub struct StatsEngine {
    directory: Arc<dyn OrgDirectory>,
    store: Arc<dyn AttendanceStore>,
    config: EngineConfig,
}

impl StatsEngine {
    pub fn new(
        directory: Arc<dyn OrgDirectory>,
        store: Arc<dyn AttendanceStore>,
        config: EngineConfig,
    ) -> Self {
        StatsEngine {
            directory,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn directory(&self) -> &dyn OrgDirectory {
        self.directory.as_ref()
    }

    fn walk<'a>(&'a self, limiter: &'a Semaphore) -> Rollup<'a> {
        Rollup {
            directory: self.directory.as_ref(),
            store: self.store.as_ref(),
            limiter,
            fanout: self.config.max_inflight,
        }
    }

    pub async fn count_sessions(
        &self,
        subject_id: &str,
        batch_id: &str,
        session_type: SessionType,
    ) -> Result<SessionCount, StatsError> {
        if !self.directory.is_batch_subject(batch_id, subject_id).await? {
            return Err(StatsError::NotFound(format!(
                "subject {subject_id} is not taught in batch {batch_id}"
            )));
        }
        Ok(sessions::count_sessions(self.store.as_ref(), subject_id, batch_id, session_type)
            .await?)
    }

    pub async fn student_stat(
        &self,
        student_id: &str,
        subject_id: &str,
        batch_id: &str,
    ) -> Result<StudentAttendanceStat, StatsError> {
        compute_student_stat(
            self.directory.as_ref(),
            self.store.as_ref(),
            student_id,
            subject_id,
            batch_id,
        )
        .await
    }

    /// All (batch, subject) stats for one student, in directory order.
    /// Per-entry failures are annotated, matching rollup semantics.
    pub async fn student_overview(&self, student_id: &str) -> Result<StudentOverview, StatsError> {
        let Some(student) = self.directory.student(student_id).await? else {
            return Err(StatsError::NotFound(format!("student {student_id}")));
        };

        let mut scopes = Vec::new();
        for batch in self.directory.batches_of_student(student_id).await? {
            for subject in self.directory.batch_subjects(&batch.id).await? {
                scopes.push((batch.clone(), subject));
            }
        }
        debug!(
            "student overview for {student_id}: {} (batch, subject) scopes",
            scopes.len()
        );

        let limiter = Semaphore::new(self.config.max_inflight);
        let entries: Vec<StudentOverviewEntry> = stream::iter(scopes)
            .map(|(batch, subject)| {
                let limiter = &limiter;
                async move {
                    let _permit = limiter.acquire().await.expect("overview semaphore closed");
                    let outcome = compute_student_stat(
                        self.directory.as_ref(),
                        self.store.as_ref(),
                        student_id,
                        &subject.id,
                        &batch.id,
                    )
                    .await;
                    let (stat, error) = match outcome {
                        Ok(stat) => (Some(stat), None),
                        Err(e) => (None, Some(BranchError::from(&e))),
                    };
                    StudentOverviewEntry {
                        batch_id: batch.id,
                        batch_name: batch.name,
                        subject_id: subject.id,
                        subject_name: subject.name,
                        stat,
                        error,
                    }
                }
            })
            .buffered(self.config.max_inflight.max(1))
            .collect()
            .await;

        Ok(StudentOverview {
            student_id: student.id,
            name: student.name,
            entries,
        })
    }

    /// Resolves the batch for a (student, subject) pair when the caller
    /// did not name one. Ambiguity is a caller error, not a guess.
    pub async fn resolve_batch(
        &self,
        student_id: &str,
        subject_id: &str,
    ) -> Result<String, StatsError> {
        let mut matching = Vec::new();
        for batch in self.directory.batches_of_student(student_id).await? {
            if self.directory.is_batch_subject(&batch.id, subject_id).await? {
                matching.push(batch.id);
            }
        }
        match matching.len() {
            0 => Err(StatsError::InvalidScope(format!(
                "student {student_id} does not take subject {subject_id}"
            ))),
            1 => Ok(matching.remove(0)),
            _ => Err(StatsError::BadRequest(
                "subject is taught in more than one of the student's batches; supply batchId"
                    .to_string(),
            )),
        }
    }

    pub async fn rollup_subject(
        &self,
        subject_id: &str,
        batch_id: &str,
    ) -> Result<SubjectNode, StatsError> {
        let limiter = Semaphore::new(self.config.max_inflight);
        self.walk(&limiter).subject(subject_id, batch_id).await
    }

    pub async fn rollup_batch(&self, batch_id: &str) -> Result<BatchNode, StatsError> {
        let limiter = Semaphore::new(self.config.max_inflight);
        self.walk(&limiter).batch(batch_id).await
    }

    pub async fn rollup_course(&self, course_id: &str) -> Result<CourseNode, StatsError> {
        let limiter = Semaphore::new(self.config.max_inflight);
        self.walk(&limiter).course(course_id).await
    }

    /// Admin overview: one rollup per active course.
    pub async fn rollup_all_courses(&self) -> Result<Vec<CourseNode>, StatsError> {
        let limiter = Semaphore::new(self.config.max_inflight);
        let walk = self.walk(&limiter);
        let mut out = Vec::new();
        for course in self.directory.active_courses().await? {
            out.push(walk.course(&course.id).await?);
        }
        Ok(out)
    }

    pub async fn record(&self, record_id: &str) -> Result<AttendanceRecord, StatsError> {
        self.store
            .record(record_id)
            .await?
            .ok_or_else(|| StatsError::NotFound(format!("attendance record {record_id}")))
    }

    /// The one write path. Updates a single record's presence flag and
    /// recomputes the affected student's stat for that (subject, batch)
    /// scope only, never a tree walk.
    pub async fn toggle_record(
        &self,
        record_id: &str,
        is_present: bool,
    ) -> Result<StudentAttendanceStat, StatsError> {
        let Some(updated) = self.store.set_record_presence(record_id, is_present).await? else {
            return Err(StatsError::NotFound(format!(
                "attendance record {record_id}"
            )));
        };
        debug!(
            "record {record_id} set is_present={is_present}; recomputing ({}, {}, {})",
            updated.student_id, updated.subject_id, updated.batch_id
        );
        self.student_stat(&updated.student_id, &updated.subject_id, &updated.batch_id)
            .await
    }
}
