use futures::stream::{self, StreamExt};
use log::warn;
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::error::StatsError;
use crate::stats::composite::mean2;
use crate::stats::student::{compute_student_stat, StudentAttendanceStat};
use crate::store::{AttendanceStore, BatchRow, OrgDirectory, StudentRow, SubjectRow};

/// Averaged percentages attached to a subject, batch, or course node.
/// Ancestor levels take the unweighted arithmetic mean of their
/// children's percentages; nothing is re-weighted by session counts.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupStat {
    pub lecture_percentage: f64,
    pub lab_percentage: f64,
    pub overall_percentage: f64,
}

impl RollupStat {
    fn triple(&self) -> (f64, f64, f64) {
        (
            self.lecture_percentage,
            self.lab_percentage,
            self.overall_percentage,
        )
    }

    fn from_triples(triples: &[(f64, f64, f64)]) -> RollupStat {
        let lectures: Vec<f64> = triples.iter().map(|t| t.0).collect();
        let labs: Vec<f64> = triples.iter().map(|t| t.1).collect();
        let overall: Vec<f64> = triples.iter().map(|t| t.2).collect();
        RollupStat {
            lecture_percentage: mean2(&lectures),
            lab_percentage: mean2(&labs),
            overall_percentage: mean2(&overall),
        }
    }
}

/// Non-fatal per-branch failure annotation. The branch reports its error
/// in place; siblings and ancestors keep their statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchError {
    pub code: String,
    pub message: String,
}

impl From<&StatsError> for BranchError {
    fn from(e: &StatsError) -> Self {
        BranchError {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentNode {
    pub student_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<StudentAttendanceStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BranchError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectNode {
    pub subject_id: String,
    pub name: String,
    pub students: Vec<StudentNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<RollupStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BranchError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchNode {
    pub batch_id: String,
    pub name: String,
    pub subjects: Vec<SubjectNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<RollupStat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BranchError>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseNode {
    pub course_id: String,
    pub name: String,
    pub batches: Vec<BatchNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<RollupStat>,
}

/// Mean over the children that produced statistics. No children at all
/// is the degenerate zero case; children that all failed yield no stat
/// and an annotation instead, so a dead branch never reads as 0%.
fn aggregate(
    triples: Vec<(f64, f64, f64)>,
    child_count: usize,
    first_child_error: Option<&BranchError>,
) -> (Option<RollupStat>, Option<BranchError>) {
    if child_count > 0 && triples.is_empty() {
        let code = first_child_error
            .map(|e| e.code.clone())
            .unwrap_or_else(|| "store_error".to_string());
        return (
            None,
            Some(BranchError {
                code,
                message: format!("all {child_count} child computations failed"),
            }),
        );
    }
    (Some(RollupStat::from_triples(&triples)), None)
}

/// One query's walk over the organizational tree. Children at each level
/// run concurrently and are reassembled in directory order; the shared
/// semaphore bounds in-flight student-level computations across the
/// whole walk. The walk only reads, so dropping it mid-flight (deadline,
/// caller gone) cancels every branch with nothing to roll back.
pub struct Rollup<'a> {
    pub directory: &'a dyn OrgDirectory,
    pub store: &'a dyn AttendanceStore,
    pub limiter: &'a Semaphore,
    pub fanout: usize,
}

impl<'a> Rollup<'a> {
    pub async fn course(&self, course_id: &str) -> Result<CourseNode, StatsError> {
        let Some(course) = self.directory.course(course_id).await? else {
            return Err(StatsError::NotFound(format!("course {course_id}")));
        };
        if !course.is_active {
            return Err(StatsError::NotFound(format!(
                "course {course_id} is inactive"
            )));
        }

        let batches = self.directory.active_batches(course_id).await?;
        let nodes: Vec<BatchNode> = stream::iter(batches)
            .map(|b| self.batch_node(b))
            .buffered(self.fanout.max(1))
            .collect()
            .await;

        let triples: Vec<(f64, f64, f64)> = nodes
            .iter()
            .filter_map(|n| n.stat.as_ref())
            .map(RollupStat::triple)
            .collect();
        let first_err = nodes.iter().find_map(|n| n.error.as_ref());
        let (stat, _) = aggregate(triples, nodes.len(), first_err);
        Ok(CourseNode {
            course_id: course.id,
            name: course.name,
            batches: nodes,
            stat,
        })
    }

    /// Direct single-batch query. A missing or inactive batch is a
    /// caller error here, unlike inside a course walk where inactive
    /// batches are simply absent.
    pub async fn batch(&self, batch_id: &str) -> Result<BatchNode, StatsError> {
        let Some(batch) = self.directory.batch(batch_id).await? else {
            return Err(StatsError::NotFound(format!("batch {batch_id}")));
        };
        if !batch.is_active {
            return Err(StatsError::NotFound(format!("batch {batch_id} is inactive")));
        }
        self.batch_inner(&batch).await
    }

    /// Direct single-class query: per-student leaves plus the subject
    /// average.
    pub async fn subject(
        &self,
        subject_id: &str,
        batch_id: &str,
    ) -> Result<SubjectNode, StatsError> {
        let Some(batch) = self.directory.batch(batch_id).await? else {
            return Err(StatsError::NotFound(format!("batch {batch_id}")));
        };
        if !batch.is_active {
            return Err(StatsError::NotFound(format!("batch {batch_id} is inactive")));
        }
        let Some(subject) = self.directory.subject(subject_id).await? else {
            return Err(StatsError::NotFound(format!("subject {subject_id}")));
        };
        if !self.directory.is_batch_subject(batch_id, subject_id).await? {
            return Err(StatsError::NotFound(format!(
                "subject {subject_id} is not taught in batch {batch_id}"
            )));
        }
        let students = self.directory.batch_students(batch_id).await?;
        Ok(self.subject_node(&batch, subject, &students).await)
    }

    async fn batch_node(&self, batch: BatchRow) -> BatchNode {
        match self.batch_inner(&batch).await {
            Ok(node) => node,
            Err(e) => {
                warn!("batch {} rollup degraded: {e}", batch.id);
                BatchNode {
                    batch_id: batch.id,
                    name: batch.name,
                    subjects: Vec::new(),
                    stat: None,
                    error: Some(BranchError::from(&e)),
                }
            }
        }
    }

    async fn batch_inner(&self, batch: &BatchRow) -> Result<BatchNode, StatsError> {
        let subjects = self.directory.batch_subjects(&batch.id).await?;
        let students = self.directory.batch_students(&batch.id).await?;

        let nodes: Vec<SubjectNode> = stream::iter(subjects)
            .map(|s| self.subject_node(batch, s, &students))
            .buffered(self.fanout.max(1))
            .collect()
            .await;

        let triples: Vec<(f64, f64, f64)> = nodes
            .iter()
            .filter_map(|n| n.stat.as_ref())
            .map(RollupStat::triple)
            .collect();
        let first_err = nodes.iter().find_map(|n| n.error.as_ref());
        let (stat, error) = aggregate(triples, nodes.len(), first_err);
        Ok(BatchNode {
            batch_id: batch.id.clone(),
            name: batch.name.clone(),
            subjects: nodes,
            stat,
            error,
        })
    }

    async fn subject_node(
        &self,
        batch: &BatchRow,
        subject: SubjectRow,
        students: &[StudentRow],
    ) -> SubjectNode {
        let nodes: Vec<StudentNode> = stream::iter(students)
            .map(|st| self.student_node(&batch.id, &subject.id, st))
            .buffered(self.fanout.max(1))
            .collect()
            .await;

        let triples: Vec<(f64, f64, f64)> = nodes
            .iter()
            .filter_map(|n| n.stat.as_ref())
            .map(|s| {
                (
                    s.lecture_percentage,
                    s.lab_percentage,
                    s.overall_percentage,
                )
            })
            .collect();
        let first_err = nodes.iter().find_map(|n| n.error.as_ref());
        let (stat, error) = aggregate(triples, nodes.len(), first_err);
        SubjectNode {
            subject_id: subject.id,
            name: subject.name,
            students: nodes,
            stat,
            error,
        }
    }

    async fn student_node(
        &self,
        batch_id: &str,
        subject_id: &str,
        student: &StudentRow,
    ) -> StudentNode {
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("rollup semaphore closed");
        match compute_student_stat(self.directory, self.store, &student.id, subject_id, batch_id)
            .await
        {
            Ok(stat) => StudentNode {
                student_id: student.id.clone(),
                name: student.name.clone(),
                stat: Some(stat),
                error: None,
            },
            Err(e) => {
                warn!(
                    "student {} stat degraded in ({subject_id}, {batch_id}): {e}",
                    student.id
                );
                StudentNode {
                    student_id: student.id.clone(),
                    name: student.name.clone(),
                    stat: None,
                    error: Some(BranchError::from(&e)),
                }
            }
        }
    }
}
