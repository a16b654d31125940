use serde::Serialize;

use crate::error::StatsError;
use crate::stats::composite::{percentage, weighted_overall};
use crate::stats::sessions::{count_present, count_sessions};
use crate::store::{AttendanceStore, OrgDirectory, SessionType};

/// Computed fresh per query; never persisted. A pure function of the
/// record set at query time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendanceStat {
    pub student_id: String,
    pub total_lectures: u32,
    pub lectures_attended: u32,
    pub lecture_percentage: f64,
    pub total_labs: u32,
    pub labs_attended: u32,
    pub lab_percentage: f64,
    pub overall_percentage: f64,
}

/// Validates the (subject, batch) scope and the student's membership,
/// then derives per-type attendance over the session denominators.
pub async fn compute_student_stat(
    directory: &dyn OrgDirectory,
    store: &dyn AttendanceStore,
    student_id: &str,
    subject_id: &str,
    batch_id: &str,
) -> Result<StudentAttendanceStat, StatsError> {
    let Some(batch) = directory.batch(batch_id).await? else {
        return Err(StatsError::NotFound(format!("batch {batch_id}")));
    };
    if !batch.is_active {
        return Err(StatsError::NotFound(format!("batch {batch_id} is inactive")));
    }
    if !directory.is_batch_subject(batch_id, subject_id).await? {
        return Err(StatsError::NotFound(format!(
            "subject {subject_id} is not taught in batch {batch_id}"
        )));
    }
    if !directory.is_batch_member(batch_id, student_id).await? {
        return Err(StatsError::InvalidScope(format!(
            "student {student_id} is not a member of batch {batch_id}"
        )));
    }

    let mut totals = [0u32; 2];
    let mut attended = [0u32; 2];
    for (i, tp) in SessionType::ALL.into_iter().enumerate() {
        let sessions = count_sessions(store, subject_id, batch_id, tp).await?;
        totals[i] = sessions.count as u32;
        attended[i] = count_present(store, student_id, subject_id, batch_id, tp).await? as u32;
    }
    let [total_lectures, total_labs] = totals;
    let [lectures_attended, labs_attended] = attended;

    Ok(StudentAttendanceStat {
        student_id: student_id.to_string(),
        total_lectures,
        lectures_attended,
        lecture_percentage: percentage(lectures_attended, total_lectures),
        total_labs,
        labs_attended,
        lab_percentage: percentage(labs_attended, total_labs),
        overall_percentage: weighted_overall(
            total_lectures,
            lectures_attended,
            total_labs,
            labs_attended,
        ),
    })
}
