use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::store::{AttendanceRecord, AttendanceStore, SessionType, StoreError};

/// The countable classes of a (subject, batch, type): the distinct
/// calendar dates on which at least one record was logged. A class with
/// nothing logged yet contributes no session; count 0 is a valid,
/// non-error outcome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCount {
    pub count: usize,
    pub dates: Vec<NaiveDate>,
}

pub fn distinct_dates(records: &[AttendanceRecord]) -> SessionCount {
    let set: BTreeSet<NaiveDate> = records.iter().map(|r| r.date).collect();
    let dates: Vec<NaiveDate> = set.into_iter().collect();
    SessionCount {
        count: dates.len(),
        dates,
    }
}

pub async fn count_sessions(
    store: &dyn AttendanceStore,
    subject_id: &str,
    batch_id: &str,
    session_type: SessionType,
) -> Result<SessionCount, StoreError> {
    let records = store
        .records_for_class(subject_id, batch_id, session_type)
        .await?;
    Ok(distinct_dates(&records))
}

/// Distinct dates on which the student was marked present. Duplicate
/// dates collapse, same as the session denominator.
pub async fn count_present(
    store: &dyn AttendanceStore,
    student_id: &str,
    subject_id: &str,
    batch_id: &str,
    session_type: SessionType,
) -> Result<usize, StoreError> {
    let records = store
        .records_for_student(student_id, subject_id, batch_id, session_type)
        .await?;
    let set: BTreeSet<NaiveDate> = records
        .iter()
        .filter(|r| r.is_present)
        .map(|r| r.date)
        .collect();
    Ok(set.len())
}
