use std::future::Future;
use std::time::Duration;

use log::debug;
use serde_json::json;
use tokio::time::timeout;

use crate::error::StatsError;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    forbidden, get_optional_str, get_optional_u64, get_required_str, parse_caller, HandlerErr,
};
use crate::ipc::types::{AppState, Request, Role};
use crate::stats::StatsEngine;
use crate::store::SessionType;

/// Runs one aggregation under the request deadline. The future is
/// dropped on expiry, which cancels every in-flight branch; rollups are
/// read-only so nothing needs rolling back.
async fn bounded<T>(
    deadline: Duration,
    fut: impl Future<Output = Result<T, StatsError>>,
) -> Result<T, HandlerErr> {
    match timeout(deadline, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(StatsError::DeadlineExceeded.into()),
    }
}

/// Statistics Query Dispatcher. Scope precedence: student, class
/// (subject+batch), batch, course, admin overview. Access control runs
/// before any aggregation; an unauthorized request never reaches the
/// rollup walker.
async fn stats_query(
    engine: &StatsEngine,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = parse_caller(params)?;
    let student_id = get_optional_str(params, "studentId")?;
    let subject_id = get_optional_str(params, "subjectId")?;
    let batch_id = get_optional_str(params, "batchId")?;
    let course_id = get_optional_str(params, "courseId")?;
    let deadline = engine
        .config()
        .deadline_for(get_optional_u64(params, "deadlineMs")?);

    if let Some(student_id) = student_id {
        match caller.role {
            Role::Student => {
                if caller.id != student_id {
                    return Err(forbidden("students may only query their own statistics"));
                }
            }
            Role::Staff => {
                let (Some(subject), Some(batch)) = (subject_id.as_deref(), batch_id.as_deref())
                else {
                    return Err(forbidden(
                        "staff must name a subjectId and batchId they are assigned to",
                    ));
                };
                if !engine
                    .directory()
                    .is_staff_assigned(&caller.id, batch, subject)
                    .await
                    .map_err(StatsError::from)?
                {
                    return Err(forbidden(
                        "staff may only query classes they teach or coordinate",
                    ));
                }
            }
            Role::Admin => {}
        }

        if let Some(subject_id) = subject_id {
            let batch_id = match batch_id {
                Some(b) => b,
                None => engine.resolve_batch(&student_id, &subject_id).await?,
            };
            debug!(
                "stats query: student {student_id} in ({subject_id}, {batch_id}) for {:?}",
                caller.role
            );
            let stat = bounded(
                deadline,
                engine.student_stat(&student_id, &subject_id, &batch_id),
            )
            .await?;
            return Ok(json!({
                "scope": "studentSubject",
                "subjectId": subject_id,
                "batchId": batch_id,
                "stat": stat,
            }));
        }

        debug!("stats query: overview for student {student_id}");
        let mut overview = bounded(deadline, engine.student_overview(&student_id)).await?;
        if let Some(batch_id) = batch_id {
            overview.entries.retain(|e| e.batch_id == batch_id);
        }
        return Ok(json!({ "scope": "student", "overview": overview }));
    }

    if let (Some(subject_id), Some(batch_id)) = (subject_id.as_deref(), batch_id.as_deref()) {
        match caller.role {
            Role::Student => {
                return Err(forbidden("students may only query their own statistics"))
            }
            Role::Staff => {
                if !engine
                    .directory()
                    .is_staff_assigned(&caller.id, batch_id, subject_id)
                    .await
                    .map_err(StatsError::from)?
                {
                    return Err(forbidden(
                        "staff may only query classes they teach or coordinate",
                    ));
                }
            }
            Role::Admin => {}
        }
        debug!("stats query: class rollup ({subject_id}, {batch_id})");
        let node = bounded(deadline, engine.rollup_subject(subject_id, batch_id)).await?;
        return Ok(json!({ "scope": "class", "subject": node }));
    }

    if subject_id.is_some() {
        return Err(HandlerErr::bad_params("subjectId requires batchId"));
    }

    if let Some(batch_id) = batch_id.as_deref() {
        match caller.role {
            Role::Student => {
                return Err(forbidden("students may only query their own statistics"))
            }
            Role::Staff => {
                if !engine
                    .directory()
                    .is_batch_coordinator(&caller.id, batch_id)
                    .await
                    .map_err(StatsError::from)?
                {
                    return Err(forbidden(
                        "batch-level statistics require a coordinator assignment",
                    ));
                }
            }
            Role::Admin => {}
        }
        debug!("stats query: batch rollup {batch_id}");
        let node = bounded(deadline, engine.rollup_batch(batch_id)).await?;
        return Ok(json!({ "scope": "batch", "batch": node }));
    }

    if let Some(course_id) = course_id.as_deref() {
        if caller.role != Role::Admin {
            return Err(forbidden("course rollups are admin-only"));
        }
        debug!("stats query: course rollup {course_id}");
        let node = bounded(deadline, engine.rollup_course(course_id)).await?;
        return Ok(json!({ "scope": "course", "course": node }));
    }

    if caller.role != Role::Admin {
        return Err(HandlerErr::bad_params(
            "supply studentId, subjectId+batchId, batchId, or courseId",
        ));
    }
    debug!("stats query: all-courses overview");
    let courses = bounded(deadline, engine.rollup_all_courses()).await?;
    Ok(json!({ "scope": "courses", "courses": courses }))
}

/// Session Counter surface: the distinct dates that form the percentage
/// denominator for one (subject, batch, type).
async fn sessions_query(
    engine: &StatsEngine,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = parse_caller(params)?;
    let subject_id = get_required_str(params, "subjectId")?;
    let batch_id = get_required_str(params, "batchId")?;
    let raw_type = get_required_str(params, "sessionType")?;
    let session_type = SessionType::parse(&raw_type)
        .ok_or_else(|| HandlerErr::bad_params("sessionType must be lecture or lab"))?;
    let deadline = engine
        .config()
        .deadline_for(get_optional_u64(params, "deadlineMs")?);

    match caller.role {
        Role::Student => return Err(forbidden("session listings are staff-only")),
        Role::Staff => {
            if !engine
                .directory()
                .is_staff_assigned(&caller.id, &batch_id, &subject_id)
                .await
                .map_err(StatsError::from)?
            {
                return Err(forbidden(
                    "staff may only query classes they teach or coordinate",
                ));
            }
        }
        Role::Admin => {}
    }

    let sessions = bounded(
        deadline,
        engine.count_sessions(&subject_id, &batch_id, session_type),
    )
    .await?;
    Ok(json!({
        "subjectId": subject_id,
        "batchId": batch_id,
        "sessionType": session_type,
        "count": sessions.count,
        "dates": sessions.dates,
    }))
}

async fn handle_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match stats_query(engine, &req.params).await {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

async fn handle_sessions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match sessions_query(engine, &req.params).await {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.stats" => Some(handle_stats(state, req).await),
        "attendance.sessions" => Some(handle_sessions(state, req).await),
        _ => None,
    }
}
