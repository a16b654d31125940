use log::info;
use serde_json::json;

use crate::error::StatsError;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    forbidden, get_required_bool, get_required_str, parse_caller, HandlerErr,
};
use crate::ipc::types::{AppState, Request, Role};
use crate::stats::StatsEngine;

/// The one mutation entry point. Updates exactly one record's presence
/// flag and answers with the recomputed stat for that student's
/// (subject, batch) scope, never a tree rollup.
async fn set_record(
    engine: &StatsEngine,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let caller = parse_caller(params)?;
    let record_id = get_required_str(params, "recordId")?;
    let is_present = get_required_bool(params, "isPresent")?;

    if caller.role == Role::Student {
        return Err(forbidden("attendance records are staff-only"));
    }

    // Scope check needs the record's class; fetch before writing.
    let record = engine.record(&record_id).await?;
    if caller.role == Role::Staff
        && !engine
            .directory()
            .is_staff_assigned(&caller.id, &record.batch_id, &record.subject_id)
            .await
            .map_err(StatsError::from)?
    {
        return Err(forbidden(
            "staff may only edit records of classes they teach or coordinate",
        ));
    }

    let stat = engine.toggle_record(&record_id, is_present).await?;
    info!(
        "record {record_id} set is_present={is_present} by {} ({:?})",
        caller.id, caller.role
    );
    Ok(json!({
        "recordId": record_id,
        "subjectId": record.subject_id,
        "batchId": record.batch_id,
        "stat": stat,
    }))
}

async fn handle_set_record(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(engine) = state.engine.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match set_record(engine, &req.params).await {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.setRecord" => Some(handle_set_record(state, req).await),
        _ => None,
    }
}
