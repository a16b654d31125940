use std::path::PathBuf;

use serde::Deserialize;

use crate::config::EngineConfig;
use crate::stats::StatsEngine;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Caller identity, verified upstream by the ERP's auth layer. This
/// daemon trusts the pair; it only enforces scope.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "staff" => Some(Role::Staff),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub engine: Option<StatsEngine>,
    pub config: EngineConfig,
}
