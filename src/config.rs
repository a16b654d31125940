use std::time::Duration;

const DEFAULT_MAX_INFLIGHT: usize = 32;
const DEFAULT_DEADLINE_MS: u64 = 30_000;

/// Engine tuning. The workspace itself is selected over IPC; these knobs
/// come from the environment so a deployment can adjust them without a
/// protocol change.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on concurrently in-flight student-level computations
    /// across one query, whatever the tree shape.
    pub max_inflight: usize,
    /// Default per-query deadline. Requests may narrow it, never widen.
    pub query_deadline: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            query_deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let max_inflight = std::env::var("CAMPUSD_MAX_INFLIGHT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .map(|v| v.clamp(1, 256))
            .unwrap_or(DEFAULT_MAX_INFLIGHT);
        let deadline_ms = std::env::var("CAMPUSD_QUERY_DEADLINE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(100, 600_000))
            .unwrap_or(DEFAULT_DEADLINE_MS);
        EngineConfig {
            max_inflight,
            query_deadline: Duration::from_millis(deadline_ms),
        }
    }

    /// Effective deadline for one request: the configured default unless
    /// the request asked for something shorter.
    pub fn deadline_for(&self, requested_ms: Option<u64>) -> Duration {
        match requested_ms {
            Some(ms) => self.query_deadline.min(Duration::from_millis(ms.max(1))),
            None => self.query_deadline,
        }
    }
}
