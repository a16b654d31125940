mod config;
mod db;
mod error;
mod ipc;
mod stats;
mod store;

use std::io::{self, BufRead, Write};

use log::info;

use crate::config::EngineConfig;

fn main() {
    // Logs go to stderr; stdout is the protocol channel.
    env_logger::init();

    let config = EngineConfig::from_env();
    info!(
        "campusd {} starting (max_inflight={}, query_deadline={:?})",
        env!("CARGO_PKG_VERSION"),
        config.max_inflight,
        config.query_deadline
    );

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    let mut state = ipc::AppState {
        workspace: None,
        engine: None,
        config,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; ignore.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = runtime.block_on(ipc::handle_request(&mut state, req));
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
