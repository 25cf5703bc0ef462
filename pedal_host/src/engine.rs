use std::net::TcpStream;
use std::process::Command;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::client::RpcClient;

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("effects engine at {addr} unreachable after {attempts} attempts")]
    Unreachable { addr: String, attempts: u32 },
    #[error("failed to spawn engine command {cmd:?}: {source}")]
    Spawn {
        cmd: String,
        source: std::io::Error,
    },
    #[error("engine command is empty")]
    EmptyCommand,
}

/// Connects to the engine's RPC port. When nothing is listening and a launch
/// command is configured, the engine is spawned and the connection retried on
/// a fixed backoff for a bounded number of attempts.
pub fn connect_or_launch(
    addr: &str,
    launch: Option<&str>,
) -> Result<RpcClient<TcpStream>, EngineError> {
    if let Ok(client) = RpcClient::connect(addr) {
        return Ok(client);
    }

    if let Some(cmd) = launch {
        info!(cmd, "effects engine not reachable; launching it");
        spawn_engine(cmd)?;
    }

    for attempt in 1..=CONNECT_ATTEMPTS {
        thread::sleep(CONNECT_BACKOFF);
        match RpcClient::connect(addr) {
            Ok(client) => return Ok(client),
            Err(e) => warn!(attempt, error = %e, "engine connect failed"),
        }
    }

    Err(EngineError::Unreachable {
        addr: addr.to_string(),
        attempts: CONNECT_ATTEMPTS,
    })
}

/// Spawns the engine detached; the child owns its own lifetime and is reaped
/// by the OS, not by us.
fn spawn_engine(cmd: &str) -> Result<(), EngineError> {
    let mut parts = cmd.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(EngineError::EmptyCommand);
    };
    Command::new(program)
        .args(parts)
        .spawn()
        .map_err(|source| EngineError::Spawn {
            cmd: cmd.to_string(),
            source,
        })?;
    Ok(())
}
