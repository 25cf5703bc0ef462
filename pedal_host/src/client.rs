use pedal_protocol::{Bank, RpcMessage, RpcRequest, CALL_ID};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::transport::{RpcTransport, TransportError};

/// The engine debounces preset switches; queries issued immediately after a
/// change can read stale values. Not a correctness dependency.
const SETTLE_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("rpc message has neither params nor result")]
    MessageShape,
    #[error("call issued while another call is outstanding")]
    CallInFlight,
    #[error("unexpected {method} result: {detail}")]
    BadResult { method: String, detail: String },
    #[error("request encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ProtocolError {
    fn bad_result(method: &str, detail: impl ToString) -> Self {
        Self::BadResult {
            method: method.to_string(),
            detail: detail.to_string(),
        }
    }
}

/// JSON-RPC session with the effects engine. Strictly one outstanding call at
/// a time; the invariant is enforced here rather than assumed.
pub struct RpcClient<S> {
    transport: RpcTransport<S>,
    call_pending: bool,
}

impl RpcClient<TcpStream> {
    pub fn connect(addr: &str) -> Result<Self, TransportError> {
        Ok(Self::new(RpcTransport::connect(addr)?))
    }
}

impl<S: Read + Write> RpcClient<S> {
    pub fn new(transport: RpcTransport<S>) -> Self {
        Self {
            transport,
            call_pending: false,
        }
    }

    /// Sends a fire-and-forget notification. No reply is expected and none is
    /// waited for.
    pub fn notify(&mut self, method: &str, params: Vec<Value>) -> Result<(), ProtocolError> {
        self.send_request(&RpcRequest::notification(method, params))
    }

    /// Issues a call and blocks until its result arrives. Notifications
    /// delivered in the meantime are logged and dropped.
    pub fn call(&mut self, method: &str, params: Vec<Value>) -> Result<Value, ProtocolError> {
        if self.call_pending {
            return Err(ProtocolError::CallInFlight);
        }
        self.call_pending = true;
        let outcome = self.call_inner(method, params);
        self.call_pending = false;
        outcome
    }

    fn call_inner(&mut self, method: &str, params: Vec<Value>) -> Result<Value, ProtocolError> {
        self.send_request(&RpcRequest::call(method, params))?;
        loop {
            match self.receive()? {
                Some(RpcMessage::Result { id, result }) => {
                    if id != CALL_ID {
                        warn!(%id, method, "result id does not match the outstanding call");
                    }
                    return Ok(result);
                }
                Some(RpcMessage::Notification { method: name, params }) => {
                    debug!(method = %name, ?params, "notification while awaiting result; dropped");
                }
                None => {}
            }
        }
    }

    /// Reads and classifies one framed message. An undecodable line is logged
    /// and dropped (`None`); a decodable object that is neither a result nor
    /// a notification violates the dialect and is fatal.
    pub fn receive(&mut self) -> Result<Option<RpcMessage>, ProtocolError> {
        let line = self.transport.receive_line()?;
        let value: Value = match serde_json::from_slice(&line) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(&line),
                    "dropping undecodable rpc line"
                );
                return Ok(None);
            }
        };
        match RpcMessage::classify(value) {
            Ok(message) => Ok(message),
            Err(e) => {
                error!(error = %e, "rpc peer broke the dialect");
                Err(ProtocolError::MessageShape)
            }
        }
    }

    pub fn get(&mut self, id: &str) -> Result<Value, ProtocolError> {
        self.call("get", vec![Value::from(id)])
    }

    pub fn set(&mut self, id: &str, value: Value) -> Result<(), ProtocolError> {
        self.notify("set", vec![Value::from(id), value])
    }

    pub fn setpreset(&mut self, bank: &str, preset: &str) -> Result<(), ProtocolError> {
        self.notify("setpreset", vec![Value::from(bank), Value::from(preset)])
    }

    /// Fetches the engine's bank listing.
    pub fn banks(&mut self) -> Result<Vec<Bank>, ProtocolError> {
        let result = self.call("banks", Vec::new())?;
        serde_json::from_value(result).map_err(|e| ProtocolError::bad_result("banks", e))
    }

    /// Reads the bank/preset the engine currently considers active.
    pub fn current_preset(&mut self) -> Result<(String, String), ProtocolError> {
        thread::sleep(SETTLE_DELAY);
        let bank = self.get_scalar("system.current_bank")?;
        let preset = self.get_scalar("system.current_preset")?;
        Ok((bank, preset))
    }

    fn get_scalar(&mut self, id: &str) -> Result<String, ProtocolError> {
        let result = self.get(id)?;
        result
            .get(id)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProtocolError::bad_result("get", format!("no string {id} in {result}")))
    }

    /// Enumerates the engine's tunable parameter ids, sorted. The result is an
    /// interleaved sequence of type-tag/descriptor pairs; `Enum` descriptors
    /// nest under `IntParameter` and `FloatEnum` under `FloatParameter`.
    /// Non-preset parameters are skipped except the two `system.current_*`
    /// cursors.
    pub fn parameter_list(&mut self) -> Result<Vec<String>, ProtocolError> {
        let result = self.call("parameterlist", Vec::new())?;
        let Value::Array(entries) = result else {
            return Err(ProtocolError::bad_result("parameterlist", "not an array"));
        };

        let mut ids = Vec::new();
        for pair in entries.chunks(2) {
            let [tag, descriptor] = pair else { break };
            let inner = match tag.as_str() {
                Some("Enum") => descriptor.get("IntParameter"),
                Some("FloatEnum") => descriptor.get("FloatParameter"),
                _ => Some(descriptor),
            };
            let Some(param) = inner.and_then(|d| d.get("Parameter")) else {
                continue;
            };
            let Some(id) = param.get("id").and_then(Value::as_str) else {
                continue;
            };
            if param.get("non_preset").is_some()
                && id != "system.current_bank"
                && id != "system.current_preset"
            {
                continue;
            }
            ids.push(id.to_string());
        }
        ids.sort();
        Ok(ids)
    }

    /// Subscribes to the engine's notification stream and prints every
    /// message. This is an exclusive operating mode: the call/notify cycle
    /// must not be used on this session afterwards.
    pub fn listen(&mut self) -> Result<(), ProtocolError> {
        self.notify("listen", vec![Value::from("all")])?;
        loop {
            match self.receive()? {
                Some(RpcMessage::Notification { method, params }) => {
                    println!("{method} {}", Value::Array(params));
                }
                Some(RpcMessage::Result { id, .. }) => {
                    debug!(%id, "unsolicited result in listen mode; ignored");
                }
                None => {}
            }
        }
    }

    fn send_request(&mut self, request: &RpcRequest) -> Result<(), ProtocolError> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        self.transport.send(&line)?;
        Ok(())
    }
}
