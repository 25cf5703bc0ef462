use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Correlation id used for every call. The engine dialect is strictly
/// single-outstanding-call, so a fixed id is sufficient.
pub const CALL_ID: &str = "1";

const JSONRPC_VERSION: &str = "2.0";

/// Outbound JSON-RPC 2.0 envelope. A request with an id expects exactly one
/// result; a request without one is a fire-and-forget notification.
#[derive(Serialize, Debug, Clone)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    pub params: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'static str>,
}

impl<'a> RpcRequest<'a> {
    pub fn call(method: &'a str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: Some(CALL_ID),
        }
    }

    pub fn notification(method: &'a str, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method,
            params,
            id: None,
        }
    }
}

/// One inbound wire message, classified once at the parse boundary and
/// consumed as a closed sum afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcMessage {
    Notification { method: String, params: Vec<Value> },
    Result { id: String, result: Value },
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("rpc message has neither params nor result: {0}")]
    UnknownShape(Value),
    #[error("rpc message is not an object: {0}")]
    NotAnObject(Value),
}

impl RpcMessage {
    /// Classifies one decoded wire object. A `params` key marks a
    /// notification (an empty array is a no-op and classifies to `None`); a
    /// `result` key marks the reply to the outstanding call. Anything else is
    /// a violation of the engine dialect.
    pub fn classify(value: Value) -> Result<Option<RpcMessage>, ClassifyError> {
        let Value::Object(mut map) = value else {
            return Err(ClassifyError::NotAnObject(value));
        };

        if let Some(params) = map.remove("params") {
            let params = match params {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            if params.is_empty() {
                return Ok(None);
            }
            let method = map
                .remove("method")
                .and_then(|m| m.as_str().map(str::to_string))
                .unwrap_or_default();
            return Ok(Some(RpcMessage::Notification { method, params }));
        }

        if let Some(result) = map.remove("result") {
            let id = match map.remove("id") {
                Some(Value::String(s)) => s,
                Some(Value::Number(n)) => n.to_string(),
                _ => String::new(),
            };
            return Ok(Some(RpcMessage::Result { id, result }));
        }

        Err(ClassifyError::UnknownShape(Value::Object(map)))
    }
}

/// One entry of the engine's `banks` listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Bank {
    pub name: String,
    #[serde(default)]
    pub presets: Vec<String>,
}

/// Navigation request encoded in a pedal frame by the controller firmware.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    #[serde(rename = "nxbk")]
    NextBank,
    #[serde(rename = "pxbk")]
    PrevBank,
    #[serde(rename = "nxps")]
    NextPreset,
    #[serde(rename = "pxps")]
    PrevPreset,
}

/// One decoded hardware frame: raw pedal positions plus an optional
/// navigation action. Ephemeral, one per serial read.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PedalFrame {
    #[serde(default)]
    pub pedals: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_action: Option<UiAction>,
}

/// Label shown on the controller for a pedal slot with no mapped parameter.
pub const NO_DATA_LABEL: &str = "NO_DAT";

/// Display entry for one pedal slot in the outbound status frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PedalStatus {
    pub name: String,
    pub value: Value,
}

impl PedalStatus {
    pub fn placeholder() -> Self {
        Self {
            name: NO_DATA_LABEL.to_string(),
            value: Value::from(0),
        }
    }
}

/// Human-readable state pushed back to the controller after each frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusFrame {
    pub pedals_onoff: Vec<PedalStatus>,
    pub bank: String,
    pub preset: String,
}
