use crate::error::{Result, YeegoError};
use crate::types::{DeviceErrorPayload, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Command sent to a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub id: RequestId,
    pub method: String,
    pub params: Vec<Value>,
}

impl CommandRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Encode as a single `\r\n` terminated line
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push_str("\r\n");
        Ok(line)
    }
}

/// Reply to a command, tied to its request id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DeviceErrorPayload>,
}

/// Anything a device can send on its control socket
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Reply(CommandReply),
    Notification {
        method: String,
        params: Map<String, Value>,
    },
}

#[derive(Deserialize)]
struct RawMessage {
    id: Option<RequestId>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Vec<Value>>,
    error: Option<DeviceErrorPayload>,
}

impl Incoming {
    /// Parse one line received from a device
    pub fn parse(line: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(line)?;

        if let Some(id) = raw.id {
            if raw.result.is_some() || raw.error.is_some() {
                return Ok(Incoming::Reply(CommandReply {
                    id,
                    result: raw.result,
                    error: raw.error,
                }));
            }
        }

        match raw.method {
            Some(method) => {
                let params = match raw.params {
                    Some(Value::Object(map)) => map,
                    None | Some(Value::Null) => Map::new(),
                    Some(other) => {
                        return Err(YeegoError::Protocol(format!(
                            "notification params are not an object: {}",
                            other
                        )))
                    }
                };
                Ok(Incoming::Notification { method, params })
            }
            None => Err(YeegoError::Protocol(format!("unrecognised message: {}", line))),
        }
    }
}
