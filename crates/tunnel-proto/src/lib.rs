//! Wire shape exchanged between `beach-tunnel` and the PTY bridge.
//! Every websocket text frame carries exactly one [`TunnelMessage`] encoded
//! as JSON. Clients are free to render the same shape from a text template,
//! so only the field names here are load-bearing.

use serde::{Deserialize, Serialize};

/// Dispatch tag for a frame. The bridge emits terminal output with an
/// empty operation string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "stdin")]
    Stdin,
    #[serde(rename = "resize")]
    Resize,
    #[default]
    #[serde(rename = "")]
    Output,
    #[serde(other, skip_serializing)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TunnelMessage {
    #[serde(default)]
    pub operation: Operation,
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cols: Option<u16>,
}

impl TunnelMessage {
    pub fn output(data: impl Into<String>) -> Self {
        Self {
            operation: Operation::Output,
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn stdin(data: impl Into<String>) -> Self {
        Self {
            operation: Operation::Stdin,
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn resize(rows: u16, cols: u16) -> Self {
        Self {
            operation: Operation::Resize,
            data: String::new(),
            rows: Some(rows),
            cols: Some(cols),
        }
    }

    /// Data that should be written to the PTY, if any. The bridge treats a
    /// missing operation the same as `stdin`.
    pub fn input(&self) -> Option<&str> {
        match self.operation {
            Operation::Stdin | Operation::Output => Some(self.data.as_str()),
            Operation::Resize | Operation::Unknown => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
