use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use super::template::{Template, TemplateError, Value};

pub const DEFAULT_UPLOAD_TEMPLATE: &str = r#"{"operation":"stdin","data":"{{.data}}"}"#;
pub const DEFAULT_DATA_TEMPLATE: &str = "{{.data}}";
pub const DEFAULT_RESIZE_TEMPLATE: &str =
    r#"{"operation":"resize","rows":{{.rows}},"cols":{{.cols}}}"#;

/// Rendering failed after the templates were validated. This indicates a
/// defect rather than bad input, so callers escalate instead of retrying.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("frame encoding failed: {0}")]
pub struct CodecError(#[from] pub TemplateError);

/// Frames outbound payloads and recovers text from inbound frames.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    upload: Template,
    data: Template,
    resize: Template,
}

impl MessageCodec {
    /// Validates all three templates up front.
    pub fn new(upload: &str, data: &str, resize: &str) -> Result<Self, TemplateError> {
        let upload = Template::parse(upload)?.require("data")?;
        let data = Template::parse(data)?;
        let resize = Template::parse(resize)?;
        Ok(Self {
            upload,
            data,
            resize,
        })
    }

    pub fn encode_stdin(&self, data: &str) -> Result<String, CodecError> {
        Ok(self.upload.render(&[("data", Value::Str(data))])?)
    }

    pub fn encode_resize(&self, rows: u16, cols: u16) -> Result<String, CodecError> {
        Ok(self.resize.render(&[
            ("rows", Value::Num(u64::from(rows))),
            ("cols", Value::Num(u64::from(cols))),
        ])?)
    }

    /// Bytes the upload template adds around an empty payload.
    pub fn overhead(&self) -> Result<usize, CodecError> {
        self.encode_stdin("").map(|frame| frame.len())
    }

    pub fn decode(&self, frame: &[u8]) -> String {
        let text = String::from_utf8_lossy(frame);
        match serde_json::from_str::<JsonValue>(&text) {
            Ok(JsonValue::Object(fields)) => {
                if let Some(JsonValue::String(data)) = fields.get("data") {
                    return data.clone();
                }
                self.fill_from_fields(&fields)
            }
            _ => self
                .data
                .extract(&text)
                .unwrap_or_else(|| text.into_owned()),
        }
    }

    fn fill_from_fields(&self, fields: &Map<String, JsonValue>) -> String {
        let rendered: Vec<(&str, String)> = fields
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    JsonValue::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.as_str(), text)
            })
            .collect();
        let values: Vec<(&str, Value<'_>)> = rendered
            .iter()
            .map(|(key, text)| (*key, Value::Str(text.as_str())))
            .collect();
        self.data.fill(&values)
    }
}
