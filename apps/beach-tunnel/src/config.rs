use clap::ValueEnum;
use thiserror::Error;

use crate::protocol::{
    DEFAULT_DATA_TEMPLATE, DEFAULT_RESIZE_TEMPLATE, DEFAULT_UPLOAD_TEMPLATE, MessageCodec,
    TemplateError,
};

pub const DEFAULT_MAX_FRAME_BYTES: usize = 4159;
pub const DEFAULT_PROMPT: &str = "> ";
pub const DEFAULT_OUTPUT_BUFFER: usize = 1024;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),
    #[error(
        "max frame size {max} leaves no room for payload (template overhead is {overhead} bytes)"
    )]
    FrameTooSmall { max: usize, overhead: usize },
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("prompt is {prompt} bytes but the output buffer only holds {bound}")]
    PromptExceedsBuffer { prompt: usize, bound: usize },
    #[error("invalid websocket url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Line terminator appended to every command sent to the remote shell.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    #[default]
    Cr,
    Lf,
}

impl Newline {
    pub fn as_str(self) -> &'static str {
        match self {
            Newline::Cr => "\r",
            Newline::Lf => "\n",
        }
    }
}

/// Everything a session needs to frame commands and recognise their
/// completion. Built once at connect time and never mutated.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    codec: MessageCodec,
    newline: Newline,
    max_frame_bytes: usize,
    prompt: String,
    suppress_echo: bool,
    output_buffer: usize,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    pub fn codec(&self) -> &MessageCodec {
        &self.codec
    }

    pub fn newline(&self) -> Newline {
        self.newline
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn suppress_echo(&self) -> bool {
        self.suppress_echo
    }

    pub fn output_buffer(&self) -> usize {
        self.output_buffer
    }
}

/// Builder for [`SessionConfig`]; `build` performs all validation.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    upload_template: Option<String>,
    data_template: Option<String>,
    resize_template: Option<String>,
    newline: Option<Newline>,
    max_frame_bytes: Option<usize>,
    prompt: Option<String>,
    suppress_echo: Option<bool>,
    output_buffer: Option<usize>,
}

impl SessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_template(mut self, template: impl Into<String>) -> Self {
        self.upload_template = Some(template.into());
        self
    }

    pub fn data_template(mut self, template: impl Into<String>) -> Self {
        self.data_template = Some(template.into());
        self
    }

    pub fn resize_template(mut self, template: impl Into<String>) -> Self {
        self.resize_template = Some(template.into());
        self
    }

    pub fn newline(mut self, newline: Newline) -> Self {
        self.newline = Some(newline);
        self
    }

    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = Some(max);
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn suppress_echo(mut self, suppress: bool) -> Self {
        self.suppress_echo = Some(suppress);
        self
    }

    pub fn output_buffer(mut self, bound: usize) -> Self {
        self.output_buffer = Some(bound);
        self
    }

    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        let codec = MessageCodec::new(
            self.upload_template
                .as_deref()
                .unwrap_or(DEFAULT_UPLOAD_TEMPLATE),
            self.data_template.as_deref().unwrap_or(DEFAULT_DATA_TEMPLATE),
            self.resize_template
                .as_deref()
                .unwrap_or(DEFAULT_RESIZE_TEMPLATE),
        )?;

        let max_frame_bytes = self.max_frame_bytes.unwrap_or(DEFAULT_MAX_FRAME_BYTES);
        let overhead = codec
            .overhead()
            .map_err(|err| ConfigError::Template(err.0))?;
        if max_frame_bytes <= overhead {
            return Err(ConfigError::FrameTooSmall {
                max: max_frame_bytes,
                overhead,
            });
        }

        let prompt = self.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
        if prompt.is_empty() {
            return Err(ConfigError::EmptyPrompt);
        }
        let output_buffer = self.output_buffer.unwrap_or(DEFAULT_OUTPUT_BUFFER);
        if prompt.len() > output_buffer {
            return Err(ConfigError::PromptExceedsBuffer {
                prompt: prompt.len(),
                bound: output_buffer,
            });
        }

        Ok(SessionConfig {
            codec,
            newline: self.newline.unwrap_or_default(),
            max_frame_bytes,
            prompt,
            suppress_echo: self.suppress_echo.unwrap_or(true),
            output_buffer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_client() {
        let config = SessionConfig::builder().build().expect("defaults are valid");
        assert_eq!(config.max_frame_bytes(), 4159);
        assert_eq!(config.prompt(), "> ");
        assert_eq!(config.newline().as_str(), "\r");
        assert_eq!(config.output_buffer(), 1024);
        assert!(config.suppress_echo());
    }

    #[test]
    fn frame_size_must_exceed_template_overhead() {
        let err = SessionConfig::builder()
            .upload_template("0123456789{{.data}}")
            .max_frame_bytes(10)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::FrameTooSmall { max: 10, overhead: 10 });

        SessionConfig::builder()
            .upload_template("0123456789{{.data}}")
            .max_frame_bytes(11)
            .build()
            .expect("one byte of payload is enough");
    }

    #[test]
    fn malformed_templates_fail_at_build_time() {
        let err = SessionConfig::builder()
            .upload_template(r#"{"data":"{{.data"}"#)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Template(TemplateError::Unterminated(_))));

        let err = SessionConfig::builder()
            .resize_template("{{ rows }}")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Template(TemplateError::UnsupportedAction(_))
        ));
    }

    #[test]
    fn prompt_must_fit_the_output_buffer() {
        assert_eq!(
            SessionConfig::builder().prompt("").build().unwrap_err(),
            ConfigError::EmptyPrompt
        );
        assert_eq!(
            SessionConfig::builder()
                .prompt("long-prompt$ ")
                .output_buffer(4)
                .build()
                .unwrap_err(),
            ConfigError::PromptExceedsBuffer { prompt: 13, bound: 4 }
        );
    }
}
