use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser};

use crate::config::{
    ConfigError, DEFAULT_MAX_FRAME_BYTES, DEFAULT_OUTPUT_BUFFER, DEFAULT_PROMPT, Newline,
    SessionConfig,
};
use crate::protocol::{DEFAULT_DATA_TEMPLATE, DEFAULT_RESIZE_TEMPLATE, DEFAULT_UPLOAD_TEMPLATE};
use crate::telemetry::logging::{LogConfig, LogLevel};
use crate::terminal::error::CliError;
use crate::transport::{WebSocketConfig, websocket::config::DEFAULT_HANDSHAKE_TIMEOUT};

#[derive(Parser, Debug)]
#[command(
    name = "beach-tunnel",
    about = "🏖️  Drive a remote shell through a websocket text tunnel",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "BEACH_TUNNEL_URL",
        value_name = "URL",
        help = "Websocket endpoint of the remote shell (ws:// or wss://)"
    )]
    pub url: String,

    #[command(flatten)]
    pub templates: TemplateArgs,

    #[arg(
        long,
        value_enum,
        default_value_t = Newline::Cr,
        help = "Line terminator appended to each command"
    )]
    pub newline: Newline,

    #[arg(
        long = "max",
        value_name = "BYTES",
        default_value_t = DEFAULT_MAX_FRAME_BYTES,
        help = "Largest frame the remote accepts"
    )]
    pub max_frame_bytes: usize,

    #[arg(
        long,
        default_value = DEFAULT_PROMPT,
        help = "Prompt that marks the end of command output"
    )]
    pub prompt: String,

    #[arg(
        long = "buffer",
        value_name = "BYTES",
        default_value_t = DEFAULT_OUTPUT_BUFFER,
        help = "Trailing output kept for prompt and echo matching"
    )]
    pub output_buffer: usize,

    #[arg(long, help = "The remote does not echo input back")]
    pub no_echo: bool,

    #[arg(long, help = "Keep the remote prompt instead of setting it on connect")]
    pub skip_handshake: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Treat a silent remote as finished after this many seconds"
    )]
    pub read_timeout: Option<f64>,

    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = DEFAULT_HANDSHAKE_TIMEOUT.as_secs_f64(),
        help = "Websocket handshake timeout"
    )]
    pub handshake_timeout: f64,

    #[arg(long, requires = "cols", help = "Terminal rows to announce after connecting")]
    pub rows: Option<u16>,

    #[arg(long, requires = "rows", help = "Terminal columns to announce after connecting")]
    pub cols: Option<u16>,

    #[arg(long, help = "Log every frame (same as --log-level trace)")]
    pub debug: bool,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct TemplateArgs {
    #[arg(
        long = "up",
        value_name = "TEMPLATE",
        default_value = DEFAULT_UPLOAD_TEMPLATE,
        help = "Upstream frame template; must reference {{.data}}"
    )]
    pub upload: String,

    #[arg(
        long = "data",
        value_name = "TEMPLATE",
        default_value = DEFAULT_DATA_TEMPLATE,
        help = "Template that extracts output from downstream frames"
    )]
    pub data: String,

    #[arg(
        long = "resize",
        value_name = "TEMPLATE",
        default_value = DEFAULT_RESIZE_TEMPLATE,
        help = "Resize frame template; may reference {{.rows}} and {{.cols}}"
    )]
    pub resize: String,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "BEACH_TUNNEL_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "BEACH_TUNNEL_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}

impl Cli {
    pub fn log_config(&self) -> LogConfig {
        let mut config = self.logging.to_config();
        if self.debug {
            config.level = LogLevel::Trace;
        }
        config
    }

    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        SessionConfig::builder()
            .upload_template(&self.templates.upload)
            .data_template(&self.templates.data)
            .resize_template(&self.templates.resize)
            .newline(self.newline)
            .max_frame_bytes(self.max_frame_bytes)
            .prompt(&self.prompt)
            .suppress_echo(!self.no_echo)
            .output_buffer(self.output_buffer)
            .build()
    }

    pub fn websocket_config(&self) -> Result<WebSocketConfig, CliError> {
        let read_timeout = self
            .read_timeout
            .map(|secs| seconds("--read-timeout", secs))
            .transpose()?;
        Ok(WebSocketConfig::builder()
            .url(&self.url)
            .handshake_timeout(seconds("--handshake-timeout", self.handshake_timeout)?)
            .read_timeout(read_timeout)
            .build()?)
    }

    pub fn window(&self) -> Option<(u16, u16)> {
        self.rows.zip(self.cols)
    }
}

fn seconds(flag: &str, secs: f64) -> Result<Duration, CliError> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|duration| !duration.is_zero())
        .ok_or_else(|| CliError::InvalidArgument(format!("{flag} must be a positive number of seconds")))
}
