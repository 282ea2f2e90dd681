use std::fmt;
use std::str::FromStr;

/// Severity scale used by the request pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    DebugInfo,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DebugInfo => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown log severity: {0}")]
pub struct ParseSeverityError(String);

impl FromStr for LogSeverity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" | "debuginfo" => Ok(Self::DebugInfo),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "fatal" | "fatalerror" => Ok(Self::Fatal),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

/// Emit `message` at `severity`, attaching `cause` when present.
/// `Fatal` is written as an error event tagged `severity = "fatal"`.
pub fn report(severity: LogSeverity, message: &str, cause: Option<&dyn fmt::Display>) {
    let cause = cause.map(|c| c.to_string());
    match severity {
        LogSeverity::DebugInfo => tracing::debug!(cause = cause.as_deref(), "{message}"),
        LogSeverity::Info => tracing::info!(cause = cause.as_deref(), "{message}"),
        LogSeverity::Warning => tracing::warn!(cause = cause.as_deref(), "{message}"),
        LogSeverity::Error => tracing::error!(cause = cause.as_deref(), "{message}"),
        LogSeverity::Fatal => {
            tracing::error!(severity = "fatal", cause = cause.as_deref(), "{message}")
        }
    }
}
