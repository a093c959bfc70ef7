//! Debug and tracing configuration

use serde::{Deserialize, Serialize};

use crate::constants::defaults;

/// Trace level for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TraceLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl TraceLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

impl std::fmt::Display for TraceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Unknown levels fall back to the default instead of rejecting the file.
impl<'de> Deserialize<'de> for TraceLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw).unwrap_or_default())
    }
}

/// Debug and tracing configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DebugConfig {
    /// Trace level (error, warn, info, debug, trace)
    #[serde(default)]
    pub trace_level: TraceLevel,

    /// Tracing targets to enable. Empty means the built-in defaults
    /// (`tartwatch_core`, `tartwatch`).
    #[serde(default)]
    pub trace_targets: Vec<String>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            trace_level: TraceLevel::Info,
            trace_targets: Vec::new(),
        }
    }
}

impl DebugConfig {
    /// Targets to filter on, falling back to the defaults when none are set.
    pub fn effective_targets(&self) -> Vec<String> {
        if self.trace_targets.is_empty() {
            defaults::DEFAULT_TRACE_TARGETS
                .iter()
                .map(|target| (*target).to_owned())
                .collect()
        } else {
            self.trace_targets.clone()
        }
    }

    /// `EnvFilter` directive string such as `tartwatch_core=debug,tartwatch=debug`.
    pub fn filter_directives(&self) -> String {
        self.effective_targets()
            .iter()
            .map(|target| format!("{target}={}", self.trace_level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        debug: DebugConfig,
    }

    #[test]
    fn unknown_trace_level_falls_back_to_info() {
        let parsed: Wrapper =
            toml::from_str("[debug]\ntrace_level = \"verbose\"\n").expect("parse");
        assert_eq!(parsed.debug.trace_level, TraceLevel::Info);
    }

    #[test]
    fn directives_use_default_targets() {
        let config = DebugConfig {
            trace_level: TraceLevel::Debug,
            trace_targets: Vec::new(),
        };
        assert_eq!(
            config.filter_directives(),
            "tartwatch_core=debug,tartwatch=debug"
        );

        let custom = DebugConfig {
            trace_level: TraceLevel::Warn,
            trace_targets: vec!["tartwatch_core::connection".to_string()],
        };
        assert_eq!(custom.filter_directives(), "tartwatch_core::connection=warn");
    }
}
