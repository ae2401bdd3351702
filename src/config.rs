use std::time::Duration;

pub const DEFAULT_APPLET_HOST: &str = "127.0.0.1";
pub const DEFAULT_APPLET_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_LOG_FILTER: &str = "oto=info";

pub const ENV_APPLET_HOST: &str = "OTO_APPLET_HOST";
pub const ENV_APPLET_TIMEOUT: &str = "OTO_APPLET_TIMEOUT_SECS";
pub const ARG_TIMEOUT: &str = "--timeout";
pub const ENV_LOG: &str = "OTO_LOG";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },
}

/// Settings for running a program from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub applet_host: String,
    pub applet_timeout: Duration,
    pub log_filter: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            applet_host: DEFAULT_APPLET_HOST.to_string(),
            applet_timeout: Duration::from_secs(DEFAULT_APPLET_TIMEOUT_SECS),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RunConfig {
    /// Defaults overridden by `OTO_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(host) = lookup(ENV_APPLET_HOST).filter(|h| !h.trim().is_empty()) {
            config.applet_host = host.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_APPLET_TIMEOUT) {
            config.applet_timeout = parse_timeout(ENV_APPLET_TIMEOUT, &raw)?;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|f| !f.trim().is_empty()) {
            config.log_filter = filter;
        }
        Ok(config)
    }

    /// Override the applet timeout from the command line.
    pub fn with_timeout_secs(mut self, secs: u64) -> Result<Self, ConfigError> {
        self.applet_timeout = parse_timeout(ARG_TIMEOUT, &secs.to_string())?;
        Ok(self)
    }
}

fn parse_timeout(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidTimeout {
            var,
            value: raw.to_string(),
        }),
    }
}
