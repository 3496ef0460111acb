//! Client settings, loaded from an optional TOML file.
//!
//! ```toml
//! base_url = "https://balances.example.com"
//! session_cookie = "sessionid=..."
//! page_size = 25
//! progress_policy = "hold_highest"
//!
//! [reconnect]
//! initial_delay_ms = 500
//! max_attempts = 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::services::channel::ReconnectPolicy;
use crate::services::store::ProgressPolicy;
use crate::services::transport::{Endpoint, Session};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub socket_path: String,
    pub session_cookie: Option<String>,
    pub page_size: u32,
    pub progress_policy: ProgressPolicy,
    pub reconnect: ReconnectSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "http://localhost:8000".to_string(),
            socket_path: "/ws/documents".to_string(),
            session_cookie: None,
            page_size: 10,
            progress_policy: ProgressPolicy::HoldHighest,
            reconnect: ReconnectSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: Option<u32>,
    pub jitter: f64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        ReconnectSettings {
            enabled: true,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            max_attempts: None,
            jitter: 0.2,
        }
    }
}

impl Settings {
    /// Read settings from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            None => Settings::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if !self.socket_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "socket_path must start with '/', got {:?}",
                self.socket_path
            )));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(ConfigError::Invalid(format!(
                "reconnect.jitter must be within 0.0..=1.0, got {}",
                self.reconnect.jitter
            )));
        }
        if self.reconnect.initial_delay_ms > self.reconnect.max_delay_ms {
            return Err(ConfigError::Invalid(
                "reconnect.initial_delay_ms exceeds reconnect.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Push channel URL: the base URL with its scheme switched to ws(s).
    pub fn socket_url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        let host = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}{}", host, self.socket_path)
    }

    pub fn session(&self) -> Session {
        Session::new(self.session_cookie.clone().filter(|c| !c.trim().is_empty()))
    }

    pub fn endpoint(&self, session: Session) -> Endpoint {
        Endpoint {
            url: self.socket_url(),
            session,
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        let r = &self.reconnect;
        ReconnectPolicy {
            enabled: r.enabled,
            initial_delay: Duration::from_millis(r.initial_delay_ms),
            max_delay: Duration::from_millis(r.max_delay_ms),
            max_attempts: r.max_attempts,
            jitter: r.jitter,
        }
    }
}
