use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "leadforge.toml",
    "config/leadforge.toml",
    "crates/config/leadforge.toml",
    "../leadforge.toml",
    "../config/leadforge.toml",
    "backend/leadforge.toml",
    "backend/config/leadforge.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
    /// Base URL used when building links that end up in outgoing email.
    pub public_url: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://leadforge.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Session and security-token lifetimes.
///
/// ```
/// use leadforge_config::AuthConfig;
///
/// let auth = AuthConfig::default();
/// assert_eq!(auth.password_reset_ttl_seconds, 3_600);
/// assert_eq!(auth.email_verify_ttl_seconds, 86_400);
/// assert_eq!(auth.team_invite_ttl_seconds, 604_800);
/// ```
/// Longest lifetime accepted for sessions and security tokens (ten years).
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_seconds: u64,
    pub session_cookie: String,
    pub password_reset_ttl_seconds: u64,
    pub email_verify_ttl_seconds: u64,
    pub email_change_ttl_seconds: u64,
    pub team_invite_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: 604_800,
            session_cookie: "leadforge_session".to_string(),
            password_reset_ttl_seconds: 3_600,
            email_verify_ttl_seconds: 86_400,
            email_change_ttl_seconds: 3_600,
            team_invite_ttl_seconds: 604_800,
        }
    }
}

impl AuthConfig {
    fn clamp_ttls(&mut self) {
        for ttl in [
            &mut self.session_ttl_seconds,
            &mut self.password_reset_ttl_seconds,
            &mut self.email_verify_ttl_seconds,
            &mut self.email_change_ttl_seconds,
            &mut self.team_invite_ttl_seconds,
        ] {
            *ttl = (*ttl).min(MAX_TTL_SECONDS);
        }
    }
}

/// Outbound mail transport. Without an `api_url` mail is only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub request_timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            from: "no-reply@leadforge.app".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Fail the triggering action when its audit entry cannot be written.
    pub abort_on_failure: bool,
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use leadforge_config::load;
///
/// std::env::remove_var("LEADFORGE_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("http.public_url", defaults.http.public_url.clone())?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.session_cookie", defaults.auth.session_cookie.clone())?
        .set_default("mail.from", defaults.mail.from.clone())?
        .set_default("audit.abort_on_failure", defaults.audit.abort_on_failure)?;

    let environment_overrides = config::Environment::with_prefix("LEADFORGE").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("LEADFORGE_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via LEADFORGE_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    config.auth.clamp_ttls();

    debug!(
        http = ?config.http,
        database = ?config.database,
        mail_transport = config.mail.api_url.is_some(),
        "loaded backend configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_ttls_caps_values_at_ten_years() {
        let mut auth = AuthConfig {
            session_ttl_seconds: u64::MAX,
            team_invite_ttl_seconds: u64::MAX - 1,
            ..AuthConfig::default()
        };

        auth.clamp_ttls();

        assert_eq!(auth.session_ttl_seconds, MAX_TTL_SECONDS);
        assert_eq!(auth.team_invite_ttl_seconds, MAX_TTL_SECONDS);
        assert_eq!(auth.password_reset_ttl_seconds, 3_600);
    }
}
