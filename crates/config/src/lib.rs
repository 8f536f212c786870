use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parley.toml",
    "config/parley.toml",
    "crates/config/parley.toml",
    "../parley.toml",
    "../config/parley.toml",
    "../crates/config/parley.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parley.db".to_string(),
            max_connections: 10,
        }
    }
}

/// Configuration for the chat-completion provider backing the assistant.
///
/// ```
/// use parley_config::AiConfig;
///
/// let ai = AiConfig::default();
/// assert_eq!(ai.base_url, "https://api.openai.com/v1");
/// assert_eq!(ai.request_timeout_seconds, 30);
/// assert!(ai.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "AiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "AiConfig::default_model")]
    pub model: String,
    #[serde(default = "AiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "AiConfig::default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "AiConfig::default_bot_user_id")]
    pub bot_user_id: String,
}

impl AiConfig {
    fn default_base_url() -> String {
        "https://api.openai.com/v1".to_string()
    }

    fn default_model() -> String {
        "gpt-5".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_system_prompt() -> String {
        "Вы дружелюбный и полезный ИИ-ассистент в мессенджере в стиле Telegram. \
         Отвечайте на русском языке естественно и помогайте пользователям. \
         Будьте краткими, но информативными."
            .to_string()
    }

    fn default_bot_user_id() -> String {
        "assistant".to_string()
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            request_timeout_seconds: Self::default_request_timeout(),
            system_prompt: Self::default_system_prompt(),
            bot_user_id: Self::default_bot_user_id(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parley_config::load;
///
/// std::env::remove_var("PARLEY_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder();
    builder = builder
        .set_default("http.address", defaults.http.address.clone())
        .unwrap()
        .set_default("http.port", i64::from(defaults.http.port))
        .unwrap()
        .set_default("database.url", defaults.database.url.clone())
        .unwrap()
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )
        .unwrap()
        .set_default("ai.base_url", defaults.ai.base_url.clone())
        .unwrap()
        .set_default("ai.model", defaults.ai.model.clone())
        .unwrap()
        .set_default(
            "ai.request_timeout_seconds",
            i64::try_from(defaults.ai.request_timeout_seconds).unwrap_or(i64::MAX),
        )
        .unwrap()
        .set_default("ai.system_prompt", defaults.ai.system_prompt.clone())
        .unwrap()
        .set_default("ai.bot_user_id", defaults.ai.bot_user_id.clone())
        .unwrap();

    let environment_overrides = config::Environment::with_prefix("PARLEY").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARLEY_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARLEY_CONFIG");
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

    let config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn load_returns_defaults_without_file_or_environment() {
        std::env::remove_var("PARLEY_CONFIG");
        std::env::remove_var("PARLEY_HTTP__PORT");

        let config = load().unwrap();

        assert_eq!(config.http.address, "127.0.0.1");
        assert_eq!(config.http.port, 7070);
        assert_eq!(config.database.url, "sqlite://parley.db");
        assert_eq!(config.ai.model, "gpt-5");
        assert_eq!(config.ai.bot_user_id, "assistant");
    }

    #[test]
    #[serial]
    fn environment_variables_override_defaults() {
        std::env::remove_var("PARLEY_CONFIG");
        std::env::set_var("PARLEY_HTTP__PORT", "9000");
        std::env::set_var("PARLEY_AI__MODEL", "gpt-4.1-mini");

        let config = load().unwrap();

        assert_eq!(config.http.port, 9000);
        assert_eq!(config.ai.model, "gpt-4.1-mini");

        std::env::remove_var("PARLEY_HTTP__PORT");
        std::env::remove_var("PARLEY_AI__MODEL");
    }

    #[test]
    #[serial]
    fn configuration_file_is_loaded_via_env_var() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[http]\naddress = \"0.0.0.0\"\nport = 8088\n\n[ai]\nbot_user_id = \"helper\""
        )
        .unwrap();

        std::env::set_var("PARLEY_CONFIG", path.display().to_string());

        let config = load().unwrap();

        assert_eq!(config.http.address, "0.0.0.0");
        assert_eq!(config.http.port, 8088);
        assert_eq!(config.ai.bot_user_id, "helper");
        // Sections absent from the file keep their defaults.
        assert_eq!(config.database.max_connections, 10);

        std::env::remove_var("PARLEY_CONFIG");
    }
}
