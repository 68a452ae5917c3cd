use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "DOCREFINERY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/docrefinery.toml";
const ENV_PREFIX: &str = "DOCREFINERY";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);
    Ok(config)
}

/// Secrets never live in the TOML file, only in the environment: the HMAC
/// pepper used to fingerprint API keys and the token internal routes check.
fn load_secrets(config: &mut Config) {
    if let Ok(secret) = env::var("DOCREFINERY_KEY_SECRET") {
        config.auth.key_secret = secret;
    }
    if let Ok(token) = env::var("DOCREFINERY_INTERNAL_TOKEN") {
        config.auth.internal_token = token;
    }
}

/// Load configuration from a specific path and environment. Useful for
/// testing with custom config files.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // DOCREFINERY__SERVER__BIND_ADDR -> server.bind_addr
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}
