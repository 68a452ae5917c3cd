use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("auth.key_secret must be set (DOCREFINERY__AUTH__KEY_SECRET)")]
    MissingKeySecret,

    #[error("retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u32 },

    #[error("webhooks.max_attempts must be at least 1")]
    InvalidWebhookMaxAttempts,

    #[error("webhooks host allowlist entry '{0}' is not a bare hostname")]
    InvalidAllowlistHost(String),

    #[error("scanner.addr '{0}' is not a valid host:port")]
    InvalidScannerAddr(String),
}

/// Validate the entire configuration, the same fail-fast-at-boot pattern
/// the upstream config module used for its proxy pool graph.
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_auth(config)?;
    validate_retention(config)?;
    validate_webhooks(config)?;
    validate_scanner(config)?;
    Ok(())
}

fn validate_auth(config: &Config) -> Result<(), ValidationError> {
    if config.auth.key_secret.trim().is_empty() {
        return Err(ValidationError::MissingKeySecret);
    }
    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.document_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "document_ttl_days".to_string(),
            value: 0,
        });
    }
    if config.retention.artifact_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "artifact_ttl_days".to_string(),
            value: 0,
        });
    }
    Ok(())
}

fn validate_webhooks(config: &Config) -> Result<(), ValidationError> {
    if config.webhooks.max_attempts == 0 {
        return Err(ValidationError::InvalidWebhookMaxAttempts);
    }
    for host in &config.webhooks.host_allowlist {
        if host.is_empty() || host.contains('/') || host.contains(':') {
            return Err(ValidationError::InvalidAllowlistHost(host.clone()));
        }
    }
    Ok(())
}

fn validate_scanner(config: &Config) -> Result<(), ValidationError> {
    if config.scanner.addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ValidationError::InvalidScannerAddr(config.scanner.addr.clone()));
    }
    Ok(())
}
