//! Configuration management for the SAML core.
//!
//! Configuration is loaded from environment variables (optionally via a
//! `.env` file) with defaults matching the SAML 2.0 profiles in use.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// RSA-SHA1 signature algorithm URI, used when the signing key is RSA.
const DEFAULT_RSA_SIGNATURE_ALGORITHM: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";

/// Main configuration for the SAML security core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlConfig {
    /// Entity ID this deployment uses as the `Issuer` of outbound messages.
    pub entity_id: String,

    /// Metadata sources: inline XML, `file:` paths, or `http(s)://` URLs.
    pub metadata_sources: Vec<String>,

    /// Credential-store alias of the message signing key.
    pub signing_key_alias: String,

    /// Credential-store alias of the encryption key.
    pub encryption_key_alias: String,

    /// Lifetime of relay state entries, in seconds.
    pub relay_state_ttl_secs: u64,

    /// Maximum age of an inbound message's `IssueInstant`, in seconds.
    pub issue_timeout_secs: u64,

    /// Clock skew tolerated on `IssueInstant`, in seconds.
    pub clock_jitter_secs: u64,

    /// Whether POST-bound messages must carry an embedded signature.
    pub require_signed_post: bool,

    /// Signature algorithm URI used when the signing key is RSA.
    pub rsa_signature_algorithm: String,

    /// Optional path of the auto-submit form template.
    pub submit_form_template: Option<PathBuf>,

    /// Optional path of the redirect page template.
    pub redirect_page_template: Option<PathBuf>,

    /// Remote metadata retrieval settings.
    pub metadata: MetadataFetchConfig,
}

/// Remote metadata retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataFetchConfig {
    /// Per-request timeout, in seconds.
    pub fetch_timeout_secs: u64,

    /// Maximum number of concurrent metadata downloads.
    pub max_concurrent_fetches: usize,

    /// First retry delay, in milliseconds. Doubles on every failure.
    pub initial_backoff_ms: u64,

    /// Upper bound on the retry delay, in seconds.
    pub max_backoff_secs: u64,

    /// Attempts per retrieval before the source is abandoned.
    pub max_fetch_attempts: u32,

    /// Re-fetch interval for remote sources, in seconds. `None` fetches once.
    pub refresh_interval_secs: Option<u64>,
}

impl Default for MetadataFetchConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            max_concurrent_fetches: 4,
            initial_backoff_ms: 1_000,
            max_backoff_secs: 300,
            max_fetch_attempts: 10,
            refresh_interval_secs: None,
        }
    }
}

impl MetadataFetchConfig {
    /// Per-request timeout.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// First retry delay.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Retry delay cap.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Re-fetch interval, if periodic refresh is enabled.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs.map(Duration::from_secs)
    }
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            entity_id: "http://localhost:8080/saml".to_string(),
            metadata_sources: Vec::new(),
            signing_key_alias: "saml-signing".to_string(),
            encryption_key_alias: "saml-encryption".to_string(),
            relay_state_ttl_secs: 600,
            issue_timeout_secs: 600,
            clock_jitter_secs: 30,
            require_signed_post: false,
            rsa_signature_algorithm: DEFAULT_RSA_SIGNATURE_ALGORITHM.to_string(),
            submit_form_template: None,
            redirect_page_template: None,
            metadata: MetadataFetchConfig::default(),
        }
    }
}

impl SamlConfig {
    /// Loads configuration from environment variables.
    ///
    /// Unset variables keep their default. Variables that are set but do not
    /// parse are an error rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let metadata_defaults = MetadataFetchConfig::default();

        let metadata_sources = std::env::var("KC_SAML_METADATA_SOURCES")
            .map(|value| split_sources(&value))
            .unwrap_or_default();

        let config = Self {
            entity_id: env_string("KC_SAML_ENTITY_ID").unwrap_or(defaults.entity_id),
            metadata_sources,
            signing_key_alias: env_string("KC_SAML_SIGNING_KEY_ALIAS")
                .unwrap_or(defaults.signing_key_alias),
            encryption_key_alias: env_string("KC_SAML_ENCRYPTION_KEY_ALIAS")
                .unwrap_or(defaults.encryption_key_alias),
            relay_state_ttl_secs: env_parse("KC_SAML_RELAY_STATE_TTL_SECS")?
                .unwrap_or(defaults.relay_state_ttl_secs),
            issue_timeout_secs: env_parse("KC_SAML_ISSUE_TIMEOUT_SECS")?
                .unwrap_or(defaults.issue_timeout_secs),
            clock_jitter_secs: env_parse("KC_SAML_CLOCK_JITTER_SECS")?
                .unwrap_or(defaults.clock_jitter_secs),
            require_signed_post: env_parse("KC_SAML_REQUIRE_SIGNED_POST")?
                .unwrap_or(defaults.require_signed_post),
            rsa_signature_algorithm: env_string("KC_SAML_RSA_SIGNATURE_ALGORITHM")
                .unwrap_or(defaults.rsa_signature_algorithm),
            submit_form_template: env_string("KC_SAML_SUBMIT_FORM_TEMPLATE").map(PathBuf::from),
            redirect_page_template: env_string("KC_SAML_REDIRECT_PAGE_TEMPLATE")
                .map(PathBuf::from),
            metadata: MetadataFetchConfig {
                fetch_timeout_secs: env_parse("KC_SAML_METADATA_FETCH_TIMEOUT_SECS")?
                    .unwrap_or(metadata_defaults.fetch_timeout_secs),
                max_concurrent_fetches: env_parse("KC_SAML_METADATA_MAX_CONCURRENT_FETCHES")?
                    .unwrap_or(metadata_defaults.max_concurrent_fetches),
                initial_backoff_ms: env_parse("KC_SAML_METADATA_INITIAL_BACKOFF_MS")?
                    .unwrap_or(metadata_defaults.initial_backoff_ms),
                max_backoff_secs: env_parse("KC_SAML_METADATA_MAX_BACKOFF_SECS")?
                    .unwrap_or(metadata_defaults.max_backoff_secs),
                max_fetch_attempts: env_parse("KC_SAML_METADATA_MAX_FETCH_ATTEMPTS")?
                    .unwrap_or(metadata_defaults.max_fetch_attempts),
                refresh_interval_secs: env_parse("KC_SAML_METADATA_REFRESH_INTERVAL_SECS")?,
            },
        };

        config.validate()?;
        tracing::debug!(
            entity_id = %config.entity_id,
            sources = config.metadata_sources.len(),
            "SAML configuration loaded"
        );
        Ok(config)
    }

    /// Rejects settings that would make the core unusable.
    pub fn validate(&self) -> Result<()> {
        if self.entity_id.trim().is_empty() {
            return Err(Error::Config("entity_id must not be blank".to_string()));
        }
        if self.signing_key_alias.trim().is_empty() {
            return Err(Error::Config("signing_key_alias must not be blank".to_string()));
        }
        if self.relay_state_ttl_secs == 0 {
            return Err(Error::Config("relay_state_ttl_secs must be positive".to_string()));
        }
        if self.issue_timeout_secs == 0 {
            return Err(Error::Config("issue_timeout_secs must be positive".to_string()));
        }
        if self.metadata.fetch_timeout_secs == 0 {
            return Err(Error::Config("fetch_timeout_secs must be positive".to_string()));
        }
        if self.metadata.max_concurrent_fetches == 0 {
            return Err(Error::Config("max_concurrent_fetches must be positive".to_string()));
        }
        if self.metadata.max_fetch_attempts == 0 {
            return Err(Error::Config("max_fetch_attempts must be positive".to_string()));
        }
        Ok(())
    }

    /// Lifetime of relay state entries.
    #[must_use]
    pub const fn relay_state_ttl(&self) -> Duration {
        Duration::from_secs(self.relay_state_ttl_secs)
    }

    /// Maximum age of an inbound message.
    #[must_use]
    pub fn issue_timeout(&self) -> chrono::Duration {
        seconds_capped(self.issue_timeout_secs)
    }

    /// Tolerated clock skew.
    #[must_use]
    pub fn clock_jitter(&self) -> chrono::Duration {
        seconds_capped(self.clock_jitter_secs)
    }
}

fn seconds_capped(secs: u64) -> chrono::Duration {
    const MAX_SECS: i64 = i64::MAX / 1_000;
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(MAX_SECS).min(MAX_SECS))
}

/// Splits a comma-separated source list.
///
/// Inline XML may itself contain commas, so a source starting with `<` runs
/// until the segment that closes it with `>`.
fn split_sources(value: &str) -> Vec<String> {
    let mut sources = Vec::new();
    let mut pending: Option<String> = None;

    for segment in value.split(',') {
        if let Some(mut inline) = pending.take() {
            inline.push(',');
            inline.push_str(segment);
            if inline.trim_end().ends_with('>') {
                sources.push(inline.trim().to_string());
            } else {
                pending = Some(inline);
            }
            continue;
        }

        let trimmed = segment.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('<') && !trimmed.ends_with('>') {
            pending = Some(trimmed.to_string());
        } else {
            sources.push(trimmed.to_string());
        }
    }

    if let Some(inline) = pending {
        sources.push(inline.trim().to_string());
    }
    sources
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::invalid_var(name, e)),
        None => Ok(None),
    }
}
