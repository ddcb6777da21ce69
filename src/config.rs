//! Configuration types.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::onboarding::embed::{EmbedSnippet, WidgetTheme};
use crate::onboarding::training::AggregationMode;

/// Timing, probability, and widget settings for onboarding sessions.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Delay between simulated page arrivals (1 time unit).
    pub page_delay: Duration,
    /// Delay after the last page before training completes (2 time units).
    pub training_delay: Duration,
    /// Delay before a detection attempt resolves (2 time units).
    pub detection_delay: Duration,
    /// Chance that a detection attempt succeeds.
    pub detection_success_probability: f64,
    /// How per-page failures affect the aggregate training status.
    pub aggregation: AggregationMode,
    /// `total_pages` reported by the insight seed.
    pub estimated_total_pages: u32,
    /// Exclusive upper bound for simulated keyword frequencies.
    pub keyword_frequency_ceiling: u32,
    /// How often `watch_verification` re-checks the identity provider.
    pub verification_poll_interval: Duration,
    /// Seed for the random source; entropy when unset.
    pub random_seed: Option<u64>,
    /// Embed snippet handed out on the integration-code step.
    pub embed: EmbedSnippet,
    /// Sessions idle this long are closed and forgotten.
    pub session_ttl: Duration,
    /// How often the registry looks for expired sessions.
    pub session_sweep_interval: Duration,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self::with_time_unit(Duration::from_secs(1))
    }
}

impl OnboardingConfig {
    /// Default settings with every simulated delay scaled to `unit`.
    pub fn with_time_unit(unit: Duration) -> Self {
        Self {
            page_delay: unit,
            training_delay: unit * 2,
            detection_delay: unit * 2,
            detection_success_probability: 0.8,
            aggregation: AggregationMode::Lenient,
            estimated_total_pages: 15,
            keyword_frequency_ceiling: 50,
            verification_poll_interval: Duration::from_secs(5),
            random_seed: None,
            embed: EmbedSnippet::default(),
            session_ttl: Duration::from_secs(30 * 60),
            session_sweep_interval: Duration::from_secs(60),
        }
    }

    /// Load overrides from `ONBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let unit = match env_parse::<u64>("ONBOARD_TIME_UNIT_MS")? {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::from_secs(1),
        };
        let mut config = Self::with_time_unit(unit);

        if let Some(p) = env_parse::<f64>("ONBOARD_DETECTION_SUCCESS_PROBABILITY")? {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::InvalidValue {
                    key: "ONBOARD_DETECTION_SUCCESS_PROBABILITY".to_string(),
                    message: format!("{p} is outside [0, 1]"),
                });
            }
            config.detection_success_probability = p;
        }

        if let Some(strict) = env_parse::<bool>("ONBOARD_STRICT_AGGREGATION")? {
            config.aggregation = if strict {
                AggregationMode::Strict
            } else {
                AggregationMode::Lenient
            };
        }

        if let Some(pages) = env_parse::<u32>("ONBOARD_ESTIMATED_PAGES")? {
            config.estimated_total_pages = pages;
        }

        if let Some(secs) = env_parse::<u64>("ONBOARD_VERIFICATION_POLL_SECS")? {
            config.verification_poll_interval = Duration::from_secs(secs.max(1));
        }

        config.random_seed = env_parse::<u64>("ONBOARD_RANDOM_SEED")?;

        if let Some(secs) = env_parse::<u64>("ONBOARD_SESSION_TTL_SECS")? {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("ONBOARD_SESSION_SWEEP_SECS")? {
            config.session_sweep_interval = Duration::from_secs(secs.max(1));
        }

        if let Ok(host) = std::env::var("ONBOARD_WIDGET_HOST") {
            config.embed.widget_host = host;
        }
        if let Ok(org) = std::env::var("ONBOARD_ORGANIZATION_ID") {
            config.embed.organization_id = org;
        }
        if let Ok(theme) = std::env::var("ONBOARD_WIDGET_THEME") {
            config.embed.theme =
                theme
                    .parse::<WidgetTheme>()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "ONBOARD_WIDGET_THEME".to_string(),
                        message,
                    })?;
        }

        Ok(config)
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Directory for rolling log files; stdout only when unset.
    pub log_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind: std::env::var("ONBOARD_BIND").unwrap_or(defaults.bind),
            port: env_parse::<u16>("ONBOARD_PORT")?.unwrap_or(defaults.port),
            log_dir: std::env::var("ONBOARD_LOG_DIR").ok(),
        })
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "ONBOARD_BIND".to_string(),
                message: format!("{e}"),
            })
    }
}

/// Settings for the bundled in-memory identity provider.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Account returned by Google sign-in; Google sign-in fails when unset.
    pub google_email: Option<String>,
    pub google_name: Option<String>,
    /// Treat every verification email as clicked the moment it is sent.
    /// On by default: the in-memory provider has no mail transport.
    pub auto_verify: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            google_email: None,
            google_name: None,
            auto_verify: true,
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            google_email: std::env::var("ONBOARD_GOOGLE_EMAIL").ok(),
            google_name: std::env::var("ONBOARD_GOOGLE_NAME").ok(),
            auto_verify: env_parse::<bool>("ONBOARD_AUTO_VERIFY")?.unwrap_or(defaults.auto_verify),
        })
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
        Err(_) => Ok(None),
    }
}
