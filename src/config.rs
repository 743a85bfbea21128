//! Runtime settings merged from defaults, an optional TOML file and
//! `SHIPBOT_`-prefixed environment variables (`__` separates sections,
//! e.g. `SHIPBOT_GUARD__MIN_INTERVAL_MS=500`).

use crate::application::flow::EngineSettings;
use crate::application::rates::RatePolicy;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Inactivity after which a session is treated as absent.
    pub ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_minutes: 15 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub conversation: String,
    pub retention_minutes: i64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            conversation: "order_conversation".to_string(),
            retention_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub min_interval_ms: i64,
    /// Consecutive rejections before the user is told to slow down. `0` never notifies.
    pub notice_after: u32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 300,
            notice_after: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    pub cache_ttl_seconds: i64,
    pub fetch_timeout_seconds: u64,
    pub max_per_carrier: usize,
    pub max_total: usize,
    pub excluded_carriers: Vec<String>,
    pub allowed_services: BTreeMap<String, Vec<String>>,
}

impl Default for RatesConfig {
    fn default() -> Self {
        let policy = RatePolicy::default();
        let mut excluded_carriers: Vec<String> = policy.excluded_carriers.into_iter().collect();
        excluded_carriers.sort();
        let allowed_services = policy
            .allowed_services
            .into_iter()
            .map(|(carrier, services)| {
                let mut services: Vec<String> = services.into_iter().collect();
                services.sort();
                (carrier, services)
            })
            .collect();
        Self {
            cache_ttl_seconds: policy.cache_ttl.num_seconds(),
            fetch_timeout_seconds: policy.fetch_timeout.as_secs(),
            max_per_carrier: policy.max_per_carrier,
            max_total: policy.max_total,
            excluded_carriers,
            allowed_services,
        }
    }
}

impl RatesConfig {
    pub fn policy(&self) -> RatePolicy {
        RatePolicy {
            excluded_carriers: self
                .excluded_carriers
                .iter()
                .map(|c| c.to_ascii_lowercase())
                .collect(),
            allowed_services: self
                .allowed_services
                .iter()
                .map(|(carrier, services)| {
                    (
                        carrier.to_ascii_lowercase(),
                        services.iter().map(|s| s.to_ascii_lowercase()).collect(),
                    )
                })
                .collect(),
            max_per_carrier: self.max_per_carrier,
            max_total: self.max_total,
            cache_ttl: chrono::Duration::seconds(self.cache_ttl_seconds),
            fetch_timeout: std::time::Duration::from_secs(self.fetch_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    pub interval_seconds: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "shipbot=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub session: SessionConfig,
    pub progress: ProgressConfig,
    pub guard: GuardConfig,
    pub rates: RatesConfig,
    pub sweeper: SweeperConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Priority, highest first: environment, `config_path`, defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Settings, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Settings::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("SHIPBOT_").split("__"))
            .extract()
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session.ttl_minutes)
    }

    pub fn progress_retention(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.progress.retention_minutes)
    }

    pub fn guard_interval(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.guard.min_interval_ms)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            conversation: self.progress.conversation.clone(),
            session_ttl: self.session_ttl(),
            progress_retention: self.progress_retention(),
        }
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweeper.interval_seconds.max(1))
    }
}
