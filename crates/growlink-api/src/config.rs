use std::num::NonZeroU32;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct BackendConfig {
    pub url: Url,
    pub token_env: Option<String>,
    pub timeout_secs: Option<NonZeroU32>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct GrowlinkConfig {
    pub prefs_file: Utf8PathBuf,
    pub poll_interval_secs: NonZeroU32,
    pub gateway_timeout_secs: NonZeroU32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub growlink: GrowlinkConfig,
}

impl BackendConfig {
    pub const DEFAULT_TOKEN_ENV: &'static str = "GROWLINK_TOKEN";
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    #[must_use]
    pub fn token_env_name(&self) -> &str {
        self.token_env
            .as_deref()
            .map(str::trim)
            .filter(|x| !x.is_empty())
            .unwrap_or(Self::DEFAULT_TOKEN_ENV)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout_secs.map_or(
            Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            |secs| Duration::from_secs(u64::from(secs.get())),
        )
    }
}

impl GrowlinkConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.poll_interval_secs.get()))
    }

    #[must_use]
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.gateway_timeout_secs.get()))
    }
}
