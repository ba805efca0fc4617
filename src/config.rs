use camino::Utf8Path;
use config::{Config, ConfigError};

pub use growlink_api::config::*;

pub fn parse(filename: &Utf8Path) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .set_default("backend.url", "http://localhost:8000/")?
        .set_default("growlink.prefs_file", "growlink-prefs.yaml")?
        .set_default("growlink.poll_interval_secs", 10)?
        .set_default("growlink.gateway_timeout_secs", 10)?
        .add_source(config::File::with_name(filename.as_str()).required(false))
        .build()?;

    settings.try_deserialize()
}
