//! Configuration Loader
//!
//! Layered loading: built-in defaults, then an optional configuration file
//! (YAML, TOML or JSON by extension), then `IMAGINE_BRIDGE__*` environment
//! overrides. The merged result is validated before it is returned.

use std::env;
use std::path::Path;

use config::{Config, Environment, File};
use tracing::{debug, info};

use super::BridgeConfig;
use crate::constants::system;
use crate::error::{BridgeError, Result};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate configuration
    pub fn load(path: Option<impl AsRef<Path>>) -> Result<BridgeConfig> {
        let environment = Self::detect_environment();
        let mut builder = Config::builder()
            .add_source(Config::try_from(&BridgeConfig::default())?);

        if let Some(path) = path {
            let path = path.as_ref();
            if !path.exists() {
                return Err(BridgeError::Configuration(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(system::ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: BridgeConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %environment,
            workers = config.workers.len(),
            min_delay_ms = config.pacing.min_delay_ms,
            jitter_ms = config.pacing.jitter_ms,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Current deployment environment name
    pub fn detect_environment() -> String {
        env::var("IMAGINE_BRIDGE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
