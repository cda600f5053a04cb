//! Layered service settings.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `/etc/work-queue/service.yaml`
//! 2. `./config/service.yaml`
//! 3. The file named on the command line or in `WQ_CONFIG_FILE`
//! 4. Environment variables prefixed `WQ__`, with `__` separating nested
//!    keys; `WQ__CONSUMER__WORKER__WORKER_COUNT=4` sets
//!    `consumer.worker.worker_count`
//!
//! Every field has a default, so running without any source is valid. A
//! malformed file or an environment value of the wrong type is an error.

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use work_queue_core::config::ConsumerSettings;
use work_queue_core::{ErrorTypeCatalog, FrozenConfiguration, QueueError};

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Environment variable naming an explicit settings file
pub const CONFIG_FILE_ENV: &str = "WQ_CONFIG_FILE";

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "WQ";

/// Errors raised while preparing the service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Invalid consumer configuration: {0}")]
    Consumer(#[from] QueueError),
}

impl ServiceError {
    /// Process exit code reported for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceError::Settings(_) => 3,
            ServiceError::Consumer(_) => 4,
        }
    }
}

/// Top level settings document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub consumer: ConsumerSettings,
    pub demo: DemoSettings,
}

impl ServiceSettings {
    /// Resolve error type names and freeze the consumer configuration
    pub fn consumer_configuration(
        &self,
        catalog: &ErrorTypeCatalog,
    ) -> Result<FrozenConfiguration, ServiceError> {
        let configuration = self.consumer.clone().into_configuration(catalog)?;
        Ok(configuration.freeze()?)
    }
}

/// Demo workload shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Jobs enqueued at startup
    pub seed_messages: usize,
    /// Every n-th job fails with a missing source image; 0 disables failures
    pub fail_every: u32,
    /// Simulated work per job
    pub processing_time_ms: u64,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            seed_messages: 20,
            fail_every: 7,
            processing_time_ms: 50,
        }
    }
}

/// Load settings from every source, optionally adding an explicit file
pub fn load_settings(explicit_path: Option<&Path>) -> Result<ServiceSettings, ServiceError> {
    let mut builder = Config::builder()
        .add_source(
            File::with_name("/etc/work-queue/service")
                .required(false)
                .format(FileFormat::Yaml),
        )
        .add_source(
            File::with_name("config/service")
                .required(false)
                .format(FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = with_file(builder, path);
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

/// Load settings from a single file, ignoring the default locations and the
/// environment
pub fn load_settings_from_file(path: &Path) -> Result<ServiceSettings, ServiceError> {
    let settings = with_file(Config::builder(), path)
        .build()?
        .try_deserialize()?;
    Ok(settings)
}

fn with_file(
    builder: ConfigBuilder<config::builder::DefaultState>,
    path: &Path,
) -> ConfigBuilder<config::builder::DefaultState> {
    builder.add_source(File::from(path).required(true).format(FileFormat::Yaml))
}
