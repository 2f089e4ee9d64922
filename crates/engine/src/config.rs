use std::time::Duration;

use dubbo_invoke_registry::RegistrySettings;
use dubbo_invoke_registry::settings::duration_millis;
use dubbo_invoke_util::env::env_parsed;
use serde::{Deserialize, Serialize};

pub const CALL_TIMEOUT_ENV: &str = "DUBBO_INVOKE_TIMEOUT_MS";
pub const INITIAL_READ_ENV: &str = "DUBBO_INVOKE_INITIAL_READ_MS";
pub const IDLE_READ_ENV: &str = "DUBBO_INVOKE_IDLE_READ_MS";
pub const CONNECT_TIMEOUT_ENV: &str = "DUBBO_INVOKE_CONNECT_TIMEOUT_MS";

/// Timeouts for provider calls plus the settings handed to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal call timeout; responses still streaming after three times
    /// this long are cut off.
    #[serde(with = "duration_millis")]
    pub call_timeout: Duration,
    /// Wait for the first byte of a response.
    #[serde(with = "duration_millis")]
    pub initial_read_timeout: Duration,
    /// Wait for each later chunk.
    #[serde(with = "duration_millis")]
    pub idle_read_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    pub registry: RegistrySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(3),
            initial_read_timeout: Duration::from_secs(30),
            idle_read_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(3),
            registry: RegistrySettings::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied, registry settings included.
    pub fn from_env() -> Self {
        let mut config = Self {
            registry: RegistrySettings::from_env(),
            ..Self::default()
        };
        let overrides = [
            (CALL_TIMEOUT_ENV, &mut config.call_timeout),
            (INITIAL_READ_ENV, &mut config.initial_read_timeout),
            (IDLE_READ_ENV, &mut config.idle_read_timeout),
            (CONNECT_TIMEOUT_ENV, &mut config.connect_timeout),
        ];
        for (variable, slot) in overrides {
            if let Some(millis) = env_parsed::<u64>(variable).filter(|millis| *millis > 0) {
                *slot = Duration::from_millis(millis);
            }
        }
        config
    }

    /// Sets the call timeout and caps the wait for the first reply byte at
    /// the same value, so neither read deadline outlives the caller's budget
    /// before data starts flowing.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self.initial_read_timeout = self.initial_read_timeout.min(call_timeout);
        self
    }
}
