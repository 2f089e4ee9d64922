use std::time::Duration;

use dubbo_invoke_util::env::{env_parsed, env_string};
use serde::{Deserialize, Serialize};

pub const GROUP_ENV: &str = "DUBBO_INVOKE_GROUP";
pub const PAGE_SIZE_ENV: &str = "DUBBO_INVOKE_PAGE_SIZE";
pub const BASE_PATH_ENV: &str = "DUBBO_INVOKE_ZK_BASE_PATH";

pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";
pub const DEFAULT_BASE_PATH: &str = "/dubbo";

/// Knobs shared by the registry backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Nacos group used for service listing and instance lookups.
    pub group: String,
    /// Page size requested from Nacos service listings.
    pub page_size: u32,
    /// ZooKeeper node under which Dubbo registers services.
    pub base_path: String,
    /// Timeout applied to each registry HTTP request.
    #[serde(with = "duration_millis")]
    pub http_timeout: Duration,
    /// Timeout for establishing a ZooKeeper session.
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            page_size: 100,
            base_path: DEFAULT_BASE_PATH.to_string(),
            http_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RegistrySettings {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(group) = env_string(GROUP_ENV) {
            settings.group = group;
        }
        if let Some(page_size) = env_parsed::<u32>(PAGE_SIZE_ENV).filter(|size| *size > 0) {
            settings.page_size = page_size;
        }
        if let Some(base_path) = env_string(BASE_PATH_ENV) {
            settings.base_path = normalize_base_path(&base_path);
        }
        settings
    }
}

/// Leading slash, no trailing slash; `/` stays `/`.
pub fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_apply() {
        temp_env::with_vars(
            [
                (GROUP_ENV, Some("dubbo")),
                (PAGE_SIZE_ENV, Some("500")),
                (BASE_PATH_ENV, Some("custom/root/")),
            ],
            || {
                let settings = RegistrySettings::from_env();
                assert_eq!(settings.group, "dubbo");
                assert_eq!(settings.page_size, 500);
                assert_eq!(settings.base_path, "/custom/root");
            },
        );
    }

    #[test]
    fn invalid_page_size_keeps_default() {
        temp_env::with_vars([(PAGE_SIZE_ENV, Some("lots")), (GROUP_ENV, None)], || {
            let settings = RegistrySettings::from_env();
            assert_eq!(settings.page_size, 100);
            assert_eq!(settings.group, DEFAULT_GROUP);
        });
    }

    #[test]
    fn durations_serialize_as_millis() {
        let value = serde_json::to_value(RegistrySettings::default()).expect("serializable");
        assert_eq!(value["http_timeout"].to_string(), "10000");
    }
}
