//! Engine configuration from environment variables.

use std::time::Duration;

use studio_domain::{ProjectId, DEFAULT_PANEL_CAPACITY};
use uuid::Uuid;

use crate::infrastructure::polling::PollPolicy;
use crate::use_cases::generation::GenerationSettings;

/// Where panel data is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub server_host: String,
    pub server_port: u16,
    pub provider_url: String,
    pub provider_api_key: Option<String>,
    /// Remote database that mirrors panel saves; sync is off when unset
    pub database_sync_url: Option<String>,
    pub store: StoreBackend,
    /// Project whose panels are loaded at startup
    pub project_id: ProjectId,
    pub panel_slots: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub poll: PollPolicy,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset; unparseable
    /// values fall back to the default with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let store = match get("STORE_DB") {
            Some(v) if v.eq_ignore_ascii_case("memory") => StoreBackend::Memory,
            Some(path) => StoreBackend::Sqlite(path),
            None => StoreBackend::Sqlite("studio.db".into()),
        };

        let project_id = get("PROJECT_ID")
            .and_then(|raw| match Uuid::parse_str(&raw) {
                Ok(uuid) => Some(ProjectId::from_uuid(uuid)),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Invalid PROJECT_ID, using default project");
                    None
                }
            })
            .unwrap_or_else(|| ProjectId::from_uuid(Uuid::nil()));

        let panel_slots = match parsed(&get, "PANEL_SLOTS", DEFAULT_PANEL_CAPACITY) {
            0 => {
                tracing::warn!("PANEL_SLOTS must be at least 1, using default");
                DEFAULT_PANEL_CAPACITY
            }
            n => n,
        };

        let defaults = PollPolicy::default();
        let interval_ms = parsed(&get, "POLL_INTERVAL_MS", defaults.interval.as_millis() as u64);

        Self {
            server_host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parsed(&|key: &str| get(key).or_else(|| get("PORT")), "SERVER_PORT", 3000),
            provider_url: get("PROVIDER_URL").unwrap_or_else(|| "http://localhost:8000".into()),
            provider_api_key: get("PROVIDER_API_KEY"),
            database_sync_url: get("DATABASE_SYNC_URL"),
            store,
            project_id,
            panel_slots,
            image_width: parsed(&get, "IMAGE_WIDTH", 1024),
            image_height: parsed(&get, "IMAGE_HEIGHT", 1024),
            poll: PollPolicy {
                interval: Duration::from_millis(interval_ms),
                max_attempts: parsed(&get, "POLL_MAX_ATTEMPTS", defaults.max_attempts),
            },
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            width: self.image_width,
            height: self.image_height,
            poll: self.poll.clone(),
        }
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Unparseable setting, using default");
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config(&[]);

        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.provider_url, "http://localhost:8000");
        assert_eq!(config.provider_api_key, None);
        assert_eq!(config.database_sync_url, None);
        assert_eq!(config.store, StoreBackend::Sqlite("studio.db".into()));
        assert_eq!(config.project_id, ProjectId::from_uuid(Uuid::nil()));
        assert_eq!(config.panel_slots, 4);
        assert_eq!(config.poll, PollPolicy::default());
        let settings = config.generation_settings();
        assert_eq!((settings.width, settings.height), (1024, 1024));
    }

    #[test]
    fn reads_overrides() {
        let project = Uuid::new_v4();
        let project_str = project.to_string();
        let config = config(&[
            ("SERVER_PORT", "8080"),
            ("STORE_DB", "MEMORY"),
            ("PROJECT_ID", project_str.as_str()),
            ("PANEL_SLOTS", "6"),
            ("POLL_INTERVAL_MS", "500"),
            ("POLL_MAX_ATTEMPTS", "10"),
            ("DATABASE_SYNC_URL", "http://db:9000"),
        ]);

        assert_eq!(config.server_port, 8080);
        assert_eq!(config.store, StoreBackend::Memory);
        assert_eq!(config.project_id, ProjectId::from_uuid(project));
        assert_eq!(config.panel_slots, 6);
        assert_eq!(config.poll.interval, Duration::from_millis(500));
        assert_eq!(config.poll.max_attempts, 10);
        assert_eq!(config.database_sync_url.as_deref(), Some("http://db:9000"));
    }

    #[test]
    fn port_falls_back_to_generic_port_variable() {
        assert_eq!(config(&[("PORT", "4100")]).server_port, 4100);
    }

    #[test]
    fn bad_values_fall_back_to_defaults() {
        let config = config(&[
            ("SERVER_PORT", "not-a-port"),
            ("PANEL_SLOTS", "0"),
            ("PROJECT_ID", "nope"),
            ("PROVIDER_API_KEY", "   "),
        ]);

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.panel_slots, 4);
        assert_eq!(config.project_id, ProjectId::from_uuid(Uuid::nil()));
        assert_eq!(config.provider_api_key, None);
    }
}
