//! Application configuration (spec §6.6), loaded from a TOML file merged
//! with `INGEST__`-prefixed environment overrides, grounded on the
//! teacher's `config::loader` module.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub mqtt: MqttSettings,
    /// Worker pool size; 0 means "2x available cores" (spec §5).
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub fhir: FhirSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub emit: EmitSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            workers: 0,
            queue: QueueSettings::default(),
            fhir: FhirSettings::default(),
            store: StoreSettings::default(),
            emit: EmitSettings::default(),
            validation: ValidationSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    pub qos: u8,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self { broker: "localhost".into(), port: 1883, user: None, pass: None, qos: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    pub high: usize,
    pub low: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { high: 1024, low: 256 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FhirSettings {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for FhirSettings {
    fn default() -> Self {
        Self { base_url: "http://localhost:8080/fhir".into(), token: None, timeout_ms: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    pub uri: String,
    pub db: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { uri: "mongodb://localhost:27017".into(), db: "ingest".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitSettings {
    pub sink_url: String,
    pub queue_capacity: usize,
}

impl Default for EmitSettings {
    fn default() -> Self {
        Self { sink_url: "http://localhost:9000".into(), queue_capacity: 4096 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// When true, out-of-range values are dropped; when false, they are
    /// clamped and kept with a warning (spec §6.6).
    pub strict: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self { strict: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.mqtt.port == 0 {
            return Err("mqtt.port must be > 0".into());
        }
        if !(0..=2).contains(&self.mqtt.qos) {
            return Err("mqtt.qos must be 0, 1, or 2".into());
        }
        if self.queue.low >= self.queue.high {
            return Err("queue.low must be < queue.high".into());
        }
        if self.fhir.base_url.is_empty() {
            return Err("fhir.base_url must not be empty".into());
        }
        if self.fhir.timeout_ms == 0 {
            return Err("fhir.timeout_ms must be > 0".into());
        }
        if self.emit.queue_capacity == 0 {
            return Err("emit.queue_capacity must be > 0".into());
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    /// Resolves the worker-pool size: `workers` from config, or `2 * cores`
    /// when unset (spec §5).
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map(|n| n.get() * 2).unwrap_or(4)
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::PathBuf;

    /// Loads configuration from an optional TOML file (defaulting to
    /// `ingest.toml` in the working directory) merged with `INGEST__`
    /// environment overrides, e.g. `INGEST__MQTT__BROKER=broker.local`.
    ///
    /// Defaults are seeded as the base source (serialized from
    /// [`AppConfig::default`]) so that a file or env var overriding a single
    /// nested field doesn't leave its siblings missing.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let defaults = toml::to_string(&AppConfig::default()).map_err(|e| format!("default config serialize error: {e}"))?;
        let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Toml));

        let candidate = path.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("ingest.toml"));
        if candidate.exists() {
            builder = builder.add_source(File::from(candidate));
        }

        builder = builder.add_source(Environment::with_prefix("INGEST").try_parsing(true).separator("__"));

        let cfg = builder.build().map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg.try_deserialize().map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_watermarks() {
        let mut cfg = AppConfig::default();
        cfg.queue.high = 100;
        cfg.queue.low = 200;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn worker_count_falls_back_to_cores() {
        let cfg = AppConfig::default();
        assert!(cfg.worker_count() > 0);
    }

    #[test]
    fn env_override_applies() {
        // SAFETY: test-local env var, no concurrent access to this key elsewhere.
        unsafe { std::env::set_var("INGEST__MQTT__BROKER", "broker.example.com") };
        let cfg = loader::load_config(Some("/nonexistent/path.toml")).unwrap();
        assert_eq!(cfg.mqtt.broker, "broker.example.com");
        unsafe { std::env::remove_var("INGEST__MQTT__BROKER") };
    }
}
