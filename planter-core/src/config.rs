use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use planter_policy::{ActuationTimings, ALERT_COOLDOWN_MS};
use planter_store::{
    ActuatorSink, InMemoryProfileStore, JsonFileProfileStore, NullActuatorSink, ProfileStore,
    RtdbActuatorSink, RtdbClient, RtdbProfileStore,
};
use planter_types::Millis;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ControllerSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("invalid config: {0}")]
    Parse(String),
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
}

/// Service configuration. Every field has a default, so an empty YAML
/// document is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanterConfig {
    pub timings: ActuationTimings,
    pub alert_cooldown_ms: Millis,
    pub device_queue: usize,
    pub http_addr: String,
    /// Local JSON profile file; ignored when `rtdb` is set.
    pub profiles_file: Option<PathBuf>,
    pub rtdb: Option<RtdbConfig>,
    pub plant_id: PlantIdConfig,
    pub llm: LlmConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RtdbConfig {
    pub url: String,
    #[serde(default)]
    pub auth: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantIdConfig {
    pub url: String,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Default for PlanterConfig {
    fn default() -> Self {
        Self {
            timings: ActuationTimings::default(),
            alert_cooldown_ms: ALERT_COOLDOWN_MS,
            device_queue: 64,
            http_addr: "0.0.0.0:7070".into(),
            profiles_file: None,
            rtdb: None,
            plant_id: PlantIdConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl Default for PlantIdConfig {
    fn default() -> Self {
        Self {
            url: "https://api.plant.id".into(),
            api_key: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo-1106".into(),
            api_key: None,
        }
    }
}

impl PlanterConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `PLANTER_CONFIG` (if set), then apply environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var("PLANTER_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_path(path)?,
            _ => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(url) = get("PLANTER_RTDB_URL") {
            let auth = get("PLANTER_RTDB_AUTH");
            self.rtdb = Some(RtdbConfig { url, auth });
        }
        if let Some(path) = get("PLANTER_PROFILES_FILE") {
            self.profiles_file = Some(PathBuf::from(path));
        }
        if let Some(addr) = get("PLANTER_HTTP_ADDR") {
            self.http_addr = addr;
        }
        if let Some(key) = get("PLANT_ID_API_KEY") {
            self.plant_id.api_key = Some(key);
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("LLM_URL") {
            self.llm.url = url;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(v) = get("PLANTER_WATERING_COOLDOWN_MS") {
            self.timings.watering_cooldown_ms = v.parse().map_err(|_| ConfigError::Env {
                key: "PLANTER_WATERING_COOLDOWN_MS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("PLANTER_WATERING_DURATION_MS") {
            self.timings.watering_duration_ms = v.parse().map_err(|_| ConfigError::Env {
                key: "PLANTER_WATERING_DURATION_MS",
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    pub fn rtdb_client(&self) -> Option<RtdbClient> {
        self.rtdb
            .as_ref()
            .map(|r| RtdbClient::new(r.url.clone(), r.auth.clone()))
    }

    /// Realtime database if configured, else the local file, else memory.
    pub fn profile_store(&self) -> Arc<dyn ProfileStore> {
        match (self.rtdb_client(), &self.profiles_file) {
            (Some(rtdb), _) => Arc::new(RtdbProfileStore::new(rtdb)),
            (None, Some(path)) => Arc::new(JsonFileProfileStore::open(path)),
            (None, None) => Arc::new(InMemoryProfileStore::new()),
        }
    }

    /// Without a realtime database there is no hardware to drive; writes are
    /// accepted and dropped.
    pub fn actuator_sink(&self) -> Arc<dyn ActuatorSink> {
        match self.rtdb_client() {
            Some(rtdb) => Arc::new(RtdbActuatorSink::new(rtdb)),
            None => Arc::new(NullActuatorSink),
        }
    }

    /// Copy with API keys and the database token masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        let mut cfg = self.clone();
        cfg.plant_id.api_key = mask(&self.plant_id.api_key);
        cfg.llm.api_key = mask(&self.llm.api_key);
        if let Some(rtdb) = cfg.rtdb.as_mut() {
            rtdb.auth = mask(&rtdb.auth);
        }
        cfg
    }

    pub fn settings(&self) -> ControllerSettings {
        ControllerSettings {
            timings: self.timings,
            alert_cooldown_ms: self.alert_cooldown_ms,
            device_queue: self.device_queue,
        }
    }
}
