// SmartMarks Settings Engine
// Loads, saves and edits the client settings file. Environment variables
// override the backend location and log filter without being written back.

use std::fs;
use std::path::Path;

use crate::platform;
use crate::types::errors::SettingsError;
use crate::types::settings::ClientSettings;

pub const ENV_BACKEND_URL: &str = "SUPABASE_URL";
pub const ENV_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_LOG_FILTER: &str = "SMARTMARKS_LOG";

/// Trait defining the settings engine interface.
pub trait SettingsEngineTrait {
    fn load(&mut self) -> Result<ClientSettings, SettingsError>;
    fn save(&self) -> Result<(), SettingsError>;
    fn get_settings(&self) -> &ClientSettings;
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError>;
    fn reset(&mut self) -> Result<(), SettingsError>;
    fn get_config_path(&self) -> &str;
}

/// Values taken from the environment at construction time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvOverrides {
    pub backend_url: Option<String>,
    pub anon_key: Option<String>,
    pub log_filter: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            backend_url: get(ENV_BACKEND_URL),
            anon_key: get(ENV_ANON_KEY),
            log_filter: get(ENV_LOG_FILTER),
        }
    }

    pub fn apply(&self, settings: &mut ClientSettings) {
        if let Some(url) = &self.backend_url {
            settings.backend.url = url.clone();
        }
        if let Some(key) = &self.anon_key {
            settings.backend.anon_key = key.clone();
        }
        if let Some(filter) = &self.log_filter {
            settings.logging.filter = filter.clone();
        }
    }
}

/// Settings engine implementation that persists settings as JSON on disk.
pub struct SettingsEngine {
    config_path: String,
    settings: ClientSettings,
    overrides: EnvOverrides,
}

impl SettingsEngine {
    /// Creates a new SettingsEngine.
    ///
    /// If `path_override` is `Some`, uses that path for the config file.
    /// Otherwise, uses `settings.json` in the platform config directory.
    /// Environment overrides are captured here.
    pub fn new(path_override: Option<String>) -> Self {
        Self::with_overrides(path_override, EnvOverrides::from_env())
    }

    pub fn with_overrides(path_override: Option<String>, overrides: EnvOverrides) -> Self {
        let config_path = match path_override {
            Some(p) => p,
            None => platform::get_config_dir()
                .join("settings.json")
                .to_string_lossy()
                .to_string(),
        };

        Self {
            config_path,
            settings: ClientSettings::default(),
            overrides,
        }
    }

    /// File settings with environment overrides applied. This is what the app runs with.
    pub fn effective_settings(&self) -> ClientSettings {
        let mut settings = self.settings.clone();
        self.overrides.apply(&mut settings);
        settings
    }

    /// Checks that the effective settings can reach a hosted backend.
    pub fn validate(&self) -> Result<ClientSettings, SettingsError> {
        let settings = self.effective_settings();
        let url = settings.backend.url.trim();
        if url.is_empty() {
            return Err(SettingsError::Missing(format!(
                "backend.url (or {})",
                ENV_BACKEND_URL
            )));
        }
        match reqwest::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(SettingsError::InvalidValue(format!(
                    "backend.url must be an http(s) URL: {}",
                    url
                )))
            }
        }
        if settings.backend.anon_key.trim().is_empty() {
            return Err(SettingsError::Missing(format!(
                "backend.anon_key (or {})",
                ENV_ANON_KEY
            )));
        }
        if settings.realtime.reconnect.initial_delay_ms == 0
            || settings.realtime.reconnect.max_delay_ms < settings.realtime.reconnect.initial_delay_ms
        {
            return Err(SettingsError::InvalidValue(
                "realtime.reconnect delays must satisfy 0 < initial_delay_ms <= max_delay_ms".to_string(),
            ));
        }
        Ok(settings)
    }
}

impl SettingsEngineTrait for SettingsEngine {
    /// Loads settings from the JSON config file.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    fn load(&mut self) -> Result<ClientSettings, SettingsError> {
        let path = Path::new(&self.config_path);

        if !path.exists() {
            self.settings = ClientSettings::default();
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| SettingsError::IoError(format!("Failed to read config file: {}", e)))?;

        let settings: ClientSettings = serde_json::from_str(&content).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to parse config file: {}", e))
        })?;

        tracing::debug!(path = %self.config_path, "settings loaded");
        self.settings = settings;
        Ok(self.settings.clone())
    }

    fn save(&self) -> Result<(), SettingsError> {
        let path = Path::new(&self.config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                SettingsError::IoError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        fs::write(path, json)
            .map_err(|e| SettingsError::IoError(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// The settings as stored on disk, without environment overrides.
    fn get_settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Updates one setting by dot-notation path (`"realtime.reconnect.max_attempts"`)
    /// and persists the result. The new value must deserialize into the field's type.
    fn set_value(&mut self, key: &str, value: serde_json::Value) -> Result<(), SettingsError> {
        if key.is_empty() {
            return Err(SettingsError::InvalidKey("Key cannot be empty".to_string()));
        }
        let parts: Vec<&str> = key.split('.').collect();

        let mut json_value = serde_json::to_value(&self.settings).map_err(|e| {
            SettingsError::SerializationError(format!("Failed to serialize settings: {}", e))
        })?;

        let (last, parents) = parts
            .split_last()
            .ok_or_else(|| SettingsError::InvalidKey(key.to_string()))?;
        let mut current = &mut json_value;
        for part in parents {
            current = current
                .get_mut(*part)
                .ok_or_else(|| SettingsError::InvalidKey(format!("Key '{}' not found in settings", key)))?;
        }
        match current {
            serde_json::Value::Object(map) if map.contains_key(*last) => {
                map.insert(last.to_string(), value);
            }
            _ => {
                return Err(SettingsError::InvalidKey(format!(
                    "Key '{}' not found in settings",
                    key
                )))
            }
        }

        let new_settings: ClientSettings = serde_json::from_value(json_value).map_err(|e| {
            SettingsError::InvalidValue(format!("Invalid value for key '{}': {}", key, e))
        })?;

        self.settings = new_settings;
        self.save()?;
        tracing::info!(key, "setting updated");
        Ok(())
    }

    fn reset(&mut self) -> Result<(), SettingsError> {
        self.settings = ClientSettings::default();
        self.save()
    }

    fn get_config_path(&self) -> &str {
        &self.config_path
    }
}
