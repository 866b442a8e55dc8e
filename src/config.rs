//! Configuration stored in `~/.lifeos/config.json`.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::store::AuthProvider;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Owner identity for this installation. Absent means signed out —
    /// mutating operations fail and local-only fallback storage applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub google: GoogleConfig,
}

/// Remote completion service settings for the chat assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// API key. Falls back to the `LIFEOS_COMPLETION_API_KEY` environment
    /// variable when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl CompletionConfig {
    /// Resolve the API key from config or environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.trim().is_empty() {
                return Some(key.trim().to_string());
            }
        }
        std::env::var("LIFEOS_COMPLETION_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// Whether calendar mirroring to Google is enabled. The token on disk
    /// still decides whether the mirror is actually connected.
    #[serde(default)]
    pub enabled: bool,
}

/// Get the canonical config file path (`~/.lifeos/config.json`).
pub fn config_path() -> Result<PathBuf, String> {
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".lifeos").join("config.json"))
}

/// Load configuration from disk. A missing file is a default config, not
/// an error — first run is a valid state.
pub fn load_config() -> Result<Config, String> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path).map_err(|e| format!("Failed to read config: {}", e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Write configuration to disk, creating `~/.lifeos/` if needed.
pub fn save_config(config: &Config) -> Result<(), String> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| format!("Failed to create config dir: {}", e))?;
        }
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))
}

/// Auth provider backed by the config file's owner id.
pub struct ConfigAuth {
    owner_id: Option<String>,
}

impl ConfigAuth {
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner_id: config.owner_id.clone(),
        }
    }
}

impl AuthProvider for ConfigAuth {
    fn current_user(&self) -> Option<String> {
        self.owner_id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_on_empty_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.owner_id.is_none());
        assert_eq!(config.completion.base_url, "https://api.openai.com/v1");
        assert!(!config.google.enabled);
    }

    #[test]
    fn test_camel_case_fields() {
        let json = r#"{
            "ownerId": "alice",
            "completion": { "baseUrl": "https://llm.local/v1", "model": "local" },
            "google": { "enabled": true }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.owner_id.as_deref(), Some("alice"));
        assert_eq!(config.completion.base_url, "https://llm.local/v1");
        assert!(config.google.enabled);
    }

    #[test]
    fn test_config_auth_reflects_owner() {
        let config: Config = serde_json::from_str(r#"{ "ownerId": "alice" }"#).unwrap();
        let auth = ConfigAuth::from_config(&config);
        assert_eq!(auth.current_user().as_deref(), Some("alice"));

        let auth = ConfigAuth::from_config(&Config::default());
        assert!(auth.current_user().is_none());
    }
}
