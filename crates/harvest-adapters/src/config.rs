//! Configuration management for harvest
//!
//! Stores settings in ~/.config/harvest/config.json

use crate::util::write_atomic;
use harvest_core::identity::default_control_dirs;
use harvest_core::template::{default_enum_rules, default_template_extensions, EnumRule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const TOKEN_ENV: &str = "GITHUB_API_TOKEN";
pub const TOKEN_ENV_FALLBACK: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Main candidate list, one URL per line.
    pub candidate_list: PathBuf,
    /// Where discovery writes newly found URLs.
    pub new_candidates: PathBuf,
    pub ledger: PathBuf,
    /// JSON-lines record of every discovered candidate.
    pub discovery_log: PathBuf,
    pub clone_dir: PathBuf,
    pub error_log: PathBuf,
    pub validator_bin: String,
    pub validate_timeout_secs: u64,
    pub clone_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub api_base_url: String,
    pub low_water_mark: u64,
    pub search_terms: Vec<String>,
    pub template_extensions: Vec<String>,
    pub control_dirs: Vec<String>,
    pub enum_rules: Vec<EnumRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            candidate_list: PathBuf::from("nuclei.txt"),
            new_candidates: PathBuf::from("new_templates.txt"),
            ledger: PathBuf::from("attempted.txt"),
            discovery_log: PathBuf::from("discoveries.jsonl"),
            clone_dir: PathBuf::from("nuclei-templates"),
            error_log: PathBuf::from("validation_errors.jsonl"),
            validator_bin: "nuclei".to_string(),
            validate_timeout_secs: 60,
            clone_timeout_secs: 300,
            probe_timeout_secs: 30,
            api_base_url: "https://api.github.com".to_string(),
            low_water_mark: 5,
            search_terms: default_search_terms(),
            template_extensions: default_template_extensions(),
            control_dirs: default_control_dirs(),
            enum_rules: default_enum_rules(),
        }
    }
}

pub fn default_search_terms() -> Vec<String> {
    ["nuclei-templates", "nuclei-scripts", "nuclei-configs"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    fn sanitize(&mut self) {
        self.search_terms.retain(|t| !t.trim().is_empty());
        if self.search_terms.is_empty() {
            self.search_terms = default_search_terms();
        }
        self.template_extensions.retain(|e| !e.trim().is_empty());
        if self.template_extensions.is_empty() {
            self.template_extensions = default_template_extensions();
        }
        self.api_base_url = self.api_base_url.trim_end_matches('/').to_string();
        if self.api_base_url.is_empty() {
            self.api_base_url = Config::default().api_base_url;
        }
        self.validate_timeout_secs = self.validate_timeout_secs.max(1);
        self.clone_timeout_secs = self.clone_timeout_secs.max(1);
        self.probe_timeout_secs = self.probe_timeout_secs.max(1);
    }

    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("harvest"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit path. A file that fails to parse is preserved
    /// next to the original as `.json.corrupt` and defaults are returned.
    pub fn load_from(path: &Path) -> Self {
        if let Ok(content) = fs::read_to_string(path) {
            match serde_json::from_str::<Config>(&content) {
                Ok(mut config) => {
                    config.sanitize();
                    return config;
                }
                Err(err) => {
                    preserve_corrupt_config(path, &content);
                    tracing::warn!(
                        path = %path.display(),
                        "config file was corrupted ({}); a backup was saved and defaults were loaded",
                        err
                    );
                }
            }
        }
        Self::default()
    }

    /// Save config to disk
    pub fn save(&self) -> Result<(), String> {
        let dir =
            Self::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&dir.join("config.json"))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let mut sanitized = self.clone();
        sanitized.sanitize();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .map_err(|e| format!("Failed to create config directory: {}", e))?;
            }
        }

        let content = serde_json::to_string_pretty(&sanitized)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        write_atomic(path, &content).map_err(|e| format!("Failed to write config: {:#}", e))?;

        Ok(())
    }

    /// API token from the environment, if any.
    pub fn api_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV)
            .ok()
            .or_else(|| std::env::var(TOKEN_ENV_FALLBACK).ok())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }

    pub fn validate_timeout(&self) -> Duration {
        Duration::from_secs(self.validate_timeout_secs)
    }

    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/harvest/config.json".to_string())
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}
