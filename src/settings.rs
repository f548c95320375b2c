use crate::logger::{error, Component};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    // Classification server
    pub server: ServerSettings,

    // Recording cycle
    pub listening: ListeningSettings,

    // Feedback channels
    pub feedback: FeedbackSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningSettings {
    /// Length of each recorded clip. The controller reads this value; there
    /// is no separate compiled default.
    pub record_duration_ms: u64,
    /// Extra settle time added to the record window before the next cycle.
    pub cycle_buffer_ms: u64,
    pub auto_record: bool,
    /// Reserved for a capture gain threshold; not consumed by the cycle.
    pub sensitivity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackSettings {
    pub vibration_enabled: bool,
    pub visual_feedback_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            listening: ListeningSettings::default(),
            feedback: FeedbackSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: 30,
        }
    }
}

impl Default for ListeningSettings {
    fn default() -> Self {
        Self {
            record_duration_ms: 5000,
            cycle_buffer_ms: 1000,
            auto_record: false,
            sensitivity: 0.7,
        }
    }
}

impl Default for FeedbackSettings {
    fn default() -> Self {
        Self {
            vibration_enabled: true,
            visual_feedback_enabled: true,
        }
    }
}

pub struct SettingsManager {
    settings_path: PathBuf,
    settings: AppSettings,
}

impl SettingsManager {
    pub fn new(config_dir: &Path) -> Result<Self, String> {
        let settings_path = config_dir.join("settings.json");

        // Load settings or create default
        let settings = match fs::read_to_string(&settings_path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                error(
                    Component::Settings,
                    &format!("Failed to parse settings.json: {}, using defaults", e),
                );
                AppSettings::default()
            }),
            Err(_) => {
                let default_settings = AppSettings::default();

                // Save default settings
                if let Ok(json) = serde_json::to_string_pretty(&default_settings) {
                    let _ = fs::write(&settings_path, json);
                }

                default_settings
            }
        };

        Ok(Self {
            settings_path,
            settings,
        })
    }

    pub fn get(&self) -> &AppSettings {
        &self.settings
    }

    pub fn update<F>(&mut self, updater: F) -> Result<(), String>
    where
        F: FnOnce(&mut AppSettings),
    {
        updater(&mut self.settings);
        self.save()
    }

    pub fn save(&self) -> Result<(), String> {
        let json = serde_json::to_string_pretty(&self.settings)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(&self.settings_path, json)
            .map_err(|e| format!("Failed to save settings: {}", e))?;

        Ok(())
    }

    pub fn reload(&mut self) -> Result<(), String> {
        match fs::read_to_string(&self.settings_path) {
            Ok(contents) => {
                self.settings = serde_json::from_str(&contents)
                    .map_err(|e| format!("Failed to parse settings: {}", e))?;
                Ok(())
            }
            Err(e) => Err(format!("Failed to read settings: {}", e)),
        }
    }
}
