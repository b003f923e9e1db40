use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Advanced settings carried by the general detector modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DetectorSettings {
    pub sensitivity: f32,
    pub model: Option<String>,
    pub tracker: Option<String>,
    pub tracker_buffer_time: i64,
    pub alarm_filtration: bool,
    pub min_height: i64,
    pub min_width: i64,
    #[serde(rename = "trackerSensitivity")]
    pub tracker_sensitivity: i64,
}

/// Advanced settings of the plate-recognition module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlateSettings {
    pub min_plate_width: i64,
    pub min_plate_height: i64,
    pub frames_to_detect: i64,
    pub ocr_model: Option<String>,
    pub min_plate_length: i64,
    pub max_plate_length: i64,
    pub template_matching: bool,
    pub countries: Vec<String>,
    pub sensitivity: Option<f32>,
    pub save_frame: Option<String>,
}

/// Safety (smoke/fire and hardhat) module as written by the previous release:
/// the alert delay lived next to the advanced settings instead of inside them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LegacySafetyModule {
    pub alert_delay: i64,
    pub advanced_settings: LegacySafetySettings,
    pub hardware_settings: Value,
    pub polygons: Value,
}

impl Default for LegacySafetyModule {
    fn default() -> Self {
        Self {
            alert_delay: 0,
            advanced_settings: LegacySafetySettings::default(),
            hardware_settings: Value::Null,
            polygons: Value::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct LegacySafetySettings {
    pub sensitivity: f32,
}

/// Safety module in the current shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyModule {
    pub advanced_settings: SafetySettings,
    pub hardware_settings: Value,
    pub polygons: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySettings {
    pub alert_delay: i64,
    pub sensitivity: i64,
}
