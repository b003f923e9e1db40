//! Per-domain repair of the `module` settings JSON.
//!
//! Pure value transforms: every function here maps old JSON to new JSON and
//! touches no store state. Unknown fields outside `advanced_settings` are
//! preserved by splicing only that subtree back into the module object.

pub mod types;

use crate::error::MigrateError;
use crate::settings::types::{
    DetectorSettings, LegacySafetyModule, PlateSettings, SafetyModule, SafetySettings,
};
use serde_json::Value;

pub const PLATE_DOMAIN: &str = "alpr";
pub const SAFETY_DOMAINS: &[&str] = &["hardhat", "smoke_fire"];
pub const DETECTOR_DOMAINS: &[&str] = &[
    "smart_va",
    "object_in_zone",
    "traffic",
    "gun_detection",
    "military",
];

/// Reshapes one domain's module settings; domains without a rule pass
/// through unchanged.
pub fn reshape(domain: &str, module: &Value) -> Result<Value, MigrateError> {
    if domain == PLATE_DOMAIN {
        splice_advanced_settings(module, |settings| {
            let parsed: PlateSettings = parse_settings(settings)?;
            to_value(clamp_plate_settings(parsed))
        })
    } else if SAFETY_DOMAINS.contains(&domain) {
        let legacy: LegacySafetyModule = parse_settings(module)?;
        to_value(upgrade_safety_module(legacy))
    } else if DETECTOR_DOMAINS.contains(&domain) {
        splice_advanced_settings(module, |settings| {
            let parsed: DetectorSettings = parse_settings(settings)?;
            to_value(clamp_detector_settings(parsed))
        })
    } else {
        Ok(module.clone())
    }
}

pub fn clamp_detector_settings(mut settings: DetectorSettings) -> DetectorSettings {
    settings.sensitivity = settings.sensitivity.clamp(1.0, 10.0);
    settings.tracker_buffer_time = settings.tracker_buffer_time.max(10);
    settings.min_height = settings.min_height.max(25);
    settings.min_width = settings.min_width.max(25);
    settings.tracker_sensitivity = 8;
    settings
}

pub fn clamp_plate_settings(mut settings: PlateSettings) -> PlateSettings {
    settings.min_plate_width = settings.min_plate_width.max(40);
    settings.min_plate_height = settings.min_plate_height.max(15);
    settings.frames_to_detect = settings.frames_to_detect.clamp(3, 1000);
    settings.min_plate_length = settings.min_plate_length.clamp(1, 15);
    settings.max_plate_length = settings.max_plate_length.clamp(1, 15);
    settings.sensitivity = Some(0.5);
    settings.countries.retain(|c| is_known_country(c));
    if settings.min_plate_length > settings.max_plate_length {
        settings.max_plate_length = 15;
    }
    settings
}

pub fn upgrade_safety_module(legacy: LegacySafetyModule) -> SafetyModule {
    SafetyModule {
        advanced_settings: SafetySettings {
            alert_delay: legacy.alert_delay.clamp(0, 300),
            sensitivity: (legacy.advanced_settings.sensitivity as i64).clamp(1, 10),
        },
        hardware_settings: legacy.hardware_settings,
        polygons: legacy.polygons,
    }
}

fn splice_advanced_settings<F>(module: &Value, transform: F) -> Result<Value, MigrateError>
where
    F: FnOnce(&Value) -> Result<Value, MigrateError>,
{
    let Value::Object(fields) = module else {
        return Err(MigrateError::Validation(format!(
            "module settings are not a JSON object: {module}"
        )));
    };
    let Some(advanced) = fields.get("advanced_settings") else {
        return Err(MigrateError::Validation(
            "module settings have no advanced_settings".into(),
        ));
    };

    let mut updated = fields.clone();
    updated.insert("advanced_settings".into(), transform(advanced)?);
    Ok(Value::Object(updated))
}

fn parse_settings<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, MigrateError> {
    serde_json::from_value(value.clone())
        .map_err(|e| MigrateError::Validation(format!("malformed module settings: {e}")))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, MigrateError> {
    serde_json::to_value(value).map_err(|e| MigrateError::Encode(e.to_string()))
}

fn is_known_country(code: &str) -> bool {
    ISO_COUNTRY_CODES.binary_search(&code).is_ok() || ADDITIONAL_COUNTRY_CODES.contains(&code)
}

/// Codes retired from ISO 3166-1 but still present in deployed country lists.
const ADDITIONAL_COUNTRY_CODES: &[&str] = &["XK", "TP", "AN"];

/// ISO 3166-1 alpha-2, sorted for binary search.
const ISO_COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX",
    "AZ", "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ",
    "BR", "BS", "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK",
    "CL", "CM", "CN", "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM",
    "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR",
    "GA", "GB", "GD", "GE", "GF", "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS",
    "GT", "GU", "GW", "GY", "HK", "HM", "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN",
    "IO", "IQ", "IR", "IS", "IT", "JE", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN",
    "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU", "LV",
    "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK", "ML", "MM", "MN", "MO", "MP", "MQ",
    "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA", "NC", "NE", "NF", "NG", "NI",
    "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM",
    "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW", "SA", "SB", "SC",
    "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS", "ST", "SV",
    "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO", "TR",
    "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

#[cfg(test)]
mod tests {
    use super::types::{LegacySafetyModule, PlateSettings};
    use super::{
        clamp_detector_settings, clamp_plate_settings, reshape, upgrade_safety_module,
        ISO_COUNTRY_CODES,
    };
    use crate::error::MigrateErrorCode;
    use serde_json::json;

    #[test]
    fn country_table_is_sorted_for_binary_search() {
        assert!(ISO_COUNTRY_CODES.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn plate_settings_are_clamped_into_supported_ranges() {
        let settings = PlateSettings {
            min_plate_width: 10,
            min_plate_height: 50,
            frames_to_detect: 2_000,
            min_plate_length: 0,
            max_plate_length: 40,
            countries: vec!["UA".into(), "XX".into(), "XK".into(), "DE".into()],
            sensitivity: Some(0.9),
            ..PlateSettings::default()
        };

        let fixed = clamp_plate_settings(settings);
        assert_eq!(fixed.min_plate_width, 40);
        assert_eq!(fixed.min_plate_height, 50);
        assert_eq!(fixed.frames_to_detect, 1000);
        assert_eq!(fixed.min_plate_length, 1);
        assert_eq!(fixed.max_plate_length, 15);
        assert_eq!(fixed.sensitivity, Some(0.5));
        assert_eq!(fixed.countries, vec!["UA", "XK", "DE"]);
    }

    #[test]
    fn plate_length_inversion_forces_max_to_ceiling() {
        let settings = PlateSettings {
            min_plate_length: 12,
            max_plate_length: 4,
            ..PlateSettings::default()
        };
        let fixed = clamp_plate_settings(settings);
        assert_eq!(fixed.min_plate_length, 12);
        assert_eq!(fixed.max_plate_length, 15);
    }

    #[test]
    fn detector_settings_get_floors_and_fixed_tracker_sensitivity() {
        let settings = super::types::DetectorSettings {
            sensitivity: 0.2,
            tracker_buffer_time: 3,
            min_height: 10,
            min_width: 60,
            tracker_sensitivity: 3,
            ..Default::default()
        };
        let fixed = clamp_detector_settings(settings);
        assert_eq!(fixed.sensitivity, 1.0);
        assert_eq!(fixed.tracker_buffer_time, 10);
        assert_eq!(fixed.min_height, 25);
        assert_eq!(fixed.min_width, 60);
        assert_eq!(fixed.tracker_sensitivity, 8);
    }

    #[test]
    fn safety_module_moves_alert_delay_into_advanced_settings() {
        let legacy: LegacySafetyModule = serde_json::from_value(json!({
            "alert_delay": 900,
            "advanced_settings": {"sensitivity": 4.7},
            "hardware_settings": {"gpu": 0},
            "polygons": [[0, 0], [1, 1]]
        }))
        .expect("parse");

        let upgraded = upgrade_safety_module(legacy);
        assert_eq!(upgraded.advanced_settings.alert_delay, 300);
        assert_eq!(upgraded.advanced_settings.sensitivity, 4);
        assert_eq!(upgraded.hardware_settings, json!({"gpu": 0}));
        assert_eq!(upgraded.polygons, json!([[0, 0], [1, 1]]));
    }

    #[test]
    fn reshape_preserves_unknown_module_fields() {
        let module = json!({
            "zones": ["a", "b"],
            "advanced_settings": {"sensitivity": 0.0, "min_width": 5}
        });
        let reshaped = reshape("smart_va", &module).expect("reshape");
        assert_eq!(reshaped["zones"], json!(["a", "b"]));
        assert_eq!(reshaped["advanced_settings"]["sensitivity"], json!(1.0));
        assert_eq!(reshaped["advanced_settings"]["min_width"], json!(25));
    }

    #[test]
    fn reshape_passes_unruled_domains_through() {
        let module = json!({"anything": 1});
        assert_eq!(reshape("face", &module).expect("reshape"), module);
    }

    #[test]
    fn reshape_rejects_non_object_modules() {
        let err = reshape("smart_va", &json!("not an object")).expect_err("must fail");
        assert_eq!(err.code(), MigrateErrorCode::Validation);
    }

    #[test]
    fn reshape_rejects_missing_advanced_settings() {
        let err = reshape("alpr", &json!({"zones": []})).expect_err("must fail");
        assert_eq!(err.code(), MigrateErrorCode::Validation);
    }
}
