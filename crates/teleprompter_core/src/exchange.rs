//! Settings export and import.
//!
//! An export is a self-contained JSON document with the durable parts of
//! the state (presenters, display settings, timer configuration):
//!
//! ```json
//! {
//!   "version": 1,
//!   "exportDate": "2026-03-01T09:30:00Z",
//!   "settings": { "speed": 2, "fontSize": 48, "mode": "combined" },
//!   "timer": { "timerMode": "up", "durationMs": 300000 },
//!   "presenters": [{ "id": 1, "name": "Sample Presenter", "script": "..." }]
//! }
//! ```
//!
//! Imports accept the same shape with every section and field optional;
//! only what is present is applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result, TeleprompterError};
use crate::state::{AppMode, Presenter, SharedState, TimerMode, is_positive_finite, validate_presenters};

/// Format version written by [`ExportData::from_state`].
pub const EXPORT_VERSION: u32 = 1;

/// Display settings section of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSettings {
    /// Scroll speed.
    pub speed: f64,
    /// Script font size.
    pub font_size: f64,
    /// Operating mode.
    pub mode: AppMode,
}

/// Timer section of an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTimer {
    /// Timer direction.
    pub timer_mode: TimerMode,
    /// Countdown length.
    pub duration_ms: u64,
}

/// A complete settings export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    /// Format version, currently [`EXPORT_VERSION`].
    pub version: u32,
    /// When the export was taken.
    pub export_date: DateTime<Utc>,
    /// Display settings.
    pub settings: ExportSettings,
    /// Timer configuration.
    pub timer: ExportTimer,
    /// Presenter list.
    pub presenters: Vec<Presenter>,
}

impl ExportData {
    /// Snapshot the exportable parts of `state`.
    pub fn from_state(state: &SharedState, export_date: DateTime<Utc>) -> Self {
        Self {
            version: EXPORT_VERSION,
            export_date,
            settings: ExportSettings {
                speed: state.speed,
                font_size: state.font_size,
                mode: state.mode,
            },
            timer: ExportTimer {
                timer_mode: state.timer_mode,
                duration_ms: state.duration_ms,
            },
            presenters: state.presenters.clone(),
        }
    }

    /// Pretty-printed JSON text.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(CodecError::Encode)?)
    }
}

/// Display settings section of an import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    /// Scroll speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Script font size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    /// Operating mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<AppMode>,
}

/// Timer section of an import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportTimer {
    /// Timer direction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer_mode: Option<TimerMode>,
    /// Countdown length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Data to merge into the state; everything optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportData {
    /// Format version of the source document, if it carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Display settings to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ImportSettings>,
    /// Timer configuration to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<ImportTimer>,
    /// Replacement presenter list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presenters: Option<Vec<Presenter>>,
}

impl ImportData {
    /// Parse import JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let data: Self = serde_json::from_str(text).map_err(TeleprompterError::InvalidImport)?;
        if let Some(version) = data.version
            && version > EXPORT_VERSION
        {
            log::warn!(
                "[Exchange] Import format version {} is newer than {}, applying known fields",
                version,
                EXPORT_VERSION
            );
        }
        Ok(data)
    }

    /// Check the data before applying it.
    ///
    /// Presenter ids must be unique; speed and font size must be positive.
    pub fn validate(&self) -> Result<()> {
        if let Some(presenters) = &self.presenters {
            validate_presenters(presenters)?;
        }
        if let Some(settings) = &self.settings {
            for (name, value) in [("speed", settings.speed), ("fontSize", settings.font_size)] {
                if let Some(value) = value
                    && !is_positive_finite(value)
                {
                    return Err(TeleprompterError::InvalidState(format!("{name} must be positive, got {value}")));
                }
            }
        }
        Ok(())
    }

    /// Merge the provided fields into `state`.
    ///
    /// A provided presenter list replaces the current one and selects its
    /// first entry.
    pub fn apply_to(&self, state: &mut SharedState) {
        if let Some(presenters) = &self.presenters {
            state.presenters = presenters.clone();
            state.selected_presenter_id = presenters.first().map(|p| p.id);
        }
        if let Some(settings) = &self.settings {
            if let Some(speed) = settings.speed {
                state.speed = speed;
            }
            if let Some(font_size) = settings.font_size {
                state.font_size = font_size;
            }
            if let Some(mode) = settings.mode {
                state.mode = mode;
            }
        }
        if let Some(timer) = &self.timer {
            if let Some(timer_mode) = timer.timer_mode {
                state.timer_mode = timer_mode;
            }
            if let Some(duration_ms) = timer.duration_ms {
                state.duration_ms = duration_ms;
            }
        }
    }
}

impl From<ExportData> for ImportData {
    fn from(export: ExportData) -> Self {
        Self {
            version: Some(export.version),
            settings: Some(ImportSettings {
                speed: Some(export.settings.speed),
                font_size: Some(export.settings.font_size),
                mode: Some(export.settings.mode),
            }),
            timer: Some(ImportTimer {
                timer_mode: Some(export.timer.timer_mode),
                duration_ms: Some(export.timer.duration_ms),
            }),
            presenters: Some(export.presenters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn export_date() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_export_shape() {
        let export = ExportData::from_state(&SharedState::default(), export_date());
        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["exportDate"], "2026-03-01T09:30:00Z");
        assert_eq!(value["settings"]["fontSize"], 48.0);
        assert_eq!(value["settings"]["mode"], "combined");
        assert_eq!(value["timer"]["timerMode"], "up");
        assert_eq!(value["timer"]["durationMs"], 300_000);
        assert_eq!(value["presenters"][0]["name"], "Sample Presenter");
    }

    #[test]
    fn test_export_parses_as_import() {
        let export = ExportData::from_state(&SharedState::default(), export_date());
        let text = export.to_json_pretty().unwrap();
        let import = ImportData::from_json(&text).unwrap();
        assert_eq!(import, ImportData::from(export));
    }

    #[test]
    fn test_partial_import_only_touches_present_fields() {
        let import = ImportData::from_json(r#"{"settings": {"speed": 5}, "timer": {}}"#).unwrap();
        let mut state = SharedState::default();
        import.apply_to(&mut state);

        let expected = SharedState {
            speed: 5.0,
            ..SharedState::default()
        };
        assert_eq!(state, expected);
    }

    #[test]
    fn test_import_presenters_selects_first() {
        let import = ImportData {
            presenters: Some(vec![Presenter::new(7, "G", "g"), Presenter::new(8, "H", "h")]),
            ..ImportData::default()
        };
        let mut state = SharedState::default();
        import.apply_to(&mut state);
        assert_eq!(state.selected_presenter_id, Some(7));
        assert_eq!(state.presenters.len(), 2);
    }

    #[test]
    fn test_validate_rejects_bad_data() {
        let duplicate = ImportData {
            presenters: Some(vec![Presenter::new(1, "A", ""), Presenter::new(1, "B", "")]),
            ..ImportData::default()
        };
        assert!(duplicate.validate().is_err());

        let zero_speed = ImportData::from_json(r#"{"settings": {"speed": 0}}"#).unwrap();
        assert!(zero_speed.validate().is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ImportData::from_json("[1, 2"),
            Err(TeleprompterError::InvalidImport(_))
        ));
        assert!(matches!(
            ImportData::from_json(r#"{"settings": {"mode": "karaoke"}}"#),
            Err(TeleprompterError::InvalidImport(_))
        ));
    }
}
