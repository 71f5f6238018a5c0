// THEORY:
// Every tunable number in the engine lives here. None of them is an algorithmic
// fact: the crowd size, the persistence duration, the debounce windows were all
// tuned by eye on real footage and will be tuned again, so they are data, loaded
// from TOML and validated once before the first frame.
//
// Missing sections or keys fall back to the defaults below, so a deployment only
// writes down what it changes.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Frames an identity may go unmatched before it is dropped.
    pub max_disappear_frames: u32,
    /// Max centroid jump (pixels) between frames for the same identity.
    pub max_distance_px: f64,
    /// Max centroid movement (pixels) between frames for an identity to count as stationary.
    pub movement_threshold_px: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_disappear_frames: 50,
            max_distance_px: 120.0,
            movement_threshold_px: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupConfig {
    /// Smallest cluster that counts as a group.
    pub min_people: usize,
    /// How long a group must persist before it completes.
    pub duration_seconds: f64,
    /// Max centroid distance (pixels) between neighbours in a cluster.
    pub cluster_distance_px: f64,
    /// How long an unconfirmed group survives before it is dissolved.
    pub vanish_seconds: f64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            min_people: 5,
            duration_seconds: 120.0,
            cluster_distance_px: 120.0,
            vanish_seconds: 10.0,
        }
    }
}

/// Minimum confidence for a detection of each class to be used at all.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub person_min_confidence: f32,
    pub weapon_min_confidence: f32,
    pub fight_min_confidence: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            person_min_confidence: 0.15,
            weapon_min_confidence: 0.2,
            fight_min_confidence: 0.65,
        }
    }
}

/// Debounce windows for one monitored signal.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    /// Positive detections must be sustained this long before the signal qualifies.
    pub sustained_seconds: f64,
    /// Max gap between positive frames that still continues a run.
    pub continuity_seconds: f64,
    /// How long the outward indicator stays lit after the last positive frame.
    pub fade_seconds: f64,
    /// Overrides `alert_cooldown_seconds` for this signal.
    pub cooldown_seconds: Option<f64>,
}

impl SignalConfig {
    fn new(sustained_seconds: f64, continuity_seconds: f64, fade_seconds: f64) -> Self {
        Self {
            sustained_seconds,
            continuity_seconds,
            fade_seconds,
            cooldown_seconds: None,
        }
    }

    fn validate(&self, fields: [&'static str; 4]) -> Result<(), ConfigError> {
        positive(fields[0], self.sustained_seconds)?;
        positive(fields[1], self.continuity_seconds)?;
        positive(fields[2], self.fade_seconds)?;
        if let Some(cooldown) = self.cooldown_seconds {
            positive(fields[3], cooldown)?;
        }
        // The indicator must stay lit across any gap that continues a run.
        if self.fade_seconds < self.continuity_seconds {
            return Err(ConfigError::FadeShorterThanContinuity {
                field: fields[2],
                fade: self.fade_seconds,
                continuity: self.continuity_seconds,
            });
        }
        Ok(())
    }
}

/// A `[signals.*]` table as written. Keys left out keep that signal's default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SignalOverrides {
    sustained_seconds: Option<f64>,
    continuity_seconds: Option<f64>,
    fade_seconds: Option<f64>,
    cooldown_seconds: Option<f64>,
}

impl SignalOverrides {
    fn apply(self, base: SignalConfig) -> SignalConfig {
        SignalConfig {
            sustained_seconds: self.sustained_seconds.unwrap_or(base.sustained_seconds),
            continuity_seconds: self.continuity_seconds.unwrap_or(base.continuity_seconds),
            fade_seconds: self.fade_seconds.unwrap_or(base.fade_seconds),
            cooldown_seconds: self.cooldown_seconds.or(base.cooldown_seconds),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SignalsTable {
    weapon: SignalOverrides,
    fight: SignalOverrides,
    crowd_stationary: SignalOverrides,
}

impl From<SignalsTable> for SignalsConfig {
    fn from(table: SignalsTable) -> Self {
        let defaults = SignalsConfig::default();
        Self {
            weapon: table.weapon.apply(defaults.weapon),
            fight: table.fight.apply(defaults.fight),
            crowd_stationary: table.crowd_stationary.apply(defaults.crowd_stationary),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "SignalsTable")]
pub struct SignalsConfig {
    pub weapon: SignalConfig,
    pub fight: SignalConfig,
    pub crowd_stationary: SignalConfig,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            weapon: SignalConfig::new(3.0, 1.0, 5.0),
            fight: SignalConfig::new(3.0, 1.0, 5.0),
            crowd_stationary: SignalConfig::new(10.0, 2.0, 5.0),
        }
    }
}

/// Local hours during which the stationary-crowd rule is armed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NightConfig {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for NightConfig {
    fn default() -> Self {
        Self {
            start_hour: 20,
            end_hour: 6,
        }
    }
}

/// Configuration for the FrameProcessor, allowing for tunable behavior.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub groups: GroupConfig,
    pub detection: DetectionConfig,
    pub signals: SignalsConfig,
    pub night: NightConfig,
    /// Minimum interval between two alerts from the same signal gate.
    pub alert_cooldown_seconds: f64,
    /// Frames in the rolling person-count average.
    pub count_smoothing_window: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            groups: GroupConfig::default(),
            detection: DetectionConfig::default(),
            signals: SignalsConfig::default(),
            night: NightConfig::default(),
            alert_cooldown_seconds: 10.0,
            count_smoothing_window: 15,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.min_people == 0 {
            return Err(ConfigError::ZeroMinPeople);
        }
        positive("groups.duration_seconds", self.groups.duration_seconds)?;
        positive("groups.cluster_distance_px", self.groups.cluster_distance_px)?;
        positive("groups.vanish_seconds", self.groups.vanish_seconds)?;
        positive("tracker.max_distance_px", self.tracker.max_distance_px)?;
        positive("tracker.movement_threshold_px", self.tracker.movement_threshold_px)?;
        positive("alert_cooldown_seconds", self.alert_cooldown_seconds)?;

        self.signals.weapon.validate([
            "signals.weapon.sustained_seconds",
            "signals.weapon.continuity_seconds",
            "signals.weapon.fade_seconds",
            "signals.weapon.cooldown_seconds",
        ])?;
        self.signals.fight.validate([
            "signals.fight.sustained_seconds",
            "signals.fight.continuity_seconds",
            "signals.fight.fade_seconds",
            "signals.fight.cooldown_seconds",
        ])?;
        self.signals.crowd_stationary.validate([
            "signals.crowd_stationary.sustained_seconds",
            "signals.crowd_stationary.continuity_seconds",
            "signals.crowd_stationary.fade_seconds",
            "signals.crowd_stationary.cooldown_seconds",
        ])?;

        hour("night.start_hour", self.night.start_hour)?;
        hour("night.end_hour", self.night.end_hour)?;

        if self.count_smoothing_window == 0 {
            return Err(ConfigError::WindowTooSmall {
                field: "count_smoothing_window",
            });
        }
        Ok(())
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    // Rejects NaN too.
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn hour(field: &'static str, value: u8) -> Result<(), ConfigError> {
    if value <= 23 {
        Ok(())
    } else {
        Err(ConfigError::InvalidHour { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            alert_cooldown_seconds = 30.0

            [groups]
            min_people = 6
            duration_seconds = 300.0

            [signals.weapon]
            sustained_seconds = 2.0
            continuity_seconds = 0.5
            fade_seconds = 4.0
            cooldown_seconds = 60.0
            "#,
        )
        .unwrap();

        assert_eq!(config.groups.min_people, 6);
        assert_eq!(config.groups.duration_seconds, 300.0);
        assert_eq!(config.groups.cluster_distance_px, 120.0);
        assert_eq!(config.signals.weapon.cooldown_seconds, Some(60.0));
        assert_eq!(config.signals.fight, SignalsConfig::default().fight);
        assert_eq!(config.alert_cooldown_seconds, 30.0);
        assert_eq!(config.tracker, TrackerConfig::default());
    }

    #[test]
    fn non_positive_thresholds_are_rejected() {
        let mut config = PipelineConfig::default();
        config.groups.cluster_distance_px = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "groups.cluster_distance_px",
                ..
            })
        ));

        let mut config = PipelineConfig::default();
        config.signals.fight.fade_seconds = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive {
                field: "signals.fight.fade_seconds",
                ..
            })
        ));

        let mut config = PipelineConfig::default();
        config.groups.vanish_seconds = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn structural_errors_are_rejected() {
        let mut config = PipelineConfig::default();
        config.groups.min_people = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroMinPeople)));

        let mut config = PipelineConfig::default();
        config.night.end_hour = 24;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidHour { .. })));

        let mut config = PipelineConfig::default();
        config.count_smoothing_window = 0;
        assert!(matches!(config.validate(), Err(ConfigError::WindowTooSmall { .. })));
    }

    #[test]
    fn partial_signal_table_keeps_that_signals_defaults() {
        let config =
            PipelineConfig::from_toml_str("[signals.fight]\nsustained_seconds = 2.0\n").unwrap();
        assert_eq!(config.signals.fight.sustained_seconds, 2.0);
        assert_eq!(config.signals.fight.continuity_seconds, 1.0);
        assert_eq!(config.signals.fight.fade_seconds, 5.0);
        assert_eq!(config.signals.fight.cooldown_seconds, None);
        assert_eq!(config.signals.weapon, SignalsConfig::default().weapon);

        let config = PipelineConfig::from_toml_str(
            "[signals.crowd_stationary]\ncooldown_seconds = 30.0\n",
        )
        .unwrap();
        assert_eq!(config.signals.crowd_stationary.sustained_seconds, 10.0);
        assert_eq!(config.signals.crowd_stationary.continuity_seconds, 2.0);
        assert_eq!(config.signals.crowd_stationary.cooldown_seconds, Some(30.0));
    }

    #[test]
    fn fade_may_not_be_shorter_than_continuity() {
        let mut config = PipelineConfig::default();
        config.signals.weapon.continuity_seconds = 2.0;
        config.signals.weapon.fade_seconds = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FadeShorterThanContinuity {
                field: "signals.weapon.fade_seconds",
                ..
            })
        ));

        // Equal windows are fine.
        config.signals.weapon.fade_seconds = 2.0;
        assert!(config.validate().is_ok());

        let err = PipelineConfig::from_toml_str(
            "[signals.fight]\ncontinuity_seconds = 6.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::FadeShorterThanContinuity { .. }));
    }

    #[test]
    fn unknown_signal_keys_are_parse_errors() {
        let err = PipelineConfig::from_toml_str("[signals.weapon]\nfade = 3.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_keys_are_parse_errors() {
        let err = PipelineConfig::from_toml_str("[groups]\nmin_poeple = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
