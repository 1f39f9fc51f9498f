//! # Configuration
//!
//! A single immutable [`RedirectionConfig`] value is validated once when a
//! trial is built and then passed by reference to every component. Runtime
//! choices that vary per avatar (which redirector or resetter it runs) are
//! selected through [`RedirectorKind`] / [`ResetterKind`], each with an
//! explicit name table.

use crate::error::{RdwError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectionConfig {
    pub min_translation_gain: f64,
    pub max_translation_gain: f64,
    pub min_rotation_gain: f64,
    pub max_rotation_gain: f64,
    /// Meters. Curvature magnitude never exceeds its inverse.
    pub curvature_radius: f64,
    /// Meters kept free around every boundary, obstacle and peer.
    pub reset_trigger_buffer: f64,
    pub target_fps: f64,
    /// Autopilot walking speed in m/s.
    pub translation_speed: f64,
    /// Autopilot turning speed in degrees/s.
    pub rotation_speed: f64,
    pub waypoint_threshold: f64,
    pub synchronized_reset: bool,
    pub max_reset_count: usize,
    /// Seconds an avatar may stand still before it is marked invalid.
    pub max_same_position_time: f64,
    /// m/s above which the user counts as walking.
    pub walking_threshold: f64,
    /// degrees/s above which the user counts as rotating.
    pub rotating_threshold: f64,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cell_size: f64,
    pub direction_samples: usize,
    pub radius_samples: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            cell_size: 0.5,
            direction_samples: 30,
            radius_samples: 5,
        }
    }
}

impl Default for RedirectionConfig {
    fn default() -> Self {
        RedirectionConfig {
            min_translation_gain: 0.86,
            max_translation_gain: 1.26,
            min_rotation_gain: 0.8,
            max_rotation_gain: 1.49,
            curvature_radius: 7.5,
            reset_trigger_buffer: 0.5,
            target_fps: 50.0,
            translation_speed: 1.0,
            rotation_speed: 90.0,
            waypoint_threshold: 0.05,
            synchronized_reset: true,
            max_reset_count: 1000,
            max_same_position_time: 50.0,
            walking_threshold: 0.2,
            rotating_threshold: 15.0,
            scheduler: SchedulerConfig::default(),
        }
    }
}

fn require_positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(RdwError::InvalidParameter { name, value })
    }
}

impl RedirectionConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RedirectionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, min, max) in [
            ("translation", self.min_translation_gain, self.max_translation_gain),
            ("rotation", self.min_rotation_gain, self.max_rotation_gain),
        ] {
            if !(min > 0.0 && max > 0.0) {
                return Err(RdwError::InvalidGainBounds(format!(
                    "{} gains must be positive, got [{}, {}]",
                    name, min, max
                )));
            }
            if min > max {
                return Err(RdwError::InvalidGainBounds(format!(
                    "min {} gain {} exceeds max {}",
                    name, min, max
                )));
            }
        }
        require_positive("curvature_radius", self.curvature_radius)?;
        require_positive("reset_trigger_buffer", self.reset_trigger_buffer)?;
        require_positive("target_fps", self.target_fps)?;
        require_positive("translation_speed", self.translation_speed)?;
        require_positive("rotation_speed", self.rotation_speed)?;
        require_positive("max_same_position_time", self.max_same_position_time)?;
        require_positive("scheduler.cell_size", self.scheduler.cell_size)?;
        if self.waypoint_threshold < 0.0 {
            return Err(RdwError::InvalidParameter {
                name: "waypoint_threshold",
                value: self.waypoint_threshold,
            });
        }
        if self.scheduler.direction_samples == 0 {
            return Err(RdwError::InvalidParameter {
                name: "scheduler.direction_samples",
                value: 0.0,
            });
        }
        if self.scheduler.radius_samples == 0 {
            return Err(RdwError::InvalidParameter {
                name: "scheduler.radius_samples",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Seconds per simulation step.
    pub fn dt(&self) -> f64 {
        1.0 / self.target_fps
    }

    pub fn gain_bounds(&self) -> GainBounds {
        GainBounds {
            min_translation: self.min_translation_gain,
            max_translation: self.max_translation_gain,
            min_rotation: self.min_rotation_gain,
            max_rotation: self.max_rotation_gain,
            curvature_radius: self.curvature_radius,
            buffer: self.reset_trigger_buffer,
        }
    }
}

/// Imperceptibility bounds every applied gain is clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainBounds {
    pub min_translation: f64,
    pub max_translation: f64,
    pub min_rotation: f64,
    pub max_rotation: f64,
    pub curvature_radius: f64,
    pub buffer: f64,
}

impl Default for GainBounds {
    fn default() -> Self {
        RedirectionConfig::default().gain_bounds()
    }
}

impl GainBounds {
    pub fn max_curvature(&self) -> f64 {
        1.0 / self.curvature_radius
    }

    /// Non-finite requests fall back to the neutral gain.
    pub fn clamp_translation(&self, gain: f64) -> f64 {
        let gain = if gain.is_finite() { gain } else { 1.0 };
        gain.clamp(self.min_translation, self.max_translation)
    }

    pub fn clamp_rotation(&self, gain: f64) -> f64 {
        let gain = if gain.is_finite() { gain } else { 1.0 };
        gain.clamp(self.min_rotation, self.max_rotation)
    }

    pub fn clamp_curvature(&self, curvature: f64) -> f64 {
        let curvature = if curvature.is_finite() { curvature } else { 0.0 };
        let limit = self.max_curvature();
        curvature.clamp(-limit, limit)
    }
}

macro_rules! name_table {
    ($kind:ident, $label:expr, [$(($variant:ident, $name:literal)),+ $(,)?]) => {
        impl $kind {
            pub const ALL: &'static [$kind] = &[$($kind::$variant),+];

            pub fn name(&self) -> &'static str {
                match self {
                    $($kind::$variant => $name),+
                }
            }
        }

        impl FromStr for $kind {
            type Err = RdwError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($kind::$variant),)+
                    other => Err(RdwError::UnknownStrategy(format!("{} '{}'", $label, other))),
                }
            }
        }

        impl fmt::Display for $kind {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl Serialize for $kind {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(self.name())
            }
        }

        impl<'de> Deserialize<'de> for $kind {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let name = String::deserialize(deserializer)?;
                name.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedirectorKind {
    Null,
    SteerToCenter,
    SteerToOrbit,
    ApfBasic,
    ApfSegmented,
    ApfDynamic,
    ApfHaptic,
    Scheduled,
}

name_table!(RedirectorKind, "redirector", [
    (Null, "null"),
    (SteerToCenter, "steer_to_center"),
    (SteerToOrbit, "steer_to_orbit"),
    (ApfBasic, "apf_basic"),
    (ApfSegmented, "apf_segmented"),
    (ApfDynamic, "apf_dynamic"),
    (ApfHaptic, "apf_haptic"),
    (Scheduled, "scheduled"),
]);

impl RedirectorKind {
    pub fn is_potential_field(&self) -> bool {
        matches!(
            self,
            RedirectorKind::ApfBasic
                | RedirectorKind::ApfSegmented
                | RedirectorKind::ApfDynamic
                | RedirectorKind::ApfHaptic
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResetterKind {
    Null,
    FreezeTurn,
    TwoOneTurn,
    CenterSeeking,
    GradientSeeking,
    Scheduled,
}

name_table!(ResetterKind, "resetter", [
    (Null, "null"),
    (FreezeTurn, "freeze_turn"),
    (TwoOneTurn, "two_one_turn"),
    (CenterSeeking, "center_seeking"),
    (GradientSeeking, "gradient_seeking"),
    (Scheduled, "scheduled"),
]);

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Defaults / Validation Tests ====================

    #[test]
    fn test_default_config_is_valid() {
        let config = RedirectionConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.dt() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let config = RedirectionConfig {
            min_translation_gain: 1.5,
            max_translation_gain: 1.2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RdwError::InvalidGainBounds(_))));
    }

    #[test]
    fn test_validate_rejects_non_positive_gain() {
        let config = RedirectionConfig {
            min_rotation_gain: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_radius_and_buffer() {
        let config = RedirectionConfig {
            curvature_radius: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RdwError::InvalidParameter {
                name: "curvature_radius",
                ..
            })
        ));
        let config = RedirectionConfig {
            reset_trigger_buffer: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_direction_samples() {
        let mut config = RedirectionConfig::default();
        config.scheduler.direction_samples = 0;
        assert!(config.validate().is_err());
    }

    // ==================== JSON Tests ====================

    #[test]
    fn test_from_json_partial_uses_defaults() {
        let config = RedirectionConfig::from_json(r#"{"curvature_radius": 10.0, "scheduler": {"cell_size": 1.0}}"#).unwrap();
        assert_eq!(config.curvature_radius, 10.0);
        assert_eq!(config.scheduler.cell_size, 1.0);
        assert_eq!(config.scheduler.direction_samples, 30);
        assert_eq!(config.max_translation_gain, 1.26);
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(RedirectionConfig::from_json("{"), Err(RdwError::Config(_))));
    }

    #[test]
    fn test_from_json_invalid_values() {
        assert!(RedirectionConfig::from_json(r#"{"target_fps": 0}"#).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = RedirectionConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(RedirectionConfig::from_json(&json).unwrap(), config);
    }

    // ==================== GainBounds Tests ====================

    #[test]
    fn test_clamp_translation() {
        let bounds = GainBounds::default();
        assert_eq!(bounds.clamp_translation(2.0), 1.26);
        assert_eq!(bounds.clamp_translation(0.1), 0.86);
        assert_eq!(bounds.clamp_translation(1.1), 1.1);
        assert_eq!(bounds.clamp_translation(f64::NAN), 1.0);
    }

    #[test]
    fn test_clamp_curvature_symmetric() {
        let bounds = GainBounds::default();
        let limit = 1.0 / 7.5;
        assert!((bounds.clamp_curvature(1.0) - limit).abs() < 1e-12);
        assert!((bounds.clamp_curvature(-1.0) + limit).abs() < 1e-12);
        assert_eq!(bounds.clamp_curvature(f64::INFINITY), 0.0);
    }

    // ==================== Name Table Tests ====================

    #[test]
    fn test_redirector_names_round_trip() {
        for kind in RedirectorKind::ALL {
            assert_eq!(kind.name().parse::<RedirectorKind>().unwrap(), *kind);
        }
        assert_eq!(RedirectorKind::ApfSegmented.to_string(), "apf_segmented");
    }

    #[test]
    fn test_resetter_names_round_trip() {
        for kind in ResetterKind::ALL {
            assert_eq!(kind.name().parse::<ResetterKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn test_unknown_strategy_name() {
        let err = "s2c".parse::<RedirectorKind>().unwrap_err();
        assert!(matches!(err, RdwError::UnknownStrategy(_)));
    }

    #[test]
    fn test_kind_serde_by_name() {
        let json = serde_json::to_string(&ResetterKind::TwoOneTurn).unwrap();
        assert_eq!(json, "\"two_one_turn\"");
        let kind: RedirectorKind = serde_json::from_str("\"steer_to_orbit\"").unwrap();
        assert_eq!(kind, RedirectorKind::SteerToOrbit);
        assert!(serde_json::from_str::<RedirectorKind>("\"bogus\"").is_err());
    }

    #[test]
    fn test_is_potential_field() {
        assert!(RedirectorKind::ApfDynamic.is_potential_field());
        assert!(!RedirectorKind::SteerToCenter.is_potential_field());
    }
}
