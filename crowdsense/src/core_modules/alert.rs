// THEORY:
// An `AlertEvent` is the only thing the engine pushes *out* of its own accord. It is
// an immutable record: once built by the orchestrator it is handed over to the
// alerting boundary (HTTP post, spreadsheet row, audible beep) and never touched again.
//
// The payload is a tagged variant so that each consumer can pattern-match on exactly
// the fields that make sense for the alert type, and serialises to the flat JSON
// shape downstream services expect.

use crate::core_modules::group_engine::GroupId;
use crate::core_modules::tracker::ObjectId;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Weapon,
    Fight,
    CrowdGroupComplete,
    GroupStationary,
}

impl AlertKind {
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::Weapon | AlertKind::Fight => Severity::High,
            AlertKind::CrowdGroupComplete | AlertKind::GroupStationary => Severity::Medium,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::Weapon => "weapon",
            AlertKind::Fight => "fight",
            AlertKind::CrowdGroupComplete => "crowd_group_complete",
            AlertKind::GroupStationary => "group_stationary",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
}

/// Type-specific alert details.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AlertPayload {
    Group {
        group_id: GroupId,
        people_count: usize,
        duration_seconds: f64,
    },
    Object {
        object_id: Option<ObjectId>,
        confidence: f32,
    },
    Signal {
        confidence: f32,
    },
    Stationary {
        people_count: usize,
        stationary_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    /// Caller-supplied timestamp (seconds) of the frame that raised the alert.
    pub timestamp: f64,
    /// Detector confidence, or zero when not applicable.
    pub confidence: f32,
    pub payload: AlertPayload,
}

impl AlertEvent {
    pub fn new(kind: AlertKind, timestamp: f64, confidence: f32, payload: AlertPayload) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            timestamp,
            confidence,
            payload,
        }
    }

    pub fn group_complete(
        timestamp: f64,
        group_id: GroupId,
        people_count: usize,
        duration_seconds: f64,
    ) -> Self {
        Self::new(
            AlertKind::CrowdGroupComplete,
            timestamp,
            0.0,
            AlertPayload::Group {
                group_id,
                people_count,
                duration_seconds,
            },
        )
    }

    pub fn weapon(timestamp: f64, confidence: f32) -> Self {
        Self::new(
            AlertKind::Weapon,
            timestamp,
            confidence,
            AlertPayload::Signal { confidence },
        )
    }

    pub fn fight(timestamp: f64, confidence: f32, object_id: Option<ObjectId>) -> Self {
        Self::new(
            AlertKind::Fight,
            timestamp,
            confidence,
            AlertPayload::Object {
                object_id,
                confidence,
            },
        )
    }

    pub fn group_stationary(timestamp: f64, people_count: usize, stationary_count: usize) -> Self {
        Self::new(
            AlertKind::GroupStationary,
            timestamp,
            0.0,
            AlertPayload::Stationary {
                people_count,
                stationary_count,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_kind() {
        assert_eq!(AlertEvent::weapon(1.0, 0.9).severity, Severity::High);
        assert_eq!(AlertEvent::fight(1.0, 0.9, Some(3)).severity, Severity::High);
        assert_eq!(AlertEvent::group_complete(1.0, 1, 6, 120.0).severity, Severity::Medium);
        assert_eq!(AlertEvent::group_stationary(1.0, 6, 2).severity, Severity::Medium);
    }

    #[test]
    fn crowd_alerts_carry_no_confidence() {
        let event = AlertEvent::group_complete(120.0, 4, 6, 120.0);
        assert_eq!(event.kind.to_string(), "crowd_group_complete");
        assert_eq!(event.confidence, 0.0);
        assert_eq!(
            event.payload,
            AlertPayload::Group {
                group_id: 4,
                people_count: 6,
                duration_seconds: 120.0
            }
        );
    }
}
