// THEORY:
// The `SustainedSignalGate` is the debouncer that stands between a flicker-prone
// classifier and an operator's pager. A weapon detector that fires on one frame in
// thirty is noise; one that fires on every frame for three seconds is an incident.
// The gate turns a raw per-frame `(positive, confidence)` stream into a trustworthy
// "alert now" decision.
//
// Key architectural principles:
// 1.  **Three Separate Clocks**:
//     - the *continuity window* decides whether a positive frame extends the current
//       run or starts a new one, so brief detector dropouts do not reset progress;
//     - the *sustained threshold* (a frame count derived from seconds × frame rate)
//       decides when a run is long enough to trust;
//     - the *fade window* keeps the outward "detected" indicator lit for a while after
//       the last hit, purely for display.
// 2.  **One Alert Per Run**: A qualified run is marked alerted the moment it first
//     qualifies. It cannot alert again until it breaks and a fresh run re-accumulates
//     the full threshold.
// 3.  **Cooldown**: Independently of runs, two alerts from the same gate are never
//     closer together than the cooldown interval. A run that qualifies inside the
//     cooldown is consumed silently.
// 4.  **One Implementation, Many Signals**: Weapons, fights and stationary crowds all
//     share this state machine; only the `SignalConfig` differs.

use crate::config::SignalConfig;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// The monitored signal a gate is debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Weapon,
    Fight,
    CrowdStationary,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::Weapon => "weapon",
            SignalKind::Fight => "fight",
            SignalKind::CrowdStationary => "crowd_stationary",
        };
        f.write_str(name)
    }
}

/// The mutable per-signal bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalState {
    /// Outward-facing indicator: true once a run qualified, false again after the fade window.
    pub detected: bool,
    /// Timestamp of the most recent positive frame.
    pub last_positive_time: Option<f64>,
    /// Peak confidence of the current run.
    pub confidence: f32,
    /// Positive frames in the current run.
    pub consecutive_positive_frames: u32,
    /// Timestamp of the most recent emitted alert.
    pub last_alert_time: Option<f64>,
    /// Whether the current run has already been consumed by an alert decision.
    pub alert_sent: bool,
}

/// Thresholds resolved against the stream frame rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    pub sustained_frames: u32,
    pub continuity_seconds: f64,
    pub fade_seconds: f64,
    pub cooldown_seconds: f64,
}

impl GateSettings {
    pub fn resolve(config: &SignalConfig, default_cooldown: f64, frame_rate: f64) -> Self {
        Self {
            sustained_frames: sustained_frames(config.sustained_seconds, frame_rate),
            continuity_seconds: config.continuity_seconds,
            fade_seconds: config.fade_seconds,
            cooldown_seconds: config.cooldown_seconds.unwrap_or(default_cooldown),
        }
    }
}

/// Frame-count equivalent of a duration, never below one frame.
pub fn sustained_frames(seconds: f64, frame_rate: f64) -> u32 {
    (seconds * frame_rate).round().max(1.0) as u32
}

/// Emitted by `observe` when a qualified run is allowed to alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateTrigger {
    pub kind: SignalKind,
    /// Peak confidence of the run that triggered.
    pub confidence: f32,
    pub run_frames: u32,
}

pub struct SustainedSignalGate {
    kind: SignalKind,
    settings: GateSettings,
    state: SignalState,
}

impl SustainedSignalGate {
    pub fn new(kind: SignalKind, settings: GateSettings) -> Self {
        Self {
            kind,
            settings,
            state: SignalState::default(),
        }
    }

    /// Feeds one frame of the raw signal. Returns a trigger when an alert is due.
    pub fn observe(&mut self, positive: bool, confidence: f32, now: f64) -> Option<GateTrigger> {
        let s = &mut self.state;

        // --- 1. Run break ---
        if let Some(last) = s.last_positive_time {
            if s.consecutive_positive_frames > 0 && now - last > self.settings.continuity_seconds {
                debug!(signal = %self.kind, frames = s.consecutive_positive_frames, "run broken");
                s.consecutive_positive_frames = 0;
                s.alert_sent = false;
            }
        }

        // --- 2. Accumulate ---
        if positive {
            if s.consecutive_positive_frames > 0 {
                s.consecutive_positive_frames = s.consecutive_positive_frames.saturating_add(1);
                s.confidence = s.confidence.max(confidence);
            } else {
                s.consecutive_positive_frames = 1;
                s.confidence = confidence;
                s.alert_sent = false;
            }
            s.last_positive_time = Some(now);
        }

        let qualified = s.consecutive_positive_frames >= self.settings.sustained_frames;
        if positive && qualified {
            s.detected = true;
        }

        // --- 3. Alert decision ---
        let mut trigger = None;
        if qualified && !s.alert_sent {
            s.alert_sent = true;
            let cooled = s
                .last_alert_time
                .is_none_or(|t| now - t >= self.settings.cooldown_seconds);
            if cooled {
                s.last_alert_time = Some(now);
                trigger = Some(GateTrigger {
                    kind: self.kind,
                    confidence: s.confidence,
                    run_frames: s.consecutive_positive_frames,
                });
            } else {
                debug!(signal = %self.kind, "qualified run suppressed by cooldown");
            }
        }

        // --- 4. Fade (display only) ---
        if s.detected {
            if let Some(last) = s.last_positive_time {
                if now - last > self.settings.fade_seconds {
                    s.detected = false;
                }
            }
        }

        trigger
    }

    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    pub fn state(&self) -> &SignalState {
        &self.state
    }

    /// Confidence to show alongside the indicator; zero once faded.
    pub fn display_confidence(&self) -> f32 {
        if self.state.detected {
            self.state.confidence
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FPS: f64 = 10.0;

    fn gate() -> SustainedSignalGate {
        let config = SignalConfig {
            sustained_seconds: 1.0,
            continuity_seconds: 0.5,
            fade_seconds: 2.0,
            cooldown_seconds: None,
        };
        SustainedSignalGate::new(SignalKind::Weapon, GateSettings::resolve(&config, 5.0, FPS))
    }

    /// Feeds frames `from..to` (frame n at t = n / FPS) and returns the frames that triggered.
    fn feed(gate: &mut SustainedSignalGate, from: u32, to: u32, positive: bool) -> Vec<u32> {
        (from..to)
            .filter(|n| gate.observe(positive, 0.8, *n as f64 / FPS).is_some())
            .collect()
    }

    #[test]
    fn frames_are_derived_from_seconds() {
        assert_eq!(sustained_frames(3.0, 30.0), 90);
        assert_eq!(sustained_frames(0.01, 30.0), 1);
        assert_eq!(gate().settings().sustained_frames, 10);
    }

    #[test]
    fn one_short_of_threshold_never_qualifies() {
        let mut g = gate();
        assert!(feed(&mut g, 1, 10, true).is_empty());
        assert!(feed(&mut g, 10, 60, false).is_empty());
        assert!(!g.state().detected);
        assert_eq!(g.state().consecutive_positive_frames, 0);
    }

    #[test]
    fn threshold_qualifies_exactly_once() {
        let mut g = gate();
        assert_eq!(feed(&mut g, 1, 40, true), vec![10]);
        assert!(g.state().detected);
    }

    #[test]
    fn brief_gap_keeps_the_run() {
        let mut g = gate();
        feed(&mut g, 1, 6, true);
        // Two missed frames: 0.3s < continuity.
        feed(&mut g, 6, 8, false);
        assert_eq!(g.state().consecutive_positive_frames, 5);
        assert_eq!(feed(&mut g, 8, 13, true), vec![12]);
    }

    #[test]
    fn long_gap_restarts_the_count() {
        let mut g = gate();
        feed(&mut g, 1, 8, true);
        feed(&mut g, 8, 20, false);
        assert_eq!(g.state().consecutive_positive_frames, 0);
        // Needs the full ten frames again.
        assert_eq!(feed(&mut g, 20, 35, true), vec![29]);
    }

    #[test]
    fn cooldown_suppresses_close_runs() {
        let mut g = gate();
        assert_eq!(feed(&mut g, 0, 12, true), vec![9]);
        feed(&mut g, 12, 20, false);
        // Second run qualifies at frame 29 (t=2.9), within 5s of t=0.9.
        assert!(feed(&mut g, 20, 40, true).is_empty());
    }

    #[test]
    fn runs_past_cooldown_alert_again() {
        let mut g = gate();
        assert_eq!(feed(&mut g, 0, 12, true), vec![9]);
        feed(&mut g, 12, 60, false);
        assert_eq!(feed(&mut g, 60, 80, true), vec![69]);
    }

    #[test]
    fn fade_clears_indicator_but_not_counters() {
        let mut g = gate();
        feed(&mut g, 0, 10, true);
        assert!(g.state().detected);
        assert!((g.display_confidence() - 0.8).abs() < f32::EPSILON);

        // Still lit 2s after the last hit.
        g.observe(false, 0.0, 2.9);
        assert!(g.state().detected);
        g.observe(false, 0.0, 3.0);
        assert!(!g.state().detected);
        assert_eq!(g.display_confidence(), 0.0);
        assert_eq!(g.state().last_alert_time, Some(0.9));
    }

    #[test]
    fn endless_run_saturates_its_frame_count() {
        let mut g = gate();
        g.observe(true, 0.8, 0.0);
        g.state.consecutive_positive_frames = u32::MAX;
        g.observe(true, 0.8, 0.1);
        assert_eq!(g.state().consecutive_positive_frames, u32::MAX);
    }

    #[test]
    fn run_confidence_is_the_peak() {
        let mut g = gate();
        let confidences = [0.3, 0.9, 0.5, 0.4, 0.6, 0.7, 0.2, 0.3, 0.4, 0.5];
        let mut trigger = None;
        for (n, c) in confidences.iter().enumerate() {
            trigger = trigger.or(g.observe(true, *c, n as f64 / FPS));
        }
        let trigger = trigger.expect("run of ten frames should trigger");
        assert_eq!(trigger.confidence, 0.9);
        assert_eq!(trigger.run_frames, 10);
    }
}
