// THEORY:
// The `pipeline` module is the top-level API for the alerting engine. It wires the
// three stateful layers together behind one call per frame and hides their
// interplay from the caller: detections and a timestamp go in, alert events and a
// fresh render state come out.
//
// Stages, in order, for every frame:
// 1.  **Boundary Filtering**: malformed detections are dropped one by one, and each
//     class is thresholded on its own minimum confidence.
// 2.  **Identity**: person boxes drive the `IdentityTracker`; the stationary query
//     and the smoothed head count are derived from it.
// 3.  **Groups**: the `SpatialGroupEngine` clusters the live identities and reports
//     the groups that completed this frame.
// 4.  **Signals**: the stationary-crowd, weapon and fight gates each see one
//     observation and decide whether to alert.
// 5.  **Render**: the display state is rebuilt from scratch.
//
// The processor is synchronous and owns all of its state. One instance serves one
// camera stream; independent streams use independent instances.

use crate::config::PipelineConfig;
use crate::core_modules::count_smoother::CountSmoother;
use crate::core_modules::detection::BoundingBox;
use crate::core_modules::group_engine::SpatialGroupEngine;
use crate::core_modules::render::{GroupView, SignalView};
use crate::core_modules::schedule;
use crate::core_modules::signal_gate::{GateSettings, SignalKind, SustainedSignalGate};
use crate::core_modules::tracker::IdentityTracker;
use crate::error::ConfigError;
use tracing::{debug, info, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::alert::{AlertEvent, AlertKind, AlertPayload, Severity};
pub use crate::core_modules::detection::{Detection, ObjectClass};
pub use crate::core_modules::group_engine::Group;
pub use crate::core_modules::render::RenderState;

/// The external detector, seen as a port. Any error it returns is treated exactly
/// like a frame with no detections.
pub trait DetectionSource {
    type Error: std::fmt::Display;

    fn detect(&mut self) -> Result<Vec<Detection>, Self::Error>;
}

/// Everything the engine needs to know about one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInput {
    pub detections: Vec<Detection>,
    /// Monotonic timestamp in seconds.
    pub now: f64,
    /// Local wall-clock hour, used to arm the night-time stationary-crowd rule.
    pub local_hour: Option<u8>,
}

impl FrameInput {
    pub fn new(detections: Vec<Detection>, now: f64) -> Self {
        Self {
            detections,
            now,
            local_hour: None,
        }
    }

    pub fn with_hour(mut self, hour: u8) -> Self {
        self.local_hour = Some(hour);
        self
    }
}

/// The output of the engine for a single frame.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub alerts: Vec<AlertEvent>,
    pub render: RenderState,
    /// Detections rejected at the boundary this frame.
    pub dropped: usize,
}

impl FrameReport {
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// Detections of one frame, split by class after validation and thresholding.
#[derive(Default)]
struct SortedDetections {
    persons: Vec<BoundingBox>,
    weapons: Vec<Detection>,
    fights: Vec<Detection>,
    dropped: usize,
}

/// The per-stream orchestrator.
pub struct FrameProcessor {
    config: PipelineConfig,
    frame_rate: f64,
    tracker: IdentityTracker,
    group_engine: SpatialGroupEngine,
    smoother: CountSmoother,
    weapon_gate: SustainedSignalGate,
    fight_gate: SustainedSignalGate,
    stationary_gate: SustainedSignalGate,
    last_now: Option<f64>,
    frames_processed: u64,
}

impl FrameProcessor {
    pub fn new(config: PipelineConfig, frame_rate: f64) -> Result<Self, ConfigError> {
        config.validate()?;
        crate::config::positive("frame_rate", frame_rate)?;

        let gate = |kind, signal| {
            SustainedSignalGate::new(
                kind,
                GateSettings::resolve(signal, config.alert_cooldown_seconds, frame_rate),
            )
        };
        let weapon_gate = gate(SignalKind::Weapon, &config.signals.weapon);
        let fight_gate = gate(SignalKind::Fight, &config.signals.fight);
        let stationary_gate = gate(SignalKind::CrowdStationary, &config.signals.crowd_stationary);

        Ok(Self {
            tracker: IdentityTracker::new(
                config.tracker.max_disappear_frames,
                config.tracker.max_distance_px,
            ),
            group_engine: SpatialGroupEngine::new(config.groups.clone()),
            smoother: CountSmoother::new(config.count_smoothing_window),
            weapon_gate,
            fight_gate,
            stationary_gate,
            config,
            frame_rate,
            last_now: None,
            frames_processed: 0,
        })
    }

    /// Pulls detections from `source` and processes them. A failing detector yields
    /// an empty frame rather than an error.
    pub fn process_with<S: DetectionSource>(
        &mut self,
        source: &mut S,
        now: f64,
        local_hour: Option<u8>,
    ) -> FrameReport {
        let detections = match source.detect() {
            Ok(detections) => detections,
            Err(e) => {
                warn!(error = %e, "detector failed; treating frame as empty");
                Vec::new()
            }
        };
        self.process_frame(FrameInput {
            detections,
            now,
            local_hour,
        })
    }

    /// Convenience wrapper: true when this frame raised at least one alert.
    pub fn alert_raised(&mut self, input: FrameInput) -> bool {
        self.process_frame(input).has_alerts()
    }

    pub fn process_frame(&mut self, input: FrameInput) -> FrameReport {
        let now = self.monotonic(input.now);
        self.frames_processed += 1;

        // Stage 1: Boundary filtering
        let sorted = self.sort_detections(input.detections);

        // Stage 2: Identity
        let centroids = self.tracker.update(&sorted.persons);
        let boxes = self.tracker.boxes();
        let stationary = self.tracker.stationary(self.config.tracker.movement_threshold_px);
        let raw_count = centroids.len();
        let people_count = self.smoother.push(raw_count);

        // Stage 3: Groups
        let mut alerts = Vec::new();
        let groups = self.group_engine.update(&centroids, &boxes, now);
        for group in &groups.completed {
            alerts.push(AlertEvent::group_complete(
                now,
                group.id,
                group.count(),
                group.elapsed(now),
            ));
        }

        // Stage 4: Signals
        let night = input
            .local_hour
            .is_some_and(|hour| schedule::is_night(hour, &self.config.night));
        let crowd_still =
            night && people_count >= self.config.groups.min_people && !stationary.is_empty();
        if self.stationary_gate.observe(crowd_still, 0.0, now).is_some() {
            alerts.push(AlertEvent::group_stationary(now, people_count, stationary.len()));
        }

        let weapon_peak = peak(&sorted.weapons);
        if let Some(trigger) =
            self.weapon_gate
                .observe(weapon_peak.is_some(), weapon_peak.map_or(0.0, |d| d.confidence), now)
        {
            alerts.push(AlertEvent::weapon(now, trigger.confidence));
        }

        let fight_peak = peak(&sorted.fights);
        if let Some(trigger) =
            self.fight_gate
                .observe(fight_peak.is_some(), fight_peak.map_or(0.0, |d| d.confidence), now)
        {
            let object_id = fight_peak
                .and_then(|d| self.tracker.nearest_within_reach(&d.bbox.centroid()));
            alerts.push(AlertEvent::fight(now, trigger.confidence, object_id));
        }

        for alert in &alerts {
            info!(
                kind = %alert.kind,
                timestamp = alert.timestamp,
                confidence = alert.confidence,
                "alert raised"
            );
        }

        // Stage 5: Render
        let duration = self.config.groups.duration_seconds;
        let render = RenderState {
            timestamp: now,
            groups: groups
                .active
                .iter()
                .map(|g| GroupView::from_group(g, now, duration))
                .collect(),
            weapon: signal_view(&self.weapon_gate),
            fight: signal_view(&self.fight_gate),
            crowd_stationary: signal_view(&self.stationary_gate),
            people_count,
            raw_people_count: raw_count,
            stationary_count: stationary.len(),
        };

        debug!(
            frame = self.frames_processed,
            raw_people = raw_count,
            people = people_count,
            groups = render.groups.len(),
            dropped = sorted.dropped,
            "frame processed"
        );

        FrameReport {
            alerts,
            render,
            dropped: sorted.dropped,
        }
    }

    fn sort_detections(&self, detections: Vec<Detection>) -> SortedDetections {
        let thresholds = &self.config.detection;
        let mut sorted = SortedDetections::default();
        for detection in detections {
            if let Err(e) = detection.validate() {
                debug!(error = %e, class = ?detection.class_label, "dropping detection");
                sorted.dropped += 1;
                continue;
            }
            match detection.class_label {
                ObjectClass::Person if detection.confidence >= thresholds.person_min_confidence => {
                    sorted.persons.push(detection.bbox)
                }
                ObjectClass::Weapon if detection.confidence >= thresholds.weapon_min_confidence => {
                    sorted.weapons.push(detection)
                }
                ObjectClass::FightSignal
                    if detection.confidence >= thresholds.fight_min_confidence =>
                {
                    sorted.fights.push(detection)
                }
                _ => {}
            }
        }
        sorted
    }

    /// Clamps backwards or non-finite timestamps to the previous frame's time (zero
    /// before the first valid frame).
    fn monotonic(&mut self, now: f64) -> f64 {
        let now = match self.last_now {
            _ if !now.is_finite() => {
                let last = self.last_now.unwrap_or(0.0);
                warn!(now, last, "timestamp is not finite; clamping");
                last
            }
            Some(last) if now < last => {
                warn!(now, last, "timestamp went backwards; clamping");
                last
            }
            _ => now,
        };
        self.last_now = Some(now);
        now
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn tracker(&self) -> &IdentityTracker {
        &self.tracker
    }

    pub fn group_engine(&self) -> &SpatialGroupEngine {
        &self.group_engine
    }

    pub fn gate(&self, kind: SignalKind) -> &SustainedSignalGate {
        match kind {
            SignalKind::Weapon => &self.weapon_gate,
            SignalKind::Fight => &self.fight_gate,
            SignalKind::CrowdStationary => &self.stationary_gate,
        }
    }
}

fn peak(detections: &[Detection]) -> Option<&Detection> {
    detections
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

fn signal_view(gate: &SustainedSignalGate) -> SignalView {
    SignalView {
        detected: gate.state().detected,
        confidence: gate.display_confidence(),
    }
}
