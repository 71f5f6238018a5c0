// THEORY:
// `RenderState` is the read-only picture of the engine that the presentation layer
// draws each frame: the live groups with their timers and boxes, the weapon/fight
// indicators, and the crowd counters. It is rebuilt from scratch every frame, so
// consumers never have to reconcile diffs.
//
// The module also owns the small formatting rules the HUD relies on (clock text,
// per-group colours) so every front end renders the same words and colours.

use crate::core_modules::detection::BoundingBox;
use crate::core_modules::group_engine::{Group, GroupId};
use serde::Serialize;

/// Groups listed on the HUD; the rest are still drawn, just not itemised.
pub const HUD_MAX_GROUPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupView {
    pub id: GroupId,
    pub member_count: usize,
    /// Seconds on the group's timer. Frozen at the target duration once completed.
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    pub duration_seconds: f64,
    pub completed: bool,
    pub bbox: Option<BoundingBox>,
    /// RGB colour used to draw this group.
    pub color: [u8; 3],
}

impl GroupView {
    pub fn from_group(group: &Group, now: f64, duration_seconds: f64) -> Self {
        let elapsed = if group.completed {
            duration_seconds
        } else {
            group.elapsed(now)
        };
        Self {
            id: group.id,
            member_count: group.count(),
            elapsed_seconds: elapsed,
            remaining_seconds: (duration_seconds - elapsed).max(0.0),
            duration_seconds,
            completed: group.completed,
            bbox: group.bbox,
            color: group_color(group.id),
        }
    }

    /// `Group 3: 6 ppl | 01:05 / 120s (00:55 left)`
    pub fn timer_text(&self) -> String {
        format!(
            "Group {}: {} ppl | {} / {}s ({} left)",
            self.id,
            self.member_count,
            format_clock(self.elapsed_seconds),
            self.duration_seconds as u64,
            format_clock(self.remaining_seconds)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalView {
    pub detected: bool,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenderState {
    pub timestamp: f64,
    pub groups: Vec<GroupView>,
    pub weapon: SignalView,
    pub fight: SignalView,
    pub crowd_stationary: SignalView,
    /// Smoothed person count.
    pub people_count: usize,
    pub raw_people_count: usize,
    pub stationary_count: usize,
}

impl RenderState {
    /// The text lines of the top-left HUD panel.
    pub fn hud_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(3 + HUD_MAX_GROUPS);
        lines.push(signal_line("Weapon", &self.weapon));
        lines.push(signal_line("Fight", &self.fight));

        let mut crowd = format!("Crowd: {} people", self.people_count);
        if self.raw_people_count != self.people_count {
            crowd.push_str(&format!(" (raw: {})", self.raw_people_count));
        }
        lines.push(crowd);

        lines.extend(self.groups.iter().take(HUD_MAX_GROUPS).map(GroupView::timer_text));
        lines
    }
}

fn signal_line(label: &str, view: &SignalView) -> String {
    if view.detected {
        format!("{label}: DETECTED {:.2}", view.confidence)
    } else {
        format!("{label}: SAFE")
    }
}

/// `mm:ss`, truncating fractional seconds.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Deterministic colour per group id: the hue steps 37 places round a 180-step wheel
/// per id, at fixed saturation (200/255) and full value. Id 0 is white.
pub fn group_color(id: GroupId) -> [u8; 3] {
    if id == 0 {
        return [255, 255, 255];
    }
    let hue_degrees = ((id * 37) % 180) as f64 * 2.0;
    let value = 255.0;
    let chroma = value * (200.0 / 255.0);
    let sector = hue_degrees / 60.0;
    let x = chroma * (1.0 - ((sector % 2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    [
        (r + m).round() as u8,
        (g + m).round() as u8,
        (b + m).round() as u8,
    ]
}
