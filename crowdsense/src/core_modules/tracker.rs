// THEORY:
// The `tracker` module adds "object permanence" to the engine. The detector hands
// us a stateless list of person boxes each frame; the `IdentityTracker` associates
// them with the people it was already following and gives each one an integer
// identity that stays put while that person remains in view.
//
// This module solves the "data association problem" with the simplest rule that
// holds up in practice: greedy nearest-centroid matching.
//
// Key architectural principles:
// 1.  **Object Persistence**: A `TrackedObject` represents one person's existence
//     *over time*. It is distinct from a `Detection`, which is a snapshot in a
//     single frame.
// 2.  **Deterministic Matching**: Existing objects are visited in ascending id order
//     and each claims the nearest incoming centroid that nobody has claimed yet.
//     Ties always go to the older identity.
// 3.  **Lifecycle Management**:
//     - **Birth**: An incoming box nobody claimed becomes a new object.
//     - **Tracking**: A claimed box refreshes the object's centroid and resets its
//       disappearance counter.
//     - **Death**: An object unseen for more than `max_disappear` frames is removed.
//       Its id is never handed out again.
// 4.  **Arena Storage**: Objects live in a `BTreeMap` keyed by id. Lookup, insert and
//     eviction are cheap and iteration order is the id order the matcher relies on.
// 5.  **Read-Only Snapshots**: Downstream layers (the group engine) only ever see
//     copies of the id → centroid and id → box tables.

use crate::core_modules::detection::{BoundingBox, Point};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Stable integer identity assigned to a tracked person.
pub type ObjectId = u64;

/// Represents a person that is being tracked across multiple frames.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedObject {
    /// A unique and persistent id for this object. Never reused.
    pub id: ObjectId,
    /// The centroid of the box this object was last matched to.
    pub centroid: Point,
    /// The centroid as of the previous `stationary` query.
    pub last_centroid: Point,
    /// The box this object was last matched to.
    pub bbox: BoundingBox,
    /// Consecutive frames this object has gone unmatched.
    pub disappeared_frames: u32,
}

impl TrackedObject {
    fn new(id: ObjectId, bbox: BoundingBox) -> Self {
        let centroid = bbox.centroid();
        Self {
            id,
            centroid,
            last_centroid: centroid,
            bbox,
            disappeared_frames: 0,
        }
    }

    fn observe(&mut self, bbox: BoundingBox, centroid: Point) {
        self.bbox = bbox;
        self.centroid = centroid;
        self.disappeared_frames = 0;
    }
}

/// Assigns persistent identities to person boxes from one frame to the next.
#[derive(Debug, Clone)]
pub struct IdentityTracker {
    /// The objects currently being tracked, keyed by id.
    objects: BTreeMap<ObjectId, TrackedObject>,
    /// A counter to ensure each new object gets a unique id.
    next_id: ObjectId,
    /// Frames an object may go unmatched before it is deregistered.
    max_disappear: u32,
    /// Max centroid distance (pixels) for a box to count as the same object.
    max_distance: f64,
}

impl IdentityTracker {
    pub fn new(max_disappear: u32, max_distance: f64) -> Self {
        Self {
            objects: BTreeMap::new(),
            next_id: 0,
            max_disappear,
            max_distance,
        }
    }

    /// Updates the tracker with the person boxes of the current frame and returns
    /// the live id → centroid table.
    pub fn update(&mut self, rects: &[BoundingBox]) -> BTreeMap<ObjectId, Point> {
        let incoming: Vec<Point> = rects.iter().map(BoundingBox::centroid).collect();
        let mut claimed: HashSet<usize> = HashSet::with_capacity(incoming.len());

        // --- 1. Matching ---
        // Ascending id order, each object takes the nearest unclaimed centroid.
        if !self.objects.is_empty() {
            for object in self.objects.values_mut() {
                let mut best: Option<(usize, f64)> = None;
                for (j, centroid) in incoming.iter().enumerate() {
                    if claimed.contains(&j) {
                        continue;
                    }
                    let dist = object.centroid.distance(centroid);
                    if best.is_none_or(|(_, best_dist)| dist < best_dist) {
                        best = Some((j, dist));
                    }
                }

                match best {
                    Some((j, dist)) if dist <= self.max_distance => {
                        object.observe(rects[j], incoming[j]);
                        claimed.insert(j);
                    }
                    _ => object.disappeared_frames = object.disappeared_frames.saturating_add(1),
                }
            }
        }

        // --- 2. Birth ---
        for (j, rect) in rects.iter().enumerate() {
            if !claimed.contains(&j) {
                self.register(*rect);
            }
        }

        // --- 3. Death ---
        let max_disappear = self.max_disappear;
        self.objects.retain(|id, object| {
            let keep = object.disappeared_frames <= max_disappear;
            if !keep {
                debug!(object_id = id, "deregistering object");
            }
            keep
        });

        self.snapshot()
    }

    fn register(&mut self, bbox: BoundingBox) {
        let id = self.next_id;
        self.next_id += 1;
        self.objects.insert(id, TrackedObject::new(id, bbox));
    }

    /// Returns the ids whose centroid moved at most `movement_threshold` pixels since
    /// the previous call, then records the current centroids for the next call.
    pub fn stationary(&mut self, movement_threshold: f64) -> BTreeSet<ObjectId> {
        let mut still = BTreeSet::new();
        for (id, object) in self.objects.iter_mut() {
            if object.centroid.distance(&object.last_centroid) <= movement_threshold {
                still.insert(*id);
            }
            object.last_centroid = object.centroid;
        }
        still
    }

    /// A copy of the live id → centroid table. No side effects.
    pub fn snapshot(&self) -> BTreeMap<ObjectId, Point> {
        self.objects
            .iter()
            .map(|(id, object)| (*id, object.centroid))
            .collect()
    }

    /// A copy of the live id → last matched box table.
    pub fn boxes(&self) -> BTreeMap<ObjectId, BoundingBox> {
        self.objects
            .iter()
            .map(|(id, object)| (*id, object.bbox))
            .collect()
    }

    /// The live object nearest to `point`, if one lies within the matching distance.
    pub fn nearest_within_reach(&self, point: &Point) -> Option<ObjectId> {
        self.objects
            .values()
            .map(|object| (object.id, object.centroid.distance(point)))
            .filter(|(_, dist)| *dist <= self.max_distance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&TrackedObject> {
        self.objects.get(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i32, y: i32) -> BoundingBox {
        BoundingBox::new(x, y, x + 10, y + 10)
    }

    #[test]
    fn small_step_keeps_identity() {
        let mut tracker = IdentityTracker::new(5, 50.0);
        let first = tracker.update(&[BoundingBox::new(10, 10, 20, 20)]);
        let second = tracker.update(&[BoundingBox::new(12, 11, 22, 21)]);

        let first_id = *first.keys().next().unwrap();
        let second_id = *second.keys().next().unwrap();
        assert_eq!(first_id, second_id);
        assert_eq!(second.len(), 1);
    }

    #[test]
    fn walking_object_retains_id() {
        let mut tracker = IdentityTracker::new(5, 20.0);
        tracker.update(&[rect(0, 0)]);
        for step in 1..50 {
            let live = tracker.update(&[rect(step * 15, step * 3)]);
            assert_eq!(live.keys().copied().collect::<Vec<_>>(), vec![0]);
        }
    }

    #[test]
    fn far_jump_registers_new_identity() {
        let mut tracker = IdentityTracker::new(5, 20.0);
        tracker.update(&[rect(0, 0)]);
        let live = tracker.update(&[rect(500, 500)]);
        assert_eq!(live.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(tracker.get(0).unwrap().disappeared_frames, 1);
    }

    #[test]
    fn deregistered_ids_are_never_reused() {
        let mut tracker = IdentityTracker::new(2, 20.0);
        tracker.update(&[rect(0, 0)]);

        // Unseen for max_disappear frames: still tracked.
        tracker.update(&[]);
        tracker.update(&[]);
        assert_eq!(tracker.len(), 1);

        // One more: removed.
        tracker.update(&[]);
        assert!(tracker.is_empty());

        let live = tracker.update(&[rect(0, 0)]);
        assert_eq!(live.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn disappearance_counter_saturates() {
        let mut tracker = IdentityTracker::new(u32::MAX, 20.0);
        tracker.update(&[rect(0, 0)]);
        if let Some(object) = tracker.objects.get_mut(&0) {
            object.disappeared_frames = u32::MAX;
        }
        tracker.update(&[]);
        assert_eq!(tracker.get(0).unwrap().disappeared_frames, u32::MAX);
    }

    #[test]
    fn empty_frame_registers_nothing() {
        let mut tracker = IdentityTracker::new(10, 20.0);
        tracker.update(&[rect(0, 0), rect(100, 0)]);
        let live = tracker.update(&[]);
        assert_eq!(live.len(), 2);
        assert!(live.keys().all(|id| tracker.get(*id).unwrap().disappeared_frames == 1));
    }

    #[test]
    fn ties_go_to_the_older_identity() {
        let mut tracker = IdentityTracker::new(10, 100.0);
        // Two objects, centroids at x=5 and x=45.
        tracker.update(&[rect(0, 0), rect(40, 0)]);
        // One box exactly halfway between them.
        tracker.update(&[rect(20, 0)]);
        assert_eq!(tracker.get(0).unwrap().disappeared_frames, 0);
        assert_eq!(tracker.get(1).unwrap().disappeared_frames, 1);
    }

    #[test]
    fn surplus_boxes_get_fresh_ids_in_input_order() {
        let mut tracker = IdentityTracker::new(10, 20.0);
        tracker.update(&[rect(0, 0)]);
        tracker.update(&[rect(300, 0), rect(2, 0), rect(600, 0)]);
        assert_eq!(tracker.get(1).unwrap().centroid, rect(300, 0).centroid());
        assert_eq!(tracker.get(2).unwrap().centroid, rect(600, 0).centroid());
        assert_eq!(tracker.get(0).unwrap().centroid, rect(2, 0).centroid());
    }

    #[test]
    fn stationary_compares_against_previous_query() {
        let mut tracker = IdentityTracker::new(10, 100.0);
        tracker.update(&[rect(0, 0), rect(200, 0)]);
        assert_eq!(tracker.stationary(5.0).len(), 2);

        tracker.update(&[rect(1, 0), rect(250, 0)]);
        let still = tracker.stationary(5.0);
        assert!(still.contains(&0));
        assert!(!still.contains(&1));

        // The baseline moved with the last query.
        tracker.update(&[rect(1, 0), rect(250, 0)]);
        assert_eq!(tracker.stationary(5.0).len(), 2);
    }

    #[test]
    fn boxes_follow_latest_match() {
        let mut tracker = IdentityTracker::new(10, 50.0);
        tracker.update(&[rect(0, 0)]);
        tracker.update(&[rect(5, 5)]);
        assert_eq!(tracker.boxes().get(&0), Some(&rect(5, 5)));
    }

    #[test]
    fn nearest_within_reach_respects_max_distance() {
        let mut tracker = IdentityTracker::new(10, 30.0);
        tracker.update(&[rect(0, 0), rect(100, 0)]);
        assert_eq!(tracker.nearest_within_reach(&Point::new(90.0, 5.0)), Some(1));
        assert_eq!(tracker.nearest_within_reach(&Point::new(50.0, 200.0)), None);
    }
}
