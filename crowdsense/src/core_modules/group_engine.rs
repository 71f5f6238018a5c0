// THEORY:
// The `group_engine` module is the behavioural heart of the crowd layer. It turns
// the per-frame proximity clusters into `Group`s: durable records of "these people
// have been standing together since time T". A group is what ultimately produces a
// `crowd_group_complete` alert once it has persisted long enough.
//
// Key architectural principles:
// 1.  **Membership, Not Position**: A cluster is matched to the existing group with
//     which it shares the most member ids. Someone drifting off the edge of a group,
//     or a newcomer joining it, changes the member set but not the group's identity
//     or its start time. This is the property the whole layer exists to provide.
// 2.  **One-Way Completion**: `completed` flips false → true exactly once per group
//     lifetime, the first time the group has been seen for `duration_seconds`.
//     The completion is reported once, as a snapshot of the group at that instant.
// 3.  **Graceful Dissolution**: A group that no cluster claimed this round is kept
//     for `vanish_seconds` after it was last seen, so a few frames of detector
//     dropout do not reset the timer. After that it is deleted outright.
// 4.  **Caller-Supplied Time**: `now` is an input, never read from a clock. The
//     engine is a pure state machine over monotonic timestamps.

use crate::config::GroupConfig;
use crate::core_modules::cluster::cluster_finder;
use crate::core_modules::detection::{BoundingBox, Point};
use crate::core_modules::tracker::ObjectId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Stable integer identity assigned to a group.
pub type GroupId = u64;

/// A cluster of tracked identities judged to be co-located over time.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Monotonic id, starting at 1. Never reused.
    pub id: GroupId,
    members: BTreeSet<ObjectId>,
    /// Timestamp (seconds) at which the group was first seen.
    pub start_time: f64,
    /// Timestamp (seconds) at which a cluster last confirmed the group.
    pub last_seen_time: f64,
    /// Set once the group has persisted for the configured duration. Never reverts.
    pub completed: bool,
    /// Union of the members' boxes, or `None` when no member box is known.
    pub bbox: Option<BoundingBox>,
    updated: bool,
}

impl Group {
    fn new(
        id: GroupId,
        members: BTreeSet<ObjectId>,
        now: f64,
        boxes: &BTreeMap<ObjectId, BoundingBox>,
    ) -> Self {
        let bbox = union_of_members(&members, boxes);
        Self {
            id,
            members,
            start_time: now,
            last_seen_time: now,
            completed: false,
            bbox,
            updated: true,
        }
    }

    fn absorb(
        &mut self,
        members: BTreeSet<ObjectId>,
        now: f64,
        boxes: &BTreeMap<ObjectId, BoundingBox>,
    ) {
        self.bbox = union_of_members(&members, boxes);
        self.members = members;
        self.last_seen_time = now;
        self.updated = true;
    }

    pub fn members(&self) -> &BTreeSet<ObjectId> {
        &self.members
    }

    /// Number of members. Always equal to `members().len()`.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Seconds since the group was first seen.
    pub fn elapsed(&self, now: f64) -> f64 {
        (now - self.start_time).max(0.0)
    }

    fn overlap(&self, cluster: &BTreeSet<ObjectId>) -> usize {
        self.members.intersection(cluster).count()
    }
}

/// Min of all x1/y1, max of all x2/y2 across the members that have a known box.
pub fn union_of_members(
    members: &BTreeSet<ObjectId>,
    boxes: &BTreeMap<ObjectId, BoundingBox>,
) -> Option<BoundingBox> {
    members
        .iter()
        .filter_map(|id| boxes.get(id))
        .copied()
        .reduce(|acc, b| acc.union(&b))
}

/// The result of one engine round.
#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    /// Snapshots of the groups that completed during this round.
    pub completed: Vec<Group>,
    /// Every group alive after this round, in ascending id order.
    pub active: Vec<Group>,
}

/// Maintains the set of live groups from one frame to the next.
pub struct SpatialGroupEngine {
    groups: BTreeMap<GroupId, Group>,
    next_id: GroupId,
    config: GroupConfig,
}

impl SpatialGroupEngine {
    pub fn new(config: GroupConfig) -> Self {
        Self {
            groups: BTreeMap::new(),
            next_id: 1,
            config,
        }
    }

    pub fn update(
        &mut self,
        centroids: &BTreeMap<ObjectId, Point>,
        boxes: &BTreeMap<ObjectId, BoundingBox>,
        now: f64,
    ) -> GroupUpdate {
        // --- 1. Clustering & size filter ---
        let mut candidates: Vec<BTreeSet<ObjectId>> =
            cluster_finder::find_clusters(centroids, self.config.cluster_distance_px)
                .into_iter()
                .filter(|c| c.len() >= self.config.min_people)
                .collect();
        // Largest fragments claim groups first when one group splits.
        candidates.sort_by(|a, b| b.len().cmp(&a.len()));

        for group in self.groups.values_mut() {
            group.updated = false;
        }

        // --- 2. Cluster-to-group matching ---
        let mut completed = Vec::new();
        for cluster in candidates {
            let mut best: Option<(GroupId, usize)> = None;
            for group in self.groups.values().filter(|g| !g.updated) {
                let overlap = group.overlap(&cluster);
                if overlap > best.map_or(0, |(_, o)| o) {
                    best = Some((group.id, overlap));
                }
            }

            match best {
                Some((id, _)) => {
                    let Some(group) = self.groups.get_mut(&id) else {
                        continue;
                    };
                    group.absorb(cluster, now, boxes);

                    // --- 3. Completion ---
                    if !group.completed && now - group.start_time >= self.config.duration_seconds {
                        group.completed = true;
                        info!(
                            group_id = group.id,
                            people = group.count(),
                            elapsed = group.elapsed(now),
                            "group completed"
                        );
                        completed.push(group.clone());
                    }
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    let group = Group::new(id, cluster, now, boxes);
                    info!(group_id = id, people = group.count(), "group formed");
                    self.groups.insert(id, group);
                }
            }
        }

        // --- 4. Eviction ---
        let vanish = self.config.vanish_seconds;
        self.groups.retain(|id, group| {
            let keep = group.updated || now - group.last_seen_time <= vanish;
            if !keep {
                info!(group_id = id, "group dissolved");
            }
            keep
        });

        GroupUpdate {
            completed,
            active: self.groups.values().cloned().collect(),
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn config(&self) -> &GroupConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(min_people: usize, duration: f64, vanish: f64) -> GroupConfig {
        GroupConfig {
            min_people,
            duration_seconds: duration,
            cluster_distance_px: 120.0,
            vanish_seconds: vanish,
        }
    }

    /// People `ids` standing 20px apart along a row starting at `x0`.
    fn row(ids: &[ObjectId], x0: f64) -> BTreeMap<ObjectId, Point> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (*id, Point::new(x0 + i as f64 * 20.0, 100.0)))
            .collect()
    }

    fn boxes_for(centroids: &BTreeMap<ObjectId, Point>) -> BTreeMap<ObjectId, BoundingBox> {
        centroids
            .iter()
            .map(|(id, p)| {
                let (x, y) = (p.x as i32, p.y as i32);
                (*id, BoundingBox::new(x - 5, y - 10, x + 5, y + 10))
            })
            .collect()
    }

    #[test]
    fn small_clusters_never_form_groups() {
        let mut engine = SpatialGroupEngine::new(config(3, 10.0, 5.0));
        let centroids = row(&[0, 1], 0.0);
        let update = engine.update(&centroids, &BTreeMap::new(), 0.0);
        assert!(update.active.is_empty());
    }

    #[test]
    fn churn_keeps_group_identity_and_start_time() {
        let mut engine = SpatialGroupEngine::new(config(3, 1000.0, 5.0));
        let first = engine.update(&row(&[0, 1, 2, 3], 0.0), &BTreeMap::new(), 0.0);
        let gid = first.active[0].id;

        // Each frame one member leaves and a new one joins.
        for step in 1..20u64 {
            let members: Vec<ObjectId> = (step..step + 4).collect();
            let update = engine.update(&row(&members, 0.0), &BTreeMap::new(), step as f64);
            assert_eq!(update.active.len(), 1);
            assert_eq!(update.active[0].id, gid);
            assert_eq!(update.active[0].start_time, 0.0);
            assert_eq!(update.active[0].count(), 4);
        }
    }

    #[test]
    fn completion_fires_once_and_never_reverts() {
        let mut engine = SpatialGroupEngine::new(config(2, 10.0, 5.0));
        let centroids = row(&[0, 1, 2], 0.0);
        let mut fired = Vec::new();
        for t in 0..30 {
            let update = engine.update(&centroids, &BTreeMap::new(), t as f64);
            fired.extend(update.completed.iter().map(|g| (t, g.id)));
            if t >= 10 {
                assert!(update.active[0].completed);
            } else {
                assert!(!update.active[0].completed);
            }
        }
        assert_eq!(fired, vec![(10, 1)]);
    }

    #[test]
    fn unconfirmed_group_is_evicted_after_vanish_timeout() {
        let mut engine = SpatialGroupEngine::new(config(2, 100.0, 5.0));
        engine.update(&row(&[0, 1], 0.0), &BTreeMap::new(), 0.0);

        let (empty, no_boxes) = (BTreeMap::new(), BTreeMap::new());
        assert_eq!(engine.update(&empty, &no_boxes, 5.0).active.len(), 1);
        assert!(engine.update(&empty, &no_boxes, 5.5).active.is_empty());

        // The same people coming back start a brand-new group.
        let update = engine.update(&row(&[0, 1], 0.0), &BTreeMap::new(), 6.0);
        assert_eq!(update.active[0].id, 2);
        assert_eq!(update.active[0].start_time, 6.0);
    }

    #[test]
    fn short_dropout_does_not_reset_timer() {
        let mut engine = SpatialGroupEngine::new(config(2, 100.0, 5.0));
        engine.update(&row(&[0, 1], 0.0), &BTreeMap::new(), 0.0);
        engine.update(&BTreeMap::new(), &BTreeMap::new(), 3.0);
        let update = engine.update(&row(&[0, 1], 0.0), &BTreeMap::new(), 4.0);
        assert_eq!(update.active[0].id, 1);
        assert_eq!(update.active[0].start_time, 0.0);
    }

    #[test]
    fn disjoint_clusters_form_separate_groups() {
        let mut engine = SpatialGroupEngine::new(config(2, 100.0, 5.0));
        let mut centroids = row(&[0, 1], 0.0);
        centroids.extend(row(&[2, 3, 4], 1000.0));
        let update = engine.update(&centroids, &BTreeMap::new(), 0.0);
        assert_eq!(update.active.len(), 2);
        // Larger cluster is processed first.
        assert_eq!(update.active[0].members(), &BTreeSet::from([2, 3, 4]));
        assert_eq!(update.active[1].members(), &BTreeSet::from([0, 1]));
    }

    #[test]
    fn split_keeps_identity_on_largest_fragment() {
        let mut engine = SpatialGroupEngine::new(config(2, 100.0, 5.0));
        engine.update(&row(&[0, 1, 2, 3, 4], 0.0), &BTreeMap::new(), 0.0);

        let mut centroids = row(&[0, 1], 0.0);
        centroids.extend(row(&[2, 3, 4], 1000.0));
        let update = engine.update(&centroids, &BTreeMap::new(), 1.0);

        let original = update.active.iter().find(|g| g.id == 1).unwrap();
        assert_eq!(original.members(), &BTreeSet::from([2, 3, 4]));
        let fresh = update.active.iter().find(|g| g.id == 2).unwrap();
        assert_eq!(fresh.members(), &BTreeSet::from([0, 1]));
        assert_eq!(fresh.start_time, 1.0);
    }

    #[test]
    fn bbox_is_union_of_known_member_boxes() {
        let mut engine = SpatialGroupEngine::new(config(2, 100.0, 5.0));
        let centroids = row(&[0, 1, 2], 0.0);
        let mut boxes = boxes_for(&centroids);
        boxes.remove(&2);
        let update = engine.update(&centroids, &boxes, 0.0);
        assert_eq!(update.active[0].bbox, Some(BoundingBox::new(-5, 90, 25, 110)));

        let update = engine.update(&centroids, &BTreeMap::new(), 1.0);
        assert_eq!(update.active[0].bbox, None);
    }
}
