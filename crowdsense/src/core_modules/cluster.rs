// THEORY:
// The cluster finder is the spatial half of the group layer. It looks at where every
// tracked person is standing *right now* and partitions them into clusters of people
// who are close enough to be considered together.
//
// Algorithm:
// 1.  **Adjacency Graph**: Two identities are neighbours when their centroids lie
//     within `cluster_distance` of each other. Distances are compared squared.
// 2.  **Connected Components**: A depth-first traversal over the graph collects every
//     identity reachable from a seed. Chains count: A near B near C puts all three in
//     one cluster even when A and C are far apart.
// 3.  **Stateless Utility**: Like a blob detector, this has no memory of previous
//     frames. Persistence over time is the group engine's job.
//
// Seeds are visited in ascending id order, so the output is deterministic for a
// given input table.

use crate::core_modules::detection::Point;
use crate::core_modules::tracker::ObjectId;
use std::collections::{BTreeMap, BTreeSet};

pub mod cluster_finder {
    use super::*;

    /// Partitions the tracked identities into proximity clusters.
    pub fn find_clusters(
        centroids: &BTreeMap<ObjectId, Point>,
        cluster_distance: f64,
    ) -> Vec<BTreeSet<ObjectId>> {
        let ids: Vec<ObjectId> = centroids.keys().copied().collect();
        if ids.is_empty() {
            return Vec::new();
        }

        // --- 1. Adjacency ---
        let limit_sq = cluster_distance * cluster_distance;
        let mut adjacency: BTreeMap<ObjectId, Vec<ObjectId>> =
            ids.iter().map(|id| (*id, Vec::new())).collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                if centroids[a].distance_sq(&centroids[b]) <= limit_sq {
                    adjacency.entry(*a).or_default().push(*b);
                    adjacency.entry(*b).or_default().push(*a);
                }
            }
        }

        // --- 2. Connected components ---
        let mut visited: BTreeSet<ObjectId> = BTreeSet::new();
        let mut clusters = Vec::new();
        for seed in &ids {
            if visited.contains(seed) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut stack = vec![*seed];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    continue;
                }
                component.insert(current);
                for neighbour in &adjacency[&current] {
                    if !visited.contains(neighbour) {
                        stack.push(*neighbour);
                    }
                }
            }
            clusters.push(component);
        }

        clusters
    }
}

#[cfg(test)]
mod tests {
    use super::cluster_finder::find_clusters;
    use super::*;

    fn table(points: &[(ObjectId, f64, f64)]) -> BTreeMap<ObjectId, Point> {
        points.iter().map(|(id, x, y)| (*id, Point::new(*x, *y))).collect()
    }

    #[test]
    fn empty_table_has_no_clusters() {
        assert!(find_clusters(&BTreeMap::new(), 50.0).is_empty());
    }

    #[test]
    fn separates_distant_people() {
        let centroids = table(&[(0, 0.0, 0.0), (1, 10.0, 0.0), (2, 500.0, 500.0)]);
        let clusters = find_clusters(&centroids, 50.0);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0], BTreeSet::from([0, 1]));
        assert_eq!(clusters[1], BTreeSet::from([2]));
    }

    #[test]
    fn chains_are_transitive() {
        let centroids = table(&[(0, 0.0, 0.0), (1, 40.0, 0.0), (2, 80.0, 0.0), (3, 120.0, 0.0)]);
        let clusters = find_clusters(&centroids, 40.0);
        assert_eq!(clusters, vec![BTreeSet::from([0, 1, 2, 3])]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let centroids = table(&[(4, 0.0, 0.0), (9, 30.0, 40.0)]);
        assert_eq!(find_clusters(&centroids, 50.0).len(), 1);
        assert_eq!(find_clusters(&centroids, 49.9).len(), 2);
    }
}
