// src/pruning.rs - Removal of short side branches

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::topology::{NodeId, NodeKind, SegmentId, TopologyGraph};

/// How a leaf's length is measured against the pruning threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrunePolicy {
    /// Only the part of the leaf outside the parent root counts, so the
    /// parent's radius is subtracted from the skeleton length
    #[default]
    BeyondParentRadius,
    /// The full skeleton length counts, including the part buried inside
    /// the parent root
    RawLength,
}

impl PrunePolicy {
    /// Length compared against the threshold
    pub fn measured_length(&self, length: f64, parent_radius: f64) -> f64 {
        match *self {
            PrunePolicy::BeyondParentRadius => length - parent_radius,
            PrunePolicy::RawLength => length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneReport {
    pub removed_segments: usize,
    pub merged_nodes: usize,
    pub passes: usize,
}

/// Remove leaf segments whose measured length is below `threshold` pixels
///
/// A leaf runs from a tip to a branch node of degree three or more. Leaves
/// are removed shortest first, and every short leaf at a branch goes as long
/// as the branch keeps one other segment: a fork whose arms are all short
/// loses them all and its branch node becomes a tip, while the longest arm
/// of an all-short star is kept so a component is never removed entirely.
/// Branch nodes left with two segments are merged away afterwards. Passes
/// repeat until nothing qualifies; running it again on the result changes
/// nothing.
pub fn prune(graph: &mut TopologyGraph, threshold: f64, policy: PrunePolicy) -> PruneReport {
    let mut report = PruneReport::default();
    let every_node = 0..graph.nodes.len();
    report.merged_nodes += normalize(graph, every_node);

    loop {
        graph.assign_parents();
        report.passes += 1;

        let protected: HashSet<NodeId> = match graph.base_point {
            // A designated base is never trimmed
            Some(_) => graph.roots.iter().copied().collect(),
            None => HashSet::new(),
        };

        let mut candidates: Vec<(SegmentId, f64)> = graph
            .alive_segments()
            .filter(|(id, _)| is_prunable(graph, *id, threshold, policy, &protected))
            .map(|(id, s)| (id, s.length))
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut touched = Vec::new();
        for (id, _) in candidates {
            let Some((tip, branch)) = leaf_ends(graph, id) else {
                continue;
            };
            // The branch must keep at least one other segment
            if graph.degree(branch) < 2 {
                continue;
            }
            graph.remove_node(tip);
            touched.push(branch);
        }

        let removed = touched.len();
        report.removed_segments += removed;
        touched.sort_unstable();
        touched.dedup();
        report.merged_nodes += normalize(graph, touched);

        if removed == 0 {
            break;
        }
    }

    graph.assign_parents();

    debug!(
        "Pruning removed {} segments and merged {} nodes in {} passes",
        report.removed_segments, report.merged_nodes, report.passes
    );

    report
}

/// Tip and branch node of a segment running from a tip to a branch
fn leaf_ends(graph: &TopologyGraph, id: SegmentId) -> Option<(NodeId, NodeId)> {
    let segment = &graph.segments[id];
    if !segment.alive || segment.start == segment.end {
        return None;
    }

    let kind = |node: NodeId| graph.nodes[node].kind;
    match (kind(segment.start), kind(segment.end)) {
        (NodeKind::Tip, NodeKind::Branch) => Some((segment.start, segment.end)),
        (NodeKind::Branch, NodeKind::Tip) => Some((segment.end, segment.start)),
        _ => None,
    }
}

fn is_prunable(
    graph: &TopologyGraph,
    id: SegmentId,
    threshold: f64,
    policy: PrunePolicy,
    protected: &HashSet<NodeId>,
) -> bool {
    let Some((tip, branch)) = leaf_ends(graph, id) else {
        return false;
    };
    if graph.degree(branch) < 3 || protected.contains(&tip) {
        return false;
    }

    let length = graph.segments[id].length;
    policy.measured_length(length, parent_radius(graph, id, branch)) < threshold
}

/// Radius of the segment a leaf hangs from, or of its branch node
fn parent_radius(graph: &TopologyGraph, id: SegmentId, branch: NodeId) -> f64 {
    match graph.segments[id].parent {
        Some(parent) if graph.segments[parent].alive => {
            graph.segments[parent].median_diameter() / 2.0
        }
        _ => graph.nodes[branch].diameter / 2.0,
    }
}

/// Re-classify the given branch nodes after removals
///
/// Returns the number of nodes merged into a through segment.
fn normalize(graph: &mut TopologyGraph, nodes: impl IntoIterator<Item = NodeId>) -> usize {
    let mut merged = 0;

    for node in nodes {
        if !graph.nodes[node].alive || graph.nodes[node].kind != NodeKind::Branch {
            continue;
        }

        let incident = graph.incident_segments(node).to_vec();
        match graph.degree(node) {
            0 => graph.nodes[node].kind = NodeKind::Isolated,
            1 => graph.nodes[node].kind = NodeKind::Tip,
            2 if incident.len() == 1 => graph.nodes[node].kind = NodeKind::Loop,
            2 => {
                merge_through(graph, node, incident[0], incident[1]);
                merged += 1;
            }
            _ => {}
        }
    }

    merged
}

/// Join two segments meeting at a node into one
fn merge_through(graph: &mut TopologyGraph, node: NodeId, a: SegmentId, b: SegmentId) {
    let mut first = graph.segments[a].clone();
    if first.end != node {
        first.pixels.reverse();
        first.diameters.reverse();
        std::mem::swap(&mut first.start, &mut first.end);
    }
    let mut second = graph.segments[b].clone();
    if second.start != node {
        second.pixels.reverse();
        second.diameters.reverse();
        std::mem::swap(&mut second.start, &mut second.end);
    }

    let entry = first.pixels.last().copied();
    let exit = second.pixels.first().copied();
    let bridge = match (entry, exit) {
        (Some(entry), Some(exit)) => bridge_pixels(graph, node, entry, exit),
        _ => Vec::new(),
    };

    let mut pixels = first.pixels;
    let mut diameters = first.diameters;
    for (p, d) in bridge.into_iter().skip(1) {
        pixels.push(p);
        diameters.push(d);
    }
    pixels.extend(second.pixels.iter().skip(1));
    diameters.extend(second.diameters.iter().skip(1));

    graph.remove_node(node);
    graph.push_segment_with(pixels, diameters, first.start, second.end);
}

/// Shortest Euclidean path inside a node's pixels from `entry` to `exit`, both included
fn bridge_pixels(
    graph: &TopologyGraph,
    node: NodeId,
    entry: (u32, u32),
    exit: (u32, u32),
) -> Vec<((u32, u32), f64)> {
    let members = &graph.nodes[node];
    let pixels = &members.pixels;
    let diameter_of = |i: usize| members.pixel_diameters.get(i).copied().unwrap_or(0.0);

    let (Some(from), Some(to)) = (
        pixels.iter().position(|&p| p == entry),
        pixels.iter().position(|&p| p == exit),
    ) else {
        return vec![(entry, 0.0), (exit, 0.0)];
    };

    // Clusters hold a handful of pixels, so a quadratic Dijkstra is enough
    let mut cost = vec![f64::INFINITY; pixels.len()];
    let mut previous: Vec<Option<usize>> = vec![None; pixels.len()];
    let mut done = vec![false; pixels.len()];
    cost[from] = 0.0;

    while let Some(current) = (0..pixels.len())
        .filter(|&i| !done[i] && cost[i].is_finite())
        .min_by(|&a, &b| cost[a].total_cmp(&cost[b]).then(a.cmp(&b)))
    {
        done[current] = true;
        if current == to {
            break;
        }
        let (cx, cy) = pixels[current];
        for (i, &(px, py)) in pixels.iter().enumerate() {
            let dx = (px as i64 - cx as i64).abs();
            let dy = (py as i64 - cy as i64).abs();
            if done[i] || dx > 1 || dy > 1 {
                continue;
            }
            let step = if dx + dy == 2 { std::f64::consts::SQRT_2 } else { 1.0 };
            if cost[current] + step < cost[i] {
                cost[i] = cost[current] + step;
                previous[i] = Some(current);
            }
        }
    }

    if !done[to] {
        return vec![(entry, diameter_of(from)), (exit, diameter_of(to))];
    }

    let mut path = vec![to];
    let mut current = to;
    while let Some(prev) = previous[current] {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path.into_iter().map(|i| (pixels[i], diameter_of(i))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMap;
    use crate::image_utils::mask_from_points;
    use crate::skeleton::Skeleton;
    use crate::topology::build_topology;
    use assert_approx_eq::assert_approx_eq;
    use std::time::{Duration, Instant};

    fn graph_of(points: &[(u32, u32)], width: u32, height: u32) -> TopologyGraph {
        let mask = mask_from_points(width, height, points);
        let distance = DistanceMap::compute(&mask);
        build_topology(&Skeleton::from_mask(mask), &distance, None)
    }

    /// Horizontal trunk of 21 px with a vertical spur of `spur` px at x = 12
    fn trunk_with_spur(spur: u32) -> TopologyGraph {
        let mut points: Vec<(u32, u32)> = (2..23).map(|x| (x, 10)).collect();
        points.extend((1..=spur).map(|i| (12, 10 - i)));
        graph_of(&points, 25, 12)
    }

    /// Vertical stem from (10, 20) up to a fork at (10, 5) with two diagonal
    /// arms, plus `stem` extra pixels below the fork
    fn fork(stem: u32, arm: u32) -> TopologyGraph {
        let mut points: Vec<(u32, u32)> = (5..=5 + stem).map(|y| (10, y)).collect();
        for i in 1..=arm {
            points.push((10 - i, 5 - i));
            points.push((10 + i, 5 - i));
        }
        graph_of(&points, 16, 22)
    }

    /// Fragments each made of a 14 px trunk, a 2 px spur and an 8 px spur
    fn fragment_grid(cols: u32, rows: u32) -> TopologyGraph {
        let mut points = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let (x0, y0) = (col * 16, row * 12);
                points.extend((1..15).map(|x| (x0 + x, y0 + 10)));
                points.extend((1..=2).map(|i| (x0 + 4, y0 + 10 - i)));
                points.extend((1..=8).map(|i| (x0 + 10, y0 + 10 - i)));
            }
        }
        graph_of(&points, cols * 16, rows * 12)
    }

    fn fastest_prune(graph: &TopologyGraph, threshold: f64) -> Duration {
        (0..3)
            .map(|_| {
                let mut copy = graph.clone();
                let start = Instant::now();
                prune(&mut copy, threshold, PrunePolicy::default());
                start.elapsed()
            })
            .min()
            .unwrap()
    }

    #[test]
    fn short_spur_is_removed_and_trunk_merged() {
        let mut graph = trunk_with_spur(3);
        assert_eq!(graph.tip_count(), 3);

        let report = prune(&mut graph, 5.0, PrunePolicy::default());
        assert_eq!(report.removed_segments, 1);
        assert_eq!(graph.tip_count(), 2);
        assert_eq!(graph.branch_count(), 0);
        assert_eq!(graph.alive_segments().count(), 1);

        let (_, trunk) = graph.alive_segments().next().unwrap();
        assert_eq!(trunk.pixels.len(), 21);
        assert_approx_eq!(trunk.length, 20.0);
    }

    #[test]
    fn long_spur_survives() {
        // Leaf length 7, 6.5 beyond the trunk's radius
        let mut graph = trunk_with_spur(8);
        let report = prune(&mut graph, 5.0, PrunePolicy::default());
        assert_eq!(report.removed_segments, 0);
        assert_eq!(graph.tip_count(), 3);
    }

    #[test]
    fn pruning_is_idempotent() {
        let mut graph = trunk_with_spur(2);
        prune(&mut graph, 4.0, PrunePolicy::default());
        let once = graph.clone();
        let report = prune(&mut graph, 4.0, PrunePolicy::default());

        assert_eq!(report.removed_segments, 0);
        assert_eq!(graph, once);
    }

    #[test]
    fn lone_line_is_never_removed() {
        let points: Vec<(u32, u32)> = (0..4).map(|x| (x + 1, 1)).collect();
        let mut graph = graph_of(&points, 6, 3);

        prune(&mut graph, 100.0, PrunePolicy::default());
        assert_eq!(graph.tip_count(), 2);
        assert_eq!(graph.retained_pixels().len(), 4);
    }

    #[test]
    fn parent_radius_is_subtracted_unless_raw_length_is_asked_for() {
        assert_approx_eq!(PrunePolicy::BeyondParentRadius.measured_length(6.0, 5.5), 0.5);
        assert_approx_eq!(PrunePolicy::RawLength.measured_length(6.0, 5.5), 6.0);

        // Leaf length 5 on a trunk of radius 0.5
        let mut graph = trunk_with_spur(6);
        let report = prune(&mut graph, 5.0, PrunePolicy::RawLength);
        assert_eq!(report.removed_segments, 0);

        let report = prune(&mut graph, 5.0, PrunePolicy::BeyondParentRadius);
        assert_eq!(report.removed_segments, 1);
        assert_eq!(graph.tip_count(), 2);
    }

    #[test]
    fn fork_with_two_short_arms_loses_both() {
        let mut graph = fork(15, 3);
        assert_eq!(graph.tip_count(), 3);
        assert_eq!(graph.branch_count(), 1);

        let report = prune(&mut graph, 5.0, PrunePolicy::default());
        assert_eq!(report.removed_segments, 2);
        assert_eq!(report.merged_nodes, 0);
        assert_eq!(graph.tip_count(), 2);
        assert_eq!(graph.branch_count(), 0);

        let (_, stem) = graph.alive_segments().next().unwrap();
        assert_eq!(graph.alive_segments().count(), 1);
        assert_approx_eq!(stem.length, 15.0);
        assert_eq!(graph.retained_pixels().len(), 16);
    }

    #[test]
    fn star_of_short_arms_keeps_its_longest() {
        // Stem of length 3, arms of length 3 * sqrt(2)
        let mut graph = fork(3, 3);
        let report = prune(&mut graph, 10.0, PrunePolicy::default());

        assert_eq!(report.removed_segments, 2);
        assert_eq!(graph.tip_count(), 2);
        assert_eq!(graph.alive_segments().count(), 1);
        let (_, arm) = graph.alive_segments().next().unwrap();
        assert_approx_eq!(arm.length, 3.0 * std::f64::consts::SQRT_2);
    }

    #[test]
    fn every_fragment_of_a_large_grid_is_pruned() {
        let mut graph = fragment_grid(30, 20);
        assert_eq!(graph.tip_count(), 4 * 600);

        let report = prune(&mut graph, 4.0, PrunePolicy::default());
        assert_eq!(report.removed_segments, 600);
        assert_eq!(report.merged_nodes, 600);
        assert_eq!(graph.tip_count(), 3 * 600);
        assert_eq!(graph.branch_count(), 600);
        assert_eq!(graph.alive_segments().count(), 3 * 600);
        assert_eq!(graph.roots.len(), 600);
    }

    #[test]
    fn pruning_time_grows_linearly_with_fragments() {
        let small = fastest_prune(&fragment_grid(25, 20), 4.0);
        let large = fastest_prune(&fragment_grid(50, 40), 4.0);

        // Four times the fragments; a quadratic pass would take about 16 times as long
        assert!(
            large <= small * 10 + Duration::from_millis(50),
            "500 fragments took {:?}, 2000 took {:?}",
            small,
            large
        );
    }
}
