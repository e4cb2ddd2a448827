// src/topology.rs - Skeleton graph of nodes and segments

use log::debug;
use std::collections::{HashSet, VecDeque};

use crate::distance::DistanceMap;
use crate::skeleton::Skeleton;

pub type NodeId = usize;
pub type SegmentId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Skeleton end point
    Tip,
    /// One or more adjacent pixels with three or more skeleton neighbours
    Branch,
    /// Skeleton component of a single pixel
    Isolated,
    /// Anchor placed on a closed ring that has no other node
    Loop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub pixels: Vec<(u32, u32)>,
    pub pixel_diameters: Vec<f64>,
    /// Largest local diameter over the node's pixels
    pub diameter: f64,
    pub alive: bool,
}

/// Ordered pixel path between two nodes, end pixels included
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub pixels: Vec<(u32, u32)>,
    pub diameters: Vec<f64>,
    /// Euclidean arc length in pixels
    pub length: f64,
    pub start: NodeId,
    pub end: NodeId,
    /// Neighbouring segment on the path toward the component's root
    pub parent: Option<SegmentId>,
    pub alive: bool,
}

impl Segment {
    pub fn other_end(&self, node: NodeId) -> NodeId {
        if self.start == node {
            self.end
        } else {
            self.start
        }
    }

    pub fn median_diameter(&self) -> f64 {
        median(&self.diameters)
    }
}

/// Index arena over the skeleton
///
/// Removed elements stay in place with `alive == false` so ids remain
/// stable across pruning. Nodes and segments are added and removed through
/// the graph's own methods, which keep the per-node incidence lists current.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyGraph {
    pub nodes: Vec<Node>,
    pub segments: Vec<Segment>,
    /// Root node of every connected component
    pub roots: Vec<NodeId>,
    /// Externally designated base of a whole root, if any
    pub base_point: Option<(u32, u32)>,
    /// Live segments at each node; a self-loop is listed once
    incidence: Vec<Vec<SegmentId>>,
    width: u32,
    height: u32,
}

/// Build the graph for a skeleton
///
/// Pixels with one skeleton neighbour become tips, pixels with none become
/// isolated nodes, and touching pixels with three or more neighbours merge
/// into a single branch node. Everything else is walked into segments.
/// Each component is rooted at the node nearest `base_point` when one is
/// given, otherwise at its widest tip.
pub fn build_topology(
    skeleton: &Skeleton,
    distance: &DistanceMap,
    base_point: Option<(u32, u32)>,
) -> TopologyGraph {
    let (width, height) = skeleton.dimensions();
    let index = |x: u32, y: u32| (y * width + x) as usize;

    let pixels = skeleton.pixels();
    let mut node_at: Vec<Option<NodeId>> = vec![None; (width * height) as usize];
    let mut graph = TopologyGraph {
        nodes: Vec::new(),
        segments: Vec::new(),
        roots: Vec::new(),
        base_point,
        incidence: Vec::new(),
        width,
        height,
    };

    // Tips, isolated points and clustered branch pixels
    for &(x, y) in &pixels {
        if node_at[index(x, y)].is_some() {
            continue;
        }
        let degree = skeleton.degree(x, y);
        let (kind, members) = match degree {
            0 => (NodeKind::Isolated, vec![(x, y)]),
            1 => (NodeKind::Tip, vec![(x, y)]),
            2 => continue,
            _ => (NodeKind::Branch, branch_cluster(skeleton, x, y)),
        };

        let id = graph.push_node(make_node(kind, members, distance));
        for &(mx, my) in &graph.nodes[id].pixels {
            node_at[index(mx, my)] = Some(id);
        }
    }

    let mut visited = vec![false; (width * height) as usize];
    let mut direct_links: HashSet<((u32, u32), (u32, u32))> = HashSet::new();

    let mut node_id = 0;
    while node_id < graph.nodes.len() {
        let mut pixel_idx = 0;
        while pixel_idx < graph.nodes[node_id].pixels.len() {
            let (px, py) = graph.nodes[node_id].pixels[pixel_idx];
            pixel_idx += 1;

            for (nx, ny) in skeleton.neighbors(px, py) {
                match node_at[index(nx, ny)] {
                    Some(other) if other == node_id => {}
                    Some(other) => {
                        let key = ordered_pair((px, py), (nx, ny));
                        if direct_links.insert(key) {
                            let path = vec![(px, py), (nx, ny)];
                            graph.push_segment(path, node_id, other, distance);
                        }
                    }
                    None => {
                        if visited[index(nx, ny)] {
                            continue;
                        }
                        let (path, end) = walk(skeleton, &node_at, &mut visited, (px, py), (nx, ny));
                        if end == node_id && path.len() == 3 {
                            // A single pixel bridging two pixels of the same cluster
                            let (bx, by) = path[1];
                            node_at[index(bx, by)] = Some(node_id);
                            let d = distance.diameter(bx, by);
                            let node = &mut graph.nodes[node_id];
                            node.pixels.push((bx, by));
                            node.pixel_diameters.push(d);
                            node.diameter = node.diameter.max(d);
                        } else {
                            graph.push_segment(path, node_id, end, distance);
                        }
                    }
                }
            }
        }
        node_id += 1;
    }

    // Closed rings never touch a node; anchor each at its first pixel
    for &(x, y) in &pixels {
        if node_at[index(x, y)].is_some() || visited[index(x, y)] {
            continue;
        }
        let id = graph.push_node(make_node(NodeKind::Loop, vec![(x, y)], distance));
        node_at[index(x, y)] = Some(id);

        if let Some(&first) = skeleton.neighbors(x, y).first() {
            let (path, end) = walk(skeleton, &node_at, &mut visited, (x, y), first);
            graph.push_segment(path, id, end, distance);
        }
    }

    graph.assign_parents();

    debug!(
        "Topology: {} tips, {} branch points, {} segments",
        graph.tip_count(),
        graph.branch_count(),
        graph.segments.len()
    );

    graph
}

fn make_node(kind: NodeKind, pixels: Vec<(u32, u32)>, distance: &DistanceMap) -> Node {
    let pixel_diameters: Vec<f64> = pixels.iter().map(|&(x, y)| distance.diameter(x, y)).collect();
    let diameter = pixel_diameters.iter().copied().fold(0.0, f64::max);
    Node {
        kind,
        pixels,
        pixel_diameters,
        diameter,
        alive: true,
    }
}

/// All branch pixels reachable from a seed through other branch pixels
fn branch_cluster(skeleton: &Skeleton, x: u32, y: u32) -> Vec<(u32, u32)> {
    let mut members = vec![(x, y)];
    let mut seen: HashSet<(u32, u32)> = HashSet::from([(x, y)]);
    let mut queue = VecDeque::from([(x, y)]);

    while let Some((cx, cy)) = queue.pop_front() {
        for (nx, ny) in skeleton.neighbors(cx, cy) {
            if skeleton.degree(nx, ny) >= 3 && seen.insert((nx, ny)) {
                members.push((nx, ny));
                queue.push_back((nx, ny));
            }
        }
    }

    members
}

/// Follow degree-2 pixels from `start` through `first` until a node pixel
///
/// Returns the full path including both node pixels and the id of the
/// node reached.
fn walk(
    skeleton: &Skeleton,
    node_at: &[Option<NodeId>],
    visited: &mut [bool],
    start: (u32, u32),
    first: (u32, u32),
) -> (Vec<(u32, u32)>, NodeId) {
    let width = skeleton.dimensions().0;
    let index = |(x, y): (u32, u32)| (y * width + x) as usize;

    let mut path = vec![start, first];
    let mut prev = start;
    let mut current = first;
    visited[index(first)] = true;

    loop {
        let next = skeleton
            .neighbors(current.0, current.1)
            .into_iter()
            .filter(|&n| n != prev)
            .find(|&n| node_at[index(n)].is_some() || !visited[index(n)]);

        match next {
            Some(n) => {
                path.push(n);
                if let Some(end) = node_at[index(n)] {
                    return (path, end);
                }
                visited[index(n)] = true;
                prev = current;
                current = n;
            }
            // Only reachable on malformed input; close on the start node
            None => {
                let start_node = node_at[index(start)].unwrap_or_default();
                return (path, start_node);
            }
        }
    }
}

fn ordered_pair(a: (u32, u32), b: (u32, u32)) -> ((u32, u32), (u32, u32)) {
    if (a.1, a.0) <= (b.1, b.0) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Euclidean length of an 8-connected pixel path
pub fn path_length(pixels: &[(u32, u32)]) -> f64 {
    pixels
        .windows(2)
        .map(|w| {
            let dx = w[0].0 as f64 - w[1].0 as f64;
            let dy = w[0].1 as f64 - w[1].1 as f64;
            (dx * dx + dy * dy).sqrt()
        })
        .sum()
}

/// Median of a slice, NaN when empty
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

impl TopologyGraph {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub(crate) fn push_node(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.incidence.push(Vec::new());
        self.nodes.len() - 1
    }

    pub(crate) fn push_segment(
        &mut self,
        pixels: Vec<(u32, u32)>,
        start: NodeId,
        end: NodeId,
        distance: &DistanceMap,
    ) -> SegmentId {
        let diameters = pixels.iter().map(|&(x, y)| distance.diameter(x, y)).collect();
        self.push_segment_with(pixels, diameters, start, end)
    }

    pub(crate) fn push_segment_with(
        &mut self,
        pixels: Vec<(u32, u32)>,
        diameters: Vec<f64>,
        start: NodeId,
        end: NodeId,
    ) -> SegmentId {
        let length = path_length(&pixels);
        let id = self.segments.len();
        self.segments.push(Segment {
            pixels,
            diameters,
            length,
            start,
            end,
            parent: None,
            alive: true,
        });
        self.incidence[start].push(id);
        if end != start {
            self.incidence[end].push(id);
        }
        id
    }

    /// Mark a segment removed and detach it from both end nodes
    pub(crate) fn remove_segment(&mut self, id: SegmentId) {
        let segment = &mut self.segments[id];
        if !segment.alive {
            return;
        }
        segment.alive = false;
        let (start, end) = (segment.start, segment.end);
        self.incidence[start].retain(|&s| s != id);
        self.incidence[end].retain(|&s| s != id);
    }

    /// Mark a node removed along with every segment still touching it
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        for segment in std::mem::take(&mut self.incidence[id]) {
            self.remove_segment(segment);
        }
        self.nodes[id].alive = false;
    }

    pub fn alive_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().filter(|(_, n)| n.alive)
    }

    pub fn alive_segments(&self) -> impl Iterator<Item = (SegmentId, &Segment)> {
        self.segments.iter().enumerate().filter(|(_, s)| s.alive)
    }

    /// Live segments touching a node; a self-loop appears once
    pub fn incident_segments(&self, node: NodeId) -> &[SegmentId] {
        &self.incidence[node]
    }

    /// Number of live segment ends at a node; a self-loop counts twice
    pub fn degree(&self, node: NodeId) -> usize {
        self.incidence[node]
            .iter()
            .map(|&id| {
                let s = &self.segments[id];
                usize::from(s.start == node) + usize::from(s.end == node)
            })
            .sum()
    }

    pub fn tip_count(&self) -> usize {
        self.alive_nodes().filter(|(_, n)| n.kind == NodeKind::Tip).count()
    }

    pub fn branch_count(&self) -> usize {
        self.alive_nodes().filter(|(_, n)| n.kind == NodeKind::Branch).count()
    }

    /// Every retained skeleton pixel once, with its local diameter
    pub fn retained_pixels(&self) -> Vec<((u32, u32), f64)> {
        let mut seen = vec![false; (self.width as usize) * (self.height as usize)];
        let mut result = Vec::new();
        let mut add = |p: (u32, u32), d: f64, result: &mut Vec<((u32, u32), f64)>| {
            let idx = (p.1 * self.width + p.0) as usize;
            if !seen[idx] {
                seen[idx] = true;
                result.push((p, d));
            }
        };

        for (_, node) in self.alive_nodes() {
            for (&p, &d) in node.pixels.iter().zip(&node.pixel_diameters) {
                add(p, d, &mut result);
            }
        }
        for (_, segment) in self.alive_segments() {
            for (&p, &d) in segment.pixels.iter().zip(&segment.diameters) {
                add(p, d, &mut result);
            }
        }

        result
    }

    /// Pick a root per connected component and link segments toward it
    pub fn assign_parents(&mut self) {
        for segment in &mut self.segments {
            segment.parent = None;
        }
        self.roots.clear();

        let mut component_of: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut components: Vec<Vec<NodeId>> = Vec::new();
        for (start, node) in self.nodes.iter().enumerate() {
            if !node.alive || component_of[start].is_some() {
                continue;
            }
            let component = components.len();
            let mut members = vec![start];
            component_of[start] = Some(component);
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                for &sid in &self.incidence[current] {
                    let next = self.segments[sid].other_end(current);
                    if component_of[next].is_none() {
                        component_of[next] = Some(component);
                        members.push(next);
                        queue.push_back(next);
                    }
                }
            }
            components.push(members);
        }

        // Components are disjoint, so one set of marks serves them all
        let mut reached_by: Vec<Option<Option<SegmentId>>> = vec![None; self.nodes.len()];
        let mut seen_segment = vec![false; self.segments.len()];

        for members in components {
            let root = self.choose_root(&members);
            self.roots.push(root);

            reached_by[root] = Some(None);
            let mut queue = VecDeque::from([root]);

            while let Some(current) = queue.pop_front() {
                let via = reached_by[current].flatten();
                for &sid in &self.incidence[current] {
                    if seen_segment[sid] {
                        continue;
                    }
                    seen_segment[sid] = true;
                    self.segments[sid].parent = via;
                    let next = self.segments[sid].other_end(current);
                    if reached_by[next].is_none() {
                        reached_by[next] = Some(Some(sid));
                        queue.push_back(next);
                    }
                }
            }
        }
    }

    fn choose_root(&self, members: &[NodeId]) -> NodeId {
        if let Some((bx, by)) = self.base_point {
            let nearest = members.iter().copied().min_by(|&a, &b| {
                self.distance_to(a, bx, by)
                    .total_cmp(&self.distance_to(b, bx, by))
                    .then(a.cmp(&b))
            });
            if let Some(node) = nearest {
                return node;
            }
        }

        let widest = |kinds: &[NodeKind]| {
            members
                .iter()
                .copied()
                .filter(|&id| kinds.contains(&self.nodes[id].kind))
                .min_by(|&a, &b| {
                    self.nodes[b]
                        .diameter
                        .total_cmp(&self.nodes[a].diameter)
                        .then(a.cmp(&b))
                })
        };

        widest(&[NodeKind::Tip])
            .or_else(|| widest(&[NodeKind::Branch, NodeKind::Isolated, NodeKind::Loop]))
            .unwrap_or(members[0])
    }

    fn distance_to(&self, node: NodeId, x: u32, y: u32) -> f64 {
        self.nodes[node]
            .pixels
            .iter()
            .map(|&(px, py)| {
                let dx = px as f64 - x as f64;
                let dy = py as f64 - y as f64;
                dx * dx + dy * dy
            })
            .fold(f64::INFINITY, f64::min)
    }
}
