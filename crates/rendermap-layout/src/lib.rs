//! Layered top-to-bottom layout for the canvas node graph.
//!
//! Ranks are assigned by longest path from the edge sources (the resources
//! being depended on), so databases and caches tend to sit above their
//! dependents. Ordering within a rank is refined with barycenter sweeps to
//! keep edge crossings down. The whole pass is pure computation: for a fixed
//! node and edge set it always produces the same positions.

use rendermap_core::{ConnectionEdge, GraphNode, Position};
use std::collections::{HashMap, HashSet, VecDeque};

/// Horizontal separation between nodes in the same rank.
const NODE_SEP: f64 = 50.0;
/// Vertical separation between ranks.
const RANK_SEP: f64 = 80.0;
/// Outer margin on both axes.
const MARGIN: f64 = 40.0;

/// Recompute a top-left position for every node. The input is not mutated;
/// nodes come back in input order with fresh positions. An empty node set is
/// a no-op, and edges referencing unknown node IDs are ignored.
pub fn auto_layout(nodes: &[GraphNode], edges: &[ConnectionEdge]) -> Vec<GraphNode> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let known: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let edges: Vec<(&str, &str)> = edges
        .iter()
        .filter(|e| {
            known.contains(e.source.as_str())
                && known.contains(e.target.as_str())
                && e.source != e.target
        })
        .map(|e| (e.source.as_str(), e.target.as_str()))
        .collect();

    let ranks = compute_ranks(nodes, &edges);
    let max_rank = ranks.values().copied().max().unwrap_or(0);

    // Buckets seeded in input order keep the pass deterministic.
    let mut rank_nodes: Vec<Vec<&str>> = vec![Vec::new(); max_rank + 1];
    for node in nodes {
        rank_nodes[ranks[node.id.as_str()]].push(node.id.as_str());
    }

    order_ranks(&mut rank_nodes, &edges);

    let dims: HashMap<&str, (f64, f64)> = nodes
        .iter()
        .map(|n| (n.id.as_str(), (n.size_class.width(), n.size_class.height())))
        .collect();

    // Assign a center per node: ranks stack downward, each rank centered
    // about x = 0.
    let mut centers: HashMap<&str, (f64, f64)> = HashMap::new();
    let mut y_cursor = 0.0;
    for bucket in &rank_nodes {
        if bucket.is_empty() {
            continue;
        }
        let row_height = bucket.iter().map(|id| dims[id].1).fold(0.0, f64::max);
        let row_width = bucket.iter().map(|id| dims[id].0).sum::<f64>()
            + NODE_SEP * (bucket.len() - 1) as f64;
        let mut x_cursor = -row_width / 2.0;
        for &id in bucket {
            let (w, _) = dims[id];
            centers.insert(id, (x_cursor + w / 2.0, y_cursor + row_height / 2.0));
            x_cursor += w + NODE_SEP;
        }
        y_cursor += row_height + RANK_SEP;
    }

    // Shift so the bounding box's top-left corner lands on the margin, then
    // convert centers to top-left origins.
    let min_x = nodes
        .iter()
        .map(|n| centers[n.id.as_str()].0 - dims[n.id.as_str()].0 / 2.0)
        .fold(f64::INFINITY, f64::min);
    let min_y = nodes
        .iter()
        .map(|n| centers[n.id.as_str()].1 - dims[n.id.as_str()].1 / 2.0)
        .fold(f64::INFINITY, f64::min);
    let dx = MARGIN - min_x;
    let dy = MARGIN - min_y;

    nodes
        .iter()
        .map(|node| {
            let (cx, cy) = centers[node.id.as_str()];
            let (w, h) = dims[node.id.as_str()];
            let mut out = node.clone();
            out.position = Position {
                x: cx + dx - w / 2.0,
                y: cy + dy - h / 2.0,
            };
            out
        })
        .collect()
}

/// Longest-path ranks over a Kahn topological order. Nodes on a cycle are
/// left at whatever rank the acyclic prefix gave them (rank 0 by default)
/// so they still get placed.
fn compute_ranks<'a>(nodes: &'a [GraphNode], edges: &[(&'a str, &'a str)]) -> HashMap<&'a str, usize> {
    let mut indeg: HashMap<&str, usize> = nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for &(from, to) in edges {
        adj.entry(from).or_default().push(to);
        if let Some(d) = indeg.get_mut(to) {
            *d += 1;
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| indeg[id] == 0)
        .collect();
    let mut order: Vec<&str> = Vec::with_capacity(nodes.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);
        if let Some(nexts) = adj.get(id) {
            for &next in nexts {
                if let Some(d) = indeg.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }
    }
    if order.len() < nodes.len() {
        let seen: HashSet<&str> = order.iter().copied().collect();
        for n in nodes {
            if !seen.contains(n.id.as_str()) {
                order.push(n.id.as_str());
            }
        }
    }

    let mut ranks: HashMap<&str, usize> = HashMap::new();
    for &id in &order {
        let rank = *ranks.entry(id).or_insert(0);
        if let Some(nexts) = adj.get(id) {
            for &next in nexts {
                let entry = ranks.entry(next).or_insert(0);
                *entry = (*entry).max(rank + 1);
            }
        }
    }
    ranks
}

/// Two barycenter sweeps in each direction. Nodes without neighbors in the
/// adjacent rank keep their current slot, so the sort stays stable.
fn order_ranks(rank_nodes: &mut [Vec<&str>], edges: &[(&str, &str)]) {
    if rank_nodes.len() <= 1 {
        return;
    }

    let mut incoming: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut outgoing: HashMap<&str, Vec<&str>> = HashMap::new();
    for &(from, to) in edges {
        outgoing.entry(from).or_default().push(to);
        incoming.entry(to).or_default().push(from);
    }

    for _ in 0..2 {
        for direction in [true, false] {
            let neighbors = if direction { &incoming } else { &outgoing };
            let indices: Vec<usize> = if direction {
                (1..rank_nodes.len()).collect()
            } else {
                (0..rank_nodes.len() - 1).rev().collect()
            };
            for rank in indices {
                if rank_nodes[rank].len() <= 1 {
                    continue;
                }
                let positions = positions_of(rank_nodes);
                let scores: HashMap<&str, f64> = rank_nodes[rank]
                    .iter()
                    .enumerate()
                    .map(|(idx, &id)| (id, barycenter(id, idx, neighbors, &positions)))
                    .collect();
                rank_nodes[rank].sort_by(|a, b| {
                    scores[a]
                        .partial_cmp(&scores[b])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
        }
    }
}

fn positions_of(rank_nodes: &[Vec<&str>]) -> HashMap<String, usize> {
    let mut positions = HashMap::new();
    for bucket in rank_nodes {
        for (idx, id) in bucket.iter().enumerate() {
            positions.insert(id.to_string(), idx);
        }
    }
    positions
}

fn barycenter(
    id: &str,
    current_idx: usize,
    neighbors: &HashMap<&str, Vec<&str>>,
    positions: &HashMap<String, usize>,
) -> f64 {
    let Some(list) = neighbors.get(id) else {
        return current_idx as f64;
    };
    let mut total = 0.0;
    let mut count = 0.0;
    for neighbor in list {
        if let Some(pos) = positions.get(*neighbor) {
            total += *pos as f64;
            count += 1.0;
        }
    }
    if count == 0.0 {
        current_idx as f64
    } else {
        total / count
    }
}
