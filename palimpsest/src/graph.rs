// Copyright 2025 the Palimpsest Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dependency graph between images and the images and shaders they read.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use palimpsest_atlas::ImageId;
use smallvec::SmallVec;

use crate::ShaderId;

/// A vertex of the dependency graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum Node {
    Image(ImageId),
    Shader(ShaderId),
}

type Edges = SmallVec<[Node; 4]>;

/// "A reads from B" edges, stored in both directions.
///
/// Only images have outgoing edges; shaders are always leaves.
#[derive(Clone, Debug, Default)]
pub(crate) struct DependencyGraph {
    /// forward[a] -> nodes `a` reads from.
    forward: HashMap<Node, Edges>,
    /// reverse[b] -> nodes that read from `b`.
    reverse: HashMap<Node, Edges>,
}

fn remove_edge(map: &mut HashMap<Node, Edges>, key: Node, value: Node) {
    if let Entry::Occupied(mut e) = map.entry(key) {
        if let Some(pos) = e.get().iter().position(|&k| k == value) {
            e.get_mut().swap_remove(pos);
        }
        if e.get().is_empty() {
            e.remove();
        }
    }
}

impl DependencyGraph {
    /// Records that `from` reads from `to`. Returns `false` if already known.
    pub(crate) fn add_dependency(&mut self, from: Node, to: Node) -> bool {
        let fwd = self.forward.entry(from).or_default();
        if fwd.contains(&to) {
            return false;
        }
        fwd.push(to);
        self.reverse.entry(to).or_default().push(from);
        true
    }

    /// Drops every outgoing edge of `from`.
    pub(crate) fn clear_dependencies(&mut self, from: Node) {
        let Some(deps) = self.forward.remove(&from) else {
            return;
        };
        for dep in deps {
            remove_edge(&mut self.reverse, dep, from);
        }
    }

    /// Removes `node` and every edge touching it.
    pub(crate) fn remove_node(&mut self, node: Node) {
        self.clear_dependencies(node);
        if let Some(dependents) = self.reverse.remove(&node) {
            for dependent in dependents {
                remove_edge(&mut self.forward, dependent, node);
            }
        }
    }

    /// Nodes that `node` reads from directly.
    pub(crate) fn dependencies(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.forward.get(&node).into_iter().flatten().copied()
    }

    /// Nodes that read from `node` directly.
    pub(crate) fn dependents(&self, node: Node) -> impl Iterator<Item = Node> + '_ {
        self.reverse.get(&node).into_iter().flatten().copied()
    }

    /// Every node that reads from `node`, directly or not, sorted.
    ///
    /// `node` itself is excluded.
    pub(crate) fn transitive_dependents(&self, node: Node) -> Vec<Node> {
        let mut visited = HashSet::new();
        let mut stack: Vec<Node> = self.dependents(node).collect();
        while let Some(current) = stack.pop() {
            if current == node || !visited.insert(current) {
                continue;
            }
            stack.extend(self.dependents(current));
        }
        let mut out: Vec<Node> = visited.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Orders `images` so that every image comes after the images it reads.
    ///
    /// Kahn's algorithm; among ready images the smallest handle goes first.
    /// Edges to nodes outside `images` are ignored. Returns the order and the
    /// number of images left unordered because of a cycle.
    pub(crate) fn sorted(&self, images: &[ImageId]) -> (Vec<ImageId>, usize) {
        let mut in_degree: HashMap<ImageId, usize> = HashMap::with_capacity(images.len());
        for &id in images {
            in_degree.entry(id).or_insert(0);
        }
        let keys: Vec<ImageId> = in_degree.keys().copied().collect();
        for id in keys {
            let deps = self
                .dependencies(Node::Image(id))
                .filter(|dep| matches!(dep, Node::Image(d) if in_degree.contains_key(d)))
                .count();
            if let Some(deg) = in_degree.get_mut(&id) {
                *deg = deps;
            }
        }

        let mut ready: BinaryHeap<Reverse<ImageId>> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(id)) = ready.pop() {
            in_degree.remove(&id);
            order.push(id);
            for dependent in self.dependents(Node::Image(id)) {
                let Node::Image(dependent) = dependent else {
                    continue;
                };
                if let Some(deg) = in_degree.get_mut(&dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }
        (order, in_degree.len())
    }
}
