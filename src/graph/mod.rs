//! Directed graph with non-negative integer edge weights.
//!
//! The graph is small and dense enough (one vertex per known schema version)
//! that the classic O(V²) Dijkstra is used: repeatedly settle the unvisited
//! vertex with the smallest tentative distance and relax its out-edges.
//! Distances are memoized per source vertex until the graph is mutated.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

/// Shortest-path results from one source vertex, indexed by vertex slot.
#[derive(Debug, Clone)]
struct Distances {
    distance: Vec<Option<u32>>,
    predecessor: Vec<Option<usize>>,
}

/// A weighted directed graph.
///
/// Vertices keep their insertion order, which makes tie-breaking between
/// equally short paths deterministic.
#[derive(Debug)]
pub struct WeightedGraph<V> {
    vertices: Vec<V>,
    index: HashMap<V, usize>,
    /// Out-edges per vertex slot as `(target slot, weight)`.
    edges: Vec<Vec<(usize, u32)>>,
    cache: RefCell<HashMap<usize, Distances>>,
}

impl<V> WeightedGraph<V>
where
    V: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Add a vertex. Adding an existing vertex does nothing.
    pub fn add(&mut self, vertex: V) {
        if self.index.contains_key(&vertex) {
            return;
        }
        self.index.insert(vertex.clone(), self.vertices.len());
        self.vertices.push(vertex);
        self.edges.push(Vec::new());
        self.invalidate();
    }

    pub fn contains(&self, vertex: &V) -> bool {
        self.index.contains_key(vertex)
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Add an edge from `source` to `target`.
    ///
    /// Does nothing if either vertex is absent or the edge already exists
    /// with the same weight. An existing edge with a different weight is
    /// overwritten.
    pub fn edge_add(&mut self, source: &V, target: &V, weight: u32) {
        let (Some(&from), Some(&to)) = (self.index.get(source), self.index.get(target)) else {
            return;
        };

        let out = &mut self.edges[from];
        match out.iter_mut().find(|(t, _)| *t == to) {
            Some((_, w)) if *w == weight => return,
            Some((_, w)) => *w = weight,
            None => out.push((to, weight)),
        }
        self.invalidate();
    }

    /// Weight of the edge from `source` to `target`, if it exists.
    pub fn edge_weight(&self, source: &V, target: &V) -> Option<u32> {
        let from = *self.index.get(source)?;
        let to = *self.index.get(target)?;
        self.edges[from]
            .iter()
            .find(|(t, _)| *t == to)
            .map(|(_, w)| *w)
    }

    pub fn edge_exists(&self, source: &V, target: &V) -> bool {
        self.edge_weight(source, target).is_some()
    }

    /// Targets of the out-edges of `vertex`, or `None` if it is not in the graph.
    pub fn neighbors(&self, vertex: &V) -> Option<Vec<&V>> {
        let from = *self.index.get(vertex)?;
        Some(
            self.edges[from]
                .iter()
                .map(|(t, _)| &self.vertices[*t])
                .collect(),
        )
    }

    /// Sum of the edge weights along the shortest path, or `None` if
    /// `target` is unreachable from `source` (or either is absent).
    pub fn shortest_distance(&self, source: &V, target: &V) -> Option<u32> {
        let from = *self.index.get(source)?;
        let to = *self.index.get(target)?;
        self.with_distances(from, |d| d.distance[to])
    }

    /// The vertices of the shortest path from `source` to `target`,
    /// both inclusive, or `None` if no path exists.
    pub fn shortest_path(&self, source: &V, target: &V) -> Option<Vec<V>> {
        let from = *self.index.get(source)?;
        let to = *self.index.get(target)?;

        let slots = self.with_distances(from, |d| {
            d.distance[to]?;
            let mut slots = vec![to];
            let mut current = to;
            while current != from {
                current = d.predecessor[current]?;
                slots.push(current);
            }
            slots.reverse();
            Some(slots)
        })?;

        Some(slots.into_iter().map(|s| self.vertices[s].clone()).collect())
    }

    fn invalidate(&mut self) {
        self.cache.get_mut().clear();
    }

    fn with_distances<T>(&self, source: usize, f: impl FnOnce(&Distances) -> T) -> T {
        let mut cache = self.cache.borrow_mut();
        let distances = cache
            .entry(source)
            .or_insert_with(|| self.dijkstra(source));
        f(distances)
    }

    fn dijkstra(&self, source: usize) -> Distances {
        let count = self.vertices.len();
        let mut distance: Vec<Option<u32>> = vec![None; count];
        let mut predecessor: Vec<Option<usize>> = vec![None; count];
        let mut settled = vec![false; count];
        distance[source] = Some(0);

        for _ in 0..count {
            // First unsettled vertex with the smallest known distance wins ties.
            let next = (0..count)
                .filter(|&v| !settled[v])
                .filter_map(|v| distance[v].map(|d| (v, d)))
                .min_by_key(|&(_, d)| d);

            let Some((next, base)) = next else {
                break;
            };
            settled[next] = true;

            for &(target, weight) in &self.edges[next] {
                if settled[target] {
                    continue;
                }
                let sum = base.saturating_add(weight);
                if distance[target].map_or(true, |current| sum < current) {
                    distance[target] = Some(sum);
                    predecessor[target] = Some(next);
                }
            }
        }

        Distances {
            distance,
            predecessor,
        }
    }
}

impl<V> Default for WeightedGraph<V>
where
    V: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
