//! The identity-keyed mod catalog and version path resolution.

use super::parser::{load_mods, mods_to_xml, parse_mods};
use super::types::{CatalogError, Mod};
use crate::graph::WeightedGraph;
use crate::version;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// A version path through the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Versions from the start to the end, both inclusive.
    pub versions: Vec<String>,
    /// The schema the path was resolved in. Differs from the requested
    /// schema when a wildcard request adopted a concrete schema.
    pub schema: u32,
}

impl ResolvedPath {
    /// Number of mods on the path.
    pub fn hops(&self) -> usize {
        self.versions.len().saturating_sub(1)
    }

    /// Consecutive `(from, to)` version pairs.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.versions
            .windows(2)
            .map(|pair| (pair[0].as_str(), pair[1].as_str()))
    }
}

/// All known mods, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct ModCatalog {
    mods: Vec<Mod>,
    /// Indices into `mods` grouped by `(from_concat, to_concat)`.
    by_edge: HashMap<(String, String), Vec<usize>>,
}

impl ModCatalog {
    /// Build a catalog, rejecting duplicate identity keys.
    ///
    /// Two mods are duplicates when their versions match and their schemas
    /// are equal or either one is the wildcard schema.
    pub fn new(mods: Vec<Mod>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for m in mods {
            catalog.insert(m)?;
        }
        Ok(catalog)
    }

    pub fn from_xml(xml: &str) -> Result<Self, CatalogError> {
        Self::new(parse_mods(xml)?)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let catalog = Self::new(load_mods(path)?)?;
        info!(path = %path.display(), mods = catalog.len(), "Loaded mod catalog");
        Ok(catalog)
    }

    fn insert(&mut self, m: Mod) -> Result<(), CatalogError> {
        let transition = m.transition();
        let key = (transition.from.clone(), transition.to.clone());
        let slots = self.by_edge.entry(key).or_default();

        if slots
            .iter()
            .any(|&i| self.mods[i].transition().matches(&transition))
        {
            return Err(CatalogError::DuplicateMod(transition.to_string()));
        }

        slots.push(self.mods.len());
        self.mods.push(m);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn mods(&self) -> impl Iterator<Item = &Mod> {
        self.mods.iter()
    }

    /// Look up the mod for a transition.
    ///
    /// Tries the exact schema first, then a wildcard mod. A wildcard request
    /// with no wildcard mod falls back to the lowest concrete schema.
    pub fn find(&self, from: &str, to: &str, schema: u32) -> Option<&Mod> {
        let slots = self.by_edge.get(&(from.to_string(), to.to_string()))?;
        let candidates = || slots.iter().map(|&i| &self.mods[i]);

        candidates()
            .find(|m| m.schema == schema)
            .or_else(|| candidates().find(|m| m.schema == 0))
            .or_else(|| {
                if schema == 0 {
                    candidates().min_by_key(|m| m.schema)
                } else {
                    None
                }
            })
    }

    fn in_schema(m: &Mod, schema: u32) -> bool {
        m.schema == 0 || schema == 0 || m.schema == schema
    }

    /// Build the version graph for a schema partition.
    ///
    /// Vertices are every version seen on a mod in the partition; each mod
    /// is an edge weighted by its step count.
    pub fn build_graph(&self, schema: u32) -> WeightedGraph<String> {
        let mut graph = WeightedGraph::new();
        let members: Vec<&Mod> = self
            .mods
            .iter()
            .filter(|m| Self::in_schema(m, schema))
            .collect();

        for m in &members {
            graph.add(m.from_concat());
            graph.add(m.to_concat());
        }
        for m in &members {
            graph.edge_add(&m.from_concat(), &m.to_concat(), m.weight());
        }

        debug!(schema, vertices = graph.len(), edges = members.len(), "Built version graph");
        graph
    }

    /// The highest target version in a schema partition.
    pub fn latest_version(&self, schema: u32) -> Option<String> {
        let targets: Vec<String> = self
            .mods
            .iter()
            .filter(|m| Self::in_schema(m, schema) && !m.to.trim().is_empty())
            .map(|m| m.to_concat())
            .collect();
        version::latest_version(targets.iter().map(String::as_str))
    }

    /// Resolve the cheapest path from `from` to `to`.
    ///
    /// With a wildcard schema, the first mod on the path that declares a
    /// concrete schema fixes the schema, and the path is recomputed within
    /// it. The route may change as a result.
    pub fn resolve_path(
        &self,
        schema: u32,
        from: &str,
        to: &str,
    ) -> Result<ResolvedPath, CatalogError> {
        let graph = self.build_graph(schema);
        let (from_vertex, to_vertex) = (from.to_string(), to.to_string());

        if !graph.contains(&from_vertex) {
            return Err(CatalogError::CurrentVersionMissing(from.to_string()));
        }
        if !graph.contains(&to_vertex) {
            return Err(CatalogError::RequestedVersionMissing(to.to_string()));
        }

        let mut schema = schema;
        let mut path = graph.shortest_path(&from_vertex, &to_vertex);

        if schema == 0 {
            let adopted = path.as_ref().and_then(|versions| {
                versions
                    .windows(2)
                    .filter_map(|pair| self.find(&pair[0], &pair[1], 0))
                    .map(|m| m.schema)
                    .find(|&s| s != 0)
            });
            if let Some(adopted) = adopted {
                debug!(schema = adopted, "Adopting schema from resolved path");
                schema = adopted;
                path = self
                    .build_graph(schema)
                    .shortest_path(&from_vertex, &to_vertex);
            }
        }

        let versions = path.ok_or_else(|| CatalogError::NoPath(from.to_string(), to.to_string()))?;
        Ok(ResolvedPath { versions, schema })
    }

    /// The catalog as a `<mods>` document, ordered by transition.
    pub fn to_xml(&self) -> String {
        let mut mods: Vec<&Mod> = self.mods.iter().collect();
        mods.sort_by_key(|m| (m.from_concat(), m.to_concat(), m.schema));
        mods_to_xml(mods)
    }
}
