//! Per-application pattern router with a resolution cache.
//!
//! # Responsibilities
//! - Store servlet and filter pattern tables
//! - Resolve a path to the servlet with the longest matching pattern
//! - Collect the filters that apply to a path, in declaration order
//! - Cache resolutions and drop the cache whenever a table changes
//!
//! # Design Decisions
//! - Tables and cache live in one immutable snapshot behind `ArcSwap`
//! - Writers clone the tables into a fresh snapshot with an empty cache and
//!   swap it in; a reader racing a writer can only fill the discarded
//!   snapshot's cache, so a cached entry always matches a fresh scan
//! - Ties between equally long patterns go to the first declared
//! - The cache is bounded; past the limit results are computed but not stored

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::observability::metrics;
use crate::routing::pattern::UrlPattern;

/// Cache entries kept per snapshot before new results stop being stored.
pub const MAX_CACHED_PATHS: usize = 4096;

#[derive(Debug, Clone)]
struct Mapping {
    pattern: UrlPattern,
    component: String,
}

#[derive(Debug, Default)]
struct RouteTable {
    servlets: Vec<Mapping>,
    filters: Vec<Mapping>,
    /// `(servlet name, filter name)` pairs from name-based filter mappings.
    servlet_filters: Vec<(String, String)>,
    cache: DashMap<String, Option<String>>,
}

impl RouteTable {
    /// Copy the tables, leaving the cache behind.
    fn without_cache(&self) -> Self {
        Self {
            servlets: self.servlets.clone(),
            filters: self.filters.clone(),
            servlet_filters: self.servlet_filters.clone(),
            cache: DashMap::new(),
        }
    }

    fn scan_servlets(&self, path: &str) -> Option<String> {
        let mut best: Option<&Mapping> = None;
        for mapping in self.servlets.iter().filter(|m| m.pattern.matches(path)) {
            // Strictly longer only: the first declared wins a tie.
            if best.map_or(true, |b| mapping.pattern.specificity() > b.pattern.specificity()) {
                best = Some(mapping);
            }
        }
        best.map(|m| m.component.clone())
    }
}

/// Longest-match router for one application.
#[derive(Debug)]
pub struct PatternRouter {
    table: ArcSwap<RouteTable>,
    writer: Mutex<()>,
}

impl Default for PatternRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRouter {
    pub fn new() -> Self {
        Self {
            table: ArcSwap::from_pointee(RouteTable::default()),
            writer: Mutex::new(()),
        }
    }

    /// Apply `change` to a cache-less copy of the tables and publish it.
    fn update<T>(&self, change: impl FnOnce(&mut RouteTable) -> T) -> T {
        let _guard = self.writer.lock();
        let mut next = self.table.load().without_cache();
        let result = change(&mut next);
        self.table.store(Arc::new(next));
        result
    }

    /// Map `pattern` to `servlet`.
    ///
    /// Re-mapping an existing pattern rebinds it in place and returns the
    /// servlet it previously pointed to.
    pub fn add_servlet_mapping(&self, pattern: &str, servlet: &str) -> Option<String> {
        self.update(|table| {
            match table.servlets.iter_mut().find(|m| m.pattern.as_str() == pattern) {
                Some(existing) => Some(std::mem::replace(&mut existing.component, servlet.to_string())),
                None => {
                    table.servlets.push(Mapping {
                        pattern: UrlPattern::new(pattern),
                        component: servlet.to_string(),
                    });
                    None
                }
            }
        })
    }

    /// Remove a servlet pattern. Returns the servlet it pointed to.
    pub fn remove_servlet_mapping(&self, pattern: &str) -> Option<String> {
        self.update(|table| {
            let index = table.servlets.iter().position(|m| m.pattern.as_str() == pattern)?;
            Some(table.servlets.remove(index).component)
        })
    }

    pub fn add_filter_mapping(&self, pattern: &str, filter: &str) {
        self.update(|table| {
            table.filters.push(Mapping {
                pattern: UrlPattern::new(pattern),
                component: filter.to_string(),
            })
        });
    }

    /// Apply `filter` to every request that resolves to `servlet`.
    pub fn add_filter_servlet_mapping(&self, servlet: &str, filter: &str) {
        self.update(|table| {
            table
                .servlet_filters
                .push((servlet.to_string(), filter.to_string()))
        });
    }

    /// Servlet owning `path`: cached, or the longest matching pattern.
    pub fn resolve_servlet(&self, path: &str) -> Option<String> {
        let table = self.table.load();
        if let Some(hit) = table.cache.get(path) {
            metrics::record_cache_lookup("app", true);
            return hit.value().clone();
        }
        metrics::record_cache_lookup("app", false);

        let resolved = table.scan_servlets(path);
        if table.cache.len() < MAX_CACHED_PATHS {
            table.cache.insert(path.to_string(), resolved.clone());
        }
        resolved
    }

    /// Filters applying to `path`, in declaration order, without duplicates.
    ///
    /// URL-pattern mappings come first, then mappings naming `servlet`.
    pub fn matching_filters(&self, path: &str, servlet: Option<&str>) -> Vec<String> {
        let table = self.table.load();
        let mut names: Vec<String> = Vec::new();
        let by_pattern = table
            .filters
            .iter()
            .filter(|m| m.pattern.matches(path))
            .map(|m| &m.component);
        let by_servlet = table
            .servlet_filters
            .iter()
            .filter(|(s, _)| Some(s.as_str()) == servlet)
            .map(|(_, f)| f);
        for name in by_pattern.chain(by_servlet) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// `(pattern, servlet)` pairs in declaration order.
    pub fn servlet_mappings(&self) -> Vec<(String, String)> {
        self.table
            .load()
            .servlets
            .iter()
            .map(|m| (m.pattern.to_string(), m.component.clone()))
            .collect()
    }

    /// `(pattern, filter)` pairs in declaration order.
    pub fn filter_mappings(&self) -> Vec<(String, String)> {
        self.table
            .load()
            .filters
            .iter()
            .map(|m| (m.pattern.to_string(), m.component.clone()))
            .collect()
    }

    /// `(servlet, filter)` pairs from name-based filter mappings.
    pub fn servlet_filter_mappings(&self) -> Vec<(String, String)> {
        self.table.load().servlet_filters.clone()
    }

    /// Patterns currently bound to `servlet`.
    pub fn patterns_for(&self, servlet: &str) -> Vec<String> {
        self.table
            .load()
            .servlets
            .iter()
            .filter(|m| m.component == servlet)
            .map(|m| m.pattern.to_string())
            .collect()
    }

    pub fn clear_cache(&self) {
        self.table.load().cache.clear();
    }

    pub fn cached_paths(&self) -> usize {
        self.table.load().cache.len()
    }
}
