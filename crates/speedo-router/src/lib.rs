//! speedo-router: Zero-dependency ordered route table
//!
//! Routes are evaluated in insertion order and the first matching entry wins.
//! A table always carries a fallback value that is returned when no entry
//! matches, so classification is total: every request maps to exactly one
//! route.
//!
//! ## Predicates
//! - `Exact("/ping")` - path equals the literal
//! - `Prefix("/results/")` - path starts with the literal
//!
//! ## Example
//! ```
//! use speedo_router::{MethodFilter, PathPredicate, RouteTable};
//!
//! let table = RouteTable::new("static")
//!     .route(MethodFilter::Any, PathPredicate::Exact("/ping"), "ping")
//!     .route(MethodFilter::Only("POST"), PathPredicate::Exact("/save"), "save")
//!     .route(MethodFilter::Any, PathPredicate::Prefix("/results/"), "results");
//!
//! assert_eq!(table.find("GET", "/ping"), "ping");
//! assert_eq!(table.find("POST", "/save"), "save");
//! assert_eq!(table.find("GET", "/save"), "static");
//! assert_eq!(table.find("GET", "/results/a.json"), "results");
//! ```

/// Path predicate of a route entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPredicate {
    /// Path must equal the literal
    Exact(&'static str),
    /// Path must start with the literal
    Prefix(&'static str),
}

impl PathPredicate {
    /// Check whether `path` satisfies the predicate
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPredicate::Exact(lit) => path == *lit,
            PathPredicate::Prefix(prefix) => path.starts_with(prefix),
        }
    }
}

/// Method constraint of a route entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodFilter {
    /// Any method matches
    Any,
    /// Only the given method matches (compared case-insensitively)
    Only(&'static str),
}

impl MethodFilter {
    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(m) => m.eq_ignore_ascii_case(method),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    method: MethodFilter,
    path: PathPredicate,
    value: T,
}

/// Ordered route table
///
/// Entries are tested in the order they were added; the fallback is
/// consulted last. Matching is a linear scan, which is cheaper than any
/// tree for the handful of entries a table holds.
#[derive(Debug, Clone)]
pub struct RouteTable<T> {
    entries: Vec<Entry<T>>,
    fallback: T,
}

impl<T: Copy> RouteTable<T> {
    /// Create an empty table with the given fallback
    pub fn new(fallback: T) -> Self {
        Self {
            entries: Vec::new(),
            fallback,
        }
    }

    /// Append an entry (builder style)
    pub fn route(mut self, method: MethodFilter, path: PathPredicate, value: T) -> Self {
        self.entries.push(Entry { method, path, value });
        self
    }

    /// Value of the first matching entry, or the fallback
    pub fn find(&self, method: &str, path: &str) -> T {
        self.entries
            .iter()
            .find(|e| e.path.matches(path) && e.method.matches(method))
            .map_or(self.fallback, |e| e.value)
    }
}
