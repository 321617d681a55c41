//! Query matching (§4.4). A full query planner is explicitly out of scope;
//! this is the minimal matcher the index needs to drive `find`/`update`/
//! `remove` - flat field equality plus a `$and` combinator - standing in for
//! whatever richer query language a caller layers on top.

use fsstore_common::Document;
use serde_json::Value;

pub trait Matcher: Send + Sync {
    fn matches(&self, doc: &Document) -> bool;
}

/// A query object: a flat map of field-equality constraints, optionally
/// nested under `$and`.
#[derive(Debug, Clone)]
pub struct EqualityMatcher {
    query: serde_json::Map<String, Value>,
}

impl EqualityMatcher {
    pub fn new(query: serde_json::Map<String, Value>) -> Self {
        Self { query }
    }

    /// A matcher that accepts every document, for `remove`/`find` calls with
    /// no filter.
    pub fn all() -> Self {
        Self { query: serde_json::Map::new() }
    }

    pub fn query(&self) -> &serde_json::Map<String, Value> {
        &self.query
    }
}

impl Matcher for EqualityMatcher {
    fn matches(&self, doc: &Document) -> bool {
        matches_query(&self.query, doc)
    }
}

fn matches_query(query: &serde_json::Map<String, Value>, doc: &Document) -> bool {
    for (key, expected) in query {
        if key == "$and" {
            let Some(clauses) = expected.as_array() else {
                return false;
            };
            let all_match = clauses
                .iter()
                .all(|clause| clause.as_object().is_some_and(|c| matches_query(c, doc)));
            if !all_match {
                return false;
            }
            continue;
        }

        match doc.get(key) {
            Some(actual) if actual == expected => {}
            _ => return false,
        }
    }
    true
}

/// The subset of a query usable to seed a new document on upsert: the flat
/// equality constraints, skipping `$`-prefixed operators which don't name a
/// concrete field value.
pub fn flatten_query(query: &serde_json::Map<String, Value>) -> serde_json::Map<String, Value> {
    query
        .iter()
        .filter(|(k, _)| !k.starts_with('$'))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
