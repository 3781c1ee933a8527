//! Lookup of indexed functions by subject type.

use serde::{Deserialize, Serialize};

use crate::index::{FunctionRecord, Index};
use crate::type_key::TypeKey;

/// A query as sent by the CLI or over the daemon socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeQuery {
    /// Annotation text to look up; normalized before matching
    pub type_key: String,
    /// Also match keys that contain the type as a nested argument
    #[serde(default)]
    pub nested: bool,
}

impl TypeQuery {
    pub fn exact(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            nested: false,
        }
    }

    pub fn nested(type_key: impl Into<String>) -> Self {
        Self {
            type_key: type_key.into(),
            nested: true,
        }
    }

    /// Run against an index
    pub fn run<'a>(&self, index: &'a Index) -> Vec<&'a FunctionRecord> {
        if self.nested {
            query_nested(index, &self.type_key)
        } else {
            query(index, &self.type_key)
        }
    }
}

/// Records whose subject key equals the normalized `type_key`, in bucket
/// insertion order. No match is an empty result.
pub fn query<'a>(index: &'a Index, type_key: &str) -> Vec<&'a FunctionRecord> {
    index.get(&TypeKey::normalize(type_key)).iter().collect()
}

/// Exact matches first, then records from every other key that contains
/// `type_key` as a sub-expression, keys visited in sorted order.
pub fn query_nested<'a>(index: &'a Index, type_key: &str) -> Vec<&'a FunctionRecord> {
    let key = TypeKey::normalize(type_key);
    let mut results: Vec<&FunctionRecord> = index.get(&key).iter().collect();

    let Some(needle) = key.expr() else {
        return results;
    };

    for candidate in index.keys() {
        if candidate == &key {
            continue;
        }
        let contains = candidate
            .expr()
            .map(|expr| expr.contains_nested(&needle))
            .unwrap_or(false);
        if contains {
            results.extend(index.get(candidate));
        }
    }

    results
}
