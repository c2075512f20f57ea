//! Metadata filters applied before similarity ranking.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Record metadata.
pub type Metadata = BTreeMap<String, Value>;

/// Restricts which records a query may return.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    /// Every record
    #[default]
    All,
    /// `metadata[key] == value`
    Eq { key: String, value: Value },
    /// `metadata[key]` is one of `values`
    In { key: String, values: Vec<Value> },
    /// `metadata[key]` is an array sharing at least `min` strings with `values`
    Overlap {
        key: String,
        values: Vec<String>,
        min: usize,
    },
    /// Record id is one of `ids`
    Ids { ids: Vec<String> },
    /// Every inner filter matches
    And { filters: Vec<Filter> },
    /// The inner filter does not match
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ids {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn overlap(key: impl Into<String>, values: Vec<String>, min: usize) -> Self {
        Self::Overlap {
            key: key.into(),
            values,
            min,
        }
    }

    /// Records whose id is not one of `ids`.
    pub fn excluding<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::ids(ids).negate()
    }

    pub fn negate(self) -> Self {
        match self {
            Filter::Not { filter } => *filter,
            other => Filter::Not {
                filter: Box::new(other),
            },
        }
    }

    /// Combine with another filter.
    pub fn and(self, other: Filter) -> Self {
        match (self, other) {
            (Filter::All, other) | (other, Filter::All) => other,
            (Filter::And { mut filters }, other) => {
                filters.push(other);
                Filter::And { filters }
            }
            (this, other) => Filter::And {
                filters: vec![this, other],
            },
        }
    }

    pub fn matches(&self, id: &str, metadata: &Metadata) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq { key, value } => metadata.get(key) == Some(value),
            Filter::In { key, values } => metadata
                .get(key)
                .map(|v| values.contains(v))
                .unwrap_or(false),
            Filter::Overlap { key, values, min } => {
                let shared = metadata
                    .get(key)
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .filter(|item| values.iter().any(|v| v == item))
                            .count()
                    })
                    .unwrap_or(0);
                shared >= *min
            }
            Filter::Ids { ids } => ids.iter().any(|candidate| candidate == id),
            Filter::And { filters } => filters.iter().all(|f| f.matches(id, metadata)),
            Filter::Not { filter } => !filter.matches(id, metadata),
        }
    }
}
