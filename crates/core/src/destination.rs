// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sink destination identifiers

use serde::{Deserialize, Serialize};

/// Identifies one sink destination: `(group_name, node_name, category)`
///
/// Ordering is lexicographic over the tuple in field order, so the default
/// (all-empty) value sorts before every other destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DestinationId {
    group_name: String,
    node_name: String,
    category: String,
}

impl DestinationId {
    pub fn new(
        group_name: impl Into<String>,
        node_name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            group_name: group_name.into(),
            node_name: node_name.into(),
            category: category.into(),
        }
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl std::fmt::Display for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group_name, self.node_name, self.category)
    }
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod tests;
