//! Runtime instance identifiers
//!
//! Ids are derived from where an object sits in the scene, never from
//! memory addresses, so reloading a scene yields the same ids.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

const SEPARATOR: char = '_';
const ESCAPE: char = '\\';

/// Stable identifier of a tracked instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeId(String);

impl RuntimeId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build an id from the object name, its scene and the sibling index of
    /// every node from the object up to the scene root.
    ///
    /// `("Player", "Level1", [2, 0])` becomes `Player_Level1_2_0_`. A `_` or
    /// `\` inside the name or scope is escaped with `\`, so distinct paths
    /// never produce the same id.
    pub fn from_scene_path(name: &str, scope: &str, sibling_indices_leaf_to_root: &[usize]) -> Self {
        let mut id = String::with_capacity(name.len() + scope.len() + 2 + sibling_indices_leaf_to_root.len() * 2);
        push_escaped(&mut id, name);
        id.push(SEPARATOR);
        push_escaped(&mut id, scope);
        id.push(SEPARATOR);
        for index in sibling_indices_leaf_to_root {
            id.push_str(&index.to_string());
            id.push(SEPARATOR);
        }
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn push_escaped(out: &mut String, part: &str) {
    for c in part.chars() {
        if c == SEPARATOR || c == ESCAPE {
            out.push(ESCAPE);
        }
        out.push(c);
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RuntimeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RuntimeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for RuntimeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RuntimeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
