//! Space descriptors
//!
//! A space is a tree of named dimensions describing the shape of an action,
//! object or feature buffer. Internal nodes have kind [`DimensionKind::Space`];
//! every other kind is a leaf occupying exactly one slot of the flattened
//! buffer.
//!
//! ```text
//! actionSpace (Space)
//! └── Player (Space, id = prefab id)
//!     └── Mover (Space, id = component id)
//!         ├── x  (Continuous, id = "Mover|x")
//!         └── y  (Continuous, id = "Mover|y")
//! ```

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::READ_ONLY_TAG;

/// Schema errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Unknown dimension kind: {0}")]
    UnknownKind(String),

    #[error("Dimension '{0}' is a leaf but has children")]
    LeafWithChildren(String),

    #[error("Duplicate dimension name '{name}' under '{parent}'")]
    DuplicateName { parent: String, name: String },

    #[error("Duplicate dimension id '{id}' under '{parent}'")]
    DuplicateId { parent: String, id: String },

    #[error("Dimension '{0}' cannot be sampled")]
    Unsampleable(String),

    #[error("Dimension '{name}' has non-finite bounds [{min}, {max}]")]
    NonFiniteBounds { name: String, min: f64, max: f64 },
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Kind of a dimension.
///
/// `UNKNOWN` has no variant: it is rejected while parsing instead of
/// travelling through the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DimensionKind {
    /// Internal node grouping child dimensions
    #[default]
    Space,
    Discrete,
    Continuous,
    Boolean,
    Categorical,
    StringValue,
}

impl DimensionKind {
    /// JSON name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            DimensionKind::Space => "SPACE",
            DimensionKind::Discrete => "DISCRETE_DIMENSION",
            DimensionKind::Continuous => "CONTINUOUS_DIMENSION",
            DimensionKind::Boolean => "BOOLEAN_DIMENSION",
            DimensionKind::Categorical => "CATEGORICAL_DIMENSION",
            DimensionKind::StringValue => "STRING_DIMENSION",
        }
    }

    /// Parse a JSON kind name
    pub fn parse(name: &str) -> SchemaResult<Self> {
        match name {
            "SPACE" => Ok(DimensionKind::Space),
            "DISCRETE_DIMENSION" => Ok(DimensionKind::Discrete),
            "CONTINUOUS_DIMENSION" => Ok(DimensionKind::Continuous),
            "BOOLEAN_DIMENSION" => Ok(DimensionKind::Boolean),
            "CATEGORICAL_DIMENSION" => Ok(DimensionKind::Categorical),
            "STRING_DIMENSION" => Ok(DimensionKind::StringValue),
            other => Err(SchemaError::UnknownKind(other.to_string())),
        }
    }

    /// Whether the kind has a numeric range
    pub fn is_ranged(&self) -> bool {
        matches!(
            self,
            DimensionKind::Discrete | DimensionKind::Continuous | DimensionKind::Categorical
        )
    }
}

impl fmt::Display for DimensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for DimensionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DimensionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        DimensionKind::parse(&name).map_err(serde::de::Error::custom)
    }
}

/// A node of a space tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dimension {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: DimensionKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "minValue", alias = "min_value", default)]
    pub min: f64,
    #[serde(rename = "maxValue", alias = "max_value", default)]
    pub max: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(rename = "dims", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Dimension>,
}

impl Dimension {
    /// Create an empty space node
    pub fn space(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    /// Create a leaf dimension
    pub fn leaf(name: impl Into<String>, id: impl Into<String>, kind: DimensionKind) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            kind,
            ..Default::default()
        }
    }

    /// Set the numeric bounds
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Append a child
    pub fn with_child(mut self, child: Dimension) -> Self {
        self.children.push(child);
        self
    }

    pub fn is_space(&self) -> bool {
        self.kind == DimensionKind::Space
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the field is consumed but never written back
    pub fn is_read_only(&self) -> bool {
        self.has_tag(READ_ONLY_TAG)
    }

    /// Number of scalar slots the subtree occupies
    pub fn size(&self) -> usize {
        if self.is_space() {
            self.children.iter().map(Dimension::size).sum()
        } else {
            1
        }
    }

    /// Direct child by name
    pub fn child(&self, name: &str) -> Option<&Dimension> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Depth-first (pre-order) search by id, including this node
    pub fn find_by_id(&self, id: &str) -> Option<&Dimension> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_by_id(id))
    }

    /// Leaves in flattened buffer order
    pub fn leaves(&self) -> Vec<&Dimension> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Dimension>) {
        if self.is_space() {
            for child in &self.children {
                child.collect_leaves(out);
            }
        } else {
            out.push(self);
        }
    }

    /// Path of the leaf at a flat buffer index, e.g. `actionSpace->Player->Mover->x`.
    ///
    /// Returns `None` when the index is past the end of the space.
    pub fn to_display_string(&self, index: usize, show_ranges: bool) -> Option<String> {
        let mut remaining = index as i64;
        self.describe(&mut remaining, show_ranges)
    }

    fn describe(&self, remaining: &mut i64, show_ranges: bool) -> Option<String> {
        if self.is_space() {
            for child in &self.children {
                if let Some(path) = child.describe(remaining, show_ranges) {
                    return Some(format!("{}->{}", self.name, path));
                }
            }
            return None;
        }

        *remaining -= 1;
        if *remaining >= 0 {
            return None;
        }
        let label = match (show_ranges, self.kind) {
            (true, kind) if kind.is_ranged() => {
                format!("{} (Min:{}, Max:{})", self.name, self.min, self.max)
            }
            (true, DimensionKind::Boolean) => format!("{} (True/False)", self.name),
            _ => self.name.clone(),
        };
        Some(label)
    }

    /// Draw a random value for every leaf, in buffer order
    pub fn sample_action<R: Rng + ?Sized>(&self, rng: &mut R) -> SchemaResult<Vec<f64>> {
        let mut out = Vec::with_capacity(self.size());
        for leaf in self.leaves() {
            out.push(leaf.sample_leaf(rng)?);
        }
        Ok(out)
    }

    /// Draw a random value for a single leaf
    pub fn sample_leaf<R: Rng + ?Sized>(&self, rng: &mut R) -> SchemaResult<f64> {
        match self.kind {
            kind if kind.is_ranged() => {
                if !self.min.is_finite() || !self.max.is_finite() {
                    return Err(SchemaError::NonFiniteBounds {
                        name: self.name.clone(),
                        min: self.min,
                        max: self.max,
                    });
                }
                if self.max <= self.min {
                    return Ok(self.min);
                }
                if (self.max - self.min).is_finite() {
                    Ok(rng.gen_range(self.min..=self.max))
                } else {
                    // Width overflows f64; halving both bounds is exact.
                    Ok(rng.gen_range(self.min / 2.0..=self.max / 2.0) * 2.0)
                }
            }
            DimensionKind::Boolean => Ok(rng.gen_range(0..2) as f64),
            _ => Err(SchemaError::Unsampleable(self.name.clone())),
        }
    }

    /// Check structural invariants of the subtree.
    ///
    /// Names are unique among siblings; non-empty ids are unique across the
    /// whole tree.
    pub fn validate(&self) -> SchemaResult<()> {
        let mut ids = HashSet::new();
        if !self.id.is_empty() {
            ids.insert(self.id.as_str());
        }
        self.validate_subtree(&mut ids)
    }

    fn validate_subtree<'a>(&'a self, ids: &mut HashSet<&'a str>) -> SchemaResult<()> {
        if !self.is_space() {
            if !self.children.is_empty() {
                return Err(SchemaError::LeafWithChildren(self.name.clone()));
            }
            return Ok(());
        }

        let mut names = HashSet::new();
        for child in &self.children {
            if !names.insert(child.name.as_str()) {
                return Err(SchemaError::DuplicateName {
                    parent: self.name.clone(),
                    name: child.name.clone(),
                });
            }
            if !child.id.is_empty() && !ids.insert(child.id.as_str()) {
                return Err(SchemaError::DuplicateId {
                    parent: self.name.clone(),
                    id: child.id.clone(),
                });
            }
            child.validate_subtree(ids)?;
        }
        Ok(())
    }
}

/// One host field to place in a space
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub prefab_id: String,
    pub component_id: String,
    pub field_id: String,
    pub name: String,
    pub kind: DimensionKind,
    pub min: f64,
    pub max: f64,
    pub tags: Vec<String>,
}

impl FieldSpec {
    /// Create a field spec; the display name defaults to the field id
    pub fn new(
        prefab_id: impl Into<String>,
        component_id: impl Into<String>,
        field_id: impl Into<String>,
        kind: DimensionKind,
    ) -> Self {
        let field_id = field_id.into();
        Self {
            prefab_id: prefab_id.into(),
            component_id: component_id.into(),
            name: field_id.clone(),
            field_id,
            kind,
            min: 0.0,
            max: 0.0,
            tags: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn read_only(self) -> Self {
        self.tag(READ_ONLY_TAG)
    }
}

/// Groups field specs into a prefab → component → field tree
#[derive(Debug, Default)]
pub struct SpaceBuilder {
    name: String,
    prefab_names: Vec<(String, String)>,
    fields: Vec<FieldSpec>,
}

impl SpaceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Give a prefab a display name other than its id
    pub fn prefab_name(mut self, prefab_id: impl Into<String>, name: impl Into<String>) -> Self {
        self.prefab_names.push((prefab_id.into(), name.into()));
        self
    }

    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Build and validate the tree. Groups keep first-seen order.
    pub fn build(self) -> SchemaResult<Dimension> {
        let mut root = Dimension::space(self.name, "");

        for spec in self.fields {
            if spec.kind == DimensionKind::Space {
                return Err(SchemaError::UnknownKind(format!(
                    "{} (fields must be leaves)",
                    spec.field_id
                )));
            }

            let prefab_index = match root.children.iter().position(|p| p.id == spec.prefab_id) {
                Some(index) => index,
                None => {
                    let name = self
                        .prefab_names
                        .iter()
                        .find(|(id, _)| *id == spec.prefab_id)
                        .map(|(_, name)| name.clone())
                        .unwrap_or_else(|| spec.prefab_id.clone());
                    root.children.push(Dimension::space(name, spec.prefab_id.clone()));
                    root.children.len() - 1
                }
            };
            let prefab = &mut root.children[prefab_index];

            let component_index = match prefab.children.iter().position(|c| c.id == spec.component_id) {
                Some(index) => index,
                None => {
                    prefab
                        .children
                        .push(Dimension::space(spec.component_id.clone(), spec.component_id.clone()));
                    prefab.children.len() - 1
                }
            };

            let mut leaf = Dimension::leaf(spec.name, spec.field_id, spec.kind).with_bounds(spec.min, spec.max);
            leaf.tags = spec.tags;
            prefab.children[component_index].children.push(leaf);
        }

        root.validate()?;
        Ok(root)
    }
}
