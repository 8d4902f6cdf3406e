//! Field registry and runtime binding cache
//!
//! The [`FieldRegistry`] holds, per prefab schema, three ordered lists of
//! binding templates (objects, actions, features). Tracking an instance binds
//! every template to the instance's components and stores the result in the
//! [`RuntimeBindingCache`], which keeps registration order.

use modl_core::{Dimension, GameConfig, ValueCodec, WireFormat, LOG_PREFIX};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::accessor::{AccessorTable, ComponentResolver, FieldAccessor, FieldTemplate};
use crate::error::{RegistryError, RegistryResult};
use crate::runtime_id::RuntimeId;

/// A field template with its buffer layout, not bound to an instance yet
#[derive(Debug, Clone)]
pub struct BindingTemplate {
    pub template: Arc<FieldTemplate>,
    /// Number of scalars the field occupies in its buffer
    pub buffer_size: usize,
    pub read_only: bool,
}

impl BindingTemplate {
    pub fn new(template: Arc<FieldTemplate>, buffer_size: usize, read_only: bool) -> Self {
        Self {
            template,
            buffer_size,
            read_only,
        }
    }

    /// Size taken from the field's codec layout
    pub fn sized(template: Arc<FieldTemplate>, format: WireFormat, read_only: bool) -> RegistryResult<Self> {
        let size = ValueCodec::new(format)
            .fixed_size(template.field_type())
            .map_err(|e| RegistryError::codec(template.field_id(), e))?
            .unwrap_or(0);
        Ok(Self::new(template, size, read_only))
    }
}

/// Binding templates of one prefab schema
#[derive(Debug, Clone, Default)]
pub struct SchemaTemplates {
    pub objects: Vec<BindingTemplate>,
    pub actions: Vec<BindingTemplate>,
    pub features: Vec<BindingTemplate>,
}

/// Binding templates for every known prefab
#[derive(Debug, Default)]
pub struct FieldRegistry {
    schemas: HashMap<String, SchemaTemplates>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the templates of a prefab, replacing earlier ones
    pub fn register_schema(
        &mut self,
        prefab_schema_id: impl Into<String>,
        objects: Vec<BindingTemplate>,
        actions: Vec<BindingTemplate>,
        features: Vec<BindingTemplate>,
    ) {
        self.schemas.insert(
            prefab_schema_id.into(),
            SchemaTemplates {
                objects,
                actions,
                features,
            },
        );
    }

    /// Build templates for every field listed in the config.
    ///
    /// Each field must have an accessor, must be encodable in the format of
    /// its space and, when its encoded size is fixed, must match the size
    /// declared by its dimension.
    pub fn from_config(config: &GameConfig, table: &AccessorTable) -> RegistryResult<Self> {
        let mut registry = Self::new();

        registry.add_space(&config.object_space, WireFormat::Typed, table, |s| &mut s.objects)?;
        registry.add_space(&config.action_space, WireFormat::Legacy, table, |s| &mut s.actions)?;
        registry.add_space(&config.feature_space, WireFormat::Legacy, table, |s| &mut s.features)?;

        log::debug!(
            "{} Cached field templates for {} prefab schema(s)",
            LOG_PREFIX,
            registry.schemas.len()
        );
        Ok(registry)
    }

    fn add_space<F>(
        &mut self,
        space: &Dimension,
        format: WireFormat,
        table: &AccessorTable,
        section: F,
    ) -> RegistryResult<()>
    where
        F: Fn(&mut SchemaTemplates) -> &mut Vec<BindingTemplate>,
    {
        let codec = ValueCodec::new(format);
        for prefab in &space.children {
            let templates = Self::templates_for_prefab(prefab, codec, table)?;
            let schema = self.schemas.entry(prefab.id.clone()).or_default();
            section(schema).extend(templates);
        }
        Ok(())
    }

    fn templates_for_prefab(
        prefab: &Dimension,
        codec: ValueCodec,
        table: &AccessorTable,
    ) -> RegistryResult<Vec<BindingTemplate>> {
        let mut out = Vec::new();
        for component in &prefab.children {
            for member in &component.children {
                let template = table
                    .get(&component.id, &member.id)
                    .ok_or_else(|| RegistryError::UnknownField {
                        component: component.id.clone(),
                        field: member.id.clone(),
                    })?;

                let buffer_size = member.size();
                match codec.fixed_size(template.field_type()) {
                    Err(e) => return Err(RegistryError::codec(member.id.clone(), e)),
                    Ok(Some(size)) if size != buffer_size => {
                        return Err(RegistryError::SizeMismatch {
                            field: member.id.clone(),
                            expected: buffer_size,
                            actual: size,
                        })
                    }
                    Ok(_) => {}
                }

                out.push(BindingTemplate::new(template, buffer_size, member.is_read_only()));
            }
        }
        Ok(out)
    }

    pub fn schema(&self, prefab_schema_id: &str) -> Option<&SchemaTemplates> {
        self.schemas.get(prefab_schema_id)
    }

    pub fn prefab_ids(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// A field accessor bound to one instance
pub struct FieldBinding {
    accessor: Box<dyn FieldAccessor>,
    pub field_id: String,
    pub buffer_size: usize,
    pub read_only: bool,
}

impl FieldBinding {
    pub fn new(
        accessor: impl FieldAccessor + 'static,
        field_id: impl Into<String>,
        buffer_size: usize,
        read_only: bool,
    ) -> Self {
        Self {
            accessor: Box::new(accessor),
            field_id: field_id.into(),
            buffer_size,
            read_only,
        }
    }

    pub fn accessor(&self) -> &dyn FieldAccessor {
        self.accessor.as_ref()
    }
}

impl fmt::Debug for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBinding")
            .field("field_id", &self.field_id)
            .field("buffer_size", &self.buffer_size)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// Bindings of one tracked instance
#[derive(Debug)]
pub struct RuntimeObjectEntry {
    pub runtime_id: RuntimeId,
    pub prefab_schema_id: String,
    pub object_bindings: Vec<FieldBinding>,
    pub action_bindings: Vec<FieldBinding>,
    pub feature_bindings: Vec<FieldBinding>,
}

/// Tracked instances in registration order
#[derive(Debug, Default)]
pub struct RuntimeBindingCache {
    registry: FieldRegistry,
    entries: Vec<RuntimeObjectEntry>,
    index: HashMap<RuntimeId, usize>,
}

impl RuntimeBindingCache {
    pub fn new(registry: FieldRegistry) -> Self {
        Self {
            registry,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    /// Bind the templates of `prefab_schema_id` to an instance.
    ///
    /// Tracking an id that is already tracked replaces its bindings and keeps
    /// its place in the registration order. If any component is missing,
    /// nothing is tracked.
    pub fn track_instance<R>(
        &mut self,
        runtime_id: impl Into<RuntimeId>,
        prefab_schema_id: &str,
        resolver: &R,
    ) -> RegistryResult<()>
    where
        R: ComponentResolver + ?Sized,
    {
        let runtime_id = runtime_id.into();
        let schema = self
            .registry
            .schema(prefab_schema_id)
            .ok_or_else(|| RegistryError::UnknownSchema(prefab_schema_id.to_string()))?;

        let bind = |templates: &[BindingTemplate]| -> RegistryResult<Vec<FieldBinding>> {
            templates
                .iter()
                .map(|t| {
                    let component_id = t.template.component_id();
                    let component =
                        resolver
                            .resolve(component_id)
                            .ok_or_else(|| RegistryError::MissingComponent {
                                runtime_id: runtime_id.to_string(),
                                component: component_id.to_string(),
                            })?;
                    Ok(FieldBinding::new(
                        t.template.bind(component),
                        t.template.field_id(),
                        t.buffer_size,
                        t.read_only,
                    ))
                })
                .collect()
        };

        let entry = RuntimeObjectEntry {
            runtime_id: runtime_id.clone(),
            prefab_schema_id: prefab_schema_id.to_string(),
            object_bindings: bind(&schema.objects)?,
            action_bindings: bind(&schema.actions)?,
            feature_bindings: bind(&schema.features)?,
        };

        match self.index.get(runtime_id.as_str()) {
            Some(&position) => {
                log::debug!("{} Re-tracking {}, replacing its bindings", LOG_PREFIX, runtime_id);
                self.entries[position] = entry;
            }
            None => {
                log::debug!("{} Tracking {} ({})", LOG_PREFIX, runtime_id, prefab_schema_id);
                self.index.insert(runtime_id, self.entries.len());
                self.entries.push(entry);
            }
        }
        Ok(())
    }

    /// Stop tracking an instance
    pub fn untrack_instance(&mut self, runtime_id: &str) -> RegistryResult<RuntimeObjectEntry> {
        let position = self
            .index
            .remove(runtime_id)
            .ok_or_else(|| RegistryError::UnknownInstance(runtime_id.to_string()))?;
        let entry = self.entries.remove(position);
        for later in &self.entries[position..] {
            if let Some(slot) = self.index.get_mut(later.runtime_id.as_str()) {
                *slot -= 1;
            }
        }
        log::debug!("{} Untracked {}", LOG_PREFIX, runtime_id);
        Ok(entry)
    }

    pub fn entry(&self, runtime_id: &str) -> RegistryResult<&RuntimeObjectEntry> {
        self.index
            .get(runtime_id)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| RegistryError::UnknownInstance(runtime_id.to_string()))
    }

    pub fn contains(&self, runtime_id: &str) -> bool {
        self.index.contains_key(runtime_id)
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &RuntimeObjectEntry> {
        self.entries.iter()
    }

    /// Action bindings of every entry, in registration then declaration order
    pub fn action_bindings(&self) -> impl Iterator<Item = &FieldBinding> {
        self.entries.iter().flat_map(|e| e.action_bindings.iter())
    }

    /// Feature bindings of every entry, in registration then declaration order
    pub fn feature_bindings(&self) -> impl Iterator<Item = &FieldBinding> {
        self.entries.iter().flat_map(|e| e.feature_bindings.iter())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::ComponentSet;
    use modl_core::{CodecError, DimensionKind, FieldSpec, FieldType, SpaceBuilder};
    use parking_lot::RwLock;

    #[derive(Default)]
    struct Mover {
        x: f32,
        label: String,
    }

    fn table() -> AccessorTable {
        let mut table = AccessorTable::new();
        table.register_float::<Mover, _, _>("Mover", "Mover|x", |m| m.x, |m, v| m.x = v);
        table.register::<Mover, _, _>(
            "Mover",
            "Mover|label",
            FieldType::Text,
            |m| modl_core::FieldValue::Text(m.label.clone()),
            |m, v| {
                if let modl_core::FieldValue::Text(s) = v {
                    m.label = s;
                }
            },
        );
        table
    }

    fn config_with_action(field: &str) -> GameConfig {
        GameConfig {
            action_space: SpaceBuilder::new("actionSpace")
                .field(FieldSpec::new("player", "Mover", field, DimensionKind::Continuous))
                .build()
                .unwrap(),
            ..GameConfig::empty()
        }
    }

    #[test]
    fn test_from_config_builds_templates() {
        let registry = FieldRegistry::from_config(&config_with_action("Mover|x"), &table()).unwrap();
        let schema = registry.schema("player").unwrap();
        assert_eq!(schema.actions.len(), 1);
        assert_eq!(schema.actions[0].buffer_size, 1);
        assert!(schema.objects.is_empty());
    }

    #[test]
    fn test_from_config_unknown_field() {
        let err = FieldRegistry::from_config(&config_with_action("Mover|y"), &table()).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnknownField {
                component: "Mover".into(),
                field: "Mover|y".into(),
            }
        );
    }

    #[test]
    fn test_from_config_rejects_string_action() {
        let err = FieldRegistry::from_config(&config_with_action("Mover|label"), &table()).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Codec {
                source: CodecError::UnsupportedFieldType { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_untrack_keeps_order_of_remaining_entries() {
        let registry = FieldRegistry::from_config(&config_with_action("Mover|x"), &table()).unwrap();
        let mut cache = RuntimeBindingCache::new(registry);
        let components = ComponentSet::new().with("Mover", Arc::new(RwLock::new(Mover::default())));

        for id in ["a", "b", "c"] {
            cache.track_instance(id, "player", &components).unwrap();
        }
        cache.untrack_instance("a").unwrap();

        let ids: Vec<&str> = cache.entries().map(|e| e.runtime_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(cache.entry("c").unwrap().runtime_id.as_str(), "c");
        assert_eq!(
            cache.untrack_instance("a").unwrap_err(),
            RegistryError::UnknownInstance("a".into())
        );
    }

    #[test]
    fn test_missing_component_tracks_nothing() {
        let registry = FieldRegistry::from_config(&config_with_action("Mover|x"), &table()).unwrap();
        let mut cache = RuntimeBindingCache::new(registry);

        let err = cache.track_instance("a", "player", &ComponentSet::new()).unwrap_err();
        assert!(matches!(err, RegistryError::MissingComponent { .. }));
        assert!(cache.is_empty());

        let err = cache.track_instance("a", "ghost", &ComponentSet::new()).unwrap_err();
        assert_eq!(err, RegistryError::UnknownSchema("ghost".into()));
    }
}
