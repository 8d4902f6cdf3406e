//! Field accessors
//!
//! The host registers one getter/setter pair per (component, field) in an
//! [`AccessorTable`]. Templates are later bound to concrete component
//! instances, producing [`BoundField`]s that the frame codec reads and writes.
//!
//! Components are shared as `Arc<RwLock<dyn Any + Send + Sync>>` so the host
//! keeps its own typed handle while the bridge holds a type-erased one.

use modl_core::{FieldType, FieldValue};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{RegistryError, RegistryResult};

/// Type-erased handle to a live host component
pub type SharedComponent = Arc<RwLock<dyn Any + Send + Sync>>;

type Getter = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<FieldValue> + Send + Sync>;
type Setter = Arc<dyn Fn(&mut (dyn Any + Send + Sync), FieldValue) -> Option<()> + Send + Sync>;

/// Read/write access to one field of one live instance
pub trait FieldAccessor: Send + Sync {
    /// Declared type of the field
    fn field_type(&self) -> &FieldType;

    /// Current value of the field
    fn read(&self) -> RegistryResult<FieldValue>;

    /// Overwrite the field
    fn write(&self, value: FieldValue) -> RegistryResult<()>;
}

/// Getter/setter pair for a field of a component type, not yet bound to an instance
#[derive(Clone)]
pub struct FieldTemplate {
    component_id: String,
    field_id: String,
    field_type: FieldType,
    getter: Getter,
    setter: Setter,
}

impl FieldTemplate {
    /// Create a template for field `field_id` of component type `C`
    pub fn new<C, G, S>(
        component_id: impl Into<String>,
        field_id: impl Into<String>,
        field_type: FieldType,
        get: G,
        set: S,
    ) -> Self
    where
        C: Any + Send + Sync,
        G: Fn(&C) -> FieldValue + Send + Sync + 'static,
        S: Fn(&mut C, FieldValue) + Send + Sync + 'static,
    {
        Self {
            component_id: component_id.into(),
            field_id: field_id.into(),
            field_type,
            getter: Arc::new(move |any: &(dyn Any + Send + Sync)| any.downcast_ref::<C>().map(|c| get(c))),
            setter: Arc::new(move |any: &mut (dyn Any + Send + Sync), value: FieldValue| {
                any.downcast_mut::<C>().map(|c| set(c, value))
            }),
        }
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    /// Bind the template to a component instance
    pub fn bind(self: &Arc<Self>, component: SharedComponent) -> BoundField {
        BoundField {
            template: Arc::clone(self),
            component,
        }
    }
}

impl fmt::Debug for FieldTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldTemplate")
            .field("component_id", &self.component_id)
            .field("field_id", &self.field_id)
            .field("field_type", &self.field_type)
            .finish()
    }
}

/// A template bound to a live component
#[derive(Clone)]
pub struct BoundField {
    template: Arc<FieldTemplate>,
    component: SharedComponent,
}

impl BoundField {
    pub fn template(&self) -> &FieldTemplate {
        &self.template
    }

    /// Whether this binding points at the given component instance
    pub fn is_bound_to(&self, component: &SharedComponent) -> bool {
        Arc::ptr_eq(&self.component, component)
    }

    fn type_mismatch(&self) -> RegistryError {
        RegistryError::ComponentTypeMismatch {
            component: self.template.component_id.clone(),
            field: self.template.field_id.clone(),
        }
    }
}

impl FieldAccessor for BoundField {
    fn field_type(&self) -> &FieldType {
        &self.template.field_type
    }

    fn read(&self) -> RegistryResult<FieldValue> {
        let guard = self.component.read();
        (self.template.getter)(&*guard).ok_or_else(|| self.type_mismatch())
    }

    fn write(&self, value: FieldValue) -> RegistryResult<()> {
        let mut guard = self.component.write();
        (self.template.setter)(&mut *guard, value).ok_or_else(|| self.type_mismatch())
    }
}

impl fmt::Debug for BoundField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundField").field("template", &self.template).finish()
    }
}

/// Every field the host exposes, keyed by (component id, field id)
#[derive(Debug, Default)]
pub struct AccessorTable {
    fields: HashMap<(String, String), Arc<FieldTemplate>>,
}

impl AccessorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prepared template, replacing any previous one for the same key
    pub fn insert(&mut self, template: FieldTemplate) -> &mut Self {
        let key = (template.component_id.clone(), template.field_id.clone());
        self.fields.insert(key, Arc::new(template));
        self
    }

    /// Register a field of component type `C`
    pub fn register<C, G, S>(
        &mut self,
        component_id: &str,
        field_id: &str,
        field_type: FieldType,
        get: G,
        set: S,
    ) -> &mut Self
    where
        C: Any + Send + Sync,
        G: Fn(&C) -> FieldValue + Send + Sync + 'static,
        S: Fn(&mut C, FieldValue) + Send + Sync + 'static,
    {
        self.insert(FieldTemplate::new(component_id, field_id, field_type, get, set))
    }

    /// Register an `f32` field
    pub fn register_float<C, G, S>(&mut self, component_id: &str, field_id: &str, get: G, set: S) -> &mut Self
    where
        C: Any + Send + Sync,
        G: Fn(&C) -> f32 + Send + Sync + 'static,
        S: Fn(&mut C, f32) + Send + Sync + 'static,
    {
        self.register::<C, _, _>(
            component_id,
            field_id,
            FieldType::float(),
            move |c| FieldValue::Float(get(c) as f64),
            move |c, value| {
                if let FieldValue::Float(v) = value {
                    set(c, v as f32);
                }
            },
        )
    }

    /// Register a `bool` field
    pub fn register_bool<C, G, S>(&mut self, component_id: &str, field_id: &str, get: G, set: S) -> &mut Self
    where
        C: Any + Send + Sync,
        G: Fn(&C) -> bool + Send + Sync + 'static,
        S: Fn(&mut C, bool) + Send + Sync + 'static,
    {
        self.register::<C, _, _>(
            component_id,
            field_id,
            FieldType::Bool,
            move |c| FieldValue::Bool(get(c)),
            move |c, value| {
                if let FieldValue::Bool(v) = value {
                    set(c, v);
                }
            },
        )
    }

    /// Look up a template
    pub fn get(&self, component_id: &str, field_id: &str) -> Option<Arc<FieldTemplate>> {
        self.fields
            .get(&(component_id.to_string(), field_id.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Finds the component instance of a given component id on a tracked object
pub trait ComponentResolver {
    fn resolve(&self, component_id: &str) -> Option<SharedComponent>;
}

impl<F> ComponentResolver for F
where
    F: Fn(&str) -> Option<SharedComponent>,
{
    fn resolve(&self, component_id: &str) -> Option<SharedComponent> {
        self(component_id)
    }
}

/// The components attached to one host object
#[derive(Clone, Default)]
pub struct ComponentSet {
    components: HashMap<String, SharedComponent>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a component under its component id
    pub fn with<C: Any + Send + Sync>(mut self, component_id: impl Into<String>, component: Arc<RwLock<C>>) -> Self {
        self.insert(component_id, component);
        self
    }

    pub fn insert<C: Any + Send + Sync>(&mut self, component_id: impl Into<String>, component: Arc<RwLock<C>>) {
        let shared: SharedComponent = component;
        self.components.insert(component_id.into(), shared);
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentResolver for ComponentSet {
    fn resolve(&self, component_id: &str) -> Option<SharedComponent> {
        self.components.get(component_id).cloned()
    }
}
