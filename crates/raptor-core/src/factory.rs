//! Component type → wrapper class registry.
//!
//! Generating a wrapper class reads the component's static definition once.
//! Classes are keyed by [`TypeId`], so the same component type always maps
//! to the same `Rc<ComponentClass>` and two types never share one.

use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::collections::Attributes;
use crate::component::short_type_name;
use crate::definition::ComponentDef;
use crate::{Component, VNode, Vm, VmError};

type Construct = fn(&Attributes) -> Box<dyn Component>;

fn construct<C: Component>(attrs: &Attributes) -> Box<dyn Component> {
    Box::new(C::new(attrs))
}

/// Generated wrapper class for one component type.
pub struct ComponentClass {
    type_id: TypeId,
    vnode_type: &'static str,
    definition: ComponentDef,
    construct: Construct,
}

impl ComponentClass {
    fn of<C: Component>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            vnode_type: short_type_name::<C>(),
            definition: C::definition(),
            construct: construct::<C>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the component type, used in diagnostics.
    pub fn vnode_type(&self) -> &'static str {
        self.vnode_type
    }

    pub fn tag_name(&self) -> &str {
        self.definition.tag_name()
    }

    pub fn definition(&self) -> &ComponentDef {
        &self.definition
    }

    pub(crate) fn construct(&self, attrs: &Attributes) -> Box<dyn Component> {
        (self.construct)(attrs)
    }

    /// Creates a wrapper instance for this class.
    pub fn create(self: &Rc<Self>, attrs: Attributes, children: Vec<VNode>) -> Result<Vm, VmError> {
        Vm::new(Rc::clone(self), attrs, children)
    }
}

impl fmt::Debug for ComponentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentClass")
            .field("vnode_type", &self.vnode_type)
            .field("tag_name", &self.tag_name())
            .finish()
    }
}

/// Append-only map from component type to generated class.
#[derive(Default)]
pub struct Registry {
    classes: RefCell<HashMap<TypeId, Rc<ComponentClass>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create<C: Component>(&self) -> Rc<ComponentClass> {
        let type_id = TypeId::of::<C>();
        if let Some(class) = self.classes.borrow().get(&type_id) {
            return Rc::clone(class);
        }
        // `definition()` is user code; keep the map unborrowed while it runs.
        let class = Rc::new(ComponentClass::of::<C>());
        log::debug!(
            "generated wrapper class {} for {}",
            class.tag_name(),
            class.vnode_type()
        );
        Rc::clone(
            self.classes
                .borrow_mut()
                .entry(type_id)
                .or_insert(class),
        )
    }

    pub fn get<C: Component>(&self) -> Option<Rc<ComponentClass>> {
        self.classes.borrow().get(&TypeId::of::<C>()).cloned()
    }

    /// Forgets the class generated for `C`. Existing instances keep their
    /// class alive; the next lookup generates a fresh one.
    pub fn unregister<C: Component>(&self) -> Option<Rc<ComponentClass>> {
        self.classes.borrow_mut().remove(&TypeId::of::<C>())
    }

    pub fn len(&self) -> usize {
        self.classes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.borrow().is_empty()
    }
}

thread_local! {
    static DEFAULT_REGISTRY: Registry = Registry::new();
}

/// Wrapper class for component type `C`, generated on first use.
pub fn factory<C: Component>() -> Rc<ComponentClass> {
    DEFAULT_REGISTRY.with(Registry::get_or_create::<C>)
}

#[cfg(test)]
#[path = "tests/factory_tests.rs"]
mod tests;
