//! Component instance wrapper.
//!
//! A [`Vm`] owns exactly one user component and drives it through
//! `Constructed → Mounted → Dismounted`. Between mount and dismount any
//! number of rehydrations re-render the component: writes to wired fields
//! mark the instance pending and queue a single microtask, so every write of
//! one synchronous turn lands in the same re-render.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::collections::Attributes;
use crate::context::{current_context, establish_context};
use crate::error::{LifecycleState, Phase};
use crate::factory::ComponentClass;
use crate::reactive::{FieldOwner, Property, Wiring};
use crate::reconciler::Reconciler;
use crate::runtime::{current_runtime_handle, RuntimeHandle};
use crate::{Component, DomHandle, RenderApi, VNode, Value, VmError};

/// Raises a flag for the lifetime of the guard and restores the previous
/// value on drop, also while unwinding.
struct FlagGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> FlagGuard<'a> {
    fn raise(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

pub(crate) struct VmInner {
    self_ref: Weak<VmInner>,
    class: Rc<ComponentClass>,
    component: Box<dyn Component>,
    api: RenderApi,
    attrs: RefCell<Attributes>,
    runtime: RuntimeHandle,
    owner: Option<Weak<VmInner>>,
    state: Cell<LifecycleState>,
    is_rendering: Cell<bool>,
    is_updating: Cell<bool>,
    rehydration_pending: Cell<bool>,
    has_body_slot: bool,
    offspring: RefCell<Option<VNode>>,
    elm: Cell<Option<DomHandle>>,
    rehydrations: Cell<u64>,
}

impl VmInner {
    fn describe(&self) -> String {
        format!("<{}>", self.class.tag_name())
    }

    fn violation(&self, attribute: Option<&str>, phase: Phase) -> VmError {
        VmError::InvariantViolation {
            component: self.describe(),
            attribute: attribute.map(str::to_owned),
            phase,
        }
    }

    fn schedule_rehydration(&self) {
        if self.state.get() != LifecycleState::Mounted {
            // Not on screen yet; mount renders the current state anyway.
            return;
        }
        if self.rehydration_pending.replace(true) {
            return;
        }
        log::trace!("scheduling rehydration of {}", self.describe());
        let target = self.self_ref.clone();
        self.runtime.queue_microtask(move || match target.upgrade() {
            Some(inner) => Vm { inner }.rehydrate(),
            None => Ok(()),
        });
    }
}

impl FieldOwner for VmInner {
    fn guard_write(&self, field: &'static str) -> Result<(), VmError> {
        if self.is_rendering.get() {
            log::warn!("rejected write to {}.{field} during render", self.describe());
            return Err(self.violation(Some(field), Phase::Render));
        }
        Ok(())
    }

    fn field_changed(&self, _field: &'static str) {
        self.schedule_rehydration();
    }
}

/// Shared handle to a component instance wrapper.
#[derive(Clone)]
pub struct Vm {
    inner: Rc<VmInner>,
}

impl Vm {
    /// Builds the wrapper and its component.
    ///
    /// The component is constructed once from the attributes merged with
    /// public-prop defaults and `children`; its configurable fields are wired
    /// and every attribute is then applied through [`Vm::set`]. Attributes
    /// naming no assignable property are skipped, the constructor already
    /// received them.
    pub(crate) fn new(
        class: Rc<ComponentClass>,
        attrs: Attributes,
        children: Vec<VNode>,
    ) -> Result<Self, VmError> {
        let runtime = current_runtime_handle().ok_or(VmError::NoRuntime)?;
        let owner = current_context().map(|vm| Vm::downgrade(&vm));
        let attrs = class.definition().resolve_attributes(attrs, children);
        let component = class.construct(&attrs);
        let has_body_slot = component
            .properties()
            .iter()
            .any(|property| property.name() == "body");
        let initial = attrs.clone();

        let inner = Rc::new_cyclic(|self_ref| VmInner {
            self_ref: self_ref.clone(),
            class,
            component,
            api: RenderApi::default(),
            attrs: RefCell::new(attrs),
            runtime,
            owner,
            state: Cell::new(LifecycleState::Constructed),
            is_rendering: Cell::new(false),
            is_updating: Cell::new(false),
            rehydration_pending: Cell::new(false),
            has_body_slot,
            offspring: RefCell::new(None),
            elm: Cell::new(None),
            rehydrations: Cell::new(0),
        });
        let vm = Self { inner };

        let wired = vm.wire();
        log::debug!("constructed {vm} ({wired} reactive fields)");

        vm.apply_attributes(&initial)?;
        vm.invoke_updated()?;
        Ok(vm)
    }

    pub(crate) fn downgrade(vm: &Vm) -> Weak<VmInner> {
        Rc::downgrade(&vm.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<VmInner>) -> Option<Vm> {
        weak.upgrade().map(|inner| Vm { inner })
    }

    fn wire(&self) -> usize {
        let owner: Weak<dyn FieldOwner> = Vm::downgrade(self);
        self.inner
            .component
            .properties()
            .into_iter()
            .filter(|property| match property {
                Property::Field { name, slot } => slot.wire(Wiring::new(*name, owner.clone())),
                Property::Computed { .. } => false,
            })
            .count()
    }

    fn apply_attributes(&self, attrs: &Attributes) -> Result<(), VmError> {
        for (name, value) in attrs {
            match self.set(name, value.clone()) {
                Err(VmError::UnknownProperty { .. }) | Err(VmError::ReadOnlyProperty { .. }) => {
                    log::trace!("{self}: attribute {name} has no assignable property");
                }
                result => result?,
            }
        }
        Ok(())
    }

    /// Writes the property `name`.
    ///
    /// Rejected with [`VmError::InvariantViolation`] while the instance is
    /// rendering or already inside an attribute write or `updated`.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<(), VmError> {
        let inner = &self.inner;
        if inner.is_rendering.get() {
            log::warn!("rejected attribute {self}.{name} during render");
            return Err(inner.violation(Some(name), Phase::Render));
        }
        if inner.is_updating.get() {
            log::warn!("rejected attribute {self}.{name} during update");
            return Err(inner.violation(Some(name), Phase::Update));
        }
        let _updating = FlagGuard::raise(&inner.is_updating);

        let value = value.into();
        let properties = inner.component.properties();
        let property = properties
            .iter()
            .find(|property| property.name() == name)
            .ok_or_else(|| VmError::UnknownProperty {
                component: inner.describe(),
                name: name.to_string(),
            })?;
        match property {
            Property::Field { slot, .. } => {
                slot.assign(value)
                    .map_err(|source| VmError::TypeMismatch {
                        component: inner.describe(),
                        name: name.to_string(),
                        source,
                    })
            }
            Property::Computed { .. } => Err(VmError::ReadOnlyProperty {
                component: inner.describe(),
                name: name.to_string(),
            }),
        }
    }

    /// Reads the property `name`.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner
            .component
            .properties()
            .iter()
            .find(|property| property.name() == name)
            .map(Property::value)
    }

    /// Forwards the attributes a newer render of the parent passed. Props
    /// the parent left out keep their current value; changes coalesce into
    /// one rehydration.
    pub fn update_attributes(&self, attrs: &Attributes) -> Result<(), VmError> {
        self.apply_attributes(attrs)?;
        let mut current = self.inner.attrs.borrow_mut();
        for (name, value) in attrs {
            current.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    /// Renders the component for the first time and commits its tree.
    pub fn mount(&self) -> Result<(), VmError> {
        self.expect_state(LifecycleState::Constructed, "mount")?;
        let reconciler = self.reconciler()?;
        let tree = self.render()?;
        let committed = reconciler.patch(None, tree)?;
        let elm = reconciler.root_handle(&committed);

        let inner = &self.inner;
        *inner.offspring.borrow_mut() = Some(committed);
        inner.elm.set(elm);
        inner.state.set(LifecycleState::Mounted);
        log::debug!("mounted {self} at {elm:?}");

        if let Some(elm) = elm {
            let _context = establish_context(Some(self));
            inner.component.attach(elm)?;
        }
        Ok(())
    }

    /// Marks the instance for re-rendering after the current synchronous
    /// turn. Repeated calls before the rehydration runs are no-ops.
    pub fn schedule_rehydration(&self) {
        self.inner.schedule_rehydration();
    }

    /// Runs a pending rehydration. Does nothing unless the instance is
    /// mounted and a rehydration is pending.
    ///
    /// On failure the previously committed tree stays in place.
    pub fn rehydrate(&self) -> Result<(), VmError> {
        let inner = &self.inner;
        if inner.state.get() != LifecycleState::Mounted || !inner.rehydration_pending.get() {
            log::trace!("skipping rehydration of {self} ({})", inner.state.get());
            return Ok(());
        }
        inner.rehydration_pending.set(false);

        self.invoke_updated()?;
        let reconciler = self.reconciler()?;
        let tree = self.render()?;

        let previous = self.dom_handle();
        let old = inner.offspring.borrow_mut().take();
        let committed = match reconciler.patch(old.as_ref(), tree) {
            Ok(committed) => committed,
            Err(err) => {
                *inner.offspring.borrow_mut() = old;
                return Err(err);
            }
        };
        let next = reconciler.root_handle(&committed);
        *inner.offspring.borrow_mut() = Some(committed);
        inner.elm.set(next);
        inner.rehydrations.set(inner.rehydrations.get() + 1);

        if let (Some(previous), Some(next)) = (previous, next) {
            if previous != next {
                log::debug!("{self}: root replaced {previous} -> {next}");
                reconciler.replace_root(previous, next)?;
            }
        }
        Ok(())
    }

    /// Tears the instance down. Terminal: later rehydrations are no-ops.
    pub fn dismount(&self) -> Result<(), VmError> {
        self.expect_state(LifecycleState::Mounted, "dismount")?;
        let inner = &self.inner;
        let elm = self.dom_handle();
        inner.state.set(LifecycleState::Dismounted);

        let offspring = inner.offspring.borrow_mut().take();
        if let Some(tree) = &offspring {
            match inner.runtime.reconciler() {
                Some(reconciler) => reconciler.dismount(tree),
                None => log::warn!("{self}: runtime dropped before dismount"),
            }
        }
        log::debug!("dismounted {self}");

        if let Some(elm) = elm {
            let _context = establish_context(Some(self));
            inner.component.detach(elm)?;
        }
        Ok(())
    }

    fn render(&self) -> Result<VNode, VmError> {
        let inner = &self.inner;
        let _context = establish_context(Some(self));
        let _rendering = FlagGuard::raise(&inner.is_rendering);
        let tree = inner.component.render(&inner.api)?;
        Ok(tree.unwrap_or_else(|| VNode::comment(inner.class.tag_name())))
    }

    fn invoke_updated(&self) -> Result<(), VmError> {
        let _context = establish_context(Some(self));
        let _updating = FlagGuard::raise(&self.inner.is_updating);
        self.inner.component.updated()
    }

    fn reconciler(&self) -> Result<Rc<dyn Reconciler>, VmError> {
        self.inner.runtime.reconciler().ok_or(VmError::NoRuntime)
    }

    fn expect_state(&self, expected: LifecycleState, operation: &'static str) -> Result<(), VmError> {
        let state = self.inner.state.get();
        if state != expected {
            return Err(VmError::InvalidTransition {
                component: self.inner.describe(),
                state,
                operation,
            });
        }
        Ok(())
    }

    pub fn tag_name(&self) -> &str {
        self.inner.class.tag_name()
    }

    pub fn class(&self) -> &Rc<ComponentClass> {
        &self.inner.class
    }

    pub fn is_same_class(&self, other: &Vm) -> bool {
        Rc::ptr_eq(&self.inner.class, &other.inner.class)
    }

    pub fn ptr_eq(&self, other: &Vm) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.state.get()
    }

    pub fn is_mounted(&self) -> bool {
        self.state() == LifecycleState::Mounted
    }

    pub fn is_rendering(&self) -> bool {
        self.inner.is_rendering.get()
    }

    pub fn is_updating(&self) -> bool {
        self.inner.is_updating.get()
    }

    pub fn is_rehydration_pending(&self) -> bool {
        self.inner.rehydration_pending.get()
    }

    /// Whether the component exposes a `body` property.
    pub fn has_body_slot(&self) -> bool {
        self.inner.has_body_slot
    }

    /// Number of completed rehydrations.
    pub fn rehydration_count(&self) -> u64 {
        self.inner.rehydrations.get()
    }

    /// Root DOM node of the committed tree. Resolved through nested
    /// component roots, which may have been replaced by their own
    /// rehydrations.
    pub fn dom_handle(&self) -> Option<DomHandle> {
        match self.inner.offspring.try_borrow() {
            Ok(offspring) => offspring
                .as_ref()
                .and_then(VNode::dom_handle)
                .or_else(|| self.inner.elm.get()),
            Err(_) => self.inner.elm.get(),
        }
    }

    pub fn with_offspring<R>(&self, f: impl FnOnce(Option<&VNode>) -> R) -> R {
        f(self.inner.offspring.borrow().as_ref())
    }

    /// The instance whose render created this one.
    pub fn owner(&self) -> Option<Vm> {
        self.inner.owner.as_ref().and_then(Vm::upgrade)
    }

    /// Resolved attributes, including defaults and `children`.
    pub fn attributes(&self) -> Attributes {
        self.inner.attrs.borrow().clone()
    }

    /// Runs `f` against the component if it is a `C`.
    pub fn with_component<C: Component, R>(&self, f: impl FnOnce(&C) -> R) -> Option<R> {
        let component: &dyn Component = self.inner.component.as_ref();
        component.as_any().downcast_ref::<C>().map(f)
    }
}

impl fmt::Display for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.tag_name())
    }
}

impl fmt::Debug for Vm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vm")
            .field("tag_name", &self.tag_name())
            .field("state", &self.state())
            .field("pending", &self.is_rehydration_pending())
            .field("elm", &self.inner.elm.get())
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/vm_tests.rs"]
mod tests;
