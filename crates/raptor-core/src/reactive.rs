//! Reactive component fields.
//!
//! A component keeps its mutable state in [`Field`]s and lists them through
//! [`Component::properties`](crate::Component::properties). When the wrapper
//! is constructed it wires every configurable field exactly once: from then
//! on a write that changes the value schedules a rehydration of the owner.
//! Sealed fields and computed properties are never wired and never trigger
//! a re-render; they are treated as frozen or derived state.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::value::ValueTypeError;
use crate::{Value, VmError};

/// Callbacks a wired field uses to talk to its owning instance.
pub(crate) trait FieldOwner {
    /// Rejects writes the lifecycle forbids (e.g. while rendering).
    fn guard_write(&self, field: &'static str) -> Result<(), VmError>;
    fn field_changed(&self, field: &'static str);
}

/// Reactive value cell owned by a user component.
pub struct Field<T> {
    value: RefCell<T>,
    configurable: Cell<bool>,
    wiring: RefCell<Option<Wiring>>,
}

impl<T> Field<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            configurable: Cell::new(true),
            wiring: RefCell::new(None),
        }
    }

    /// A field that is never intercepted: writes update the value without
    /// scheduling a rehydration.
    pub fn sealed(value: T) -> Self {
        Self {
            value: RefCell::new(value),
            configurable: Cell::new(false),
            wiring: RefCell::new(None),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    pub fn borrow(&self) -> Ref<'_, T> {
        self.value.borrow()
    }

    pub fn is_wired(&self) -> bool {
        self.wiring.borrow().is_some()
    }

    fn owner(&self) -> Option<(&'static str, Rc<dyn FieldOwner>)> {
        let wiring = self.wiring.borrow();
        let wiring = wiring.as_ref()?;
        wiring.owner.upgrade().map(|owner| (wiring.name, owner))
    }
}

impl<T: Clone> Field<T> {
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }
}

impl<T: PartialEq> Field<T> {
    /// Writes `value`. A wired field rejects the write while its owner is
    /// rendering and schedules a rehydration when the value changed.
    pub fn set(&self, value: T) -> Result<(), VmError> {
        let owner = self.owner();
        if let Some((name, owner)) = &owner {
            owner.guard_write(*name)?;
        }
        self.store(value, owner);
        Ok(())
    }

    fn store(&self, value: T, owner: Option<(&'static str, Rc<dyn FieldOwner>)>) {
        {
            let mut current = self.value.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        if let Some((name, owner)) = owner {
            owner.field_changed(name);
        }
    }
}

impl<T: Default> Default for Field<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("value", &*self.value.borrow())
            .field("configurable", &self.configurable.get())
            .field("wired", &self.is_wired())
            .finish()
    }
}

/// Installation of a field's owner hook, handed out by the wrapper during
/// construction.
pub struct Wiring {
    name: &'static str,
    owner: Weak<dyn FieldOwner>,
}

impl Wiring {
    pub(crate) fn new(name: &'static str, owner: Weak<dyn FieldOwner>) -> Self {
        Self { name, owner }
    }
}

mod sealed {
    pub trait Sealed {}
}

impl<T> sealed::Sealed for Field<T> {}

/// Type-erased view of a [`Field`] used by the wrapper to wire and assign
/// properties by name.
pub trait Slot: sealed::Sealed {
    fn value(&self) -> Value;

    /// Converts and stores `value` without consulting the owner's write
    /// guard; the caller has already validated the lifecycle.
    fn assign(&self, value: Value) -> Result<(), ValueTypeError>;

    fn is_configurable(&self) -> bool;

    /// Installs the owner hook and makes the slot non-configurable.
    /// Returns `false` when the slot was not configurable.
    fn wire(&self, wiring: Wiring) -> bool;
}

impl<T> Slot for Field<T>
where
    T: Clone + PartialEq + Into<Value> + TryFrom<Value> + 'static,
{
    fn value(&self) -> Value {
        self.get().into()
    }

    fn assign(&self, value: Value) -> Result<(), ValueTypeError> {
        let found = value.kind();
        let value = T::try_from(value).map_err(|_| ValueTypeError {
            expected: std::any::type_name::<T>(),
            found,
        })?;
        let owner = self.owner();
        self.store(value, owner);
        Ok(())
    }

    fn is_configurable(&self) -> bool {
        self.configurable.get()
    }

    fn wire(&self, wiring: Wiring) -> bool {
        if !self.configurable.replace(false) {
            return false;
        }
        *self.wiring.borrow_mut() = Some(wiring);
        true
    }
}

/// A named property exposed by a component.
pub enum Property<'a> {
    /// Plain state backed by a [`Field`].
    Field {
        name: &'static str,
        slot: &'a dyn Slot,
    },
    /// Derived, getter-only state. Never wired and cannot be assigned.
    Computed { name: &'static str, value: Value },
}

impl<'a> Property<'a> {
    pub fn field(name: &'static str, slot: &'a dyn Slot) -> Self {
        Property::Field { name, slot }
    }

    pub fn computed(name: &'static str, value: impl Into<Value>) -> Self {
        Property::Computed {
            name,
            value: value.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Property::Field { name, .. } | Property::Computed { name, .. } => name,
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Property::Field { slot, .. } => slot.value(),
            Property::Computed { value, .. } => value.clone(),
        }
    }
}
