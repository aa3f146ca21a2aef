use std::any::Any;

use crate::collections::Attributes;
use crate::definition::{ComponentDef, UNKNOWN_NAMESPACE};
use crate::reactive::Property;
use crate::{DomHandle, RenderApi, VNode, VmError};

/// Result of a component's render callback. `None` commits a placeholder
/// comment so the instance always owns a DOM node.
pub type RenderResult = Result<Option<VNode>, VmError>;

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An application-defined component.
///
/// The wrapper owns exactly one instance, built once through [`Component::new`].
/// Every callback runs synchronously with the wrapper established as the
/// current context. Mutable state lives in [`Field`](crate::Field)s listed
/// by [`Component::properties`]; the listing must be stable for the lifetime
/// of the instance.
pub trait Component: AsAny + 'static {
    /// Builds the instance from the resolved attributes, which include a
    /// `children` entry with the child references.
    fn new(attrs: &Attributes) -> Self
    where
        Self: Sized;

    fn definition() -> ComponentDef
    where
        Self: Sized,
    {
        ComponentDef::for_class(Some(UNKNOWN_NAMESPACE), short_type_name::<Self>())
    }

    /// Own properties of the instance, in declaration order.
    fn properties(&self) -> Vec<Property<'_>> {
        Vec::new()
    }

    fn render(&self, _api: &RenderApi) -> RenderResult {
        Ok(None)
    }

    fn updated(&self) -> Result<(), VmError> {
        Ok(())
    }

    fn attach(&self, _elm: DomHandle) -> Result<(), VmError> {
        Ok(())
    }

    fn detach(&self, _elm: DomHandle) -> Result<(), VmError> {
        Ok(())
    }
}

/// Last path segment of a type name, without generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
