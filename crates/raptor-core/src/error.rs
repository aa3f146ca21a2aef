use std::fmt;

use crate::value::ValueTypeError;
use crate::DomHandle;

/// Phase an instance was in when a reentrant write was attempted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Render,
    Update,
}

/// Lifecycle position of a component wrapper.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Constructed,
    Mounted,
    Dismounted,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Constructed => "constructed",
            LifecycleState::Mounted => "mounted",
            LifecycleState::Dismounted => "dismounted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    Missing { handle: DomHandle },
    NotAnElement { handle: DomHandle },
    NotAChild { parent: DomHandle, child: DomHandle },
}

impl fmt::Display for DomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomError::Missing { handle } => write!(f, "dom node {handle} missing"),
            DomError::NotAnElement { handle } => {
                write!(f, "dom node {handle} is not an element")
            }
            DomError::NotAChild { parent, child } => {
                write!(f, "dom node {child} is not a child of {parent}")
            }
        }
    }
}

impl std::error::Error for DomError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    InvariantViolation {
        component: String,
        attribute: Option<String>,
        phase: Phase,
    },
    UnknownProperty {
        component: String,
        name: String,
    },
    ReadOnlyProperty {
        component: String,
        name: String,
    },
    TypeMismatch {
        component: String,
        name: String,
        source: ValueTypeError,
    },
    InvalidTransition {
        component: String,
        state: LifecycleState,
        operation: &'static str,
    },
    NoRuntime,
    Dom(DomError),
}

impl VmError {
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, VmError::InvariantViolation { .. })
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::InvariantViolation {
                component,
                attribute: None,
                phase: Phase::Render,
            } => write!(
                f,
                "Invariant Violation: {component}.render() method has side effects on the state of the component."
            ),
            VmError::InvariantViolation {
                component,
                attribute: Some(attribute),
                phase: Phase::Render,
            } => write!(
                f,
                "Invariant Violation: {component}.render() method has side effects on the state of the component (attribute {attribute})."
            ),
            VmError::InvariantViolation {
                component,
                attribute,
                phase: Phase::Update,
            } => write!(
                f,
                "Invariant Violation: Setting attribute {component}.{} has side effects on the state of the component.",
                attribute.as_deref().unwrap_or("<unknown>")
            ),
            VmError::UnknownProperty { component, name } => {
                write!(f, "{component} has no property named {name}")
            }
            VmError::ReadOnlyProperty { component, name } => {
                write!(f, "property {component}.{name} is computed and cannot be set")
            }
            VmError::TypeMismatch {
                component,
                name,
                source,
            } => write!(f, "cannot assign {component}.{name}: {source}"),
            VmError::InvalidTransition {
                component,
                state,
                operation,
            } => write!(f, "cannot {operation} {component}: instance is {state}"),
            VmError::NoRuntime => f.write_str("no runtime available on this thread"),
            VmError::Dom(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmError::TypeMismatch { source, .. } => Some(source),
            VmError::Dom(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DomError> for VmError {
    fn from(err: DomError) -> Self {
        VmError::Dom(err)
    }
}
