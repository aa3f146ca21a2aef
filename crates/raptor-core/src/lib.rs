#![doc = r"Reactive component runtime for the Raptor UI framework."]
#![allow(clippy::missing_const_for_thread_local)]

pub mod api;
pub mod collections;
pub mod component;
pub mod context;
pub mod definition;
pub mod dom;
mod error;
pub mod factory;
pub mod platform;
pub mod reactive;
pub mod reconciler;
pub mod runtime;
pub mod value;
mod vm;
pub mod vnode;

pub use api::RenderApi;
pub use collections::Attributes;
pub use component::{Component, RenderResult};
pub use context::{current_context, establish_context, with_context, ContextGuard};
pub use definition::{
    tag_name_for, ComponentBundle, ComponentDef, DefinitionError, PropDefault, UNKNOWN_NAMESPACE,
};
pub use dom::{DomReconciler, MemoryDom};
pub use error::{DomError, LifecycleState, Phase, VmError};
pub use factory::{factory, ComponentClass, Registry};
pub use platform::RuntimeScheduler;
pub use reactive::{Field, Property, Slot};
pub use reconciler::Reconciler;
pub use runtime::{
    current_runtime_handle, queue_microtask, DefaultScheduler, Microtask, Runtime, RuntimeHandle,
};
pub use value::{Children, Value, ValueTypeError};
pub use vm::Vm;
pub use vnode::{DomHandle, Key, VNode, VNodeData};

#[cfg(test)]
pub use runtime::{TestRuntime, TestScheduler};
