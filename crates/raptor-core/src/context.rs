//! The "currently rendering component" slot.
//!
//! Every user callback runs with its own wrapper established as the current
//! context so that nested constructions and helpers can resolve which
//! instance is active without threading it through parameters. The slot is
//! only mutated through [`ContextGuard`], which restores the previous value
//! on drop, including while unwinding from a panicking callback.

use std::cell::RefCell;
use std::rc::Weak;

use crate::vm::{Vm, VmInner};

thread_local! {
    static CURRENT_CONTEXT: RefCell<Option<Weak<VmInner>>> = const { RefCell::new(None) };
}

/// Guard that restores the previously established context on drop.
#[must_use = "ContextGuard restores the previous context on drop"]
pub struct ContextGuard {
    previous: Option<Weak<VmInner>>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_CONTEXT.with(|slot| {
            *slot.borrow_mut() = previous;
        });
    }
}

/// Makes `vm` the current context until the returned guard is dropped.
pub fn establish_context(vm: Option<&Vm>) -> ContextGuard {
    let next = vm.map(Vm::downgrade);
    let previous = CURRENT_CONTEXT.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), next));
    ContextGuard { previous }
}

/// The instance whose callback is currently executing, if any.
pub fn current_context() -> Option<Vm> {
    CURRENT_CONTEXT.with(|slot| slot.borrow().as_ref().and_then(Vm::upgrade))
}

/// Runs `f` with `vm` established as the current context.
pub fn with_context<R>(vm: &Vm, f: impl FnOnce() -> R) -> R {
    let _guard = establish_context(Some(vm));
    f()
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
