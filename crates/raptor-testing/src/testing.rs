use std::cell::RefCell;
use std::rc::Rc;

use raptor_core::{factory, Attributes, Component, MemoryDom, Value, Vm, VmError};
use raptor_runtime_std::StdRuntime;

/// Upper bound on drains per pump; a component that keeps rescheduling
/// itself from `updated` never settles.
const MAX_PUMPS: usize = 100;

/// Headless harness for exercising components in tests.
///
/// `ComponentTestRule` owns a standard runtime with an in-memory DOM, mounts
/// one root component into its container and drives microtasks until the
/// tree settles, so assertions always observe the state after every pending
/// rehydration has run.
pub struct ComponentTestRule {
    runtime: StdRuntime,
    root: Option<Vm>,
}

impl ComponentTestRule {
    /// Create a new test rule; its runtime becomes current on this thread.
    pub fn new() -> Self {
        Self {
            runtime: StdRuntime::new(),
            root: None,
        }
    }

    /// Construct `C` with `attrs`, mount it as the root and pump until idle.
    /// A previously installed root is unmounted first.
    pub fn set_content<C: Component>(&mut self, attrs: Attributes) -> Result<Vm, VmError> {
        self.clear_content()?;
        self.runtime.runtime().make_current();
        let vm = factory::<C>().create(attrs, Vec::new())?;
        self.runtime.mount(&vm)?;
        self.root = Some(vm.clone());
        self.pump_until_idle()?;
        Ok(vm)
    }

    /// Unmount the current root, if any.
    pub fn clear_content(&mut self) -> Result<(), VmError> {
        match self.root.take() {
            Some(root) => self.runtime.unmount(&root),
            None => Ok(()),
        }
    }

    /// Write an attribute of the root component and pump until idle.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), VmError> {
        if let Some(root) = &self.root {
            root.set(name, value)?;
        }
        self.pump_until_idle().map(|_| ())
    }

    /// Drain microtasks until none remain. Returns the number of tasks run.
    pub fn pump_until_idle(&mut self) -> Result<usize, VmError> {
        let mut executed = 0;
        for _ in 0..MAX_PUMPS {
            self.runtime.take_flush_request();
            if !self.runtime.runtime().has_pending_microtasks() {
                return Ok(executed);
            }
            executed += self.runtime.run_microtasks()?;
        }
        panic!("pump_until_idle did not settle after {MAX_PUMPS} drains");
    }

    /// Returns whether a root component has been installed.
    pub fn has_content(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<&Vm> {
        self.root.as_ref()
    }

    /// Serialized container, including every mounted component.
    pub fn html(&self) -> Result<String, VmError> {
        self.runtime.html()
    }

    /// Serialized root component tree without the container.
    pub fn root_html(&self) -> Option<String> {
        let handle = self.root.as_ref()?.dom_handle()?;
        let dom = self.runtime.dom();
        let html = dom.borrow().to_html(handle).ok();
        html
    }

    pub fn dom(&self) -> Rc<RefCell<MemoryDom>> {
        self.runtime.dom()
    }

    /// The runtime driving this rule.
    pub fn runtime(&self) -> &StdRuntime {
        &self.runtime
    }
}

impl Default for ComponentTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `ComponentTestRule`.
pub fn run_test_component<R>(f: impl FnOnce(&mut ComponentTestRule) -> R) -> R {
    let mut rule = ComponentTestRule::new();
    let result = f(&mut rule);
    if let Err(err) = rule.clear_content() {
        log::warn!("failed to unmount test content: {err}");
    }
    result
}

#[cfg(test)]
#[path = "tests/testing_tests.rs"]
mod tests;
