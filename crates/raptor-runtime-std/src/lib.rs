//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `raptor-core`. Applications construct a
//! [`StdRuntime`], mount their root component into its container and drain
//! microtasks whenever [`StdRuntime::take_flush_request`] reports pending
//! work.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use raptor_core::{
    DomHandle, DomReconciler, MemoryDom, Runtime, RuntimeHandle, RuntimeScheduler, Vm, VmError,
};

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Scheduler that records flush requests with atomics and optionally wakes
/// the host's event loop.
pub struct StdScheduler {
    flush_requested: AtomicBool,
    flush_waker: RwLock<Option<Waker>>,
}

impl StdScheduler {
    pub fn new() -> Self {
        Self {
            flush_requested: AtomicBool::new(false),
            flush_waker: RwLock::new(None),
        }
    }

    /// Returns whether a flush has been requested since the last call.
    pub fn take_flush_request(&self) -> bool {
        self.flush_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker that will be invoked whenever a flush is requested.
    pub fn set_flush_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self
            .flush_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    /// Clears any registered flush waker.
    pub fn clear_flush_waker(&self) {
        *self
            .flush_waker
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .flush_waker
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "flush_requested",
                &self.flush_requested.load(Ordering::SeqCst),
            )
            .finish()
    }
}

impl RuntimeScheduler for StdScheduler {
    fn schedule_flush(&self) {
        self.flush_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Convenience container bundling the standard scheduler, an in-memory DOM
/// with its reconciler, and a root container element.
#[derive(Clone)]
pub struct StdRuntime {
    scheduler: Arc<StdScheduler>,
    reconciler: DomReconciler,
    runtime: Runtime,
    container: DomHandle,
}

impl StdRuntime {
    /// Creates a runtime whose container is a `<body>` element.
    pub fn new() -> Self {
        Self::with_container_tag("body")
    }

    /// Creates a runtime whose container element uses `tag`. The runtime
    /// becomes the current one on this thread.
    pub fn with_container_tag(tag: &str) -> Self {
        let scheduler = Arc::new(StdScheduler::default());
        let dom = Rc::new(RefCell::new(MemoryDom::new()));
        let container = dom.borrow_mut().create_element(tag);
        let reconciler = DomReconciler::new(dom);
        let runtime = Runtime::new(scheduler.clone(), Rc::new(reconciler.clone()));
        log::debug!("std runtime ready with <{tag}> container {container}");
        Self {
            scheduler,
            reconciler,
            runtime,
            container,
        }
    }

    /// Returns the [`raptor_core::Runtime`] configured with the standard
    /// scheduler.
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    /// Returns a handle to the runtime.
    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    /// Returns the scheduler implementation.
    pub fn scheduler(&self) -> Arc<StdScheduler> {
        Arc::clone(&self.scheduler)
    }

    pub fn reconciler(&self) -> &DomReconciler {
        &self.reconciler
    }

    pub fn dom(&self) -> Rc<RefCell<MemoryDom>> {
        self.reconciler.dom()
    }

    pub fn container(&self) -> DomHandle {
        self.container
    }

    /// Returns whether a flush was requested since the last poll.
    pub fn take_flush_request(&self) -> bool {
        self.scheduler.take_flush_request()
    }

    /// Registers a waker to be called when the runtime requests a flush.
    pub fn set_flush_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_flush_waker(waker);
    }

    /// Clears any previously registered flush waker.
    pub fn clear_flush_waker(&self) {
        self.scheduler.clear_flush_waker();
    }

    /// Drains pending microtasks, returning how many ran.
    pub fn run_microtasks(&self) -> Result<usize, VmError> {
        self.runtime.run_microtasks()
    }

    /// Mounts `vm` as a child of the container.
    pub fn mount(&self, vm: &Vm) -> Result<(), VmError> {
        self.reconciler.mount_into(self.container, vm)
    }

    /// Dismounts `vm` and removes it from the container.
    pub fn unmount(&self, vm: &Vm) -> Result<(), VmError> {
        self.reconciler.unmount_from(self.container, vm)
    }

    /// Serializes the container and everything mounted in it.
    pub fn html(&self) -> Result<String, VmError> {
        let dom = self.dom();
        let html = dom.borrow().to_html(self.container)?;
        Ok(html)
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("runtime", &self.runtime)
            .field("container", &self.container)
            .finish()
    }
}

impl Default for StdRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "tests/std_runtime_tests.rs"]
mod tests;
