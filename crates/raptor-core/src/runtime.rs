use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::platform::RuntimeScheduler;
use crate::reconciler::Reconciler;
use crate::VmError;

/// Deferred unit of work executed after the current synchronous turn.
pub type Microtask = Box<dyn FnOnce() -> Result<(), VmError> + 'static>;

struct RuntimeInner {
    scheduler: Arc<dyn RuntimeScheduler>,
    reconciler: Rc<dyn Reconciler>,
    microtasks: RefCell<VecDeque<Microtask>>, // FUTURE(no_std): replace VecDeque with ring buffer.
    flush_requested: Cell<bool>,
    draining: Cell<bool>,
}

impl RuntimeInner {
    fn new(scheduler: Arc<dyn RuntimeScheduler>, reconciler: Rc<dyn Reconciler>) -> Self {
        Self {
            scheduler,
            reconciler,
            microtasks: RefCell::new(VecDeque::new()),
            flush_requested: Cell::new(false),
            draining: Cell::new(false),
        }
    }

    fn queue_microtask(&self, task: Microtask) {
        self.microtasks.borrow_mut().push_back(task);
        // Tasks queued while draining run in the same drain.
        if !self.draining.get() && !self.flush_requested.replace(true) {
            self.scheduler.schedule_flush();
        }
    }

    fn has_pending(&self) -> bool {
        self.microtasks
            .try_borrow()
            .map(|tasks| !tasks.is_empty())
            .unwrap_or(true)
    }

    fn run_microtasks(&self) -> Result<usize, VmError> {
        if self.draining.replace(true) {
            // Reentrant drain from inside a task; the outer drain picks the
            // remaining tasks up.
            return Ok(0);
        }
        let _draining = DrainGuard { flag: &self.draining };
        self.flush_requested.set(false);
        let mut executed = 0;
        loop {
            let task = {
                let mut tasks = self.microtasks.borrow_mut();
                tasks.pop_front()
            };
            let Some(task) = task else {
                break;
            };
            executed += 1;
            if let Err(err) = task() {
                log::error!("microtask failed: {err}");
                if self.has_pending() && !self.flush_requested.replace(true) {
                    self.scheduler.schedule_flush();
                }
                return Err(err);
            }
        }
        Ok(executed)
    }
}

struct DrainGuard<'a> {
    flag: &'a Cell<bool>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

/// Owner of the microtask queue and the reconciler used by every wrapper
/// created while it is the thread's current runtime.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>, // FUTURE(no_std): replace Rc with arena-managed runtime storage.
}

impl Runtime {
    pub fn new(scheduler: Arc<dyn RuntimeScheduler>, reconciler: Rc<dyn Reconciler>) -> Self {
        let runtime = Self {
            inner: Rc::new(RuntimeInner::new(scheduler, reconciler)),
        };

        // Wrappers constructed from here on pick this runtime up.
        let handle = runtime.handle();
        CURRENT_RUNTIME.with(|slot| {
            *slot.borrow_mut() = Some(handle);
        });

        runtime
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn reconciler(&self) -> Rc<dyn Reconciler> {
        Rc::clone(&self.inner.reconciler)
    }

    pub fn has_pending_microtasks(&self) -> bool {
        self.inner.has_pending()
    }

    /// Drains the microtask queue, returning the number of tasks executed.
    ///
    /// Stops at the first failing task and returns its error; tasks queued
    /// behind it stay queued for the next drain.
    pub fn run_microtasks(&self) -> Result<usize, VmError> {
        self.inner.run_microtasks()
    }

    /// Makes this runtime the one new wrappers on this thread attach to.
    pub fn make_current(&self) {
        let handle = self.handle();
        CURRENT_RUNTIME.with(|slot| {
            *slot.borrow_mut() = Some(handle);
        });
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("pending", &self.inner.has_pending())
            .field("flush_requested", &self.inner.flush_requested.get())
            .finish()
    }
}

#[derive(Default)]
pub struct DefaultScheduler;

impl RuntimeScheduler for DefaultScheduler {
    fn schedule_flush(&self) {}
}

#[cfg(test)]
#[derive(Default)]
pub struct TestScheduler {
    flushes: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl TestScheduler {
    pub fn flush_requests(&self) -> usize {
        self.flushes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl RuntimeScheduler for TestScheduler {
    fn schedule_flush(&self) {
        self.flushes
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
pub struct TestRuntime {
    runtime: Runtime,
    scheduler: Arc<TestScheduler>,
    reconciler: crate::dom::DomReconciler,
}

#[cfg(test)]
impl TestRuntime {
    pub fn new() -> Self {
        let scheduler = Arc::new(TestScheduler::default());
        let reconciler = crate::dom::DomReconciler::default();
        let runtime = Runtime::new(scheduler.clone(), Rc::new(reconciler.clone()));
        Self {
            runtime,
            scheduler,
            reconciler,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> &TestScheduler {
        &self.scheduler
    }

    pub fn reconciler(&self) -> &crate::dom::DomReconciler {
        &self.reconciler
    }

    pub fn dom(&self) -> Rc<RefCell<crate::dom::MemoryDom>> {
        self.reconciler.dom()
    }

    /// Drains the microtask queue, panicking on the first failure.
    pub fn flush(&self) -> usize {
        self.runtime.run_microtasks().expect("microtask failed")
    }

    pub fn html(&self, handle: crate::DomHandle) -> String {
        self.dom().borrow().to_html(handle).expect("dom node missing")
    }
}

/// Weak handle to a [`Runtime`]. Operations on a dropped runtime are
/// silently ignored.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Weak<RuntimeInner>,
}

impl RuntimeHandle {
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    pub fn queue_microtask(&self, task: impl FnOnce() -> Result<(), VmError> + 'static) {
        if let Some(inner) = self.inner.upgrade() {
            inner.queue_microtask(Box::new(task));
        } else {
            log::debug!("runtime dropped; discarding microtask");
        }
    }

    pub fn reconciler(&self) -> Option<Rc<dyn Reconciler>> {
        self.inner
            .upgrade()
            .map(|inner| Rc::clone(&inner.reconciler))
    }

    pub fn has_pending_microtasks(&self) -> bool {
        self.inner
            .upgrade()
            .map(|inner| inner.has_pending())
            .unwrap_or(false)
    }

    pub fn run_microtasks(&self) -> Result<usize, VmError> {
        self.inner
            .upgrade()
            .map(|inner| inner.run_microtasks())
            .unwrap_or(Ok(0))
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

thread_local! {
    static CURRENT_RUNTIME: RefCell<Option<RuntimeHandle>> = const { RefCell::new(None) };
}

/// Handle of the runtime most recently created or made current on this
/// thread, if it is still alive.
pub fn current_runtime_handle() -> Option<RuntimeHandle> {
    CURRENT_RUNTIME.with(|slot| {
        slot.borrow()
            .as_ref()
            .filter(|handle| handle.is_alive())
            .cloned()
    })
}

/// Queues `task` on the current runtime.
pub fn queue_microtask(task: impl FnOnce() -> Result<(), VmError> + 'static) -> Result<(), VmError> {
    let handle = current_runtime_handle().ok_or(VmError::NoRuntime)?;
    handle.queue_microtask(task);
    Ok(())
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
