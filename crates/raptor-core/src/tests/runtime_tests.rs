use super::*;
use crate::dom::DomReconciler;
use std::cell::RefCell;

thread_local! {
    static ORDER: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

fn record(id: u32) {
    ORDER.with(|order| order.borrow_mut().push(id));
}

fn take_order() -> Vec<u32> {
    ORDER.with(|order| std::mem::take(&mut *order.borrow_mut()))
}

fn test_runtime() -> (Runtime, Arc<TestScheduler>) {
    let scheduler = Arc::new(TestScheduler::default());
    let runtime = Runtime::new(scheduler.clone(), Rc::new(DomReconciler::default()));
    (runtime, scheduler)
}

#[test]
fn microtasks_run_in_fifo_order() {
    take_order();
    let (runtime, _scheduler) = test_runtime();
    let handle = runtime.handle();
    for id in 0..3 {
        handle.queue_microtask(move || {
            record(id);
            Ok(())
        });
    }

    assert!(runtime.has_pending_microtasks());
    assert_eq!(runtime.run_microtasks(), Ok(3));
    assert_eq!(take_order(), vec![0, 1, 2]);
    assert!(!runtime.has_pending_microtasks());
}

#[test]
fn one_flush_request_per_turn() {
    let (runtime, scheduler) = test_runtime();
    let handle = runtime.handle();
    handle.queue_microtask(|| Ok(()));
    handle.queue_microtask(|| Ok(()));
    assert_eq!(scheduler.flush_requests(), 1);

    runtime.run_microtasks().expect("drain");
    handle.queue_microtask(|| Ok(()));
    assert_eq!(scheduler.flush_requests(), 2);
}

#[test]
fn tasks_queued_while_draining_run_in_the_same_drain() {
    take_order();
    let (runtime, scheduler) = test_runtime();
    let handle = runtime.handle();
    let nested = handle.clone();
    handle.queue_microtask(move || {
        record(1);
        nested.queue_microtask(|| {
            record(2);
            Ok(())
        });
        Ok(())
    });

    assert_eq!(runtime.run_microtasks(), Ok(2));
    assert_eq!(take_order(), vec![1, 2]);
    assert_eq!(scheduler.flush_requests(), 1);
}

#[test]
fn reentrant_drain_is_a_no_op() {
    let (runtime, _scheduler) = test_runtime();
    let handle = runtime.handle();
    let inner = handle.clone();
    handle.queue_microtask(move || {
        assert_eq!(inner.run_microtasks(), Ok(0));
        Ok(())
    });
    assert_eq!(runtime.run_microtasks(), Ok(1));
}

#[test]
fn failing_task_stops_the_drain_and_keeps_the_rest() {
    take_order();
    let (runtime, scheduler) = test_runtime();
    let handle = runtime.handle();
    handle.queue_microtask(|| Err(VmError::NoRuntime));
    handle.queue_microtask(|| {
        record(7);
        Ok(())
    });

    assert_eq!(runtime.run_microtasks(), Err(VmError::NoRuntime));
    assert!(take_order().is_empty());
    assert!(runtime.has_pending_microtasks());
    assert_eq!(scheduler.flush_requests(), 2, "remaining work is rescheduled");

    assert_eq!(runtime.run_microtasks(), Ok(1));
    assert_eq!(take_order(), vec![7]);
}

#[test]
fn dropped_runtime_discards_work() {
    let (runtime, _scheduler) = test_runtime();
    let handle = runtime.handle();
    drop(runtime);

    assert!(!handle.is_alive());
    assert!(handle.reconciler().is_none());
    handle.queue_microtask(|| panic!("must not run"));
    assert_eq!(handle.run_microtasks(), Ok(0));
    assert!(current_runtime_handle().is_none());
    assert_eq!(queue_microtask(|| Ok(())), Err(VmError::NoRuntime));
}

#[test]
fn newest_runtime_becomes_current() {
    let (first, _) = test_runtime();
    let (second, _) = test_runtime();
    let current = current_runtime_handle().expect("current runtime");
    queue_microtask(|| Ok(())).expect("queue on current");
    assert!(second.has_pending_microtasks());
    assert!(!first.has_pending_microtasks());

    first.make_current();
    queue_microtask(|| Ok(())).expect("queue on first");
    assert!(first.has_pending_microtasks());
    assert!(current.is_alive());
}
