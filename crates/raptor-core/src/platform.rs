//! Platform abstraction traits for the Raptor runtime.
//!
//! The runtime never drains its own microtask queue. It tells the host that
//! work is pending and the host decides when the current synchronous turn
//! has ended.

/// Receives flush requests from the runtime.
///
/// Implementations must be safe to use from multiple threads even though
/// the runtime itself is single threaded, so hosts can forward the request
/// to an event loop living elsewhere.
pub trait RuntimeScheduler: Send + Sync {
    /// Request that the host drain the microtask queue once the current
    /// synchronous turn completes.
    fn schedule_flush(&self);
}
