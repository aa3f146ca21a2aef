//! Contracts of the diff-and-commit collaborator.
//!
//! The core decides *when* trees are patched, dismounted and swapped in the
//! DOM; implementations of [`Reconciler`] decide *how*.

use crate::{DomHandle, VNode, VmError};

pub trait Reconciler {
    /// Diffs `new` against `old` (absent on first render), commits the DOM
    /// mutations and returns the committed tree, whose root carries a
    /// resolvable DOM handle.
    ///
    /// Implementations must not retain `old` or `new` beyond the call. When
    /// the roots cannot be patched in place the new root is built detached
    /// and the old root is left where it is; the caller swaps them with
    /// [`Reconciler::replace_root`].
    fn patch(&self, old: Option<&VNode>, new: VNode) -> Result<VNode, VmError>;

    /// Releases everything tied to a committed tree, dismounting the
    /// component instances it contains.
    fn dismount(&self, tree: &VNode);

    fn root_handle(&self, tree: &VNode) -> Option<DomHandle> {
        crate::vnode::root_handle(tree)
    }

    /// Puts `new` where `old` sits in its parent. `new` is inserted before
    /// `old` is removed so the parent never observes a gap.
    fn replace_root(&self, old: DomHandle, new: DomHandle) -> Result<(), VmError>;
}
