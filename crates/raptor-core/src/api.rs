//! Per-instance render helpers.
//!
//! A [`RenderApi`] is handed to every `render` call of the instance that
//! owns it. Besides the node constructors it carries the instance's memo
//! cache, which lives as long as the instance and is never cleared.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::collections::map::HashMap;
use crate::definition::CHILDREN;
use crate::factory::factory;
use crate::vnode::VNodeData;
use crate::{Component, VNode, VmError};

#[derive(Default)]
pub struct RenderApi {
    memo: RefCell<HashMap<u32, Rc<dyn Any>>>,
}

impl RenderApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element node.
    pub fn h(&self, sel: &str, data: VNodeData, children: Vec<VNode>) -> VNode {
        VNode::element(sel, data, children)
    }

    /// Text node.
    pub fn t(&self, text: impl Into<String>) -> VNode {
        VNode::text(text)
    }

    pub fn comment(&self, text: impl Into<String>) -> VNode {
        VNode::comment(text)
    }

    /// Child component node. The child is constructed right away with the
    /// rendering instance as its owner.
    pub fn v<C: Component>(&self, data: VNodeData, children: Vec<VNode>) -> Result<VNode, VmError> {
        let VNodeData { key, mut attrs } = data;
        let vm = factory::<C>().create(attrs.clone(), children)?;
        let children = vm.attributes().get(CHILDREN).cloned().unwrap_or_default();
        attrs.insert(CHILDREN.to_string(), children);
        Ok(VNode::component(vm, VNodeData { key, attrs }))
    }

    /// Expands `items` into nodes; `f` receives each item with its index.
    pub fn i<T>(
        &self,
        items: impl IntoIterator<Item = T>,
        mut f: impl FnMut(T, usize) -> VNode,
    ) -> Vec<VNode> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| f(item, index))
            .collect()
    }

    /// Fallible [`RenderApi::i`]; stops at the first error.
    pub fn try_i<T>(
        &self,
        items: impl IntoIterator<Item = T>,
        mut f: impl FnMut(T, usize) -> Result<VNode, VmError>,
    ) -> Result<Vec<VNode>, VmError> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| f(item, index))
            .collect()
    }

    /// Memoizes `value` under `key`. The first value stored for a key is
    /// returned on every later call regardless of the argument.
    ///
    /// A slot is typed by its first value. A later call with a different
    /// `T` logs a warning and returns `value` without touching the slot,
    /// so calls with the original type still see the first value.
    pub fn m<T: Clone + 'static>(&self, key: u32, value: T) -> T {
        self.m_with(key, || value)
    }

    /// Like [`RenderApi::m`] but only builds the value on a miss. On a
    /// type mismatch `init` runs on every call and its result is never
    /// stored.
    pub fn m_with<T: Clone + 'static>(&self, key: u32, init: impl FnOnce() -> T) -> T {
        // `init` may use the cache itself; never call it with the map borrowed.
        let stored = self.memo.borrow().get(&key).cloned();
        if let Some(stored) = stored {
            if let Some(value) = stored.downcast_ref::<T>() {
                return value.clone();
            }
            log::warn!(
                "memo slot {key} holds a different type than {}; bypassing cache",
                std::any::type_name::<T>()
            );
            return init();
        }
        let value = init();
        self.memo
            .borrow_mut()
            .insert(key, Rc::new(value.clone()));
        value
    }

    pub fn memo_len(&self) -> usize {
        self.memo.borrow().len()
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
