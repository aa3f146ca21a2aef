use std::fmt;
use std::rc::Rc;

use crate::collections::Attributes;
use crate::{Value, Vm};

/// Identifier of a node owned by the host DOM.
///
/// Handles are non-owning: holding one does not keep the DOM node alive.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct DomHandle(usize);

impl DomHandle {
    pub fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for DomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sibling identity used by the reconciler to match nodes across renders.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value.into())
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.into())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value.into())
    }
}

#[derive(Clone, Debug, Default)]
pub struct VNodeData {
    pub key: Option<Key>,
    pub attrs: Attributes,
}

impl VNodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }
}

/// Selector used for placeholder comments.
pub const COMMENT_SELECTOR: &str = "!";

/// A node of a render tree.
///
/// Elements carry a selector, text nodes carry only `text`, and component
/// nodes carry the wrapper instance in `vm`. Trees are produced fresh on
/// every render and treated as immutable once patched.
#[derive(Clone, Default)]
pub struct VNode {
    pub sel: Option<Rc<str>>,
    pub key: Option<Key>,
    pub data: VNodeData,
    pub children: Vec<VNode>,
    pub text: Option<String>,
    pub elm: Option<DomHandle>,
    pub vm: Option<Vm>,
}

impl VNode {
    pub fn element(sel: &str, data: VNodeData, children: Vec<VNode>) -> Self {
        Self {
            sel: Some(sel.into()),
            key: data.key.clone(),
            data,
            children,
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            sel: Some(COMMENT_SELECTOR.into()),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Component node. `data.attrs` holds what the parent passed, without
    /// public-prop defaults; only these are forwarded when the node is
    /// patched against a mounted instance.
    pub fn component(vm: Vm, data: VNodeData) -> Self {
        Self {
            sel: Some(vm.tag_name().into()),
            key: data.key.clone(),
            data,
            vm: Some(vm),
            ..Self::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.sel.is_none()
    }

    pub fn is_comment(&self) -> bool {
        self.sel.as_deref() == Some(COMMENT_SELECTOR)
    }

    pub fn is_component(&self) -> bool {
        self.vm.is_some()
    }

    /// DOM handle for this node. Component nodes resolve through their
    /// instance, since a rehydration may have replaced the root.
    pub fn dom_handle(&self) -> Option<DomHandle> {
        match &self.vm {
            Some(vm) => vm.dom_handle(),
            None => self.elm,
        }
    }

    /// Whether two nodes describe the same DOM node and can be patched in
    /// place rather than rebuilt.
    pub fn same_vnode(&self, other: &VNode) -> bool {
        if self.sel != other.sel || self.key != other.key {
            return false;
        }
        match (&self.vm, &other.vm) {
            (Some(a), Some(b)) => a.is_same_class(b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("VNode");
        if let Some(sel) = &self.sel {
            debug.field("sel", sel);
        }
        if let Some(key) = &self.key {
            debug.field("key", key);
        }
        if let Some(text) = &self.text {
            debug.field("text", text);
        }
        if !self.data.attrs.is_empty() {
            debug.field("attrs", &self.data.attrs);
        }
        if !self.children.is_empty() {
            debug.field("children", &self.children);
        }
        if let Some(vm) = &self.vm {
            debug.field("vm", &vm.to_string());
        }
        debug.field("elm", &self.elm).finish()
    }
}

/// Root DOM handle of a committed tree.
pub fn root_handle(tree: &VNode) -> Option<DomHandle> {
    tree.dom_handle()
}
