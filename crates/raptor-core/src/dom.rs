//! In-memory DOM and the reference reconciler built on it.
//!
//! [`MemoryDom`] is a flat arena of element, text and comment nodes with
//! parent links. Released slots are never reused, so a stale [`DomHandle`]
//! reports [`DomError::Missing`] instead of aliasing a newer node.
//! [`DomReconciler`] diffs render trees against it.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::collections::map::HashMap;
use crate::collections::Attributes;
use crate::reconciler::Reconciler;
use crate::vnode::Key;
use crate::{DomError, DomHandle, VNode, Value, Vm, VmError};

#[derive(Debug)]
enum NodeKind {
    Element {
        tag: Rc<str>,
        attrs: IndexMap<String, String>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug)]
struct DomNode {
    kind: NodeKind,
    parent: Option<DomHandle>,
    children: Vec<DomHandle>,
}

impl DomNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryDom {
    nodes: Vec<Option<DomNode>>, // FUTURE(no_std): migrate to arena-backed node storage.
}

impl MemoryDom {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, node: DomNode) -> DomHandle {
        let handle = DomHandle::new(self.nodes.len());
        self.nodes.push(Some(node));
        handle
    }

    fn node(&self, handle: DomHandle) -> Result<&DomNode, DomError> {
        self.nodes
            .get(handle.raw())
            .and_then(Option::as_ref)
            .ok_or(DomError::Missing { handle })
    }

    fn node_mut(&mut self, handle: DomHandle) -> Result<&mut DomNode, DomError> {
        self.nodes
            .get_mut(handle.raw())
            .and_then(Option::as_mut)
            .ok_or(DomError::Missing { handle })
    }

    fn expect_element(&self, handle: DomHandle) -> Result<(), DomError> {
        match self.node(handle)?.kind {
            NodeKind::Element { .. } => Ok(()),
            _ => Err(DomError::NotAnElement { handle }),
        }
    }

    pub fn create_element(&mut self, tag: &str) -> DomHandle {
        self.insert(DomNode::new(NodeKind::Element {
            tag: tag.into(),
            attrs: IndexMap::new(),
        }))
    }

    pub fn create_text(&mut self, text: &str) -> DomHandle {
        self.insert(DomNode::new(NodeKind::Text(text.to_string())))
    }

    pub fn create_comment(&mut self, text: &str) -> DomHandle {
        self.insert(DomNode::new(NodeKind::Comment(text.to_string())))
    }

    pub fn contains(&self, handle: DomHandle) -> bool {
        self.node(handle).is_ok()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn parent(&self, handle: DomHandle) -> Option<DomHandle> {
        self.node(handle).ok().and_then(|node| node.parent)
    }

    pub fn children(&self, handle: DomHandle) -> Result<&[DomHandle], DomError> {
        Ok(&self.node(handle)?.children)
    }

    pub fn next_sibling(&self, handle: DomHandle) -> Option<DomHandle> {
        let parent = self.parent(handle)?;
        let siblings = self.children(parent).ok()?;
        let index = siblings.iter().position(|&child| child == handle)?;
        siblings.get(index + 1).copied()
    }

    pub fn tag(&self, handle: DomHandle) -> Result<&str, DomError> {
        match &self.node(handle)?.kind {
            NodeKind::Element { tag, .. } => Ok(tag),
            _ => Err(DomError::NotAnElement { handle }),
        }
    }

    pub fn attribute(&self, handle: DomHandle, name: &str) -> Result<Option<&str>, DomError> {
        match &self.node(handle)?.kind {
            NodeKind::Element { attrs, .. } => Ok(attrs.get(name).map(String::as_str)),
            _ => Err(DomError::NotAnElement { handle }),
        }
    }

    /// Character data of a text or comment node.
    pub fn text(&self, handle: DomHandle) -> Result<Option<&str>, DomError> {
        Ok(match &self.node(handle)?.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) => Some(text),
            NodeKind::Element { .. } => None,
        })
    }

    fn detach(&mut self, child: DomHandle) -> Result<(), DomError> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|&node| node != child);
        }
        Ok(())
    }

    /// Appends `child` to `parent`, moving it out of its current parent.
    pub fn append_child(&mut self, parent: DomHandle, child: DomHandle) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Inserts `child` before `reference`, or at the end when `reference` is
    /// `None`. `child` is moved out of its current parent first.
    pub fn insert_before(
        &mut self,
        parent: DomHandle,
        child: DomHandle,
        reference: Option<DomHandle>,
    ) -> Result<(), DomError> {
        self.expect_element(parent)?;
        self.node(child)?;
        if let Some(reference) = reference {
            if reference == child {
                return Ok(());
            }
            if self.node(reference)?.parent != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = reference
            .and_then(|reference| siblings.iter().position(|&node| node == reference))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: DomHandle, child: DomHandle) -> Result<(), DomError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        self.detach(child)
    }

    /// Puts `new` in place of `old`. `new` is inserted before `old` is
    /// removed.
    pub fn replace_child(
        &mut self,
        parent: DomHandle,
        new: DomHandle,
        old: DomHandle,
    ) -> Result<(), DomError> {
        self.insert_before(parent, new, Some(old))?;
        self.remove_child(parent, old)
    }

    pub fn set_attribute(&mut self, handle: DomHandle, name: &str, value: &str) -> Result<(), DomError> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::Element { attrs, .. } => {
                attrs.insert(name.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(DomError::NotAnElement { handle }),
        }
    }

    pub fn remove_attribute(&mut self, handle: DomHandle, name: &str) -> Result<(), DomError> {
        match &mut self.node_mut(handle)?.kind {
            NodeKind::Element { attrs, .. } => {
                attrs.shift_remove(name);
                Ok(())
            }
            _ => Err(DomError::NotAnElement { handle }),
        }
    }

    /// Sets character data. On an element the children are released and
    /// replaced by a single text node.
    pub fn set_text(&mut self, handle: DomHandle, text: &str) -> Result<(), DomError> {
        let node = self.node_mut(handle)?;
        if let NodeKind::Text(current) | NodeKind::Comment(current) = &mut node.kind {
            text.clone_into(current);
            return Ok(());
        }
        let children = std::mem::take(&mut node.children);
        for child in children {
            self.node_mut(child)?.parent = None;
            self.release(child)?;
        }
        let node = self.create_text(text);
        self.append_child(handle, node)
    }

    /// Detaches `handle` and frees it together with its subtree.
    pub fn release(&mut self, handle: DomHandle) -> Result<(), DomError> {
        self.detach(handle)?;
        let mut pending: SmallVec<[DomHandle; 16]> = SmallVec::new();
        pending.push(handle);
        while let Some(next) = pending.pop() {
            // Children freed through an earlier path are already gone.
            if let Some(node) = self.nodes.get_mut(next.raw()).and_then(Option::take) {
                pending.extend(node.children);
            }
        }
        Ok(())
    }

    /// Serializes the subtree rooted at `handle`.
    pub fn to_html(&self, handle: DomHandle) -> Result<String, DomError> {
        let mut output = String::new();
        self.write_html(&mut output, handle)?;
        Ok(output)
    }

    fn write_html(&self, output: &mut String, handle: DomHandle) -> Result<(), DomError> {
        let node = self.node(handle)?;
        match &node.kind {
            NodeKind::Element { tag, attrs } => {
                output.push('<');
                output.push_str(tag);
                for (name, value) in attrs {
                    output.push(' ');
                    output.push_str(name);
                    output.push_str("=\"");
                    escape_into(output, value);
                    output.push('"');
                }
                output.push('>');
                for &child in &node.children {
                    self.write_html(output, child)?;
                }
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
            NodeKind::Text(text) => escape_into(output, text),
            NodeKind::Comment(text) => {
                output.push_str("<!--");
                output.push_str(text);
                output.push_str("-->");
            }
        }
        Ok(())
    }
}

fn escape_into(output: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            _ => output.push(ch),
        }
    }
}

/// DOM text for an attribute value; `None` means the attribute is absent.
fn dom_attribute(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) | Value::Children(_) | Value::Object(_) => None,
        other => Some(other.to_attribute_string()),
    }
}

/// A new node matched against the committed tree. Every fallible step
/// (building new subtrees, forwarding attributes to reused instances) has
/// already run; attached DOM nodes are untouched until commit.
struct Prepared<'a> {
    node: VNode,
    step: Step<'a>,
}

enum Step<'a> {
    /// Freshly built, still detached subtree.
    Created,
    /// Reused component instance; attributes were already forwarded.
    Component,
    /// Reused text or comment node.
    Text { changed: bool },
    /// Reused element with its prepared children.
    Element {
        old: &'a VNode,
        children: Vec<Prepared<'a>>,
        removed: Vec<&'a VNode>,
    },
}

/// Reference [`Reconciler`] over a shared [`MemoryDom`].
///
/// The DOM is borrowed per operation only: creating a component node mounts
/// the component, which patches its own tree through this reconciler.
///
/// Patching runs in two passes. The prepare pass builds new subtrees
/// detached and matches children by key; if it fails, everything it built
/// is dismounted and released and the committed DOM is left as it was. The
/// commit pass then updates attributes and text, removes unmatched nodes and
/// moves children into their final order.
#[derive(Clone, Default)]
pub struct DomReconciler {
    dom: Rc<RefCell<MemoryDom>>,
}

impl DomReconciler {
    pub fn new(dom: Rc<RefCell<MemoryDom>>) -> Self {
        Self { dom }
    }

    pub fn dom(&self) -> Rc<RefCell<MemoryDom>> {
        Rc::clone(&self.dom)
    }

    fn with_dom<R>(&self, f: impl FnOnce(&mut MemoryDom) -> R) -> R {
        f(&mut self.dom.borrow_mut())
    }

    /// Mounts `vm` and appends its root to `container`.
    pub fn mount_into(&self, container: DomHandle, vm: &Vm) -> Result<(), VmError> {
        vm.mount()?;
        if let Some(root) = vm.dom_handle() {
            self.with_dom(|dom| dom.append_child(container, root))?;
        }
        Ok(())
    }

    /// Dismounts `vm` and removes its root from `container`.
    pub fn unmount_from(&self, container: DomHandle, vm: &Vm) -> Result<(), VmError> {
        let root = vm.dom_handle();
        vm.dismount()?;
        if let Some(root) = root {
            self.with_dom(|dom| {
                dom.remove_child(container, root)?;
                dom.release(root)
            })?;
        }
        Ok(())
    }

    /// Builds `vnode` as a detached subtree. On failure nothing built here
    /// survives.
    fn create(&self, mut vnode: VNode) -> Result<VNode, VmError> {
        if let Some(vm) = vnode.vm.clone() {
            if let Err(err) = vm.mount() {
                // `attach` may fail after the tree was committed.
                self.discard_node(&vnode);
                return Err(err);
            }
            vnode.elm = vm.dom_handle();
            return Ok(vnode);
        }
        let text = vnode.text.as_deref().unwrap_or("");
        let elm = match vnode.sel.as_deref() {
            None => self.with_dom(|dom| dom.create_text(text)),
            Some(_) if vnode.is_comment() => self.with_dom(|dom| dom.create_comment(text)),
            Some(sel) => {
                let elm = self.with_dom(|dom| dom.create_element(sel));
                let children = std::mem::take(&mut vnode.children);
                match self.build_element(elm, &vnode.data.attrs, children) {
                    Ok(created) => vnode.children = created,
                    Err(err) => {
                        self.release_handle(elm);
                        return Err(err);
                    }
                }
                elm
            }
        };
        vnode.elm = Some(elm);
        Ok(vnode)
    }

    fn build_element(
        &self,
        elm: DomHandle,
        attrs: &Attributes,
        children: Vec<VNode>,
    ) -> Result<Vec<VNode>, VmError> {
        self.update_attributes(elm, &Attributes::new(), attrs)?;
        let mut created: Vec<VNode> = Vec::with_capacity(children.len());
        let mut failure = None;
        for child in children {
            match self.create(child) {
                Ok(child) => {
                    let appended = match child.dom_handle() {
                        Some(handle) => self.with_dom(|dom| dom.append_child(elm, handle)),
                        None => Ok(()),
                    };
                    created.push(child);
                    if let Err(err) = appended {
                        failure = Some(VmError::from(err));
                        break;
                    }
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = failure {
            for child in &created {
                self.discard_node(child);
            }
            return Err(err);
        }
        Ok(created)
    }

    fn update_attributes(
        &self,
        elm: DomHandle,
        old: &Attributes,
        new: &Attributes,
    ) -> Result<(), DomError> {
        self.with_dom(|dom| {
            for name in old.keys() {
                if !new.contains_key(name) {
                    dom.remove_attribute(elm, name)?;
                }
            }
            for (name, value) in new {
                if old.get(name) == Some(value) {
                    continue;
                }
                match dom_attribute(value) {
                    Some(text) => dom.set_attribute(elm, name, &text)?,
                    None => dom.remove_attribute(elm, name)?,
                }
            }
            Ok(())
        })
    }

    /// Prepares two nodes that satisfy [`VNode::same_vnode`].
    fn prepare<'a>(&self, old: &'a VNode, mut new: VNode) -> Result<Prepared<'a>, VmError> {
        if let Some(vm) = &old.vm {
            // The instance created for `new` is dropped unmounted; the mounted
            // one receives the attributes the parent passed instead.
            vm.update_attributes(&new.data.attrs)?;
            new.vm = Some(vm.clone());
            new.elm = vm.dom_handle();
            return Ok(Prepared {
                node: new,
                step: Step::Component,
            });
        }
        let Some(elm) = old.elm else {
            log::warn!("patching a node that was never committed; rebuilding");
            return self.prepare_created(new);
        };
        new.elm = Some(elm);
        if new.sel.is_none() || new.is_comment() {
            let changed = new.text != old.text;
            return Ok(Prepared {
                node: new,
                step: Step::Text { changed },
            });
        }
        let children = std::mem::take(&mut new.children);
        let (children, removed) = self.prepare_children(&old.children, children)?;
        Ok(Prepared {
            node: new,
            step: Step::Element {
                old,
                children,
                removed,
            },
        })
    }

    fn prepare_created<'a>(&self, new: VNode) -> Result<Prepared<'a>, VmError> {
        Ok(Prepared {
            node: self.create(new)?,
            step: Step::Created,
        })
    }

    /// Matches `new` against `old`: keyed nodes by key, unkeyed nodes in
    /// order of appearance. Returns the prepared children and the old
    /// children left unmatched.
    fn prepare_children<'a>(
        &self,
        old: &'a [VNode],
        new: Vec<VNode>,
    ) -> Result<(Vec<Prepared<'a>>, Vec<&'a VNode>), VmError> {
        let keys = key_index(old);
        let unkeyed: SmallVec<[usize; 16]> = old
            .iter()
            .enumerate()
            .filter(|(_, node)| node.key.is_none())
            .map(|(index, _)| index)
            .collect();
        let mut cursor = 0;
        let mut used: SmallVec<[bool; 16]> = SmallVec::from_elem(false, old.len());
        let mut prepared = Vec::with_capacity(new.len());

        for child in new {
            let matched = match &child.key {
                Some(key) => keys
                    .get(key)
                    .copied()
                    .filter(|&index| !used[index] && old[index].same_vnode(&child)),
                None => {
                    let offset = unkeyed[cursor..]
                        .iter()
                        .position(|&index| old[index].same_vnode(&child));
                    offset.map(|offset| {
                        let index = unkeyed[cursor + offset];
                        cursor += offset + 1;
                        index
                    })
                }
            };
            let result = match matched {
                Some(index) => {
                    used[index] = true;
                    self.prepare(&old[index], child)
                }
                None => self.prepare_created(child),
            };
            match result {
                Ok(child) => prepared.push(child),
                Err(err) => {
                    for child in prepared {
                        self.discard(child);
                    }
                    return Err(err);
                }
            }
        }

        let removed = old
            .iter()
            .zip(used.iter())
            .filter(|&(_, &taken)| !taken)
            .map(|(node, _)| node)
            .collect();
        Ok((prepared, removed))
    }

    fn commit(&self, prepared: Prepared<'_>) -> Result<VNode, VmError> {
        let Prepared { mut node, step } = prepared;
        match step {
            Step::Created | Step::Component => {}
            Step::Text { changed } => {
                if let (true, Some(elm)) = (changed, node.elm) {
                    let text = node.text.as_deref().unwrap_or("");
                    self.with_dom(|dom| dom.set_text(elm, text))?;
                }
            }
            Step::Element {
                old,
                children,
                removed,
            } => {
                let Some(elm) = node.elm else {
                    return Ok(node);
                };
                self.update_attributes(elm, &old.data.attrs, &node.data.attrs)?;
                for stale in removed {
                    self.remove_node(elm, stale)?;
                }
                let mut committed = Vec::with_capacity(children.len());
                for child in children {
                    committed.push(self.commit(child)?);
                }
                self.arrange(elm, &committed)?;
                node.children = committed;
            }
        }
        Ok(node)
    }

    /// Moves the children of `parent` into the order of `children`, touching
    /// only nodes that are out of place.
    fn arrange(&self, parent: DomHandle, children: &[VNode]) -> Result<(), DomError> {
        let handles: SmallVec<[DomHandle; 16]> =
            children.iter().filter_map(VNode::dom_handle).collect();
        self.with_dom(|dom| {
            let mut reference = None;
            for &handle in handles.iter().rev() {
                if dom.parent(handle) != Some(parent) || dom.next_sibling(handle) != reference {
                    dom.insert_before(parent, handle, reference)?;
                }
                reference = Some(handle);
            }
            Ok(())
        })
    }

    /// Rolls back a prepared node that will never be committed.
    fn discard(&self, prepared: Prepared<'_>) {
        match prepared.step {
            Step::Created => self.discard_node(&prepared.node),
            Step::Element { children, .. } => {
                for child in children {
                    self.discard(child);
                }
            }
            Step::Component | Step::Text { .. } => {}
        }
    }

    /// Dismounts and frees a subtree that was never attached.
    fn discard_node(&self, node: &VNode) {
        let handle = node.dom_handle();
        self.dismount(node);
        if let Some(handle) = handle {
            self.release_handle(handle);
        }
    }

    fn release_handle(&self, handle: DomHandle) {
        if let Err(err) = self.with_dom(|dom| dom.release(handle)) {
            log::warn!("failed to release {handle}: {err}");
        }
    }

    fn remove_node(&self, parent: DomHandle, node: &VNode) -> Result<(), DomError> {
        let handle = node.dom_handle();
        self.dismount(node);
        match handle {
            Some(handle) => self.with_dom(|dom| {
                dom.remove_child(parent, handle)?;
                dom.release(handle)
            }),
            None => Ok(()),
        }
    }
}

fn key_index(old: &[VNode]) -> HashMap<Key, usize> {
    let mut keys = HashMap::default();
    for (index, node) in old.iter().enumerate() {
        if let Some(key) = &node.key {
            keys.insert(key.clone(), index);
        }
    }
    keys
}

impl Reconciler for DomReconciler {
    fn patch(&self, old: Option<&VNode>, new: VNode) -> Result<VNode, VmError> {
        match old {
            Some(old) if old.same_vnode(&new) => {
                let prepared = self.prepare(old, new)?;
                self.commit(prepared)
            }
            Some(old) => {
                let committed = self.create(new)?;
                self.dismount(old);
                Ok(committed)
            }
            None => self.create(new),
        }
    }

    fn dismount(&self, tree: &VNode) {
        if let Some(vm) = &tree.vm {
            if vm.is_mounted() {
                if let Err(err) = vm.dismount() {
                    log::warn!("failed to dismount {vm}: {err}");
                }
            }
            return;
        }
        for child in &tree.children {
            self.dismount(child);
        }
    }

    fn replace_root(&self, old: DomHandle, new: DomHandle) -> Result<(), VmError> {
        self.with_dom(|dom| {
            match dom.parent(old) {
                Some(parent) => dom.replace_child(parent, new, old)?,
                None => log::debug!("root {old} is detached; releasing without replacement"),
            }
            dom.release(old)
        })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/dom_tests.rs"]
mod tests;
