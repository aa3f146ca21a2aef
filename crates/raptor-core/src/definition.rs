//! Static component metadata produced by the class compiler.
//!
//! The compiler turns an annotated class into a tag name, a map of public
//! props with their defaults and a list of public methods. The runtime only
//! reads this data; it is built once per component type when the factory
//! generates the wrapper class.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::collections::Attributes;
use crate::{Children, VNode, Value};

/// Attribute carrying the child references of a component.
pub const CHILDREN: &str = "children";

/// Namespace used when a bundle does not configure one.
pub const UNKNOWN_NAMESPACE: &str = "unknown";

/// Default of a public prop: either a literal or a thunk evaluated each time
/// a wrapper needs the default.
#[derive(Clone)]
pub enum PropDefault {
    Value(Value),
    Thunk(Rc<dyn Fn() -> Value>),
}

impl PropDefault {
    pub fn evaluate(&self) -> Value {
        match self {
            PropDefault::Value(value) => value.clone(),
            PropDefault::Thunk(thunk) => thunk(),
        }
    }
}

impl fmt::Debug for PropDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            PropDefault::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ComponentDef {
    tag_name: String,
    public_props: IndexMap<&'static str, PropDefault>,
    public_methods: Vec<&'static str>,
}

impl ComponentDef {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            public_props: IndexMap::new(),
            public_methods: Vec::new(),
        }
    }

    /// Definition the compiler emits for a non-entry class named
    /// `class_name` in `namespace`.
    pub fn for_class(namespace: Option<&str>, class_name: &str) -> Self {
        Self::new(tag_name_for(namespace, class_name, false))
    }

    pub fn prop(mut self, name: &'static str, default: impl Into<Value>) -> Self {
        self.public_props
            .insert(name, PropDefault::Value(default.into()));
        self
    }

    pub fn lazy_prop(mut self, name: &'static str, default: impl Fn() -> Value + 'static) -> Self {
        self.public_props
            .insert(name, PropDefault::Thunk(Rc::new(default)));
        self
    }

    pub fn method(mut self, name: &'static str) -> Self {
        if !self.public_methods.contains(&name) {
            self.public_methods.push(name);
        }
        self
    }

    pub fn tag_name(&self) -> &str {
        &self.tag_name
    }

    pub fn public_props(&self) -> &IndexMap<&'static str, PropDefault> {
        &self.public_props
    }

    pub fn public_methods(&self) -> &[&'static str] {
        &self.public_methods
    }

    pub fn is_public_prop(&self, name: &str) -> bool {
        self.public_props.contains_key(name)
    }

    /// Builds the attribute set a wrapper is constructed with: defaults for
    /// public props the parent did not pass, the parent's attributes, and a
    /// `children` attribute holding the child references.
    pub fn resolve_attributes(&self, attrs: Attributes, children: Vec<VNode>) -> Attributes {
        let mut resolved = Attributes::with_capacity(attrs.len() + self.public_props.len() + 1);
        for (name, default) in &self.public_props {
            if !attrs.contains_key(*name) {
                resolved.insert((*name).to_string(), default.evaluate());
            }
        }
        resolved.extend(attrs);
        resolved.insert(
            CHILDREN.to_string(),
            Value::Children(Children::new(children)),
        );
        resolved
    }
}

/// Tag name the compiler derives for a class.
///
/// Entry classes are addressed as `{namespace}-{class}`, every other class
/// as `{namespace}-private-{class}`; the result is lowercased.
pub fn tag_name_for(namespace: Option<&str>, class_name: &str, is_entry: bool) -> String {
    let namespace = namespace.unwrap_or(UNKNOWN_NAMESPACE);
    let prefix = if is_entry { "" } else { "private-" };
    format!("{namespace}-{prefix}{class_name}").to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    MissingEntryPoint { entry: Option<String> },
    AmbiguousEntryPoint { entry: String, candidates: Vec<String> },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionError::MissingEntryPoint { entry: None } => {
                f.write_str("This module needs to export a default class")
            }
            DefinitionError::MissingEntryPoint { entry: Some(entry) } => write!(
                f,
                "Class name {entry} does not match the current bundle entry point"
            ),
            DefinitionError::AmbiguousEntryPoint { entry, candidates } => write!(
                f,
                "Ambiguity locating the class entry point {entry}: {}",
                candidates.join(", ")
            ),
        }
    }
}

impl std::error::Error for DefinitionError {}

/// The classes compiled into one bundle.
///
/// Classes are keyed by their lowercased name, the same key the tag name is
/// derived from, so two classes differing only in case collide.
#[derive(Clone, Debug, Default)]
pub struct ComponentBundle {
    namespace: Option<String>,
    entry: Option<String>,
    classes: IndexMap<String, Vec<String>>,
}

impl ComponentBundle {
    pub fn new(namespace: Option<&str>) -> Self {
        Self {
            namespace: namespace.map(str::to_owned),
            ..Self::default()
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    pub fn add_class(&mut self, class_name: impl Into<String>) {
        let class_name = class_name.into();
        self.classes
            .entry(class_name.to_lowercase())
            .or_default()
            .push(class_name);
    }

    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(UNKNOWN_NAMESPACE)
    }

    pub fn class_count(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    /// Resolves the entry class and returns its tag name.
    pub fn resolve_entry(&self) -> Result<String, DefinitionError> {
        let entry = self
            .entry
            .as_deref()
            .ok_or(DefinitionError::MissingEntryPoint { entry: None })?;
        let candidates = self
            .classes
            .get(&entry.to_lowercase())
            .filter(|candidates| !candidates.is_empty())
            .ok_or_else(|| DefinitionError::MissingEntryPoint {
                entry: Some(entry.to_string()),
            })?;
        if self.class_count() > 1 && candidates.len() > 1 {
            return Err(DefinitionError::AmbiguousEntryPoint {
                entry: entry.to_string(),
                candidates: candidates.clone(),
            });
        }
        Ok(tag_name_for(self.namespace.as_deref(), entry, true))
    }
}

#[cfg(test)]
#[path = "tests/definition_tests.rs"]
mod tests;
