use super::*;
use std::cell::Cell;

#[test]
fn tag_names_follow_the_compiler_rule() {
    assert_eq!(tag_name_for(Some("x"), "Foo", false), "x-private-foo");
    assert_eq!(tag_name_for(Some("x"), "Foo", true), "x-foo");
    assert_eq!(tag_name_for(None, "MyButton", false), "unknown-private-mybutton");
    assert_eq!(
        ComponentDef::for_class(Some("Ns"), "Card").tag_name(),
        "ns-private-card"
    );
}

#[test]
fn resolve_attributes_fills_defaults_and_children() {
    let def = ComponentDef::new("x-card")
        .prop("title", "untitled")
        .prop("size", 3i64);
    let mut attrs = Attributes::new();
    attrs.insert("size".to_string(), Value::Int(9));

    let resolved = def.resolve_attributes(attrs, vec![VNode::text("child")]);

    assert_eq!(resolved.get("title"), Some(&Value::from("untitled")));
    assert_eq!(resolved.get("size"), Some(&Value::Int(9)));
    let children = resolved
        .get("children")
        .and_then(Value::as_children)
        .expect("children attribute");
    assert_eq!(children.len(), 1);
}

#[test]
fn thunk_defaults_are_evaluated_per_resolution() {
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    let def = ComponentDef::new("x-list").lazy_prop("items", move || {
        counter.set(counter.get() + 1);
        Value::list([Value::Int(1)])
    });

    let first = def.resolve_attributes(Attributes::new(), Vec::new());
    let second = def.resolve_attributes(Attributes::new(), Vec::new());

    assert_eq!(calls.get(), 2);
    assert_ne!(
        first.get("items"),
        second.get("items"),
        "each instance receives its own list"
    );

    let mut explicit = Attributes::new();
    explicit.insert("items".to_string(), Value::Null);
    def.resolve_attributes(explicit, Vec::new());
    assert_eq!(calls.get(), 2, "thunk skipped when the attribute is passed");
}

#[test]
fn public_methods_are_deduplicated() {
    let def = ComponentDef::new("x-a").method("focus").method("focus").method("blur");
    assert_eq!(def.public_methods(), &["focus", "blur"]);
    assert!(!def.is_public_prop("focus"));
}

#[test]
fn bundle_without_entry_reports_missing_default_class() {
    let mut bundle = ComponentBundle::new(None);
    bundle.add_class("Foo");
    let err = bundle.resolve_entry().expect_err("no entry");
    assert_eq!(err.to_string(), "This module needs to export a default class");
}

#[test]
fn bundle_entry_must_match_a_class() {
    let mut bundle = ComponentBundle::new(Some("x")).with_entry("Foo");
    bundle.add_class("Bar");
    assert_eq!(
        bundle.resolve_entry(),
        Err(DefinitionError::MissingEntryPoint {
            entry: Some("Foo".to_string())
        })
    );
}

#[test]
fn bundle_entry_resolves_to_public_tag_name() {
    let mut bundle = ComponentBundle::new(Some("x")).with_entry("Foo");
    bundle.add_class("Foo");
    bundle.add_class("Helper");
    assert_eq!(bundle.namespace(), "x");
    assert_eq!(bundle.resolve_entry(), Ok("x-foo".to_string()));
}

#[test]
fn bundle_entry_colliding_by_case_is_ambiguous() {
    let mut bundle = ComponentBundle::new(None).with_entry("foo");
    bundle.add_class("Foo");
    bundle.add_class("FOO");
    assert_eq!(bundle.class_count(), 2);
    let err = bundle.resolve_entry().expect_err("ambiguous");
    assert!(matches!(err, DefinitionError::AmbiguousEntryPoint { ref candidates, .. } if candidates.len() == 2));
    assert!(err.to_string().starts_with("Ambiguity locating the class entry point"));
}
