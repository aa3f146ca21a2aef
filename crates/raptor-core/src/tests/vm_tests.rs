use super::*;
use crate::{
    current_context, factory, Children, ComponentDef, Field, Key, Property, RenderResult, TestRuntime,
    VNodeData,
};
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};

thread_local! {
    static RENDERS: Cell<usize> = const { Cell::new(0) };
    static EVENTS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    static CAPTURED: RefCell<Vec<Result<(), VmError>>> = const { RefCell::new(Vec::new()) };
}

fn reset_logs() {
    RENDERS.with(|renders| renders.set(0));
    EVENTS.with(|events| events.borrow_mut().clear());
    CAPTURED.with(|captured| captured.borrow_mut().clear());
}

fn renders() -> usize {
    RENDERS.with(Cell::get)
}

fn log_event(event: impl Into<String>) {
    EVENTS.with(|events| events.borrow_mut().push(event.into()));
}

fn take_events() -> Vec<String> {
    EVENTS.with(|events| std::mem::take(&mut *events.borrow_mut()))
}

fn capture(result: Result<(), VmError>) {
    CAPTURED.with(|captured| captured.borrow_mut().push(result));
}

fn take_captured() -> Vec<Result<(), VmError>> {
    CAPTURED.with(|captured| std::mem::take(&mut *captured.borrow_mut()))
}

fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

struct Counter {
    x: Field<i64>,
    label: Field<String>,
    frozen: Field<i64>,
}

impl Component for Counter {
    fn new(_attrs: &Attributes) -> Self {
        Self {
            x: Field::new(0),
            label: Field::new(String::new()),
            frozen: Field::sealed(7),
        }
    }

    fn definition() -> ComponentDef {
        ComponentDef::for_class(None, "Counter")
            .prop("x", 5i64)
            .prop("label", "x")
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![
            Property::field("x", &self.x),
            Property::field("label", &self.label),
            Property::field("frozen", &self.frozen),
            Property::computed("double", self.x.get() * 2),
        ]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        RENDERS.with(|renders| renders.set(renders.get() + 1));
        let text = format!("{}={}", self.label.get(), self.x.get());
        Ok(Some(api.h("p", VNodeData::new(), vec![api.t(text)])))
    }

    fn updated(&self) -> Result<(), VmError> {
        log_event("updated");
        Ok(())
    }

    fn attach(&self, _elm: DomHandle) -> Result<(), VmError> {
        log_event("attach");
        Ok(())
    }

    fn detach(&self, _elm: DomHandle) -> Result<(), VmError> {
        log_event("detach");
        Ok(())
    }
}

fn counter(x: i64) -> Vm {
    factory::<Counter>()
        .create(attrs(&[("x", Value::Int(x))]), Vec::new())
        .expect("construct counter")
}

#[test]
fn construction_applies_attributes_then_updated() {
    reset_logs();
    let _runtime = TestRuntime::new();
    let vm = counter(1);

    assert_eq!(vm.get("x"), Some(Value::Int(1)));
    assert_eq!(vm.state(), LifecycleState::Constructed);
    assert_eq!(take_events(), vec!["updated"]);
    assert_eq!(renders(), 0);
    assert_eq!(vm.tag_name(), "unknown-private-counter");
    assert_eq!(vm.to_string(), "<unknown-private-counter>");
}

#[test]
fn public_prop_defaults_fill_missing_attributes() {
    let _runtime = TestRuntime::new();
    let vm = factory::<Counter>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");

    assert_eq!(vm.get("x"), Some(Value::Int(5)));
    assert_eq!(vm.get("label"), Some(Value::from("x")));
    let resolved = vm.attributes();
    assert!(resolved.contains_key("children"));
    assert_eq!(resolved.get("x"), Some(&Value::Int(5)));
}

#[test]
fn mount_renders_and_attaches_outside_render() {
    reset_logs();
    let runtime = TestRuntime::new();
    let vm = counter(1);
    take_events();

    vm.mount().expect("mount");

    assert!(vm.is_mounted());
    assert!(!vm.is_rendering());
    assert_eq!(renders(), 1);
    assert_eq!(take_events(), vec!["attach"]);
    let root = vm.dom_handle().expect("root handle");
    assert_eq!(runtime.html(root), "<p>x=1</p>");
}

#[test]
fn mounting_twice_is_an_invalid_transition() {
    let _runtime = TestRuntime::new();
    let vm = counter(1);
    vm.mount().expect("mount");

    let err = vm.mount().expect_err("second mount");
    assert!(matches!(
        err,
        VmError::InvalidTransition {
            state: LifecycleState::Mounted,
            operation: "mount",
            ..
        }
    ));
}

#[test]
fn writes_in_one_turn_coalesce_into_one_rehydration() {
    reset_logs();
    let runtime = TestRuntime::new();
    let vm = counter(1);
    vm.mount().expect("mount");
    let root = vm.dom_handle().expect("root");

    vm.set("x", 2i64).expect("set x");
    vm.set("x", 3i64).expect("set x again");
    vm.with_component::<Counter, _>(|counter| counter.label.set("y".to_string()))
        .expect("counter")
        .expect("set label");

    assert!(vm.is_rehydration_pending());
    assert_eq!(renders(), 1, "rehydration never runs synchronously");
    assert_eq!(runtime.scheduler().flush_requests(), 1);

    assert_eq!(runtime.flush(), 1);
    assert_eq!(renders(), 2);
    assert_eq!(vm.rehydration_count(), 1);
    assert!(!vm.is_rehydration_pending());
    assert_eq!(vm.dom_handle(), Some(root), "same root is patched in place");
    assert_eq!(runtime.html(root), "<p>y=3</p>");
}

#[test]
fn rehydration_invokes_updated_before_render() {
    reset_logs();
    let runtime = TestRuntime::new();
    let vm = counter(1);
    vm.mount().expect("mount");
    take_events();

    vm.set("x", 2i64).expect("set");
    runtime.flush();

    assert_eq!(take_events(), vec!["updated"]);
    assert_eq!(renders(), 2);
}

#[test]
fn writing_the_current_value_does_not_schedule() {
    let runtime = TestRuntime::new();
    let vm = counter(1);
    vm.mount().expect("mount");

    vm.set("x", 1i64).expect("set same value");

    assert!(!vm.is_rehydration_pending());
    assert_eq!(runtime.scheduler().flush_requests(), 0);
    assert_eq!(runtime.flush(), 0);
}

#[test]
fn writes_before_mount_do_not_schedule() {
    let runtime = TestRuntime::new();
    let vm = counter(1);

    vm.set("x", 9i64).expect("set");

    assert!(!vm.is_rehydration_pending());
    assert!(!runtime.runtime().has_pending_microtasks());
    vm.mount().expect("mount");
    let root = vm.dom_handle().expect("root");
    assert_eq!(runtime.html(root), "<p>x=9</p>");
}

#[test]
fn sealed_and_computed_properties_are_not_reactive() {
    let runtime = TestRuntime::new();
    let vm = counter(1);
    vm.mount().expect("mount");

    vm.with_component::<Counter, _>(|counter| {
        assert!(!counter.frozen.is_wired());
        assert!(counter.x.is_wired());
        counter.frozen.set(8)
    })
    .expect("counter")
    .expect("write sealed field");

    assert!(!vm.is_rehydration_pending());
    assert_eq!(vm.get("frozen"), Some(Value::Int(8)));
    assert_eq!(vm.get("double"), Some(Value::Int(2)));
    assert_eq!(runtime.flush(), 0);
}

#[test]
fn rejected_writes_leave_the_value_untouched() {
    let _runtime = TestRuntime::new();
    let vm = counter(1);

    let unknown = vm.set("missing", 1i64).expect_err("unknown property");
    assert!(matches!(unknown, VmError::UnknownProperty { ref name, .. } if name == "missing"));

    let computed = vm.set("double", 4i64).expect_err("computed property");
    assert!(matches!(computed, VmError::ReadOnlyProperty { .. }));

    let mismatch = vm.set("x", "two").expect_err("type mismatch");
    assert!(matches!(mismatch, VmError::TypeMismatch { .. }));
    assert_eq!(vm.get("x"), Some(Value::Int(1)));
    assert!(!vm.is_updating(), "update guard is cleared on error paths");
}

#[test]
fn unknown_attributes_are_skipped_at_construction() {
    let _runtime = TestRuntime::new();
    let vm = factory::<Counter>()
        .create(
            attrs(&[("x", Value::Int(3)), ("title", Value::from("ignored"))]),
            Vec::new(),
        )
        .expect("construct with extra attribute");

    assert_eq!(vm.get("x"), Some(Value::Int(3)));
    assert_eq!(vm.get("title"), None);
    assert_eq!(vm.attributes().get("title"), Some(&Value::from("ignored")));
}

#[test]
fn constructing_without_a_runtime_fails() {
    drop(TestRuntime::new());
    let err = factory::<Counter>()
        .create(Attributes::new(), Vec::new())
        .expect_err("no runtime");
    assert_eq!(err, VmError::NoRuntime);
}

struct SelfWriter {
    count: Field<i64>,
}

impl Component for SelfWriter {
    fn new(_attrs: &Attributes) -> Self {
        Self {
            count: Field::new(0),
        }
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![Property::field("count", &self.count)]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        let vm = current_context().expect("rendering instance");
        capture(vm.set("count", 5i64));
        capture(self.count.set(6));
        Ok(Some(api.t(self.count.get().to_string())))
    }

    fn updated(&self) -> Result<(), VmError> {
        let vm = current_context().expect("updating instance");
        capture(vm.set("count", 1i64));
        Ok(())
    }
}

#[test]
fn set_inside_render_is_an_invariant_violation() {
    reset_logs();
    let _runtime = TestRuntime::new();
    let vm = factory::<SelfWriter>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    take_captured();

    vm.mount().expect("mount");

    let captured = take_captured();
    assert_eq!(captured.len(), 2);
    for result in captured {
        let err = result.expect_err("write during render");
        assert!(matches!(
            err,
            VmError::InvariantViolation {
                phase: Phase::Render,
                ..
            }
        ));
        assert!(err
            .to_string()
            .starts_with("Invariant Violation: <unknown-private-selfwriter>.render()"));
    }
    assert_eq!(vm.get("count"), Some(Value::Int(0)));
    assert!(!vm.is_rehydration_pending());
}

#[test]
fn set_inside_updated_is_an_invariant_violation() {
    reset_logs();
    let _runtime = TestRuntime::new();
    let vm = factory::<SelfWriter>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");

    let captured = take_captured();
    assert_eq!(captured.len(), 1);
    let err = captured[0].clone().expect_err("write during updated");
    assert_eq!(
        err.to_string(),
        "Invariant Violation: Setting attribute <unknown-private-selfwriter>.count has side effects on the state of the component."
    );
    assert_eq!(vm.get("count"), Some(Value::Int(0)));
}

#[test]
fn dismount_makes_a_pending_rehydration_a_no_op() {
    reset_logs();
    let runtime = TestRuntime::new();
    let vm = counter(1);
    vm.mount().expect("mount");
    take_events();

    vm.set("x", 2i64).expect("set");
    vm.dismount().expect("dismount");

    assert_eq!(runtime.flush(), 1);
    assert_eq!(renders(), 1);
    assert_eq!(vm.rehydration_count(), 0);
    assert_eq!(vm.state(), LifecycleState::Dismounted);
    assert_eq!(take_events(), vec!["detach"]);
    assert!(vm.mount().is_err(), "dismount is terminal");
}

#[test]
fn dismount_before_mount_is_an_invalid_transition() {
    let _runtime = TestRuntime::new();
    let vm = counter(1);
    assert!(matches!(
        vm.dismount(),
        Err(VmError::InvalidTransition {
            state: LifecycleState::Constructed,
            operation: "dismount",
            ..
        })
    ));
}

struct Toggle {
    on: Field<bool>,
    fail: Field<bool>,
}

impl Component for Toggle {
    fn new(_attrs: &Attributes) -> Self {
        Self {
            on: Field::new(false),
            fail: Field::new(false),
        }
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![
            Property::field("on", &self.on),
            Property::field("fail", &self.fail),
        ]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        if self.fail.get() {
            return Err(VmError::NoRuntime);
        }
        let sel = if self.on.get() { "span" } else { "p" };
        Ok(Some(api.h(sel, VNodeData::new(), vec![api.t("toggle")])))
    }
}

#[test]
fn changed_root_is_swapped_in_the_parent() {
    let runtime = TestRuntime::new();
    let container = runtime.dom().borrow_mut().create_element("main");
    let vm = factory::<Toggle>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    runtime
        .reconciler()
        .mount_into(container, &vm)
        .expect("mount into container");
    let old_root = vm.dom_handle().expect("root");
    assert_eq!(runtime.html(container), "<main><p>toggle</p></main>");

    vm.set("on", true).expect("set");
    runtime.flush();

    let new_root = vm.dom_handle().expect("root");
    assert_ne!(old_root, new_root);
    assert_eq!(runtime.html(container), "<main><span>toggle</span></main>");
    assert!(!runtime.dom().borrow().contains(old_root));
}

#[test]
fn failed_rehydration_keeps_the_committed_tree() {
    let runtime = TestRuntime::new();
    let vm = factory::<Toggle>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    vm.mount().expect("mount");
    let root = vm.dom_handle().expect("root");

    vm.set("fail", true).expect("set");
    vm.set("on", true).expect("set");
    assert!(runtime.runtime().run_microtasks().is_err());

    assert_eq!(vm.dom_handle(), Some(root));
    assert_eq!(runtime.html(root), "<p>toggle</p>");
    vm.with_offspring(|tree| assert!(tree.is_some()));
}

struct Panicking;

impl Component for Panicking {
    fn new(_attrs: &Attributes) -> Self {
        Panicking
    }

    fn render(&self, _api: &RenderApi) -> RenderResult {
        panic!("render exploded");
    }
}

#[test]
fn context_and_flags_are_restored_after_a_panicking_render() {
    let _runtime = TestRuntime::new();
    let vm = factory::<Panicking>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");

    let outcome = catch_unwind(AssertUnwindSafe(|| vm.mount()));

    assert!(outcome.is_err());
    assert!(current_context().is_none());
    assert!(!vm.is_rendering());
    assert_eq!(vm.state(), LifecycleState::Constructed);
}

struct Empty;

impl Component for Empty {
    fn new(_attrs: &Attributes) -> Self {
        Empty
    }
}

#[test]
fn empty_render_commits_a_placeholder_comment() {
    let runtime = TestRuntime::new();
    let vm = factory::<Empty>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    vm.mount().expect("mount");

    let root = vm.dom_handle().expect("placeholder");
    assert_eq!(runtime.html(root), "<!--unknown-private-empty-->");
}

struct Layout {
    body: Field<Children>,
}

impl Component for Layout {
    fn new(attrs: &Attributes) -> Self {
        let children = attrs
            .get("children")
            .and_then(Value::as_children)
            .cloned()
            .unwrap_or_default();
        Self {
            body: Field::new(children),
        }
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![Property::field("body", &self.body)]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        Ok(Some(api.h("section", VNodeData::new(), self.body.get().to_vec())))
    }
}

#[test]
fn body_property_and_children_reach_the_component() {
    let runtime = TestRuntime::new();
    let vm = factory::<Layout>()
        .create(Attributes::new(), vec![VNode::text("hello")])
        .expect("construct");
    assert!(vm.has_body_slot());
    assert!(!counter(1).has_body_slot());

    vm.mount().expect("mount");
    let root = vm.dom_handle().expect("root");
    assert_eq!(runtime.html(root), "<section>hello</section>");
}

struct Parent {
    n: Field<i64>,
}

impl Component for Parent {
    fn new(_attrs: &Attributes) -> Self {
        Self { n: Field::new(1) }
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![Property::field("n", &self.n)]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        let child = api.v::<Counter>(
            VNodeData::new().key("child").attr("x", self.n.get()),
            Vec::new(),
        )?;
        Ok(Some(api.h("div", VNodeData::new(), vec![child])))
    }
}

#[test]
fn child_instances_are_reused_across_parent_rehydrations() {
    reset_logs();
    let runtime = TestRuntime::new();
    let parent = factory::<Parent>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    parent.mount().expect("mount");

    let child = parent
        .with_offspring(|tree| tree.and_then(|tree| tree.children[0].vm.clone()))
        .expect("child instance");
    assert!(child.owner().is_some_and(|owner| owner.ptr_eq(&parent)));
    assert_eq!(child.class().vnode_type(), "Counter");
    assert_eq!(
        parent.with_offspring(|tree| tree.and_then(|tree| tree.children[0].key.clone())),
        Some(Key::from("child"))
    );

    parent.set("n", 2i64).expect("set");
    assert_eq!(runtime.flush(), 2, "parent and child rehydrate in one drain");

    let reused = parent
        .with_offspring(|tree| tree.and_then(|tree| tree.children[0].vm.clone()))
        .expect("child instance");
    assert!(reused.ptr_eq(&child));
    assert_eq!(child.rehydration_count(), 1);
    let root = parent.dom_handle().expect("root");
    assert_eq!(runtime.html(root), "<div><p>x=2</p></div>");
}

#[test]
fn dismounting_a_parent_dismounts_its_children() {
    let _runtime = TestRuntime::new();
    let parent = factory::<Parent>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    parent.mount().expect("mount");
    let child = parent
        .with_offspring(|tree| tree.and_then(|tree| tree.children[0].vm.clone()))
        .expect("child instance");

    parent.dismount().expect("dismount");

    assert_eq!(child.state(), LifecycleState::Dismounted);
}

#[test]
fn parent_rehydration_keeps_props_the_parent_never_passed() {
    reset_logs();
    let runtime = TestRuntime::new();
    let parent = factory::<Parent>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    parent.mount().expect("mount");
    let child = parent
        .with_offspring(|tree| tree.and_then(|tree| tree.children[0].vm.clone()))
        .expect("child instance");

    child.set("label", "mine").expect("set label");
    assert_eq!(runtime.flush(), 1);
    parent.set("n", 2i64).expect("set n");
    assert_eq!(runtime.flush(), 2);

    assert_eq!(child.get("label"), Some(Value::from("mine")));
    assert_eq!(child.get("x"), Some(Value::Int(2)));
    let forwarded = parent
        .with_offspring(|tree| tree.map(|tree| tree.children[0].data.attrs.clone()))
        .expect("child node");
    assert!(!forwarded.contains_key("label"));
    assert_eq!(forwarded.get("x"), Some(&Value::Int(2)));
    let root = parent.dom_handle().expect("root");
    assert_eq!(runtime.html(root), "<div><p>mine=2</p></div>");
}

#[test]
fn out_of_range_float_is_a_type_mismatch() {
    let _runtime = TestRuntime::new();
    let vm = counter(1);

    let err = vm.set("x", Value::Float(1e30)).expect_err("float beyond i64");
    assert!(matches!(err, VmError::TypeMismatch { .. }));
    assert_eq!(vm.get("x"), Some(Value::Int(1)));

    vm.set("x", Value::Float(4.0)).expect("integral float");
    assert_eq!(vm.get("x"), Some(Value::Int(4)));
}

struct Broken;

impl Component for Broken {
    fn new(_attrs: &Attributes) -> Self {
        Broken
    }

    fn render(&self, _api: &RenderApi) -> RenderResult {
        Err(VmError::NoRuntime)
    }
}

struct Switcher {
    broken: Field<bool>,
}

impl Component for Switcher {
    fn new(_attrs: &Attributes) -> Self {
        Self {
            broken: Field::new(false),
        }
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![Property::field("broken", &self.broken)]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        let children = if self.broken.get() {
            vec![
                api.h("i", VNodeData::new(), Vec::new()),
                api.v::<Broken>(VNodeData::new(), Vec::new())?,
            ]
        } else {
            vec![api.h("span", VNodeData::new(), Vec::new())]
        };
        Ok(Some(api.h("div", VNodeData::new(), children)))
    }
}

#[test]
fn child_failing_mid_patch_leaves_the_dom_untouched() {
    let runtime = TestRuntime::new();
    let vm = factory::<Switcher>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    vm.mount().expect("mount");
    let root = vm.dom_handle().expect("root");
    let nodes = runtime.dom().borrow().len();

    vm.set("broken", true).expect("set");
    assert!(runtime.runtime().run_microtasks().is_err());

    assert_eq!(vm.dom_handle(), Some(root));
    assert_eq!(runtime.html(root), "<div><span></span></div>");
    assert_eq!(runtime.dom().borrow().len(), nodes, "partial nodes are released");

    vm.set("broken", false).expect("set");
    runtime.flush();
    assert_eq!(runtime.html(root), "<div><span></span></div>");
    assert_eq!(runtime.dom().borrow().len(), nodes);
}

struct Shelf;

impl Component for Shelf {
    fn new(_attrs: &Attributes) -> Self {
        Shelf
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        let children = vec![
            api.v::<Counter>(VNodeData::new().attr("x", 1i64), Vec::new())?,
            api.v::<Broken>(VNodeData::new(), Vec::new())?,
        ];
        Ok(Some(api.h("div", VNodeData::new(), children)))
    }
}

#[test]
fn failed_mount_dismounts_siblings_built_before_the_error() {
    reset_logs();
    let runtime = TestRuntime::new();
    let vm = factory::<Shelf>()
        .create(Attributes::new(), Vec::new())
        .expect("construct");
    let nodes = runtime.dom().borrow().len();

    assert!(vm.mount().is_err());

    assert_eq!(take_events(), vec!["updated", "attach", "detach"]);
    assert_eq!(vm.state(), LifecycleState::Constructed);
    assert_eq!(runtime.dom().borrow().len(), nodes);
}
