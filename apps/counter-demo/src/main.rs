use std::error::Error;

use raptor_core::{
    factory, Attributes, Component, ComponentDef, DomHandle, Field, Property, RenderApi,
    RenderResult, VNodeData, Value, VmError,
};
use raptor_runtime_std::StdRuntime;

struct Counter {
    count: Field<i64>,
    label: Field<String>,
}

impl Component for Counter {
    fn new(_attrs: &Attributes) -> Self {
        Self {
            count: Field::new(0),
            label: Field::new(String::new()),
        }
    }

    fn definition() -> ComponentDef {
        ComponentDef::for_class(Some("demo"), "Counter")
            .prop("count", 0i64)
            .prop("label", "clicks")
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![
            Property::field("count", &self.count),
            Property::field("label", &self.label),
            Property::computed("even", self.count.get() % 2 == 0),
        ]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        let count = self.count.get();
        let history = api.try_i(1..=count, |step, _| {
            api.v::<Badge>(VNodeData::new().key(step).attr("step", step), Vec::new())
        })?;
        Ok(Some(api.h(
            "section",
            VNodeData::new().attr("class", "counter"),
            vec![
                api.h(
                    "h1",
                    VNodeData::new(),
                    vec![api.t(format!("{} {}", count, self.label.get()))],
                ),
                api.h("ul", VNodeData::new(), history),
            ],
        )))
    }

    fn attach(&self, elm: DomHandle) -> Result<(), VmError> {
        log::info!("counter attached at {elm}");
        Ok(())
    }

    fn detach(&self, elm: DomHandle) -> Result<(), VmError> {
        log::info!("counter detached from {elm}");
        Ok(())
    }
}

struct Badge {
    step: Field<i64>,
}

impl Component for Badge {
    fn new(_attrs: &Attributes) -> Self {
        Self {
            step: Field::new(0),
        }
    }

    fn definition() -> ComponentDef {
        ComponentDef::for_class(Some("demo"), "Badge").prop("step", 0i64)
    }

    fn properties(&self) -> Vec<Property<'_>> {
        vec![Property::field("step", &self.step)]
    }

    fn render(&self, api: &RenderApi) -> RenderResult {
        Ok(Some(api.h(
            "li",
            VNodeData::new(),
            vec![api.t(format!("#{}", self.step.get()))],
        )))
    }
}

fn drain(runtime: &StdRuntime) -> Result<usize, VmError> {
    let mut executed = 0;
    while runtime.take_flush_request() {
        executed += runtime.run_microtasks()?;
    }
    Ok(executed)
}

fn main() -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "logging")]
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    println!("=== Raptor Counter Demo ===");

    let runtime = StdRuntime::new();
    runtime.set_flush_waker(|| log::debug!("flush requested"));

    let mut attrs = Attributes::new();
    attrs.insert("label".to_string(), Value::from("taps"));
    let counter = factory::<Counter>().create(attrs, Vec::new())?;
    runtime.mount(&counter)?;
    println!("mounted:  {}", runtime.html()?);

    for _ in 0..3 {
        let next = counter.get("count").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
        counter.set("count", next)?;
        let ran = drain(&runtime)?;
        println!("count={next} ({ran} task(s)): {}", runtime.html()?);
    }

    // Both writes coalesce into one rehydration.
    counter.set("label", "presses")?;
    counter.set("count", 1i64)?;
    let ran = drain(&runtime)?;
    println!("batched ({ran} task(s)): {}", runtime.html()?);

    match counter.set("even", true) {
        Err(err) => println!("rejected write: {err}"),
        Ok(()) => println!("unexpected: computed property accepted a write"),
    }

    println!(
        "rehydrations: {}, even: {:?}",
        counter.rehydration_count(),
        counter.get("even")
    );

    runtime.unmount(&counter)?;
    println!("unmounted: {}", runtime.html()?);
    Ok(())
}
