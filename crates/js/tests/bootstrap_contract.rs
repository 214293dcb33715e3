//! Tests for the observable contract of context bootstrap: which globals
//! appear, where console output lands, how `Flubber.print` reaches the host,
//! and that the capability bundle stays out of reach.

use std::sync::Arc;

use js::capabilities::{CORE, FETCH, URL};
use js::{
    APPROVED_GLOBALS, CapabilityBundle, GlobalNamespace, HostContext, HostFnKind, JSError, JSValue,
    NetPolicy, OpDispatcher, OpReceiver, PRINT_OP, RecordingOutput, ScriptContext, bootstrap,
    build_default_capabilities, op_channel, op_print,
};

struct Harness {
    _runtime: tokio::runtime::Runtime,
    output: Arc<RecordingOutput>,
    receiver: OpReceiver,
    bundle: Arc<CapabilityBundle>,
    host: HostContext,
}

/// Helper: a default bundle wired to a recording output and an op channel.
fn harness() -> Harness {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let output = Arc::new(RecordingOutput::default());
    let (sender, receiver) = op_channel();
    let bundle = Arc::new(build_default_capabilities(output.clone(), sender));
    let host = HostContext::new(runtime.handle().clone(), NetPolicy::default());
    Harness {
        _runtime: runtime,
        output,
        receiver,
        bundle,
        host,
    }
}

fn core_function(bundle: &CapabilityBundle, name: &str) -> HostFnKind {
    bundle
        .get(CORE)
        .and_then(|core| core.get(name))
        .and_then(|value| value.as_function().cloned())
        .expect("core member")
}

#[test]
fn namespace_holds_exactly_the_approved_globals() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");

    let names: Vec<&str> = context.globals().names().collect();
    assert_eq!(names, APPROVED_GLOBALS.to_vec());
    assert!(context.globals().is_initialized());
    assert!(context.globals().get("__bootstrap").is_none());
}

#[test]
fn print_namespace_exposes_only_print() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");

    let flubber = context.globals().get("Flubber").and_then(JSValue::as_object).expect("Flubber");
    let members: Vec<&str> = flubber.member_names().collect();
    assert_eq!(members, vec!["print"]);
    let print = flubber.get("print").and_then(|value| value.as_function().cloned()).expect("print");
    assert!(!print.ptr_eq(&core_function(&harness.bundle, "opAsync")));
}

#[test]
fn capabilities_are_installed_verbatim() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");

    let from_bundle = |capability: &str, member: &str| {
        harness
            .bundle
            .get(capability)
            .and_then(|object| object.get(member))
            .and_then(|value| value.as_function().cloned())
            .expect("bundle member")
    };
    let installed = |name: &str| {
        context
            .globals()
            .get(name)
            .and_then(JSValue::as_function)
            .cloned()
            .expect("installed global")
    };
    assert!(installed("URL").ptr_eq(&from_bundle(URL, "URL")));
    for name in ["fetch", "Headers", "Request", "Response"] {
        assert!(installed(name).ptr_eq(&from_bundle(FETCH, name)), "{name} was adapted");
    }
}

#[test]
fn no_path_reaches_the_bundle() {
    let harness = harness();
    let weak = Arc::downgrade(&harness.bundle);
    let op_async = core_function(&harness.bundle, "opAsync");
    let raw_print = core_function(&harness.bundle, "print");
    let capability_objects: Vec<_> = harness
        .bundle
        .names()
        .filter_map(|name| harness.bundle.get(name).cloned())
        .collect();

    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");
    let globals = context.globals();
    assert!(!globals.reaches_function(&op_async));
    assert!(!globals.reaches_function(&raw_print));
    for object in &capability_objects {
        assert!(!globals.reaches_object(object));
    }
    assert!(globals.reachable().iter().all(|(path, _)| !path.contains("__bootstrap")));

    drop(capability_objects);
    drop(harness.bundle);
    assert!(weak.upgrade().is_none(), "context kept the bundle alive");
    drop(context);
}

#[test]
fn bundle_is_granted_exactly_once_per_context() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");
    assert_eq!(harness.bundle.grant_count(), 1);

    context
        .call("console.log", vec![JSValue::from("user code")])
        .expect("console.log");
    context
        .call("Flubber.print", vec![JSValue::from("more user code")])
        .expect("print");
    assert_eq!(harness.bundle.grant_count(), 1);
}

#[test]
fn console_levels_route_by_severity() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");

    context.call("console.warn", vec![JSValue::from("disk low")]).expect("warn");
    context.call("console.log", vec![JSValue::from("starting")]).expect("log");
    context.call("console.debug", vec![JSValue::from("details")]).expect("debug");
    context.call("console.info", vec![JSValue::from("ready")]).expect("info");
    context
        .call("console.error", vec![JSValue::from("boom"), JSValue::Number(7.0)])
        .expect("error");

    assert_eq!(harness.output.errors(), vec!["disk low", "boom 7"]);
    assert_eq!(harness.output.standard(), vec!["starting", "details", "ready"]);
}

#[test]
fn print_sends_one_op_with_the_arguments() {
    let mut harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");

    let result = context
        .call("Flubber.print", vec![JSValue::from("hello"), JSValue::Number(42.0)])
        .expect("print returns");
    assert!(matches!(result, JSValue::Undefined));

    let call = harness.receiver.try_recv().expect("one op queued");
    assert_eq!(call.name, PRINT_OP);
    assert_eq!(call.args.len(), 2);
    assert_eq!(call.args[0].as_str(), Some("hello"));
    assert_eq!(call.args[1].as_number(), Some(42.0));
    assert!(harness.receiver.try_recv().is_err(), "exactly one op expected");
    assert!(harness.output.lines().is_empty(), "print must not write synchronously");
}

#[test]
fn print_survives_a_gone_host() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");
    drop(harness.receiver);

    let result = context.call("Flubber.print", vec![JSValue::from("into the void")]);
    assert!(matches!(result, Ok(JSValue::Undefined)));
}

#[test]
fn dispatched_print_reaches_host_output() {
    let mut harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");
    let dispatcher = OpDispatcher::new().with_op(PRINT_OP, op_print(harness.output.clone()));

    context
        .call("Flubber.print", vec![JSValue::from("hello"), JSValue::Number(42.0)])
        .expect("print");
    assert_eq!(dispatcher.drain_pending(&mut harness.receiver), 1);
    assert_eq!(harness.output.standard(), vec!["hello 42"]);
}

#[test]
fn missing_fetch_fails_before_installing_anything() {
    let harness = harness();
    let (sender, _receiver) = op_channel();
    let bundle = build_default_capabilities(harness.output.clone(), sender).without_capability(FETCH);

    let mut globals = GlobalNamespace::new();
    let error = bootstrap(&harness.host, &mut globals, bundle.grant()).expect_err("must fail");
    assert_eq!(error.capability, FETCH);
    assert!(globals.is_empty());
    assert!(!globals.is_initialized());

    assert!(ScriptContext::new(harness.host.clone(), &bundle).is_err());
}

#[test]
fn missing_core_member_is_reported() {
    let harness = harness();
    let (sender, _receiver) = op_channel();
    let bundle = build_default_capabilities(harness.output.clone(), sender)
        .with_capability(CORE, js::HostObject::new());
    let error = ScriptContext::new(harness.host.clone(), &bundle)
        .err()
        .expect("must fail");
    assert_eq!(error.capability, CORE);
    assert_eq!(error.member.as_deref(), Some("opAsync"));
}

#[test]
fn constructors_need_new() {
    let harness = harness();
    let context = ScriptContext::new(harness.host.clone(), &harness.bundle).expect("bootstrap");

    let err = context.call("URL", vec![JSValue::from("https://example.com")]);
    assert!(matches!(err, Err(JSError::TypeError(_))));
    let url = context
        .construct("URL", vec![JSValue::from("https://example.com/a?b=1")])
        .expect("URL");
    let url = url.as_object().expect("object");
    assert_eq!(url.get("search").and_then(|value| value.as_str().map(str::to_owned)).as_deref(), Some("?b=1"));

    let missing = context.call("process.exit", Vec::new());
    assert!(matches!(missing, Err(JSError::TypeError(message)) if message == "process.exit is not defined"));
}
