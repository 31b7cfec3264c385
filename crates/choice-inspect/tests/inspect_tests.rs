use std::sync::Arc;

use choice_core::{kwargs, trace_start, trace_stop, Registry, SelectorSpec, Signature, Trace, Value};
use choice_inspect::{load, render, render_registry, summarize};
use pretty_assertions::assert_eq;
use regex::Regex;

/// Runs `page` twice, once inside the `Formal` context, and returns the trace
fn recorded_trace() -> Trace {
    let registry = Registry::default();
    let greet = registry
        .func(
            "greet",
            Signature::new().param("name").with_default("greeting", "Hello"),
            &["greeting"],
            |args| Ok(Value::from(format!("{} {}", args.str("greeting")?, args.str("name")?))),
        )
        .unwrap();
    let formal = registry
        .implementation(
            &greet,
            "formal_greet",
            Signature::new().param("name").with_default("greeting", "Good day"),
            &["greeting"],
            |args| Ok(Value::from(format!("{}, {}.", args.str("greeting")?, args.str("name")?))),
        )
        .unwrap();
    let callee = Arc::clone(&greet);
    let page = registry
        .func("page", Signature::new(), &[], move |_| {
            Ok(callee.call(vec![Value::from("Ada")])?)
        })
        .unwrap();

    let formal_context = registry.context("Formal");
    registry
        .rule(
            registry
                .selector(&[SelectorSpec::context("Formal"), "greet".into()])
                .unwrap(),
            Some(&formal),
            kwargs([("greeting", "Good evening")]),
        )
        .unwrap();

    trace_start();
    assert_eq!(page.call(Vec::new()).unwrap(), Value::from("Hello Ada"));
    let result = formal_context.scope(|| page.call(Vec::new())).unwrap();
    assert_eq!(result, Value::from("Good evening, Ada."));
    trace_stop()
}

#[test]
fn test_load_saved_trace() {
    let trace = recorded_trace();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("choices.json");
    trace.save(&path).unwrap();

    let loaded = load(&path).unwrap();
    assert_eq!(loaded, trace);
    assert_eq!(render(&loaded, None), trace.to_string());
}

#[test]
fn test_filter_on_implementation() {
    let trace = recorded_trace();
    let filter = Regex::new("formal").unwrap();
    let text = render(&trace, Some(&filter));

    // Only the second page call reached the formal implementation
    assert_eq!(text.matches("page [page]").count(), 1);
    assert!(text.contains("  greet [formal_greet]"));
    assert!(!text.contains("greet [greet]"));
}

#[test]
fn test_summary_of_recorded_trace() {
    let summary = summarize(&recorded_trace());

    assert_eq!(summary.functions["page"].calls, 2);
    assert_eq!(summary.functions["page"].customized, 0);
    let greet = &summary.functions["greet"];
    assert_eq!(greet.calls, 2);
    assert_eq!(greet.customized, 1);
    assert_eq!(greet.implementations["formal_greet"], 1);

    let text = summary.to_string();
    assert!(text.starts_with("page: 2 call(s), 0 customized\n"));
}

#[test]
fn test_registry_listing() {
    let text = render_registry(&recorded_trace());
    assert!(text.contains("greet(name, greeting=\"Hello\")\n"));
    assert!(text.contains("  alt formal_greet(name, greeting=\"Good day\")\n"));
    assert!(text.contains("  rule @Formal > greet => formal_greet (greeting=\"Good evening\")\n"));
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let err = load(dir.path().join("absent.json")).unwrap_err();
    assert!(format!("{err:#}").contains("absent.json"));
}
