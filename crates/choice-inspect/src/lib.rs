//! Reading and rendering saved choice traces

use std::{fmt, path::Path};

use choice_core::{Trace, TraceItem};
use indexmap::IndexMap;
use regex::Regex;

pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Trace> {
    Trace::load(path)
}

/// Render the trace tree, keeping only branches that mention `filter`
///
/// A node is kept when its function or implementation name matches, or
/// when any of its descendants is kept.
pub fn render(trace: &Trace, filter: Option<&Regex>) -> String {
    let Some(filter) = filter else {
        return trace.to_string();
    };
    let filtered = Trace {
        items: trace
            .items
            .iter()
            .filter_map(|item| filter_item(item, filter))
            .collect(),
        ..trace.clone()
    };
    filtered.to_string()
}

fn filter_item(item: &TraceItem, filter: &Regex) -> Option<TraceItem> {
    let children: Vec<TraceItem> = item
        .items
        .iter()
        .filter_map(|child| filter_item(child, filter))
        .collect();
    let matches = filter.is_match(&item.function) || filter.is_match(&item.implementation);
    if !matches && children.is_empty() {
        return None;
    }
    Some(TraceItem {
        items: children,
        ..item.clone()
    })
}

/// List the functions saved alongside the trace, with their alternates and rules
pub fn render_registry(trace: &Trace) -> String {
    let mut text = String::new();
    for record in &trace.registry {
        text.push_str(&format!("{}{}\n", record.name, record.interface.signature));
        for alternate in &record.alternates {
            text.push_str(&format!("  alt {}{}\n", alternate.name, alternate.signature));
        }
        for rule in &record.rules {
            let target = rule.implementation.as_deref().unwrap_or(&record.name);
            match &rule.kwargs {
                Some(kwargs) if !kwargs.is_empty() => {
                    let overrides: Vec<String> = kwargs.iter().map(|(key, value)| format!("{key}={}", value.repr())).collect();
                    text.push_str(&format!("  rule {} => {target} ({})\n", rule.selector, overrides.join(", ")));
                }
                Some(_) => text.push_str(&format!("  rule {} => {target}\n", rule.selector)),
                None => text.push_str(&format!("  rule {} => <dynamic>\n", rule.selector)),
            }
        }
    }
    text
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionSummary {
    pub calls: usize,
    /// Times each implementation was chosen
    pub implementations: IndexMap<String, usize>,
    /// Calls where at least one rule applied
    pub customized: usize,
}

/// Per-function call counts, in first-call order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub functions: IndexMap<String, FunctionSummary>,
}

pub fn summarize(trace: &Trace) -> Summary {
    let mut summary = Summary::default();
    for item in trace.walk() {
        let entry = summary.functions.entry(item.function.clone()).or_default();
        entry.calls += 1;
        *entry
            .implementations
            .entry(item.implementation.clone())
            .or_default() += 1;
        if !item.rules.is_empty() {
            entry.customized += 1;
        }
    }
    summary
}

impl Summary {
    pub fn to_json(&self) -> serde_json::Value {
        let functions: serde_json::Map<String, serde_json::Value> = self
            .functions
            .iter()
            .map(|(name, function)| {
                (
                    name.clone(),
                    serde_json::json!({
                        "calls": function.calls,
                        "customized": function.customized,
                        "implementations": function.implementations,
                    }),
                )
            })
            .collect();
        serde_json::Value::Object(functions)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, function) in &self.functions {
            writeln!(
                f,
                "{name}: {} call(s), {} customized",
                function.calls, function.customized
            )?;
            for (implementation, count) in &function.implementations {
                writeln!(f, "  {implementation}: {count}")?;
            }
        }
        Ok(())
    }
}
