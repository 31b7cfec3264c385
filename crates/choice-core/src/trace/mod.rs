/*!
# Choice Tracing

Records which implementation each choice function call resolved to, which
rules took part and the arguments involved. Nodes nest the same way the
calls do.

A session is started with [`start`] and collected with [`stop`]. While it is
active every invocation opens a node through [`call_begin`]; the returned
[`TraceGuard`] closes it when dropped, so error returns and panics unwinding
out of an implementation leave the node stack balanced.

Sessions are per thread. Starting a new session discards any nodes still
open from the previous one, and guards left over from it are ignored.
*/

pub mod export;

use std::cell::{Cell, RefCell};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    function::{ChoiceFunction, FunctionId, ImplId, Implementation},
    rule::MatchedRule,
    signature::Kwargs,
    stack::Stack,
    value::Value,
    ChoiceError, Result,
};

pub use export::{FunctionRecord, ImplRecord, RuleSummary};

thread_local! {
    static SESSION: RefCell<Option<Session>> = const { RefCell::new(None) };
    static GENERATION: Cell<u64> = const { Cell::new(0) };
}

/// A rule as it took part in one resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub selector: String,
    pub implementation: Option<String>,
    pub kwargs: Kwargs,
    pub doc: Option<String>,
}

impl From<&MatchedRule> for RuleRecord {
    fn from(rule: &MatchedRule) -> Self {
        Self {
            selector: rule.selector().to_string(),
            implementation: rule.implementation.as_ref().map(|i| i.name().to_string()),
            kwargs: rule.kwargs.clone(),
            doc: rule.rule.doc().map(str::to_string),
        }
    }
}

/// One recorded choice function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceItem {
    pub function: String,
    pub function_id: FunctionId,
    pub implementation: String,
    pub implementation_id: ImplId,
    /// Surviving rules, least specific first
    pub rules: Vec<RuleRecord>,
    /// Frames at call time, innermost first
    #[serde(default)]
    pub stack: Vec<String>,
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
    pub choice_kwargs: Kwargs,
    #[serde(default)]
    pub items: Vec<TraceItem>,
}

impl TraceItem {
    pub fn new(
        function: &ChoiceFunction,
        implementation: &Implementation,
        rules: &[MatchedRule],
        stack: Option<&Stack>,
        args: &[Value],
        kwargs: &Kwargs,
        choice_kwargs: &Kwargs,
    ) -> Self {
        Self {
            function: function.name().to_string(),
            function_id: function.id(),
            implementation: implementation.name().to_string(),
            implementation_id: implementation.id(),
            rules: rules.iter().map(RuleRecord::from).collect(),
            stack: stack.map(Stack::describe).unwrap_or_default(),
            args: args.to_vec(),
            kwargs: kwargs.clone(),
            choice_kwargs: choice_kwargs.clone(),
            items: Vec::new(),
        }
    }

    /// This node and all of its descendants, depth first
    pub fn walk(&self) -> Vec<&TraceItem> {
        let mut nodes = vec![self];
        for item in &self.items {
            nodes.extend(item.walk());
        }
        nodes
    }
}

/// Node stack of an active session
#[derive(Debug, Default)]
pub struct Tracing {
    items: Vec<TraceItem>,
    stack: Vec<TraceItem>,
}

impl Tracing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, item: TraceItem) {
        self.stack.push(item);
    }

    /// Close the innermost open node, attaching it to its parent
    pub fn end(&mut self) -> Result<()> {
        let ended = self.stack.pop().ok_or(ChoiceError::MismatchedTrace)?;
        match self.stack.last_mut() {
            Some(parent) => parent.items.push(ended),
            None => self.items.push(ended),
        }
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn items(&self) -> &[TraceItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<TraceItem> {
        self.items
    }
}

struct Session {
    generation: u64,
    started_at: DateTime<Utc>,
    tracing: Tracing,
    functions: IndexMap<FunctionId, FunctionRecord>,
}

/// A finished trace session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub items: Vec<TraceItem>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    /// Summary of every function that appears in `items`
    #[serde(default)]
    pub registry: Vec<FunctionRecord>,
}

impl Trace {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every recorded node, depth first
    pub fn walk(&self) -> Vec<&TraceItem> {
        self.items.iter().flat_map(TraceItem::walk).collect()
    }
}

/// Begin a session on this thread, discarding any previous one
pub fn start() {
    let generation = GENERATION.with(|g| {
        g.set(g.get() + 1);
        g.get()
    });
    let previous = SESSION.with(|session| {
        session.borrow_mut().replace(Session {
            generation,
            started_at: Utc::now(),
            tracing: Tracing::new(),
            functions: IndexMap::new(),
        })
    });
    if let Some(previous) = previous {
        debug!(open = previous.tracing.depth(), "discarded unterminated trace session");
    }
    debug!(generation, "trace session started");
}

/// End the session and return what it recorded
///
/// Nodes still open are dropped. Without an active session the trace is empty.
pub fn stop() -> Trace {
    let Some(session) = SESSION.with(|session| session.borrow_mut().take()) else {
        return Trace::default();
    };
    debug!(
        generation = session.generation,
        items = session.tracing.items().len(),
        "trace session stopped"
    );
    Trace {
        items: session.tracing.into_items(),
        started_at: Some(session.started_at),
        stopped_at: Some(Utc::now()),
        registry: session.functions.into_values().collect(),
    }
}

pub fn is_active() -> bool {
    SESSION.with(|session| session.borrow().is_some())
}

/// Open a node for a call of `function` if a session is active
///
/// `make` runs outside the session borrow and only when recording.
pub fn call_begin(function: &ChoiceFunction, make: impl FnOnce() -> TraceItem) -> Option<TraceGuard> {
    if !is_active() {
        return None;
    }
    let item = make();
    SESSION.with(|session| {
        let mut session = session.borrow_mut();
        let session = session.as_mut()?;
        session
            .functions
            .entry(function.id())
            .or_insert_with(|| FunctionRecord::from(function));
        session.tracing.begin(item);
        Some(TraceGuard {
            generation: session.generation,
        })
    })
}

/// Closes a trace node when dropped
#[must_use = "the trace node is closed as soon as the guard is dropped"]
pub struct TraceGuard {
    generation: u64,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        SESSION.with(|session| {
            let mut session = session.borrow_mut();
            let Some(session) = session.as_mut() else {
                return;
            };
            if session.generation != self.generation {
                return;
            }
            if let Err(err) = session.tracing.end() {
                error!(error = %err, "trace node stack out of balance");
                // A second panic while unwinding would abort the process.
                if !std::thread::panicking() {
                    panic!("{err}");
                }
            }
        });
    }
}
