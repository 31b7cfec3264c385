//! # Choice Core
//!
//! Runtime rule matching for customizable functions, including:
//! - Selectors: linear patterns over the call stack, anchored at the innermost frame
//! - Specificity ordering of matching selectors relative to one observed stack
//! - Rule resolution that picks an implementation and composes keyword overrides
//! - A call-scoped trace recorder mirroring nested resolutions
//!
//! The host call stack is never inspected. Every choice function invocation
//! pushes a [`Frame`] onto an explicit thread-local call stack, and plain
//! functions, methods and scoped contexts opt in through guards.
//!
//! ```rust,no_run
//! use choice_core::{kwargs, Registry, Selector, SelectorItem, Signature, Value};
//!
//! # fn main() -> choice_core::Result<()> {
//! let registry = Registry::default();
//! let greet = registry.func(
//!     "greet",
//!     Signature::new().param("name").with_default("greeting", "Hello"),
//!     &["greeting"],
//!     |args| Ok(Value::from(format!("{} {}", args.str("greeting")?, args.str("name")?))),
//! )?;
//!
//! let app = registry.callable("app");
//! registry.rule(
//!     Selector::new(vec![SelectorItem::callable(&app), greet.selector_item()]),
//!     None,
//!     kwargs([("greeting", "Hi")]),
//! )?;
//!
//! let greeting = app.call(|| greet.call(vec![Value::from("me")]))?;
//! assert_eq!(greeting, Value::from("Hi me"));
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod class;
pub mod context;
pub mod function;
pub mod registry;
pub mod rule;
pub mod selector;
pub mod signature;
pub mod stack;
pub mod trace;
pub mod value;

// Re-export commonly used types
pub use class::ClassRef;
pub use context::{ContextGuard, ContextRef};
pub use function::{body, ChoiceFunction, FunctionId, ImplBody, ImplId, ImplRef, Implementation};
pub use registry::{Registry, SelectorSpec};
pub use rule::{MatchedRule, Rule, RuleKind, RuleOutcome, RuleProducer};
pub use selector::{poset::SelectorPoset, Captures, FramePattern, Selector, SelectorItem};
pub use signature::{kwargs, BindError, BoundArgs, Kwargs, Param, Signature};
pub use stack::{CallableId, CallableRef, Frame, FrameCode, FrameGuard, Stack};
pub use trace::{FunctionRecord, RuleRecord, Trace, TraceItem};
pub use value::Value;

/// Choice library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Begin recording choice function calls on the current thread.
pub fn trace_start() {
    trace::start();
}

/// Stop recording and return everything collected since [`trace_start`].
pub fn trace_stop() -> Trace {
    trace::stop()
}

/// Initialize tracing for choice core components
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("choice_core=info"));
    // A subscriber may already be installed by the host application.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Runtime configuration shared by every function in a [`Registry`]
#[derive(Debug, Clone)]
pub struct ChoiceConfig {
    /// Maximum depth of the explicit call stack before an invocation fails
    pub max_call_depth: usize,
    /// Record the stack snapshot in each trace node
    pub record_stack: bool,
}

impl Default for ChoiceConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1000,
            record_stack: true,
        }
    }
}

/// Error types for choice operations
#[derive(thiserror::Error, Debug)]
pub enum ChoiceError {
    /// A declared choice argument is not a parameter of the function
    #[error("The function {function} is missing the expected choice kwarg {arg}")]
    MissingChoiceArg { function: String, arg: String },

    /// A selector referenced something that cannot be a selector item
    #[error("Invalid selector item: {item}")]
    InvalidSelectorItem { item: String },

    /// The final selector term does not name a choice function
    #[error("Expected a choice function for the final term in a selector, got {item}")]
    NonFunction { item: String },

    /// A rule resolved to an implementation the target does not know
    #[error("Rule for {function} resolved to unknown implementation {implementation}")]
    NonRule {
        function: String,
        implementation: String,
    },

    /// `end` was recorded without a matching `begin`
    #[error("Mismatched choice trace end call")]
    MismatchedTrace,

    /// The final arguments could not be bound to the implementation
    #[error("Argument binding failed: {0}")]
    Binding(#[from] BindError),

    /// The explicit call stack grew past the configured limit
    #[error("Maximum call depth of {limit} exceeded")]
    DepthExceeded { limit: usize },

    /// Error raised by an implementation body
    #[error(transparent)]
    Implementation(#[from] anyhow::Error),
}

/// Result type for choice operations
pub type Result<T> = std::result::Result<T, ChoiceError>;
