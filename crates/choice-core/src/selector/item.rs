/*!
# Selector Items

Single-frame predicates. Each item decides whether one call-stack frame
satisfies it and, once matched, what the frame contributes as captures.
*/

use std::fmt;

use tracing::trace;

use crate::{
    class::ClassRef,
    context::ContextRef,
    signature::Kwargs,
    stack::{CallableId, CallableRef, Frame},
    value::Value,
};

/// Predicate over a single call-stack frame
pub trait FramePattern {
    /// Check if this pattern matches the given frame
    fn matches(&self, frame: &Frame) -> bool;
}

/// One step of a selector
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorItem {
    /// The frame is executing exactly this callable
    Callable(CallableRef),

    /// The frame is executing `method` lexically owned by `class` or a subclass
    ClassMethod { class: ClassRef, method: String },

    /// The context is active; the frame itself is not consulted
    Context(ContextRef),

    /// `inner` matches and the frame's bound arguments agree with `expected`
    Match { inner: Box<SelectorItem>, expected: Kwargs },
}

impl SelectorItem {
    pub fn callable(callable: &CallableRef) -> Self {
        SelectorItem::Callable(callable.clone())
    }

    pub fn method(class: &ClassRef, method: &str) -> Self {
        SelectorItem::ClassMethod {
            class: class.clone(),
            method: method.to_string(),
        }
    }

    pub fn context(context: &ContextRef) -> Self {
        SelectorItem::Context(context.clone())
    }

    /// Narrow `inner` to frames whose arguments equal `expected`
    pub fn matching(inner: SelectorItem, expected: Kwargs) -> Self {
        SelectorItem::Match {
            inner: Box::new(inner),
            expected,
        }
    }

    /// Callable this item anchors on, if any
    pub fn callable_id(&self) -> Option<CallableId> {
        match self {
            SelectorItem::Callable(callable) => Some(callable.id()),
            SelectorItem::Match { inner, .. } => inner.callable_id(),
            SelectorItem::ClassMethod { .. } | SelectorItem::Context(_) => None,
        }
    }

    /// Values captured from a frame this item matched
    pub fn capture(&self, frame: &Frame) -> Kwargs {
        frame.capture()
    }

    /// Structural equality that ignores argument-match payloads
    pub fn same_anchor(&self, other: &SelectorItem) -> bool {
        match (self.anchor(), other.anchor()) {
            (SelectorItem::Callable(a), SelectorItem::Callable(b)) => a.id() == b.id(),
            (
                SelectorItem::ClassMethod { class: a, method: ma },
                SelectorItem::ClassMethod { class: b, method: mb },
            ) => a == b && ma == mb,
            (SelectorItem::Context(a), SelectorItem::Context(b)) => a.id() == b.id(),
            _ => false,
        }
    }

    fn anchor(&self) -> &SelectorItem {
        match self {
            SelectorItem::Match { inner, .. } => inner.anchor(),
            other => other,
        }
    }

    fn arguments_agree(frame: &Frame, expected: &Kwargs) -> bool {
        match frame.bind_arguments() {
            Some(Ok(bound)) => equal_subset(expected, &bound),
            Some(Err(err)) => {
                // Unbindable calls only fail on the inner item.
                trace!(frame = %frame.name(), error = %err, "argument binding failed, accepting match");
                true
            }
            None => equal_subset(expected, frame.locals()),
        }
    }
}

fn equal_subset(expected: &Kwargs, actual: &Kwargs) -> bool {
    expected
        .iter()
        .all(|(name, value)| actual.get(name) == Some(value))
}

impl FramePattern for SelectorItem {
    fn matches(&self, frame: &Frame) -> bool {
        match self {
            SelectorItem::Callable(callable) => frame.callable_id() == Some(callable.id()),
            SelectorItem::ClassMethod { class, method } => {
                frame.method_name() == Some(method.as_str())
                    && frame.owner().is_some_and(|owner| owner.is_subclass_of(class))
            }
            SelectorItem::Context(context) => context.is_active(),
            SelectorItem::Match { inner, expected } => {
                inner.matches(frame) && (expected.is_empty() || Self::arguments_agree(frame, expected))
            }
        }
    }
}

impl From<&CallableRef> for SelectorItem {
    fn from(callable: &CallableRef) -> Self {
        SelectorItem::callable(callable)
    }
}

impl From<&ContextRef> for SelectorItem {
    fn from(context: &ContextRef) -> Self {
        SelectorItem::context(context)
    }
}

impl fmt::Display for SelectorItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectorItem::Callable(callable) => write!(f, "{}", callable.name()),
            SelectorItem::ClassMethod { class, method } => write!(f, "{}.{}", class.name(), method),
            SelectorItem::Context(context) => write!(f, "{context}"),
            SelectorItem::Match { inner, expected } => {
                write!(f, "{inner}(")?;
                for (i, (name, value)) in expected.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={}", Value::repr(value))?;
                }
                write!(f, ")")
            }
        }
    }
}
