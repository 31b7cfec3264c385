//! Explicit call-context stack
//!
//! Choice functions never reflect on the host call stack. Instead every
//! participating call pushes a [`Frame`] onto a thread-local stack and pops it
//! when its [`FrameGuard`] drops, so unwinding out of a call leaves the stack
//! consistent. A [`Stack`] is an immutable snapshot of that stack, innermost
//! frame first, taken fresh for each resolution.

use std::{cell::RefCell, fmt, marker::PhantomData, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::{
    class::ClassRef,
    signature::{BindError, Kwargs, Signature},
    value::Value,
    ChoiceError, Result,
};

/// Namespace for name-derived identities
pub(crate) const CHOICE_NAMESPACE: Uuid = Uuid::from_u128(0xe7221d32_4940_4c49_b0e3_5f03446226ab);

thread_local! {
    static CALL_STACK: RefCell<Vec<Arc<Frame>>> = const { RefCell::new(Vec::new()) };
    static ROOT_FRAME: Arc<Frame> = Arc::new(Frame::root());
}

/// Code identity of a plain callable or choice function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallableId(pub Uuid);

impl CallableId {
    /// Identity derived from a qualified name; equal names give equal ids
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&CHOICE_NAMESPACE, name.as_bytes()))
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}", &self.0.to_string()[..8])
    }
}

/// Handle to a function that can appear on the call stack
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallableRef {
    id: CallableId,
    name: Arc<str>,
}

impl CallableRef {
    pub fn new(name: &str) -> Self {
        Self {
            id: CallableId::from_name(name),
            name: Arc::from(name),
        }
    }

    pub fn id(&self) -> CallableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A frame for this callable, ready for locals or arguments
    pub fn frame(&self) -> Frame {
        Frame::callable(self)
    }

    /// Push a frame for this callable until the guard drops
    pub fn enter(&self) -> FrameGuard {
        enter(self.frame())
    }

    /// Run `f` as if it were the body of this callable
    pub fn call<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = self.enter();
        f()
    }
}

/// What a frame is executing
#[derive(Debug, Clone, PartialEq)]
pub enum FrameCode {
    Callable(CallableRef),
    /// A method, with the class that lexically owns its code
    Method { owner: ClassRef, name: String },
    /// Outermost frame of every thread; only context items match it
    Root,
}

/// One call-stack descriptor
#[derive(Debug, Clone)]
pub struct Frame {
    code: FrameCode,
    args: Vec<Value>,
    kwargs: Kwargs,
    locals: Kwargs,
    signature: Option<Arc<Signature>>,
}

impl Frame {
    pub fn callable(callable: &CallableRef) -> Self {
        Self::with_code(FrameCode::Callable(callable.clone()))
    }

    pub fn method(owner: &ClassRef, name: &str) -> Self {
        Self::with_code(FrameCode::Method {
            owner: owner.clone(),
            name: name.to_string(),
        })
    }

    pub fn root() -> Self {
        Self::with_code(FrameCode::Root)
    }

    fn with_code(code: FrameCode) -> Self {
        Self {
            code,
            args: Vec::new(),
            kwargs: Kwargs::new(),
            locals: Kwargs::new(),
            signature: None,
        }
    }

    /// Record the call's arguments; they are also visible as raw locals
    pub fn with_args(mut self, args: Vec<Value>, kwargs: Kwargs) -> Self {
        for (name, value) in &kwargs {
            self.locals.insert(name.clone(), value.clone());
        }
        self.locals.insert("args".to_string(), Value::List(args.clone()));
        self.args = args;
        self.kwargs = kwargs;
        self
    }

    pub fn with_local(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.locals.insert(name.to_string(), value.into());
        self
    }

    /// Declared parameters used to bind this frame's arguments on capture
    pub fn with_signature(mut self, signature: Arc<Signature>) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn code(&self) -> &FrameCode {
        &self.code
    }

    pub fn callable_id(&self) -> Option<CallableId> {
        match &self.code {
            FrameCode::Callable(callable) => Some(callable.id()),
            FrameCode::Method { .. } | FrameCode::Root => None,
        }
    }

    pub fn method_name(&self) -> Option<&str> {
        match &self.code {
            FrameCode::Method { name, .. } => Some(name),
            FrameCode::Callable(_) | FrameCode::Root => None,
        }
    }

    pub fn owner(&self) -> Option<&ClassRef> {
        match &self.code {
            FrameCode::Method { owner, .. } => Some(owner),
            FrameCode::Callable(_) | FrameCode::Root => None,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.code, FrameCode::Root)
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    pub fn locals(&self) -> &Kwargs {
        &self.locals
    }

    /// Bind the frame's arguments against its signature, if it has one
    pub fn bind_arguments(&self) -> Option<std::result::Result<Kwargs, BindError>> {
        self.signature
            .as_ref()
            .map(|signature| signature.bind(&self.args, &self.kwargs))
    }

    /// Named values visible in this frame
    ///
    /// Bound arguments with defaults applied when the frame carries a
    /// signature, otherwise (or when binding fails) the raw locals.
    pub fn capture(&self) -> Kwargs {
        match self.bind_arguments() {
            Some(Ok(bound)) => bound,
            Some(Err(err)) => {
                trace!(frame = %self.name(), error = %err, "binding failed, capturing raw locals");
                self.locals.clone()
            }
            None => self.locals.clone(),
        }
    }

    /// Short name: `func` or `Class.method`
    pub fn name(&self) -> String {
        match &self.code {
            FrameCode::Callable(callable) => callable.name().to_string(),
            FrameCode::Method { owner, name } => format!("{}.{}", owner.name(), name),
            FrameCode::Root => "<root>".to_string(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name())?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", arg.repr())?;
        }
        for (name, value) in &self.kwargs {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{name}={}", value.repr())?;
        }
        write!(f, ")")
    }
}

/// Pops its frame from the thread's call stack when dropped
#[must_use = "the frame is popped as soon as the guard is dropped"]
pub struct FrameGuard {
    depth: usize,
    // Frames belong to the thread that pushed them.
    _not_send: PhantomData<*const ()>,
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        CALL_STACK.with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// Push a frame onto the current thread's call stack
pub fn enter(frame: Frame) -> FrameGuard {
    CALL_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let depth = stack.len();
        stack.push(Arc::new(frame));
        FrameGuard {
            depth,
            _not_send: PhantomData,
        }
    })
}

/// Push a frame, failing if the stack already holds `limit` frames
pub fn enter_checked(frame: Frame, limit: usize) -> Result<FrameGuard> {
    if depth() >= limit {
        return Err(ChoiceError::DepthExceeded { limit });
    }
    Ok(enter(frame))
}

/// Number of frames on the current thread's call stack
pub fn depth() -> usize {
    CALL_STACK.with(|stack| stack.borrow().len())
}

/// Snapshot of a call stack, innermost frame first
#[derive(Debug, Clone, Default)]
pub struct Stack {
    frames: Vec<Arc<Frame>>,
}

impl Stack {
    /// Build a stack from frames listed innermost first
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into_iter().map(Arc::new).collect(),
        }
    }

    /// Snapshot the current thread's call stack, ending with its root frame
    pub fn current() -> Self {
        let mut frames: Vec<Arc<Frame>> = CALL_STACK.with(|stack| stack.borrow().iter().rev().cloned().collect());
        frames.push(ROOT_FRAME.with(Arc::clone));
        Self { frames }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().map(Arc::as_ref)
    }

    pub fn innermost(&self) -> Option<&Frame> {
        self.frames.first().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// One line per call frame, innermost first
    pub fn describe(&self) -> Vec<String> {
        self.iter()
            .filter(|frame| !frame.is_root())
            .map(ToString::to_string)
            .collect()
    }
}
