//! Scoped contexts
//!
//! A context is a named marker that is active between `enter()` and the drop
//! of the returned guard. Activity is tracked per thread with a nesting
//! count, so a selector item waiting on a context only observes contexts
//! entered on its own call stack.

use std::{cell::RefCell, collections::HashMap, fmt, marker::PhantomData, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::stack::CHOICE_NAMESPACE;

thread_local! {
    static ACTIVE_CONTEXTS: RefCell<HashMap<ContextId, usize>> = RefCell::new(HashMap::new());
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub Uuid);

/// Handle to a named scoped context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextRef {
    id: ContextId,
    name: Arc<str>,
}

impl ContextRef {
    pub fn new(name: &str) -> Self {
        let qualified = format!("context:{name}");
        Self {
            id: ContextId(Uuid::new_v5(&CHOICE_NAMESPACE, qualified.as_bytes())),
            name: Arc::from(name),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this context is entered on the current thread
    pub fn is_active(&self) -> bool {
        ACTIVE_CONTEXTS.with(|active| active.borrow().contains_key(&self.id))
    }

    /// Activate the context until the guard drops
    pub fn enter(&self) -> ContextGuard {
        ACTIVE_CONTEXTS.with(|active| {
            *active.borrow_mut().entry(self.id).or_insert(0) += 1;
        });
        trace!(context = %self.name, "context entered");
        ContextGuard {
            id: self.id,
            _not_send: PhantomData,
        }
    }

    /// Run `f` with the context active
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let _active = self.enter();
        f()
    }
}

impl fmt::Display for ContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)
    }
}

/// Deactivates its context when dropped, including during unwinding
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ContextGuard {
    id: ContextId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ACTIVE_CONTEXTS.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(count) = active.get_mut(&self.id) {
                *count -= 1;
                if *count == 0 {
                    active.remove(&self.id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_entry_stays_active() {
        let debug = ContextRef::new("Debug");
        assert!(!debug.is_active());
        {
            let _outer = debug.enter();
            {
                let _inner = debug.enter();
                assert!(debug.is_active());
            }
            assert!(debug.is_active());
        }
        assert!(!debug.is_active());
    }

    #[test]
    fn test_contexts_are_independent() {
        let debug = ContextRef::new("Debug");
        let formal = ContextRef::new("Formal");
        debug.scope(|| {
            assert!(debug.is_active());
            assert!(!formal.is_active());
        });
    }

    #[test]
    fn test_exit_on_panic() {
        let debug = ContextRef::new("Debug");
        let result = std::panic::catch_unwind(|| debug.scope(|| {
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!debug.is_active());
    }

    #[test]
    fn test_not_visible_from_other_threads() {
        let debug = ContextRef::new("Debug");
        let _active = debug.enter();
        let other = debug.clone();
        let seen = std::thread::spawn(move || other.is_active()).join().unwrap();
        assert!(!seen);
        assert!(debug.is_active());
    }
}
