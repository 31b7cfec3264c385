use std::{fmt, sync::Arc};

use crate::stack::{self, Frame, FrameGuard};

#[derive(Debug)]
struct ClassDef {
    name: String,
    bases: Vec<ClassRef>,
}

/// Shared class descriptor used by method frames and class-method selectors
///
/// Two handles are the same class only if they share one definition;
/// [`Registry::class`](crate::Registry::class) interns definitions by name.
#[derive(Clone)]
pub struct ClassRef(Arc<ClassDef>);

impl ClassRef {
    pub fn new(name: &str) -> Self {
        Self::with_bases(name, &[])
    }

    pub fn with_bases(name: &str, bases: &[ClassRef]) -> Self {
        Self(Arc::new(ClassDef {
            name: name.to_string(),
            bases: bases.to_vec(),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn bases(&self) -> &[ClassRef] {
        &self.0.bases
    }

    /// True if this class is `other` or inherits from it through any base
    pub fn is_subclass_of(&self, other: &ClassRef) -> bool {
        self == other || self.bases().iter().any(|base| base.is_subclass_of(other))
    }

    /// Push a frame for `method` defined on this class
    pub fn enter_method(&self, method: &str) -> FrameGuard {
        stack::enter(Frame::method(self, method))
    }

    /// Run `f` as the body of `method` defined on this class
    pub fn call_method<R>(&self, method: &str, f: impl FnOnce() -> R) -> R {
        let _frame = self.enter_method(method);
        f()
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassRef {}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bases: Vec<&str> = self.bases().iter().map(ClassRef::name).collect();
        f.debug_struct("ClassRef")
            .field("name", &self.name())
            .field("bases", &bases)
            .finish()
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subclass_walks_all_bases() {
        let base = ClassRef::new("Base");
        let mixin = ClassRef::new("Mixin");
        let middle = ClassRef::with_bases("Middle", &[base.clone()]);
        let leaf = ClassRef::with_bases("Leaf", &[mixin.clone(), middle.clone()]);

        assert!(leaf.is_subclass_of(&leaf));
        assert!(leaf.is_subclass_of(&middle));
        assert!(leaf.is_subclass_of(&base));
        assert!(leaf.is_subclass_of(&mixin));
        assert!(!base.is_subclass_of(&leaf));
    }

    #[test]
    fn test_identity_is_by_definition() {
        assert_ne!(ClassRef::new("Base"), ClassRef::new("Base"));
        let base = ClassRef::new("Base");
        assert_eq!(base.clone(), base);
    }
}
