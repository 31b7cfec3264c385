/*!
# Registry

Owns every choice function and interns the plain identities (callables,
classes and contexts) that selectors refer to by name. Registration happens
up front; invocation only reads.
*/

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{
    class::ClassRef,
    context::ContextRef,
    function::{body, ChoiceFunction, ImplBody, ImplRef, Implementation},
    rule::{Rule, RuleOutcome},
    selector::{Captures, Selector, SelectorItem},
    signature::{BoundArgs, Kwargs, Signature},
    stack::{CallableId, CallableRef},
    value::Value,
    ChoiceConfig, ChoiceError, Result,
};

/// Name-based description of one selector item
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorSpec {
    /// A registered choice function or plain callable
    Name(String),
    /// `method` on a registered class or its subclasses
    Method { class: String, method: String },
    /// A registered context
    Context(String),
    /// `inner` narrowed to frames whose arguments equal `kwargs`
    Match { inner: Box<SelectorSpec>, kwargs: Kwargs },
}

impl SelectorSpec {
    pub fn method(class: &str, method: &str) -> Self {
        SelectorSpec::Method {
            class: class.to_string(),
            method: method.to_string(),
        }
    }

    pub fn context(name: &str) -> Self {
        SelectorSpec::Context(name.to_string())
    }

    pub fn matching(inner: impl Into<SelectorSpec>, kwargs: Kwargs) -> Self {
        SelectorSpec::Match {
            inner: Box::new(inner.into()),
            kwargs,
        }
    }
}

impl From<&str> for SelectorSpec {
    fn from(name: &str) -> Self {
        SelectorSpec::Name(name.to_string())
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

/// Process-wide set of choice functions and named identities
#[derive(Debug, Default)]
pub struct Registry {
    config: ChoiceConfig,
    functions: DashMap<String, Arc<ChoiceFunction>>,
    by_callable: DashMap<CallableId, Arc<ChoiceFunction>>,
    callables: DashMap<String, CallableRef>,
    classes: DashMap<String, ClassRef>,
    contexts: DashMap<String, ContextRef>,
}

impl Registry {
    pub fn new(config: ChoiceConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Lazily created registry with the default configuration
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::default)
    }

    pub fn config(&self) -> &ChoiceConfig {
        &self.config
    }

    /// Register a choice function whose interface runs `f`
    ///
    /// Nothing is registered if a choice argument is not a parameter.
    pub fn func<F>(&self, name: &str, signature: Signature, choice_args: &[&str], f: F) -> Result<Arc<ChoiceFunction>>
    where
        F: Fn(&BoundArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let interface = Implementation::new(name, signature, choice_args, body(f))?;
        Ok(self.insert(ChoiceFunction::new(interface, self.config.clone())))
    }

    /// Register a prepared interface implementation as a choice function
    pub fn insert(&self, function: ChoiceFunction) -> Arc<ChoiceFunction> {
        let function = Arc::new(function);
        let name = function.name().to_string();
        if self.functions.contains_key(&name) {
            warn!(function = %name, "replacing registered choice function");
        }
        self.callables.insert(name.clone(), function.callable().clone());
        self.by_callable
            .insert(function.callable().id(), Arc::clone(&function));
        self.functions.insert(name, Arc::clone(&function));
        debug!(function = %function, "registered choice function");
        function
    }

    /// Register an alternate implementation of `target`
    pub fn implementation<F>(
        &self,
        target: &ChoiceFunction,
        name: &str,
        signature: Signature,
        choice_args: &[&str],
        f: F,
    ) -> Result<ImplRef>
    where
        F: Fn(&BoundArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.wrap(target, name, signature, choice_args, body(f))
    }

    /// Register an existing body as an alternate implementation of `target`
    pub fn wrap(
        &self,
        target: &ChoiceFunction,
        name: &str,
        signature: Signature,
        choice_args: &[&str],
        body: ImplBody,
    ) -> Result<ImplRef> {
        let implementation = Implementation::new(name, signature, choice_args, body)?;
        Ok(target.add_alternate(implementation))
    }

    /// Intern a plain callable by name
    pub fn callable(&self, name: &str) -> CallableRef {
        self.callables
            .entry(name.to_string())
            .or_insert_with(|| CallableRef::new(name))
            .value()
            .clone()
    }

    /// Intern a class; bases only apply the first time a name is seen
    pub fn class(&self, name: &str, bases: &[ClassRef]) -> ClassRef {
        self.classes
            .entry(name.to_string())
            .or_insert_with(|| ClassRef::with_bases(name, bases))
            .value()
            .clone()
    }

    pub fn context(&self, name: &str) -> ContextRef {
        self.contexts
            .entry(name.to_string())
            .or_insert_with(|| ContextRef::new(name))
            .value()
            .clone()
    }

    pub fn function(&self, name: &str) -> Option<Arc<ChoiceFunction>> {
        self.functions.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn functions(&self) -> Vec<Arc<ChoiceFunction>> {
        self.functions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// The choice function a selector's last item names
    pub fn target(&self, selector: &Selector) -> Result<Arc<ChoiceFunction>> {
        let last = selector.last().ok_or_else(|| ChoiceError::NonFunction {
            item: "<empty selector>".to_string(),
        })?;
        last.callable_id()
            .and_then(|id| self.by_callable.get(&id).map(|entry| Arc::clone(entry.value())))
            .ok_or_else(|| ChoiceError::NonFunction { item: last.to_string() })
    }

    /// Add a fixed rule to the function named by the selector's last item
    pub fn rule(&self, selector: Selector, implementation: Option<&ImplRef>, kwargs: Kwargs) -> Result<()> {
        let target = self.target(&selector)?;
        target.add_rule(Rule::fixed(selector, implementation.cloned(), kwargs));
        Ok(())
    }

    /// Add a rule computed from the captured values along the matched chain
    pub fn def_rule<F>(&self, selector: Selector, doc: Option<&str>, producer: F) -> Result<()>
    where
        F: Fn(&[Captures]) -> RuleOutcome + Send + Sync + 'static,
    {
        let target = self.target(&selector)?;
        let mut rule = Rule::new(selector, Arc::new(producer));
        if let Some(doc) = doc {
            rule = rule.with_doc(doc);
        }
        target.add_rule(rule);
        Ok(())
    }

    /// Build a selector from registered names
    pub fn selector(&self, specs: &[SelectorSpec]) -> Result<Selector> {
        specs
            .iter()
            .map(|spec| self.selector_item(spec))
            .collect::<Result<Vec<_>>>()
            .map(Selector::new)
    }

    fn selector_item(&self, spec: &SelectorSpec) -> Result<SelectorItem> {
        let invalid = |item: String| ChoiceError::InvalidSelectorItem { item };
        match spec {
            SelectorSpec::Name(name) => self
                .callables
                .get(name)
                .map(|entry| SelectorItem::callable(entry.value()))
                .ok_or_else(|| invalid(name.clone())),
            SelectorSpec::Method { class, method } => self
                .classes
                .get(class)
                .map(|entry| SelectorItem::method(entry.value(), method))
                .ok_or_else(|| invalid(format!("{class}.{method}"))),
            SelectorSpec::Context(name) => self
                .contexts
                .get(name)
                .map(|entry| SelectorItem::context(entry.value()))
                .ok_or_else(|| invalid(format!("@{name}"))),
            SelectorSpec::Match { inner, kwargs } => {
                let inner = self.selector_item(inner)?;
                Ok(SelectorItem::matching(inner, kwargs.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::kwargs;

    fn registry_with_greet() -> (Registry, Arc<ChoiceFunction>) {
        let registry = Registry::default();
        let greet = registry
            .func(
                "greet",
                Signature::new().param("name").with_default("greeting", "Hello"),
                &["greeting"],
                |args| Ok(Value::from(format!("{} {}", args.str("greeting")?, args.str("name")?))),
            )
            .unwrap();
        (registry, greet)
    }

    #[test]
    fn test_failed_registration_leaves_no_entry() {
        let registry = Registry::default();
        let err = registry
            .func("broken", Signature::new().param("name"), &["missing_arg"], |_| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(err, ChoiceError::MissingChoiceArg { .. }));
        assert!(registry.function("broken").is_none());
        assert!(registry.functions().is_empty());
    }

    #[test]
    fn test_function_name_resolves_as_callable() {
        let (registry, greet) = registry_with_greet();
        assert_eq!(registry.callable("greet").id(), greet.callable().id());
    }

    #[test]
    fn test_rule_needs_function_target() {
        let (registry, _greet) = registry_with_greet();
        let app = registry.callable("app");
        let err = registry
            .rule(Selector::new(vec![SelectorItem::callable(&app)]), None, Kwargs::new())
            .unwrap_err();
        assert!(matches!(err, ChoiceError::NonFunction { ref item } if item == "app"));

        let err = registry.rule(Selector::default(), None, Kwargs::new()).unwrap_err();
        assert!(matches!(err, ChoiceError::NonFunction { .. }));
    }

    #[test]
    fn test_selector_from_names() {
        let (registry, greet) = registry_with_greet();
        registry.callable("app");
        registry.class("Suite", &[]);
        registry.context("Debug");

        let selector = registry
            .selector(&[
                "app".into(),
                SelectorSpec::method("Suite", "test_case"),
                SelectorSpec::context("Debug"),
                SelectorSpec::matching("greet", kwargs([("name", "me")])),
            ])
            .unwrap();
        assert_eq!(selector.len(), 4);
        assert_eq!(selector.to_string(), r#"app > Suite.test_case > @Debug > greet(name="me")"#);
        assert_eq!(registry.target(&selector).unwrap().id(), greet.id());
    }

    #[test]
    fn test_selector_rejects_unknown_names() {
        let (registry, _greet) = registry_with_greet();
        let err = registry.selector(&["nowhere".into()]).unwrap_err();
        assert!(matches!(err, ChoiceError::InvalidSelectorItem { ref item } if item == "nowhere"));

        let err = registry.selector(&[SelectorSpec::context("Formal")]).unwrap_err();
        assert!(matches!(err, ChoiceError::InvalidSelectorItem { ref item } if item == "@Formal"));
    }

    #[test]
    fn test_classes_are_interned() {
        let registry = Registry::default();
        let base = registry.class("Base", &[]);
        let child = registry.class("Child", &[base.clone()]);
        assert_eq!(registry.class("Child", &[]), child);
        assert!(child.is_subclass_of(&base));
    }
}
