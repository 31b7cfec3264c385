/*!
# Choice Functions

A [`ChoiceFunction`] is a customizable function: an interface implementation
that runs by default, alternate implementations that rules may switch to,
and the rules themselves. Each invocation pushes its own frame, resolves the
rules that match the resulting stack and calls the winning implementation
with the composed keyword arguments.
*/

use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::{
    rule::{MatchedRule, Rule, RuleProducer},
    selector::{order_by_specificity, Selector, SelectorItem},
    signature::{BoundArgs, Kwargs, Signature},
    stack::{self, CallableRef, Stack, CHOICE_NAMESPACE},
    trace::{self, TraceItem},
    value::Value,
    ChoiceConfig, ChoiceError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub Uuid);

impl FunctionId {
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&CHOICE_NAMESPACE, format!("function:{name}").as_bytes()))
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImplId(pub Uuid);

impl ImplId {
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&CHOICE_NAMESPACE, format!("impl:{name}").as_bytes()))
    }
}

impl fmt::Display for ImplId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lightweight handle naming an implementation in rules and traces
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImplRef {
    id: ImplId,
    name: Arc<str>,
}

impl ImplRef {
    pub fn new(name: &str) -> Self {
        Self {
            id: ImplId::from_name(name),
            name: Arc::from(name),
        }
    }

    pub fn id(&self) -> ImplId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ImplRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Body of an implementation, called with fully bound arguments
pub type ImplBody = Arc<dyn Fn(&BoundArgs) -> anyhow::Result<Value> + Send + Sync>;

/// Box a closure as an [`ImplBody`]
pub fn body<F>(f: F) -> ImplBody
where
    F: Fn(&BoundArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One concrete implementation of a choice function
pub struct Implementation {
    handle: ImplRef,
    signature: Arc<Signature>,
    choice_args: Vec<String>,
    body: ImplBody,
    doc: Option<String>,
}

impl Implementation {
    /// Fails with `MissingChoiceArg` if a choice argument is not a parameter
    pub fn new(name: &str, signature: Signature, choice_args: &[&str], body: ImplBody) -> Result<Self> {
        signature.validate_choice_args(name, choice_args)?;
        Ok(Self {
            handle: ImplRef::new(name),
            signature: Arc::new(signature),
            choice_args: choice_args.iter().map(|arg| arg.to_string()).collect(),
            body,
            doc: None,
        })
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn handle(&self) -> &ImplRef {
        &self.handle
    }

    pub fn id(&self) -> ImplId {
        self.handle.id()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn signature(&self) -> &Arc<Signature> {
        &self.signature
    }

    pub fn choice_args(&self) -> &[String] {
        &self.choice_args
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    /// Rule overrides in order, then the caller's keywords on top
    pub fn choice_kwargs(&self, rules: &[MatchedRule], kwargs: &Kwargs) -> Kwargs {
        let mut composed = Kwargs::new();
        for rule in rules {
            for (name, value) in &rule.kwargs {
                composed.insert(name.clone(), value.clone());
            }
        }
        for (name, value) in kwargs {
            composed.insert(name.clone(), value.clone());
        }
        composed
    }

    /// Bind against this implementation's signature and run the body
    pub fn call(&self, args: &[Value], kwargs: &Kwargs) -> Result<Value> {
        let bound = self.signature.bind(args, kwargs)?;
        (self.body)(&BoundArgs::new(bound)).map_err(|err| match err.downcast::<ChoiceError>() {
            Ok(choice) => choice,
            Err(other) => ChoiceError::Implementation(other),
        })
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("name", &self.name())
            .field("signature", &self.signature.to_string())
            .field("choice_args", &self.choice_args)
            .finish()
    }
}

/// A customizable function: interface, alternates and rules
pub struct ChoiceFunction {
    id: FunctionId,
    callable: CallableRef,
    interface: Arc<Implementation>,
    alternates: RwLock<IndexMap<ImplId, Arc<Implementation>>>,
    rules: RwLock<Vec<Arc<Rule>>>,
    config: ChoiceConfig,
}

impl ChoiceFunction {
    pub fn new(interface: Implementation, config: ChoiceConfig) -> Self {
        let name = interface.name().to_string();
        Self {
            id: FunctionId::from_name(&name),
            callable: CallableRef::new(&name),
            interface: Arc::new(interface),
            alternates: RwLock::new(IndexMap::new()),
            rules: RwLock::new(Vec::new()),
            config,
        }
    }

    pub fn id(&self) -> FunctionId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.interface.name()
    }

    /// Code identity pushed on the call stack for every invocation
    pub fn callable(&self) -> &CallableRef {
        &self.callable
    }

    pub fn interface(&self) -> &Arc<Implementation> {
        &self.interface
    }

    /// Selector item matching frames of this function
    pub fn selector_item(&self) -> SelectorItem {
        SelectorItem::callable(&self.callable)
    }

    pub fn add_alternate(&self, implementation: Implementation) -> ImplRef {
        let handle = implementation.handle().clone();
        debug!(function = %self.name(), implementation = %handle, "registered alternate implementation");
        self.alternates
            .write()
            .insert(handle.id(), Arc::new(implementation));
        handle
    }

    pub fn alternates(&self) -> Vec<Arc<Implementation>> {
        self.alternates.read().values().cloned().collect()
    }

    pub fn add_rule(&self, rule: Rule) {
        debug!(function = %self.name(), rule = %rule, "registered rule");
        self.rules.write().push(Arc::new(rule));
    }

    /// Register a rule whose outcome is computed from captures
    pub fn register_rule(&self, selector: Selector, producer: RuleProducer) {
        self.add_rule(Rule::new(selector, producer));
    }

    pub fn rules(&self) -> Vec<Arc<Rule>> {
        self.rules.read().clone()
    }

    /// Rules that match `stack` and do not decline, least specific first
    pub fn sorted_rules(&self, stack: &Stack) -> Vec<MatchedRule> {
        let rules = self.rules();
        let matched: Vec<MatchedRule> = rules
            .iter()
            .filter_map(|rule| MatchedRule::resolve(rule, stack))
            .collect();
        trace!(function = %self.name(), registered = rules.len(), matched = matched.len(), "matched rules");
        order_by_specificity(matched, stack, MatchedRule::selector)
    }

    /// Look up an implementation of this function by handle
    pub fn implementation(&self, handle: &ImplRef) -> Option<Arc<Implementation>> {
        if handle.id() == self.interface.id() {
            return Some(Arc::clone(&self.interface));
        }
        self.alternates.read().get(&handle.id()).cloned()
    }

    /// The most specific rule naming an implementation wins, else the interface
    fn winner(&self, rules: &[MatchedRule]) -> Result<Arc<Implementation>> {
        let Some(handle) = rules.iter().rev().find_map(|rule| rule.implementation.as_ref()) else {
            return Ok(Arc::clone(&self.interface));
        };
        self.implementation(handle).ok_or_else(|| ChoiceError::NonRule {
            function: self.name().to_string(),
            implementation: handle.name().to_string(),
        })
    }

    /// Resolve the rules for the current stack and run the winning implementation
    pub fn invoke(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        let frame = self
            .callable
            .frame()
            .with_args(args.clone(), kwargs.clone())
            .with_signature(Arc::clone(self.interface.signature()));
        let _frame = stack::enter_checked(frame, self.config.max_call_depth)?;
        let stack = Stack::current();

        let matched = self.sorted_rules(&stack);
        let winner = self.winner(&matched)?;
        let rules: Vec<MatchedRule> = matched
            .into_iter()
            .filter(|rule| {
                rule.implementation
                    .as_ref()
                    .map_or(true, |implementation| implementation.id() == winner.id())
            })
            .collect();
        let choice_kwargs = winner.choice_kwargs(&rules, &kwargs);

        debug!(
            function = %self.name(),
            implementation = %winner.name(),
            rules = rules.len(),
            "resolved choice"
        );

        let _trace = trace::call_begin(self, || {
            TraceItem::new(
                self,
                &winner,
                &rules,
                self.config.record_stack.then_some(&stack),
                &args,
                &kwargs,
                &choice_kwargs,
            )
        });
        winner.call(&args, &choice_kwargs)
    }

    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.invoke(args, Kwargs::new())
    }

    pub fn call_with(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Value> {
        self.invoke(args, kwargs)
    }
}

impl fmt::Debug for ChoiceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChoiceFunction")
            .field("name", &self.name())
            .field("alternates", &self.alternates.read().len())
            .field("rules", &self.rules.read().len())
            .finish()
    }
}

impl fmt::Display for ChoiceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.interface.signature())
    }
}
