/*!
# Rules

A rule pairs a [`Selector`] with what to do when it matches: optionally
switch the target's implementation, and override some of its choice
arguments. Static rules carry a fixed outcome; dynamic rules compute one from
the values captured along the matched chain and may decline.
*/

use std::{fmt, sync::Arc};

use crate::{
    function::ImplRef,
    selector::{Captures, Selector},
    signature::Kwargs,
    stack::Stack,
};

/// Result of evaluating a rule against the captures of a matched stack
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    /// The rule takes part in resolution
    Applies {
        implementation: Option<ImplRef>,
        kwargs: Kwargs,
    },
    /// The rule matched structurally but opts out for these captures
    Declines,
}

impl RuleOutcome {
    /// Override parameters only, keeping whatever implementation wins
    pub fn kwargs(kwargs: Kwargs) -> Self {
        RuleOutcome::Applies {
            implementation: None,
            kwargs,
        }
    }

    /// Switch to `implementation`, with optional overrides
    pub fn implementation(implementation: &ImplRef, kwargs: Kwargs) -> Self {
        RuleOutcome::Applies {
            implementation: Some(implementation.clone()),
            kwargs,
        }
    }

    pub fn declines(&self) -> bool {
        matches!(self, RuleOutcome::Declines)
    }
}

/// Computes a dynamic rule's outcome from captures ordered outer to inner
pub type RuleProducer = Arc<dyn Fn(&[Captures]) -> RuleOutcome + Send + Sync>;

#[derive(Clone)]
pub enum RuleKind {
    Static {
        implementation: Option<ImplRef>,
        kwargs: Kwargs,
    },
    Dynamic(RuleProducer),
}

/// A registered selector plus its override producer
#[derive(Clone)]
pub struct Rule {
    selector: Selector,
    kind: RuleKind,
    doc: Option<String>,
}

impl Rule {
    pub fn new(selector: Selector, producer: RuleProducer) -> Self {
        Self {
            selector,
            kind: RuleKind::Dynamic(producer),
            doc: None,
        }
    }

    pub fn fixed(selector: Selector, implementation: Option<ImplRef>, kwargs: Kwargs) -> Self {
        Self {
            selector,
            kind: RuleKind::Static {
                implementation,
                kwargs,
            },
            doc: None,
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.kind, RuleKind::Dynamic(_))
    }

    /// Evaluate the rule for captures taken from a matched stack
    pub fn outcome(&self, captures: &[Captures]) -> RuleOutcome {
        match &self.kind {
            RuleKind::Static {
                implementation,
                kwargs,
            } => RuleOutcome::Applies {
                implementation: implementation.clone(),
                kwargs: kwargs.clone(),
            },
            RuleKind::Dynamic(producer) => producer(captures),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Rule");
        debug.field("selector", &self.selector.to_string());
        match &self.kind {
            RuleKind::Static {
                implementation,
                kwargs,
            } => {
                debug.field("implementation", implementation);
                debug.field("kwargs", kwargs);
            }
            RuleKind::Dynamic(_) => {
                debug.field("producer", &"<dynamic>");
            }
        }
        debug.field("doc", &self.doc).finish()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.selector)?;
        match &self.kind {
            RuleKind::Static {
                implementation,
                kwargs,
            } => {
                if let Some(implementation) = implementation {
                    write!(f, " [{}]", implementation.name())?;
                }
                if !kwargs.is_empty() {
                    write!(f, " {}", crate::value::Value::Map(kwargs.clone()))?;
                }
                Ok(())
            }
            RuleKind::Dynamic(_) => write!(f, " <dynamic>"),
        }
    }
}

/// A rule that matched one stack, with its evaluated outcome
#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub rule: Arc<Rule>,
    pub captures: Vec<Captures>,
    pub implementation: Option<ImplRef>,
    pub kwargs: Kwargs,
}

impl MatchedRule {
    /// Match `rule` against `stack`; `None` on no match or when the rule declines
    pub fn resolve(rule: &Arc<Rule>, stack: &Stack) -> Option<Self> {
        let captures = rule.selector().matches(stack)?;
        match rule.outcome(&captures) {
            RuleOutcome::Applies {
                implementation,
                kwargs,
            } => Some(Self {
                rule: Arc::clone(rule),
                captures,
                implementation,
                kwargs,
            }),
            RuleOutcome::Declines => None,
        }
    }

    pub fn selector(&self) -> &Selector {
        self.rule.selector()
    }
}

impl fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.selector())?;
        if let Some(implementation) = &self.implementation {
            write!(f, " [{}]", implementation.name())?;
        }
        if !self.kwargs.is_empty() {
            write!(f, " {}", crate::value::Value::Map(self.kwargs.clone()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        selector::SelectorItem,
        signature::kwargs,
        stack::{CallableRef, Stack},
        value::Value,
    };

    #[test]
    fn test_static_rule_outcome() {
        let greet = CallableRef::new("greet");
        let rule = Rule::fixed(
            Selector::new(vec![SelectorItem::callable(&greet)]),
            None,
            kwargs([("greeting", "Hi")]),
        );
        assert_eq!(rule.outcome(&[]), RuleOutcome::kwargs(kwargs([("greeting", "Hi")])));
        assert_eq!(rule.to_string(), r#"greet {greeting: "Hi"}"#);
    }

    #[test]
    fn test_dynamic_rule_sees_captures() {
        let app = CallableRef::new("app");
        let greet = CallableRef::new("greet");
        let rule = Arc::new(Rule::new(
            Selector::new(vec![SelectorItem::callable(&app), SelectorItem::callable(&greet)]),
            Arc::new(|captures: &[Captures]| match captures[0].get("user") {
                Some(Value::String(user)) if user == "admin" => RuleOutcome::Declines,
                Some(user) => RuleOutcome::kwargs(kwargs([("name", user.clone())])),
                None => RuleOutcome::Declines,
            }),
        ));

        let stack = |user: &str| Stack::new(vec![greet.frame(), app.frame().with_local("user", user)]);

        let matched = MatchedRule::resolve(&rule, &stack("bob")).unwrap();
        assert_eq!(matched.kwargs, kwargs([("name", "bob")]));
        assert_eq!(matched.captures.len(), 2);

        assert!(MatchedRule::resolve(&rule, &stack("admin")).is_none());
        assert!(MatchedRule::resolve(&rule, &Stack::new(vec![greet.frame()])).is_none());
    }

    #[test]
    fn test_doc_is_kept() {
        let rule = Rule::fixed(Selector::default(), None, Kwargs::new()).with_doc("Greet formally at work");
        assert_eq!(rule.doc(), Some("Greet formally at work"));
        assert!(!rule.is_dynamic());
    }
}
