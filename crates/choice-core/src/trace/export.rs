//! Text and JSON forms of a finished trace

use std::{fmt, fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::{RuleRecord, Trace, TraceItem};
use crate::{
    function::{ChoiceFunction, FunctionId, ImplId, Implementation},
    rule::{Rule, RuleKind},
    signature::Kwargs,
    value::Value,
};

/// Registration summary of one implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplRecord {
    pub id: ImplId,
    pub name: String,
    pub signature: String,
    pub choice_args: Vec<String>,
    pub defaults: Kwargs,
    pub doc: Option<String>,
}

impl From<&Implementation> for ImplRecord {
    fn from(implementation: &Implementation) -> Self {
        Self {
            id: implementation.id(),
            name: implementation.name().to_string(),
            signature: implementation.signature().to_string(),
            choice_args: implementation.choice_args().to_vec(),
            defaults: implementation.signature().defaults(),
            doc: implementation.doc().map(str::to_string),
        }
    }
}

/// Registration summary of one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub selector: String,
    pub implementation: Option<String>,
    /// Fixed overrides; absent for rules computed from captures
    pub kwargs: Option<Kwargs>,
    pub doc: Option<String>,
}

impl From<&Rule> for RuleSummary {
    fn from(rule: &Rule) -> Self {
        let (implementation, kwargs) = match rule.kind() {
            RuleKind::Static {
                implementation,
                kwargs,
            } => (
                implementation.as_ref().map(|i| i.name().to_string()),
                Some(kwargs.clone()),
            ),
            RuleKind::Dynamic(_) => (None, None),
        };
        Self {
            selector: rule.selector().to_string(),
            implementation,
            kwargs,
            doc: rule.doc().map(str::to_string),
        }
    }
}

/// Registration summary of one choice function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: FunctionId,
    pub name: String,
    pub interface: ImplRecord,
    pub alternates: Vec<ImplRecord>,
    pub rules: Vec<RuleSummary>,
}

impl From<&ChoiceFunction> for FunctionRecord {
    fn from(function: &ChoiceFunction) -> Self {
        Self {
            id: function.id(),
            name: function.name().to_string(),
            interface: ImplRecord::from(function.interface().as_ref()),
            alternates: function
                .alternates()
                .iter()
                .map(|i| ImplRecord::from(i.as_ref()))
                .collect(),
            rules: function
                .rules()
                .iter()
                .map(|r| RuleSummary::from(r.as_ref()))
                .collect(),
        }
    }
}

fn kwargs_text(kwargs: &Kwargs) -> String {
    Value::Map(kwargs.clone()).to_string()
}

impl TraceItem {
    /// Write this node and its children, `indent` spaces in
    pub fn write_tree(&self, f: &mut impl fmt::Write, indent: usize) -> fmt::Result {
        let prefix = " ".repeat(indent);
        writeln!(f, "{prefix}{} [{}]", self.function, self.implementation)?;
        writeln!(
            f,
            "{prefix}  Args: {}, Kwargs: {}, Choice Kwargs: {}",
            Value::List(self.args.clone()),
            kwargs_text(&self.kwargs),
            kwargs_text(&self.choice_kwargs)
        )?;
        if self.rules.is_empty() {
            writeln!(f, "{prefix}  Rules: No rules")?;
        } else {
            let rules: Vec<String> = self.rules.iter().map(RuleRecord::summary).collect();
            writeln!(f, "{prefix}  Rules: {}", rules.join(" -> "))?;
        }
        for item in &self.items {
            item.write_tree(f, indent + 2)?;
        }
        Ok(())
    }
}

impl RuleRecord {
    /// One-line form: selector, chosen implementation, overrides
    pub fn summary(&self) -> String {
        let mut text = self.selector.clone();
        if let Some(implementation) = &self.implementation {
            text.push_str(&format!(" [{implementation}]"));
        }
        if !self.kwargs.is_empty() {
            text.push_str(&format!(" {}", kwargs_text(&self.kwargs)));
        }
        text
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in &self.items {
            item.write_tree(f, 0)?;
        }
        Ok(())
    }
}

impl Trace {
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the trace as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).with_context(|| format!("writing trace to {}", path.display()))
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("reading trace from {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("parsing trace from {}", path.display()))
    }

    /// Registry entry for a recorded function
    pub fn function(&self, id: FunctionId) -> Option<&FunctionRecord> {
        self.registry.iter().find(|record| record.id == id)
    }
}
