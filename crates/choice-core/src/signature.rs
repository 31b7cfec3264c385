//! Declared parameter lists and argument binding
//!
//! A [`Signature`] stands in for signature introspection: it lists the
//! positional-or-keyword parameters of an implementation in order, with
//! optional defaults. Binding follows ordinary call semantics: positional
//! arguments fill parameters left to right, keywords fill the rest, and
//! defaults cover anything left unsupplied.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{value::Value, ChoiceError, Result};

/// Ordered keyword arguments
pub type Kwargs = IndexMap<String, Value>;

/// Build a [`Kwargs`] map from name/value pairs
pub fn kwargs<I, K, V>(pairs: I) -> Kwargs
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Reasons binding arguments against a signature can fail
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindError {
    #[error("takes {expected} positional arguments but {given} were given")]
    TooManyPositional { expected: usize, given: usize },

    #[error("got an unexpected keyword argument '{name}'")]
    UnexpectedKeyword { name: String },

    #[error("got multiple values for argument '{name}'")]
    MultipleValues { name: String },

    #[error("missing a required argument: '{name}'")]
    Missing { name: String },
}

/// A single declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// Declared parameters of an implementation, in positional order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter
    pub fn param(mut self, name: &str) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: None,
        });
        self
    }

    /// Add a parameter with a default value
    pub fn with_default(mut self, name: &str, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            default: Some(default.into()),
        });
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    /// Declared defaults, in parameter order
    pub fn defaults(&self) -> Kwargs {
        self.params
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }

    /// Check that every choice argument is a declared parameter
    pub fn validate_choice_args(&self, function: &str, choice_args: &[&str]) -> Result<()> {
        for arg in choice_args {
            if !self.has_param(arg) {
                return Err(ChoiceError::MissingChoiceArg {
                    function: function.to_string(),
                    arg: arg.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Bind a call's arguments to parameter names, applying defaults
    pub fn bind(&self, args: &[Value], kwargs: &Kwargs) -> std::result::Result<Kwargs, BindError> {
        if args.len() > self.params.len() {
            return Err(BindError::TooManyPositional {
                expected: self.params.len(),
                given: args.len(),
            });
        }

        for name in kwargs.keys() {
            match self.params.iter().position(|p| &p.name == name) {
                None => {
                    return Err(BindError::UnexpectedKeyword { name: name.clone() });
                }
                Some(index) if index < args.len() => {
                    return Err(BindError::MultipleValues { name: name.clone() });
                }
                Some(_) => {}
            }
        }

        let mut bound = Kwargs::with_capacity(self.params.len());
        for (index, param) in self.params.iter().enumerate() {
            let value = if let Some(arg) = args.get(index) {
                arg.clone()
            } else if let Some(value) = kwargs.get(&param.name) {
                value.clone()
            } else if let Some(default) = &param.default {
                default.clone()
            } else {
                return Err(BindError::Missing {
                    name: param.name.clone(),
                });
            };
            bound.insert(param.name.clone(), value);
        }
        Ok(bound)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match &param.default {
                Some(Value::String(s)) => write!(f, "{}={s:?}", param.name)?,
                Some(default) => write!(f, "{}={default}", param.name)?,
                None => write!(f, "{}", param.name)?,
            }
        }
        write!(f, ")")
    }
}

/// Arguments handed to an implementation body after binding
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArgs {
    values: Kwargs,
}

impl BoundArgs {
    pub fn new(values: Kwargs) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn value(&self, name: &str) -> anyhow::Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("No argument named '{}'", name))
    }

    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        let value = self.value(name)?;
        value
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Argument '{}' requires string, got {}", name, value.type_name()))
    }

    pub fn int(&self, name: &str) -> anyhow::Result<i64> {
        let value = self.value(name)?;
        value
            .as_int()
            .ok_or_else(|| anyhow::anyhow!("Argument '{}' requires integer, got {}", name, value.type_name()))
    }

    pub fn float(&self, name: &str) -> anyhow::Result<f64> {
        let value = self.value(name)?;
        value
            .as_float()
            .ok_or_else(|| anyhow::anyhow!("Argument '{}' requires float, got {}", name, value.type_name()))
    }

    pub fn bool(&self, name: &str) -> anyhow::Result<bool> {
        let value = self.value(name)?;
        value
            .as_bool()
            .ok_or_else(|| anyhow::anyhow!("Argument '{}' requires boolean, got {}", name, value.type_name()))
    }

    pub fn values(&self) -> &Kwargs {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greet_signature() -> Signature {
        Signature::new().param("name").with_default("greeting", "Hello")
    }

    #[test]
    fn test_bind_applies_defaults() {
        let bound = greet_signature().bind(&[Value::from("me")], &Kwargs::new()).unwrap();
        assert_eq!(bound, kwargs([("name", "me"), ("greeting", "Hello")]));
    }

    #[test]
    fn test_bind_keywords_in_parameter_order() {
        let bound = greet_signature()
            .bind(&[], &kwargs([("greeting", "Hey"), ("name", "you")]))
            .unwrap();
        let names: Vec<&str> = bound.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["name", "greeting"]);
        assert_eq!(bound["greeting"], Value::from("Hey"));
    }

    #[test]
    fn test_bind_errors() {
        let sig = greet_signature();
        assert_eq!(
            sig.bind(&[Value::from(1), Value::from(2), Value::from(3)], &Kwargs::new()),
            Err(BindError::TooManyPositional { expected: 2, given: 3 })
        );
        assert_eq!(
            sig.bind(&[Value::from("me")], &kwargs([("title", "Dr")])),
            Err(BindError::UnexpectedKeyword { name: "title".to_string() })
        );
        assert_eq!(
            sig.bind(&[Value::from("me")], &kwargs([("name", "you")])),
            Err(BindError::MultipleValues { name: "name".to_string() })
        );
        assert_eq!(
            sig.bind(&[], &Kwargs::new()),
            Err(BindError::Missing { name: "name".to_string() })
        );
    }

    #[test]
    fn test_validate_choice_args() {
        let sig = greet_signature();
        assert!(sig.validate_choice_args("greet", &["greeting"]).is_ok());

        let err = sig.validate_choice_args("greet", &["missing_arg"]).unwrap_err();
        assert!(matches!(
            err,
            ChoiceError::MissingChoiceArg { ref function, ref arg } if function == "greet" && arg == "missing_arg"
        ));
    }

    #[test]
    fn test_bound_args_accessors() {
        let args = BoundArgs::new(kwargs([("name", Value::from("me")), ("count", Value::from(2))]));
        assert_eq!(args.str("name").unwrap(), "me");
        assert_eq!(args.int("count").unwrap(), 2);
        assert!(args.str("count").is_err());
        assert!(args.value("missing").is_err());
    }

    #[test]
    fn test_signature_display() {
        assert_eq!(greet_signature().to_string(), r#"(name, greeting="Hello")"#);
    }
}
