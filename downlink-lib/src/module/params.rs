use std::{collections::BTreeMap, fmt::Display};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result};

/// Kind of value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
}

impl Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParamKind::Bool => "bool",
            ParamKind::Int => "int",
            ParamKind::Float => "float",
            ParamKind::String => "string",
        };
        f.write_str(name)
    }
}

impl ParamKind {
    /// Convert `value` to this kind where that is lossless, e.g., an integer is a valid
    /// float and anything is a valid string.
    #[must_use]
    pub fn coerce(&self, value: &ParamValue) -> Option<ParamValue> {
        match (self, value) {
            (ParamKind::Bool, ParamValue::Bool(_))
            | (ParamKind::Int, ParamValue::Int(_))
            | (ParamKind::Float, ParamValue::Float(_))
            | (ParamKind::String, ParamValue::String(_)) => Some(value.clone()),
            (ParamKind::Float, ParamValue::Int(v)) => Some(ParamValue::Float(*v as f64)),
            (ParamKind::String, v) => Some(ParamValue::String(v.to_string())),
            _ => None,
        }
    }
}

/// A parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ParamValue {
    /// Infer a value from its literal text.
    ///
    /// `true` and `false` are booleans. Text containing more than one `.`, e.g., an IP
    /// address, is a string. Otherwise numeric text is an integer when it has no
    /// fractional part and a float when it does. Anything else is a string.
    pub fn infer(text: &str) -> Self {
        match text {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if text.matches('.').count() > 1 {
            return ParamValue::String(text.to_string());
        }
        match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v.fract() == 0.0 => ParamValue::Int(v as i64),
            Ok(v) => ParamValue::Float(v),
            Err(_) => ParamValue::String(text.to_string()),
        }
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            ParamValue::Bool(_) => ParamKind::Bool,
            ParamValue::Int(_) => ParamKind::Int,
            ParamValue::Float(_) => ParamKind::Float,
            ParamValue::String(_) => ParamKind::String,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::String(v) => f.write_str(v),
        }
    }
}

/// A parameter a module accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    /// Literal text of the default value.
    pub default: &'static str,
    pub description: &'static str,
}

impl ParameterSpec {
    pub fn default_value(&self) -> ParamValue {
        let value = ParamValue::infer(self.default);
        self.kind
            .coerce(&value)
            .unwrap_or_else(|| ParamValue::String(self.default.to_string()))
    }
}

/// Flat map of named parameter values.
///
/// # Example
/// ```
/// use downlink::module::{Parameters, ParamValue};
///
/// let params: Parameters = [("max_loss_ratio", "0.5"), ("name", "10.0.0.1")]
///     .into_iter()
///     .collect();
/// assert_eq!(params.get("max_loss_ratio"), Some(&ParamValue::Float(0.5)));
/// assert_eq!(params.get_str("name"), Some("10.0.0.1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn insert(&mut self, key: impl Into<String>, value: ParamValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Float value, also accepting integers.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            ParamValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `key=value` assignment, inferring the value kind. A bare `key` is a switch
    /// and means `key=true`.
    ///
    /// # Errors
    /// [Error::Parameter] if the key is empty.
    pub fn parse_assignment(text: &str) -> Result<(String, ParamValue)> {
        let (key, value) = match text.split_once('=') {
            Some((key, value)) => (key.trim(), ParamValue::infer(value)),
            None => (text.trim(), ParamValue::Bool(true)),
        };
        if key.is_empty() {
            return Err(Error::Parameter {
                key: text.to_string(),
                reason: "expected key=value".to_string(),
            });
        }
        Ok((key.to_string(), value))
    }

    /// Check these parameters against what a module declares, returning every declared
    /// parameter with either its given value or its default. Undeclared keys are ignored
    /// with a warning.
    ///
    /// # Errors
    /// [Error::Parameter] if a declared parameter has a value of the wrong kind.
    pub fn resolve(&self, module: &str, specs: &[ParameterSpec]) -> Result<Parameters> {
        for key in self.0.keys() {
            if !specs.iter().any(|s| s.name == key.as_str()) {
                warn!(module, key = key.as_str(), "ignoring undeclared parameter");
            }
        }
        let mut resolved = Parameters::default();
        for spec in specs {
            let value = match self.get(spec.name) {
                Some(value) => spec.kind.coerce(value).ok_or_else(|| Error::Parameter {
                    key: spec.name.to_string(),
                    reason: format!("expected {}, got {} {value}", spec.kind, value.kind()),
                })?,
                None => spec.default_value(),
            };
            resolved.insert(spec.name, value);
        }
        Ok(resolved)
    }
}

impl<K: Into<String>> FromIterator<(K, ParamValue)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, ParamValue)>>(iter: T) -> Self {
        Parameters(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (&'a str, &'a str)>>(iter: T) -> Self {
        Parameters(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), ParamValue::infer(v)))
                .collect(),
        )
    }
}
