//! Gym-style spaces and dynamically typed observation values
//!
//! Agents describe what they consume with [`Space`]s, extensions describe
//! what they can provide, and [`RLib`](crate::RLib) checks the two against
//! each other once, when the library is built. Values flowing between an
//! environment and an agent are carried as [`Value`]s keyed by name.

use crate::error::{Result, RlibError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Element type of a [`Space::Box`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Int,
    Float,
}

/// Description of a set of admissible values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    /// Integers in `0..n`
    Discrete(usize),
    /// Bounded numbers of a given shape
    Box {
        low: f64,
        high: f64,
        shape: Vec<usize>,
        dtype: Dtype,
    },
    /// Binary vector of length `n`
    MultiBinary(usize),
    /// Variable-length sequence of elements from the inner space
    Sequence(std::boxed::Box<Space>),
    /// Named collection of spaces
    Dict(BTreeMap<String, Space>),
}

impl Space {
    /// Scalar float box
    pub fn scalar(low: f64, high: f64) -> Self {
        Self::Box {
            low,
            high,
            shape: vec![1],
            dtype: Dtype::Float,
        }
    }

    /// Scalar integer box
    pub fn scalar_int(low: f64, high: f64) -> Self {
        Self::Box {
            low,
            high,
            shape: vec![1],
            dtype: Dtype::Int,
        }
    }

    /// Float box with an arbitrary shape
    pub fn float_box(low: f64, high: f64, shape: &[usize]) -> Self {
        Self::Box {
            low,
            high,
            shape: shape.to_vec(),
            dtype: Dtype::Float,
        }
    }

    /// Build a [`Space::Dict`] from `(name, space)` pairs
    pub fn dict<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Space)>,
        S: Into<String>,
    {
        Self::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Entries of a dict space, empty for any other kind
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Space)> {
        let map = match self {
            Space::Dict(map) => Some(map),
            _ => None,
        };
        map.into_iter().flat_map(|m| m.iter())
    }

    /// Check whether `value` is a member of this space
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Space::Discrete(n) => value
                .as_i64()
                .map(|v| v >= 0 && (v as usize) < *n)
                .unwrap_or(false),
            Space::Box {
                low,
                high,
                shape,
                dtype,
            } => {
                let size: usize = shape.iter().product();
                let Some(elements) = value.as_array() else {
                    return false;
                };
                if elements.len() != size.max(1) {
                    return false;
                }
                elements.iter().all(|x| {
                    let integral = *dtype == Dtype::Float || x.fract() == 0.0;
                    integral && *x >= *low && *x <= *high
                })
            }
            Space::MultiBinary(n) => value
                .as_array()
                .map(|bits| bits.len() == *n && bits.iter().all(|b| *b == 0.0 || *b == 1.0))
                .unwrap_or(false),
            Space::Sequence(inner) => match value {
                Value::Array(items) => items.iter().all(|x| inner.contains(&Value::Float(*x))),
                _ => false,
            },
            Space::Dict(_) => false,
        }
    }

    /// Check whether values drawn from `self` can be fed where `required` is expected
    pub fn is_compatible_with(&self, required: &Space) -> bool {
        match (self, required) {
            (Space::Discrete(provided), Space::Discrete(expected)) => provided <= expected,
            (
                Space::Box {
                    shape: provided_shape,
                    dtype: provided_dtype,
                    ..
                },
                Space::Box {
                    shape: expected_shape,
                    dtype: expected_dtype,
                    ..
                },
            ) => {
                let size = |s: &[usize]| s.iter().product::<usize>().max(1);
                size(provided_shape) == size(expected_shape)
                    && !(*provided_dtype == Dtype::Float && *expected_dtype == Dtype::Int)
            }
            (Space::MultiBinary(provided), Space::MultiBinary(expected)) => provided == expected,
            (Space::Sequence(provided), Space::Sequence(expected)) => {
                provided.is_compatible_with(expected)
            }
            (Space::Dict(provided), Space::Dict(expected)) => expected.iter().all(|(name, space)| {
                provided
                    .get(name)
                    .map(|p| p.is_compatible_with(space))
                    .unwrap_or(false)
            }),
            _ => false,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Discrete(n) => write!(f, "Discrete({})", n),
            Space::Box {
                low,
                high,
                shape,
                dtype,
            } => {
                let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
                let dtype = match dtype {
                    Dtype::Int => "int",
                    Dtype::Float => "float",
                };
                write!(f, "Box({}, {}, ({},), {})", low, high, dims.join(", "), dtype)
            }
            Space::MultiBinary(n) => write!(f, "MultiBinary({})", n),
            Space::Sequence(inner) => write!(f, "Sequence({})", inner),
            Space::Dict(map) => {
                let items: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "Dict({})", items.join(", "))
            }
        }
    }
}

/// A single observation, parameter or action value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Array(Vec<f64>),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            Value::Array(xs) if xs.len() == 1 => Some(xs[0]),
            Value::Array(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            other => other
                .as_f64()
                .filter(|x| x.fract() == 0.0 && x.is_finite())
                .map(|x| x as i64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            other => other.as_f64().and_then(|x| {
                if x == 0.0 {
                    Some(false)
                } else if x == 1.0 {
                    Some(true)
                } else {
                    None
                }
            }),
        }
    }

    /// Flatten the value into a vector; scalars become single-element vectors
    pub fn as_array(&self) -> Option<Vec<f64>> {
        match self {
            Value::Array(xs) => Some(xs.clone()),
            other => other.as_f64().map(|x| vec![x]),
        }
    }

    /// Short kind name used in error messages and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Array(_) => "array",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Array(v.into_iter().map(f64::from).collect())
    }
}

/// Named values passed from an environment to an agent
pub type Observation = BTreeMap<String, Value>;

/// Named agent construction parameters
pub type Params = BTreeMap<String, Value>;

/// Typed lookups on [`Observation`] and [`Params`] maps
pub trait ValueMap {
    fn value(&self, name: &str) -> Result<&Value>;
    fn get_f64(&self, name: &str) -> Result<f64>;
    fn get_i64(&self, name: &str) -> Result<i64>;
    fn get_usize(&self, name: &str) -> Result<usize>;
    fn get_bool(&self, name: &str) -> Result<bool>;
    fn get_array(&self, name: &str) -> Result<Vec<f64>>;
}

impl ValueMap for BTreeMap<String, Value> {
    fn value(&self, name: &str) -> Result<&Value> {
        self.get(name)
            .ok_or_else(|| RlibError::MissingObservation(name.to_string()))
    }

    fn get_f64(&self, name: &str) -> Result<f64> {
        let value = self.value(name)?;
        value
            .as_f64()
            .ok_or_else(|| {
                RlibError::invalid_observation(
                    name,
                    format!("expected a number, got {}", value.kind()),
                )
            })
    }

    fn get_i64(&self, name: &str) -> Result<i64> {
        let value = self.value(name)?;
        value
            .as_i64()
            .ok_or_else(|| {
                RlibError::invalid_observation(
                    name,
                    format!("expected an integer, got {:?}", value),
                )
            })
    }

    fn get_usize(&self, name: &str) -> Result<usize> {
        let v = self.get_i64(name)?;
        usize::try_from(v)
            .map_err(|_| {
                RlibError::invalid_observation(
                    name,
                    format!("expected a non-negative integer, got {}", v),
                )
            })
    }

    fn get_bool(&self, name: &str) -> Result<bool> {
        let value = self.value(name)?;
        value
            .as_bool()
            .ok_or_else(|| {
                RlibError::invalid_observation(name, format!("expected a boolean, got {:?}", value))
            })
    }

    fn get_array(&self, name: &str) -> Result<Vec<f64>> {
        let value = self.value(name)?;
        value
            .as_array()
            .ok_or_else(|| {
                RlibError::invalid_observation(
                    name,
                    format!("expected an array, got {}", value.kind()),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_contains() {
        let space = Space::Discrete(12);
        assert!(space.contains(&Value::Int(0)));
        assert!(space.contains(&Value::Int(11)));
        assert!(!space.contains(&Value::Int(12)));
        assert!(!space.contains(&Value::Int(-1)));
        assert!(!space.contains(&Value::Float(1.5)));
    }

    #[test]
    fn test_box_contains_checks_shape_and_bounds() {
        let space = Space::float_box(-1.0, 1.0, &[3]);
        assert!(space.contains(&Value::Array(vec![0.0, 0.5, -1.0])));
        assert!(!space.contains(&Value::Array(vec![0.0, 0.5])));
        assert!(!space.contains(&Value::Array(vec![0.0, 0.5, 2.0])));

        let counts = Space::scalar_int(0.0, f64::INFINITY);
        assert!(counts.contains(&Value::Int(10)));
        assert!(!counts.contains(&Value::Float(0.5)));
        assert!(!counts.contains(&Value::Int(-3)));
    }

    #[test]
    fn test_multi_binary_contains() {
        let space = Space::MultiBinary(1);
        assert!(space.contains(&Value::Bool(true)));
        assert!(space.contains(&Value::Int(0)));
        assert!(!space.contains(&Value::Int(2)));
    }

    #[test]
    fn test_compatibility() {
        let provided = Space::scalar_int(0.0, f64::INFINITY);
        let required = Space::scalar(0.0, f64::INFINITY);
        assert!(provided.is_compatible_with(&required));
        assert!(!required.is_compatible_with(&provided));

        assert!(Space::Discrete(4).is_compatible_with(&Space::Discrete(12)));
        assert!(!Space::Discrete(13).is_compatible_with(&Space::Discrete(12)));
        assert!(!Space::Discrete(2).is_compatible_with(&Space::MultiBinary(1)));

        let ext = Space::dict([
            ("power", Space::scalar(f64::NEG_INFINITY, f64::INFINITY)),
            ("cw", Space::Discrete(32767)),
        ]);
        let agent = Space::dict([("cw", Space::Discrete(32767))]);
        assert!(ext.is_compatible_with(&agent));
        assert!(!agent.is_compatible_with(&ext));
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Float(2.0).as_i64(), Some(2));
        assert_eq!(Value::Float(2.5).as_i64(), None);
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::Float(0.3).as_bool(), None);
        assert_eq!(Value::Float(1.5).as_array(), Some(vec![1.5]));
        assert_eq!(Value::Array(vec![1.0, 2.0]).as_f64(), None);
    }

    #[test]
    fn test_value_untagged_json() {
        let values: Vec<Value> = serde_json::from_str("[true, 3, 2.5, [1.0, 2.0]]").unwrap();
        assert_eq!(
            values,
            vec![
                Value::Bool(true),
                Value::Int(3),
                Value::Float(2.5),
                Value::Array(vec![1.0, 2.0])
            ]
        );
    }

    #[test]
    fn test_value_map_errors() {
        let mut obs = Observation::new();
        obs.insert("n_failed".into(), Value::Int(-2));
        obs.insert("rates".into(), Value::Array(vec![1.0, 2.0]));

        assert!(matches!(obs.get_f64("time"), Err(RlibError::MissingObservation(_))));
        assert!(matches!(
            obs.get_usize("n_failed"),
            Err(RlibError::InvalidObservation { .. })
        ));
        assert!(matches!(
            obs.get_f64("rates"),
            Err(RlibError::InvalidObservation { .. })
        ));
        assert_eq!(obs.get_array("rates").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Space::Discrete(5).to_string(), "Discrete(5)");
        assert_eq!(
            Space::float_box(0.0, 1.0, &[4]).to_string(),
            "Box(0, 1, (4,), float)"
        );
    }
}
