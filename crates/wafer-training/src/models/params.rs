use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One hyperparameter value as written in `config/model.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Concrete assignment of parameter name to value.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Parameter name to the candidate values searched for it.
pub type ParamGrid = BTreeMap<String, Vec<ParamValue>>;

pub(crate) fn as_f64(model: &str, name: &str, value: &ParamValue) -> TrainingResult<f64> {
    match value {
        ParamValue::Float(v) if v.is_finite() => Ok(*v),
        ParamValue::Int(v) => Ok(*v as f64),
        other => Err(TrainingError::invalid_params(model, format!("`{name}` expects a number, got `{other}`"))),
    }
}

pub(crate) fn as_positive_f64(model: &str, name: &str, value: &ParamValue) -> TrainingResult<f64> {
    let v = as_f64(model, name, value)?;
    if v <= 0.0 {
        return Err(TrainingError::invalid_params(model, format!("`{name}` must be > 0, got {v}")));
    }
    Ok(v)
}

pub(crate) fn as_fraction(model: &str, name: &str, value: &ParamValue) -> TrainingResult<f64> {
    let v = as_f64(model, name, value)?;
    if !(v > 0.0 && v <= 1.0) {
        return Err(TrainingError::invalid_params(model, format!("`{name}` must be in (0, 1], got {v}")));
    }
    Ok(v)
}

pub(crate) fn as_usize(model: &str, name: &str, value: &ParamValue) -> TrainingResult<usize> {
    match value {
        ParamValue::Int(v) if *v >= 0 => Ok(*v as usize),
        other => Err(TrainingError::invalid_params(
            model,
            format!("`{name}` expects a non-negative integer, got `{other}`"),
        )),
    }
}

/// Integer or `null`/`"none"` for "unbounded".
pub(crate) fn as_opt_usize(model: &str, name: &str, value: &ParamValue) -> TrainingResult<Option<usize>> {
    match value {
        ParamValue::Text(t) if t.eq_ignore_ascii_case("none") || t.is_empty() => Ok(None),
        other => as_usize(model, name, other).map(Some),
    }
}

pub(crate) fn as_u64(model: &str, name: &str, value: &ParamValue) -> TrainingResult<u64> {
    as_usize(model, name, value).map(|v| v as u64)
}

pub(crate) fn as_text<'a>(model: &str, name: &str, value: &'a ParamValue) -> TrainingResult<&'a str> {
    match value {
        ParamValue::Text(t) => Ok(t.as_str()),
        other => Err(TrainingError::invalid_params(model, format!("`{name}` expects a string, got `{other}`"))),
    }
}

pub(crate) fn unknown(model: &str, name: &str) -> TrainingError {
    TrainingError::invalid_params(model, format!("unknown parameter `{name}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_yaml_values() {
        let values: Vec<ParamValue> = serde_yaml::from_str("[true, 3, 0.5, rbf]").unwrap();
        assert_eq!(
            values,
            vec![
                ParamValue::Bool(true),
                ParamValue::Int(3),
                ParamValue::Float(0.5),
                ParamValue::Text("rbf".to_string())
            ]
        );
    }

    #[test]
    fn test_int_accepted_as_float() {
        assert!((as_f64("m", "C", &ParamValue::Int(10)).unwrap() - 10.0).abs() < f64::EPSILON);
        assert!(as_f64("m", "C", &ParamValue::Text("x".into())).is_err());
    }

    #[test]
    fn test_opt_usize_none() {
        assert_eq!(as_opt_usize("m", "max_depth", &ParamValue::Text("None".into())).unwrap(), None);
        assert_eq!(as_opt_usize("m", "max_depth", &ParamValue::Int(4)).unwrap(), Some(4));
        assert!(as_usize("m", "n", &ParamValue::Int(-1)).is_err());
    }
}
