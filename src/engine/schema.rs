use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use crate::error::{ArtifactError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    Number,
    Integer,
    Boolean,
    String,
}

impl FeatureType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::String => "string",
        }
    }

    /// Types that take part in arithmetic.
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::String)
    }
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FeatureType,
    #[serde(default = "default_required")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
}

impl FeatureValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Feature values laid out in schema order; `None` marks an absent optional field.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: Vec<Option<FeatureValue>>,
}

impl FeatureVector {
    pub fn get(&self, idx: usize) -> Option<&FeatureValue> {
        self.values.get(idx).and_then(Option::as_ref)
    }

    pub fn number(&self, idx: usize) -> Option<f64> {
        self.get(idx).and_then(FeatureValue::as_f64)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Ordered, typed input fields of a model.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    fields: Vec<FeatureField>,
    index: HashMap<String, usize>,
}

impl FeatureSchema {
    pub fn new(fields: Vec<FeatureField>) -> Result<Self, ArtifactError> {
        if fields.is_empty() {
            return Err(ArtifactError::invalid("schema declares no fields"));
        }
        let mut index = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(ArtifactError::invalid(format!("schema field #{idx} has an empty name")));
            }
            if index.insert(field.name.clone(), idx).is_some() {
                return Err(ArtifactError::invalid(format!(
                    "schema field '{}' declared twice",
                    field.name
                )));
            }
        }
        Ok(Self { fields, index })
    }

    pub fn fields(&self) -> &[FeatureField] {
        &self.fields
    }

    pub fn lookup(&self, name: &str) -> Option<(usize, &FeatureField)> {
        self.index.get(name).map(|&idx| (idx, &self.fields[idx]))
    }

    /// Resolve a field referenced by model parameters and check its type class.
    pub(crate) fn require(
        &self,
        name: &str,
        numeric: bool,
        role: &str,
    ) -> Result<usize, ArtifactError> {
        let (idx, field) = self
            .lookup(name)
            .ok_or_else(|| ArtifactError::invalid(format!("{role} references unknown field '{name}'")))?;
        if field.kind.is_numeric() != numeric {
            return Err(ArtifactError::invalid(format!(
                "{role} field '{name}' has type {}, expected {}",
                field.kind.name(),
                if numeric { "a numeric type" } else { "string" }
            )));
        }
        Ok(idx)
    }

    /// Check a JSON payload against the schema.
    ///
    /// Unknown fields are reported before schema fields are examined; `null`
    /// counts as absent.
    pub fn validate(&self, payload: &Map<String, Value>) -> Result<FeatureVector, ValidationError> {
        let mut unknown: Vec<&String> = payload
            .keys()
            .filter(|key| !self.index.contains_key(key.as_str()))
            .collect();
        unknown.sort();
        if let Some(field) = unknown.first() {
            return Err(ValidationError::UnknownField {
                field: (*field).clone(),
            });
        }

        let mut values = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match payload.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        return Err(ValidationError::MissingField {
                            field: field.name.clone(),
                        });
                    }
                    values.push(None);
                }
                Some(raw) => values.push(Some(coerce(field, raw)?)),
            }
        }
        Ok(FeatureVector { values })
    }

    /// Turn textual parameters (query strings) into a JSON payload typed by the schema.
    pub fn parse_text(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<Map<String, Value>, ValidationError> {
        let mut out = Map::new();
        for (name, raw) in params {
            let (_, field) = self.lookup(name).ok_or_else(|| ValidationError::UnknownField {
                field: name.clone(),
            })?;
            let mismatch = || ValidationError::TypeMismatch {
                field: name.clone(),
                expected: field.kind.name(),
                found: "string",
            };
            let raw = raw.trim();
            let value = match field.kind {
                FeatureType::Number => {
                    let v: f64 = raw.parse().map_err(|_| mismatch())?;
                    Value::from(serde_json::Number::from_f64(v).ok_or_else(mismatch)?)
                }
                FeatureType::Integer => Value::from(raw.parse::<i64>().map_err(|_| mismatch())?),
                FeatureType::Boolean => match raw {
                    "true" | "1" => Value::Bool(true),
                    "false" | "0" => Value::Bool(false),
                    _ => return Err(mismatch()),
                },
                FeatureType::String => Value::String(raw.to_string()),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn coerce(field: &FeatureField, raw: &Value) -> Result<FeatureValue, ValidationError> {
    let value = match (field.kind, raw) {
        (FeatureType::Number, Value::Number(n)) => n.as_f64().map(FeatureValue::Number),
        (FeatureType::Integer, Value::Number(n)) => n.as_i64().map(FeatureValue::Integer),
        (FeatureType::Boolean, Value::Bool(b)) => Some(FeatureValue::Boolean(*b)),
        (FeatureType::String, Value::String(s)) => Some(FeatureValue::Text(s.clone())),
        _ => None,
    };
    value.ok_or_else(|| ValidationError::TypeMismatch {
        field: field.name.clone(),
        expected: field.kind.name(),
        found: json_type(raw),
    })
}
