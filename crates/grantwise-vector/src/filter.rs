//! Metadata filters over chunk fields.

use crate::error::VectorError;
use grantwise_types::ChunkMetadata;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Field equals the value exactly.
    Eq(String),
    /// Field contains the value as a substring.
    Contains(String),
}

/// A conjunction of per-field conditions.
///
/// Accepts the Chroma `where` JSON form: `{"type": {"$eq": "grant"}}`,
/// `{"location": {"$contains": "Berlin"}}`, a bare scalar as shorthand for
/// `$eq`, and `{"$and": [...]}` of those.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    conditions: Vec<(String, Condition)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push((field.into(), Condition::Eq(value.into())));
        self
    }

    pub fn contains(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push((field.into(), Condition::Contains(value.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        self.conditions.iter().all(|(field, condition)| {
            let Some(actual) = metadata.field(field) else {
                return false;
            };
            match condition {
                Condition::Eq(expected) => actual == *expected,
                Condition::Contains(needle) => actual.contains(needle.as_str()),
            }
        })
    }

    /// Parses a Chroma-style `where` object.
    pub fn from_json(value: &Value) -> Result<Self, VectorError> {
        let mut filter = Self::new();
        filter.parse_into(value)?;
        Ok(filter)
    }

    fn parse_into(&mut self, value: &Value) -> Result<(), VectorError> {
        let object = value
            .as_object()
            .ok_or_else(|| VectorError::InvalidFilter("filter must be an object".into()))?;

        for (key, condition) in object {
            if key == "$and" {
                let clauses = condition.as_array().ok_or_else(|| {
                    VectorError::InvalidFilter("$and expects an array".into())
                })?;
                for clause in clauses {
                    self.parse_into(clause)?;
                }
                continue;
            }
            if key.starts_with('$') {
                return Err(VectorError::InvalidFilter(format!(
                    "unsupported operator: {}",
                    key
                )));
            }

            match condition {
                Value::Object(ops) => {
                    for (op, operand) in ops {
                        let operand = scalar(operand).ok_or_else(|| {
                            VectorError::InvalidFilter(format!("{} on {} needs a scalar", op, key))
                        })?;
                        let parsed = match op.as_str() {
                            "$eq" => Condition::Eq(operand),
                            "$contains" => Condition::Contains(operand),
                            other => {
                                return Err(VectorError::InvalidFilter(format!(
                                    "unsupported operator: {}",
                                    other
                                )))
                            }
                        };
                        self.conditions.push((key.clone(), parsed));
                    }
                }
                other => {
                    let operand = scalar(other).ok_or_else(|| {
                        VectorError::InvalidFilter(format!("unsupported value for {}", key))
                    })?;
                    self.conditions.push((key.clone(), Condition::Eq(operand)));
                }
            }
        }
        Ok(())
    }

    /// Renders the equality conditions as a Chroma `where` clause.
    ///
    /// Substring conditions are left out; callers apply them with
    /// [`MetadataFilter::matches`] after the query returns.
    pub(crate) fn chroma_where(&self) -> Option<Value> {
        let clauses: Vec<Value> = self
            .conditions
            .iter()
            .filter_map(|(field, condition)| match condition {
                Condition::Eq(value) => {
                    let mut clause = Map::new();
                    clause.insert(field.clone(), json!({ "$eq": value }));
                    Some(Value::Object(clause))
                }
                Condition::Contains(_) => None,
            })
            .collect();
        match clauses.len() {
            0 => None,
            1 => clauses.into_iter().next(),
            _ => Some(json!({ "$and": clauses })),
        }
    }

    pub(crate) fn has_substring_conditions(&self) -> bool {
        self.conditions
            .iter()
            .any(|(_, c)| matches!(c, Condition::Contains(_)))
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ChunkMetadata {
        ChunkMetadata {
            kind: "residency".into(),
            location: "Berlin, Germany".into(),
            disciplines: "painting,sculpture".into(),
            chunk_index: 2,
            ..ChunkMetadata::default()
        }
    }

    #[test]
    fn parses_chroma_where_forms() {
        let filter = MetadataFilter::from_json(&json!({
            "$and": [
                {"type": {"$eq": "residency"}},
                {"location": {"$contains": "Berlin"}}
            ]
        }))
        .unwrap();
        assert_eq!(
            filter,
            MetadataFilter::new()
                .eq("type", "residency")
                .contains("location", "Berlin")
        );
        assert!(filter.matches(&metadata()));

        let shorthand = MetadataFilter::from_json(&json!({"chunk_index": 2})).unwrap();
        assert!(shorthand.matches(&metadata()));
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(MetadataFilter::from_json(&json!({"type": {"$ne": "grant"}})).is_err());
        assert!(MetadataFilter::from_json(&json!({"$or": []})).is_err());
        assert!(MetadataFilter::from_json(&json!(["type"])).is_err());
    }

    #[test]
    fn unknown_fields_never_match() {
        let filter = MetadataFilter::new().eq("colour", "blue");
        assert!(!filter.matches(&metadata()));
    }

    #[test]
    fn substring_conditions_stay_client_side() {
        let filter = MetadataFilter::new()
            .eq("type", "grant")
            .contains("disciplines", "sculpture");
        assert_eq!(
            filter.chroma_where(),
            Some(json!({"type": {"$eq": "grant"}}))
        );
        assert!(filter.has_substring_conditions());
        assert_eq!(MetadataFilter::new().chroma_where(), None);
    }
}
