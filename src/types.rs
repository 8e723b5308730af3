use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// A document: a mapping from field names to typed values.
///
/// One of the fields carries the document's unique integer identifier
/// (`"id"` unless configured otherwise, see
/// [`ManagerConfig::id_field`](crate::index::config::ManagerConfig::id_field)).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub fields: HashMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// The integer identifier stored under `id_field`, if present.
    pub fn id(&self, id_field: &str) -> Option<i64> {
        self.fields.get(id_field).and_then(FieldValue::as_integer)
    }

    /// Parse a [`Document`] from a JSON object.
    ///
    /// Nulls, booleans and nested values are skipped. Strings stay text;
    /// dates are recognised later, against the schema, when the document
    /// is converted for indexing.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GriddleError::InvalidDocument`] if the value is not
    /// a JSON object.
    pub fn from_json(json: &serde_json::Value) -> crate::error::Result<Self> {
        use crate::error::GriddleError;

        let obj = json
            .as_object()
            .ok_or_else(|| GriddleError::InvalidDocument("Expected JSON object".to_string()))?;

        let mut fields = HashMap::new();
        for (key, val) in obj {
            if let Some(field_value) = json_value_to_field_value(val) {
                fields.insert(key.clone(), field_value);
            }
        }

        Ok(Document { fields })
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, field_value) in &self.fields {
            map.insert(key.clone(), field_value_to_json_value(field_value));
        }
        serde_json::Value::Object(map)
    }
}

pub fn json_value_to_field_value(val: &serde_json::Value) -> Option<FieldValue> {
    match val {
        serde_json::Value::String(s) => Some(FieldValue::Text(s.clone())),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(FieldValue::Integer(i))
            } else {
                n.as_f64().map(FieldValue::Float)
            }
        }
        _ => None,
    }
}

pub fn field_value_to_json_value(field_value: &FieldValue) -> serde_json::Value {
    match field_value {
        FieldValue::Text(s) => serde_json::Value::String(s.clone()),
        FieldValue::Integer(i) => serde_json::json!(i),
        FieldValue::Float(f) => serde_json::json!(f),
        FieldValue::Date(d) => serde_json::Value::String(d.to_rfc3339()),
    }
}

/// A typed field value stored in a [`Document`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    /// Indexed with whole-second precision: fractional seconds are dropped on
    /// write, so a date read back from the index is truncated to the second.
    /// Only instants between 1677 and 2262 can be indexed.
    Date(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Float(_) => "float",
            FieldValue::Date(_) => "date",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(d: DateTime<Utc>) -> Self {
        FieldValue::Date(d)
    }
}

/// A composable filter tree for narrowing search results.
///
/// Filters can be combined with [`Filter::And`] and [`Filter::Or`].
/// Range bounds are inclusive.
#[derive(Debug, Clone)]
pub enum Filter {
    Equals {
        field: String,
        value: FieldValue,
    },
    NotEquals {
        field: String,
        value: FieldValue,
    },
    GreaterThan {
        field: String,
        value: FieldValue,
    },
    GreaterThanOrEqual {
        field: String,
        value: FieldValue,
    },
    LessThan {
        field: String,
        value: FieldValue,
    },
    LessThanOrEqual {
        field: String,
        value: FieldValue,
    },
    Range {
        field: String,
        min: FieldValue,
        max: FieldValue,
    },
    Not(Box<Filter>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub enum Sort {
    ByField { field: String, order: SortOrder },
    ByRelevance,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Sort::ByField {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Sort::ByField {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// A document paired with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Results returned by [`IndexManager::search`](crate::IndexManager::search).
///
/// Hits are ranked from 0; `total` counts every match, including the ones
/// cut off by the search limit.
#[derive(Debug, Clone, Default)]
pub struct Hits {
    pub documents: Vec<ScoredDocument>,
    pub total: usize,
}

impl Hits {
    /// Number of hits returned (at most the search limit).
    pub fn size(&self) -> usize {
        self.documents.len()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// The hit at `rank`, best first.
    pub fn get(&self, rank: usize) -> Option<&ScoredDocument> {
        self.documents.get(rank)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScoredDocument> {
        self.documents.iter()
    }
}

impl IntoIterator for Hits {
    type Item = ScoredDocument;
    type IntoIter = std::vec::IntoIter<ScoredDocument>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}
