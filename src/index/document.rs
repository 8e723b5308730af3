use crate::error::{GriddleError, Result};
use crate::index::schema::{FieldDefinition, FieldType, Schema};
use crate::types::{Document, FieldValue};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tantivy::schema::{Field, OwnedValue, Schema as TantivySchema};
use tantivy::{TantivyDocument, Term};

/// A [`FieldValue`] converted to the representation its schema field expects.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Coerced {
    Text(String),
    I64(i64),
    F64(f64),
    Date(tantivy::DateTime),
}

/// Convert `value` to the type declared for `def`.
///
/// Text fields accept anything (numbers and dates are rendered). Numeric
/// fields accept numbers and numeric strings; date fields accept dates,
/// RFC 3339 strings and integer epoch seconds. Dates are indexed at whole
/// second precision and must fit Tantivy's nanosecond range (roughly the
/// years 1677 to 2262).
pub(crate) fn coerce(def: &FieldDefinition, value: &FieldValue) -> Result<Coerced> {
    let mismatch = || GriddleError::TypeMismatch {
        field: def.name.clone(),
        expected: format!("{:?}", def.field_type).to_lowercase(),
        actual: value.type_name().to_string(),
    };

    match (def.field_type, value) {
        (FieldType::Text, FieldValue::Text(s)) => Ok(Coerced::Text(s.clone())),
        (FieldType::Text, FieldValue::Integer(i)) => Ok(Coerced::Text(i.to_string())),
        (FieldType::Text, FieldValue::Float(f)) => Ok(Coerced::Text(f.to_string())),
        (FieldType::Text, FieldValue::Date(d)) => Ok(Coerced::Text(d.to_rfc3339())),

        (FieldType::Integer, FieldValue::Integer(i)) => Ok(Coerced::I64(*i)),
        (FieldType::Integer, FieldValue::Float(f)) => {
            // i64::MAX is not representable; 2^63 rounds to it and must be rejected.
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Ok(Coerced::I64(*f as i64))
            } else {
                Err(mismatch())
            }
        }
        (FieldType::Integer, FieldValue::Text(s)) => {
            s.trim().parse().map(Coerced::I64).map_err(|_| mismatch())
        }

        (FieldType::Float, FieldValue::Integer(i)) => Ok(Coerced::F64(*i as f64)),
        (FieldType::Float, FieldValue::Float(f)) => Ok(Coerced::F64(*f)),
        (FieldType::Float, FieldValue::Text(s)) => {
            s.trim().parse().map(Coerced::F64).map_err(|_| mismatch())
        }

        (FieldType::Date, FieldValue::Date(d)) => {
            to_tantivy_date(d).map(Coerced::Date).ok_or_else(mismatch)
        }
        (FieldType::Date, FieldValue::Integer(secs)) => {
            date_from_secs(*secs).map(Coerced::Date).ok_or_else(mismatch)
        }
        (FieldType::Date, FieldValue::Text(s)) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .and_then(|d| to_tantivy_date(&d.with_timezone(&Utc)))
            .map(Coerced::Date)
            .ok_or_else(mismatch),

        _ => Err(mismatch()),
    }
}

/// `None` when the instant overflows Tantivy's nanosecond timestamps.
fn date_from_secs(secs: i64) -> Option<tantivy::DateTime> {
    secs.checked_mul(1_000_000_000)
        .map(tantivy::DateTime::from_timestamp_nanos)
}

/// Sub-second precision is dropped.
fn to_tantivy_date(d: &DateTime<Utc>) -> Option<tantivy::DateTime> {
    date_from_secs(d.timestamp())
}

pub(crate) fn from_tantivy_date(d: &tantivy::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(d.into_timestamp_micros())
}

/// Converts between [`Document`]s and Tantivy documents for one schema.
pub struct DocumentConverter {
    schema: Schema,
    tantivy_schema: TantivySchema,
    id_field: Field,
}

impl DocumentConverter {
    pub fn new(schema: &Schema, tantivy_schema: &TantivySchema) -> Result<Self> {
        let id_field = tantivy_schema
            .get_field(schema.id_field())
            .map_err(|_| GriddleError::FieldNotFound(schema.id_field().to_string()))?;

        Ok(DocumentConverter {
            schema: schema.clone(),
            tantivy_schema: tantivy_schema.clone(),
            id_field,
        })
    }

    pub fn id_field(&self) -> Field {
        self.id_field
    }

    /// Validate and convert a document.
    ///
    /// # Errors
    ///
    /// [`GriddleError::MissingField`] when the identifier is absent or not an
    /// integer, [`GriddleError::FieldNotFound`] for fields outside the
    /// schema, [`GriddleError::TypeMismatch`] for values that cannot be
    /// coerced to their field's type.
    pub fn to_tantivy(&self, doc: &Document) -> Result<TantivyDocument> {
        let id_name = self.schema.id_field();
        if doc.id(id_name).is_none() {
            return Err(GriddleError::MissingField(id_name.to_string()));
        }

        let mut tantivy_doc = TantivyDocument::new();
        for (name, value) in &doc.fields {
            let (field, def) = self.schema.resolve(&self.tantivy_schema, name)?;
            match coerce(def, value)? {
                Coerced::Text(s) => tantivy_doc.add_text(field, s),
                Coerced::I64(i) => tantivy_doc.add_i64(field, i),
                Coerced::F64(f) => tantivy_doc.add_f64(field, f),
                Coerced::Date(d) => tantivy_doc.add_date(field, d),
            }
        }
        Ok(tantivy_doc)
    }

    /// Rebuild a [`Document`] from the stored fields of a Tantivy document.
    pub fn from_tantivy(&self, tantivy_doc: &TantivyDocument) -> Document {
        let mut fields = HashMap::new();
        for def in self.schema.fields() {
            if !def.options.stored {
                continue;
            }
            let Ok(field) = self.tantivy_schema.get_field(&def.name) else {
                continue;
            };
            if let Some(value) = tantivy_doc.get_first(field) {
                let owned: OwnedValue = value.into();
                if let Some(fv) = owned_to_field_value(&owned) {
                    fields.insert(def.name.clone(), fv);
                }
            }
        }
        Document { fields }
    }

    /// Build the exact-match term for `value` in field `name`.
    ///
    /// Tokenized text is matched on its lowercased form, which is what the
    /// default tokenizer stores for a single word.
    pub fn term(&self, name: &str, value: &FieldValue) -> Result<Term> {
        let (field, def) = self.schema.resolve(&self.tantivy_schema, name)?;
        if !def.options.indexed {
            return Err(GriddleError::InvalidQuery(format!(
                "field '{}' is not indexed",
                name
            )));
        }
        Ok(match coerce(def, value)? {
            Coerced::Text(s) if def.options.tokenized => {
                Term::from_field_text(field, &s.to_lowercase())
            }
            Coerced::Text(s) => Term::from_field_text(field, &s),
            Coerced::I64(i) => Term::from_field_i64(field, i),
            Coerced::F64(f) => Term::from_field_f64(field, f),
            Coerced::Date(d) => Term::from_field_date(field, d),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn tantivy_schema(&self) -> &TantivySchema {
        &self.tantivy_schema
    }
}

fn owned_to_field_value(value: &OwnedValue) -> Option<FieldValue> {
    match value {
        OwnedValue::Str(s) => Some(FieldValue::Text(s.clone())),
        OwnedValue::I64(i) => Some(FieldValue::Integer(*i)),
        OwnedValue::U64(u) => Some(FieldValue::Integer(*u as i64)),
        OwnedValue::F64(f) => Some(FieldValue::Float(*f)),
        OwnedValue::Date(d) => from_tantivy_date(d).map(FieldValue::Date),
        _ => None,
    }
}
