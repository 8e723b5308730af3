pub mod executor;
pub mod filter;

pub use executor::QueryExecutor;
pub use filter::FilterCompiler;

use crate::error::{GriddleError, Result};
use crate::index::document::DocumentConverter;
use crate::types::FieldValue;
use std::ops::Bound;
use tantivy::query::{AllQuery, BooleanQuery, Occur, Query, RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;

/// A typed search predicate.
///
/// Field names and values are checked against the index schema when the
/// query is compiled; unknown fields, unindexed fields, values of the
/// wrong type and unparseable text all yield
/// [`GriddleError::InvalidQuery`].
#[derive(Debug, Clone)]
pub enum SearchQuery {
    /// Every document.
    All,
    /// Exact match on one field.
    Term { field: String, value: FieldValue },
    /// Free text in Tantivy's query syntax. Empty `fields` searches every
    /// indexed, tokenized text field.
    Text { fields: Vec<String>, text: String },
    /// Inclusive range; `None` leaves that side open.
    Range {
        field: String,
        min: Option<FieldValue>,
        max: Option<FieldValue>,
    },
    Bool {
        must: Vec<SearchQuery>,
        should: Vec<SearchQuery>,
        must_not: Vec<SearchQuery>,
    },
}

impl SearchQuery {
    pub fn term(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        SearchQuery::Term {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        SearchQuery::Text {
            fields: Vec::new(),
            text: text.into(),
        }
    }

    pub fn text_in(fields: &[&str], text: impl Into<String>) -> Self {
        SearchQuery::Text {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            text: text.into(),
        }
    }

    pub fn range(
        field: impl Into<String>,
        min: Option<FieldValue>,
        max: Option<FieldValue>,
    ) -> Self {
        SearchQuery::Range {
            field: field.into(),
            min,
            max,
        }
    }

    pub fn all_of(queries: Vec<SearchQuery>) -> Self {
        SearchQuery::Bool {
            must: queries,
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    pub fn any_of(queries: Vec<SearchQuery>) -> Self {
        SearchQuery::Bool {
            must: Vec::new(),
            should: queries,
            must_not: Vec::new(),
        }
    }
}

/// Compiles [`SearchQuery`] values into Tantivy queries for one index.
pub struct QueryCompiler<'a> {
    index: &'a tantivy::Index,
    converter: &'a DocumentConverter,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(index: &'a tantivy::Index, converter: &'a DocumentConverter) -> Self {
        QueryCompiler { index, converter }
    }

    pub fn compile(&self, query: &SearchQuery) -> Result<Box<dyn Query>> {
        match query {
            SearchQuery::All => Ok(Box::new(AllQuery)),
            SearchQuery::Term { field, value } => {
                let term = self.converter.term(field, value).map_err(invalid)?;
                Ok(Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)))
            }
            SearchQuery::Text { fields, text } => self.compile_text(fields, text),
            SearchQuery::Range { field, min, max } => range_query(
                self.converter,
                field,
                included(self.converter, field, min.as_ref())?,
                included(self.converter, field, max.as_ref())?,
            ),
            SearchQuery::Bool {
                must,
                should,
                must_not,
            } => {
                let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for q in must {
                    clauses.push((Occur::Must, self.compile(q)?));
                }
                for q in should {
                    clauses.push((Occur::Should, self.compile(q)?));
                }
                for q in must_not {
                    clauses.push((Occur::MustNot, self.compile(q)?));
                }
                if must.is_empty() && should.is_empty() {
                    clauses.push((Occur::Must, Box::new(AllQuery)));
                }
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
        }
    }

    fn compile_text(&self, fields: &[String], text: &str) -> Result<Box<dyn Query>> {
        let schema = self.converter.schema();
        let names: Vec<String> = if fields.is_empty() {
            schema
                .default_search_fields()
                .into_iter()
                .map(str::to_string)
                .collect()
        } else {
            fields.to_vec()
        };
        if names.is_empty() {
            return Err(GriddleError::InvalidQuery(
                "no indexed text fields to search".to_string(),
            ));
        }

        let mut targets = Vec::with_capacity(names.len());
        for name in &names {
            let def = schema
                .get_field(name)
                .ok_or_else(|| GriddleError::InvalidQuery(format!("unknown field '{}'", name)))?;
            if !def.options.indexed {
                return Err(GriddleError::InvalidQuery(format!(
                    "field '{}' is not indexed",
                    name
                )));
            }
            let field = self
                .converter
                .tantivy_schema()
                .get_field(name)
                .map_err(|_| GriddleError::InvalidQuery(format!("unknown field '{}'", name)))?;
            targets.push(field);
        }

        let parser = tantivy::query::QueryParser::for_index(self.index, targets);
        parser
            .parse_query(text)
            .map_err(|e| GriddleError::InvalidQuery(e.to_string()))
    }
}

/// Schema lookups and coercion failures surface as invalid queries.
pub(crate) fn invalid(e: GriddleError) -> GriddleError {
    match e {
        GriddleError::InvalidQuery(_) => e,
        GriddleError::FieldNotFound(field) => {
            GriddleError::InvalidQuery(format!("unknown field '{}'", field))
        }
        other => GriddleError::InvalidQuery(other.to_string()),
    }
}

pub(crate) fn included(
    converter: &DocumentConverter,
    field: &str,
    value: Option<&FieldValue>,
) -> Result<Bound<tantivy::Term>> {
    match value {
        Some(v) => Ok(Bound::Included(converter.term(field, v).map_err(invalid)?)),
        None => Ok(Bound::Unbounded),
    }
}

pub(crate) fn excluded(
    converter: &DocumentConverter,
    field: &str,
    value: &FieldValue,
) -> Result<Bound<tantivy::Term>> {
    Ok(Bound::Excluded(converter.term(field, value).map_err(invalid)?))
}

pub(crate) fn range_query(
    converter: &DocumentConverter,
    field: &str,
    lower: Bound<tantivy::Term>,
    upper: Bound<tantivy::Term>,
) -> Result<Box<dyn Query>> {
    if matches!((&lower, &upper), (Bound::Unbounded, Bound::Unbounded)) {
        converter
            .schema()
            .get_field(field)
            .ok_or_else(|| GriddleError::InvalidQuery(format!("unknown field '{}'", field)))?;
        return Ok(Box::new(AllQuery));
    }
    Ok(Box::new(RangeQuery::new(lower, upper)))
}
