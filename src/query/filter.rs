use crate::error::{GriddleError, Result};
use crate::index::document::DocumentConverter;
use crate::query::{excluded, included, invalid, range_query};
use crate::types::Filter;
use std::ops::Bound;
use tantivy::query::{AllQuery, BooleanQuery, ConstScoreQuery, Occur, Query, TermQuery};
use tantivy::schema::IndexRecordOption;

/// Compiles [`Filter`] trees into non-scoring Tantivy queries.
pub struct FilterCompiler<'a> {
    converter: &'a DocumentConverter,
}

impl<'a> FilterCompiler<'a> {
    const MAX_FILTER_DEPTH: usize = 10;
    const MAX_BOOLEAN_CLAUSES: usize = 1000;

    pub fn new(converter: &'a DocumentConverter) -> Self {
        FilterCompiler { converter }
    }

    /// Compile `filter`; the result matches with a constant zero score so it
    /// narrows results without changing their ranking.
    pub fn compile(&self, filter: &Filter) -> Result<Box<dyn Query>> {
        let clause_count = count_clauses(filter);
        if clause_count > Self::MAX_BOOLEAN_CLAUSES {
            return Err(GriddleError::InvalidQuery(format!(
                "Filter has {} clauses, exceeds maximum {}",
                clause_count,
                Self::MAX_BOOLEAN_CLAUSES
            )));
        }
        let query = self.compile_inner(filter, 0)?;
        Ok(Box::new(ConstScoreQuery::new(query, 0.0)))
    }

    fn compile_inner(&self, filter: &Filter, depth: usize) -> Result<Box<dyn Query>> {
        if depth > Self::MAX_FILTER_DEPTH {
            return Err(GriddleError::InvalidQuery(format!(
                "Filter nesting exceeds maximum depth {}",
                Self::MAX_FILTER_DEPTH
            )));
        }

        let conv = self.converter;
        match filter {
            Filter::Equals { field, value } => {
                let term = conv.term(field, value).map_err(invalid)?;
                Ok(Box::new(TermQuery::new(term, IndexRecordOption::Basic)))
            }
            Filter::NotEquals { field, value } => {
                let inner = self.compile_inner(
                    &Filter::Equals {
                        field: field.clone(),
                        value: value.clone(),
                    },
                    depth + 1,
                )?;
                Ok(negate(inner))
            }
            Filter::GreaterThan { field, value } => {
                range_query(conv, field, excluded(conv, field, value)?, Bound::Unbounded)
            }
            Filter::GreaterThanOrEqual { field, value } => range_query(
                conv,
                field,
                included(conv, field, Some(value))?,
                Bound::Unbounded,
            ),
            Filter::LessThan { field, value } => {
                range_query(conv, field, Bound::Unbounded, excluded(conv, field, value)?)
            }
            Filter::LessThanOrEqual { field, value } => range_query(
                conv,
                field,
                Bound::Unbounded,
                included(conv, field, Some(value))?,
            ),
            Filter::Range { field, min, max } => range_query(
                conv,
                field,
                included(conv, field, Some(min))?,
                included(conv, field, Some(max))?,
            ),
            Filter::Not(inner) => Ok(negate(self.compile_inner(inner, depth + 1)?)),
            Filter::And(filters) => {
                if filters.is_empty() {
                    return Ok(Box::new(AllQuery));
                }
                let clauses = filters
                    .iter()
                    .map(|f| Ok((Occur::Must, self.compile_inner(f, depth + 1)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
            Filter::Or(filters) => {
                if filters.is_empty() {
                    return Ok(Box::new(tantivy::query::EmptyQuery));
                }
                let clauses = filters
                    .iter()
                    .map(|f| Ok((Occur::Should, self.compile_inner(f, depth + 1)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Box::new(BooleanQuery::new(clauses)))
            }
        }
    }
}

fn negate(inner: Box<dyn Query>) -> Box<dyn Query> {
    Box::new(BooleanQuery::new(vec![
        (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
        (Occur::MustNot, inner),
    ]))
}

fn count_clauses(filter: &Filter) -> usize {
    match filter {
        Filter::And(filters) | Filter::Or(filters) => {
            1 + filters.iter().map(count_clauses).sum::<usize>()
        }
        Filter::Not(inner) => 1 + count_clauses(inner),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::{FieldOptions, Schema};
    use crate::index::Index;
    use crate::types::FieldValue;

    fn index() -> Index {
        let schema = Schema::builder()
            .add_text_field("category", FieldOptions::keyword())
            .add_integer_field("stock", FieldOptions::default())
            .build()
            .unwrap();
        Index::create_in_ram(schema).unwrap()
    }

    #[test]
    fn too_many_clauses_rejected() {
        let index = index();
        let converter = index.converter();
        let filters: Vec<Filter> = (0..1001)
            .map(|i| Filter::Equals {
                field: "stock".to_string(),
                value: FieldValue::Integer(i),
            })
            .collect();
        let result = FilterCompiler::new(&converter).compile(&Filter::Or(filters));
        assert!(result.is_err());
    }

    #[test]
    fn deep_nesting_rejected() {
        let index = index();
        let converter = index.converter();
        let mut filter = Filter::Equals {
            field: "category".to_string(),
            value: "syrup".into(),
        };
        for _ in 0..12 {
            filter = Filter::Not(Box::new(filter));
        }
        assert!(FilterCompiler::new(&converter).compile(&filter).is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let index = index();
        let converter = index.converter();
        let result = FilterCompiler::new(&converter).compile(&Filter::GreaterThan {
            field: "weight".to_string(),
            value: FieldValue::Integer(3),
        });
        assert!(matches!(result, Err(GriddleError::InvalidQuery(_))));
    }
}
