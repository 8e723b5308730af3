use crate::error::{GriddleError, Result};
use crate::index::document::from_tantivy_date;
use crate::index::schema::FieldType;
use crate::index::Index;
use crate::query::{FilterCompiler, QueryCompiler, SearchQuery};
use crate::types::{FieldValue, Filter, Hits, ScoredDocument, Sort, SortOrder};
use std::cmp::Ordering;
use tantivy::collector::{Count, TopDocs};
use tantivy::columnar::Column;
use tantivy::query::{BooleanQuery, Occur, Query};
use tantivy::{DocAddress, DocId, Searcher, SegmentReader};

/// Runs searches against a pinned searcher snapshot.
pub struct QueryExecutor<'a> {
    index: &'a Index,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(index: &'a Index) -> Self {
        QueryExecutor { index }
    }

    /// Compile `query` and `filter` into a single Tantivy query.
    pub fn build_query(
        &self,
        query: &SearchQuery,
        filter: Option<&Filter>,
    ) -> Result<Box<dyn Query>> {
        let converter = self.index.converter();
        let compiled = QueryCompiler::new(self.index.inner(), &converter).compile(query)?;
        match filter {
            None => Ok(compiled),
            Some(filter) => {
                let filter_query = FilterCompiler::new(&converter).compile(filter)?;
                Ok(Box::new(BooleanQuery::new(vec![
                    (Occur::Must, compiled),
                    (Occur::Must, filter_query),
                ])))
            }
        }
    }

    /// Run a search. Field sorts rank every match before truncating to
    /// `limit`; numeric and date fields are read from their fast columns,
    /// text from stored values.
    ///
    /// # Errors
    ///
    /// [`GriddleError::InvalidQuery`] when the query, filter or a sort key
    /// names an unknown field, or a sort field is neither fast nor stored.
    pub fn execute(
        &self,
        searcher: &Searcher,
        query: &SearchQuery,
        filter: Option<&Filter>,
        sort: &[Sort],
        limit: usize,
    ) -> Result<Hits> {
        let tantivy_query = self.build_query(query, filter)?;
        let plan = self.plan_sort(sort)?;
        let by_relevance = plan.iter().all(|p| matches!(p, SortPlan::Relevance));

        if limit == 0 {
            let total = searcher.search(tantivy_query.as_ref(), &Count)?;
            return Ok(Hits {
                documents: Vec::new(),
                total,
            });
        }

        if by_relevance {
            let (total, top) =
                searcher.search(tantivy_query.as_ref(), &(Count, TopDocs::with_limit(limit)))?;
            let documents = self.load(searcher, top)?;
            return Ok(Hits { documents, total });
        }

        // Field sorts need every match: rank in memory, then truncate.
        let total = searcher.search(tantivy_query.as_ref(), &Count)?;
        if total == 0 {
            return Ok(Hits::default());
        }
        let all = searcher.search(tantivy_query.as_ref(), &TopDocs::with_limit(total))?;

        let columns = plan
            .iter()
            .map(|p| match p {
                SortPlan::Fast {
                    field, field_type, ..
                } => open_columns(searcher, field, *field_type),
                _ => Ok(Vec::new()),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut ranked = Vec::with_capacity(all.len());
        for (score, addr) in all {
            let document = self.index.load_document(searcher, addr)?;
            let keys = plan
                .iter()
                .zip(&columns)
                .map(|(p, segments)| match p {
                    SortPlan::Relevance => None,
                    SortPlan::Stored { field, .. } => document.get(field).cloned(),
                    SortPlan::Fast { .. } => segments
                        .get(addr.segment_ord as usize)
                        .and_then(Option::as_ref)
                        .and_then(|column| column.value(addr.doc_id)),
                })
                .collect();
            ranked.push(Ranked {
                hit: ScoredDocument { document, score },
                keys,
            });
        }

        ranked.sort_by(|a, b| compare_ranked(a, b, &plan));
        let documents = ranked.into_iter().take(limit).map(|r| r.hit).collect();
        tracing::trace!(
            "[SEARCH] sorted {} matches by {} keys",
            total,
            sort.len()
        );
        Ok(Hits { documents, total })
    }

    fn plan_sort<'q>(&self, sort: &'q [Sort]) -> Result<Vec<SortPlan<'q>>> {
        let schema = self.index.schema();
        sort.iter()
            .map(|key| -> Result<SortPlan<'q>> {
                let Sort::ByField { field, order } = key else {
                    return Ok(SortPlan::Relevance);
                };
                let def = schema.get_field(field).ok_or_else(|| {
                    GriddleError::InvalidQuery(format!("unknown sort field '{}'", field))
                })?;
                match def.field_type {
                    FieldType::Integer | FieldType::Float | FieldType::Date
                        if def.options.fast =>
                    {
                        Ok(SortPlan::Fast {
                            field: field.as_str(),
                            field_type: def.field_type,
                            order: *order,
                        })
                    }
                    _ if def.options.stored => Ok(SortPlan::Stored {
                        field: field.as_str(),
                        order: *order,
                    }),
                    _ => Err(GriddleError::InvalidQuery(format!(
                        "field '{}' is neither fast nor stored and cannot be sorted on",
                        field
                    ))),
                }
            })
            .collect()
    }

    fn load(
        &self,
        searcher: &Searcher,
        addresses: Vec<(f32, DocAddress)>,
    ) -> Result<Vec<ScoredDocument>> {
        addresses
            .into_iter()
            .map(|(score, addr)| {
                Ok(ScoredDocument {
                    document: self.index.load_document(searcher, addr)?,
                    score,
                })
            })
            .collect()
    }
}

/// Where one sort key reads its values from.
enum SortPlan<'q> {
    Relevance,
    Stored {
        field: &'q str,
        order: SortOrder,
    },
    Fast {
        field: &'q str,
        field_type: FieldType,
        order: SortOrder,
    },
}

impl SortPlan<'_> {
    fn order(&self) -> Option<SortOrder> {
        match self {
            SortPlan::Relevance => None,
            SortPlan::Stored { order, .. } | SortPlan::Fast { order, .. } => Some(*order),
        }
    }
}

enum FastColumn {
    I64(Column<i64>),
    F64(Column<f64>),
    Date(Column<tantivy::DateTime>),
}

impl FastColumn {
    fn open(reader: &SegmentReader, field: &str, field_type: FieldType) -> Result<Option<Self>> {
        let ff = reader.fast_fields();
        Ok(match field_type {
            FieldType::Integer => ff.column_opt::<i64>(field)?.map(FastColumn::I64),
            FieldType::Float => ff.column_opt::<f64>(field)?.map(FastColumn::F64),
            FieldType::Date => ff
                .column_opt::<tantivy::DateTime>(field)?
                .map(FastColumn::Date),
            FieldType::Text => None,
        })
    }

    fn value(&self, doc: DocId) -> Option<FieldValue> {
        match self {
            FastColumn::I64(c) => c.first(doc).map(FieldValue::Integer),
            FastColumn::F64(c) => c.first(doc).map(FieldValue::Float),
            FastColumn::Date(c) => c
                .first(doc)
                .and_then(|d| from_tantivy_date(&d))
                .map(FieldValue::Date),
        }
    }
}

/// One column per segment, indexed by segment ordinal. A segment without
/// values for the field has no column.
fn open_columns(
    searcher: &Searcher,
    field: &str,
    field_type: FieldType,
) -> Result<Vec<Option<FastColumn>>> {
    searcher
        .segment_readers()
        .iter()
        .map(|reader| FastColumn::open(reader, field, field_type))
        .collect()
}

/// A hit with its sort keys, one slot per sort entry.
struct Ranked {
    hit: ScoredDocument,
    keys: Vec<Option<FieldValue>>,
}

fn compare_ranked(a: &Ranked, b: &Ranked, plan: &[SortPlan<'_>]) -> Ordering {
    for (i, key) in plan.iter().enumerate() {
        let ordering = match key.order() {
            None => b
                .hit
                .score
                .partial_cmp(&a.hit.score)
                .unwrap_or(Ordering::Equal),
            Some(order) => compare_keys(a.keys[i].as_ref(), b.keys[i].as_ref(), order),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Missing values sort last in either direction.
fn compare_keys(a: Option<&FieldValue>, b: Option<&FieldValue>, order: SortOrder) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => {
            let ordering = compare_values(x, y);
            match order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => x.cmp(y),
        (FieldValue::Date(x), FieldValue::Date(y)) => x.cmp(y),
        (FieldValue::Integer(x), FieldValue::Integer(y)) => x.cmp(y),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.type_name().cmp(b.type_name()),
        },
    }
}
