use crate::error::{GriddleError, Result};
use std::collections::HashMap;
use tantivy::schema::{
    DateOptions, Field, IndexRecordOption, NumericOptions, Schema as TantivySchema,
    TextFieldIndexing, TextOptions,
};

pub const DEFAULT_ID_FIELD: &str = "id";

/// Tokenizer used for untokenized text: the whole value is one term.
pub const RAW_TOKENIZER: &str = "raw";
/// Tokenizer used for tokenized text.
pub const TEXT_TOKENIZER: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOptions {
    pub stored: bool,
    pub indexed: bool,
    /// Text only: split into words at index time. Ignored for other types.
    pub tokenized: bool,
    /// Numeric and date only: columnar storage, needed for range filters.
    pub fast: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        FieldOptions {
            stored: true,
            indexed: true,
            tokenized: true,
            fast: true,
        }
    }
}

impl FieldOptions {
    /// Stored and indexed as a single term.
    pub fn keyword() -> Self {
        FieldOptions {
            tokenized: false,
            ..FieldOptions::default()
        }
    }

    /// Stored only; not searchable.
    pub fn stored_only() -> Self {
        FieldOptions {
            stored: true,
            indexed: false,
            tokenized: false,
            fast: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub options: FieldOptions,
}

/// Typed field layout of an index.
///
/// Every schema carries an integer identifier field (default `"id"`),
/// stored, indexed and fast, which the coordinator uses for upserts and
/// removals.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldDefinition>,
    field_map: HashMap<String, usize>,
    id_field: String,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.field_map.get(name).map(|&idx| &self.fields[idx])
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Indexed, tokenized text fields: the default targets of a text query.
    pub fn default_search_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| {
                f.field_type == FieldType::Text && f.options.indexed && f.options.tokenized
            })
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn to_tantivy(&self) -> TantivySchema {
        let mut builder = TantivySchema::builder();

        for def in &self.fields {
            let opts = &def.options;
            match def.field_type {
                FieldType::Text => {
                    let mut text_opts = TextOptions::default();
                    if opts.indexed {
                        let indexing = if opts.tokenized {
                            TextFieldIndexing::default()
                                .set_tokenizer(TEXT_TOKENIZER)
                                .set_index_option(IndexRecordOption::WithFreqsAndPositions)
                        } else {
                            TextFieldIndexing::default()
                                .set_tokenizer(RAW_TOKENIZER)
                                .set_index_option(IndexRecordOption::Basic)
                        };
                        text_opts = text_opts.set_indexing_options(indexing);
                    }
                    if opts.stored {
                        text_opts = text_opts.set_stored();
                    }
                    builder.add_text_field(&def.name, text_opts);
                }
                FieldType::Integer => {
                    builder.add_i64_field(&def.name, numeric_options(opts));
                }
                FieldType::Float => {
                    builder.add_f64_field(&def.name, numeric_options(opts));
                }
                FieldType::Date => {
                    let mut date_opts = DateOptions::default();
                    if opts.indexed {
                        date_opts = date_opts.set_indexed();
                    }
                    if opts.stored {
                        date_opts = date_opts.set_stored();
                    }
                    if opts.fast {
                        date_opts = date_opts.set_fast();
                    }
                    builder.add_date_field(&def.name, date_opts);
                }
            }
        }

        builder.build()
    }

    /// Rebuild a [`Schema`] from an index opened from disk.
    pub fn from_tantivy(tantivy_schema: &TantivySchema, id_field: &str) -> Result<Self> {
        if tantivy_schema.get_field(id_field).is_err() {
            return Err(GriddleError::InvalidSchema(format!(
                "index has no id field '{}'",
                id_field
            )));
        }
        let mut builder = SchemaBuilder::new().id_field(id_field);

        for (_field, entry) in tantivy_schema.fields() {
            let name = entry.name().to_string();
            let (field_type, tokenized) = match entry.field_type() {
                tantivy::schema::FieldType::Str(text_opts) => {
                    let tokenized = text_opts
                        .get_indexing_options()
                        .map(|idx| idx.tokenizer() != RAW_TOKENIZER)
                        .unwrap_or(false);
                    (FieldType::Text, tokenized)
                }
                tantivy::schema::FieldType::I64(_) => (FieldType::Integer, false),
                tantivy::schema::FieldType::F64(_) => (FieldType::Float, false),
                tantivy::schema::FieldType::Date(_) => (FieldType::Date, false),
                other => {
                    return Err(GriddleError::InvalidSchema(format!(
                        "field '{}' has unsupported type {:?}",
                        name,
                        other.value_type()
                    )))
                }
            };
            builder = builder.add_field(FieldDefinition {
                name,
                field_type,
                options: FieldOptions {
                    stored: entry.is_stored(),
                    indexed: entry.is_indexed(),
                    tokenized,
                    fast: entry.is_fast(),
                },
            });
        }

        builder.build()
    }

    /// Resolve a field name to its Tantivy handle and definition.
    pub(crate) fn resolve(
        &self,
        tantivy_schema: &TantivySchema,
        name: &str,
    ) -> Result<(Field, &FieldDefinition)> {
        let def = self
            .get_field(name)
            .ok_or_else(|| GriddleError::FieldNotFound(name.to_string()))?;
        let field = tantivy_schema
            .get_field(name)
            .map_err(|_| GriddleError::FieldNotFound(name.to_string()))?;
        Ok((field, def))
    }
}

fn numeric_options(opts: &FieldOptions) -> NumericOptions {
    let mut numeric = NumericOptions::default();
    if opts.indexed {
        numeric = numeric.set_indexed();
    }
    if opts.stored {
        numeric = numeric.set_stored();
    }
    if opts.fast {
        numeric = numeric.set_fast();
    }
    numeric
}

pub struct SchemaBuilder {
    fields: Vec<FieldDefinition>,
    id_field: String,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        SchemaBuilder {
            fields: Vec::new(),
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }

    pub fn id_field(mut self, name: &str) -> Self {
        self.id_field = name.to_string();
        self
    }

    pub fn add_field(mut self, def: FieldDefinition) -> Self {
        self.fields.push(def);
        self
    }

    pub fn add_text_field(self, name: &str, options: FieldOptions) -> Self {
        self.add_field(FieldDefinition {
            name: name.to_string(),
            field_type: FieldType::Text,
            options,
        })
    }

    pub fn add_integer_field(self, name: &str, options: FieldOptions) -> Self {
        self.add_field(FieldDefinition {
            name: name.to_string(),
            field_type: FieldType::Integer,
            options,
        })
    }

    pub fn add_float_field(self, name: &str, options: FieldOptions) -> Self {
        self.add_field(FieldDefinition {
            name: name.to_string(),
            field_type: FieldType::Float,
            options,
        })
    }

    pub fn add_date_field(self, name: &str, options: FieldOptions) -> Self {
        self.add_field(FieldDefinition {
            name: name.to_string(),
            field_type: FieldType::Date,
            options,
        })
    }

    pub fn build(self) -> Result<Schema> {
        let mut fields = Vec::with_capacity(self.fields.len() + 1);
        let mut field_map = HashMap::new();

        match self.fields.iter().find(|f| f.name == self.id_field) {
            Some(def) => {
                if def.field_type != FieldType::Integer || !def.options.indexed {
                    return Err(GriddleError::InvalidSchema(format!(
                        "id field '{}' must be an indexed integer field",
                        self.id_field
                    )));
                }
            }
            None => fields.push(FieldDefinition {
                name: self.id_field.clone(),
                field_type: FieldType::Integer,
                options: FieldOptions {
                    stored: true,
                    indexed: true,
                    tokenized: false,
                    fast: true,
                },
            }),
        }
        fields.extend(self.fields);

        for (idx, def) in fields.iter().enumerate() {
            if field_map.insert(def.name.clone(), idx).is_some() {
                return Err(GriddleError::InvalidSchema(format!(
                    "duplicate field '{}'",
                    def.name
                )));
            }
        }

        Ok(Schema {
            fields,
            field_map,
            id_field: self.id_field,
        })
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_field_is_added_automatically() {
        let schema = Schema::builder()
            .add_text_field("title", FieldOptions::default())
            .build()
            .unwrap();
        let id = schema.get_field("id").unwrap();
        assert_eq!(id.field_type, FieldType::Integer);
        assert!(id.options.indexed && id.options.stored);
        assert_eq!(schema.fields().len(), 2);
    }

    #[test]
    fn text_id_field_is_rejected() {
        let result = Schema::builder()
            .id_field("key")
            .add_text_field("key", FieldOptions::keyword())
            .build();
        assert!(matches!(result, Err(GriddleError::InvalidSchema(_))));
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let result = Schema::builder()
            .add_text_field("title", FieldOptions::default())
            .add_text_field("title", FieldOptions::keyword())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn tantivy_schema_round_trips_flags() {
        let schema = Schema::builder()
            .add_text_field("title", FieldOptions::default())
            .add_text_field("slug", FieldOptions::keyword())
            .add_text_field("body", FieldOptions::stored_only())
            .add_float_field("price", FieldOptions::default())
            .add_date_field("published", FieldOptions::default())
            .build()
            .unwrap();

        let rebuilt = Schema::from_tantivy(&schema.to_tantivy(), "id").unwrap();

        assert!(rebuilt.get_field("title").unwrap().options.tokenized);
        assert!(!rebuilt.get_field("slug").unwrap().options.tokenized);
        assert!(!rebuilt.get_field("body").unwrap().options.indexed);
        assert_eq!(
            rebuilt.get_field("published").unwrap().field_type,
            FieldType::Date
        );
        assert_eq!(rebuilt.default_search_fields(), vec!["title"]);
    }
}
