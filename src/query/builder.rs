//! Multilingual dataset query
//!
//! Given a base table, the merged field catalog and caller-supplied
//! filter/sort/paging, produces result rows with correct per-language
//! fan-out when a translation table is present. All collaborators
//! (database, schema catalog, language registry) are passed in explicitly.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde_json::{Value, json};

use crate::db::Database;
use crate::models::field::FieldDescriptor;
use crate::models::{FieldCatalog, FieldKind, LanguageRegistry, Row};
use crate::query::filter::quote_field;
use crate::query::lookup::resolve_lookups;
use crate::query::{FilterExpression, Pager, QueryError, SortSpec};
use crate::schema::{LANG_ID_COLUMN, SchemaCatalog};

/// Which language rows the query materializes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageMode {
    /// Only rows whose translation exists in the given language; no
    /// fan-out, a record without that translation yields nothing
    CurrentOnly(i64),
    /// One row per known language per record, missing translations
    /// synthesized with NULL fields
    All,
    /// Exactly one row per record for the given language, translation
    /// fields NULL when the translation is missing
    Specific(i64),
}

/// Query over one base table and its optional translation table
pub struct DataSetQuery<'a> {
    db: &'a Database,
    languages: &'a LanguageRegistry,
    catalog: &'a FieldCatalog,
    base_table: String,
    translation_table: Option<String>,
    primary_key: String,
    default_order: Option<String>,
    mode: LanguageMode,
}

impl<'a> DataSetQuery<'a> {
    /// Resolve table metadata and build a query handle.
    ///
    /// Translation-table pairing and the default order column are detected
    /// through the schema catalog; the order-column probe runs here, per
    /// query lifecycle, never cached across schema changes.
    pub fn new(
        db: &'a Database,
        schema: &SchemaCatalog,
        languages: &'a LanguageRegistry,
        base_table: &str,
        catalog: &'a FieldCatalog,
        mode: LanguageMode,
    ) -> Result<Self, QueryError> {
        let base_schema = schema.columns(base_table)?;
        let primary_key = base_schema.primary_key()?.name.clone();
        let translation_table = schema.translation_table(base_table)?;
        let default_order = base_schema
            .discover_order_column()?
            .map(|column| column.name.clone());
        Ok(Self {
            db,
            languages,
            catalog,
            base_table: base_table.to_string(),
            translation_table,
            primary_key,
            default_order,
            mode,
        })
    }

    /// Override the detected default order column
    pub fn with_default_order(mut self, column: Option<&str>) -> Self {
        self.default_order = column.map(str::to_string);
        self
    }

    pub fn translation_table(&self) -> Option<&str> {
        self.translation_table.as_deref()
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Fetch rows honoring filter, sort and paging.
    ///
    /// When a pager is given, a companion count query with the same WHERE
    /// clause (and no LIMIT) populates its record count; the count reflects
    /// base records, not fanned-out rows.
    pub fn fetch(
        &self,
        filter: &FilterExpression,
        sort: Option<&SortSpec>,
        pager: Option<&mut Pager>,
    ) -> Result<Vec<Row>, QueryError> {
        let (where_sql, where_params) = filter.compose()?;
        let (sql, params, count_sql, count_params) =
            self.build_select(&where_sql, &where_params, sort, pager.as_deref())?;

        tracing::debug!(%sql, "dataset query");
        let mut rows = self.db.query(&sql, &params)?;

        if let Some(pager) = pager {
            let total = self.db.query_scalar_i64(&count_sql, &count_params)?;
            pager.set_records_count(total.max(0) as u64);
        }

        if self.translation_table.is_some() {
            match self.mode {
                LanguageMode::CurrentOnly(_) => {}
                LanguageMode::Specific(lang) => {
                    for row in &mut rows {
                        row.set(LANG_ID_COLUMN, json!(lang));
                    }
                }
                LanguageMode::All => {
                    rows = self.repair_fanout(rows);
                }
            }
        }

        resolve_lookups(self.db, self.catalog, &self.primary_key, &mut rows)?;
        Ok(rows)
    }

    /// Blank row templates for insert forms: one row per language for
    /// multilingual tables, a single row otherwise. No query is executed.
    pub fn empty_rows(&self) -> Vec<Row> {
        let mut template = Row::new();
        for field in self.catalog {
            let value = match field.kind {
                FieldKind::Multi => json!([]),
                _ => field.default_value.clone().unwrap_or(Value::Null),
            };
            template.set(&field.name, value);
        }

        match &self.translation_table {
            None => vec![template],
            Some(_) => self
                .languages
                .ids()
                .into_iter()
                .map(|lang| {
                    let mut row = template.clone();
                    row.set(LANG_ID_COLUMN, json!(lang));
                    row
                })
                .collect(),
        }
    }

    fn base_fields(&self) -> Vec<&FieldDescriptor> {
        self.catalog
            .iter()
            .filter(|field| field.selectable() && field.table_origin == self.base_table)
            .collect()
    }

    fn translation_fields(&self) -> Vec<&FieldDescriptor> {
        let Some(translation) = &self.translation_table else {
            return Vec::new();
        };
        self.catalog
            .iter()
            .filter(|field| {
                field.selectable()
                    && field.table_origin == *translation
                    && field.name != LANG_ID_COLUMN
            })
            .collect()
    }

    fn build_select(
        &self,
        where_sql: &Option<String>,
        where_params: &[Value],
        sort: Option<&SortSpec>,
        pager: Option<&Pager>,
    ) -> Result<(String, Vec<Value>, String, Vec<Value>), QueryError> {
        let base = quote_field(&self.base_table)?;
        let pk = quote_field(&format!("{}.{}", self.base_table, self.primary_key))?;

        let mut select_list = Vec::new();
        let mut saw_pk = false;
        for field in self.base_fields() {
            if field.name == self.primary_key {
                saw_pk = true;
            }
            select_list.push(format!(
                "{} AS \"{}\"",
                quote_field(&format!("{}.{}", self.base_table, field.name))?,
                field.name
            ));
        }
        if !saw_pk {
            // Fan-out grouping and lookups need the key even when hidden.
            select_list.push(format!("{pk} AS \"{}\"", self.primary_key));
        }

        let mut params: Vec<Value> = Vec::new();
        let mut from_clause = format!("FROM {base}");

        if let Some(translation) = &self.translation_table {
            let trans = quote_field(translation)?;
            let trans_pk = quote_field(&format!("{translation}.{}", self.primary_key))?;
            let trans_lang = quote_field(&format!("{translation}.{LANG_ID_COLUMN}"))?;

            select_list.push(format!("{trans_lang} AS \"{LANG_ID_COLUMN}\""));
            for field in self.translation_fields() {
                select_list.push(format!(
                    "{} AS \"{}\"",
                    quote_field(&format!("{translation}.{}", field.name))?,
                    field.name
                ));
            }

            from_clause.push_str(&format!(" LEFT JOIN {trans} ON {pk} = {trans_pk}"));
            if let LanguageMode::Specific(lang) = self.mode {
                from_clause.push_str(&format!(" AND {trans_lang} = ?"));
                params.push(json!(lang));
            }
        }

        let mut where_clauses: Vec<String> = Vec::new();
        if let Some(where_sql) = where_sql {
            where_clauses.push(where_sql.clone());
            params.extend(where_params.iter().cloned());
        }
        if let (Some(translation), LanguageMode::CurrentOnly(lang)) =
            (&self.translation_table, self.mode)
        {
            let trans_lang = quote_field(&format!("{translation}.{LANG_ID_COLUMN}"))?;
            where_clauses.push(format!("{trans_lang} = ?"));
            params.push(json!(lang));
        }
        let where_clause = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        // Count query shares join, WHERE and params, never LIMIT.
        let count_expr = if self.translation_table.is_some() {
            format!("COUNT(DISTINCT {pk})")
        } else {
            "COUNT(*)".to_string()
        };
        let count_sql = format!("SELECT {count_expr} {from_clause}{where_clause}");
        let count_params = params.clone();

        let mut order_clauses: Vec<String> = Vec::new();
        match sort {
            Some(sort) if !sort.is_empty() => {
                if let Some(clause) = sort.compose()? {
                    order_clauses.push(clause);
                }
            }
            _ => {
                if let Some(order_column) = &self.default_order {
                    order_clauses.push(format!(
                        "{} ASC",
                        quote_field(&format!("{}.{order_column}", self.base_table))?
                    ));
                }
            }
        }
        let mut base_order_clauses = order_clauses.clone();
        if let Some(translation) = &self.translation_table {
            // Stabilize group and in-group ordering.
            order_clauses.push(format!("{pk} ASC"));
            base_order_clauses.push(format!("{pk} ASC"));
            order_clauses.push(format!(
                "{} ASC",
                quote_field(&format!("{translation}.{LANG_ID_COLUMN}"))?
            ));
        }
        let order_clause = if order_clauses.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", order_clauses.join(", "))
        };

        let limit_clause = match pager {
            Some(pager) => format!(" LIMIT {} OFFSET {}", pager.limit(), pager.offset()),
            None => String::new(),
        };

        // A fanned-out page windows base records, not joined rows: LIMIT
        // applies to distinct primary keys and the translations join outside
        // the window, so a group is never cut off at a page boundary.
        let windows_base_records = self.translation_table.is_some()
            && matches!(self.mode, LanguageMode::All)
            && pager.is_some();
        let (sql, params) = if windows_base_records {
            let window_order = if base_order_clauses.is_empty() {
                String::new()
            } else {
                format!(" ORDER BY {}", base_order_clauses.join(", "))
            };
            let window = format!(
                "SELECT {pk} {from_clause}{where_clause} GROUP BY {pk}{window_order}{limit_clause}"
            );
            let windowed_where = if where_clause.is_empty() {
                format!(" WHERE {pk} IN ({window})")
            } else {
                format!("{where_clause} AND {pk} IN ({window})")
            };
            // The window repeats the outer WHERE, so its parameters repeat too.
            let mut window_params = params.clone();
            window_params.extend(params.iter().cloned());
            (
                format!(
                    "SELECT {} {from_clause}{windowed_where}{order_clause}",
                    select_list.join(", ")
                ),
                window_params,
            )
        } else {
            (
                format!(
                    "SELECT {} {from_clause}{where_clause}{order_clause}{limit_clause}",
                    select_list.join(", ")
                ),
                params,
            )
        };
        Ok((sql, params, count_sql, count_params))
    }

    /// Pure fan-out repair: group fetched rows by primary key, then emit
    /// exactly one row per known language per group, synthesizing missing
    /// translations from a sibling with NULL translation fields.
    fn repair_fanout(&self, rows: Vec<Row>) -> Vec<Row> {
        let langs = self.languages.ids();
        let translation_fields: Vec<String> = self
            .translation_fields()
            .into_iter()
            .map(|field| field.name.clone())
            .collect();

        let mut group_order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<Row>> = HashMap::new();
        for row in rows {
            let key = row
                .get(&self.primary_key)
                .cloned()
                .unwrap_or(Value::Null)
                .to_string();
            if !groups.contains_key(&key) {
                group_order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }

        let mut repaired = Vec::with_capacity(group_order.len() * langs.len());
        for key in group_order {
            let group = groups.remove(&key).unwrap_or_default();
            let Some(template) = group.first().cloned() else {
                continue;
            };
            let mut by_lang: BTreeMap<i64, Row> = BTreeMap::new();
            for row in group {
                if let Some(lang) = row.as_i64(LANG_ID_COLUMN) {
                    by_lang.insert(lang, row);
                }
            }
            let missing = langs.len() - langs.iter().filter(|l| by_lang.contains_key(l)).count();
            if missing > 0 {
                tracing::debug!(key = %key, missing, "synthesizing fan-out rows");
            }
            for lang in &langs {
                let row = match by_lang.remove(lang) {
                    Some(row) => row,
                    None => {
                        let mut synthesized = template.clone();
                        for field in &translation_fields {
                            synthesized.set(field, Value::Null);
                        }
                        synthesized.set(LANG_ID_COLUMN, json!(*lang));
                        synthesized
                    }
                };
                repaired.push(row);
            }
        }
        repaired
    }
}
