//! Multilingual query tests

use std::sync::Mutex;

use data_access_sdk::{
    DataSetQuery, Database, Direction, FieldCatalog, FieldDescriptor, FieldKind, FilterExpression,
    Language, LanguageMode, LanguageRegistry, MultiLink, Pager, Predicate, Row, SchemaCatalog,
    SortSpec, ValueLookup,
};
use serde_json::{Value, json};

fn fixture() -> Database {
    let db = Database::memory().unwrap();
    db.execute_batch(
        "CREATE TABLE authors (author_id INTEGER PRIMARY KEY, author_name TEXT);
         CREATE TABLE articles (
             article_id INTEGER PRIMARY KEY,
             author_id INTEGER,
             article_order_num INTEGER
         );
         CREATE TABLE articles_translation (
             article_id INTEGER NOT NULL,
             lang_id INTEGER NOT NULL,
             article_title TEXT,
             PRIMARY KEY (article_id, lang_id)
         );
         CREATE TABLE items (
             item_id INTEGER PRIMARY KEY,
             author_id INTEGER,
             item_order_num INTEGER
         );
         CREATE TABLE item_tags (item_id INTEGER, tag TEXT);

         INSERT INTO authors VALUES (1, 'Ann'), (2, 'Ben');
         INSERT INTO articles VALUES (10, 1, 1), (20, 2, 2), (30, 99, 3);
         INSERT INTO articles_translation VALUES
             (10, 1, 'Hello'),
             (20, 1, 'World'),
             (20, 2, 'Monde');
         INSERT INTO items VALUES (10, 1, 1), (20, 2, 2), (30, 99, 3);
         INSERT INTO item_tags VALUES (10, 'news'), (10, 'tech');",
    )
    .unwrap();
    db
}

fn languages() -> LanguageRegistry {
    LanguageRegistry::new(
        vec![
            Language::new(1, "en", "English"),
            Language::new(2, "fr", "Français"),
        ],
        1,
    )
}

fn article_catalog(schema: &SchemaCatalog) -> FieldCatalog {
    let base = schema.columns("articles").unwrap();
    let translation = schema.columns("articles_translation").unwrap();
    FieldCatalog::from_schema(&base, Some(&translation)).unwrap()
}

fn item_catalog_with_author_lookup(schema: &SchemaCatalog) -> FieldCatalog {
    let base = schema.columns("items").unwrap();
    let mut catalog = FieldCatalog::from_schema(&base, None).unwrap();
    catalog.modify("author_id", |field| {
        field.kind = FieldKind::Value;
        field.value_lookup = Some(ValueLookup {
            table: "authors".to_string(),
            key_column: "author_id".to_string(),
            label_column: "author_name".to_string(),
        });
    });
    catalog
}

fn rows_for<'a>(rows: &'a [Row], key: &str, id: i64) -> Vec<&'a Row> {
    rows.iter().filter(|row| row.as_i64(key) == Some(id)).collect()
}

mod fan_out {
    use super::*;

    #[test]
    fn all_languages_yields_one_row_per_language() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query =
            DataSetQuery::new(&db, &schema, &registry, "articles", &catalog, LanguageMode::All)
                .unwrap();

        let rows = query.fetch(&FilterExpression::new(), None, None).unwrap();
        // 3 articles x 2 languages, ordered by the detected order column.
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows.iter().map(|r| r.as_i64("article_id").unwrap()).collect::<Vec<_>>(),
            vec![10, 10, 20, 20, 30, 30]
        );

        let hello = rows_for(&rows, "article_id", 10);
        assert_eq!(hello[0].as_i64("lang_id"), Some(1));
        assert_eq!(hello[0].as_str("article_title"), Some("Hello"));
        assert_eq!(hello[1].as_i64("lang_id"), Some(2));
        assert!(hello[1].is_null("article_title"));
        // Base fields identical across the language rows.
        assert_eq!(hello[0].get("author_id"), hello[1].get("author_id"));
    }

    #[test]
    fn record_without_any_translation_still_fans_out() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query =
            DataSetQuery::new(&db, &schema, &registry, "articles", &catalog, LanguageMode::All)
                .unwrap();

        let filter = FilterExpression::new().eq("articles.article_id", json!(30));
        let rows = query.fetch(&filter, None, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows.iter().map(|r| r.as_i64("lang_id").unwrap()).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(rows.iter().all(|r| r.is_null("article_title")));
    }

    #[test]
    fn current_language_only_returns_existing_translations() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query = DataSetQuery::new(
            &db,
            &schema,
            &registry,
            "articles",
            &catalog,
            LanguageMode::CurrentOnly(2),
        )
        .unwrap();

        let rows = query.fetch(&FilterExpression::new(), None, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_i64("article_id"), Some(20));
        assert!(rows.iter().all(|r| r.as_i64("lang_id") == Some(2)));

        // The article with only an English translation yields nothing.
        let filter = FilterExpression::new().eq("articles.article_id", json!(10));
        assert!(query.fetch(&filter, None, None).unwrap().is_empty());
    }

    #[test]
    fn specific_language_yields_exactly_one_row_per_record() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query = DataSetQuery::new(
            &db,
            &schema,
            &registry,
            "articles",
            &catalog,
            LanguageMode::Specific(2),
        )
        .unwrap();

        let rows = query.fetch(&FilterExpression::new(), None, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.as_i64("lang_id") == Some(2)));
        assert!(rows_for(&rows, "article_id", 10)[0].is_null("article_title"));
        assert_eq!(
            rows_for(&rows, "article_id", 20)[0].as_str("article_title"),
            Some("Monde")
        );
    }

    #[test]
    fn paging_windows_base_records_not_joined_rows() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query =
            DataSetQuery::new(&db, &schema, &registry, "articles", &catalog, LanguageMode::All)
                .unwrap();

        let mut pager = Pager::new(2, 0);
        let rows = query
            .fetch(&FilterExpression::new(), None, Some(&mut pager))
            .unwrap();
        // Two base records per page, each fanned out to both languages.
        assert_eq!(pager.records_count(), Some(3));
        assert_eq!(pager.page_count(), Some(2));
        assert_eq!(
            rows.iter().map(|r| r.as_i64("article_id").unwrap()).collect::<Vec<_>>(),
            vec![10, 10, 20, 20]
        );
        // Article 20 straddles the joined-row boundary; its stored French
        // translation must still come through intact.
        let monde = rows
            .iter()
            .find(|r| r.as_i64("article_id") == Some(20) && r.as_i64("lang_id") == Some(2))
            .unwrap();
        assert_eq!(monde.as_str("article_title"), Some("Monde"));

        let mut pager = Pager::from_page(2, 2);
        let rows = query
            .fetch(&FilterExpression::new(), None, Some(&mut pager))
            .unwrap();
        assert_eq!(
            rows.iter().map(|r| r.as_i64("article_id").unwrap()).collect::<Vec<_>>(),
            vec![30, 30]
        );
    }

    #[test]
    fn empty_rows_synthesize_one_blank_row_per_language() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query =
            DataSetQuery::new(&db, &schema, &registry, "articles", &catalog, LanguageMode::All)
                .unwrap();

        let rows = query.empty_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_i64("lang_id"), Some(1));
        assert_eq!(rows[1].as_i64("lang_id"), Some(2));
        assert!(rows[0].is_null("article_title"));
        assert!(rows[0].contains("article_id"));
    }
}

mod plain_tables {
    use super::*;

    #[test]
    fn no_translation_path_selects_base_fields_only() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let base = schema.columns("authors").unwrap();
        let catalog = FieldCatalog::from_schema(&base, None).unwrap();
        let query = DataSetQuery::new(
            &db,
            &schema,
            &registry,
            "authors",
            &catalog,
            LanguageMode::All,
        )
        .unwrap();
        assert!(query.translation_table().is_none());

        let sort = SortSpec::by("author_name", Direction::Desc);
        let rows = query.fetch(&FilterExpression::new(), Some(&sort), None).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.as_str("author_name").unwrap()).collect::<Vec<_>>(),
            vec!["Ben", "Ann"]
        );
        assert!(!rows[0].contains("lang_id"));
    }

    #[test]
    fn filters_compose_with_in_lists() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let base = schema.columns("items").unwrap();
        let catalog = FieldCatalog::from_schema(&base, None).unwrap();
        let query =
            DataSetQuery::new(&db, &schema, &registry, "items", &catalog, LanguageMode::All)
                .unwrap();

        let mut filter = FilterExpression::new();
        filter.push(Predicate::In(
            "item_id".to_string(),
            vec![json!(10), json!(30)],
        ));
        let rows = query.fetch(&filter, None, None).unwrap();
        assert_eq!(
            rows.iter().map(|r| r.as_i64("item_id").unwrap()).collect::<Vec<_>>(),
            vec![10, 30]
        );
    }

    #[test]
    fn pager_runs_companion_count_without_limit() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = article_catalog(&schema);
        let query = DataSetQuery::new(
            &db,
            &schema,
            &registry,
            "articles",
            &catalog,
            LanguageMode::CurrentOnly(1),
        )
        .unwrap();

        let mut pager = Pager::new(1, 0);
        let rows = query
            .fetch(&FilterExpression::new(), None, Some(&mut pager))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(pager.records_count(), Some(2));
        assert_eq!(pager.page_count(), Some(2));
    }
}

mod lookups {
    use super::*;

    static STATEMENTS: Mutex<Vec<String>> = Mutex::new(Vec::new());

    fn record_statement(sql: &str) {
        STATEMENTS.lock().unwrap().push(sql.to_string());
    }

    #[test]
    fn value_fields_resolve_in_one_batched_query() {
        let mut db = fixture();
        // Widen the page: many items sharing one author.
        for i in 0..50 {
            db.execute(
                "INSERT INTO items (item_id, author_id, item_order_num) VALUES (?, 1, ?)",
                &[json!(100 + i), json!(10 + i)],
            )
            .unwrap();
        }
        db.trace(Some(record_statement));

        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = item_catalog_with_author_lookup(&schema);
        let query =
            DataSetQuery::new(&db, &schema, &registry, "items", &catalog, LanguageMode::All)
                .unwrap();

        for page_size in [1u64, 50] {
            STATEMENTS.lock().unwrap().clear();
            let mut pager = Pager::new(page_size, 0);
            let rows = query
                .fetch(&FilterExpression::new(), None, Some(&mut pager))
                .unwrap();
            assert_eq!(rows.len(), page_size as usize);
            let lookup_queries = STATEMENTS
                .lock()
                .unwrap()
                .iter()
                .filter(|sql| sql.contains("\"authors\""))
                .count();
            assert_eq!(lookup_queries, 1, "page of {page_size} rows");
        }
    }

    #[test]
    fn dangling_references_resolve_to_null_label() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let catalog = item_catalog_with_author_lookup(&schema);
        let query =
            DataSetQuery::new(&db, &schema, &registry, "items", &catalog, LanguageMode::All)
                .unwrap();

        let rows = query.fetch(&FilterExpression::new(), None, None).unwrap();
        assert_eq!(
            rows_for(&rows, "item_id", 10)[0].get("author_id").unwrap(),
            &json!({"id": 1, "label": "Ann"})
        );
        // Author 99 does not exist: raw id kept, label null.
        assert_eq!(
            rows_for(&rows, "item_id", 30)[0].get("author_id").unwrap(),
            &json!({"id": 99, "label": Value::Null})
        );
    }

    #[test]
    fn multi_fields_resolve_value_lists() {
        let db = fixture();
        let schema = SchemaCatalog::new(&db);
        let registry = languages();
        let base = schema.columns("items").unwrap();
        let mut catalog = FieldCatalog::from_schema(&base, None).unwrap();
        catalog
            .push(
                FieldDescriptor::new("tags", FieldKind::Multi, "items").with_multi_link(
                    MultiLink {
                        link_table: "item_tags".to_string(),
                        self_column: "item_id".to_string(),
                        value_column: "tag".to_string(),
                    },
                ),
            )
            .unwrap();
        let query =
            DataSetQuery::new(&db, &schema, &registry, "items", &catalog, LanguageMode::All)
                .unwrap();

        let rows = query.fetch(&FilterExpression::new(), None, None).unwrap();
        assert_eq!(
            rows_for(&rows, "item_id", 10)[0].get("tags").unwrap(),
            &json!(["news", "tech"])
        );
        assert_eq!(rows_for(&rows, "item_id", 20)[0].get("tags").unwrap(), &json!([]));
    }
}
