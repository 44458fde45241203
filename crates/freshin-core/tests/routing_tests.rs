//! Integration tests for freshin-core.
//!
//! Whole runs against the in-memory store and ledger, plus the file-backed
//! store and ledger in temporary directories.

use freshin_core::error::{InputError, LedgerError, TargetStoreError};
use freshin_core::input::{ExportContents, InputFile, RawBatch, StaticFile};
use freshin_core::ledger::{Ledger, MemoryLedger, ProcessedEntry};
use freshin_core::model::{FieldValues, TargetDomain, TargetRow};
use freshin_core::report::FileStatus;
use freshin_core::routing::{RoutingCoordinator, RoutingTables, RunOptions};
use freshin_core::store::{MemoryStore, TargetStore};
use serde_json::{json, Value};
use uuid::Uuid;

fn fields(value: Value) -> FieldValues {
    serde_json::from_value(value).unwrap()
}

fn tmdb_file(file_id: &str, records: Vec<Value>) -> StaticFile {
    StaticFile::records(file_id, "tmdb", None, records.into_iter().map(fields).collect())
}

/// Store that rejects writes to one key.
struct FailingStore {
    inner: MemoryStore,
    failing_key: String,
}

impl TargetStore for FailingStore {
    fn get_row(&self, domain: TargetDomain, key: &str) -> Result<Option<TargetRow>, TargetStoreError> {
        self.inner.get_row(domain, key)
    }

    fn upsert_row(
        &self,
        domain: TargetDomain,
        key: &str,
        values: &FieldValues,
    ) -> Result<(), TargetStoreError> {
        if key == self.failing_key {
            return Err(TargetStoreError::WriteFailed {
                domain: domain.to_string(),
                key: key.to_string(),
                message: "disk full".into(),
            });
        }
        self.inner.upsert_row(domain, key, values)
    }

    fn flush(&self) -> Result<(), TargetStoreError> {
        Ok(())
    }
}

/// Ledger whose writes always fail.
#[derive(Default)]
struct BrokenLedger {
    reads: std::sync::atomic::AtomicU64,
}

impl Ledger for BrokenLedger {
    fn is_processed(&self, _file_id: &str) -> Result<bool, LedgerError> {
        self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(false)
    }

    fn mark_processed(&self, _entry: ProcessedEntry) -> Result<(), LedgerError> {
        Err(LedgerError::WriteFailed("read-only filesystem".into()))
    }

    fn reset(&self, _run_id: Uuid) -> Result<(), LedgerError> {
        Err(LedgerError::WriteFailed("read-only filesystem".into()))
    }

    fn entries(&self) -> Result<Vec<ProcessedEntry>, LedgerError> {
        Ok(Vec::new())
    }
}

/// File that cannot be read.
struct MissingFile {
    file_id: String,
}

impl InputFile for MissingFile {
    fn file_id(&self) -> &str {
        &self.file_id
    }

    fn source(&self) -> &str {
        "tmdb"
    }

    fn read(&self) -> Result<ExportContents, InputError> {
        Err(InputError::Unreadable {
            file_id: self.file_id.clone(),
            message: "No such file or directory".into(),
        })
    }
}

/// Either a static file or an unreadable one, so both fit one run.
enum TestFile {
    Static(StaticFile),
    Missing(MissingFile),
}

impl InputFile for TestFile {
    fn file_id(&self) -> &str {
        match self {
            TestFile::Static(f) => f.file_id(),
            TestFile::Missing(f) => f.file_id(),
        }
    }

    fn source(&self) -> &str {
        match self {
            TestFile::Static(f) => f.source(),
            TestFile::Missing(f) => f.source(),
        }
    }

    fn read(&self) -> Result<ExportContents, InputError> {
        match self {
            TestFile::Static(f) => f.read(),
            TestFile::Missing(f) => f.read(),
        }
    }
}

mod title_scenarios {
    use super::*;

    fn route(tables: &RoutingTables, store: &MemoryStore, ledger: &MemoryLedger, file: &StaticFile) -> freshin_core::report::RoutingOutcome {
        RoutingCoordinator::new(tables, store, ledger, RunOptions::default())
            .route(file)
            .unwrap()
    }

    #[test]
    fn test_new_title_fills_every_field() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();

        let file = tmdb_file(
            "tmdb_20240115.json",
            vec![json!({
                "id": "550",
                "title": "Fight Club",
                "overview": "An insomniac office worker...",
                "popularity": 61.4,
            })],
        );
        let outcome = route(&tables, &store, &ledger, &file);

        assert_eq!(outcome.rows_created, 1);
        assert_eq!(outcome.records_routed, 1);
        assert_eq!(outcome.decisions.fill, 4);
        assert_eq!(outcome.decisions.skip, 0);
        assert_eq!(outcome.errors, 0);

        let row = store.row(TargetDomain::TitleMetadata, "550").unwrap();
        assert_eq!(row.value("title"), Some(&json!("Fight Club")));
        assert_eq!(row.value("tmdb_popularity"), Some(&json!(61.4)));
    }

    #[test]
    fn test_merge_field_is_skipped_when_populated() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let first = tmdb_file(
            "tmdb_20240115.json",
            vec![json!({"id": 550, "title": "Fight Club", "overview": "An insomniac office worker..."})],
        );
        route(&tables, &store, &ledger, &first);

        let second = tmdb_file(
            "tmdb_20240116.json",
            vec![json!({"id": 550, "overview": "A different synopsis"})],
        );
        let outcome = route(&tables, &store, &ledger, &second);

        // Both populated MERGE fields are kept: overview and tmdb_id
        assert_eq!(outcome.decisions.skip, 2);
        assert_eq!(outcome.decisions.fill + outcome.decisions.overwrite, 0);
        assert_eq!(outcome.rows_skipped, 1);
        assert_eq!(outcome.rows_updated, 0);
        let row = store.row(TargetDomain::TitleMetadata, "550").unwrap();
        assert_eq!(row.value("overview"), Some(&json!("An insomniac office worker...")));
    }

    #[test]
    fn test_overwrite_field_always_updates() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        route(
            &tables,
            &store,
            &ledger,
            &tmdb_file("tmdb_20240115.json", vec![json!({"id": 550, "popularity": 61.4})]),
        );

        let outcome = route(
            &tables,
            &store,
            &ledger,
            &tmdb_file("tmdb_20240116.json", vec![json!({"id": 550, "popularity": "75.5"})]),
        );

        assert_eq!(outcome.decisions.overwrite, 1);
        assert_eq!(outcome.rows_updated, 1);
        let row = store.row(TargetDomain::TitleMetadata, "550").unwrap();
        assert_eq!(row.value("tmdb_popularity"), Some(&json!(75.5)));
    }

    #[test]
    fn test_views_with_imdb_id_route_to_viewership() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let file = StaticFile::records(
            "reports_20240115.json",
            "reports",
            None,
            vec![fields(json!({"views": 1000, "imdb_id": "tt0137523"}))],
        );

        let outcome = route(&tables, &store, &ledger, &file);

        assert_eq!(outcome.target_domain, Some(TargetDomain::Viewership));
        assert_eq!(store.len(TargetDomain::Viewership), 1);
        assert_eq!(store.len(TargetDomain::TitleMetadata), 0);
    }

    #[test]
    fn test_constants_stamped_on_platform_rows() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let file = StaticFile::records(
            "disney_plus_20240115.json",
            "disney_plus",
            Some("random_title"),
            vec![fields(json!({"imdb_id": "0137523", "title": "Fight Club"}))],
        );

        route(&tables, &store, &ledger, &file);

        let row = store
            .row(TargetDomain::PlatformAvailability, "tt0137523")
            .unwrap();
        assert_eq!(row.value("streaming_platform_us"), Some(&json!("Disney+")));
    }
}

mod ledger_behaviour {
    use super::*;

    #[test]
    fn test_processed_file_is_not_reread() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let file = tmdb_file("tmdb_20240115.json", vec![json!({"id": 550, "title": "Fight Club"})]);

        RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route(&file)
            .unwrap();
        let calls = store.calls();

        let outcome = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route(&file)
            .unwrap();

        assert_eq!(outcome.status, FileStatus::AlreadyProcessed);
        assert_eq!(outcome.records_routed, 0);
        assert_eq!(store.calls(), calls);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let files = vec![
            tmdb_file("tmdb_20240115.json", vec![json!({"id": 550, "title": "Fight Club"})]),
            StaticFile::records(
                "flixpatrol_20240115.json",
                "flixpatrol",
                Some("top10_netflix"),
                vec![fields(json!({"title": "Fight Club", "rank": 1, "points": 900}))],
            ),
        ];

        let first = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files)
            .unwrap();
        assert_eq!(first.tally.rows_created, 2);

        let second = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files)
            .unwrap();
        assert_eq!(second.tally.rows_created, 0);
        assert_eq!(second.tally.rows_updated, 0);
        assert_eq!(second.tally.files_already_processed, 2);

        let forced = RunOptions {
            force_reprocess: true,
            ..RunOptions::default()
        };
        let third = RoutingCoordinator::new(&tables, &store, &ledger, forced)
            .route_run(&files)
            .unwrap();
        assert_eq!(third.tally.files_routed, 2);
        assert_eq!(third.tally.rows_created, 0);
        assert_eq!(third.tally.rows_updated, 0);
    }

    #[test]
    fn test_ledger_failure_aborts_run() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = BrokenLedger::default();
        let files = vec![
            tmdb_file("tmdb_20240115_a.json", vec![json!({"id": 550})]),
            tmdb_file("tmdb_20240115_b.json", vec![json!({"id": 13})]),
        ];

        let result = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files);

        assert!(matches!(result, Err(freshin_core::Error::Ledger(_))));
        // Both files are checked up front; the run stops at the first mark
        assert_eq!(ledger.reads.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(store.row(TargetDomain::TitleMetadata, "13").is_none());
    }
}

mod partial_failures {
    use super::*;

    #[test]
    fn test_store_failure_counts_fields_and_marks_file() {
        let tables = RoutingTables::builtin().unwrap();
        let store = FailingStore {
            inner: MemoryStore::new(),
            failing_key: "13".into(),
        };
        let ledger = MemoryLedger::new();
        let file = tmdb_file(
            "tmdb_20240115.json",
            vec![
                json!({"id": 550, "title": "Fight Club"}),
                json!({"id": 13, "title": "Forrest Gump"}),
            ],
        );

        let outcome = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route(&file)
            .unwrap();

        assert_eq!(outcome.rows_created, 1);
        assert_eq!(outcome.errors, 2);
        assert_eq!(outcome.failures.store, 2);
        assert!(ledger.is_processed("tmdb_20240115.json").unwrap());
    }

    /// Store whose backend went away after opening.
    struct ClosedStore;

    impl TargetStore for ClosedStore {
        fn get_row(&self, _domain: TargetDomain, _key: &str) -> Result<Option<TargetRow>, TargetStoreError> {
            Err(TargetStoreError::OpenFailed("connection closed".into()))
        }

        fn upsert_row(
            &self,
            domain: TargetDomain,
            key: &str,
            _values: &FieldValues,
        ) -> Result<(), TargetStoreError> {
            Err(TargetStoreError::WriteFailed {
                domain: domain.to_string(),
                key: key.to_string(),
                message: "connection closed".into(),
            })
        }

        fn flush(&self) -> Result<(), TargetStoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_row_read_failure_skips_record_without_writing() {
        let tables = RoutingTables::builtin().unwrap();
        let ledger = MemoryLedger::new();
        let file = tmdb_file(
            "tmdb_20240115.json",
            vec![json!({"id": 550, "title": "Fight Club"}), json!({"id": 13, "title": "Forrest Gump"})],
        );

        let outcome = RoutingCoordinator::new(&tables, &ClosedStore, &ledger, RunOptions::default())
            .route(&file)
            .unwrap();

        assert_eq!(outcome.errors, 2);
        assert_eq!(outcome.failures.store, 2);
        assert_eq!(outcome.records_routed, 0);
        assert_eq!(outcome.rows_created, 0);
        assert!(ledger.is_processed("tmdb_20240115.json").unwrap());
    }

    #[test]
    fn test_unreadable_file_is_left_unmarked() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let files = vec![
            TestFile::Missing(MissingFile {
                file_id: "tmdb_20240115_a.json".into(),
            }),
            TestFile::Static(tmdb_file("tmdb_20240115_b.json", vec![json!({"id": 550})])),
        ];

        let report = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files)
            .unwrap();

        assert_eq!(report.tally.files_unreadable, 1);
        assert_eq!(report.tally.files_routed, 1);
        assert_eq!(report.tally.failures.input, 1);
        assert!(!ledger.is_processed("tmdb_20240115_a.json").unwrap());
        assert!(ledger.is_processed("tmdb_20240115_b.json").unwrap());
    }

    #[test]
    fn test_unclassified_and_unmappable_records_are_skipped() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let file = StaticFile::records(
            "mystery_20240115.json",
            "mystery",
            None,
            vec![
                fields(json!({"colour": "blue"})),
                fields(json!({"headline": "N/A", "byline": ""})),
                fields(json!({"headline": "Streaming wars heat up"})),
            ],
        );

        let outcome = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route(&file)
            .unwrap();

        assert_eq!(outcome.failures.classification, 1);
        assert_eq!(outcome.failures.mapping, 1);
        assert_eq!(outcome.rows_skipped, 2);
        assert_eq!(outcome.rows_created, 1);
        assert_eq!(outcome.target_domain, Some(TargetDomain::NewsEvent));
    }
}

mod run_control {
    use super::*;

    fn priority_tables() -> RoutingTables {
        RoutingTables::from_toml_str(
            r#"
            precedence = ["title_metadata", "viewership", "platform_availability",
                          "social_signal", "financial_signal", "news_event"]

            [domains.title_metadata]
            key_field = "id"
            fields = ["id", "title"]
            indicators = ["title"]

            [domains.viewership]
            fields = ["views"]
            indicators = ["views"]

            [domains.platform_availability]
            fields = ["service"]
            indicators = ["service"]

            [domains.social_signal]
            fields = ["trend"]
            indicators = ["trending"]

            [domains.financial_signal]
            fields = ["revenue"]
            indicators = ["revenue"]

            [domains.news_event]
            fields = ["headline"]
            indicators = ["headline"]

            [sources.low]
            priority = 5
            domain = "title_metadata"
            default_mode = "overwrite"

            [sources.high]
            priority = 9
            domain = "title_metadata"
            default_mode = "overwrite"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_higher_priority_source_wins_in_either_order() {
        let tables = priority_tables();
        let low = StaticFile::records("a_low.json", "low", None, vec![fields(json!({"id": "1", "title": "Low"}))]);
        let high = StaticFile::records("b_high.json", "high", None, vec![fields(json!({"id": "1", "title": "High"}))]);

        for files in [vec![low.clone(), high.clone()], vec![high.clone(), low.clone()]] {
            let store = MemoryStore::new();
            let ledger = MemoryLedger::new();
            let report = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
                .route_run(&files)
                .unwrap();

            assert_eq!(report.outcomes[0].source, "low");
            let row = store.row(TargetDomain::TitleMetadata, "1").unwrap();
            assert_eq!(row.value("title"), Some(&json!("High")));
        }
    }

    fn batch(source: &str, title: &str) -> RawBatch {
        RawBatch {
            source: source.into(),
            type_hint: None,
            records: vec![fields(json!({"id": "1", "title": title}))],
        }
    }

    #[test]
    fn test_bundle_batch_from_higher_priority_source_wins() {
        let tables = priority_tables();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let files = vec![
            StaticFile::new("fresh_data_20240115.json", "fresh_data", vec![batch("high", "High")]),
            StaticFile::new("low_20240115.json", "low", vec![batch("low", "Low")]),
        ];

        let report = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files)
            .unwrap();

        let row = store.row(TargetDomain::TitleMetadata, "1").unwrap();
        assert_eq!(row.value("title"), Some(&json!("High")));
        assert_eq!(report.tally.files_routed, 2);
        assert!(ledger.is_processed("fresh_data_20240115.json").unwrap());
        assert!(ledger.is_processed("low_20240115.json").unwrap());
    }

    #[test]
    fn test_mixed_bundle_is_split_around_other_files() {
        let tables = priority_tables();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        // The bundle's low batch must land before the standalone high file,
        // and its high batch after the standalone low file
        let files = vec![
            StaticFile::new(
                "fresh_data_20240115.json",
                "fresh_data",
                vec![
                    batch("high", "Bundled High"),
                    RawBatch {
                        source: "low".into(),
                        type_hint: None,
                        records: vec![fields(json!({"id": "2", "title": "Bundled Low"}))],
                    },
                ],
            ),
            StaticFile::new("high_20240115.json", "high", vec![RawBatch {
                source: "high".into(),
                type_hint: None,
                records: vec![fields(json!({"id": "2", "title": "High"}))],
            }]),
            StaticFile::new("low_20240115.json", "low", vec![batch("low", "Low")]),
        ];

        RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files)
            .unwrap();

        let first = store.row(TargetDomain::TitleMetadata, "1").unwrap();
        assert_eq!(first.value("title"), Some(&json!("Bundled High")));
        let second = store.row(TargetDomain::TitleMetadata, "2").unwrap();
        assert_eq!(second.value("title"), Some(&json!("High")));
        assert_eq!(ledger.entries().unwrap().len(), 3);
    }

    #[test]
    fn test_preview_leaves_store_and_ledger_untouched() {
        let tables = RoutingTables::builtin().unwrap();
        let store = MemoryStore::new();
        let ledger = MemoryLedger::new();
        let options = RunOptions {
            preview: true,
            ..RunOptions::default()
        };
        let files = vec![
            tmdb_file("tmdb_20240115_a.json", vec![json!({"id": 550, "title": "Fight Club"})]),
            tmdb_file("tmdb_20240115_b.json", vec![json!({"id": 550, "popularity": 61.4})]),
        ];

        let report = RoutingCoordinator::new(&tables, &store, &ledger, options)
            .route_run(&files)
            .unwrap();

        assert!(report.preview);
        assert_eq!(report.tally.rows_created, 1);
        // The second file sees the first file's previewed row
        assert_eq!(report.tally.rows_updated, 1);
        assert!(store.is_empty());
        assert!(ledger.is_empty());
    }

    /// Store that cancels the run on its first write.
    struct CancellingStore {
        inner: MemoryStore,
        cancel: freshin_core::routing::CancelFlag,
    }

    impl TargetStore for CancellingStore {
        fn get_row(&self, domain: TargetDomain, key: &str) -> Result<Option<TargetRow>, TargetStoreError> {
            self.inner.get_row(domain, key)
        }

        fn upsert_row(
            &self,
            domain: TargetDomain,
            key: &str,
            values: &FieldValues,
        ) -> Result<(), TargetStoreError> {
            self.cancel.cancel();
            self.inner.upsert_row(domain, key, values)
        }

        fn flush(&self) -> Result<(), TargetStoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_cancel_stops_between_files() {
        let tables = RoutingTables::builtin().unwrap();
        let options = RunOptions::default();
        let store = CancellingStore {
            inner: MemoryStore::new(),
            cancel: options.cancel.clone(),
        };
        let ledger = MemoryLedger::new();
        let files = vec![
            tmdb_file("tmdb_20240115_a.json", vec![json!({"id": 550})]),
            tmdb_file("tmdb_20240115_b.json", vec![json!({"id": 13})]),
        ];

        let report = RoutingCoordinator::new(&tables, &store, &ledger, options)
            .route_run(&files)
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.outcomes.len(), 1);
        // The in-flight file still completes and is marked
        assert!(ledger.is_processed("tmdb_20240115_a.json").unwrap());
        assert!(!ledger.is_processed("tmdb_20240115_b.json").unwrap());
        assert!(store.inner.row(TargetDomain::TitleMetadata, "13").is_none());
    }

    #[test]
    fn test_started_bundle_completes_after_cancel() {
        let tables = priority_tables();
        let options = RunOptions::default();
        let store = CancellingStore {
            inner: MemoryStore::new(),
            cancel: options.cancel.clone(),
        };
        let ledger = MemoryLedger::new();
        // Cancelled on the bundle's low batch; its high batch still lands
        let files = vec![StaticFile::new(
            "fresh_data_20240115.json",
            "fresh_data",
            vec![batch("high", "High"), batch("low", "Low")],
        )];

        let report = RoutingCoordinator::new(&tables, &store, &ledger, options)
            .route_run(&files)
            .unwrap();

        assert!(!report.interrupted);
        assert!(ledger.is_processed("fresh_data_20240115.json").unwrap());
        let row = store.inner.row(TargetDomain::TitleMetadata, "1").unwrap();
        assert_eq!(row.value("title"), Some(&json!("High")));
    }
}

mod file_backed {
    use super::*;
    use freshin_core::config::LedgerConfig;
    use freshin_core::input::{DirectorySource, FileSelection};
    use freshin_core::ledger::FileLedger;
    use freshin_core::store::JsonFileStore;
    use std::fs;
    use tempfile::TempDir;

    fn write_exports(dir: &std::path::Path) {
        fs::write(
            dir.join("tmdb_20240115.json"),
            json!([
                {"source": "tmdb", "type": "movie_genres", "data": {"genres": [{"id": 18, "name": "Drama"}]}},
                {"source": "tmdb", "type": "trending", "data": {"results": [
                    {"id": 550, "title": "Fight Club", "genre_ids": [18], "popularity": 61.4}
                ]}}
            ])
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.join("flixpatrol_20240115.json"),
            json!([
                {"source": "flixpatrol", "type": "top10_netflix", "data": [
                    {"title": "Fight Club", "rank": 1, "points": 900, "imdbId": 137523}
                ]}
            ])
            .to_string(),
        )
        .unwrap();
        fs::write(dir.join("imdb_20240115.json"), "{ truncated").unwrap();
    }

    #[test]
    fn test_directory_run_persists_rows_and_ledger() {
        let temp_dir = TempDir::new().unwrap();
        let input_dir = temp_dir.path().join("raw");
        fs::create_dir_all(&input_dir).unwrap();
        write_exports(&input_dir);

        let ledger_config = LedgerConfig {
            dir: temp_dir.path().join("ledger"),
            sync: true,
        };
        let store_dir = temp_dir.path().join("target");
        let tables = RoutingTables::builtin().unwrap();
        let files = DirectorySource::new(&input_dir, FileSelection::date("20240115").unwrap())
            .list(&tables)
            .unwrap();
        assert_eq!(files.len(), 3);

        {
            let store = JsonFileStore::open(&store_dir).unwrap();
            let ledger = FileLedger::open(&ledger_config).unwrap();
            let report = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
                .route_run(&files)
                .unwrap();

            assert_eq!(report.tally.files_routed, 2);
            assert_eq!(report.tally.files_unreadable, 1);
            assert_eq!(report.tally.batches_ignored, 1);
            assert_eq!(report.tally.records_by_domain[&TargetDomain::TitleMetadata], 1);
            assert_eq!(report.tally.records_by_domain[&TargetDomain::Viewership], 1);
        }

        let store = JsonFileStore::open(&store_dir).unwrap();
        let row = store.row(TargetDomain::TitleMetadata, "550").unwrap();
        assert_eq!(row.value("genres"), Some(&json!("Drama")));

        let ledger = FileLedger::open(&ledger_config).unwrap();
        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(!ledger.is_processed("imdb_20240115.json").unwrap());

        let rerun = RoutingCoordinator::new(&tables, &store, &ledger, RunOptions::default())
            .route_run(&files)
            .unwrap();
        assert_eq!(rerun.tally.files_already_processed, 2);
        assert_eq!(rerun.tally.files_unreadable, 1);
        assert_eq!(rerun.tally.rows_created, 0);
    }
}
