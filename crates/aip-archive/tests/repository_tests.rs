//! Repository tests against real temp directories

#![allow(clippy::unwrap_used, clippy::expect_used)]

use aip_archive::{verify_package, ArchiveError, ArchiveRepository, FileChecksumLedger, IndexFile};
use aip_common::checksum::compute_file_md5;
use aip_common::types::{ContextDocument, DataBlock, DataSource, Field, PrimaryKey, Row, SqlType, Table, Value};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn table(name: &str) -> Table {
    Table {
        source_name: name.to_lowercase(),
        target_name: name.to_string(),
        description: format!("{name} records"),
        fields: vec![
            Field {
                name: "id".into(),
                sql_type: SqlType::Integer,
                nullable: false,
                description: "Identifier".into(),
            },
            Field {
                name: "name".into(),
                sql_type: SqlType::NationalCharacterVarying { length: 50 },
                nullable: true,
                description: String::new(),
            },
            Field {
                name: "secret".into(),
                sql_type: SqlType::NationalCharacterVarying { length: 50 },
                nullable: true,
                description: String::new(),
            },
        ],
        primary_key: Some(PrimaryKey {
            name: format!("PK_{name}"),
            columns: vec!["id".into()],
        }),
        foreign_keys: vec![],
        field_filters: vec!["secret".into()],
        record_filter: None,
    }
}

fn source(id: &str, docs: Vec<ContextDocument>) -> DataSource {
    DataSource {
        id: id.to_string(),
        system_name: "Registry".into(),
        period_start: date(2000, 1, 1),
        period_end: date(2020, 12, 31),
        creators: vec![],
        tables: vec![table("PERSON"), table("ADDRESS"), table("EMPTY")],
        context_documents: docs,
    }
}

fn rows(range: std::ops::Range<i64>) -> Vec<Row> {
    range
        .map(|i| {
            vec![
                Value::Integer(i),
                Value::String(format!("Person {i}")),
                Value::String("hidden".into()),
            ]
        })
        .collect()
}

fn blocks(list: Vec<DataBlock>) -> BTreeMap<String, DataBlock> {
    list.into_iter().map(|b| (b.table.clone(), b)).collect()
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[test]
fn test_person_in_two_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.18000", vec![])).unwrap();

    let first = repository
        .archive_table_data(&blocks(vec![DataBlock::new("PERSON", rows(0..500), false)]))
        .unwrap();
    assert!(first.tables[0].first_sight);
    let second = repository
        .archive_table_data(&blocks(vec![DataBlock::new("PERSON", rows(500..800), true)]))
        .unwrap();
    assert!(!second.tables[0].first_sight);
    assert_eq!(second.tables[0].total_rows, 800);

    repository.finish().unwrap();

    assert_eq!(repository.ordinal("PERSON"), Some(1));
    assert_eq!(repository.row_count("PERSON"), 800);

    let layout = repository.layout().unwrap().clone();
    let data_path = layout.table_data_path(1);
    let data = read(&data_path);
    assert_eq!(data.matches("<row>").count(), 800);
    assert!(!data.contains("hidden"));
    assert!(!layout.table_dir(2).exists());

    let table_index = read(&layout.index_path(IndexFile::Table));
    assert_eq!(table_index.matches("<table>").count(), 1);
    assert!(table_index.contains("<rows>800</rows>"));
    assert!(table_index.contains("<folder>table1</folder>"));
    assert!(!table_index.contains("<name>secret</name>"));

    let ledger = FileChecksumLedger::load(&layout).unwrap();
    let data_entries: Vec<_> = ledger.entries().iter().filter(|e| e.file_name == "table1.xml").collect();
    assert_eq!(data_entries.len(), 1);
    assert_eq!(data_entries[0].md5, compute_file_md5(&data_path).unwrap());
    assert_eq!(data_entries[0].folder, "AVID.SA.18000.1\\Tables\\table1");
}

#[test]
fn test_table_with_only_empty_blocks_leaves_no_trace() {
    let dir = tempfile::tempdir().unwrap();
    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.1", vec![])).unwrap();

    let report = repository
        .archive_table_data(&blocks(vec![
            DataBlock::new("EMPTY", vec![], false),
            DataBlock::new("ADDRESS", rows(0..3), false),
        ]))
        .unwrap();
    assert_eq!(report.tables.len(), 1);
    repository
        .archive_table_data(&blocks(vec![DataBlock::new("EMPTY", vec![], true)]))
        .unwrap();
    let summary = repository.finish().unwrap();

    assert_eq!(summary.tables, vec![("ADDRESS".to_string(), 1, 3)]);
    assert_eq!(repository.ordinal("EMPTY"), None);
    assert_eq!(repository.row_count("EMPTY"), 0);

    let layout = repository.layout().unwrap();
    let table_index = read(&layout.index_path(IndexFile::Table));
    assert!(!table_index.contains("<name>EMPTY</name>"));
    assert_eq!(std::fs::read_dir(layout.tables_dir()).unwrap().count(), 1);
}

#[test]
fn test_ordinals_follow_first_non_empty_block() {
    let dir = tempfile::tempdir().unwrap();
    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.1", vec![])).unwrap();

    repository
        .archive_table_data(&blocks(vec![DataBlock::new("PERSON", vec![], false)]))
        .unwrap();
    repository
        .archive_table_data(&blocks(vec![DataBlock::new("ADDRESS", rows(0..1), true)]))
        .unwrap();
    repository
        .archive_table_data(&blocks(vec![DataBlock::new("PERSON", rows(0..1), true)]))
        .unwrap();

    assert_eq!(repository.ordinal("ADDRESS"), Some(1));
    assert_eq!(repository.ordinal("PERSON"), Some(2));
}

#[test]
fn test_ledger_paths_unique_and_checksums_current() {
    let dir = tempfile::tempdir().unwrap();
    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.1", vec![])).unwrap();

    for round in 0..3 {
        repository
            .archive_table_data(&blocks(vec![
                DataBlock::new("PERSON", rows(round * 10..round * 10 + 10), round == 2),
                DataBlock::new("ADDRESS", rows(round..round + 1), round == 2),
            ]))
            .unwrap();

        let ledger = repository.checksum_ledger().unwrap();
        let mut seen = std::collections::HashSet::new();
        for entry in ledger.entries() {
            assert!(seen.insert((entry.folder.clone(), entry.file_name.clone())));
        }
        assert!(repository.verify().unwrap().is_ok());
    }

    let summary = repository.finish().unwrap();
    let verification = verify_package(dir.path(), "AVID.SA.1").unwrap();
    assert!(verification.is_ok());
    assert_eq!(verification.checked + 1, summary.files);
}

#[test]
fn test_metadata_is_one_shot_and_wipes_previous_package() {
    let dir = tempfile::tempdir().unwrap();
    let stale = dir.path().join("AVID.SA.1.1").join("Tables").join("table9");
    std::fs::create_dir_all(&stale).unwrap();

    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.1", vec![])).unwrap();
    assert!(!stale.exists());

    let err = repository.archive_metadata(&source("AVID.SA.1", vec![])).unwrap_err();
    assert!(matches!(err, ArchiveError::MetadataAlreadyArchived(_)));
}

#[test]
fn test_unknown_table_and_schema_violation_are_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.1", vec![])).unwrap();

    let err = repository
        .archive_table_data(&blocks(vec![DataBlock::new("NOPE", rows(0..1), true)]))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::UnknownTable(_)));

    let bad = vec![vec![Value::Null, Value::Null, Value::Null]];
    let err = repository
        .archive_table_data(&blocks(vec![DataBlock::new("PERSON", bad, true)]))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::SchemaViolation { .. }));
    assert_eq!(repository.row_count("PERSON"), 0);
}

#[test]
fn test_context_documents_are_copied_and_indexed() {
    let dir = tempfile::tempdir().unwrap();
    let docs_dir = tempfile::tempdir().unwrap();
    let pdf = docs_dir.path().join("manual.pdf");
    let txt = docs_dir.path().join("notes.txt");
    std::fs::write(&pdf, b"%PDF").unwrap();
    std::fs::write(&txt, b"notes").unwrap();

    let docs = vec![ContextDocument {
        id: 7,
        title: "System manual".into(),
        date: Some(date(2019, 5, 1)),
        files: vec![pdf, txt],
    }];

    let mut repository = ArchiveRepository::new(dir.path());
    repository.archive_metadata(&source("AVID.SA.1", docs)).unwrap();

    let layout = repository.layout().unwrap();
    let doc_dir = layout.context_dir().join("docCollection1").join("7");
    assert_eq!(std::fs::read(doc_dir.join("1.pdf")).unwrap(), b"%PDF");
    assert_eq!(std::fs::read(doc_dir.join("2.txt")).unwrap(), b"notes");

    let index = read(&layout.index_path(IndexFile::ContextDocumentation));
    assert!(index.contains("<documentID>7</documentID>"));
    assert!(index.contains("<documentTitle>System manual</documentTitle>"));

    let ledger = repository.checksum_ledger().unwrap();
    assert!(ledger.get(&doc_dir.join("1.pdf")).is_some());
    assert!(ledger.get(&layout.standard_schemas_dir().join("XMLSchema.xsd")).is_some());
}
