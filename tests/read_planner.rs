// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! End-to-end planner scenarios over the in-memory part reader.

use std::sync::{Arc, Mutex};

use itertools::Itertools;
use marktree::array::{Array, ArrayImpl};
use marktree::catalog::{ColumnCatalog, TableCatalog};
use marktree::expr::Expr;
use marktree::storage::read::{
    BoxBlockStream, MemoryPartData, MemoryPartReaderFactory, ReadExecutor, ReadOutput,
    ProcessedStage, SelectQuery,
};
use marktree::storage::{
    ColumnPredicate, DataPart, QuerySettings, Range, StorageError, StorageOptions, TableData,
};
use marktree::types::{DataValue, PhysicalType};

const GRANULARITY: usize = 10;

struct TestTable {
    table: Arc<TableData>,
    factory: Arc<MemoryPartReaderFactory>,
}

impl TestTable {
    fn new(catalog: TableCatalog) -> Self {
        let options = Arc::new(StorageOptions::default_for_test());
        Self {
            table: Arc::new(TableData::new(catalog, options)),
            factory: Arc::new(MemoryPartReaderFactory::new(GRANULARITY, 1024)),
        }
    }

    /// Register a part whose rows are already sorted by the single `k`
    /// column; the sparse index is derived from the rows.
    fn add_part(
        &self,
        name: &str,
        dates: (u16, u16),
        keys: Vec<u64>,
        signs: Option<Vec<i8>>,
        payload: Vec<i64>,
    ) {
        let row_count = keys.len();
        let marks_count = (row_count + GRANULARITY - 1) / GRANULARITY;
        let index = (0..marks_count)
            .map(|m| DataValue::UInt64(keys[m * GRANULARITY]))
            .collect();
        self.table.add_part(DataPart {
            name: name.into(),
            min_date: dates.0,
            max_date: dates.1,
            index,
            marks_count,
            row_count,
        });
        let mut columns = vec![
            ("k".to_string(), ArrayImpl::from(keys)),
            ("v".to_string(), ArrayImpl::from(payload)),
        ];
        if let Some(signs) = signs {
            columns.push(("sign".to_string(), ArrayImpl::from(signs)));
        }
        self.factory.add_part(name, MemoryPartData::new(columns));
    }

    fn executor(&self) -> ReadExecutor {
        ReadExecutor::new(self.table.clone(), self.factory.clone())
    }

    fn read(
        &self,
        columns: &[&str],
        query: &SelectQuery,
        threads: usize,
    ) -> marktree::storage::StorageResult<ReadOutput> {
        let columns = columns.iter().map(|c| c.to_string()).collect_vec();
        self.executor()
            .read(&columns, query, &QuerySettings::default(), 32, threads)
    }
}

fn plain_catalog() -> TableCatalog {
    TableCatalog::new(
        vec![
            ColumnCatalog::new("date", PhysicalType::Date),
            ColumnCatalog::new("k", PhysicalType::UInt64),
            ColumnCatalog::new("v", PhysicalType::Int64),
        ],
        vec!["k".into()],
        "date",
    )
}

fn collapsing_catalog() -> TableCatalog {
    TableCatalog::new(
        vec![
            ColumnCatalog::new("date", PhysicalType::Date),
            ColumnCatalog::new("k", PhysicalType::UInt64),
            ColumnCatalog::new("v", PhysicalType::Int64),
            ColumnCatalog::new("sign", PhysicalType::Int8),
        ],
        vec!["k".into()],
        "date",
    )
    .with_sign_column("sign")
}

async fn drain_column(streams: Vec<BoxBlockStream>, column: &str) -> Vec<Vec<u64>> {
    let mut per_stream = vec![];
    for mut stream in streams {
        let mut values = vec![];
        while let Some(block) = stream.next_block().await.unwrap() {
            let block = block.compact();
            let ArrayImpl::UInt64(keys) = block.column_by_name(column).unwrap().as_ref() else {
                panic!("column {column} is not u64");
            };
            values.extend((0..block.row_count()).map(|i| keys.get(i)));
        }
        per_stream.push(values);
    }
    per_stream
}

#[tokio::test]
async fn full_scan_spreads_all_rows_across_streams() {
    let t = TestTable::new(plain_catalog());
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        let base = i as u64 * 10_000;
        let keys = (base..base + 1000).collect_vec();
        let payload = keys.iter().map(|k| *k as i64).collect_vec();
        t.add_part(name, (0, 0), keys, None, payload);
    }

    let output = t.read(&["k", "v"], &SelectQuery::default(), 4).unwrap();
    assert_eq!(output.processed_stage, ProcessedStage::FetchColumns);
    assert_eq!(output.streams.len(), 4);

    let per_stream = drain_column(output.streams, "k").await;
    let total: usize = per_stream.iter().map(Vec::len).sum();
    assert_eq!(total, 3000);
    // The three parts together target 300 marks over 4 workers; no worker
    // ends up with less than a quarter of a part.
    for values in &per_stream {
        assert!(values.len() >= 250);
    }
}

#[tokio::test]
async fn key_predicate_prunes_and_filters() {
    let t = TestTable::new(plain_catalog());
    let keys = (0..1000u64).collect_vec();
    let payload = keys.iter().map(|k| *k as i64).collect_vec();
    t.add_part("a", (0, 0), keys, None, payload);

    let query = SelectQuery {
        predicates: vec![ColumnPredicate::new(
            "k",
            Range::bounded(
                DataValue::UInt64(500),
                true,
                DataValue::UInt64(509),
                true,
            ),
        )],
        ..SelectQuery::default()
    };
    let output = t.read(&["k"], &query, 2).unwrap();
    let rows = drain_column(output.streams, "k").await.concat();
    // The index narrows the read to the marks around [500, 509]; the exact
    // row set may include neighbors from the same marks.
    assert!(rows.iter().all(|k| (490..520).contains(k)));
    for k in 500..510 {
        assert!(rows.contains(&k));
    }
}

#[tokio::test]
async fn date_envelopes_prune_whole_parts() {
    let t = TestTable::new(plain_catalog());
    t.add_part("old", (100, 110), (0..100).collect_vec(), None, vec![0; 100]);
    t.add_part("new", (200, 210), (0..100).collect_vec(), None, vec![0; 100]);

    let query = SelectQuery {
        predicates: vec![ColumnPredicate::new(
            "date",
            Range::bounded(
                DataValue::UInt64(150),
                true,
                DataValue::UInt64(205),
                true,
            ),
        )],
        ..SelectQuery::default()
    };
    let output = t.read(&["k"], &query, 4).unwrap();
    let rows = drain_column(output.streams, "k").await.concat();
    assert_eq!(rows.len(), 100);

    // A window before every part selects nothing and produces no streams.
    let query = SelectQuery {
        predicates: vec![ColumnPredicate::new(
            "date",
            Range::right_bounded(DataValue::UInt64(50), true),
        )],
        ..SelectQuery::default()
    };
    let output = t.read(&["k"], &query, 4).unwrap();
    assert!(output.streams.is_empty());
}

#[tokio::test]
async fn empty_table_reads_empty() {
    let t = TestTable::new(plain_catalog());
    let output = t.read(&["k"], &SelectQuery::default(), 4).unwrap();
    assert!(output.streams.is_empty());
}

#[tokio::test]
async fn single_thread_concatenates_everything() {
    let t = TestTable::new(plain_catalog());
    t.add_part("a", (0, 0), (0..100).collect_vec(), None, vec![0; 100]);
    t.add_part("b", (0, 0), (1000..1100).collect_vec(), None, vec![0; 100]);

    let output = t.read(&["k"], &SelectQuery::default(), 1).unwrap();
    assert_eq!(output.streams.len(), 1);
    let rows = drain_column(output.streams, "k").await.concat();
    assert_eq!(rows.len(), 200);
}

#[tokio::test]
async fn unknown_column_is_rejected() {
    let t = TestTable::new(plain_catalog());
    let err = t.read(&["missing"], &SelectQuery::default(), 1).unwrap_err();
    assert!(matches!(err.kind(), StorageError::UnknownColumn(_)));
}

#[tokio::test]
async fn planning_is_idempotent_over_a_snapshot() {
    let t = TestTable::new(plain_catalog());
    for (i, name) in ["a", "b"].iter().enumerate() {
        let base = i as u64 * 10_000;
        t.add_part(
            name,
            (0, 0),
            (base..base + 500).collect_vec(),
            None,
            vec![0; 500],
        );
    }
    let first = drain_column(
        t.read(&["k"], &SelectQuery::default(), 3).unwrap().streams,
        "k",
    )
    .await;
    let second = drain_column(
        t.read(&["k"], &SelectQuery::default(), 3).unwrap().streams,
        "k",
    )
    .await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn prewhere_is_applied_inside_the_readers() {
    let t = TestTable::new(plain_catalog());
    let keys = (0..200u64).collect_vec();
    let payload = keys.iter().map(|k| *k as i64).collect_vec();
    t.add_part("a", (0, 0), keys, None, payload);

    let query = SelectQuery {
        prewhere: Some(Expr::less_or_equals(
            Expr::column("k"),
            Expr::literal(DataValue::UInt64(42)),
        )),
        ..SelectQuery::default()
    };
    let output = t.read(&["k", "v"], &query, 2).unwrap();
    let rows = drain_column(output.streams, "k").await.concat();
    assert_eq!(rows.into_iter().sorted().collect_vec(), (0..=42).collect_vec());
}

mod sampling {
    use super::*;

    fn sampling_catalog() -> TableCatalog {
        TableCatalog::new(
            vec![
                ColumnCatalog::new("date", PhysicalType::Date),
                ColumnCatalog::new("user_hash", PhysicalType::UInt32),
                ColumnCatalog::new("v", PhysicalType::Int64),
            ],
            vec!["user_hash".into()],
            "date",
        )
        .with_sampling_column("user_hash")
    }

    fn add_hash_part(t: &TestTable, rows: usize) {
        let hashes = (0..rows as u32).map(|i| i * 40_000_000).collect_vec();
        let marks_count = (rows + GRANULARITY - 1) / GRANULARITY;
        let index = (0..marks_count)
            .map(|m| DataValue::UInt32(hashes[m * GRANULARITY]))
            .collect();
        t.table.add_part(DataPart {
            name: "a".into(),
            min_date: 0,
            max_date: 0,
            index,
            marks_count,
            row_count: rows,
        });
        t.factory.add_part(
            "a",
            MemoryPartData::new([
                ("user_hash".to_string(), ArrayImpl::from(hashes)),
                (
                    "v".to_string(),
                    ArrayImpl::from((0..rows as i64).collect_vec()),
                ),
            ]),
        );
    }

    #[tokio::test]
    async fn half_sample_keeps_hashes_below_the_cutoff() {
        let t = TestTable::new(sampling_catalog());
        add_hash_part(&t, 100);

        let query = SelectQuery {
            sample_size: Some(0.5),
            ..SelectQuery::default()
        };
        let output = t.read(&["v"], &query, 2).unwrap();

        let mut kept = 0u32;
        for mut stream in output.streams {
            while let Some(block) = stream.next_block().await.unwrap() {
                let block = block.compact();
                let ArrayImpl::UInt32(hashes) =
                    block.column_by_name("user_hash").unwrap().as_ref()
                else {
                    panic!("sampling column missing from the read set");
                };
                for i in 0..block.row_count() {
                    assert!(hashes.get(i) <= 2147483647);
                    kept += 1;
                }
            }
        }
        // Hashes are i * 40_000_000: exactly 54 of the 100 fall at or below
        // the cutoff.
        assert_eq!(kept, 54);
    }

    #[tokio::test]
    async fn negative_sample_is_a_bad_argument() {
        let t = TestTable::new(sampling_catalog());
        add_hash_part(&t, 10);
        let query = SelectQuery {
            sample_size: Some(-1.0),
            ..SelectQuery::default()
        };
        let err = t.read(&["v"], &query, 1).unwrap_err();
        assert!(matches!(
            err.kind(),
            StorageError::ArgumentOutOfBound(_)
        ));
    }
}

mod final_mode {
    use super::*;

    #[tokio::test]
    async fn two_parts_collapse_into_one_ordered_stream() {
        let t = TestTable::new(collapsing_catalog());
        // The older part inserts keys 1..=20, the newer part deletes 5 and
        // 6 and replaces 7.
        let keys = (1..=20u64).collect_vec();
        let signs = vec![1i8; 20];
        let payload = keys.iter().map(|k| *k as i64 * 10).collect_vec();
        t.add_part("older", (0, 0), keys, Some(signs), payload);
        t.add_part(
            "newer",
            (0, 0),
            vec![5, 6, 7, 7],
            Some(vec![-1, -1, -1, 1]),
            vec![50, 60, 70, 71],
        );

        let query = SelectQuery {
            is_final: true,
            ..SelectQuery::default()
        };
        let output = t.read(&["k", "v"], &query, 4).unwrap();
        // FINAL trades parallelism for cross-part dedup.
        assert_eq!(output.streams.len(), 1);

        let mut rows = vec![];
        let mut streams = output.streams;
        while let Some(block) = streams[0].next_block().await.unwrap() {
            let block = block.compact();
            let keys = block.column_by_name("k").unwrap().clone();
            let payload = block.column_by_name("v").unwrap().clone();
            for i in 0..block.row_count() {
                let (ArrayImpl::UInt64(k), ArrayImpl::Int64(v)) =
                    (keys.as_ref(), payload.as_ref())
                else {
                    panic!("unexpected column types");
                };
                rows.push((k.get(i), v.get(i)));
            }
        }

        let expected_keys = (1..=20u64).filter(|k| *k != 5 && *k != 6).collect_vec();
        assert_eq!(rows.iter().map(|(k, _)| *k).collect_vec(), expected_keys);
        // Key 7 carries the replacement payload from the newer part.
        assert_eq!(rows.iter().find(|(k, _)| *k == 7).unwrap().1, 71);
    }

    #[tokio::test]
    async fn single_part_just_drops_deleted_rows() {
        let t = TestTable::new(collapsing_catalog());
        t.add_part(
            "only",
            (0, 0),
            vec![1, 2, 3],
            Some(vec![1, -1, 1]),
            vec![10, 20, 30],
        );
        let query = SelectQuery {
            is_final: true,
            ..SelectQuery::default()
        };
        let output = t.read(&["k"], &query, 4).unwrap();
        assert_eq!(output.streams.len(), 1);
        let rows = drain_column(output.streams, "k").await.concat();
        assert_eq!(rows, vec![1, 3]);
    }

    #[tokio::test]
    async fn final_without_a_sign_column_is_rejected() {
        let t = TestTable::new(plain_catalog());
        t.add_part("a", (0, 0), (0..10).collect_vec(), None, vec![0; 10]);
        let query = SelectQuery {
            is_final: true,
            ..SelectQuery::default()
        };
        let err = t.read(&["k"], &query, 1).unwrap_err();
        assert!(matches!(err.kind(), StorageError::NotConfigured(_)));
    }
}

mod logging {
    use super::*;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> CaptureWriter {
            self.clone()
        }
    }

    #[tokio::test]
    async fn planner_logs_its_decisions() {
        let t = TestTable::new(plain_catalog());
        t.add_part("a", (0, 0), (0..100).collect_vec(), None, vec![0; 100]);

        let writer = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            t.read(&["k"], &SelectQuery::default(), 2).unwrap();
        });

        let logs = String::from_utf8(writer.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Key condition: true"));
        assert!(logs.contains("Date condition: true"));
        assert!(logs.contains("Selected 1 parts by date, 1 parts by key, 10 marks to read from 1 ranges"));
    }
}
