use std::convert::TryFrom;
use std::hint::black_box;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::TryStreamExt;
use sqlx::{Connection, Executor, PgConnection, Row};
use tokio::time::Instant;

use crate::distribution::{Distribution, DistributionContext, UniformDistribution};
use crate::generator::{YcsbDatabase, YcsbKey, YcsbRow, YCSB_FIELD_COUNT, YCSB_FIELD_LENGTH};
use crate::report::{BenchResult, ProgressReporter};

pub struct Schema {
    table: String,
    field_count: usize,
    field_length: usize,
}

impl Schema {
    pub fn ycsb() -> Self {
        Self {
            table: "ycsb".to_owned(),
            field_count: YCSB_FIELD_COUNT,
            field_length: YCSB_FIELD_LENGTH,
        }
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn create_statement(&self) -> String {
        let mut create = format!(
            "CREATE TEMPORARY TABLE {} (ycsb_key INTEGER PRIMARY KEY NOT NULL",
            self.table
        );
        for i in 1..=self.field_count {
            create += &format!(", v{} CHAR({}) NOT NULL", i, self.field_length);
        }
        create += ")";
        create
    }

    /// One multi-row INSERT for all given rows.
    ///
    /// Generated values are alphanumeric, so they are inlined without escaping.
    pub fn insert_statement<'a>(&self, rows: impl Iterator<Item = (YcsbKey, &'a YcsbRow)>) -> String {
        let mut statement = format!("INSERT INTO {} VALUES ", self.table);
        for (i, (key, row)) in rows.enumerate() {
            if i > 0 {
                statement += ", ";
            }
            statement += &format!("({}", key);
            for field in row.fields() {
                statement += ", '";
                statement += field;
                statement += "'";
            }
            statement += ")";
        }
        statement
    }

    /// Selects one field of one row. `field` counts from zero.
    pub fn lookup_statement(&self, field: usize) -> String {
        format!(
            "SELECT v{} FROM {} WHERE ycsb_key = $1",
            field + 1,
            self.table
        )
    }

    pub fn scan_statement(&self) -> String {
        format!("SELECT * FROM {}", self.table)
    }
}

/// Creates the temporary table and fills it with the whole dataset.
pub async fn load(
    conn: &mut PgConnection,
    schema: &Schema,
    db: &YcsbDatabase,
    batch_size: usize,
) -> Result<()> {
    sqlx::raw_sql(&schema.create_statement())
        .execute(&mut *conn)
        .await
        .context("Failed to create the table")?;

    let mut progress = LoadProgress::new(db.len());
    let mut rows = db.iter().peekable();
    while rows.peek().is_some() {
        if let Some(percent) = progress.next_percent() {
            print!("\r{}%", percent);
            let _ = std::io::stdout().flush();
        }

        let batch: Vec<_> = rows.by_ref().take(batch_size).collect();
        let batch_len = batch.len();
        let statement = schema.insert_statement(batch.into_iter());
        sqlx::raw_sql(&statement)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to insert rows starting at key {}", progress.loaded()))?;
        progress.advance(batch_len);
    }
    println!("\r100%");

    Ok(())
}

/// Tracks how much of the dataset is loaded, in whole percent.
struct LoadProgress {
    total: usize,
    loaded: usize,
    last_percent: Option<usize>,
}

impl LoadProgress {
    fn new(total: usize) -> Self {
        Self {
            total,
            loaded: 0,
            last_percent: None,
        }
    }

    fn loaded(&self) -> usize {
        self.loaded
    }

    fn advance(&mut self, rows: usize) {
        self.loaded = (self.loaded + rows).min(self.total);
    }

    /// The current percentage, if it changed since the last call.
    fn next_percent(&mut self) -> Option<usize> {
        let percent = if self.total == 0 {
            100
        } else {
            self.loaded * 100 / self.total
        };
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }
}

#[async_trait]
pub trait Workload: Sync {
    fn name(&self) -> String;

    /// Runs before timing starts.
    async fn prepare(&self, _conn: &mut PgConnection) -> Result<()> {
        Ok(())
    }

    async fn run(&self, conn: &mut PgConnection) -> Result<BenchResult>;
}

/// Point lookups, one small transaction per key.
pub struct LookupWorkload {
    name: String,
    statements: Vec<String>,
    keys: Arc<Vec<YcsbKey>>,
    fields: Arc<Vec<usize>>,
    reference: Option<Arc<YcsbDatabase>>,
}

impl LookupWorkload {
    pub fn new(
        name: impl Into<String>,
        schema: &Schema,
        keys: Arc<Vec<YcsbKey>>,
        fields: Arc<Vec<usize>>,
    ) -> Self {
        let statements = (0..schema.field_count())
            .map(|field| schema.lookup_statement(field))
            .collect();
        Self {
            name: name.into(),
            statements,
            keys,
            fields,
            reference: None,
        }
    }

    /// Compare every returned value against the generated data.
    pub fn validate_with(mut self, reference: Arc<YcsbDatabase>) -> Self {
        self.reference = Some(reference);
        self
    }

    async fn lookup(&self, conn: &mut PgConnection, key: YcsbKey, field: usize) -> Result<String> {
        // The key column is a signed INTEGER
        let key = i32::try_from(key)?;
        let mut tx = conn.begin().await?;
        let value: String = sqlx::query_scalar(&self.statements[field])
            .bind(key)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(value)
    }
}

#[async_trait]
impl Workload for LookupWorkload {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn prepare(&self, conn: &mut PgConnection) -> Result<()> {
        for statement in &self.statements {
            (&mut *conn)
                .prepare(statement.as_str())
                .await
                .with_context(|| format!("Failed to prepare {:?}", statement))?;
        }
        Ok(())
    }

    async fn run(&self, conn: &mut PgConnection) -> Result<BenchResult> {
        let mut result = BenchResult::new(self.name());
        let mut progress = ProgressReporter::new();

        let start = Instant::now();
        for (&key, &field) in self.keys.iter().zip(self.fields.iter()) {
            let op_start = Instant::now();
            let value = self
                .lookup(conn, key, field)
                .await
                .with_context(|| format!("Lookup of key {} failed", key))?;
            result.record(op_start.elapsed())?;

            match &self.reference {
                Some(reference) => {
                    let expected = reference.lookup(key, field);
                    anyhow::ensure!(
                        expected == Some(value.as_str()),
                        "Unexpected value of v{} for key {}: {:?}",
                        field + 1,
                        key,
                        value
                    );
                }
                None => {
                    black_box(value);
                }
            }
            progress.maybe_print_report(result.operations);
        }
        result.elapsed = start.elapsed();

        Ok(result)
    }
}

/// Full table scans, reading every field of every row.
pub struct ScanWorkload {
    statement: String,
    field_count: usize,
    expected_rows: u64,
    repetitions: u64,
}

impl ScanWorkload {
    pub fn new(schema: &Schema, expected_rows: u64, repetitions: u64) -> Self {
        Self {
            statement: schema.scan_statement(),
            field_count: schema.field_count(),
            expected_rows,
            repetitions,
        }
    }

    async fn scan(&self, conn: &mut PgConnection) -> Result<(u64, usize)> {
        let mut rows = sqlx::query(&self.statement).fetch(&mut *conn);
        let mut count = 0;
        let mut bytes = 0;
        while let Some(row) = rows.try_next().await? {
            let key: i32 = row.try_get(0usize)?;
            bytes += std::mem::size_of_val(&key);
            for i in 1..=self.field_count {
                let value: &str = row.try_get(i)?;
                bytes += value.len();
            }
            count += 1;
        }
        Ok((count, bytes))
    }
}

#[async_trait]
impl Workload for ScanWorkload {
    fn name(&self) -> String {
        "scan".to_owned()
    }

    async fn run(&self, conn: &mut PgConnection) -> Result<BenchResult> {
        let mut result = BenchResult::new(self.name());

        let start = Instant::now();
        for _ in 0..self.repetitions {
            let op_start = Instant::now();
            let (count, bytes) = self.scan(conn).await.context("Scan failed")?;
            result.record(op_start.elapsed())?;
            anyhow::ensure!(
                count == self.expected_rows,
                "Scan returned {} rows, expected {}",
                count,
                self.expected_rows
            );
            black_box(bytes);
            result.items += count;
        }
        result.elapsed = start.elapsed();

        Ok(result)
    }
}

/// Field index for each lookup transaction, uniform over the schema's fields.
pub fn generate_field_indices(count: usize, field_count: usize, seed: u64) -> Result<Vec<usize>> {
    anyhow::ensure!(field_count > 0, "The schema has no fields");
    let dist = UniformDistribution::new(0..=(field_count as u64 - 1))?;
    let mut ctx = DistributionContext::with_seed(seed);
    Ok((0..count)
        .map(|_| dist.get_u64(&mut ctx) as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_statement_lists_every_field() {
        let schema = Schema::ycsb();
        let create = schema.create_statement();
        assert!(create.starts_with(
            "CREATE TEMPORARY TABLE ycsb (ycsb_key INTEGER PRIMARY KEY NOT NULL, v1 CHAR(100) NOT NULL, "
        ));
        assert!(create.ends_with(", v10 CHAR(100) NOT NULL)"));
        assert_eq!(create.matches("CHAR(100)").count(), YCSB_FIELD_COUNT);
        assert!(!create.contains("v11"));
    }

    #[test]
    fn insert_statement_contains_all_rows() {
        let schema = Schema::ycsb();
        let db = YcsbDatabase::generate(3, 5).unwrap();
        let insert = schema.insert_statement(db.iter());

        assert!(insert.starts_with("INSERT INTO ycsb VALUES (0, '"));
        assert!(insert.contains("), (1, '"));
        assert!(insert.contains("), (2, '"));
        assert!(insert.ends_with("')"));
        // Two quotes per field
        assert_eq!(insert.matches('\'').count(), 3 * YCSB_FIELD_COUNT * 2);
        assert!(insert.contains(db.lookup(2, 9).unwrap()));
    }

    #[test]
    fn insert_statement_respects_batches() {
        let schema = Schema::ycsb();
        let db = YcsbDatabase::generate(5, 5).unwrap();
        let mut rows = db.iter().peekable();
        let mut statements = Vec::new();
        while rows.peek().is_some() {
            statements.push(schema.insert_statement(rows.by_ref().take(2)));
        }
        assert_eq!(statements.len(), 3);
        assert!(statements[2].starts_with("INSERT INTO ycsb VALUES (4, "));
        assert!(!statements[2].contains("), ("));
    }

    #[test]
    fn load_progress_steps_through_batches() {
        let mut progress = LoadProgress::new(2500);
        let mut printed = Vec::new();
        for batch_len in [1000, 1000, 500].iter() {
            printed.extend(progress.next_percent());
            progress.advance(*batch_len);
        }
        assert_eq!(printed, vec![0, 40, 80]);
        assert_eq!(progress.loaded(), 2500);
        assert_eq!(progress.next_percent(), Some(100));
        assert_eq!(progress.next_percent(), None);
    }

    #[test]
    fn load_progress_prints_each_percent_once() {
        let mut progress = LoadProgress::new(1000);
        let mut printed = Vec::new();
        for _ in 0..1000 {
            printed.extend(progress.next_percent());
            progress.advance(1);
        }
        assert_eq!(printed, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn load_progress_never_passes_the_total() {
        let mut progress = LoadProgress::new(3);
        progress.advance(2);
        progress.advance(2);
        assert_eq!(progress.loaded(), 3);

        let mut empty = LoadProgress::new(0);
        assert_eq!(empty.next_percent(), Some(100));
    }

    #[test]
    fn lookup_and_scan_statements() {
        let schema = Schema::ycsb();
        assert_eq!(
            schema.lookup_statement(0),
            "SELECT v1 FROM ycsb WHERE ycsb_key = $1"
        );
        assert_eq!(
            schema.lookup_statement(9),
            "SELECT v10 FROM ycsb WHERE ycsb_key = $1"
        );
        assert_eq!(schema.scan_statement(), "SELECT * FROM ycsb");
    }

    #[test]
    fn field_indices_cover_the_schema() {
        let fields = generate_field_indices(1000, YCSB_FIELD_COUNT, 9).unwrap();
        assert_eq!(fields.len(), 1000);
        assert!(fields.iter().all(|&f| f < YCSB_FIELD_COUNT));
        for f in 0..YCSB_FIELD_COUNT {
            assert!(fields.contains(&f));
        }
        assert!(generate_field_indices(1, 0, 9).is_err());
    }

    #[test]
    fn lookup_workload_prepares_one_statement_per_field() {
        let schema = Schema::ycsb();
        let workload = LookupWorkload::new(
            "lookup",
            &schema,
            Arc::new(vec![1, 2]),
            Arc::new(vec![0, 1]),
        );
        assert_eq!(workload.name(), "lookup");
        assert_eq!(workload.statements.len(), YCSB_FIELD_COUNT);
        assert!(workload.reference.is_none());
    }
}
