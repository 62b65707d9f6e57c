use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::{ConnectOptions, Connection, PgConnection};
use tokio::time::Instant;

use crate::configuration::{BenchDescription, ConnectionTarget};
use crate::distribution::{self, Distribution, UniformDistribution, ZipfDistribution};
use crate::generator::{self, YcsbDatabase};
use crate::report::TargetReport;
use crate::workload::{self, LookupWorkload, ScanWorkload, Schema, Workload};

// Offsets keep the key streams of different workloads independent
const UNIFORM_KEYS_SEED_OFFSET: u64 = 1;
const ZIPF_KEYS_SEED_OFFSET: u64 = 2;
const CUSTOM_KEYS_SEED_OFFSET: u64 = 3;
const FIELDS_SEED_OFFSET: u64 = 4;

/// Everything that is generated once and reused for every target.
struct Plan {
    db: Arc<YcsbDatabase>,
    schema: Schema,
    workloads: Vec<Box<dyn Workload>>,
}

impl Plan {
    fn new(config: &BenchDescription) -> Result<Self> {
        println!(
            "Generating {} tuples of {} x {} bytes",
            config.tuple_count,
            generator::YCSB_FIELD_COUNT,
            generator::YCSB_FIELD_LENGTH
        );
        let start = Instant::now();
        let db = Arc::new(YcsbDatabase::generate(config.tuple_count, config.seed)?);
        anyhow::ensure!(!db.is_empty(), "The dataset is empty");
        tracing::debug!("Generated the dataset in {:?}", start.elapsed());

        let schema = Schema::ycsb();
        let fields = Arc::new(workload::generate_field_indices(
            config.tx_count,
            schema.field_count(),
            config.seed.wrapping_add(FIELDS_SEED_OFFSET),
        )?);

        let max_key = config.tuple_count as u64 - 1;
        let mut key_sets: Vec<(String, Box<dyn Distribution>, u64)> = Vec::new();
        key_sets.push((
            "lookup uniform".to_owned(),
            Box::new(UniformDistribution::new(0..=max_key)?),
            UNIFORM_KEYS_SEED_OFFSET,
        ));
        key_sets.push((
            "lookup zipf".to_owned(),
            Box::new(ZipfDistribution::new(
                config.tuple_count as u64,
                config.zipf_factor,
            )?),
            ZIPF_KEYS_SEED_OFFSET,
        ));
        if let Some(desc) = &config.lookup_dist {
            key_sets.push((
                format!("lookup {}", desc),
                distribution::parse_distribution(desc)?,
                CUSTOM_KEYS_SEED_OFFSET,
            ));
        }

        let mut workloads: Vec<Box<dyn Workload>> = Vec::with_capacity(key_sets.len() + 1);
        for (name, dist, seed_offset) in key_sets {
            tracing::debug!("Generating lookup keys for {}", dist.describe());
            let keys = generator::generate_lookup_keys(
                config.tx_count,
                config.tuple_count,
                dist.as_ref(),
                config.seed.wrapping_add(seed_offset),
            )?;
            let mut lookup = LookupWorkload::new(name, &schema, Arc::new(keys), fields.clone());
            if config.validate {
                lookup = lookup.validate_with(db.clone());
            }
            workloads.push(Box::new(lookup));
        }
        workloads.push(Box::new(ScanWorkload::new(
            &schema,
            config.tuple_count as u64,
            config.scan_count.get(),
        )));

        Ok(Self {
            db,
            schema,
            workloads,
        })
    }
}

pub async fn run(config: Arc<BenchDescription>) -> Result<()> {
    let plan = Plan::new(&config)?;

    let mut failures = 0;
    for target in &config.targets {
        println!("Benchmarking {}", target);
        let mut report = TargetReport::new(target);
        if let Err(err) = run_target(&config, &plan, target, &mut report).await {
            report.fail(err);
        }

        if report.is_failed() {
            failures += 1;
            tracing::error!("{}", report.summary());
        } else {
            tracing::info!("{}", report.summary());
        }
    }

    anyhow::ensure!(
        failures < config.targets.len(),
        "The benchmark failed on every target"
    );
    Ok(())
}

async fn run_target(
    config: &BenchDescription,
    plan: &Plan,
    target: &ConnectionTarget,
    report: &mut TargetReport,
) -> Result<()> {
    let mut conn = config
        .connect_options(target)
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;
    tracing::info!("Connected to {}", target);

    run_workloads(&mut conn, config, plan, report).await?;

    // Dropping the connection also drops the temporary table
    conn.close().await.context("Failed to close the connection")?;

    Ok(())
}

async fn run_workloads(
    conn: &mut PgConnection,
    config: &BenchDescription,
    plan: &Plan,
    report: &mut TargetReport,
) -> Result<()> {
    println!("Loading {} tuples", plan.db.len());
    let start = Instant::now();
    workload::load(conn, &plan.schema, &plan.db, config.insert_batch.get()).await?;
    tracing::info!("Loaded {} tuples in {:?}", plan.db.len(), start.elapsed());

    for bench in &plan.workloads {
        let name = bench.name();
        bench
            .prepare(conn)
            .await
            .with_context(|| format!("Failed to prepare {}", name))?;

        println!("Running {}", name);
        let result = bench
            .run(conn)
            .await
            .with_context(|| format!("{} failed", name))?;
        report.add(result);
    }
    Ok(())
}
