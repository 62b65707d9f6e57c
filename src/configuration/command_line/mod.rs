mod goflags;

use std::convert::TryFrom;
use std::fmt;
use std::num::{NonZeroU64, NonZeroUsize};
use std::sync::Arc;

use anyhow::Result;

use crate::configuration::{BenchDescription, ConnectionTarget, DEFAULT_HOST};
use crate::distribution;
use crate::generator::{DEFAULT_SEED, YCSB_TUPLE_COUNT, YCSB_TX_COUNT};

use goflags::{GoFlagSet, ParseOutcome};

const SYNOPSIS: &str = "Usage: pg-ycsb [flags] <user> <password> [host] [database]";

pub enum Command {
    Run(Arc<BenchDescription>),
    Help(String),
}

/// The command line could not be understood.
#[derive(Debug)]
pub struct UsageError {
    pub reason: anyhow::Error,
    pub usage: String,
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}\n\n{}", self.reason, self.usage)
    }
}

impl std::error::Error for UsageError {}

pub fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, UsageError> {
    // Skip the first arg
    args.next();

    let mut flag = GoFlagSet::new();

    let tuple_count = flag.var(
        "tuple-count",
        YCSB_TUPLE_COUNT as u64,
        "number of rows loaded into the table",
        distribution::parse_number,
    );
    let tx_count = flag.var(
        "tx-count",
        YCSB_TX_COUNT as u64,
        "number of lookup transactions per key distribution",
        distribution::parse_number,
    );
    let zipf_factor = flag.f64_var(
        "zipf-factor",
        1.0,
        "skew of the zipfian lookup keys",
    );
    let lookup_dist = flag.var(
        "lookup-dist",
        None,
        "additional lookup key distribution, e.g. seq:0..999 or zipf:1m,0.8",
        |s| {
            distribution::parse_distribution(s)?;
            Ok(Some(s.to_owned()))
        },
    );
    let insert_batch = flag.u64_var("insert-batch", 1000, "rows per INSERT statement");
    let scan_count = flag.u64_var("scan-count", 1, "number of full table scans");
    let seed = flag.u64_var("seed", DEFAULT_SEED, "seed of the data and key generators");
    let validate = flag.bool_var(
        "validate",
        false,
        "compare every looked up value with the generated data",
    );

    let usage = || format!("{}\n\nFlags:\n{}", SYNOPSIS, flag.usage());
    let invalid = |reason: anyhow::Error| UsageError {
        reason,
        usage: usage(),
    };

    let positional = match flag.parse_args(args).map_err(invalid)? {
        ParseOutcome::HelpRequested => return Ok(Command::Help(usage())),
        ParseOutcome::Positional(positional) => positional,
    };

    let desc = build_description(
        positional,
        Settings {
            tuple_count: tuple_count.get(),
            tx_count: tx_count.get(),
            zipf_factor: zipf_factor.get(),
            lookup_dist: lookup_dist.get(),
            insert_batch: insert_batch.get(),
            scan_count: scan_count.get(),
            seed: seed.get(),
            validate: validate.get(),
        },
    )
    .map_err(invalid)?;

    Ok(Command::Run(Arc::new(desc)))
}

struct Settings {
    tuple_count: u64,
    tx_count: u64,
    zipf_factor: f64,
    lookup_dist: Option<String>,
    insert_batch: u64,
    scan_count: u64,
    seed: u64,
    validate: bool,
}

fn build_description(positional: Vec<String>, settings: Settings) -> Result<BenchDescription> {
    let mut positional = positional.into_iter();
    let user = positional
        .next()
        .ok_or_else(|| anyhow::anyhow!("Missing user"))?;
    let password = positional
        .next()
        .ok_or_else(|| anyhow::anyhow!("Missing password"))?;
    let host = positional.next().unwrap_or_else(|| DEFAULT_HOST.to_owned());
    let database = positional.next();
    if let Some(extra) = positional.next() {
        return Err(anyhow::anyhow!("Unexpected argument: {:?}", extra));
    }

    anyhow::ensure!(settings.tuple_count > 0, "-tuple-count must be positive");
    anyhow::ensure!(settings.tx_count > 0, "-tx-count must be positive");
    anyhow::ensure!(
        settings.zipf_factor.is_finite() && settings.zipf_factor >= 0.0,
        "-zipf-factor must be a non-negative number"
    );

    Ok(BenchDescription {
        user,
        password,
        database,
        targets: ConnectionTarget::parse_list(&host)?,
        tuple_count: usize::try_from(settings.tuple_count)?,
        tx_count: usize::try_from(settings.tx_count)?,
        zipf_factor: settings.zipf_factor,
        lookup_dist: settings.lookup_dist,
        insert_batch: NonZeroUsize::new(usize::try_from(settings.insert_batch)?)
            .ok_or_else(|| anyhow::anyhow!("-insert-batch must be positive"))?,
        scan_count: NonZeroU64::new(settings.scan_count)
            .ok_or_else(|| anyhow::anyhow!("-scan-count must be positive"))?,
        seed: settings.seed,
        validate: settings.validate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(list: &[&str]) -> Result<Command, UsageError> {
        let args: Vec<String> = std::iter::once("pg-ycsb")
            .chain(list.iter().copied())
            .map(str::to_owned)
            .collect();
        parse_args(args.into_iter())
    }

    fn run(list: &[&str]) -> Arc<BenchDescription> {
        match parse(list) {
            Ok(Command::Run(desc)) => desc,
            Ok(Command::Help(_)) => panic!("unexpected help"),
            Err(err) => panic!("unexpected error: {}", err),
        }
    }

    #[test]
    fn defaults() {
        let desc = run(&["alice", "secret"]);
        assert_eq!(desc.user, "alice");
        assert_eq!(desc.password, "secret");
        assert_eq!(desc.database, None);
        assert_eq!(
            desc.targets,
            vec![ConnectionTarget::Tcp {
                host: "localhost".to_owned(),
                port: 5432
            }]
        );
        assert_eq!(desc.tuple_count, YCSB_TUPLE_COUNT);
        assert_eq!(desc.tx_count, YCSB_TX_COUNT);
        assert_eq!(desc.insert_batch.get(), 1000);
        assert_eq!(desc.scan_count.get(), 1);
        assert_eq!(desc.seed, DEFAULT_SEED);
        assert!(!desc.validate);
        assert!(desc.lookup_dist.is_none());
    }

    #[test]
    fn host_and_database() {
        let desc = run(&["alice", "secret", "db1,db2:5433", "bench"]);
        assert_eq!(desc.targets.len(), 2);
        assert_eq!(desc.database.as_deref(), Some("bench"));
    }

    #[test]
    fn flags_before_positionals() {
        let desc = run(&[
            "-tuple-count=10k",
            "-tx-count",
            "500",
            "-validate",
            "-lookup-dist",
            "seq:0..9",
            "alice",
            "secret",
        ]);
        assert_eq!(desc.tx_count, 500);
        assert!(desc.validate);
        assert_eq!(desc.lookup_dist.as_deref(), Some("seq:0..9"));
    }

    #[test]
    fn missing_arguments_are_usage_errors() {
        assert!(parse(&[]).is_err());
        let err = parse(&["alice"]).err().unwrap();
        assert!(err.to_string().contains("Missing password"));
        assert!(err.to_string().contains(SYNOPSIS));
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(parse(&["-tuple-count", "0", "a", "b"]).is_err());
        assert!(parse(&["-insert-batch", "0", "a", "b"]).is_err());
        assert!(parse(&["-zipf-factor", "-1", "a", "b"]).is_err());
        assert!(parse(&["-lookup-dist", "bogus", "a", "b"]).is_err());
        assert!(parse(&["a", "b", "host", "db", "extra"]).is_err());
    }

    #[test]
    fn help() {
        match parse(&["-h"]) {
            Ok(Command::Help(usage)) => assert!(usage.contains("-tuple-count")),
            _ => panic!("expected help"),
        }
    }
}
