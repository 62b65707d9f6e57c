use std::convert::TryFrom;

use anyhow::Result;
use rand::distributions::{Alphanumeric, Distribution as RandDistribution};
use rand::SeedableRng;

use crate::distribution::{Distribution, DistributionContext, RngGen};

pub const YCSB_TUPLE_COUNT: usize = 1_000_000;
pub const YCSB_FIELD_COUNT: usize = 10;
pub const YCSB_FIELD_LENGTH: usize = 100;
pub const YCSB_TX_COUNT: usize = 1_000_000;

pub const DEFAULT_SEED: u64 = 88172645463325252;

pub type YcsbKey = u32;

pub type YcsbField = [u8; YCSB_FIELD_LENGTH];

/// Fills buffers with characters from `[0-9A-Za-z]`.
pub struct RandomString {
    gen: RngGen,
}

impl RandomString {
    pub fn new(seed: u64) -> Self {
        Self {
            gen: RngGen::seed_from_u64(seed),
        }
    }

    pub fn fill(&mut self, dest: &mut [u8]) {
        for (d, c) in dest.iter_mut().zip(Alphanumeric.sample_iter(&mut self.gen)) {
            *d = c;
        }
    }
}

#[derive(Clone)]
pub struct YcsbRow {
    fields: [YcsbField; YCSB_FIELD_COUNT],
}

impl YcsbRow {
    pub fn generate(gen: &mut RandomString) -> Self {
        let mut fields = [[0u8; YCSB_FIELD_LENGTH]; YCSB_FIELD_COUNT];
        for field in fields.iter_mut() {
            gen.fill(field);
        }
        Self { fields }
    }

    pub fn field(&self, idx: usize) -> Option<&str> {
        self.fields
            .get(idx)
            .and_then(|f| std::str::from_utf8(f).ok())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        self.fields
            .iter()
            .filter_map(|f| std::str::from_utf8(f).ok())
    }
}

/// The reference dataset. Keys are dense, starting from zero, so the row
/// for key `k` lives at index `k`.
pub struct YcsbDatabase {
    rows: Vec<YcsbRow>,
}

impl YcsbDatabase {
    pub fn generate(tuple_count: usize, seed: u64) -> Result<Self> {
        // Keys are stored in an INTEGER column
        anyhow::ensure!(
            i32::try_from(tuple_count).is_ok(),
            "Tuple count {} does not fit the key column",
            tuple_count
        );

        let mut gen = RandomString::new(seed);
        let mut rows = Vec::with_capacity(tuple_count);
        for _ in 0..tuple_count {
            rows.push(YcsbRow::generate(&mut gen));
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: YcsbKey) -> Option<&YcsbRow> {
        self.rows.get(key as usize)
    }

    pub fn lookup(&self, key: YcsbKey, field: usize) -> Option<&str> {
        self.get(key).and_then(|row| row.field(field))
    }

    /// Rows in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (YcsbKey, &YcsbRow)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .map(|(key, row)| (key as YcsbKey, row))
    }
}

/// Samples `count` lookup keys. Every key must address a row of a dataset
/// holding `tuple_count` rows.
pub fn generate_lookup_keys(
    count: usize,
    tuple_count: usize,
    dist: &dyn Distribution,
    seed: u64,
) -> Result<Vec<YcsbKey>> {
    let mut ctx = DistributionContext::with_seed(seed);
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        let key = dist.get_u64(&mut ctx);
        anyhow::ensure!(
            key < tuple_count as u64,
            "Key {} drawn from {} is outside of the dataset (0..{})",
            key,
            dist.describe(),
            tuple_count
        );
        keys.push(key as YcsbKey);
        ctx.advance();
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::{
        FixedDistribution, SequentialDistribution, UniformDistribution, ZipfDistribution,
    };

    #[test]
    fn rows_have_fixed_shape() {
        let db = YcsbDatabase::generate(50, 1).unwrap();
        assert_eq!(db.len(), 50);
        for (_, row) in db.iter() {
            let fields: Vec<_> = row.fields().collect();
            assert_eq!(fields.len(), YCSB_FIELD_COUNT);
            for f in fields {
                assert_eq!(f.len(), YCSB_FIELD_LENGTH);
                assert!(f.bytes().all(|b| b.is_ascii_alphanumeric()));
            }
        }
    }

    #[test]
    fn keys_are_dense_and_ordered() {
        let db = YcsbDatabase::generate(10, 1).unwrap();
        let keys: Vec<_> = db.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn lookup_handles_missing_values() {
        let db = YcsbDatabase::generate(3, 1).unwrap();
        assert!(db.lookup(2, YCSB_FIELD_COUNT - 1).is_some());
        assert!(db.lookup(3, 0).is_none());
        assert!(db.lookup(0, YCSB_FIELD_COUNT).is_none());
    }

    #[test]
    fn generation_is_deterministic() {
        let a = YcsbDatabase::generate(20, 7).unwrap();
        let b = YcsbDatabase::generate(20, 7).unwrap();
        let c = YcsbDatabase::generate(20, 8).unwrap();
        assert_eq!(a.lookup(13, 4), b.lookup(13, 4));
        assert_ne!(a.lookup(13, 4), c.lookup(13, 4));
    }

    #[test]
    fn fields_differ_within_a_row() {
        let db = YcsbDatabase::generate(1, DEFAULT_SEED).unwrap();
        assert_ne!(db.lookup(0, 0), db.lookup(0, 1));
    }

    #[test]
    fn lookup_keys_follow_the_distribution() {
        let dist = UniformDistribution::new(0..=99).unwrap();
        let keys = generate_lookup_keys(1000, 100, &dist, 3).unwrap();
        assert_eq!(keys.len(), 1000);
        assert!(keys.iter().all(|&k| k < 100));
        assert_eq!(keys, generate_lookup_keys(1000, 100, &dist, 3).unwrap());

        let seq = SequentialDistribution::new(0..=2).unwrap();
        assert_eq!(generate_lookup_keys(4, 3, &seq, 0).unwrap(), vec![0, 1, 2, 0]);

        let zipf = ZipfDistribution::new(10, 1.0).unwrap();
        assert!(generate_lookup_keys(100, 10, &zipf, 3)
            .unwrap()
            .iter()
            .all(|&k| k < 10));
    }

    #[test]
    fn lookup_keys_must_address_loaded_rows() {
        let beyond_i32 = FixedDistribution(3_000_000_000);
        assert!(generate_lookup_keys(1, 10, &beyond_i32, 0).is_err());

        let just_past_the_end = FixedDistribution(10);
        assert!(generate_lookup_keys(1, 10, &just_past_the_end, 0).is_err());

        let last_row = FixedDistribution(9);
        assert_eq!(generate_lookup_keys(2, 10, &last_row, 0).unwrap(), vec![9, 9]);

        // The third key wraps past the end of the dataset
        let seq = SequentialDistribution::new(8..=10).unwrap();
        assert!(generate_lookup_keys(3, 10, &seq, 0).is_err());
    }
}
