use std::ops::RangeInclusive;

use anyhow::Result;
use rand::distributions::Distribution as RandDistribution;
use rand::SeedableRng;
use rand_distr::{Uniform, Zipf};
use rand_pcg::Pcg64Mcg;

pub type RngGen = Pcg64Mcg;

pub struct DistributionContext {
    seq: u64,
    gen: RngGen,
}

impl DistributionContext {
    pub fn new(seq: u64, gen: RngGen) -> Self {
        DistributionContext { seq, gen }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(0, RngGen::seed_from_u64(seed))
    }

    pub fn get_seq(&self) -> u64 {
        self.seq
    }

    pub fn advance(&mut self) {
        self.seq += 1;
    }

    pub fn get_gen_mut(&mut self) -> &mut RngGen {
        &mut self.gen
    }
}

pub trait Distribution: Send + Sync {
    fn get_u64(&self, ctx: &mut DistributionContext) -> u64;

    /// Short human readable form, used in reports.
    fn describe(&self) -> String;
}

pub struct FixedDistribution(pub u64);

impl Distribution for FixedDistribution {
    fn get_u64(&self, _ctx: &mut DistributionContext) -> u64 {
        self.0
    }

    fn describe(&self) -> String {
        format!("fixed:{}", self.0)
    }
}

pub struct UniformDistribution {
    range: RangeInclusive<u64>,
    inner: Uniform<u64>,
}

impl UniformDistribution {
    pub fn new(range: RangeInclusive<u64>) -> Result<Self> {
        anyhow::ensure!(
            range.start() <= range.end(),
            "Empty uniform range {}..{}",
            range.start(),
            range.end()
        );
        let inner = Uniform::new_inclusive(range.start(), range.end());
        Ok(Self { range, inner })
    }
}

impl Distribution for UniformDistribution {
    fn get_u64(&self, ctx: &mut DistributionContext) -> u64 {
        self.inner.sample(ctx.get_gen_mut())
    }

    fn describe(&self) -> String {
        format!("uniform:{}..{}", self.range.start(), self.range.end())
    }
}

pub struct SequentialDistribution {
    base: u64,
    width: u64,
}

impl SequentialDistribution {
    pub fn new(range: RangeInclusive<u64>) -> Result<Self> {
        anyhow::ensure!(
            range.start() <= range.end(),
            "Empty sequential range {}..{}",
            range.start(),
            range.end()
        );
        // Zero width stands for the full u64 range
        let width = (range.end() - range.start()).wrapping_add(1);
        Ok(Self {
            base: *range.start(),
            width,
        })
    }
}

impl Distribution for SequentialDistribution {
    fn get_u64(&self, ctx: &mut DistributionContext) -> u64 {
        let mut idx = ctx.get_seq();
        if self.width > 0 {
            idx %= self.width;
        }
        self.base.wrapping_add(idx)
    }

    fn describe(&self) -> String {
        format!(
            "seq:{}..{}",
            self.base,
            self.base.wrapping_add(self.width.wrapping_sub(1))
        )
    }
}

/// Zipfian distribution over `0..count`.
///
/// Value `k` is drawn with probability proportional to `(k + 1)^-factor`,
/// so the smallest values are the most popular ones.
pub struct ZipfDistribution {
    count: u64,
    factor: f64,
    inner: Zipf<f64>,
}

impl ZipfDistribution {
    pub fn new(count: u64, factor: f64) -> Result<Self> {
        anyhow::ensure!(count > 0, "Zipf distribution needs at least one value");
        anyhow::ensure!(
            factor.is_finite() && factor >= 0.0,
            "Invalid zipf factor: {}",
            factor
        );
        let inner = Zipf::new(count, factor)
            .map_err(|err| anyhow::anyhow!("Invalid zipf parameters: {}", err))?;
        Ok(Self {
            count,
            factor,
            inner,
        })
    }
}

impl Distribution for ZipfDistribution {
    fn get_u64(&self, ctx: &mut DistributionContext) -> u64 {
        // Ranks are 1-based
        let rank = self.inner.sample(ctx.get_gen_mut()) as u64;
        rank.clamp(1, self.count) - 1
    }

    fn describe(&self) -> String {
        format!("zipf:{},{}", self.count, self.factor)
    }
}

// Parse distribution description in c-s or s-b style
pub fn parse_distribution(s: &str) -> Result<Box<dyn Distribution>> {
    let s = s.trim();

    // Locate the argument list and the distribution name
    let (dist_s, args_s) = if let Some(left_paren) = s.find('(') {
        anyhow::ensure!(
            s.ends_with(')'),
            "Missing closing parenthesis ')' for the distribution parameter list"
        );
        (&s[..left_paren], &s[left_paren + 1..s.len() - 1])
    } else if let Some(colon) = s.find(':') {
        (&s[..colon], &s[colon + 1..])
    } else {
        return Err(anyhow::anyhow!("Missing parameter list"));
    };

    let args: Vec<_> = args_s.split(',').map(str::trim).collect();
    let dist_name = dist_s.trim().to_lowercase();

    let ensure_arg_count = |counts: RangeInclusive<usize>| {
        anyhow::ensure!(
            counts.contains(&args.len()),
            "Expected {}..{} parameters for the {} distribution, got {}",
            counts.start(),
            counts.end(),
            dist_name,
            args.len()
        );
        Ok(())
    };

    match dist_name.as_str() {
        "fixed" => {
            ensure_arg_count(1..=1)?;
            let num = parse_number(args[0])?;
            Ok(Box::new(FixedDistribution(num)))
        }
        "uniform" => {
            ensure_arg_count(1..=1)?;
            let range = parse_range(args[0])?;
            Ok(Box::new(UniformDistribution::new(range)?))
        }
        "seq" => {
            ensure_arg_count(1..=1)?;
            let range = parse_range(args[0])?;
            Ok(Box::new(SequentialDistribution::new(range)?))
        }
        "zipf" => {
            ensure_arg_count(1..=2)?;
            let count = parse_number(args[0])?;
            let factor = match args.get(1) {
                Some(f) => f
                    .parse()
                    .map_err(|err| anyhow::anyhow!("Invalid zipf factor {:?}: {}", f, err))?,
                None => 1.0,
            };
            Ok(Box::new(ZipfDistribution::new(count, factor)?))
        }
        other => Err(anyhow::anyhow!("Unknown distribution: {:?}", other)),
    }
}

fn parse_range(s: &str) -> Result<RangeInclusive<u64>> {
    match s.split_once("..") {
        Some((left, right)) => {
            let left = parse_number(left)?;
            let right = parse_number(right)?;
            Ok(left..=right)
        }
        None => Err(anyhow::anyhow!(
            "The distribution parameter is missing the '..' separator"
        )),
    }
}

pub fn parse_number(s: &str) -> Result<u64> {
    let s = s.trim();
    let last_char = s.chars().last().map(|c| c.to_ascii_lowercase());

    let mult = match last_char {
        Some('b') => Some(1_000_000_000),
        Some('m') => Some(1_000_000),
        Some('k') => Some(1_000),
        _ => None,
    };
    match mult {
        Some(mult) => {
            let num: u64 = s[..s.len() - 1].parse()?;
            num.checked_mul(mult)
                .ok_or_else(|| anyhow::anyhow!("Number out of range: {}", s))
        }
        None => Ok(s.parse()?),
    }
}
