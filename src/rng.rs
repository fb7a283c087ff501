//! Seeded pseudo-random numbers for the review mosaic.
//!
//! The mosaic must look different every day but identical for every visitor
//! on the same day, so all randomness comes from a linear congruential
//! generator seeded by the calendar date. Callers never construct generators
//! directly: they ask a [`RandomStreams`] for an independent stream per use
//! (one per review partition), which lets tests inject fixed sequences.

use chrono::{Datelike, NaiveDate};

const LCG_MULTIPLIER: u64 = 9301;
const LCG_INCREMENT: u64 = 49297;
const LCG_MODULUS: u64 = 233_280;

/// Source of uniform values in `[0, 1)`.
pub trait RandomSource {
    fn next_f64(&mut self) -> f64;
}

/// `state = (state * 9301 + 49297) % 233280`, output `state / 233280`.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % LCG_MODULUS,
        }
    }
}

impl RandomSource for Lcg {
    fn next_f64(&mut self) -> f64 {
        self.state = (self.state * LCG_MULTIPLIER + LCG_INCREMENT) % LCG_MODULUS;
        self.state as f64 / LCG_MODULUS as f64
    }
}

/// Replays a fixed list of values, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct FixedSequence {
    values: Vec<f64>,
    pos: usize,
}

impl FixedSequence {
    /// Values are clamped into `[0, 1)`; an empty list behaves like `[0.0]`.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let values: Vec<f64> = values
            .into_iter()
            .map(|v| v.clamp(0.0, 1.0 - f64::EPSILON))
            .collect();
        Self { values, pos: 0 }
    }
}

impl RandomSource for FixedSequence {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.pos % self.values.len()];
        self.pos += 1;
        value
    }
}

/// Factory for independent random streams, one per stream offset.
pub trait RandomStreams {
    fn stream(&self, offset: u64) -> Box<dyn RandomSource>;
}

/// Production streams: an [`Lcg`] seeded with `seed + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySeed {
    pub seed: u64,
}

impl DailySeed {
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            seed: date_seed(date),
        }
    }
}

impl RandomStreams for DailySeed {
    fn stream(&self, offset: u64) -> Box<dyn RandomSource> {
        Box::new(Lcg::new(self.seed + offset))
    }
}

/// Every stream replays the same fixed sequence from its start.
impl RandomStreams for FixedSequence {
    fn stream(&self, _offset: u64) -> Box<dyn RandomSource> {
        Box::new(Self::new(self.values.clone()))
    }
}

/// `year * 10000 + month * 100 + day`, e.g. 2025-01-01 → 20250101.
pub fn date_seed(date: NaiveDate) -> u64 {
    let year = date.year().max(0) as u64;
    year * 10_000 + u64::from(date.month()) * 100 + u64::from(date.day())
}

/// In-place Fisher–Yates shuffle.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = ((rng.next_f64() * (i + 1) as f64) as usize).min(i);
        items.swap(i, j);
    }
}
