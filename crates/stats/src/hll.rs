//! HyperLogLog cardinality sketch.
//!
//! Resolved from `original_source/twmap.hh`'s HLL field kind: configurable
//! precision (4..=30 register bits, default 6), `add`/`get`/`sum`-across-ring
//! semantics, opaque dump/restore.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct Hll {
    precision: u8,
    registers: Vec<u8>,
}

fn alpha(m: usize) -> f64 {
    match m {
        16 => 0.673,
        32 => 0.697,
        64 => 0.709,
        _ => 0.7213 / (1.0 + 1.079 / m as f64),
    }
}

impl Hll {
    pub fn new(precision: u8) -> Self {
        let precision = precision.clamp(4, 30);
        let m = 1usize << precision;
        Self {
            precision,
            registers: vec![0u8; m],
        }
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    fn hash_of(item: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        hasher.finish()
    }

    pub fn add(&mut self, item: &str) {
        let m = self.registers.len();
        let p = self.precision as u32;
        let hash = Self::hash_of(item);
        let idx = (hash & (m as u64 - 1)) as usize;
        let rest = hash >> p;
        // +1 so an all-zero remainder still yields rho=1.
        let rho = (rest.leading_zeros() - p as u32 + 1).min(64 - p) as u8;
        if rho > self.registers[idx] {
            self.registers[idx] = rho;
        }
    }

    pub fn erase(&mut self) {
        self.registers.iter_mut().for_each(|r| *r = 0);
    }

    pub fn merge_from(&mut self, other: &Hll) {
        for (a, b) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *b > *a {
                *a = *b;
            }
        }
    }

    pub fn estimate(&self) -> u64 {
        let m = self.registers.len() as f64;
        let sum: f64 = self.registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
        let raw = alpha(m as usize) * m * m / sum;

        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        let estimate = if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        };
        estimate.round().max(0.0) as u64
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.registers.len());
        out.push(self.precision);
        out.extend_from_slice(&self.registers);
        out
    }

    pub fn restore(blob: &[u8]) -> Option<Self> {
        let (&precision, registers) = blob.split_first()?;
        let m = 1usize << precision.clamp(4, 30);
        if registers.len() != m {
            return None;
        }
        Some(Self {
            precision,
            registers: registers.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_estimates_zero() {
        let hll = Hll::new(10);
        assert_eq!(hll.estimate(), 0);
    }

    #[test]
    fn cardinality_within_tolerance() {
        let mut hll = Hll::new(12);
        let n = 10_000;
        for i in 0..n {
            hll.add(&format!("item-{i}"));
        }
        let est = hll.estimate() as f64;
        let err = (est - n as f64).abs() / n as f64;
        // 2*sigma for p=12 is roughly 1.04/sqrt(2^12) * 2 ~= 3.3%; allow slack.
        assert!(err < 0.10, "relative error {err} too high, estimate={est}");
    }

    #[test]
    fn dump_restore_roundtrip() {
        let mut hll = Hll::new(8);
        hll.add("a");
        hll.add("b");
        let blob = hll.dump();
        let restored = Hll::restore(&blob).unwrap();
        assert_eq!(restored.estimate(), hll.estimate());
    }

    #[test]
    fn merge_is_max_of_registers() {
        let mut a = Hll::new(8);
        let mut b = Hll::new(8);
        a.add("x");
        b.add("y");
        a.merge_from(&b);
        assert!(a.estimate() >= 1);
    }
}
