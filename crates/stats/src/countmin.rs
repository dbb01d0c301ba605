//! Count-Min frequency sketch.
//!
//! Resolved from `original_source/ext/count_min_sketch.hpp`: width =
//! ceil(e / eps), depth = ceil(ln(1/gamma)), per-bucket `u32` counters.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone)]
pub struct CountMinSketch {
    width: usize,
    depth: usize,
    eps: f64,
    gamma: f64,
    counters: Vec<u32>,
}

impl CountMinSketch {
    pub fn new(eps: f64, gamma: f64) -> Self {
        let eps = if eps > 0.0 { eps } else { 0.001 };
        let gamma = if gamma > 0.0 && gamma < 1.0 { gamma } else { 0.01 };
        let width = (std::f64::consts::E / eps).ceil().max(1.0) as usize;
        let depth = (1.0 / gamma).ln().ceil().max(1.0) as usize;
        Self {
            width,
            depth,
            eps,
            gamma,
            counters: vec![0u32; width * depth],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    fn col(&self, row: usize, item: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        row.hash(&mut hasher);
        item.hash(&mut hasher);
        (hasher.finish() % self.width as u64) as usize
    }

    pub fn add(&mut self, item: &str, n: u32) {
        for row in 0..self.depth {
            let col = self.col(row, item);
            let idx = row * self.width + col;
            self.counters[idx] = self.counters[idx].saturating_add(n);
        }
    }

    pub fn estimate(&self, item: &str) -> u32 {
        (0..self.depth)
            .map(|row| self.counters[row * self.width + self.col(row, item)])
            .min()
            .unwrap_or(0)
    }

    pub fn erase(&mut self) {
        self.counters.iter_mut().for_each(|c| *c = 0);
    }

    /// Element-wise sum used to merge slots across a window ring before
    /// estimating a probe's frequency over the whole sum window.
    pub fn merge_from(&mut self, other: &CountMinSketch) {
        if self.width != other.width || self.depth != other.depth {
            return;
        }
        for (a, b) in self.counters.iter_mut().zip(other.counters.iter()) {
            *a = a.saturating_add(*b);
        }
    }

    pub fn dump(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.counters.len() * 4);
        out.extend_from_slice(&(self.width as u32).to_le_bytes());
        out.extend_from_slice(&(self.depth as u32).to_le_bytes());
        for c in &self.counters {
            out.extend_from_slice(&c.to_le_bytes());
        }
        out
    }

    pub fn restore(blob: &[u8], eps: f64, gamma: f64) -> Option<Self> {
        if blob.len() < 8 {
            return None;
        }
        let width = u32::from_le_bytes(blob[0..4].try_into().ok()?) as usize;
        let depth = u32::from_le_bytes(blob[4..8].try_into().ok()?) as usize;
        let expected = 8 + width * depth * 4;
        if blob.len() != expected {
            return None;
        }
        let mut counters = Vec::with_capacity(width * depth);
        for chunk in blob[8..].chunks_exact(4) {
            counters.push(u32::from_le_bytes(chunk.try_into().ok()?));
        }
        Some(Self {
            width,
            depth,
            eps,
            gamma,
            counters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_never_underestimates() {
        let mut cms = CountMinSketch::new(0.01, 0.01);
        for _ in 0..50 {
            cms.add("alice", 1);
        }
        cms.add("bob", 3);
        assert!(cms.estimate("alice") >= 50);
        assert!(cms.estimate("bob") >= 3);
        assert_eq!(cms.estimate("nobody"), 0.max(cms.estimate("nobody")));
    }

    #[test]
    fn dump_restore_roundtrip() {
        let mut cms = CountMinSketch::new(0.01, 0.01);
        cms.add("x", 7);
        let blob = cms.dump();
        let restored = CountMinSketch::restore(&blob, 0.01, 0.01).unwrap();
        assert_eq!(restored.estimate("x"), cms.estimate("x"));
    }
}
