use wforce_domain::config::FieldKind;

use crate::countmin::CountMinSketch;
use crate::hll::Hll;

/// One field's per-window aggregator, per spec.md §3.1.
#[derive(Debug, Clone)]
pub enum StatsAggregator {
    Int(i64),
    Hll(Hll),
    CountMin(CountMinSketch),
}

impl StatsAggregator {
    pub fn new_empty(kind: FieldKind, hll_precision: u8, cm_eps: f64, cm_gamma: f64) -> Self {
        match kind {
            FieldKind::Int => StatsAggregator::Int(0),
            FieldKind::Hll => StatsAggregator::Hll(Hll::new(hll_precision)),
            FieldKind::CountMin => StatsAggregator::CountMin(CountMinSketch::new(cm_eps, cm_gamma)),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            StatsAggregator::Int(_) => FieldKind::Int,
            StatsAggregator::Hll(_) => FieldKind::Hll,
            StatsAggregator::CountMin(_) => FieldKind::CountMin,
        }
    }

    /// Returns `false` on a kind mismatch (misuse case, spec.md §4.1:
    /// "never throws", logged by the caller).
    pub fn add_int(&mut self, delta: i64) -> bool {
        match self {
            StatsAggregator::Int(v) => {
                *v += delta;
                true
            }
            _ => false,
        }
    }

    pub fn set_int(&mut self, value: i64) -> bool {
        match self {
            StatsAggregator::Int(v) => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    pub fn add_string(&mut self, item: &str, n: u32) -> bool {
        match self {
            StatsAggregator::Hll(h) => {
                for _ in 0..n.max(1) {
                    h.add(item);
                }
                true
            }
            StatsAggregator::CountMin(c) => {
                c.add(item, n.max(1));
                true
            }
            _ => false,
        }
    }

    /// Scalar `get()` value for an Int field, or the estimated
    /// cardinality for an Hll field. Count-Min has no scalar value
    /// without a probe string; returns 0.
    pub fn scalar(&self) -> i64 {
        match self {
            StatsAggregator::Int(v) => *v,
            StatsAggregator::Hll(h) => h.estimate() as i64,
            StatsAggregator::CountMin(_) => 0,
        }
    }

    pub fn probe(&self, item: &str) -> i64 {
        match self {
            StatsAggregator::CountMin(c) => c.estimate(item) as i64,
            other => other.scalar(),
        }
    }

    pub fn erase(&mut self) {
        match self {
            StatsAggregator::Int(v) => *v = 0,
            StatsAggregator::Hll(h) => h.erase(),
            StatsAggregator::CountMin(c) => c.erase(),
        }
    }

    pub fn merge_from(&mut self, other: &StatsAggregator) {
        match (self, other) {
            (StatsAggregator::Int(a), StatsAggregator::Int(b)) => *a += *b,
            (StatsAggregator::Hll(a), StatsAggregator::Hll(b)) => a.merge_from(b),
            (StatsAggregator::CountMin(a), StatsAggregator::CountMin(b)) => a.merge_from(b),
            _ => {}
        }
    }

    pub fn dump(&self) -> Vec<u8> {
        match self {
            StatsAggregator::Int(v) => v.to_be_bytes().to_vec(),
            StatsAggregator::Hll(h) => h.dump(),
            StatsAggregator::CountMin(c) => c.dump(),
        }
    }

    pub fn restore(kind: FieldKind, blob: &[u8], cm_eps: f64, cm_gamma: f64) -> Option<Self> {
        match kind {
            FieldKind::Int => {
                let bytes: [u8; 8] = blob.try_into().ok()?;
                Some(StatsAggregator::Int(i64::from_be_bytes(bytes)))
            }
            FieldKind::Hll => Hll::restore(blob).map(StatsAggregator::Hll),
            FieldKind::CountMin => {
                CountMinSketch::restore(blob, cm_eps, cm_gamma).map(StatsAggregator::CountMin)
            }
        }
    }
}

/// One ring slot: a first-write timestamp (zero if empty, else aligned
/// to a `windowSize` multiple from the DB's `startTime`) plus the
/// opaque aggregator, per spec.md §3.1 invariant 2.
#[derive(Debug, Clone)]
pub struct Slot {
    pub first_write: u64,
    pub agg: StatsAggregator,
}

impl Slot {
    pub fn empty(kind: FieldKind, hll_precision: u8, cm_eps: f64, cm_gamma: f64) -> Self {
        Self {
            first_write: 0,
            agg: StatsAggregator::new_empty(kind, hll_precision, cm_eps, cm_gamma),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_write == 0
    }

    pub fn erase(&mut self) {
        self.first_write = 0;
        self.agg.erase();
    }
}
