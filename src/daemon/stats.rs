//! Operational statistics.
//!
//! Every named bucket keeps 63 one-second slots, enough for a full minute of
//! complete data, and reports min/max plus 1s/10s/60s figures for both event
//! rate and elapsed time. Snapshots are served over the query socket via the
//! `stats` and `jstats` admin commands.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

const BUCKETS: usize = 63;
const TEN: usize = 10;
const SIXTY: usize = 60;

/// Buckets the service accounts for.
pub const BUCKET_NAMES: &[&str] = &[
    "connections",
    "reads",
    "writes",
    "success",
    "not_found",
    "bad",
    "stats",
];

/// Aggregates over the ring: extremes across the last minute, plus averages
/// over the trailing 1, 10 and 60 seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Window {
    pub minimum: f64,
    pub maximum: f64,
    pub one: f64,
    pub ten: f64,
    pub sixty: f64,
}

/// One-second slots for counted events.
#[derive(Debug, Clone)]
struct CountingRing {
    slots: [f64; BUCKETS],
    index: usize,
    current_second: u64,
}

/// One-second slots averaging a measured value over the events in the slot.
#[derive(Debug, Clone)]
struct AveragingRing {
    slots: [f64; BUCKETS],
    count: u64,
    index: usize,
    current_second: u64,
}

fn window(slots: &[f64; BUCKETS], index: usize) -> Window {
    let back = |j: usize, n: usize| slots[(j + BUCKETS - (n % BUCKETS)) % BUCKETS];
    // The slot before the current one is the most recent complete second.
    let j = (index + BUCKETS - 1) % BUCKETS;
    let mut minimum = slots[j];
    let mut maximum = slots[j];
    let mut accum = slots[j];
    let one = slots[j];
    for n in 1..TEN {
        let v = back(j, n);
        minimum = minimum.min(v);
        maximum = maximum.max(v);
        accum += v;
    }
    let ten = accum / TEN as f64;
    for n in TEN..SIXTY {
        let v = back(j, n);
        minimum = minimum.min(v);
        maximum = maximum.max(v);
        accum += v;
    }
    let sixty = accum / SIXTY as f64;
    Window {
        minimum,
        maximum,
        one,
        ten,
        sixty,
    }
}

impl CountingRing {
    fn new(now: u64) -> CountingRing {
        CountingRing {
            slots: [0.0; BUCKETS],
            index: 0,
            current_second: now,
        }
    }

    fn advance(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.current_second);
        for _ in 0..elapsed.min(BUCKETS as u64) {
            self.index = (self.index + 1) % BUCKETS;
            self.slots[self.index] = 0.0;
        }
        if elapsed > 0 {
            self.current_second = now;
        }
    }

    fn add(&mut self, now: u64, value: f64) {
        self.advance(now);
        self.slots[self.index] += value;
    }

    fn window(&mut self, now: u64) -> Window {
        self.advance(now);
        window(&self.slots, self.index)
    }
}

impl AveragingRing {
    fn new(now: u64) -> AveragingRing {
        AveragingRing {
            slots: [0.0; BUCKETS],
            count: 0,
            index: 0,
            current_second: now,
        }
    }

    fn advance(&mut self, now: u64) {
        let elapsed = now.saturating_sub(self.current_second);
        for _ in 0..elapsed.min(BUCKETS as u64) {
            if self.count > 0 {
                self.slots[self.index] /= self.count as f64;
                self.count = 0;
            }
            self.index = (self.index + 1) % BUCKETS;
            self.slots[self.index] = 0.0;
        }
        if elapsed > 0 {
            self.current_second = now;
        }
    }

    fn add(&mut self, now: u64, value: f64) {
        self.advance(now);
        self.slots[self.index] += value;
        self.count += 1;
    }

    fn window(&mut self, now: u64) -> Window {
        self.advance(now);
        window(&self.slots, self.index)
    }
}

struct Collector {
    name: &'static str,
    per_second: CountingRing,
    elapsed: AveragingRing,
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketSnapshot {
    pub name: &'static str,
    pub per_second: Window,
    pub elapsed: Window,
}

/// Shared registry of all buckets. Cheap to clone; threads record into the
/// same collectors.
#[derive(Clone)]
pub struct StatsRegistry {
    inner: Arc<Mutex<Vec<Collector>>>,
}

/// Times one event whose bucket is only known once processing finishes.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn stop(self, registry: &StatsRegistry, name: &str) {
        registry.record(name, self.start.elapsed());
    }
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl StatsRegistry {
    pub fn new() -> StatsRegistry {
        let now = now_seconds();
        StatsRegistry {
            inner: Arc::new(Mutex::new(
                BUCKET_NAMES
                    .iter()
                    .copied()
                    .map(|name| Collector {
                        name,
                        per_second: CountingRing::new(now),
                        elapsed: AveragingRing::new(now),
                    })
                    .collect(),
            )),
        }
    }

    pub fn start_timer(&self) -> Timer {
        Timer {
            start: Instant::now(),
        }
    }

    /// Count one event in `name`, averaging in its elapsed time.
    pub fn record(&self, name: &str, elapsed: Duration) {
        let now = now_seconds();
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        if let Some(collector) = inner.iter_mut().find(|c| c.name == name) {
            collector.per_second.add(now, 1.0);
            collector.elapsed.add(now, elapsed.as_secs_f64());
        }
    }

    pub fn snapshot(&self) -> Vec<BucketSnapshot> {
        let now = now_seconds();
        let mut inner = self.inner.lock().expect("stats lock poisoned");
        inner
            .iter_mut()
            .map(|c| BucketSnapshot {
                name: c.name,
                per_second: c.per_second.window(now),
                elapsed: c.elapsed.window(now),
            })
            .collect()
    }

    /// One line per bucket, for the `stats` admin command.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for b in self.snapshot() {
            out.push_str(&format!(
                "{}: 1s={:.1}/s 10s={:.1}/s 60s={:.1}/s min={:.1} max={:.1} elapsed_10s={:.6}\n",
                b.name,
                b.per_second.one,
                b.per_second.ten,
                b.per_second.sixty,
                b.per_second.minimum,
                b.per_second.maximum,
                b.elapsed.ten,
            ));
        }
        out
    }

    /// A single JSON line, for the `jstats` admin command.
    pub fn render_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "[]".to_string())
    }
}

impl Default for StatsRegistry {
    fn default() -> Self {
        StatsRegistry::new()
    }
}
