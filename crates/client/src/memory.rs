//! Free-memory diagnostics around critical upload steps.
//!
//! Samples never influence control flow. They exist to correlate field
//! failures with fragmentation or exhaustion of the device's memory pools.

use std::fmt;

/// Free memory at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    /// Available bytes in the primary pool.
    pub primary_free: u64,
    /// Available bytes in the secondary pool, where the platform has one.
    pub secondary_free: Option<u64>,
}

/// Source of free-memory figures.
///
/// Firmware ports implement this over their allocator statistics.
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> Option<MemorySample>;
}

/// Reads `MemAvailable` (primary) and `SwapFree` (secondary) from
/// `/proc/meminfo`. Yields nothing on platforms without it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemoryProbe;

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&self) -> Option<MemorySample> {
        let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_meminfo(&meminfo)
    }
}

fn parse_meminfo(meminfo: &str) -> Option<MemorySample> {
    let field_bytes = |name: &str| {
        meminfo.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kib: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            Some(kib * 1024)
        })
    };
    Some(MemorySample {
        primary_free: field_bytes("MemAvailable")?,
        secondary_free: field_bytes("SwapFree").filter(|&free| free > 0),
    })
}

/// Records labelled memory samples and the primary low-water mark.
pub struct MemoryMonitor {
    probe: Option<Box<dyn MemoryProbe>>,
    last: Option<MemorySample>,
    min_primary_free: Option<u64>,
}

impl MemoryMonitor {
    pub fn new(probe: impl MemoryProbe + 'static) -> Self {
        Self {
            probe: Some(Box::new(probe)),
            last: None,
            min_primary_free: None,
        }
    }

    /// A monitor that records nothing.
    pub fn disabled() -> Self {
        Self {
            probe: None,
            last: None,
            min_primary_free: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.probe.is_some()
    }

    /// Sample free memory and log it under `label`.
    pub fn snapshot(&mut self, label: &str) {
        let Some(sample) = self.probe.as_ref().and_then(|probe| probe.sample()) else {
            return;
        };
        let min = self
            .min_primary_free
            .map_or(sample.primary_free, |min| min.min(sample.primary_free));
        self.min_primary_free = Some(min);
        self.last = Some(sample);

        tracing::debug!(
            target: "chunklift::memory",
            label,
            primary_free = sample.primary_free,
            secondary_free = sample.secondary_free,
            min_primary_free = min,
            "memory snapshot"
        );
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<MemorySample> {
        self.last
    }

    /// Lowest primary free figure seen so far.
    pub fn min_primary_free(&self) -> Option<u64> {
        self.min_primary_free
    }
}

impl fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("enabled", &self.is_enabled())
            .field("last", &self.last)
            .field("min_primary_free", &self.min_primary_free)
            .finish()
    }
}
