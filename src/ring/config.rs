//! Ring configuration: capacity, direction, depth policy and priority

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IovError, Result};

/// Ring flag: reading a hole fails the operation instead of zero-filling
pub const RING_FLAG_READ_HOLE_ERROR: u32 = 2;

/// Scheduling class for a ring's operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Normal
    }
}

impl Priority {
    /// Raw value handed to the engine
    pub fn as_raw(self) -> i32 {
        match self {
            Priority::High => -1,
            Priority::Normal => 0,
            Priority::Low => 1,
        }
    }

    /// Parse a raw engine value
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(Priority::High),
            0 => Some(Priority::Normal),
            1 => Some(Priority::Low),
            _ => None,
        }
    }

    /// Get a human-readable name for the priority
    pub fn name(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = IovError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => other
                .parse::<i32>()
                .ok()
                .and_then(Priority::from_raw)
                .ok_or_else(|| {
                    IovError::invalid_parameter("priority", format!("unknown priority '{}'", other))
                }),
        }
    }
}

/// How many queued operations the engine submits per background scan.
///
/// Decoded from the raw `io_depth` integer:
/// - `0`: submit everything queued
/// - `n > 0`: submit exactly `n`; with fewer queued nothing is submitted,
///   so waiting can block until enough operations arrive
/// - `n < 0`: submit at most `|n|`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthPolicy {
    All,
    Exactly(usize),
    UpTo(usize),
}

impl DepthPolicy {
    /// Decode a raw depth value
    pub fn from_depth(depth: i32) -> Self {
        match depth {
            0 => DepthPolicy::All,
            d if d > 0 => DepthPolicy::Exactly(d as usize),
            d => DepthPolicy::UpTo(d.unsigned_abs() as usize),
        }
    }

    /// Number of operations one scan submits when `queued` are waiting
    pub fn batch(&self, queued: usize) -> usize {
        match *self {
            DepthPolicy::All => queued,
            DepthPolicy::Exactly(n) if queued >= n => n,
            DepthPolicy::Exactly(_) => 0,
            DepthPolicy::UpTo(n) => n.min(queued),
        }
    }
}

/// Configuration for creating an I/O ring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Maximum number of operations in flight
    pub entries: usize,
    /// Ring direction: reads when true, writes otherwise
    pub for_read: bool,
    /// Raw depth value, see [`DepthPolicy`]
    pub io_depth: i32,
    /// Scheduling class, engine default when unset
    pub priority: Option<Priority>,
    /// Default timeout for waits
    pub timeout: Option<Duration>,
    /// NUMA node for ring memory, -1 for none
    pub numa: i32,
    /// Engine flags such as [`RING_FLAG_READ_HOLE_ERROR`]
    pub flags: u32,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            entries: 1,
            for_read: true,
            io_depth: 0,
            priority: None,
            timeout: None,
            numa: -1,
            flags: 0,
        }
    }
}

impl RingConfig {
    /// Create a read ring configuration with room for `entries` operations
    pub fn new(entries: usize) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    /// Set the direction
    pub fn with_for_read(mut self, for_read: bool) -> Self {
        self.for_read = for_read;
        self
    }

    /// Set the raw depth value
    pub fn with_io_depth(mut self, io_depth: i32) -> Self {
        self.io_depth = io_depth;
        self
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: Option<Priority>) -> Self {
        self.priority = priority;
        self
    }

    /// Set the default wait timeout
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the NUMA node
    pub fn with_numa(mut self, numa: i32) -> Self {
        self.numa = numa;
        self
    }

    /// Set engine flags
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// The decoded depth policy
    pub fn depth_policy(&self) -> DepthPolicy {
        DepthPolicy::from_depth(self.io_depth)
    }

    /// Check whether holes are reported as errors
    pub fn reports_holes(&self) -> bool {
        self.flags & RING_FLAG_READ_HOLE_ERROR != 0
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.entries == 0 {
            return Err(IovError::invalid_parameter(
                "entries",
                "Ring must hold at least one entry",
            ));
        }

        if self.numa < -1 {
            return Err(IovError::invalid_parameter(
                "numa",
                "NUMA node must be -1 or a node index",
            ));
        }

        Ok(())
    }
}
