//! Tuning parameters for the kernel launch.

use std::fmt;
use std::str::FromStr;

use crate::control::Schedule;
use crate::error::{Error, Result};

/// Compute-unit count the kernel is tuned for. Larger devices still work,
/// just not at full occupancy.
pub const MAX_GROUPS: u32 = 512;

/// Environment variable holding a tuning override, e.g. `"60"` or `"60,2"`.
pub const PERF_VALS_ENV: &str = "ULTRA_CTL_PERF_VALS";

#[derive(Debug, Clone, Copy)]
pub struct TuningConfig {
    /// Worker groups to launch (searched over `1..=MAX_GROUPS`).
    pub groups: u32,
    /// Interleave factor for the record order. Not searched.
    pub interleave: u32,
}

impl TuningConfig {
    pub fn new(groups: u32, interleave: u32) -> Self {
        TuningConfig { groups, interleave }
    }

    /// One group per compute unit up to [`MAX_GROUPS`], no interleaving.
    pub fn heuristic(compute_units: u32) -> Self {
        TuningConfig {
            groups: compute_units.min(MAX_GROUPS),
            interleave: 1,
        }
    }

    /// Start of the search space.
    pub fn first() -> Self {
        TuningConfig::new(1, 1)
    }

    pub fn in_search_space(&self) -> bool {
        (1..=MAX_GROUPS).contains(&self.groups) && self.interleave >= 1
    }

    pub fn is_valid(&self, compute_units: u32) -> bool {
        self.in_search_space() && self.groups <= compute_units
    }

    /// Step to the next point of the search space. Returns `false` once the
    /// space wraps back to its start.
    pub fn advance(&mut self) -> bool {
        if self.groups >= MAX_GROUPS {
            self.groups = 1;
            return false;
        }
        self.groups += 1;
        true
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.groups, self.interleave)
    }

    /// Apply an override string, keeping `self` when it is absent, empty,
    /// malformed, or not valid for the device.
    pub fn with_override(self, value: Option<&str>, compute_units: u32) -> Self {
        let Some(text) = value.filter(|s| !s.is_empty()) else {
            return self;
        };
        match text.parse::<TuningConfig>() {
            Ok(config) if config.is_valid(compute_units) => {
                log::info!("tuning overridden: {config}");
                config
            }
            Ok(config) => {
                log::error!(
                    "{PERF_VALS_ENV}: {config} is not valid for {compute_units} compute units"
                );
                self
            }
            Err(err) => {
                log::error!("{PERF_VALS_ENV}: bad format {text:?}: {err}");
                self
            }
        }
    }

    /// [`with_override`](Self::with_override) reading [`PERF_VALS_ENV`].
    pub fn with_env_override(self, compute_units: u32) -> Self {
        let value = std::env::var(PERF_VALS_ENV).ok();
        self.with_override(value.as_deref(), compute_units)
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        TuningConfig::first()
    }
}

impl PartialEq for TuningConfig {
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
    }
}

impl Eq for TuningConfig {}

impl fmt::Display for TuningConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.groups, self.interleave)
    }
}

impl FromStr for TuningConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse = |field: &str| {
            field
                .trim()
                .parse::<u32>()
                .map_err(|e| Error::InvalidTuning(format!("{field:?}: {e}")))
        };
        let mut parts = s.split(',');
        let groups = parse(parts.next().unwrap_or_default())?;
        let interleave = match parts.next() {
            Some(field) => parse(field)?,
            None => 1,
        };
        if parts.next().is_some() {
            return Err(Error::InvalidTuning(format!("too many fields in {s:?}")));
        }
        let config = TuningConfig { groups, interleave };
        if !config.in_search_space() {
            return Err(Error::InvalidTuning(format!("{config} out of range")));
        }
        Ok(config)
    }
}
