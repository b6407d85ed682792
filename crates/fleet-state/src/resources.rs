//! Per-instance resource requests with numeric comparison semantics.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_CPUS: f64 = 0.1;
pub const DEFAULT_MEMORY: f64 = 100.0;
pub const DEFAULT_PORTS: i32 = 1;

/// Tolerance for cpu and memory comparisons.
const EPSILON: f64 = 0.001;

/// Resource name to value, e.g. `cpus = "0.5"`. Values are strings on the
/// wire but compare numerically: `"0.1"` equals `"0.100"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(BTreeMap<String, String>);

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// CPU share, falling back to 0.1 when absent or unparsable.
    pub fn cpus(&self) -> f64 {
        self.parsed("cpus", DEFAULT_CPUS)
    }

    /// Memory in MB, falling back to 100 when absent or unparsable.
    pub fn memory(&self) -> f64 {
        self.parsed("memory", DEFAULT_MEMORY)
    }

    /// Number of ports, falling back to 1 when absent or unparsable.
    pub fn ports(&self) -> i32 {
        self.parsed("ports", DEFAULT_PORTS)
    }

    fn parsed<T>(&self, name: &str, default: T) -> T
    where
        T: std::str::FromStr + Copy + fmt::Display,
    {
        match self.0.get(name) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(resource = name, value = %raw, %default, "unparsable resource value, using default");
                default
            }),
        }
    }
}

impl PartialEq for Resources {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            debug!("resource key counts differ");
            return false;
        }
        self.ports() == other.ports()
            && (self.cpus() - other.cpus()).abs() <= EPSILON
            && (self.memory() - other.memory()).abs() <= EPSILON
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpus={} memory={} ports={}",
            self.cpus(),
            self.memory(),
            self.ports()
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Resources {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}
