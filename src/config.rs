//! Model configuration.
//!
//! Defaults can be overridden from environment variables:
//! `DYNOMODEL_POLL_INTERVAL_MS`, `DYNOMODEL_READ_CAPACITY`,
//! `DYNOMODEL_WRITE_CAPACITY` and `DYNOMODEL_CONSISTENT_READ`.

use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::table_operations::DEFAULT_POLL_INTERVAL;
use crate::transport::Throughput;

/// Options shared by the operations of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Delay between describe calls while waiting for a table.
    pub poll_interval: Duration,
    /// Capacity used when the table has to be created.
    pub throughput: Throughput,
    /// Default read consistency for get and query.
    pub consistent_read: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            throughput: Throughput::default(),
            consistent_read: false,
        }
    }
}

impl ModelOptions {
    /// Load options from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load options through `lookup`; unparsable values keep their default.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();

        if let Some(ms) = parse_var::<u64, _>(&lookup, "DYNOMODEL_POLL_INTERVAL_MS") {
            options.poll_interval = Duration::from_millis(ms);
        }
        if let Some(v) = parse_var(&lookup, "DYNOMODEL_READ_CAPACITY") {
            options.throughput.read_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "DYNOMODEL_WRITE_CAPACITY") {
            options.throughput.write_capacity = v;
        }
        if let Some(v) = lookup("DYNOMODEL_CONSISTENT_READ") {
            options.consistent_read = v == "1" || v.eq_ignore_ascii_case("true");
        }

        options
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_throughput(mut self, throughput: Throughput) -> Self {
        self.throughput = throughput;
        self
    }

    pub fn with_consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable configuration value");
            None
        }
    }
}
