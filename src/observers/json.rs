//! JSON observer for serializing counter snapshots.
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! contatori-device = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Output Format
//!
//! By default the output is an array of snapshots:
//!
//! ```json
//! [{"name":"buckets","counts":[256,256,256,256]}]
//! ```
//!
//! With [`JsonObserver::wrap_in_report`] the array is wrapped in a
//! [`CountsReport`], optionally carrying a timestamp:
//!
//! ```json
//! {"timestamp_ms":1700000000000,"arrays":[{"name":"buckets","counts":[256]}]}
//! ```

use crate::observers::Result;
use crate::snapshot::CountsSnapshot;
use serde::{Deserialize, Serialize};

/// A collection of snapshots with an optional timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CountsReport {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// The snapshots.
    pub arrays: Vec<CountsSnapshot>,
}

impl CountsReport {
    /// Creates a report without a timestamp.
    pub fn new(arrays: Vec<CountsSnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            arrays,
        }
    }

    /// Creates a report with a timestamp.
    pub fn with_timestamp(arrays: Vec<CountsSnapshot>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            arrays,
        }
    }

    /// Finds a snapshot by name.
    pub fn get(&self, name: &str) -> Option<&CountsSnapshot> {
        self.arrays.iter().find(|a| a.name == name)
    }
}

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to include a timestamp (only with `wrap_in_report`).
    pub include_timestamp: bool,
    /// Whether to wrap the snapshots in a [`CountsReport`].
    pub wrap_in_report: bool,
}

/// An observer that serializes snapshots to JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables the timestamp of the report.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Enables or disables wrapping in a [`CountsReport`].
    pub fn wrap_in_report(mut self, enabled: bool) -> Self {
        self.config.wrap_in_report = enabled;
        self
    }

    fn serialize<S: Serialize>(&self, value: &S) -> Result<String> {
        let json = if self.config.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }

    /// Serializes the snapshots to a JSON string.
    pub fn to_json<'a>(
        &self,
        snapshots: impl IntoIterator<Item = &'a CountsSnapshot>,
    ) -> Result<String> {
        let arrays: Vec<CountsSnapshot> = snapshots.into_iter().cloned().collect();

        if self.config.wrap_in_report {
            let report = if self.config.include_timestamp {
                CountsReport::with_timestamp(arrays, current_timestamp_ms())
            } else {
                CountsReport::new(arrays)
            };
            self.serialize(&report)
        } else {
            self.serialize(&arrays)
        }
    }
}

fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_json_empty() {
        let json = JsonObserver::new().to_json([]).unwrap();
        assert_eq!(json, "[]");
    }

    #[test]
    fn test_to_json_array() {
        let snapshot = CountsSnapshot::new("buckets", vec![256, 256]);
        let json = JsonObserver::new().to_json([&snapshot]).unwrap();
        assert_eq!(json, r#"[{"name":"buckets","counts":[256,256]}]"#);
    }

    #[test]
    fn test_to_json_report() {
        let snapshot = CountsSnapshot::new("buckets", vec![1]);
        let json = JsonObserver::new()
            .wrap_in_report(true)
            .to_json([&snapshot])
            .unwrap();
        assert_eq!(json, r#"{"arrays":[{"name":"buckets","counts":[1]}]}"#);

        let report: CountsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report.get("buckets"), Some(&snapshot));
        assert_eq!(report.get("missing"), None);
    }

    #[test]
    fn test_to_json_timestamp() {
        let snapshot = CountsSnapshot::new("buckets", vec![1]);
        let json = JsonObserver::new()
            .wrap_in_report(true)
            .include_timestamp(true)
            .to_json([&snapshot])
            .unwrap();
        let report: CountsReport = serde_json::from_str(&json).unwrap();
        assert!(report.timestamp_ms.is_some());
    }

    #[test]
    fn test_to_json_pretty() {
        let snapshot = CountsSnapshot::new("buckets", vec![1]);
        let json = JsonObserver::new().pretty(true).to_json([&snapshot]).unwrap();
        assert!(json.contains('\n'));
        assert!(json.contains("\"name\": \"buckets\""));
    }
}
