//! Host-side snapshots of counter arrays.
//!
//! A [`CountsSnapshot`] is a named copy of a readback, detached from the
//! device: it stays valid after the array has been released, and with the
//! `serde` feature it can be serialized with any serde format.
//!
//! # Examples
//!
//! ```rust
//! use contatori_device::counters::DeviceCounterArray;
//! use contatori_device::device::Platform;
//! use contatori_device::queue::Queue;
//! use contatori_device::snapshot::CountsSnapshot;
//!
//! let device = Platform::default().select(&Default::default()).unwrap();
//! let queue = Queue::new(&device);
//! let mut counter = DeviceCounterArray::<u32>::new(&queue, 3)
//!     .unwrap()
//!     .with_name("buckets");
//! counter.pre_kernel_zero().unwrap();
//!
//! let snapshot = CountsSnapshot::from_array(&counter).unwrap();
//! counter.release().unwrap();
//!
//! assert_eq!(snapshot.name, "buckets");
//! assert_eq!(snapshot.counts, vec![0, 0, 0]);
//! assert_eq!(snapshot.total(), 0);
//! ```

use crate::counters::{CounterCell, DeviceCounterArray};
use crate::error::Result;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Name used for arrays created without [`DeviceCounterArray::with_name`].
pub const UNNAMED: &str = "(unnamed)";

/// A named copy of the counts of one array.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CountsSnapshot {
    /// The name of the array.
    pub name: String,
    /// The counts, in device order.
    pub counts: Vec<u64>,
}

impl CountsSnapshot {
    /// Creates a snapshot from already collected counts.
    pub fn new(name: impl Into<String>, counts: Vec<u64>) -> Self {
        Self {
            name: name.into(),
            counts,
        }
    }

    /// Reads back `array` and captures its counts.
    ///
    /// # Errors
    ///
    /// Any error of [`DeviceCounterArray::get_counts`].
    pub fn from_array<T: CounterCell>(array: &DeviceCounterArray<'_, T>) -> Result<Self> {
        let counts = array
            .get_counts()?
            .into_iter()
            .map(|count| count.to_u64().unwrap_or(u64::MAX))
            .collect();

        let name = if array.name().is_empty() {
            UNNAMED
        } else {
            array.name()
        };

        Ok(Self::new(name, counts))
    }

    /// Number of counters.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` if the snapshot holds no counters.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Returns the count at `index`.
    pub fn get(&self, index: usize) -> Option<u64> {
        self.counts.get(index).copied()
    }

    /// Sum of all counts, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0u64, |total, &count| total.saturating_add(count))
    }
}
