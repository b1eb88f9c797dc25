//! Observers for rendering counter snapshots.
//!
//! Observers never touch the device: they render [`CountsSnapshot`]s that
//! were read back beforehand, so they can run after the arrays have been
//! released.
//!
//! - [`table`] - Pretty-print snapshots as tables using the `tabled` crate
//! - [`json`] - Serialize snapshots to JSON
//!
//! # Feature Flags
//!
//! - `table` - Enables the [`table`] module
//! - `json` - Enables the [`json`] module
//! - `full` - Enables all observer modules
//!
//! # Example
//!
//! ```rust,ignore
//! use contatori_device::observers::Result;
//! use contatori_device::observers::table::TableObserver;
//! use contatori_device::snapshot::CountsSnapshot;
//!
//! fn report(counter: &DeviceCounterArray<'_>) -> Result<()> {
//!     let snapshot = CountsSnapshot::from_array(counter)?;
//!     println!("{}", TableObserver::new().render([&snapshot]));
//!     Ok(())
//! }
//! ```
//!
//! [`CountsSnapshot`]: crate::snapshot::CountsSnapshot

mod error;

pub use error::{ObserverError, Result};

#[cfg(feature = "table")]
pub mod table;

#[cfg(feature = "json")]
pub mod json;
