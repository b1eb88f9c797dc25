//! # Contatori Device - Atomic Counter Arrays in Device Memory
//!
//! A Rust library providing fixed-size arrays of unsigned counters that live
//! in accelerator (device) memory and are incremented concurrently by the
//! work items of a bulk parallel dispatch.
//!
//! ## The Problem
//!
//! Kernels receive their arguments by value: whatever they capture is copied
//! bit for bit into every work item. A counter array therefore has to be a
//! plain, copyable value (a device address and a length), yet its device
//! buffer must be allocated once and freed exactly once, and never while a
//! kernel can still reach it. When every copy carries the same address and
//! the same `free` method, "free exactly once" is only a convention.
//!
//! ## The Solution: Split Ownership
//!
//! This library splits the array into two types:
//!
//! 1. **Host owner**: [`DeviceCounterArray`](counters::DeviceCounterArray)
//!    allocates, zero-fills, reads back and releases. It is neither `Copy`
//!    nor `Clone`, and it frees a forgotten buffer on drop.
//!
//! 2. **Device handle**: [`CounterRef`](counters::CounterRef) is `Copy`
//!    and is what kernels capture. It borrows the owner, so the owner cannot
//!    be released while a handle is alive, and it exposes nothing but the
//!    atomic increment.
//!
//! The increment, `get_add_output`, takes a borrow of the running work
//! item's [`Item`](queue::Item). Only the queue creates items and a kernel
//! cannot keep one past its call, so the increment cannot be reached from
//! host code. It is a `fetch_add(1, Relaxed)` returning the value before
//! the increment: a unique sequence number per index across all concurrent
//! callers.
//!
//! ## Quick Start
//!
//! ```rust
//! use contatori_device::counters::DeviceCounterArray;
//! use contatori_device::device::{DeviceSelector, Platform};
//! use contatori_device::queue::{Queue, Range};
//!
//! # fn main() -> contatori_device::Result<()> {
//! let device = Platform::default().select(&DeviceSelector::Default)?;
//! let queue = Queue::new(&device);
//!
//! let mut counter = DeviceCounterArray::<usize>::new(&queue, 4)?;
//! counter.pre_kernel_zero()?;
//!
//! let cells = counter.handle()?;
//! queue
//!     .parallel_for(Range::new(1024), move |item| {
//!         let _position = cells.get_add_output(item, item.id() % 4);
//!     })
//!     .wait_and_throw()?;
//!
//! assert_eq!(counter.get_counts()?, vec![256, 256, 256, 256]);
//! counter.release()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## The Device
//!
//! The [`device`] module provides a simulated accelerator: a [`Platform`]
//! of devices with bounded memory arenas, and the [`queue`] module an
//! in-order [`Queue`] whose `parallel_for` spreads work items over the
//! device's compute units. A panicking work item is a device fault,
//! reported as [`DeviceError::ExecutionFault`] when the dispatch is waited
//! on.
//!
//! [`Platform`]: device::Platform
//! [`Queue`]: queue::Queue
//!
//! ## Observers
//!
//! Optional observer modules render [`snapshot::CountsSnapshot`]s:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Pretty-print snapshots as ASCII tables |
//! | `json` | [`observers::json`] | Serialize snapshots to JSON |
//! | `full` | All observers | Enables all observer modules |
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: allocations and releases at
//! `debug`, dispatches at `trace`, leaked buffers and discarded faults at
//! `warn`. Install any `log` implementation to see them.

pub mod counters;
pub mod device;
pub mod error;
pub mod observers;
pub mod queue;
pub mod snapshot;

pub use error::{DeviceError, Result};
