//! Device-resident counter arrays.
//!
//! A counter array is split into two types with disjoint capabilities:
//!
//! - [`DeviceCounterArray`] lives on the host. It allocates the device
//!   buffer, zero-fills it, reads it back and releases it. It is neither
//!   `Copy` nor `Clone`, so exactly one value is ever responsible for the
//!   allocation.
//! - [`CounterRef`] is what kernels capture. It is `Copy` (a device address
//!   and a length), it borrows the owning array, and it can only increment:
//!   its methods take the [`Item`](crate::queue::Item) token that exists
//!   only inside a running kernel.
//!
//! ```text
//!        host                                  device
//!   ┌────────────────────┐   handle()    ┌──────────────────┐
//!   │ DeviceCounterArray │ ────────────► │ CounterRef (Copy)│ ──► get_add_output
//!   │  new / zero /      │               └──────────────────┘
//!   │  get_counts /      │                        │
//!   │  release           │ ─── owns ──► [ c0 | c1 | c2 | ... ]  device memory
//!   └────────────────────┘
//! ```
//!
//! Because every `CounterRef` borrows the array and `release` takes
//! `&mut self`, the buffer cannot be released while a handle is still in
//! use, and a handle can never free it.
//!
//! # Cell Types
//!
//! The cell type is any [`CounterCell`]: `u32`, `u64` or `usize` (the
//! default).

mod array;
mod handle;

pub use array::DeviceCounterArray;
pub use handle::CounterRef;

use atomic_traits::{fetch, Atomic};
use bytemuck::Pod;
use num_traits::{PrimInt, Unsigned};
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize};

mod sealed {
    pub trait Sealed {}
}

/// Unsigned integer type that can be stored in a device counter cell.
///
/// Each cell type is paired with the standard atomic of the same size and
/// layout, which is what device code operates on.
pub trait CounterCell:
    Pod + PrimInt + Unsigned + Debug + Display + Send + Sync + sealed::Sealed
{
    /// The atomic type with the same in-memory representation.
    type Atomic: Atomic<Type = Self> + fetch::Add<Type = Self> + Send + Sync + 'static;
}

macro_rules! impl_counter_cell {
    ($($cell:ty => $atomic:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $cell {}

            impl CounterCell for $cell {
                type Atomic = $atomic;
            }
        )*
    };
}

impl_counter_cell!(u32 => AtomicU32, u64 => AtomicU64, usize => AtomicUsize);
