//! In-order execution queue with bulk `parallel_for` dispatch.
//!
//! Every submission runs to completion on the device's compute units before
//! [`Queue::parallel_for`] returns, so submissions complete in the order they
//! were made. Work items inside a single dispatch are unordered: the range is
//! split into contiguous chunks, one per compute unit, and the chunks run
//! concurrently on scoped worker threads.
//!
//! A work item that panics is a device fault. The fault is not raised at
//! submission: it is stored in the returned [`Event`] and surfaces as
//! [`DeviceError::ExecutionFault`] from [`Event::wait_and_throw`]. An event
//! dropped without being waited on parks its fault on the queue, where
//! [`Queue::wait_and_throw`] picks it up.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use contatori_device::device::Platform;
//! use contatori_device::queue::{Queue, Range};
//!
//! let device = Platform::default().select(&Default::default()).unwrap();
//! let queue = Queue::new(&device);
//!
//! let sum = AtomicUsize::new(0);
//! queue
//!     .parallel_for(Range::new(100), |item| {
//!         sum.fetch_add(item.id(), Ordering::Relaxed);
//!     })
//!     .wait_and_throw()
//!     .unwrap();
//!
//! assert_eq!(sum.load(Ordering::Relaxed), 4950);
//! ```

use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_utils::thread;

use crate::device::Device;
use crate::error::{DeviceError, Result};

/// One-dimensional dispatch range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range(usize);

impl Range {
    /// A range of `len` work items, with ids `0..len`.
    pub const fn new(len: usize) -> Self {
        Range(len)
    }

    /// Number of work items.
    pub const fn len(&self) -> usize {
        self.0
    }

    /// Returns `true` if the range has no work items.
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl From<usize> for Range {
    fn from(len: usize) -> Self {
        Range(len)
    }
}

/// A work item of a bulk dispatch.
///
/// Items are only created by the queue while a kernel is executing, and the
/// kernel only ever sees a borrow of one. `Item` is neither `Copy` nor
/// `Clone`, so the borrow cannot outlive the call, which makes `&Item` a
/// token for device-side code: an API that takes one can only be called
/// from inside a kernel.
///
/// ```compile_fail
/// use std::sync::Mutex;
/// use contatori_device::device::Platform;
/// use contatori_device::queue::{Queue, Range};
///
/// let device = Platform::default().select(&Default::default()).unwrap();
/// let queue = Queue::new(&device);
/// let slot = Mutex::new(None);
/// queue
///     .parallel_for(Range::new(1), |item| {
///         *slot.lock().unwrap() = Some(item); // error: borrowed data escapes
///     })
///     .wait();
/// ```
///
/// ```compile_fail
/// use std::sync::Mutex;
/// use contatori_device::device::Platform;
/// use contatori_device::queue::{Queue, Range};
///
/// let device = Platform::default().select(&Default::default()).unwrap();
/// let queue = Queue::new(&device);
/// let slot = Mutex::new(None);
/// queue
///     .parallel_for(Range::new(1), |item| {
///         *slot.lock().unwrap() = Some(*item); // error: cannot move out of `*item`
///     })
///     .wait();
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct Item {
    id: usize,
    range: usize,
}

impl Item {
    #[inline]
    fn new(id: usize, range: usize) -> Self {
        Item { id, range }
    }

    /// Index of this work item, in `0..range()`.
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    /// Total number of work items in the dispatch.
    #[inline]
    pub fn range(&self) -> usize {
        self.range
    }
}

/// An execution queue bound to one device.
pub struct Queue {
    device: Device,
    next_event: AtomicU64,
    parked: Mutex<Vec<String>>,
}

impl Queue {
    /// Creates a queue submitting to `device`.
    pub fn new(device: &Device) -> Self {
        Queue {
            device: device.clone(),
            next_event: AtomicU64::new(0),
            parked: Mutex::new(Vec::new()),
        }
    }

    /// Returns the device this queue submits to.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn parked(&self) -> MutexGuard<'_, Vec<String>> {
        self.parked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `kernel` once for every work item of `range`.
    ///
    /// Each call receives a borrow of its [`Item`]. The kernel may run
    /// concurrently on several compute units, so it must be `Sync`; it can
    /// borrow from the caller since all work has finished when this returns.
    pub fn parallel_for<K>(&self, range: Range, kernel: K) -> Event<'_>
    where
        K: Fn(&Item) + Sync,
    {
        let id = self.next_event.fetch_add(1, Ordering::Relaxed);
        log::trace!(
            "event {id}: parallel_for over {} items on {}",
            range.len(),
            self.device
        );

        let fault = dispatch(self.device.compute_units(), range.len(), &kernel).err();
        if let Some(fault) = &fault {
            log::trace!("event {id}: faulted: {fault}");
        }

        Event {
            queue: self,
            id,
            fault,
        }
    }

    /// Blocks until all submitted work has completed and raises any fault
    /// parked by events that were dropped without being waited on.
    ///
    /// # Errors
    ///
    /// [`DeviceError::ExecutionFault`] listing the parked faults.
    pub fn wait_and_throw(&self) -> Result<()> {
        let parked = std::mem::take(&mut *self.parked());
        if parked.is_empty() {
            Ok(())
        } else {
            Err(DeviceError::ExecutionFault(parked.join("; ")))
        }
    }
}

impl Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("device", &self.device.name())
            .field("submitted", &self.next_event.load(Ordering::Relaxed))
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    };
    format!("work item panicked: {message}")
}

/// Splits `0..len` into one chunk per compute unit and runs the chunks on
/// scoped threads. Returns the faults of every chunk that panicked.
fn dispatch<K>(units: usize, len: usize, kernel: &K) -> std::result::Result<(), String>
where
    K: Fn(&Item) + Sync,
{
    if len == 0 {
        return Ok(());
    }

    let workers = units.clamp(1, len);
    let chunk = len.div_ceil(workers);

    let faults = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let start = worker * chunk;
                let end = (start + chunk).min(len);
                scope.spawn(move |_| {
                    for id in start..end {
                        kernel(&Item::new(id, len));
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .filter_map(|handle| handle.join().err())
            .map(|payload| panic_message(&*payload))
            .collect::<Vec<_>>()
    })
    .map_err(|payload| panic_message(&*payload))?;

    if faults.is_empty() {
        Ok(())
    } else {
        Err(faults.join("; "))
    }
}

/// Completion handle of a submission.
///
/// The work has already run when the event is returned; waiting only
/// reports whether it faulted.
#[must_use = "an event must be waited on to observe device faults"]
pub struct Event<'q> {
    queue: &'q Queue,
    id: u64,
    fault: Option<String>,
}

impl Event<'_> {
    /// Sequence number of the submission on its queue.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns `true` if the submission faulted.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Waits for completion, discarding any fault.
    pub fn wait(mut self) {
        if let Some(fault) = self.fault.take() {
            log::warn!("event {}: discarding device fault: {fault}", self.id);
        }
    }

    /// Waits for completion and raises the fault of the submission, if any.
    ///
    /// # Errors
    ///
    /// [`DeviceError::ExecutionFault`] if a work item panicked.
    pub fn wait_and_throw(mut self) -> Result<()> {
        match self.fault.take() {
            Some(fault) => Err(DeviceError::ExecutionFault(fault)),
            None => Ok(()),
        }
    }
}

impl Drop for Event<'_> {
    fn drop(&mut self) {
        if let Some(fault) = self.fault.take() {
            self.queue.parked().push(format!("event {}: {fault}", self.id));
        }
    }
}

impl Debug for Event<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("fault", &self.fault)
            .finish()
    }
}
