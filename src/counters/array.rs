//! Host-side owner of a device counter buffer.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::atomic::Ordering;

use atomic_traits::Atomic;

use crate::counters::{CounterCell, CounterRef};
use crate::device::DevicePtr;
use crate::error::{DeviceError, Result};
use crate::queue::{Queue, Range};

/// A fixed-size array of counters resident in device memory.
///
/// The array borrows the [`Queue`] it submits to; the queue must outlive it.
/// Construction allocates the device buffer but does not initialize it, so
/// [`pre_kernel_zero`](Self::pre_kernel_zero) is normally the first call.
/// Kernels increment the counters through a [`CounterRef`] obtained from
/// [`handle`](Self::handle).
///
/// The buffer is freed by [`release`](Self::release), which the host calls
/// once all work touching the buffer has been waited on. Dropping an array
/// that was never released frees the buffer as well.
///
/// # Examples
///
/// ```rust
/// use contatori_device::counters::DeviceCounterArray;
/// use contatori_device::device::Platform;
/// use contatori_device::queue::{Queue, Range};
///
/// let device = Platform::default().select(&Default::default()).unwrap();
/// let queue = Queue::new(&device);
///
/// let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
/// counter.pre_kernel_zero().unwrap();
///
/// let cells = counter.handle().unwrap();
/// queue
///     .parallel_for(Range::new(1024), move |item| {
///         cells.get_add_output(item, item.id() % 4);
///     })
///     .wait_and_throw()
///     .unwrap();
///
/// assert_eq!(counter.get_counts().unwrap(), vec![256; 4]);
///
/// counter.release().unwrap();
/// counter.release().unwrap(); // no-op
/// ```
///
/// The array cannot be copied, so it cannot be released twice:
///
/// ```rust,compile_fail
/// # use contatori_device::counters::DeviceCounterArray;
/// # use contatori_device::device::Platform;
/// # use contatori_device::queue::Queue;
/// # let device = Platform::default().select(&Default::default()).unwrap();
/// # let queue = Queue::new(&device);
/// let counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
/// let copy = counter.clone();
/// ```
///
/// Nor can it be released while a handle is still in use:
///
/// ```rust,compile_fail
/// # use contatori_device::counters::DeviceCounterArray;
/// # use contatori_device::device::Platform;
/// # use contatori_device::queue::{Queue, Range};
/// # let device = Platform::default().select(&Default::default()).unwrap();
/// # let queue = Queue::new(&device);
/// let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
/// let cells = counter.handle().unwrap();
/// counter.release().unwrap();
/// queue.parallel_for(Range::new(4), move |item| {
///     cells.get_add_output(item, item.id());
/// }).wait();
/// ```
pub struct DeviceCounterArray<'q, T: CounterCell = usize> {
    queue: &'q Queue,
    name: &'static str,
    len: usize,
    /// `None` once released.
    buffer: Option<DevicePtr>,
    _cell: PhantomData<T>,
}

impl<'q, T: CounterCell> DeviceCounterArray<'q, T> {
    /// Allocates `len` counters on the queue's device.
    ///
    /// The contents of the new buffer are unspecified. `len` may be zero.
    ///
    /// # Errors
    ///
    /// [`DeviceError::AllocationFailure`] when the device cannot hold
    /// `len` cells.
    pub fn new(queue: &'q Queue, len: usize) -> Result<Self> {
        let device = queue.device();
        let bytes = len
            .checked_mul(size_of::<T>())
            .ok_or_else(|| DeviceError::AllocationFailure {
                requested: usize::MAX,
                available: device.capacity().saturating_sub(device.used_bytes()),
                capacity: device.capacity(),
            })?;

        let ptr = device.allocate(bytes)?;
        log::debug!("allocated {len} counters ({bytes} bytes) on {device}");

        Ok(DeviceCounterArray {
            queue,
            name: "",
            len,
            buffer: Some(ptr),
            _cell: PhantomData,
        })
    }

    /// Sets the name of this array, returning `self` for method chaining.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Returns the name of this array.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of counters.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the array holds no counters.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.buffer.is_none()
    }

    /// Returns the queue this array submits to.
    pub fn queue(&self) -> &'q Queue {
        self.queue
    }

    /// Returns a copyable device-side handle to the counters.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Released`] after [`release`](Self::release).
    pub fn handle(&self) -> Result<CounterRef<'_, T>> {
        let ptr = self.buffer.ok_or(DeviceError::Released)?;
        Ok(CounterRef::new(ptr, self.len))
    }

    /// Sets every counter to zero with one work item per counter, and
    /// blocks until the dispatch completes.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Released`] after release, or
    /// [`DeviceError::ExecutionFault`] if the dispatch faulted.
    pub fn pre_kernel_zero(&self) -> Result<()> {
        let cells = self.handle()?;
        self.queue
            .parallel_for(Range::new(self.len), move |item| {
                cells.store(item, item.id(), T::zero());
            })
            .wait_and_throw()
    }

    /// Copies the counters into host memory, in device order.
    ///
    /// The copy reflects every dispatch that completed before the call.
    ///
    /// # Errors
    ///
    /// [`DeviceError::Released`] after release, or
    /// [`DeviceError::ExecutionFault`] if the copy faulted.
    pub fn get_counts(&self) -> Result<Vec<T>> {
        let cells = self.handle()?;
        let staging: Vec<T::Atomic> = (0..self.len)
            .map(|_| <T::Atomic as Atomic>::new(T::zero()))
            .collect();

        self.queue
            .parallel_for(Range::new(self.len), |item| {
                let index = item.id();
                Atomic::store(&staging[index], cells.load(item, index), Ordering::Relaxed);
            })
            .wait_and_throw()?;

        Ok(staging
            .iter()
            .map(|count| Atomic::load(count, Ordering::Relaxed))
            .collect())
    }

    /// Frees the device buffer.
    ///
    /// Calling `release` again, or on an array whose buffer was never
    /// allocated because `len` is zero, does nothing.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidFree`] if the device no longer knows the buffer.
    pub fn release(&mut self) -> Result<()> {
        if let Some(ptr) = self.buffer.take() {
            // SAFETY: the buffer was taken out of `self`, and `&mut self`
            // rules out any `CounterRef` still borrowing it.
            unsafe { self.queue.device().free(ptr)? };
            log::debug!("released {} counters of {:?}", self.len, self.name);
        }
        Ok(())
    }
}

impl<T: CounterCell> Drop for DeviceCounterArray<'_, T> {
    fn drop(&mut self) {
        if self.buffer.is_some() {
            log::warn!(
                "counter array {:?} dropped without release, freeing its buffer",
                self.name
            );
            if let Err(err) = self.release() {
                log::warn!("failed to free counter array {:?}: {err}", self.name);
            }
        }
    }
}

impl<T: CounterCell> Debug for DeviceCounterArray<'_, T> {
    /// Output format: `name{ len:N ptr }` or `name{ len:N released }`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{ len:{}", self.name, self.len)?;
        match self.buffer {
            Some(ptr) => write!(f, " {:#x} }}", ptr.addr()),
            None => write!(f, " released }}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, DeviceConfig};
    use std::sync::atomic::AtomicUsize;

    fn queue() -> Queue {
        Queue::new(&Device::new(
            DeviceConfig::accelerator().with_compute_units(4),
        ))
    }

    fn histogram(queue: &Queue, counter: &DeviceCounterArray<'_, usize>, items: usize) {
        let buckets = counter.len();
        let cells = counter.handle().unwrap();
        queue
            .parallel_for(Range::new(items), move |item| {
                cells.get_add_output(item, item.id() % buckets);
            })
            .wait_and_throw()
            .unwrap();
    }

    #[test]
    fn test_four_buckets_1024_items() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
        counter.pre_kernel_zero().unwrap();
        histogram(&queue, &counter, 1024);
        assert_eq!(counter.get_counts().unwrap(), vec![256, 256, 256, 256]);
        counter.release().unwrap();
    }

    #[test]
    fn test_uneven_histogram() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 5).unwrap();
        counter.pre_kernel_zero().unwrap();
        histogram(&queue, &counter, 1003);
        let expected: Vec<usize> = (0..5).map(|i: usize| (1003 - i).div_ceil(5)).collect();
        assert_eq!(expected, vec![201, 201, 201, 200, 200]);
        assert_eq!(counter.get_counts().unwrap(), expected);
        counter.release().unwrap();
    }

    #[test]
    fn test_prior_values_are_unique() {
        const ITEMS: usize = 1000;
        const BUCKETS: usize = 3;

        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, BUCKETS).unwrap();
        counter.pre_kernel_zero().unwrap();

        let positions: Vec<AtomicUsize> = (0..ITEMS).map(|_| AtomicUsize::new(0)).collect();
        let cells = counter.handle().unwrap();
        queue
            .parallel_for(Range::new(ITEMS), |item| {
                let position = cells.get_add_output(item, item.id() % BUCKETS);
                positions[item.id()].store(position, Ordering::Relaxed);
            })
            .wait_and_throw()
            .unwrap();

        for bucket in 0..BUCKETS {
            let mut seen: Vec<usize> = positions
                .iter()
                .enumerate()
                .filter(|(id, _)| id % BUCKETS == bucket)
                .map(|(_, p)| p.load(Ordering::Relaxed))
                .collect();
            seen.sort_unstable();
            let expected: Vec<usize> = (0..seen.len()).collect();
            assert_eq!(seen, expected, "bucket {bucket}");
        }
        counter.release().unwrap();
    }

    #[test]
    fn test_zero_fill_is_idempotent() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<u64>::new(&queue, 16).unwrap();
        counter.pre_kernel_zero().unwrap();
        counter.pre_kernel_zero().unwrap();
        assert_eq!(counter.get_counts().unwrap(), vec![0; 16]);
        counter.release().unwrap();
    }

    #[test]
    fn test_zero_fill_resets_counts() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
        counter.pre_kernel_zero().unwrap();
        histogram(&queue, &counter, 40);
        assert_eq!(counter.get_counts().unwrap(), vec![10; 4]);
        counter.pre_kernel_zero().unwrap();
        assert_eq!(counter.get_counts().unwrap(), vec![0; 4]);
        counter.release().unwrap();
    }

    #[test]
    fn test_readback_before_zero_fill() {
        let device = Device::new(DeviceConfig::accelerator().with_fill_byte(0xCD));
        let queue = Queue::new(&device);
        let mut counter = DeviceCounterArray::<u32>::new(&queue, 3).unwrap();
        // Unspecified contents, but reading them is fine.
        assert_eq!(counter.get_counts().unwrap(), vec![0xCDCD_CDCD; 3]);
        counter.pre_kernel_zero().unwrap();
        assert_eq!(counter.get_counts().unwrap(), vec![0; 3]);
        counter.release().unwrap();
    }

    #[test]
    fn test_release_twice() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
        assert_eq!(queue.device().live_allocations(), 1);
        counter.release().unwrap();
        assert!(counter.is_released());
        assert_eq!(queue.device().live_allocations(), 0);
        counter.release().unwrap();
        assert_eq!(queue.device().used_bytes(), 0);
    }

    #[test]
    fn test_use_after_release() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
        counter.release().unwrap();
        assert_eq!(counter.pre_kernel_zero(), Err(DeviceError::Released));
        assert_eq!(counter.get_counts(), Err(DeviceError::Released));
        assert!(matches!(counter.handle(), Err(DeviceError::Released)));
    }

    #[test]
    fn test_zero_len() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 0).unwrap();
        assert!(counter.is_empty());
        assert_eq!(queue.device().used_bytes(), 0);
        counter.pre_kernel_zero().unwrap();
        assert_eq!(counter.get_counts().unwrap(), Vec::<usize>::new());
        counter.release().unwrap();
        counter.release().unwrap();
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let device = Device::new(DeviceConfig::accelerator().with_memory_capacity(64));
        let queue = Queue::new(&device);
        let err = DeviceCounterArray::<u64>::new(&queue, 100).unwrap_err();
        assert_eq!(
            err,
            DeviceError::AllocationFailure {
                requested: 800,
                available: 64,
                capacity: 64,
            }
        );
    }

    #[test]
    fn test_allocation_size_overflow() {
        let queue = queue();
        let err = DeviceCounterArray::<u64>::new(&queue, usize::MAX).unwrap_err();
        assert!(matches!(
            err,
            DeviceError::AllocationFailure {
                requested: usize::MAX,
                ..
            }
        ));
    }

    #[test]
    fn test_out_of_range_index_faults() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap();
        counter.pre_kernel_zero().unwrap();
        let cells = counter.handle().unwrap();
        let result = queue
            .parallel_for(Range::new(8), move |item| {
                cells.get_add_output(item, item.id());
            })
            .wait_and_throw();
        match result {
            Err(DeviceError::ExecutionFault(message)) => {
                assert!(message.contains("out of range for 4 counters"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        counter.release().unwrap();
    }

    #[test]
    fn test_unchecked_increment() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<u32>::new(&queue, 2).unwrap();
        counter.pre_kernel_zero().unwrap();
        let cells = counter.handle().unwrap();
        queue
            .parallel_for(Range::new(100), move |item| {
                // SAFETY: `item.id() % 2` is below the length of 2.
                unsafe { cells.get_add_output_unchecked(item, item.id() % 2) };
            })
            .wait_and_throw()
            .unwrap();
        assert_eq!(counter.get_counts().unwrap(), vec![50, 50]);
        counter.release().unwrap();
    }

    #[test]
    fn test_drop_frees_buffer() {
        let queue = queue();
        {
            let _counter = DeviceCounterArray::<usize>::new(&queue, 8).unwrap();
            assert_eq!(queue.device().live_allocations(), 1);
        }
        assert_eq!(queue.device().live_allocations(), 0);
        assert_eq!(queue.device().used_bytes(), 0);
    }

    #[test]
    fn test_handle_is_copy() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 2).unwrap();
        counter.pre_kernel_zero().unwrap();
        let a = counter.handle().unwrap();
        let b = a;
        queue
            .parallel_for(Range::new(2), move |item| {
                a.get_add_output(item, 0);
                b.get_add_output(item, 1);
            })
            .wait_and_throw()
            .unwrap();
        assert_eq!(counter.get_counts().unwrap(), vec![2, 2]);
        counter.release().unwrap();
    }

    #[test]
    fn test_name_and_debug() {
        let queue = queue();
        let mut counter = DeviceCounterArray::<usize>::new(&queue, 4).unwrap().with_name("buckets");
        assert_eq!(counter.name(), "buckets");
        let debug = format!("{counter:?}");
        assert!(debug.starts_with("buckets{ len:4 0x"));
        counter.release().unwrap();
        assert_eq!(format!("{counter:?}"), "buckets{ len:4 released }");
    }
}
