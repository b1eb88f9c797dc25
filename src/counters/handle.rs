//! Device-side handle to a counter array.

use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::sync::atomic::Ordering;

use atomic_traits::{fetch, Atomic};

use crate::counters::CounterCell;
use crate::device::DevicePtr;
use crate::queue::Item;

/// A copyable view of a [`DeviceCounterArray`](super::DeviceCounterArray)
/// buffer, meant to be captured by value into kernels.
///
/// `CounterRef` is a device pointer and a length. It borrows the array it
/// came from, so the array cannot be released while any copy is alive, and
/// it has no way to free the buffer itself.
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
/// let mut counter = DeviceCounterArray::<u32>::new(&queue, 2).unwrap();
/// counter.pre_kernel_zero().unwrap();
///
/// let cells = counter.handle().unwrap();
/// queue
///     .parallel_for(Range::new(10), move |item| {
///         cells.get_add_output(item, item.id() % 2);
///     })
///     .wait_and_throw()
///     .unwrap();
///
/// assert_eq!(counter.get_counts().unwrap(), vec![5, 5]);
/// counter.release().unwrap();
/// ```
pub struct CounterRef<'a, T: CounterCell = usize> {
    ptr: DevicePtr,
    len: usize,
    _owner: PhantomData<&'a T>,
}

impl<T: CounterCell> Clone for CounterRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: CounterCell> Copy for CounterRef<'_, T> {}

impl<'a, T: CounterCell> CounterRef<'a, T> {
    pub(crate) fn new(ptr: DevicePtr, len: usize) -> Self {
        CounterRef {
            ptr,
            len,
            _owner: PhantomData,
        }
    }

    /// Number of counters.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are no counters.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// # Safety
    ///
    /// `index` must be less than `self.len`.
    #[inline]
    unsafe fn cell(&self, index: usize) -> &'a T::Atomic {
        debug_assert!(index < self.len);
        // SAFETY: the buffer holds `len` cells and outlives `'a`; atomics
        // share the layout of their integer type.
        unsafe { &*self.ptr.cast::<T::Atomic>().add(index) }
    }

    /// Atomically increments counter `index` and returns its previous value.
    ///
    /// Concurrent callers targeting the same index each receive a distinct
    /// value, so the result is a per-index sequence number. The increment
    /// uses relaxed ordering and implies nothing about other cells.
    ///
    /// # Panics
    ///
    /// If `index` is out of range. Inside a kernel the panic becomes a
    /// device fault reported by the dispatch's wait.
    #[inline]
    pub fn get_add_output(&self, item: &Item, index: usize) -> T {
        assert!(
            index < self.len,
            "counter index {index} out of range for {} counters",
            self.len
        );
        // SAFETY: bounds checked above.
        unsafe { self.get_add_output_unchecked(item, index) }
    }

    /// Same as [`get_add_output`](Self::get_add_output) without the bounds
    /// check.
    ///
    /// # Safety
    ///
    /// `index` must be less than [`len`](Self::len).
    #[inline]
    pub unsafe fn get_add_output_unchecked(&self, _item: &Item, index: usize) -> T {
        // SAFETY: guaranteed by the caller.
        let cell = unsafe { self.cell(index) };
        fetch::Add::fetch_add(cell, T::one(), Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn store(&self, _item: &Item, index: usize, value: T) {
        assert!(index < self.len);
        // SAFETY: bounds checked above.
        Atomic::store(unsafe { self.cell(index) }, value, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn load(&self, _item: &Item, index: usize) -> T {
        assert!(index < self.len);
        // SAFETY: bounds checked above.
        Atomic::load(unsafe { self.cell(index) }, Ordering::Relaxed)
    }
}

impl<T: CounterCell> Debug for CounterRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CounterRef{{ {:#x}[{}] }}", self.ptr.addr(), self.len)
    }
}
