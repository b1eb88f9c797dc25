//! Simulated accelerator: device selection and device memory.
//!
//! A [`Device`] owns a bounded memory arena. Allocations made through it
//! are addressed by a [`DevicePtr`], a plain address that is bitwise
//! copyable and carries no ownership. Only the code that called
//! [`Device::allocate`] may call [`Device::free`], which is `unsafe` for
//! that reason. The arena validates every free against its table of live
//! allocations, so a second free of the same address is reported as
//! [`DeviceError::InvalidFree`] rather than corrupting memory.
//!
//! Work on a device is submitted through a [`Queue`](crate::queue::Queue),
//! which spreads a bulk dispatch over the device's compute units.
//!
//! ```text
//!   Platform ──select(selector)──► Device ──────► Arena
//!                                    │            ├── capacity / used
//!                                    │            └── live: addr → layout
//!                                    ▼
//!                                  Queue ──parallel_for──► compute units
//! ```

use std::alloc::{self, Layout};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytemuck::{Pod, Zeroable};

use crate::error::{DeviceError, Result};

/// Alignment of every device allocation, in bytes.
pub const DEVICE_ALIGN: usize = 256;

/// Default size of the device memory arena (256 MiB).
pub const DEFAULT_MEMORY_CAPACITY: usize = 256 * 1024 * 1024;

/// Byte written into freshly allocated device memory.
///
/// Device allocations are not zeroed; the fill pattern stands in for the
/// unspecified contents a real accelerator would hand back.
pub const DEFAULT_FILL_BYTE: u8 = 0xCD;

/// Raw address of a device allocation.
///
/// `DevicePtr` is `Pod`: it can be copied into kernels and transmitted
/// verbatim. It does not own the memory it points to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct DevicePtr {
    addr: usize,
}

impl DevicePtr {
    /// The null device pointer, returned for zero-byte allocations.
    pub const NULL: DevicePtr = DevicePtr { addr: 0 };

    /// Returns the raw device address.
    #[inline]
    pub fn addr(self) -> usize {
        self.addr
    }

    /// Returns `true` for the null pointer.
    #[inline]
    pub fn is_null(self) -> bool {
        self.addr == 0
    }

    #[inline]
    pub(crate) fn cast<A>(self) -> *const A {
        self.addr as *const A
    }
}

/// Kind of device, used by [`DeviceSelector::Default`] to rank devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Host processor.
    Cpu,
    /// Graphics processor.
    Gpu,
    /// Any other accelerator.
    Accelerator,
}

impl DeviceKind {
    fn score(self) -> u8 {
        match self {
            DeviceKind::Gpu => 3,
            DeviceKind::Accelerator => 2,
            DeviceKind::Cpu => 1,
        }
    }
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Gpu => write!(f, "gpu"),
            DeviceKind::Accelerator => write!(f, "accelerator"),
        }
    }
}

fn default_compute_units() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Configuration of a simulated device.
///
/// # Examples
///
/// ```rust
/// use contatori_device::device::{Device, DeviceConfig, DeviceKind};
///
/// let config = DeviceConfig::accelerator()
///     .with_name("tiny")
///     .with_memory_capacity(4096)
///     .with_compute_units(2);
///
/// let device = Device::new(config);
/// assert_eq!(device.name(), "tiny");
/// assert_eq!(device.kind(), DeviceKind::Accelerator);
/// assert_eq!(device.capacity(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Human readable device name.
    pub name: String,
    /// Kind of device.
    pub kind: DeviceKind,
    /// Size of the memory arena in bytes.
    pub memory_capacity: usize,
    /// Number of worker threads a dispatch is spread over.
    pub compute_units: usize,
    /// Byte written into fresh allocations.
    pub fill_byte: u8,
}

impl DeviceConfig {
    /// A simulated accelerator with [`DEFAULT_MEMORY_CAPACITY`] bytes of
    /// memory and one compute unit per available host core.
    pub fn accelerator() -> Self {
        Self {
            name: "contatori virtual accelerator".to_string(),
            kind: DeviceKind::Accelerator,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            compute_units: default_compute_units(),
            fill_byte: DEFAULT_FILL_BYTE,
        }
    }

    /// The host processor exposed as a device.
    pub fn host() -> Self {
        Self {
            name: "host cpu".to_string(),
            kind: DeviceKind::Cpu,
            ..Self::accelerator()
        }
    }

    /// Sets the device name.
    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Sets the device kind.
    pub fn with_kind(self, kind: DeviceKind) -> Self {
        Self { kind, ..self }
    }

    /// Sets the size of the memory arena in bytes.
    pub fn with_memory_capacity(self, memory_capacity: usize) -> Self {
        Self {
            memory_capacity,
            ..self
        }
    }

    /// Sets the number of compute units (at least one).
    pub fn with_compute_units(self, compute_units: usize) -> Self {
        Self {
            compute_units: compute_units.max(1),
            ..self
        }
    }

    /// Sets the byte written into fresh allocations.
    pub fn with_fill_byte(self, fill_byte: u8) -> Self {
        Self { fill_byte, ..self }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::accelerator()
    }
}

/// Bounded device memory arena.
struct Arena {
    capacity: usize,
    fill_byte: u8,
    used: AtomicUsize,
    live: Mutex<HashMap<usize, Layout>>,
}

impl Arena {
    fn new(capacity: usize, fill_byte: u8) -> Self {
        Self {
            capacity,
            fill_byte,
            used: AtomicUsize::new(0),
            live: Mutex::new(HashMap::new()),
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<usize, Layout>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure(&self, requested: usize) -> DeviceError {
        let used = self.used.load(Ordering::Acquire);
        DeviceError::AllocationFailure {
            requested,
            available: self.capacity.saturating_sub(used),
            capacity: self.capacity,
        }
    }

    fn reserve(&self, bytes: usize) -> Result<()> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|&total| total <= self.capacity)
            })
            .map(|_| ())
            .map_err(|_| self.failure(bytes))
    }

    fn allocate(&self, bytes: usize) -> Result<DevicePtr> {
        if bytes == 0 {
            return Ok(DevicePtr::NULL);
        }

        self.reserve(bytes)?;

        let layout = match Layout::from_size_align(bytes, DEVICE_ALIGN) {
            Ok(layout) => layout,
            Err(_) => {
                self.used.fetch_sub(bytes, Ordering::AcqRel);
                return Err(self.failure(bytes));
            }
        };

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        if ptr.is_null() {
            self.used.fetch_sub(bytes, Ordering::AcqRel);
            return Err(self.failure(bytes));
        }

        // SAFETY: `ptr` is valid for writes of `bytes` bytes.
        unsafe { ptr.write_bytes(self.fill_byte, bytes) };

        let addr = ptr as usize;
        self.live().insert(addr, layout);
        log::debug!("device alloc {bytes} bytes at {addr:#x}");
        Ok(DevicePtr { addr })
    }

    fn free(&self, ptr: DevicePtr) -> Result<()> {
        if ptr.is_null() {
            return Ok(());
        }

        let layout = self
            .live()
            .remove(&ptr.addr())
            .ok_or(DeviceError::InvalidFree(ptr.addr()))?;

        // SAFETY: the address was returned by `alloc::alloc` with `layout`
        // and has just been removed from the live table.
        unsafe { alloc::dealloc(ptr.addr() as *mut u8, layout) };
        self.used.fetch_sub(layout.size(), Ordering::AcqRel);
        log::debug!("device free {} bytes at {:#x}", layout.size(), ptr.addr());
        Ok(())
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let live = self.live.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (addr, layout) in live.drain() {
            log::warn!(
                "reclaiming leaked device allocation of {} bytes at {addr:#x}",
                layout.size()
            );
            // SAFETY: every entry of the live table is an outstanding
            // allocation made with its recorded layout.
            unsafe { alloc::dealloc(addr as *mut u8, layout) };
        }
    }
}

struct DeviceInner {
    config: DeviceConfig,
    arena: Arena,
}

/// A simulated device.
///
/// Cloning a `Device` is cheap; all clones share the same memory arena.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Creates a device from its configuration.
    pub fn new(config: DeviceConfig) -> Self {
        let arena = Arena::new(config.memory_capacity, config.fill_byte);
        Self {
            inner: Arc::new(DeviceInner { config, arena }),
        }
    }

    /// Returns the configuration the device was created with.
    pub fn info(&self) -> &DeviceConfig {
        &self.inner.config
    }

    /// Returns the device name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Returns the device kind.
    pub fn kind(&self) -> DeviceKind {
        self.inner.config.kind
    }

    /// Returns the number of compute units.
    pub fn compute_units(&self) -> usize {
        self.inner.config.compute_units.max(1)
    }

    /// Returns the size of the memory arena in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.arena.capacity
    }

    /// Returns the number of bytes currently allocated.
    pub fn used_bytes(&self) -> usize {
        self.inner.arena.used.load(Ordering::Acquire)
    }

    /// Returns the number of live allocations.
    pub fn live_allocations(&self) -> usize {
        self.inner.arena.live().len()
    }

    /// Allocates `bytes` bytes of device memory, aligned to [`DEVICE_ALIGN`].
    ///
    /// The contents of the allocation are unspecified. A zero-byte request
    /// returns [`DevicePtr::NULL`] without reserving memory.
    ///
    /// # Errors
    ///
    /// [`DeviceError::AllocationFailure`] when the arena is exhausted.
    pub fn allocate(&self, bytes: usize) -> Result<DevicePtr> {
        self.inner.arena.allocate(bytes)
    }

    /// Frees a device allocation. Freeing [`DevicePtr::NULL`] does nothing.
    ///
    /// A `DevicePtr` is a plain address, so the arena cannot tell who else
    /// still reads or writes through it, and freeing one needs `unsafe`:
    ///
    /// ```compile_fail
    /// use contatori_device::device::{Device, DeviceConfig};
    ///
    /// let device = Device::new(DeviceConfig::accelerator());
    /// let ptr = device.allocate(64).unwrap();
    /// device.free(ptr).unwrap(); // error: call to unsafe function
    /// ```
    ///
    /// # Safety
    ///
    /// The caller must own the allocation at `ptr`, and no live handle
    /// (such as a [`CounterRef`](crate::counters::CounterRef)) may access it
    /// after this call. Freeing an address the arena does not know is safe:
    /// it is reported as an error.
    ///
    /// # Errors
    ///
    /// [`DeviceError::InvalidFree`] if `ptr` is not a live allocation of
    /// this device.
    pub unsafe fn free(&self, ptr: DevicePtr) -> Result<()> {
        self.inner.arena.free(ptr)
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Device {}

impl Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("compute_units", &self.compute_units())
            .field("used_bytes", &self.used_bytes())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.kind())
    }
}

/// Criterion used to pick a device from a [`Platform`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceSelector {
    /// Prefer a GPU, then any accelerator, then the host CPU.
    #[default]
    Default,
    /// First device of the given kind.
    Kind(DeviceKind),
    /// First device whose name contains the given string.
    Name(String),
}

impl Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Default => write!(f, "default"),
            DeviceSelector::Kind(kind) => write!(f, "kind={kind}"),
            DeviceSelector::Name(name) => write!(f, "name~{name}"),
        }
    }
}

/// The set of devices available to the process.
///
/// # Examples
///
/// ```rust
/// use contatori_device::device::{DeviceKind, DeviceSelector, Platform};
///
/// let platform = Platform::default();
/// let device = platform.select(&DeviceSelector::Default).unwrap();
/// assert_eq!(device.kind(), DeviceKind::Accelerator);
///
/// let host = platform.select(&DeviceSelector::Kind(DeviceKind::Cpu)).unwrap();
/// assert_eq!(host.name(), "host cpu");
/// ```
#[derive(Debug, Clone)]
pub struct Platform {
    devices: Vec<Device>,
}

impl Platform {
    /// Creates a platform with one device per configuration.
    pub fn new(configs: impl IntoIterator<Item = DeviceConfig>) -> Self {
        Self {
            devices: configs.into_iter().map(Device::new).collect(),
        }
    }

    /// Returns the devices of the platform.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Selects a device.
    ///
    /// # Errors
    ///
    /// [`DeviceError::NoDevice`] when no device matches.
    pub fn select(&self, selector: &DeviceSelector) -> Result<Device> {
        let found = match selector {
            // max_by_key keeps the last maximum; reverse so ties go to the first device.
            DeviceSelector::Default => self
                .devices
                .iter()
                .rev()
                .max_by_key(|device| device.kind().score()),
            DeviceSelector::Kind(kind) => self.devices.iter().find(|d| d.kind() == *kind),
            DeviceSelector::Name(name) => self
                .devices
                .iter()
                .find(|d| d.name().contains(name.as_str())),
        };

        let device = found
            .cloned()
            .ok_or_else(|| DeviceError::NoDevice(selector.to_string()))?;
        log::debug!("selected device {device} for selector {selector}");
        Ok(device)
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new([DeviceConfig::host(), DeviceConfig::accelerator()])
    }
}
