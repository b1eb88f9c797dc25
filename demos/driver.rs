//! Counts 1024 work items into 4 buckets on the default device.
//!
//! Run with:
//! ```bash
//! cargo run --example driver
//! ```
//!
//! Expected output (after the device line): four lines reading `256`.

use contatori_device::counters::DeviceCounterArray;
use contatori_device::device::{DeviceSelector, Platform};
use contatori_device::queue::{Queue, Range};
use contatori_device::Result;

const BUCKETS: usize = 4;
const ITEMS: usize = 1024;

fn main() -> Result<()> {
    let device = Platform::default().select(&DeviceSelector::Default)?;
    println!("Using {}", device.name());
    let queue = Queue::new(&device);

    let mut counter = DeviceCounterArray::<usize>::new(&queue, BUCKETS)?;
    counter.pre_kernel_zero()?;

    let cells = counter.handle()?;
    queue
        .parallel_for(Range::new(ITEMS), move |item| {
            // Each item increments bucket `id % 4`; the result is its
            // position within that bucket.
            let _position = cells.get_add_output(item, item.id() % BUCKETS);
        })
        .wait_and_throw()?;

    for count in counter.get_counts()? {
        println!("{count}");
    }

    counter.release()?;
    Ok(())
}
