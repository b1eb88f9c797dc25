//! Renders a device histogram with the table and JSON observers.
//!
//! Run with:
//! ```bash
//! cargo run --example counts_report --features demo
//! ```

use contatori_device::counters::DeviceCounterArray;
use contatori_device::device::{DeviceSelector, Platform};
use contatori_device::observers::json::JsonObserver;
use contatori_device::observers::table::{TableObserver, TableStyle};
use contatori_device::observers::Result;
use contatori_device::queue::{Queue, Range};
use contatori_device::snapshot::CountsSnapshot;

fn main() -> Result<()> {
    let device = Platform::default().select(&DeviceSelector::Default)?;
    let queue = Queue::new(&device);

    let mut buckets = DeviceCounterArray::<u32>::new(&queue, 8)?.with_name("buckets");
    buckets.pre_kernel_zero()?;

    let cells = buckets.handle()?;
    queue
        .parallel_for(Range::new(10_000), move |item| {
            // Squares modulo 8 only land in buckets 0, 1 and 4.
            let id = item.id();
            cells.get_add_output(item, (id * id) % 8);
        })
        .wait_and_throw()?;

    let snapshot = CountsSnapshot::from_array(&buckets)?;
    buckets.release()?;

    let table = TableObserver::new()
        .with_style(TableStyle::Rounded)
        .with_title(format!("Squares mod 8 on {device}"))
        .with_total(true);
    println!("{}", table.render([&snapshot]));

    let json = JsonObserver::new()
        .pretty(true)
        .wrap_in_report(true)
        .to_json([&snapshot])?;
    println!("{json}");

    Ok(())
}
