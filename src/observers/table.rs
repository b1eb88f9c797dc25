//! Table observer for pretty-printing counter snapshots.
//!
//! This module provides [`TableObserver`], which renders
//! [`CountsSnapshot`]s as a formatted ASCII table using the `tabled` crate,
//! one row per counter.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature:
//!
//! ```toml
//! [dependencies]
//! contatori-device = { version = "0.1", features = ["table"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use contatori_device::observers::table::{TableObserver, TableStyle};
//! use contatori_device::snapshot::CountsSnapshot;
//!
//! let snapshot = CountsSnapshot::new("buckets", vec![256, 256]);
//!
//! let observer = TableObserver::new().with_style(TableStyle::Rounded);
//! println!("{}", observer.render([&snapshot]));
//! // ╭─────────┬───────┬───────╮
//! // │ Name    │ Index │ Count │
//! // ├─────────┼───────┼───────┤
//! // │ buckets │ 0     │ 256   │
//! // │ buckets │ 1     │ 256   │
//! // ╰─────────┴───────┴───────╯
//! ```

use crate::snapshot::CountsSnapshot;
use tabled::{settings::Style, Table, Tabled};

/// Available table styles for rendering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// GitHub-flavored Markdown table
    Markdown,
    /// Dots for borders
    Dots,
    /// No borders, just spacing
    Blank,
}

/// Configuration for the table observer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row.
    pub show_header: bool,
    /// Custom title for the table (optional).
    pub title: Option<String>,
    /// Whether to append a row with the total of each snapshot.
    pub show_total: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            show_total: false,
        }
    }
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Index")]
    index: String,
    #[tabled(rename = "Count")]
    count: u64,
}

/// An observer that renders counter snapshots as an ASCII table.
#[derive(Debug, Clone, Default)]
pub struct TableObserver {
    config: TableConfig,
}

impl TableObserver {
    /// Creates a new table observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new table observer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Sets whether to show the header row.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets an optional title for the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Appends a `total` row after the counters of each snapshot.
    pub fn with_total(mut self, show: bool) -> Self {
        self.config.show_total = show;
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Dots => {
                table.with(Style::dots());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn rows(&self, snapshot: &CountsSnapshot) -> Vec<CountRow> {
        let mut rows: Vec<CountRow> = snapshot
            .counts
            .iter()
            .enumerate()
            .map(|(index, &count)| CountRow {
                name: snapshot.name.clone(),
                index: index.to_string(),
                count,
            })
            .collect();

        if self.config.show_total {
            rows.push(CountRow {
                name: snapshot.name.clone(),
                index: "total".to_string(),
                count: snapshot.total(),
            });
        }
        rows
    }

    /// Renders the snapshots as a table string.
    pub fn render<'a>(&self, snapshots: impl IntoIterator<Item = &'a CountsSnapshot>) -> String {
        let rows: Vec<CountRow> = snapshots
            .into_iter()
            .flat_map(|snapshot| self.rows(snapshot))
            .collect();

        let mut table = Table::new(&rows);
        self.apply_style(&mut table);

        if !self.config.show_header {
            table.with(tabled::settings::Remove::row(
                tabled::settings::object::Rows::first(),
            ));
        }

        if let Some(ref title) = self.config.title {
            format!("{}\n{}", title, table)
        } else {
            table.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets() -> CountsSnapshot {
        CountsSnapshot::new("buckets", vec![256, 128])
    }

    #[test]
    fn test_render_rows() {
        let output = TableObserver::new().render([&buckets()]);
        assert!(output.contains("Name"));
        assert!(output.contains("Index"));
        assert!(output.contains("Count"));
        assert!(output.contains("buckets"));
        assert!(output.contains("256"));
        assert!(output.contains("128"));
    }

    #[test]
    fn test_render_total() {
        let output = TableObserver::new().with_total(true).render([&buckets()]);
        assert!(output.contains("total"));
        assert!(output.contains("384"));
    }

    #[test]
    fn test_render_without_header() {
        let output = TableObserver::new()
            .with_header(false)
            .render([&buckets()]);
        assert!(!output.contains("Index"));
        assert!(output.contains("buckets"));
    }

    #[test]
    fn test_render_title() {
        let output = TableObserver::new()
            .with_title("Device counts")
            .render([&buckets()]);
        assert!(output.starts_with("Device counts\n"));
    }

    #[test]
    fn test_render_markdown() {
        let output = TableObserver::new()
            .with_style(TableStyle::Markdown)
            .render([&buckets()]);
        assert!(output.contains("|"));
    }

    #[test]
    fn test_render_several_snapshots() {
        let other = CountsSnapshot::new("other", vec![1]);
        let output = TableObserver::new().render([&buckets(), &other]);
        assert!(output.contains("buckets"));
        assert!(output.contains("other"));
    }
}
