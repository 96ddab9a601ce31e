use std::sync::Arc;

use comfy_table::{modifiers, presets, Attribute, Cell, CellAlignment, Table};
use gesbox_client::domain::DeviceFilter;
use time::UtcOffset;

use crate::{
    dashboard::views::{self, HistoryRow, Order},
    pipeline::{PipelineError, Sink},
    snapshot::Snapshot,
};

pub fn build_history_table(rows: &[HistoryRow]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).apply_modifier(modifiers::UTF8_ROUND_CORNERS);
    table.set_header(vec!["Device", "Volume", "Cumulative volume", "Date"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.device_id.as_deref().unwrap_or("-")),
            Cell::new(&row.volume).set_alignment(CellAlignment::Right),
            Cell::new(&row.cumulative_volume).set_alignment(CellAlignment::Right),
            Cell::new(&row.date).add_attribute(Attribute::Dim),
        ]);
    }
    table
}

/// Prints each published snapshot as a history table on stdout.
pub struct ConsoleTableSink {
    filter: DeviceFilter,
    order: Order,
    offset: UtcOffset,
}

impl ConsoleTableSink {
    pub fn new(filter: DeviceFilter, order: Order, offset: UtcOffset) -> Self {
        Self { filter, order, offset }
    }

    pub fn render(&self, snapshot: &Snapshot) -> Table {
        let rows =
            views::history_rows(snapshot.readings(), &self.filter, self.order, self.offset);
        build_history_table(&rows)
    }
}

#[async_trait::async_trait]
impl Sink<Arc<Snapshot>> for ConsoleTableSink {
    async fn publish(&self, item: Arc<Snapshot>) -> Result<(), PipelineError> {
        if item.is_empty() {
            println!("no readings ({} rows rejected)", item.rejected());
            return Ok(());
        }
        println!("{}", self.render(&item));
        Ok(())
    }

    async fn report_failure(&self, error: &PipelineError) {
        eprintln!("fetch failed: {error}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gesbox_client::domain::Reading;

    #[test]
    fn table_lists_filtered_rows() {
        let snapshot = Snapshot::new(
            vec![
                Reading::new(Some("GesBox1".into()), 0, 1.5, 1.5),
                Reading::new(Some("GesBox2".into()), 60, 2.25, 2.25),
            ],
            0,
            "d".into(),
        );
        let filter = DeviceFilter::Device("GesBox2".into());
        let sink = ConsoleTableSink::new(filter, Order::Asc, UtcOffset::UTC);
        let rendered = sink.render(&snapshot).to_string();

        assert!(rendered.contains("Cumulative volume"));
        assert!(rendered.contains("2.25"));
        assert!(rendered.contains("01/01/1970 00:01:00"));
        assert!(!rendered.contains("GesBox1"));
    }

    #[test]
    fn rows_without_device_show_placeholder() {
        let readings = [Reading::new(None, 0, 1.0, 1.0)];
        let rows = views::history_rows(&readings, &DeviceFilter::All, Order::Asc, UtcOffset::UTC);
        let rendered = build_history_table(&rows).to_string();
        assert!(rendered.contains("1.00"));
        assert_eq!(build_history_table(&rows).row_count(), 1);
    }
}
