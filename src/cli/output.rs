//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::{BottleneckReport, BottleneckSeverity};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Table with the CLI's common preset and a bold header.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );
    table
}

pub fn severity_cell(severity: BottleneckSeverity) -> Cell {
    let color = match severity {
        BottleneckSeverity::Critical => Color::Red,
        BottleneckSeverity::High => Color::DarkRed,
        BottleneckSeverity::Medium => Color::Yellow,
        BottleneckSeverity::Low => Color::Cyan,
    };
    Cell::new(severity.as_str()).fg(color)
}

/// Format an optional seconds value, `-` when absent.
pub fn format_secs(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}s"))
}

pub fn format_bottleneck_table(reports: &[BottleneckReport]) -> String {
    let mut table = new_table(&["Agent", "Severity", "Depth", "Avg wait", "Reason", "Suggested"]);
    for report in reports {
        table.add_row(vec![
            Cell::new(&report.agent_type),
            severity_cell(report.severity),
            Cell::new(report.queue_depth),
            Cell::new(format_secs(report.avg_wait_secs)),
            Cell::new(&report.reason),
            Cell::new(report.suggested_actions.join("; ")),
        ]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer sentence", 10), "a longe...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_format_secs() {
        assert_eq!(format_secs(None), "-");
        assert_eq!(format_secs(Some(12.345)), "12.3s");
    }
}
