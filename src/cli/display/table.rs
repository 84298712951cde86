//! Table builder wrapper around comfy-table for consistent list display.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};

use crate::cli::output::truncate;
use crate::domain::models::{PlanningResult, RepairResult};

/// Create a standard list table with the given headers.
///
/// Uses the NOTHING preset (no borders) for a clean CLI aesthetic.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

fn score(value: f64) -> Cell {
    Cell::new(format!("{value:.2}")).set_alignment(CellAlignment::Right)
}

/// One row per proposed tool, grouped by record id.
pub fn plan_table(plan: &PlanningResult) -> Table {
    let mut table = list_table(&["record", "tool", "confidence", "arguments", "notes"]);
    for (record_id, tools) in &plan.proposed_tools {
        for tool in tools {
            table.add_row(vec![
                Cell::new(record_id),
                Cell::new(&tool.tool_name),
                score(tool.confidence_score),
                Cell::new(truncate(&tool.tool_arguments.to_string(), 48)),
                Cell::new(tool.additional_notes.as_deref().unwrap_or("-")),
            ]);
        }
    }
    table
}

pub fn repair_table(repair: &RepairResult) -> Table {
    let mut table = list_table(&["record", "tool", "confidence", "result"]);
    for detail in &repair.repair_tool_details {
        table.add_row(vec![
            Cell::new(&detail.record_id),
            Cell::new(&detail.tool_name),
            score(detail.confidence_score),
            Cell::new(truncate(&detail.tool_result.to_string(), 60)),
        ]);
    }
    table
}
