use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

/// Red for a touched file or a new/deleted file, yellow for a blamed line
/// range, green for related files only.
pub fn color_coded_score_cell(score: u32) -> Cell {
    if score >= 5 {
        Cell::new(score).fg(TableColor::Red)
    } else if score >= 4 {
        Cell::new(score).fg(TableColor::Yellow)
    } else {
        Cell::new(score).fg(TableColor::Green)
    }
}

pub fn color_coded_pass_rate_cell(pass_rate: f64, stable: bool) -> Cell {
    let text = if pass_rate < 0.0 {
        "N/A".to_string()
    } else {
        format!("{:.1}%", pass_rate * 100.0)
    };
    if stable {
        Cell::new(text).fg(TableColor::Green)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn optional_cell<T: std::fmt::Display>(value: Option<T>) -> Cell {
    value.map_or_else(
        || Cell::new("N/A").fg(TableColor::DarkGrey),
        |value| Cell::new(value),
    )
}
