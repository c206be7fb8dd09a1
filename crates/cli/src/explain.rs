//! `forksync explain`: reference tables for commit markers and conflicts.

use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};

use forksync_core::conflict::ConflictKind;
use forksync_core::scan::CommitMarker;

use super::style;

pub fn markers_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Marker", "Description"]);
    for marker in CommitMarker::ALL {
        table.add_row(vec![Cell::new(marker.as_str()), Cell::new(marker.description())]);
    }
    table
}

pub fn conflicts_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Conflict",
        "Description",
        CommitMarker::ConflictApply.as_str(),
        CommitMarker::ConflictSkip.as_str(),
        "No marker",
    ]);
    for kind in ConflictKind::ALL {
        table.add_row(vec![
            Cell::new(kind.name()),
            Cell::new(kind.description()),
            Cell::new(kind.recovery_description(Some(CommitMarker::ConflictApply))),
            Cell::new(kind.recovery_description(Some(CommitMarker::ConflictSkip))),
            Cell::new(kind.recovery_description(None)),
        ]);
    }
    table
}

pub fn run_markers() {
    println!();
    println!("{}", style::header("Commit markers"));
    println!(
        "{}",
        style::dim("Write a marker in a commit message or in a comment on the commit.")
    );
    println!();
    println!("{}", markers_table());
    println!();
}

pub fn run_conflicts() {
    println!();
    println!("{}", style::header("Conflict recovery"));
    println!(
        "{}",
        style::dim("During a sync, upstream is the base and the fork's commit is being applied.")
    );
    println!();
    println!("{}", conflicts_table());
    println!();
}
