//! Roster export: pretty JSON backups and a plain-text print view.

use std::path::Path;

use anyhow::{Context, Result};

use crate::models::Person;
use crate::utils::truncate_string;

/// Default file name for JSON backups.
pub const BACKUP_FILE_NAME: &str = "asegurados-backup.json";

/// Longest name shown in the print view before truncation.
const MAX_NAME_WIDTH: usize = 24;

/// Pretty-printed JSON array, readable back by the JSON import.
pub fn to_json(records: &[Person]) -> Result<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

pub fn write_json(path: &Path, records: &[Person]) -> Result<()> {
    let contents = to_json(records)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write backup: {}", path.display()))?;
    Ok(())
}

/// Aligned text table of `rows`, numbered from 1 by roster position.
pub fn render_table(rows: &[(usize, &Person)]) -> String {
    if rows.is_empty() {
        return "No records.\n".to_string();
    }

    let header = ["#", "DNI", "Apellido", "Nombre", "Estado"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|(index, person)| {
            [
                (index + 1).to_string(),
                person.id.clone(),
                truncate_string(&person.last_name, MAX_NAME_WIDTH),
                truncate_string(&person.first_name, MAX_NAME_WIDTH),
                person.status.to_string(),
            ]
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |row: &[&str]| {
        let line: Vec<String> = row
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| {
                let pad = width.saturating_sub(cell.chars().count());
                format!("{}{}", cell, " ".repeat(pad))
            })
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    };

    push_row(&header);
    for row in &cells {
        let refs: Vec<&str> = row.iter().map(String::as_str).collect();
        push_row(&refs);
    }
    out
}
