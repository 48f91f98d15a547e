//! Purpose: Draw a `TableView` as plain text for the terminal console.
//! Exports: `render`, `render_table`.
//! Role: Pure formatting; no state changes other than reading the clock passed in.
//! Invariants: The loading indicator replaces the table entirely.
//! Invariants: Cells are single-line; embedded newlines are escaped.
use super::pager::PageState;
use super::view::{RowMode, TableView};
use std::time::Instant;

const HEADERS: [&str; 5] = ["#", "nome", "email", "telefone", "actions"];

pub fn render(view: &TableView, state: &PageState, now: Instant) -> String {
    let mut lines = Vec::new();
    if !state.search_term().is_empty() {
        lines.push(format!("search: {}", state.search_term()));
    }
    if let Some(notice) = view.notice() {
        lines.push(format!("note: {notice}"));
    }

    if view.is_loading() {
        lines.push("Loading...".to_string());
    } else if let Some(error) = view.error() {
        lines.push(format!("error: {error}"));
    } else {
        let rows = view
            .rows()
            .iter()
            .enumerate()
            .map(|(idx, row)| {
                let number = (idx + 1).to_string();
                match &row.mode {
                    RowMode::Display => vec![
                        number,
                        row.record.fields.nome.clone(),
                        row.record.fields.email.clone(),
                        row.record.fields.telefone.clone().unwrap_or_default(),
                        "[edit] [delete]".to_string(),
                    ],
                    RowMode::Editing(draft) => vec![
                        number,
                        format!("[{}]", draft.nome),
                        format!("[{}]", draft.email),
                        format!("[{}]", draft.telefone),
                        "[save] [cancel]".to_string(),
                    ],
                }
            })
            .collect::<Vec<_>>();
        lines.push(render_table(&HEADERS, &rows));
        if view.shows_empty_state() {
            lines.push("No records found.".to_string());
        }
    }

    let pagination = view.pagination();
    lines.push(format!(
        "{}  {}  {}",
        if pagination.prev_enabled { "<prev" } else { "     " },
        pagination.label,
        if pagination.next_enabled { "next>" } else { "" },
    ));

    if let Some(flash) = view.flash(now) {
        lines.push(flash.to_string());
    }
    if let Some(status) = view.create_status() {
        lines.push(format!("new record: {status}"));
    }
    lines.join("\n")
}

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let column_count = headers.len();
    let mut sanitized_rows = Vec::with_capacity(rows.len());
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        let mut sanitized = Vec::with_capacity(column_count);
        for (idx, width) in widths.iter_mut().enumerate() {
            let value = row.get(idx).map(String::as_str).unwrap_or("");
            let cleaned = sanitize_table_cell(value);
            *width = (*width).max(cleaned.chars().count());
            sanitized.push(cleaned);
        }
        sanitized_rows.push(sanitized);
    }

    let mut lines = Vec::with_capacity(sanitized_rows.len() + 1);
    lines.push(format_table_line(
        &headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>(),
        &widths,
    ));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len && idx + 1 < widths.len() {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line
}
