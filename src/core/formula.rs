//! Purpose: Build the upstream `filterByFormula` expression for name search.
//! Exports: `search_formula`, `quote_string_literal`.
//! Role: Only place that turns user text into formula source.
//! Invariants: User text is always embedded inside one double-quoted literal.
//! Invariants: Backslashes and double quotes are escaped so the literal cannot terminate early.
use super::record::FIELD_NAME;

/// Case-insensitive substring match over the name field, or `None` for an empty term.
pub fn search_formula(term: &str) -> Option<String> {
    if term.is_empty() {
        return None;
    }
    Some(format!(
        "SEARCH(LOWER({}), LOWER({{{FIELD_NAME}}}))",
        quote_string_literal(term)
    ))
}

pub fn quote_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}
