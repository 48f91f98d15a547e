//! Purpose: Normalise list-request parameters before they reach the upstream API.
//! Exports: `ListQuery`, `PageSize`, `DEFAULT_PAGE_SIZE`, `MAX_PAGE_SIZE`.
//! Role: Shared by the relay (parsing query strings) and clients (building them).
//! Invariants: A `PageSize` is always within 1..=50.
//! Invariants: Empty cursors and search terms are treated as absent.
use std::num::IntErrorKind;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageSize(u32);

impl PageSize {
    pub fn new(requested: u32) -> Self {
        if requested == 0 {
            return Self::default();
        }
        Self(requested.min(MAX_PAGE_SIZE))
    }

    /// Parses a raw query value from its leading integer, so `"5abc"` is 5 and
    /// `"12.5"` is 12. Missing, zero, or non-numeric values use the default.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(leading_integer) else {
            return Self::default();
        };
        match raw.parse::<i64>() {
            Ok(0) => Self::default(),
            Ok(value) if value < 0 => Self(1),
            Ok(value) => Self(value.min(i64::from(MAX_PAGE_SIZE)) as u32),
            Err(err) if *err.kind() == IntErrorKind::PosOverflow => Self(MAX_PAGE_SIZE),
            Err(err) if *err.kind() == IntErrorKind::NegOverflow => Self(1),
            Err(_) => Self::default(),
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Optional sign followed by the run of ASCII digits that starts the value.
fn leading_integer(raw: &str) -> &str {
    let raw = raw.trim_start();
    let sign = usize::from(raw.starts_with(['+', '-']));
    let digits = raw[sign..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    &raw[..sign + digits]
}

impl Default for PageSize {
    fn default() -> Self {
        Self(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page_size: PageSize,
    pub offset: Option<String>,
}

impl ListQuery {
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.is_empty()).then_some(search);
        self
    }

    pub fn with_offset(mut self, offset: Option<impl Into<String>>) -> Self {
        self.offset = offset.map(Into::into).filter(|offset| !offset.is_empty());
        self
    }

    pub fn from_raw(search: Option<&str>, page_size: Option<&str>, offset: Option<&str>) -> Self {
        Self::new(PageSize::parse(page_size))
            .with_search(search.unwrap_or_default())
            .with_offset(offset)
    }
}
