// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use crate::navigation::Row;

pub const NOT_FOUND_PLACEHOLDER: &str = "No matches";

/// Transient filter over whatever the navigation stack currently renders.
///
/// The overlay never creates frames and never touches catalog data: it is a
/// view transformation only, so clearing the query is exactly "re-render
/// the current frame" and is safe at any time.
#[derive(Debug, Clone, Default)]
pub struct SearchOverlay {
    query: String,
}

impl SearchOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn clear(&mut self) {
        self.query.clear();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_active(&self) -> bool {
        !self.query.is_empty()
    }

    /// Filter rows by case-insensitive substring match on display text.
    /// Navigation actions survive filtering; an empty result set renders a
    /// single non-selectable placeholder.
    pub fn apply<'a>(&self, rows: Vec<Row<'a>>) -> Vec<Row<'a>> {
        if self.query.is_empty() {
            return rows;
        }

        let needle = self.query.to_lowercase();
        let mut filtered: Vec<Row<'a>> = rows
            .into_iter()
            .filter(|row| match row {
                Row::GoBack => true,
                Row::Placeholder(_) => false,
                Row::Item(_) => row.display_text().to_lowercase().contains(&needle),
            })
            .collect();

        if !filtered.iter().any(|row| matches!(row, Row::Item(_))) {
            filtered.push(Row::Placeholder(NOT_FOUND_PLACEHOLDER));
        }

        filtered
    }
}
