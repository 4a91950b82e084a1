//! Context assembly for the model-backed passes.
//!
//! Three shapes are handed out:
//!
//! - **category**: positioned rows of the sections that serve the category,
//!   or the whole document when no section does;
//! - **row**: the positioned text of one data row of the category's table;
//! - **gap fill**: the whole document plus every label-value pair the matcher
//!   left unclaimed.
//!
//! Every context is cut to `max_chars` characters.

use crate::sections::{sections_for, Section};
use crate::spatial::format::{document_rows_text, pairs_text, rows_text, truncate_chars};
use crate::spatial::{LabelValuePair, Row, SpatialIndex};

/// Read-only view over everything known about one document's text.
#[derive(Debug, Clone)]
pub struct DocumentContext<'a> {
    pages: &'a [SpatialIndex],
    markdown: &'a [String],
    sections: &'a [Section],
    unconsumed: Vec<&'a LabelValuePair>,
    max_chars: usize,
}

impl<'a> DocumentContext<'a> {
    pub fn new(
        pages: &'a [SpatialIndex],
        markdown: &'a [String],
        sections: &'a [Section],
        unconsumed: Vec<&'a LabelValuePair>,
        max_chars: usize,
    ) -> Self {
        Self {
            pages,
            markdown,
            sections,
            unconsumed,
            max_chars,
        }
    }

    fn page(&self, page: usize) -> Option<&'a SpatialIndex> {
        self.pages.iter().find(|p| p.page == page)
    }

    fn structural(&self) -> String {
        self.markdown
            .iter()
            .map(|m| m.trim())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Structural text (when present) and positioned rows, sharing the budget.
    fn combine(&self, positioned: &str, extra: &str) -> String {
        let structural = self.structural();
        let parts: Vec<(&str, &str)> = [
            ("STRUCTURED TEXT", structural.as_str()),
            ("POSITIONED TEXT", positioned),
            ("UNMATCHED LABEL-VALUE PAIRS", extra),
        ]
        .into_iter()
        .filter(|(_, body)| !body.trim().is_empty())
        .collect();
        if parts.is_empty() {
            return String::new();
        }

        let share = self.max_chars / parts.len();
        let mut out = String::new();
        for (title, body) in parts {
            out.push_str(&format!("--- {} ---\n", title));
            out.push_str(truncate_chars(body, share));
            out.push('\n');
        }
        truncate_chars(&out, self.max_chars).to_string()
    }

    /// The whole document.
    pub fn full(&self) -> String {
        self.combine(&document_rows_text(self.pages), "")
    }

    /// Section-scoped context for `category`, falling back to [`Self::full`].
    pub fn for_category(&self, category: &str) -> String {
        let scoped = sections_for(self.sections, category);
        if scoped.is_empty() {
            return self.full();
        }
        let mut positioned = String::new();
        for section in scoped {
            let Some(index) = self.page(section.page) else { continue };
            positioned.push_str(&format!("--- {} (page {}) ---\n", section.name, section.page + 1));
            positioned.push_str(&rows_text(index, index.rows_between(section.y_start, section.y_end)));
        }
        if positioned.trim().is_empty() {
            return self.full();
        }
        // Section-scoped text stands alone; the structural text is page-wide.
        truncate_chars(&positioned, self.max_chars).to_string()
    }

    /// Data rows of the tables serving `category`, ordered by page then y.
    fn data_rows(&self, category: &str) -> Vec<(&'a SpatialIndex, &'a Row)> {
        let scoped = sections_for(self.sections, category);
        let mut rows = Vec::new();
        for index in self.pages {
            for table in &index.tables {
                let skip = usize::from(table.has_header);
                for &r in table.rows.iter().skip(skip) {
                    let row = &index.rows[r];
                    let inside = scoped.is_empty()
                        || scoped
                            .iter()
                            .any(|s| s.page == index.page && row.y >= s.y_start && row.y < s.y_end);
                    if inside {
                        rows.push((index, row));
                    }
                }
            }
        }
        rows.sort_by(|a, b| a.0.page.cmp(&b.0.page).then(a.1.y.total_cmp(&b.1.y)));
        rows
    }

    /// Positioned text of the row carrying `suffix` (`A` is the first data
    /// row), or an empty string when the table has fewer rows.
    pub fn for_row(&self, category: &str, suffix: char) -> String {
        if !suffix.is_ascii_uppercase() {
            return String::new();
        }
        let ordinal = (suffix as u8 - b'A') as usize;
        match self.data_rows(category).get(ordinal) {
            Some((index, row)) => rows_text(index, std::iter::once(*row)),
            None => String::new(),
        }
    }

    /// Whole document plus unclaimed label-value pairs.
    pub fn gap_fill(&self) -> String {
        let pairs = pairs_text(self.unconsumed.iter().copied());
        self.combine(&document_rows_text(self.pages), &pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::spatial::build_index;
    use crate::spatial::test_support::block_at;

    fn section(id: &str, y_start: f64, y_end: f64, categories: &[&str]) -> Section {
        Section {
            id: id.to_string(),
            name: id.to_uppercase(),
            page: 0,
            y_start,
            y_end,
            categories: categories.iter().map(|c| c.to_string()).collect(),
            row_count: 1,
        }
    }

    fn pages() -> Vec<SpatialIndex> {
        let mut blocks = vec![
            block_at("CARRIER:", 100.0, 50.0),
            block_at("Great Lakes Mutual", 300.0, 50.0),
            block_at("DRIVER INFORMATION", 100.0, 150.0),
        ];
        for (i, name) in ["Alice", "Bob", "Carol"].iter().enumerate() {
            let y = 200.0 + 60.0 * i as f64;
            blocks.push(block_at(name, 100.0, y));
            blocks.push(block_at("CO", 400.0, y));
            blocks.push(block_at("80202", 600.0, y));
        }
        vec![build_index(0, &blocks, &SpatialConfig::default())]
    }

    #[test]
    fn category_context_is_section_scoped() {
        let pages = pages();
        let sections = vec![section("insurer", 0.0, 120.0, &["insurer"]), section("driver", 120.0, 400.0, &["driver"])];
        let ctx = DocumentContext::new(&pages, &[], &sections, Vec::new(), 8000);
        let insurer = ctx.for_category("insurer");
        assert!(insurer.contains("Great Lakes Mutual"));
        assert!(!insurer.contains("Alice"));
    }

    #[test]
    fn unknown_category_gets_full_text() {
        let pages = pages();
        let markdown = vec!["# ACORD 127".to_string()];
        let ctx = DocumentContext::new(&pages, &markdown, &[], Vec::new(), 8000);
        let text = ctx.for_category("remarks");
        assert!(text.contains("# ACORD 127"));
        assert!(text.contains("Alice"));
        assert!(text.contains("Great Lakes Mutual"));
    }

    #[test]
    fn rows_follow_y_order() {
        let pages = pages();
        let ctx = DocumentContext::new(&pages, &[], &[], Vec::new(), 8000);
        assert!(ctx.for_row("driver", 'A').contains("Alice"));
        assert!(ctx.for_row("driver", 'B').contains("Bob"));
        assert!(ctx.for_row("driver", 'C').contains("Carol"));
        assert!(ctx.for_row("driver", 'D').is_empty());
    }

    #[test]
    fn context_respects_budget() {
        let pages = pages();
        let ctx = DocumentContext::new(&pages, &[], &[], Vec::new(), 40);
        assert!(ctx.full().chars().count() <= 40);
        assert!(ctx.gap_fill().chars().count() <= 40);
    }

    #[test]
    fn gap_fill_lists_unclaimed_pairs() {
        let pages = pages();
        let unconsumed: Vec<&LabelValuePair> = pages[0].pairs.iter().collect();
        assert!(!unconsumed.is_empty());
        let ctx = DocumentContext::new(&pages, &[], &[], unconsumed, 8000);
        let text = ctx.gap_fill();
        assert!(text.contains("UNMATCHED LABEL-VALUE PAIRS"));
        assert!(text.contains("CARRIER: Great Lakes Mutual"));
    }
}
