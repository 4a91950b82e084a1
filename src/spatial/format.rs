//! Text renderings of the spatial index for prompts and verification.

use super::{LabelValuePair, Row, SpatialIndex};

/// One line per row: `y=120: [x=100] POLICY NUMBER | [x=300] BA-12345`.
///
/// Models locate columns far better with explicit x positions than with
/// whitespace-aligned text.
pub fn rows_text<'a>(index: &SpatialIndex, rows: impl IntoIterator<Item = &'a Row>) -> String {
    let mut out = String::new();
    for row in rows {
        let cells: Vec<String> = index
            .row_blocks(row)
            .map(|b| format!("[x={:.0}] {}", b.bbox.x0, b.content()))
            .collect();
        out.push_str(&format!("y={:.0}: {}\n", row.y, cells.join(" | ")));
    }
    out
}

/// Every row of every page, with page headers.
pub fn document_rows_text(pages: &[SpatialIndex]) -> String {
    let mut out = String::new();
    for index in pages.iter().filter(|i| !i.is_empty()) {
        out.push_str(&format!("--- page {} ---\n", index.page + 1));
        out.push_str(&rows_text(index, &index.rows));
    }
    out
}

/// Plain reading-order text: rows joined by newlines, blocks by spaces.
pub fn plain_text(pages: &[SpatialIndex]) -> String {
    pages
        .iter()
        .flat_map(|index| index.rows.iter().map(move |row| index.row_text(row)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `LABEL: value` lines.
pub fn pairs_text<'a>(pairs: impl IntoIterator<Item = &'a LabelValuePair>) -> String {
    let mut out = String::new();
    for pair in pairs {
        let label = pair.label_text().trim_end_matches(':');
        out.push_str(&format!("{}: {}\n", label, pair.value_text()));
    }
    out
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((i, _)) => &text[..i],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{block_at, block_on};
    use super::super::{build_document_index, build_index};
    use super::*;
    use crate::config::SpatialConfig;

    #[test]
    fn rows_text_lists_x_positions() {
        let idx = build_index(
            0,
            &[block_at("POLICY NUMBER", 100.0, 50.0), block_at("BA-12345", 300.0, 50.0)],
            &SpatialConfig::default(),
        );
        let text = rows_text(&idx, &idx.rows);
        assert_eq!(text, "y=50: [x=100] POLICY NUMBER | [x=300] BA-12345\n");
        assert_eq!(pairs_text(&idx.pairs), "POLICY NUMBER: BA-12345\n");
    }

    #[test]
    fn plain_text_spans_pages() {
        let pages = vec![
            vec![block_on(0, "DATE", 10.0, 10.0), block_on(0, "01/02/2024", 200.0, 10.0)],
            vec![block_on(1, "CARRIER", 10.0, 10.0)],
        ];
        let idx = build_document_index(&pages, &SpatialConfig::default());
        assert_eq!(plain_text(&idx), "DATE 01/02/2024\nCARRIER");
        assert!(document_rows_text(&idx).contains("--- page 2 ---"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
