//! Section detection: named vertical regions bounded by printed headers.
//!
//! Sections only narrow the context a category request sees; they never
//! produce values. A section starts at the top of the first block matching
//! one of its header keywords and runs to the next section's start or the
//! bottom of the page. Rows above the first header belong to the first
//! section, and a page with no recognised header is one `full_page` section.

use crate::spatial::SpatialIndex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Header keywords of one section, matched case-insensitively as substrings.
#[derive(Debug, Clone, Copy)]
pub struct SectionHeader {
    pub id: &'static str,
    pub keywords: &'static [&'static str],
}

/// Per-form section headers and the categories each section serves.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionTable {
    pub headers: &'static [SectionHeader],
    /// `(category, section ids)`.
    pub categories: &'static [(&'static str, &'static [&'static str])],
}

const fn h(id: &'static str, keywords: &'static [&'static str]) -> SectionHeader {
    SectionHeader { id, keywords }
}

const ACORD_125: SectionTable = SectionTable {
    headers: &[
        h("header_date", &["DATE (MM", "DATE(MM", "FORM COMPLETION"]),
        h("agency_carrier", &["AGENCY", "CARRIER", "NAIC CODE"]),
        h("policy_underwriter", &["COMPANY POLICY OR PROGRAM", "POLICY NUMBER", "UNDERWRITER", "UNDERWRITER OFFICE"]),
        h("status_transaction", &["STATUS OF", "TRANSACTION", "QUOTE", "BOUND", "CANCEL", "AGENCY CUSTOMER ID"]),
        h("lines_of_business", &["LINES OF BUSINESS", "INDICATE LINES OF BUSINESS", "PREMIUM"]),
        h("attachments", &["ATTACHMENTS", "ACCOUNTS RECEIVABLE", "VALUABLE PAPERS"]),
        h("policy_info", &["PROPOSED EFF DATE", "POLICY INFORMATION", "BILLING PLAN", "PAYMENT PLAN", "METHOD OF PAYMENT"]),
        h("applicant_info", &["NAME (FIRST NAMED INSURED)", "NAME (OTHER NAMED INSURED)", "AND MAILING ADDRESS (INCLUDING ZIP"]),
        h("premises_location", &["PREMISES", "LOCATION", "BUILDING", "OCCUPIED AREA", "ANNUAL REVENUES"]),
        h("nature_of_business", &["NATURE OF BUSINESS", "DESCRIPTION OF OPERATIONS", "SIC", "NAICS", "FEIN"]),
        h("prior_coverage", &["PRIOR COVERAGE", "PRIOR CARRIER", "PRIOR POLICY"]),
        h("loss_history_section", &["LOSS HISTORY", "CLAIMS", "DATE OF LOSS", "AMOUNT PAID"]),
    ],
    categories: &[
        ("header", &["header_date", "agency_carrier"]),
        ("insurer", &["agency_carrier", "policy_underwriter"]),
        ("producer", &["agency_carrier", "policy_underwriter"]),
        ("named_insured", &["applicant_info"]),
        ("policy", &["policy_underwriter", "status_transaction", "policy_info"]),
        ("checkbox", &["status_transaction", "lines_of_business", "attachments"]),
        ("location", &["premises_location", "applicant_info"]),
        ("loss_history", &["loss_history_section", "prior_coverage", "attachments"]),
        ("remarks", &["attachments", "applicant_info"]),
        (
            "general",
            &["premises_location", "nature_of_business", "applicant_info", "policy_info", "lines_of_business", "attachments"],
        ),
    ],
};

const ACORD_127: SectionTable = SectionTable {
    headers: &[
        h("header_date", &["DATE", "COMMERCIAL AUTO", "BUSINESS AUTO"]),
        h("insurer_policy", &["COMPANY", "CARRIER", "NAIC", "POLICY NUMBER", "NAMED INSURED"]),
        h("producer", &["PRODUCER", "AGENCY", "AGENT"]),
        h("driver_table", &["DRIVER", "FIRST NAME", "LAST NAME", "DOB", "LICENSE"]),
        h("vehicle", &["VEHICLE", "YEAR", "MAKE", "MODEL", "VIN"]),
    ],
    categories: &[
        ("header", &["header_date"]),
        ("insurer", &["insurer_policy"]),
        ("named_insured", &["insurer_policy"]),
        ("policy", &["insurer_policy"]),
        ("producer", &["producer", "insurer_policy"]),
        ("driver", &["driver_table"]),
        ("vehicle", &["vehicle"]),
        ("checkbox", &["insurer_policy", "vehicle"]),
        ("location", &["insurer_policy", "producer"]),
        ("general", &["insurer_policy", "driver_table", "vehicle"]),
    ],
};

const ACORD_137: SectionTable = SectionTable {
    headers: &[
        h("header_date", &["DATE", "COMMERCIAL AUTO", "VEHICLE SCHEDULE"]),
        h("insurer_named", &["NAMED INSURED", "POLICY", "EFFECTIVE", "INSURER", "NAIC"]),
        h("vehicle_schedule", &["VEHICLE", "YEAR", "MAKE", "VIN", "COVERAGE", "SYMBOL"]),
    ],
    categories: &[
        ("header", &["header_date"]),
        ("insurer", &["insurer_named"]),
        ("producer", &["insurer_named"]),
        ("named_insured", &["insurer_named"]),
        ("policy", &["insurer_named"]),
        ("vehicle", &["vehicle_schedule"]),
        ("coverage", &["vehicle_schedule"]),
        ("checkbox", &["vehicle_schedule"]),
        ("general", &["insurer_named", "vehicle_schedule"]),
    ],
};

impl SectionTable {
    pub fn for_form(form_type: &str) -> Self {
        match form_type {
            "125" => ACORD_125,
            "127" => ACORD_127,
            "137" => ACORD_137,
            _ => SectionTable::default(),
        }
    }

    /// Section ids serving `category`.
    pub fn sections_for(&self, category: &str) -> &'static [&'static str] {
        self.categories
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, ids)| *ids)
            .unwrap_or(&[])
    }

    fn categories_of(&self, section_id: &str) -> Vec<String> {
        self.categories
            .iter()
            .filter(|(_, ids)| ids.contains(&section_id))
            .map(|(c, _)| c.to_string())
            .collect()
    }
}

/// A detected section of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    /// Text of the header block, or the id.
    pub name: String,
    pub page: usize,
    pub y_start: f64,
    /// Exclusive.
    pub y_end: f64,
    pub categories: Vec<String>,
    pub row_count: usize,
}

/// Finds sections on every page of a document.
#[derive(Debug, Clone, Copy)]
pub struct SectionDetector {
    table: SectionTable,
}

impl SectionDetector {
    pub fn new(table: SectionTable) -> Self {
        Self { table }
    }

    pub fn for_form(form_type: &str) -> Self {
        Self::new(SectionTable::for_form(form_type))
    }

    pub fn table(&self) -> &SectionTable {
        &self.table
    }

    /// Sections of all pages, page by page, top to bottom. Forms without a
    /// section table produce none.
    pub fn detect(&self, pages: &[SpatialIndex]) -> Vec<Section> {
        if self.table.headers.is_empty() {
            return Vec::new();
        }
        let sections: Vec<Section> = pages
            .iter()
            .filter(|p| !p.is_empty())
            .flat_map(|p| self.detect_page(p))
            .collect();
        debug!("Detected {} sections", sections.len());
        sections
    }

    fn detect_page(&self, index: &SpatialIndex) -> Vec<Section> {
        let bottom = index.page_bottom() + 1.0;

        // (section id, header top, header text)
        let mut anchors: Vec<(&'static str, f64, String)> = Vec::new();
        for header in self.table.headers {
            let top = index
                .blocks
                .iter()
                .filter(|b| {
                    let upper = b.content().to_uppercase();
                    header.keywords.iter().any(|k| upper.contains(k))
                })
                .min_by(|a, b| a.bbox.y0.total_cmp(&b.bbox.y0));
            if let Some(block) = top {
                anchors.push((header.id, block.bbox.y0, block.content().chars().take(60).collect()));
            }
        }
        anchors.sort_by(|a, b| a.1.total_cmp(&b.1));

        if anchors.is_empty() {
            return vec![Section {
                id: "full_page".to_string(),
                name: "Full page".to_string(),
                page: index.page,
                y_start: 0.0,
                y_end: bottom,
                categories: self.table.categories.iter().map(|(c, _)| c.to_string()).collect(),
                row_count: index.rows.len(),
            }];
        }

        let mut sections = Vec::with_capacity(anchors.len());
        for (i, (id, top, name)) in anchors.iter().enumerate() {
            let y_start = if i == 0 { 0.0 } else { *top };
            let y_end = anchors.get(i + 1).map(|a| a.1).unwrap_or(bottom);
            let row_count = index.rows_between(y_start, y_end).count();
            if row_count == 0 {
                continue;
            }
            sections.push(Section {
                id: id.to_string(),
                name: name.clone(),
                page: index.page,
                y_start,
                y_end,
                categories: self.table.categories_of(id),
                row_count,
            });
        }
        sections
    }
}

/// Sections serving `category`, in document order.
pub fn sections_for<'a>(sections: &'a [Section], category: &str) -> Vec<&'a Section> {
    sections
        .iter()
        .filter(|s| s.categories.iter().any(|c| c == category))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpatialConfig;
    use crate::spatial::build_index;
    use crate::spatial::test_support::block_at;

    fn page() -> Vec<SpatialIndex> {
        let blocks = vec![
            block_at("ACORD", 100.0, 40.0),
            block_at("DATE (MM/DD/YYYY)", 2000.0, 100.0),
            block_at("AGENCY", 100.0, 300.0),
            block_at("Acme Agency", 100.0, 350.0),
            block_at("DRIVER INFORMATION", 100.0, 700.0),
            block_at("Lisa", 250.0, 800.0),
        ];
        vec![build_index(0, &blocks, &SpatialConfig::default())]
    }

    #[test]
    fn sections_span_to_next_header() {
        let sections = SectionDetector::for_form("127").detect(&page());
        let ids: Vec<&str> = sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["header_date", "producer", "driver_table"]);
        assert_eq!(sections[0].y_start, 0.0);
        assert_eq!(sections[0].row_count, 2);
        assert_eq!(sections[1].y_start, 290.0);
        assert_eq!(sections[1].y_end, 690.0);
        assert!(sections[2].categories.contains(&"driver".to_string()));
    }

    #[test]
    fn no_header_is_full_page() {
        let blocks = vec![block_at("hello", 10.0, 10.0)];
        let pages = vec![build_index(0, &blocks, &SpatialConfig::default())];
        let sections = SectionDetector::for_form("137").detect(&pages);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].id, "full_page");
    }

    #[test]
    fn unknown_form_has_no_sections() {
        assert!(SectionDetector::for_form("999").detect(&page()).is_empty());
    }

    #[test]
    fn category_lookup() {
        let sections = SectionDetector::for_form("127").detect(&page());
        let driver = sections_for(&sections, "driver");
        assert_eq!(driver.len(), 1);
        assert_eq!(driver[0].id, "driver_table");
        assert_eq!(SectionTable::for_form("125").sections_for("named_insured"), &["applicant_info"]);
    }
}
