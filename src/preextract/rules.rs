//! Anchor and schedule tables for the supported ACORD forms.
//!
//! Coordinates are in pixels of a 300 dpi letter-size scan (about
//! 2550 × 3300). Anchor regions bound the anchor's left edge and vertical
//! center; read windows are relative to the same point.

use super::classify::{ContentClass, ValueShape};
use super::rows::{ColumnRule, RowTableRule};
use super::{AnchorRule, FormRules, ReadRule, Region};

/// Captions that appear inside value windows and must never be read as
/// values.
pub const COMMON_LABELS: &[&str] = &[
    "agency", "carrier", "naic code", "naic", "code", "date", "policy number",
    "effective date", "expiration date", "named insured", "named insured(s)",
    "producer", "date (mm/dd/yyyy)", "company", "proposed eff date",
    "proposed exp date", "billing plan", "payment plan", "method of payment",
    "audit", "deposit", "premium", "minimum", "policy premium",
    "applicant information section", "commercial insurance application",
    "business auto section", "agency customer id", "agency customer id:", "acord",
    "status of", "transaction", "underwriter", "underwriter office", "program code",
    "subcode", "gl code", "sic", "naics", "fein or soc sec #", "coverages", "limits",
    "indicate lines of business", "company policy or program name",
];

const fn below(dy: (f64, f64), dx: (f64, f64)) -> ReadRule {
    ReadRule::Below { dy, dx }
}

const fn anchor(
    field_key: &'static str,
    text: &'static str,
    region: Region,
    read: ReadRule,
    shape: ValueShape,
) -> AnchorRule {
    AnchorRule {
        field_key,
        anchor: text,
        page: 0,
        region,
        read,
        shape,
    }
}

const HEADER_DATE: Region = Region::new((1800.0, f64::MAX), (0.0, 300.0));
const LEFT_TOP: Region = Region::new((0.0, 600.0), (0.0, 400.0));

/// ACORD 125, Commercial Insurance Application.
pub fn acord_125() -> FormRules {
    FormRules {
        form_type: "125",
        anchors: vec![
            anchor("Form_CompletionDate_A", "DATE", HEADER_DATE, below((20.0, 100.0), (0.0, 700.0)), ValueShape::Date),
            anchor(
                "Insurer_FullName_A",
                "CARRIER",
                Region::new((900.0, f64::MAX), (0.0, 400.0)),
                below((20.0, 120.0), (-200.0, 800.0)),
                ValueShape::Entity,
            ),
            anchor(
                "Insurer_NAICCode_A",
                "NAIC CODE",
                Region::new((1800.0, f64::MAX), (0.0, 400.0)),
                below((20.0, 120.0), (-100.0, 200.0)),
                ValueShape::Naic,
            ),
            anchor("Producer_FullName_A", "AGENCY", LEFT_TOP, below((20.0, 120.0), (-100.0, 700.0)), ValueShape::Entity),
            anchor(
                "Policy_PolicyNumberIdentifier_A",
                "POLICY NUMBER",
                Region::new((900.0, f64::MAX), (0.0, 600.0)),
                below((20.0, 100.0), (-200.0, 600.0)),
                ValueShape::PolicyNumber,
            ),
            anchor(
                "Policy_EffectiveDate_A",
                "PROPOSED EFF DATE",
                Region::new((0.0, f64::MAX), (1700.0, 2000.0)),
                below((20.0, 100.0), (-100.0, 300.0)),
                ValueShape::Date,
            ),
            anchor(
                "Policy_ExpirationDate_A",
                "PROPOSED EXP DATE",
                Region::new((0.0, f64::MAX), (1700.0, 2000.0)),
                below((20.0, 100.0), (-100.0, 300.0)),
                ValueShape::Date,
            ),
            anchor(
                "Billing_Plan",
                "BILLING PLAN",
                Region::new((0.0, f64::MAX), (1700.0, 2000.0)),
                below((20.0, 100.0), (-100.0, 300.0)),
                ValueShape::Text { min_len: 3 },
            ),
            anchor(
                "Payment_Plan",
                "PAYMENT PLAN",
                Region::new((0.0, f64::MAX), (1700.0, 2000.0)),
                below((20.0, 100.0), (-100.0, 300.0)),
                ValueShape::Text { min_len: 3 },
            ),
            anchor(
                "NamedInsured_FullName_A",
                "NAME (FIRST NAMED",
                Region::new((0.0, f64::MAX), (1900.0, 2200.0)),
                below((20.0, 100.0), (-100.0, 700.0)),
                ValueShape::Entity,
            ),
            anchor(
                "NamedInsured_TaxIdentifier_A",
                "FEIN OR SOC SEC",
                Region::new((1800.0, f64::MAX), (1900.0, 2200.0)),
                below((10.0, 120.0), (-200.0, 400.0)),
                ValueShape::TaxId,
            ),
            anchor(
                "Producer_ContactPerson_PhoneNumber_A",
                "PHONE",
                Region::new((0.0, 1200.0), (300.0, 900.0)),
                ReadRule::RightOf { max_gap: 400.0 },
                ValueShape::Phone,
            ),
            anchor(
                "Producer_ContactPerson_EmailAddress_A",
                "E-MAIL ADDRESS",
                Region::new((0.0, 1200.0), (300.0, 900.0)),
                ReadRule::RightOf { max_gap: 400.0 },
                ValueShape::Email,
            ),
        ],
        tables: Vec::new(),
    }
}

fn auto_header(insured_region: Region, carrier_region: Region, naic_region: Region) -> Vec<AnchorRule> {
    vec![
        anchor("Form_CompletionDate_A", "DATE", HEADER_DATE, below((20.0, 100.0), (0.0, 700.0)), ValueShape::Date),
        anchor("Producer_FullName_A", "AGENCY", LEFT_TOP, below((20.0, 100.0), (-100.0, 700.0)), ValueShape::Entity),
        anchor(
            "Insurer_FullName_A",
            "CARRIER",
            carrier_region,
            below((20.0, 100.0), (-200.0, 700.0)),
            ValueShape::Entity,
        ),
        anchor(
            "Insurer_NAICCode_A",
            "NAIC CODE",
            naic_region,
            below((20.0, 100.0), (-100.0, 200.0)),
            ValueShape::Naic,
        ),
        anchor(
            "Policy_PolicyNumberIdentifier_A",
            "POLICY NUMBER",
            Region::new((0.0, 600.0), (0.0, 500.0)),
            below((20.0, 100.0), (-100.0, 600.0)),
            ValueShape::PolicyNumber,
        ),
        anchor(
            "Policy_EffectiveDate_A",
            "EFFECTIVE DATE",
            Region::new((900.0, 1400.0), (0.0, 500.0)),
            below((20.0, 100.0), (-100.0, 250.0)),
            ValueShape::Date,
        ),
        anchor(
            "NamedInsured_FullName_A",
            "NAMED INSURED",
            insured_region,
            below((20.0, 100.0), (-50.0, 800.0)),
            ValueShape::Entity,
        ),
    ]
}

/// The driver schedule of ACORD 127, page 1.
pub fn driver_schedule() -> RowTableRule {
    RowTableRule {
        page: 0,
        y_range: (700.0, 2050.0),
        columns: vec![
            ColumnRule::ignored((0.0, 180.0), ValueShape::Count),
            ColumnRule::new("Driver_GivenName", (190.0, 285.0), ValueShape::PersonName)
                .with_class(ContentClass::PersonName),
            ColumnRule::new("Driver_MailingAddress_CityName", (285.0, 500.0), ValueShape::Place)
                .with_class(ContentClass::Place),
            ColumnRule::new("Driver_MailingAddress_StateOrProvinceCode", (560.0, 700.0), ValueShape::StateCode),
            ColumnRule::new("Driver_Surname", (560.0, 700.0), ValueShape::PersonName),
            ColumnRule::new("Driver_MailingAddress_PostalCode", (695.0, 780.0), ValueShape::Zip),
            ColumnRule::new("Driver_GenderCode", (850.0, 930.0), ValueShape::Sex),
            ColumnRule::new("Driver_MaritalStatusCode", (935.0, 975.0), ValueShape::Marital),
            ColumnRule::new("Driver_BirthDate", (1080.0, 1160.0), ValueShape::Date),
            ColumnRule::new("Driver_ExperienceYearCount", (1270.0, 1310.0), ValueShape::Count),
            ColumnRule::new("Driver_LicensedYear", (1360.0, 1400.0), ValueShape::Year),
            ColumnRule::new("Driver_LicenseNumberIdentifier", (1500.0, 1620.0), ValueShape::License),
            ColumnRule::new("Driver_TaxIdentifier", (1520.0, 1610.0), ValueShape::TaxId),
            ColumnRule::new("Driver_LicensedStateOrProvinceCode", (1830.0, 1920.0), ValueShape::StateCode),
        ],
        key_columns: vec![
            "Driver_MailingAddress_PostalCode",
            "Driver_GenderCode",
            "Driver_BirthDate",
        ],
        max_rows: 13,
    }
}

/// ACORD 127, Business Auto Section.
pub fn acord_127() -> FormRules {
    FormRules {
        form_type: "127",
        anchors: auto_header(
            Region::new((1200.0, f64::MAX), (0.0, 500.0)),
            Region::new((900.0, f64::MAX), (0.0, 400.0)),
            Region::new((1800.0, f64::MAX), (0.0, 400.0)),
        ),
        tables: vec![driver_schedule()],
    }
}

/// ACORD 137, Commercial Auto Vehicle Schedule.
pub fn acord_137() -> FormRules {
    let mut anchors = auto_header(
        Region::new((1200.0, f64::MAX), (0.0, 400.0)),
        Region::new((1200.0, f64::MAX), (0.0, 500.0)),
        Region::new((1800.0, f64::MAX), (0.0, 500.0)),
    );
    anchors.push(anchor(
        "Producer_CustomerIdentifier_A",
        "AGENCY CUSTOMER ID",
        Region::new((1200.0, f64::MAX), (0.0, 200.0)),
        ReadRule::RightOf { max_gap: 800.0 },
        ValueShape::TaxId,
    ));
    FormRules {
        form_type: "137",
        anchors,
        tables: Vec::new(),
    }
}

/// Built-in rules for `form_type`; empty for unknown forms.
pub fn for_form(form_type: &str) -> FormRules {
    match form_type {
        "125" => acord_125(),
        "127" => acord_127(),
        "137" => acord_137(),
        _ => FormRules::default(),
    }
}
