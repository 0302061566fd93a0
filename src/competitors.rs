//! Tracked competitor lists and the fixed display order.
//!
//! The display order is intentionally a fixed total order (not alphabetical,
//! not insertion order) so the weekly digest reads the same way every week.

/// Competitors matched against call transcripts.
pub const CALL_COMPETITORS: &[&str] = &["MedScout", "Definitive Healthcare", "RepSignal"];

/// Competitors tracked through public market signals.
pub const MARKET_INTEL_COMPETITORS: &[&str] = &[
    "Veeva Systems",
    "Definitive Healthcare",
    "Alpha Sophia",
    "IQVIA",
];

/// Combined display order for digest sections.
pub const DISPLAY_ORDER: &[&str] = &[
    "Veeva Systems",
    "Definitive Healthcare",
    "IQVIA",
    "MedScout",
    "RepSignal",
    "Alpha Sophia",
];

pub fn in_display_order(name: &str) -> bool {
    DISPLAY_ORDER.contains(&name)
}
