//! Digest composition: merge call insights and market-intel bullets into a
//! single, stably ordered structure.
//!
//! Competitor sections follow the fixed display order; competitors the
//! synthesizer named that aren't in the fixed order land in a catch-all
//! bucket at the end. Same inputs always produce the same ordering.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use crate::competitors::{in_display_order, DISPLAY_ORDER};
use crate::market_intel::{IntelBullet, MAX_BULLETS_PER_COMPETITOR};
use crate::synthesizer::{Insight, MAX_INSIGHTS};

// ============================================================================
// Date range
// ============================================================================

/// Half-open analysis window, kept as inclusive endpoints for the API's
/// from/to filter (the `to` edge sits one microsecond before the boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// The previous calendar week, Monday 00:00:00 through Sunday
    /// 23:59:59.999999, relative to `now`.
    pub fn previous_week(now: DateTime<Utc>) -> Self {
        let days_since_monday = now.weekday().num_days_from_monday() as i64;
        let current_week_monday = (now - Duration::days(days_since_monday))
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();

        DateRange {
            from: current_week_monday - Duration::days(7),
            to: current_week_monday - Duration::microseconds(1),
        }
    }

    pub fn from_iso(&self) -> String {
        self.from.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
    }

    pub fn to_iso(&self) -> String {
        self.to.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
    }

    /// Human-readable endpoints for digest headers, e.g. "January 06, 2025".
    pub fn labels(&self) -> (String, String) {
        (
            self.from.format("%B %d, %Y").to_string(),
            self.to.format("%B %d, %Y").to_string(),
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.from_iso(), self.to_iso())
    }
}

// ============================================================================
// Composed digest
// ============================================================================

#[derive(Debug, Clone)]
pub struct ComposedDigest {
    pub insights: Vec<Insight>,
    pub intel: HashMap<String, Vec<IntelBullet>>,
    pub range: DateRange,
}

impl ComposedDigest {
    /// Merge synthesizer insights and market-intel bullets, enforcing the
    /// per-digest and per-competitor caps defensively even though the
    /// collaborators should already respect them.
    pub fn compose(
        mut insights: Vec<Insight>,
        mut intel: HashMap<String, Vec<IntelBullet>>,
        range: DateRange,
    ) -> Self {
        insights.truncate(MAX_INSIGHTS);
        for bullets in intel.values_mut() {
            bullets.truncate(MAX_BULLETS_PER_COMPETITOR);
        }
        ComposedDigest {
            insights,
            intel,
            range,
        }
    }

    /// Competitor sections in display order: a competitor appears iff it
    /// has at least one insight or one bullet. Competitors outside the
    /// fixed order (named only by the synthesizer) are appended last in
    /// first-seen order.
    pub fn active_competitors(&self) -> Vec<String> {
        let mut active: Vec<String> = DISPLAY_ORDER
            .iter()
            .filter(|comp| self.has_insights(comp) || self.has_intel(comp))
            .map(|comp| comp.to_string())
            .collect();

        for insight in &self.insights {
            if !in_display_order(&insight.competitor) && !active.contains(&insight.competitor) {
                active.push(insight.competitor.clone());
            }
        }

        active
    }

    pub fn insights_for(&self, competitor: &str) -> Vec<&Insight> {
        self.insights
            .iter()
            .filter(|i| i.competitor == competitor)
            .collect()
    }

    pub fn intel_for(&self, competitor: &str) -> &[IntelBullet] {
        self.intel
            .get(competitor)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.active_competitors().is_empty()
    }

    pub fn has_any_intel(&self) -> bool {
        self.intel.values().any(|bullets| !bullets.is_empty())
    }

    fn has_insights(&self, competitor: &str) -> bool {
        self.insights.iter().any(|i| i.competitor == competitor)
    }

    fn has_intel(&self, competitor: &str) -> bool {
        self.intel
            .get(competitor)
            .is_some_and(|bullets| !bullets.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthesizer::{InsightCategory, Sentiment};
    use chrono::TimeZone;

    fn insight(competitor: &str) -> Insight {
        Insight {
            competitor: competitor.to_string(),
            category: InsightCategory::Pricing,
            summary: format!("{competitor} summary"),
            quote: None,
            sentiment: Sentiment::Neutral,
            call_title: "Call".to_string(),
            call_date: "2025-01-02".to_string(),
            call_id: None,
        }
    }

    fn bullet(text: &str) -> IntelBullet {
        IntelBullet {
            bullet: text.to_string(),
            source_url: None,
        }
    }

    fn week_range() -> DateRange {
        DateRange::previous_week(Utc.with_ymd_and_hms(2025, 1, 8, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_previous_week_window() {
        // 2025-01-08 is a Wednesday; previous week is Dec 30 through Jan 5.
        let range = week_range();
        assert_eq!(range.from_iso(), "2024-12-30T00:00:00.000000Z");
        assert_eq!(range.to_iso(), "2025-01-05T23:59:59.999999Z");
    }

    #[test]
    fn test_previous_week_from_a_monday() {
        let monday = Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap();
        let range = DateRange::previous_week(monday);
        assert_eq!(range.from_iso(), "2024-12-30T00:00:00.000000Z");
    }

    #[test]
    fn test_range_labels() {
        let (from, to) = week_range().labels();
        assert_eq!(from, "December 30, 2024");
        assert_eq!(to, "January 05, 2025");
    }

    #[test]
    fn test_active_competitors_follow_display_order() {
        let intel = HashMap::from([
            ("IQVIA".to_string(), vec![bullet("earnings beat")]),
            ("Veeva Systems".to_string(), vec![bullet("new product")]),
        ]);
        let digest = ComposedDigest::compose(
            vec![insight("RepSignal"), insight("MedScout")],
            intel,
            week_range(),
        );

        assert_eq!(
            digest.active_competitors(),
            vec!["Veeva Systems", "IQVIA", "MedScout", "RepSignal"]
        );
    }

    #[test]
    fn test_ordering_is_stable_across_calls() {
        let digest = ComposedDigest::compose(
            vec![insight("MedScout"), insight("Veeva Systems")],
            HashMap::new(),
            week_range(),
        );
        let first = digest.active_competitors();
        for _ in 0..5 {
            assert_eq!(digest.active_competitors(), first);
        }
    }

    #[test]
    fn test_unknown_competitor_appended_last() {
        let digest = ComposedDigest::compose(
            vec![insight("Unknown"), insight("MedScout")],
            HashMap::new(),
            week_range(),
        );
        assert_eq!(digest.active_competitors(), vec!["MedScout", "Unknown"]);
    }

    #[test]
    fn test_empty_intel_list_not_active() {
        let intel = HashMap::from([("IQVIA".to_string(), Vec::new())]);
        let digest = ComposedDigest::compose(Vec::new(), intel, week_range());
        assert!(digest.is_empty());
        assert!(!digest.has_any_intel());
    }

    #[test]
    fn test_insight_cap_enforced() {
        let insights: Vec<Insight> = (0..8).map(|_| insight("MedScout")).collect();
        let digest = ComposedDigest::compose(insights, HashMap::new(), week_range());
        assert_eq!(digest.insights.len(), MAX_INSIGHTS);
    }

    #[test]
    fn test_bullet_cap_enforced() {
        let intel = HashMap::from([(
            "IQVIA".to_string(),
            (0..5).map(|i| bullet(&format!("b{i}"))).collect::<Vec<_>>(),
        )]);
        let digest = ComposedDigest::compose(Vec::new(), intel, week_range());
        assert_eq!(digest.intel_for("IQVIA").len(), MAX_BULLETS_PER_COMPETITOR);
    }
}
