//! Market intelligence collaborator: public web signals per competitor.
//!
//! Scrapes a fixed table of IR pages, newsrooms, and financial sources,
//! reduces each page to text, and asks the LLM for up to three bullets per
//! competitor. Any single source failing is logged and skipped; synthesis
//! failure degrades to an empty map so the weekly cycle never dies here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use regex::Regex;
use serde_json::Value;
use url::Url;

use crate::competitors::MARKET_INTEL_COMPETITORS;
use crate::synthesizer::OpenAiClient;

/// Hard cap on bullets per competitor, enforced on collaborator output.
pub const MAX_BULLETS_PER_COMPETITOR: usize = 3;

/// Page text passed to synthesis is truncated to this many characters.
const MAX_PAGE_CHARS: usize = 6000;

/// Pages with less extracted text than this are treated as empty shells.
const MIN_PAGE_CHARS: usize = 100;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// One market-intelligence bullet for a competitor.
#[derive(Debug, Clone, PartialEq)]
pub struct IntelBullet {
    pub bullet: String,
    /// Validated source URL; collaborator output that isn't a real URL is
    /// dropped to None rather than published.
    pub source_url: Option<String>,
}

pub struct Source {
    pub name: &'static str,
    pub url: &'static str,
}

pub const COMPETITOR_SOURCES: &[(&str, &[Source])] = &[
    (
        "Veeva Systems",
        &[
            Source {
                name: "Veeva Newsroom",
                url: "https://www.veeva.com/resources/newsroom/",
            },
            Source {
                name: "Finviz - VEEV",
                url: "https://finviz.com/quote.ashx?t=VEEV",
            },
        ],
    ),
    (
        "Definitive Healthcare",
        &[
            Source {
                name: "DH Investor Relations",
                url: "https://ir.definitivehc.com/news-and-events/news-releases",
            },
            Source {
                name: "DH Blog",
                url: "https://www.definitivehc.com/blog",
            },
            Source {
                name: "Finviz - DH",
                url: "https://finviz.com/quote.ashx?t=DH",
            },
        ],
    ),
    (
        "Alpha Sophia",
        &[Source {
            name: "Alpha Sophia Blog",
            url: "https://www.alphasophia.com/blog",
        }],
    ),
    (
        "IQVIA",
        &[
            Source {
                name: "IQVIA Newsroom",
                url: "https://www.iqvia.com/newsroom",
            },
            Source {
                name: "Finviz - IQV",
                url: "https://finviz.com/quote.ashx?t=IQV",
            },
        ],
    ),
];

// ============================================================================
// Provider boundary
// ============================================================================

#[async_trait]
pub trait IntelProvider: Send + Sync {
    /// Collect bullets keyed by competitor. Every tracked competitor is
    /// present in the result, possibly with an empty list, so downstream
    /// rendering can tell "no data" from "not asked".
    async fn collect(&self) -> HashMap<String, Vec<IntelBullet>>;
}

pub struct MarketIntelCollector {
    http: reqwest::Client,
    llm: Arc<OpenAiClient>,
}

impl MarketIntelCollector {
    pub fn new(llm: Arc<OpenAiClient>) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
        }
    }

    async fn fetch_page(&self, url: &str) -> Option<String> {
        let result = self
            .http
            .get(url)
            .timeout(FETCH_TIMEOUT)
            .header(
                reqwest::header::USER_AGENT,
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
            )
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(response) => response.text().await.ok(),
            Err(e) => {
                log::warn!("Failed to fetch {}: {}", url, e);
                None
            }
        }
    }

    /// Fetch raw page text for every source of every tracked competitor.
    async fn fetch_updates(&self) -> HashMap<String, Vec<(String, String, String)>> {
        let mut all_updates = HashMap::new();

        for (competitor, sources) in COMPETITOR_SOURCES {
            let mut updates = Vec::new();
            for source in *sources {
                log::info!("Fetching {} for {}...", source.name, competitor);
                let Some(html) = self.fetch_page(source.url).await else {
                    continue;
                };
                let content = extract_page_content(&html, MAX_PAGE_CHARS);
                if content.trim().len() > MIN_PAGE_CHARS {
                    updates.push((source.name.to_string(), source.url.to_string(), content));
                }
            }
            log::info!("Collected {} sources for {}", updates.len(), competitor);
            all_updates.insert(competitor.to_string(), updates);
        }

        all_updates
    }
}

#[async_trait]
impl IntelProvider for MarketIntelCollector {
    async fn collect(&self) -> HashMap<String, Vec<IntelBullet>> {
        log::info!("Starting market intelligence collection...");
        let updates = self.fetch_updates().await;

        let total_sources: usize = updates.values().map(Vec::len).sum();
        if total_sources == 0 {
            log::warn!("No web sources could be fetched, skipping market intel synthesis");
            return empty_intel();
        }

        let prompt = synthesis_prompt(&updates);
        match self
            .llm
            .chat_json(
                "You are a competitive intelligence analyst. Return only valid JSON.",
                &prompt,
            )
            .await
        {
            Ok(value) => {
                let intel = parse_intel(&value);
                let total: usize = intel.values().map(Vec::len).sum();
                log::info!("Market intel complete: {} bullets", total);
                intel
            }
            Err(e) => {
                log::error!("Failed to synthesize market intel: {}", e);
                empty_intel()
            }
        }
    }
}

/// An empty list for every tracked competitor.
pub fn empty_intel() -> HashMap<String, Vec<IntelBullet>> {
    MARKET_INTEL_COMPETITORS
        .iter()
        .map(|comp| (comp.to_string(), Vec::new()))
        .collect()
}

/// Reduce an HTML page to plain text: render, collapse blank runs, truncate.
pub fn extract_page_content(html: &str, max_chars: usize) -> String {
    static BLANK_RUNS: OnceLock<Regex> = OnceLock::new();
    let blank_runs = BLANK_RUNS.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"));

    let text = match html2text::from_read(html.as_bytes(), 80) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("HTML extraction failed: {}", e);
            return String::new();
        }
    };

    let collapsed = blank_runs.replace_all(&text, "\n\n").into_owned();
    truncate_at_char_boundary(collapsed, max_chars)
}

fn truncate_at_char_boundary(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text
}

fn synthesis_prompt(updates: &HashMap<String, Vec<(String, String, String)>>) -> String {
    let mut context = String::new();
    for competitor in MARKET_INTEL_COMPETITORS {
        let sources = updates.get(*competitor).map(Vec::as_slice).unwrap_or_default();
        if sources.is_empty() {
            context.push_str(&format!("\n=== {} ===\nNo data collected this week.\n", competitor));
            continue;
        }
        context.push_str(&format!("\n=== {} ===", competitor));
        for (name, url, content) in sources {
            context.push_str(&format!("\n--- Source: {} ({}) ---\n", name, url));
            context.push_str(content);
        }
    }

    let today = Utc::now();
    let week_ago = today - ChronoDuration::days(7);

    format!(
        r#"You are a competitive intelligence analyst for AcuityMD, a medtech commercial intelligence platform.

Analyze the following scraped web content from competitor sources. For each competitor, produce UP TO 3 concise bullets summarizing the most important recent developments and their competitive implications for AcuityMD.

Competitors: {competitors}

Today's date: {today}
Focus window: Past 7 days ({week_start} - {today})

Guidelines:
- Each bullet should have a **bold lead-in phrase** followed by 1-2 sentences of context/implication
- Focus on: product announcements, earnings/financial signals, partnerships, strategic moves, content shifts, and anything that affects AcuityMD's competitive position
- If a competitor has no meaningful recent news, return an empty array for them - don't force bullets
- Prioritize actionable intelligence over general observations
- Include the source URL for each bullet (use the source URL provided, not a fabricated one)
- Maximum 3 bullets per competitor, fewer is fine

Scraped content:
{context}

Return your analysis as a JSON object keyed by competitor name, where each value is an array of objects with keys "bullet" and "source_url". Only return valid JSON. If no meaningful intelligence exists for a competitor, use an empty array."#,
        competitors = MARKET_INTEL_COMPETITORS.join(", "),
        today = today.format("%B %d, %Y"),
        week_start = week_ago.format("%B %d"),
        context = context,
    )
}

/// Validate and cap the collaborator's response. Every tracked competitor
/// is present in the output; invalid source URLs are dropped to None.
pub fn parse_intel(value: &Value) -> HashMap<String, Vec<IntelBullet>> {
    let mut intel = HashMap::new();

    for competitor in MARKET_INTEL_COMPETITORS {
        let bullets = value
            .get(*competitor)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(parse_bullet)
                    .take(MAX_BULLETS_PER_COMPETITOR)
                    .collect()
            })
            .unwrap_or_default();
        intel.insert(competitor.to_string(), bullets);
    }

    intel
}

fn parse_bullet(value: &Value) -> Option<IntelBullet> {
    let bullet = value
        .get("bullet")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    let source_url = value
        .get("source_url")
        .and_then(Value::as_str)
        .filter(|raw| Url::parse(raw).is_ok())
        .map(str::to_string);

    Some(IntelBullet { bullet, source_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_page_content_collapses_and_truncates() {
        let html = "<html><body><p>First</p><br><br><br><br><p>Second</p></body></html>";
        let text = extract_page_content(html, 6000);
        assert!(text.contains("First"));
        assert!(text.contains("Second"));
        assert!(!text.contains("\n\n\n"));

        let long = format!("<p>{}</p>", "x".repeat(9000));
        assert!(extract_page_content(&long, 6000).len() <= 6000);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(10); // 2 bytes per char
        let truncated = truncate_at_char_boundary(text, 5);
        assert_eq!(truncated.chars().count(), 2);
    }

    #[test]
    fn test_parse_intel_caps_and_validates() {
        let value = json!({
            "IQVIA": [
                { "bullet": "**Earnings beat.** Revenue up.", "source_url": "https://finviz.com/quote.ashx?t=IQV" },
                { "bullet": "**Fabricated link.** Watch out.", "source_url": "not a url" },
                { "bullet": "**Third.**" },
                { "bullet": "**Fourth, over the cap.**" }
            ],
            "Veeva Systems": []
        });

        let intel = parse_intel(&value);

        let iqvia = &intel["IQVIA"];
        assert_eq!(iqvia.len(), MAX_BULLETS_PER_COMPETITOR);
        assert_eq!(
            iqvia[0].source_url.as_deref(),
            Some("https://finviz.com/quote.ashx?t=IQV")
        );
        assert!(iqvia[1].source_url.is_none());

        // Every tracked competitor is present even when absent from the response
        assert!(intel.contains_key("Alpha Sophia"));
        assert!(intel["Alpha Sophia"].is_empty());
    }

    #[test]
    fn test_parse_intel_malformed_shape() {
        let intel = parse_intel(&json!({ "IQVIA": "not an array" }));
        assert!(intel["IQVIA"].is_empty());
        assert_eq!(intel.len(), MARKET_INTEL_COMPETITORS.len());
    }

    #[test]
    fn test_empty_bullet_text_skipped() {
        let value = json!({ "IQVIA": [ { "bullet": "  " } ] });
        assert!(parse_intel(&value)["IQVIA"].is_empty());
    }

    #[test]
    fn test_empty_intel_covers_all_competitors() {
        let intel = empty_intel();
        assert_eq!(intel.len(), MARKET_INTEL_COMPETITORS.len());
        assert!(intel.values().all(Vec::is_empty));
    }
}
