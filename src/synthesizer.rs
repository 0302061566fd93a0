//! Insight synthesis boundary.
//!
//! Turns batches of transcript mentions into structured competitive
//! insights via an LLM. The synthesizer is a collaborator: rate limiting is
//! retried with backoff then degraded to an empty result set, and malformed
//! output coerces to empty rather than failing the cycle. An insight is
//! never fabricated without a backing mention batch.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::competitors::CALL_COMPETITORS;
use crate::error::BotError;
use crate::gong::sanitize_call_id;
use crate::mentions::{group_by_call, Mention};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Upper bound on insights per digest, enforced on the synthesizer output.
pub const MAX_INSIGHTS: usize = 6;

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

// ============================================================================
// Domain types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Favorable,
    Unfavorable,
    Neutral,
}

impl Sentiment {
    /// Absent or garbled sentiment coerces to Neutral, never dropped.
    pub fn from_label(raw: Option<&str>) -> Self {
        let lowered = raw.unwrap_or("").trim().to_lowercase();
        if lowered.starts_with("unfavorable") {
            Sentiment::Unfavorable
        } else if lowered.starts_with("favorable") {
            Sentiment::Favorable
        } else {
            Sentiment::Neutral
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Sentiment::Favorable => "Favorable to AcuityMD",
            Sentiment::Unfavorable => "Unfavorable to AcuityMD",
            Sentiment::Neutral => "Neutral",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Sentiment::Favorable => ":large_green_circle:",
            Sentiment::Unfavorable => ":red_circle:",
            Sentiment::Neutral => ":white_circle:",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightCategory {
    Pricing,
    Functionality,
    Usability,
    Support,
    Integrations,
    DataQuality,
    Performance,
}

impl InsightCategory {
    /// Permissive label parsing; unknown labels fall back to Functionality
    /// rather than dropping the insight.
    pub fn from_label(raw: Option<&str>) -> Self {
        let lowered = raw.unwrap_or("").trim().to_lowercase();
        if lowered.contains("pric") {
            InsightCategory::Pricing
        } else if lowered.contains("usab") || lowered.contains("ux") {
            InsightCategory::Usability
        } else if lowered.contains("support") || lowered.contains("service") {
            InsightCategory::Support
        } else if lowered.contains("integrat") {
            InsightCategory::Integrations
        } else if lowered.contains("data") || lowered.contains("coverage") {
            InsightCategory::DataQuality
        } else if lowered.contains("performance")
            || lowered.contains("reliab")
            || lowered.contains("speed")
        {
            InsightCategory::Performance
        } else {
            InsightCategory::Functionality
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            InsightCategory::Pricing => "Pricing",
            InsightCategory::Functionality => "Functionality",
            InsightCategory::Usability => "Usability/UX",
            InsightCategory::Support => "Support/Service",
            InsightCategory::Integrations => "Integrations",
            InsightCategory::DataQuality => "Data Quality/Coverage",
            InsightCategory::Performance => "Performance/Reliability/Speed",
        }
    }
}

/// A structured competitive-intelligence claim derived from call mentions.
#[derive(Debug, Clone, PartialEq)]
pub struct Insight {
    pub competitor: String,
    pub category: InsightCategory,
    pub summary: String,
    /// Verbatim quote, only when the synthesizer supplied one.
    pub quote: Option<String>,
    pub sentiment: Sentiment,
    pub call_title: String,
    pub call_date: String,
    pub call_id: Option<String>,
}

impl Insight {
    /// Parse one insight object from collaborator JSON. Entries without a
    /// competitor or summary are skipped.
    fn from_value(value: &Value) -> Option<Self> {
        let competitor = non_empty_str(value.get("competitor"))?;
        let summary = non_empty_str(value.get("summary"))?;

        Some(Insight {
            competitor,
            category: InsightCategory::from_label(value.get("category").and_then(Value::as_str)),
            summary,
            quote: non_empty_str(value.get("quote")),
            sentiment: Sentiment::from_label(value.get("sentiment").and_then(Value::as_str)),
            call_title: non_empty_str(value.get("call_title"))
                .unwrap_or_else(|| "Unknown Call".to_string()),
            call_date: non_empty_str(value.get("call_date"))
                .unwrap_or_else(|| "Unknown Date".to_string()),
            call_id: non_empty_str(value.get("call_id")).map(|id| sanitize_call_id(&id)),
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Synthesizer boundary
// ============================================================================

#[async_trait]
pub trait InsightSynthesizer: Send + Sync {
    /// Synthesize insights from a mention batch. Degrades to empty on
    /// collaborator failure; never errors out of the generation cycle.
    async fn synthesize(&self, mentions: &[Mention]) -> Vec<Insight>;
}

/// OpenAI chat-completions client, shared by the insight synthesizer and
/// the market-intel collaborator.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            retry: RetryPolicy::default(),
        }
    }

    /// One JSON-mode chat completion. Returns the parsed message content.
    pub async fn chat_json(&self, system: &str, prompt: &str) -> Result<Value, BotError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.3,
            "response_format": { "type": "json_object" }
        });

        let body = retry_with_backoff(&self.retry, BotError::is_rate_limit, || {
            let request = self
                .http
                .post(OPENAI_CHAT_URL)
                .bearer_auth(&self.api_key)
                .json(&payload);
            async move {
                let response = request.send().await?;
                let status = response.status();
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    return Err(BotError::RateLimited);
                }
                if !status.is_success() {
                    let message = response.text().await.unwrap_or_default();
                    return Err(BotError::Api {
                        status: status.as_u16(),
                        message,
                    });
                }
                Ok(response.json::<Value>().await?)
            }
        })
        .await?;

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BotError::Api {
                status: 200,
                message: "completion response missing message content".to_string(),
            })?;

        Ok(serde_json::from_str(content)?)
    }
}

#[async_trait]
impl InsightSynthesizer for OpenAiClient {
    async fn synthesize(&self, mentions: &[Mention]) -> Vec<Insight> {
        if mentions.is_empty() {
            return Vec::new();
        }

        let prompt = analysis_prompt(mentions);
        match self
            .chat_json(
                "You are a competitive intelligence analyst. Return only valid JSON.",
                &prompt,
            )
            .await
        {
            Ok(value) => {
                let insights = parse_insights(&value);
                log::info!("Synthesized {} insights", insights.len());
                insights
            }
            Err(e) => {
                log::error!("Insight synthesis failed, continuing without insights: {}", e);
                Vec::new()
            }
        }
    }
}

/// Assemble the analyst prompt from mention excerpts grouped by call.
fn analysis_prompt(mentions: &[Mention]) -> String {
    let mut context = String::new();
    for group in group_by_call(mentions) {
        context.push_str(&format!(
            "\n\n--- Call: {} (Date: {}, Call ID: {}) ---\n",
            group.call_title, group.call_date, group.call_id
        ));
        for mention in &group.mentions {
            context.push_str(&format!(
                "\n[{} - {}]: \"{}\"\nCompetitors mentioned: {}\n",
                mention.speaker,
                mention.affiliation.label(),
                mention.text,
                mention.competitors.join(", ")
            ));
        }
    }

    format!(
        r#"You are a competitive intelligence analyst for AcuityMD. Analyze the following transcript excerpts from sales calls where external speakers (prospects/customers) mentioned competitors.

Competitors to track: {competitors}

Extract 3-6 insights (only if they genuinely exist - don't force insights). Each insight should:
1. Compare competitor vs AcuityMD (favorably or unfavorably), OR
2. Describe a competitor's feature advantage, strength, weakness, or gap

Insight categories to focus on:
- Pricing
- Functionality
- Usability/UX
- Support/Service
- Integrations
- Data Quality/Coverage
- Performance/Reliability/Speed

For each insight, provide:
1. Competitor name
2. Category (from the list above)
3. Summary (2-3 sentences summarizing what was said)
4. Direct quote (ONLY if the quote explicitly names the competitor - otherwise omit)
5. Sentiment: Favorable to AcuityMD, Unfavorable to AcuityMD, or Neutral
6. Call title, date, and call_id for reference (call_id is provided in each call header)

IMPORTANT: Only include insights where external speakers genuinely shared competitive intelligence. Don't manufacture insights if the mentions are vague or off-topic.

Transcript excerpts:
{context}

Return your analysis as a JSON array of insight objects with keys: competitor, category, summary, quote (optional), sentiment, call_title, call_date, call_id"#,
        competitors = CALL_COMPETITORS.join(", "),
        context = context,
    )
}

/// Parse the collaborator's response: either a bare array or an object with
/// an `insights` key. Caps at [`MAX_INSIGHTS`]; anything malformed yields
/// an empty list.
pub fn parse_insights(value: &Value) -> Vec<Insight> {
    let array = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("insights").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            // Some responses wrap the array under an arbitrary single key
            None => match map.values().find_map(Value::as_array) {
                Some(items) => items.as_slice(),
                None => return Vec::new(),
            },
        },
        _ => return Vec::new(),
    };

    array
        .iter()
        .filter_map(Insight::from_value)
        .take(MAX_INSIGHTS)
        .collect()
}
