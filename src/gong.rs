//! Gong API client: call listing and transcript retrieval.
//!
//! `/calls/extensive` paginates with an opaque cursor; the fetch loops until
//! the response carries no cursor. `/calls/transcript` is batched at 50 call
//! ids to stay under the request-size ceiling; a failed batch is logged and
//! skipped so one bad batch never sinks the whole cycle.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::json;

use crate::compose::DateRange;
use crate::error::BotError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Max call ids per transcript request.
const TRANSCRIPT_BATCH_SIZE: usize = 50;

// ============================================================================
// Domain types
// ============================================================================

/// Speaker affiliation as reported by the call source. Anything the wire
/// doesn't recognize coerces to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Internal,
    External,
    Unknown,
}

impl Affiliation {
    fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some("Internal") => Affiliation::Internal,
            Some("External") => Affiliation::External,
            _ => Affiliation::Unknown,
        }
    }

    pub fn is_external(self) -> bool {
        self == Affiliation::External
    }

    pub fn label(self) -> &'static str {
        match self {
            Affiliation::Internal => "Internal",
            Affiliation::External => "External",
            Affiliation::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Party {
    pub speaker_id: String,
    pub name: String,
    pub affiliation: Affiliation,
}

/// A call record from the listing API. Immutable once fetched.
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// Sanitized call id (see [`sanitize_call_id`]).
    pub id: String,
    pub title: String,
    /// ISO start timestamp as reported by the source.
    pub started: String,
    pub parties: Vec<Party>,
}

/// One speaker turn from a transcript, with its sentences joined into a
/// single utterance.
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    pub speaker_id: String,
    pub text: String,
    pub call_id: String,
}

/// Gong occasionally embeds a display title after a pipe in call ids.
/// Truncate at the delimiter before the id is used anywhere else.
pub fn sanitize_call_id(raw: &str) -> String {
    raw.split('|').next().unwrap_or(raw).trim().to_string()
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallsResponse {
    #[serde(default)]
    calls: Vec<WireCall>,
    #[serde(default)]
    records: Option<WireRecords>,
}

#[derive(Debug, Deserialize)]
struct WireRecords {
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCall {
    #[serde(default)]
    meta_data: Option<WireMeta>,
    #[serde(default)]
    parties: Vec<WireParty>,
}

#[derive(Debug, Deserialize)]
struct WireMeta {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    started: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireParty {
    #[serde(default)]
    speaker_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    affiliation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscriptsResponse {
    #[serde(default)]
    call_transcripts: Vec<WireTranscript>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTranscript {
    #[serde(default)]
    call_id: String,
    #[serde(default)]
    transcript: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSegment {
    #[serde(default)]
    speaker_id: Option<String>,
    #[serde(default)]
    sentences: Vec<WireSentence>,
}

#[derive(Debug, Deserialize)]
struct WireSentence {
    #[serde(default)]
    text: String,
}

impl CallRecord {
    fn from_wire(wire: WireCall) -> Option<Self> {
        let meta = wire.meta_data?;
        if meta.id.is_empty() {
            return None;
        }
        let parties = wire
            .parties
            .into_iter()
            .filter_map(|p| {
                let speaker_id = p.speaker_id.filter(|id| !id.is_empty())?;
                Some(Party {
                    speaker_id,
                    name: p.name.unwrap_or_else(|| "Unknown".to_string()),
                    affiliation: Affiliation::from_wire(p.affiliation.as_deref()),
                })
            })
            .collect();
        Some(CallRecord {
            id: sanitize_call_id(&meta.id),
            title: meta.title.unwrap_or_else(|| "Untitled Call".to_string()),
            started: meta.started.unwrap_or_default(),
            parties,
        })
    }
}

fn segments_from_wire(wire: WireTranscript) -> (String, Vec<TranscriptSegment>) {
    let call_id = sanitize_call_id(&wire.call_id);
    let segments = wire
        .transcript
        .into_iter()
        .filter_map(|seg| {
            let speaker_id = seg.speaker_id.filter(|id| !id.is_empty())?;
            let text = seg
                .sentences
                .iter()
                .map(|s| s.text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            Some(TranscriptSegment {
                speaker_id,
                text,
                call_id: call_id.clone(),
            })
        })
        .collect();
    (call_id, segments)
}

// ============================================================================
// Client
// ============================================================================

pub struct GongClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
    secret_key: String,
    retry: RetryPolicy,
}

impl GongClient {
    pub fn new(base_url: String, access_key: String, secret_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            access_key,
            secret_key,
            retry: RetryPolicy::default(),
        }
    }

    /// Fetch every call whose start time falls in the window.
    ///
    /// Loops the cursor until the API stops returning one; a missing or
    /// empty cursor is the sole termination condition.
    pub async fn fetch_calls(&self, range: &DateRange) -> Result<Vec<CallRecord>, BotError> {
        let mut all_calls = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({
                "contentSelector": {
                    "exposedFields": { "parties": true }
                },
                "filter": {
                    "fromDateTime": range.from_iso(),
                    "toDateTime": range.to_iso(),
                }
            });
            if let Some(c) = &cursor {
                payload["cursor"] = json!(c);
            }

            let body = self.post_json("/calls/extensive", &payload).await?;
            let page: CallsResponse = serde_json::from_value(body)?;

            all_calls.extend(page.calls.into_iter().filter_map(CallRecord::from_wire));

            cursor = page
                .records
                .and_then(|r| r.cursor)
                .filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        log::info!("Fetched {} calls for {}", all_calls.len(), range);
        Ok(all_calls)
    }

    /// Fetch transcripts for the given call ids, batched.
    ///
    /// A failed batch is logged and skipped; the result may cover fewer
    /// calls than requested.
    pub async fn fetch_transcripts(
        &self,
        call_ids: &[String],
    ) -> HashMap<String, Vec<TranscriptSegment>> {
        let mut transcripts = HashMap::new();

        for batch in call_ids.chunks(TRANSCRIPT_BATCH_SIZE) {
            let payload = json!({ "filter": { "callIds": batch } });

            let body = match self.post_json("/calls/transcript", &payload).await {
                Ok(body) => body,
                Err(e) => {
                    log::warn!("Transcript batch of {} calls failed: {}", batch.len(), e);
                    continue;
                }
            };

            let page: TranscriptsResponse = match serde_json::from_value(body) {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("Malformed transcript batch response: {}", e);
                    continue;
                }
            };

            for wire in page.call_transcripts {
                let (call_id, segments) = segments_from_wire(wire);
                if !call_id.is_empty() {
                    transcripts.insert(call_id, segments);
                }
            }
        }

        log::info!("Fetched transcripts for {} calls", transcripts.len());
        transcripts
    }

    async fn post_json(
        &self,
        path: &str,
        payload: &serde_json::Value,
    ) -> Result<serde_json::Value, BotError> {
        let url = format!("{}{}", self.base_url, path);

        retry_with_backoff(&self.retry, BotError::is_rate_limit, || {
            let request = self
                .http
                .post(&url)
                .basic_auth(&self.access_key, Some(&self.secret_key))
                .json(payload);
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
                Ok(response.json::<serde_json::Value>().await?)
            }
        })
        .await
    }
}
