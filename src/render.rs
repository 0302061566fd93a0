//! Slack Block Kit rendering for digests, review messages, and notices.
//!
//! Blocks are typed structs serialized with serde rather than hand-built
//! JSON, so a malformed payload is a compile error. The flat mrkdwn
//! prerender (`digest_text`) is what reviewers edit; the chunker splits it
//! back into postable sections on publish.

use serde::Serialize;
use serde_json::{json, Value};

use crate::compose::ComposedDigest;
use crate::market_intel::IntelBullet;
use crate::synthesizer::Insight;

/// Slack rejects section text near 3000 chars; chunk below that.
pub const MAX_SECTION_CHARS: usize = 2900;

pub const ACTION_APPROVE: &str = "approve_digest";
pub const ACTION_EDIT: &str = "edit_digest";
pub const ACTION_DISMISS: &str = "dismiss_digest";

pub const EDIT_CALLBACK_ID: &str = "digest_edit_modal";

const GONG_CALL_URL: &str = "https://app.gong.io/call?id=";

/// Separator between competitor sections in the flat prerender. The chunker
/// splits on the bare `---` marker inside it.
const SECTION_SEPARATOR: &str = "\n\n---\n\n";

const UNEDITED_FOOTER: &str =
    ":robot_face: Automatically generated from Gong call transcripts and public market sources.";
const EDITED_FOOTER: &str =
    ":robot_face: Automatically generated, then reviewed and edited before posting.";
const EDITED_INTRO: &str =
    ":mega: *Weekly Competitor Intelligence Digest*\nHighlights from customer calls and market signals, reviewed by the competitive intel team.";

// ============================================================================
// Block Kit types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Text {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: String,
}

impl Text {
    pub fn mrkdwn(text: impl Into<String>) -> Self {
        Text {
            kind: "mrkdwn",
            text: text.into(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Text {
            kind: "plain_text",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: Text,
    pub action_id: String,
    /// Carries only the digest id; platform limits button values to 2000
    /// bytes so the digest body never rides along.
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'static str>,
}

impl Button {
    fn new(label: &str, action_id: &str, value: &str, style: Option<&'static str>) -> Self {
        Button {
            kind: "button",
            text: Text::plain(label),
            action_id: action_id.to_string(),
            value: value.to_string(),
            style,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: Text },
    Section { text: Text },
    Context { elements: Vec<Text> },
    Divider,
    Actions { elements: Vec<Button> },
}

impl Block {
    pub fn header(text: impl Into<String>) -> Self {
        Block::Header {
            text: Text::plain(text),
        }
    }

    pub fn section(text: impl Into<String>) -> Self {
        Block::Section {
            text: Text::mrkdwn(text),
        }
    }

    pub fn context(text: impl Into<String>) -> Self {
        Block::Context {
            elements: vec![Text::mrkdwn(text)],
        }
    }
}

// ============================================================================
// Digest rendering
// ============================================================================

pub fn digest_blocks(digest: &ComposedDigest) -> Vec<Block> {
    let (from, to) = digest.range.labels();

    let mut blocks = vec![Block::header("Competitor Intelligence Digest")];

    if digest.is_empty() {
        blocks.push(Block::section(format!(
            "No competitor intelligence found for {} - {}.",
            from, to
        )));
        return blocks;
    }

    let mut sources = String::from(":headphones: Gong calls");
    if digest.has_any_intel() {
        sources.push_str("  |  :satellite: market signals");
    }
    blocks.push(Block::context(format!(
        "Week of {} - {}  |  Sources: {}",
        from, to, sources
    )));
    blocks.push(Block::Divider);

    for competitor in digest.active_competitors() {
        blocks.push(Block::section(format!("*{}*", competitor)));
        for insight in digest.insights_for(&competitor) {
            blocks.push(Block::section(insight_mrkdwn(insight)));
        }
        for bullet in digest.intel_for(&competitor) {
            blocks.push(Block::section(bullet_mrkdwn(bullet)));
        }
        blocks.push(Block::Divider);
    }

    if matches!(blocks.last(), Some(Block::Divider)) {
        blocks.pop();
    }

    blocks
}

/// Flat mrkdwn rendering of the whole digest, one competitor section per
/// `---`-separated block. This is the editable prerender.
pub fn digest_text(digest: &ComposedDigest) -> String {
    let (from, to) = digest.range.labels();

    if digest.is_empty() {
        return format!(
            "*Competitor Intelligence Digest*\n_No competitor intelligence found for {} - {}._",
            from, to
        );
    }

    let mut sections = vec![format!(
        "*Competitor Intelligence Digest*\n_Week of {} - {}_",
        from, to
    )];

    for competitor in digest.active_competitors() {
        let mut lines = vec![format!("*{}*", competitor)];
        for insight in digest.insights_for(&competitor) {
            lines.push(insight_mrkdwn(insight));
        }
        for bullet in digest.intel_for(&competitor) {
            lines.push(bullet_mrkdwn(bullet));
        }
        sections.push(lines.join("\n"));
    }

    sections.join(SECTION_SEPARATOR)
}

fn insight_mrkdwn(insight: &Insight) -> String {
    let mut text = format!(
        "{} *[{}]* {}",
        insight.sentiment.emoji(),
        insight.category.label(),
        insight.summary
    );
    if let Some(quote) = &insight.quote {
        text.push_str(&format!("\n> _\"{}\"_", quote));
    }
    text.push_str(&format!("\n_{} ({})_", insight.call_title, insight.call_date));
    if let Some(call_id) = &insight.call_id {
        text.push_str(&format!("  <{}{}|View call>", GONG_CALL_URL, call_id));
    }
    text
}

fn bullet_mrkdwn(bullet: &IntelBullet) -> String {
    match &bullet.source_url {
        Some(url) => format!(":satellite: {}  (<{}|source>)", bullet.bullet, url),
        None => format!(":satellite: {}", bullet.bullet),
    }
}

// ============================================================================
// Chunking
// ============================================================================

/// Split a flat digest into postable chunks.
///
/// The text is split on `---` section markers and sections are packed
/// greedily without exceeding `max`. A single section longer than `max` is
/// emitted as its own oversized chunk rather than split mid-sentence. Text
/// already under the limit comes back as exactly one chunk.
pub fn chunk_sections(text: &str, max: usize) -> Vec<String> {
    if text.len() <= max {
        return vec![text.to_string()];
    }

    let sections: Vec<&str> = text
        .split("---")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for section in sections {
        if current.is_empty() {
            current.push_str(section);
            continue;
        }
        if current.len() + SECTION_SEPARATOR.len() + section.len() > max {
            chunks.push(std::mem::take(&mut current));
            current.push_str(section);
        } else {
            current.push_str(SECTION_SEPARATOR);
            current.push_str(section);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

// ============================================================================
// Review and publish surfaces
// ============================================================================

fn action_row(digest_id: &str) -> Block {
    Block::Actions {
        elements: vec![
            Button::new("Approve & Post", ACTION_APPROVE, digest_id, Some("primary")),
            Button::new("Edit", ACTION_EDIT, digest_id, None),
            Button::new("Dismiss", ACTION_DISMISS, digest_id, Some("danger")),
        ],
    }
}

/// The initial review message: full digest, review hint, action buttons.
pub fn approval_blocks(digest_id: &str, digest: &ComposedDigest) -> Vec<Block> {
    let mut blocks = digest_blocks(digest);
    blocks.push(Block::Divider);
    blocks.push(Block::context(
        ":eyes: Pending review. Approve to post, edit to revise, or dismiss.",
    ));
    blocks.push(action_row(digest_id));
    blocks
}

/// Re-posted review message after an edit, carrying the edited text and a
/// fresh action row.
pub fn edited_review_blocks(digest_id: &str, text: &str) -> Vec<Block> {
    let mut blocks = vec![Block::section(":pencil2: *Edited digest awaiting approval*")];
    for chunk in chunk_sections(text, MAX_SECTION_CHARS) {
        blocks.push(Block::section(chunk));
    }
    blocks.push(action_row(digest_id));
    blocks
}

/// The published message for an unedited approval: rich digest blocks plus
/// the generated-content footer.
pub fn published_blocks(digest: &ComposedDigest) -> Vec<Block> {
    let mut blocks = digest_blocks(digest);
    blocks.push(Block::context(UNEDITED_FOOTER));
    blocks
}

/// The published message for an edited approval: intro blurb, the edited
/// text in chunks, and the reviewed-content footer.
pub fn published_edited_blocks(text: &str) -> Vec<Block> {
    let mut blocks = vec![Block::section(EDITED_INTRO)];
    for chunk in chunk_sections(text, MAX_SECTION_CHARS) {
        blocks.push(Block::section(chunk));
    }
    blocks.push(Block::context(EDITED_FOOTER));
    blocks
}

pub fn approved_notice(user: &str, target_channel: &str) -> Vec<Block> {
    vec![Block::section(format!(
        ":white_check_mark: Digest approved by <@{}> and posted to {}.",
        user, target_channel
    ))]
}

pub fn dismissed_notice(user: &str) -> Vec<Block> {
    vec![Block::section(format!(
        ":wastebasket: Digest dismissed by <@{}>. Nothing was posted.",
        user
    ))]
}

pub fn expired_notice_text() -> String {
    "This digest is no longer pending. It may have expired or already been resolved.".to_string()
}

/// Modal seeded with the current digest text; the digest id rides in
/// `private_metadata` so the submission can find its record.
pub fn edit_modal_view(digest_id: &str, text: &str) -> Value {
    json!({
        "type": "modal",
        "callback_id": EDIT_CALLBACK_ID,
        "private_metadata": digest_id,
        "title": { "type": "plain_text", "text": "Edit Digest" },
        "submit": { "type": "plain_text", "text": "Save" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "blocks": [
            {
                "type": "input",
                "block_id": "digest_text_block",
                "label": { "type": "plain_text", "text": "Digest text" },
                "element": {
                    "type": "plain_text_input",
                    "action_id": "digest_text_input",
                    "multiline": true,
                    "initial_value": text
                }
            }
        ]
    })
}
