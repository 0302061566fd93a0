//! Mention extraction: externally-voiced competitor mentions in transcripts.
//!
//! Pure and deterministic over its inputs; no network. A segment yields a
//! Mention iff its speaker is External-affiliated and its text contains at
//! least one tracked competitor name as a case-insensitive substring. Exact
//! substring containment is the contract; no stemming or fuzzy matching.

use std::collections::HashMap;

use crate::competitors::CALL_COMPETITORS;
use crate::gong::{Affiliation, CallRecord, TranscriptSegment};

/// One externally-voiced utterance naming at least one tracked competitor.
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub call_id: String,
    pub call_title: String,
    pub call_date: String,
    pub speaker: String,
    pub affiliation: Affiliation,
    pub text: String,
    /// All matched competitor names, not just the first.
    pub competitors: Vec<String>,
}

/// Mentions for one call, in transcript order. Calls with zero qualifying
/// segments never appear.
#[derive(Debug, Clone)]
pub struct CallMentions {
    pub call_id: String,
    pub call_title: String,
    pub call_date: String,
    pub mentions: Vec<Mention>,
}

pub fn extract_mentions(
    calls: &[CallRecord],
    transcripts: &HashMap<String, Vec<TranscriptSegment>>,
) -> Vec<Mention> {
    let competitors_lowered: Vec<(&str, String)> = CALL_COMPETITORS
        .iter()
        .map(|c| (*c, c.to_lowercase()))
        .collect();

    let mut mentions = Vec::new();

    for call in calls {
        let Some(segments) = transcripts.get(&call.id) else {
            continue;
        };

        let external_speakers: HashMap<&str, &str> = call
            .parties
            .iter()
            .filter(|p| p.affiliation.is_external())
            .map(|p| (p.speaker_id.as_str(), p.name.as_str()))
            .collect();

        for segment in segments {
            let Some(speaker) = external_speakers.get(segment.speaker_id.as_str()) else {
                continue;
            };

            let text_lower = segment.text.to_lowercase();
            let matched: Vec<String> = competitors_lowered
                .iter()
                .filter(|(_, lowered)| text_lower.contains(lowered.as_str()))
                .map(|(name, _)| name.to_string())
                .collect();

            if matched.is_empty() {
                continue;
            }

            mentions.push(Mention {
                call_id: call.id.clone(),
                call_title: call.title.clone(),
                call_date: call.started.clone(),
                speaker: speaker.to_string(),
                affiliation: Affiliation::External,
                text: segment.text.clone(),
                competitors: matched,
            });
        }
    }

    log::info!(
        "Found {} competitor mentions by external speakers",
        mentions.len()
    );
    mentions
}

/// Group mentions by call, preserving the order calls first appear.
pub fn group_by_call(mentions: &[Mention]) -> Vec<CallMentions> {
    let mut groups: Vec<CallMentions> = Vec::new();

    for mention in mentions {
        match groups.iter_mut().find(|g| g.call_id == mention.call_id) {
            Some(group) => group.mentions.push(mention.clone()),
            None => groups.push(CallMentions {
                call_id: mention.call_id.clone(),
                call_title: mention.call_title.clone(),
                call_date: mention.call_date.clone(),
                mentions: vec![mention.clone()],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gong::Party;

    fn call(id: &str, parties: Vec<Party>) -> CallRecord {
        CallRecord {
            id: id.to_string(),
            title: format!("Call {id}"),
            started: "2025-01-02T15:00:00Z".to_string(),
            parties,
        }
    }

    fn party(speaker_id: &str, name: &str, affiliation: Affiliation) -> Party {
        Party {
            speaker_id: speaker_id.to_string(),
            name: name.to_string(),
            affiliation,
        }
    }

    fn segment(call_id: &str, speaker_id: &str, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            speaker_id: speaker_id.to_string(),
            text: text.to_string(),
            call_id: call_id.to_string(),
        }
    }

    fn transcripts(
        entries: Vec<(&str, Vec<TranscriptSegment>)>,
    ) -> HashMap<String, Vec<TranscriptSegment>> {
        entries
            .into_iter()
            .map(|(id, segs)| (id.to_string(), segs))
            .collect()
    }

    #[test]
    fn test_external_multi_match_segment() {
        let calls = vec![call(
            "c1",
            vec![party("s1", "Dana Prospect", Affiliation::External)],
        )];
        let transcripts = transcripts(vec![(
            "c1",
            vec![segment(
                "c1",
                "s1",
                "We trialed MedScout and also looked at RepSignal last quarter.",
            )],
        )]);

        let mentions = extract_mentions(&calls, &transcripts);

        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].competitors, vec!["MedScout", "RepSignal"]);
        assert_eq!(mentions[0].speaker, "Dana Prospect");
        assert_eq!(mentions[0].affiliation, Affiliation::External);
    }

    #[test]
    fn test_internal_speaker_never_matches() {
        let calls = vec![call(
            "c1",
            vec![party("s1", "Sam Rep", Affiliation::Internal)],
        )];
        let transcripts = transcripts(vec![(
            "c1",
            vec![segment("c1", "s1", "MedScout came up again today.")],
        )]);

        assert!(extract_mentions(&calls, &transcripts).is_empty());
    }

    #[test]
    fn test_unknown_affiliation_never_matches() {
        let calls = vec![call(
            "c1",
            vec![party("s1", "Mystery Guest", Affiliation::Unknown)],
        )];
        let transcripts = transcripts(vec![(
            "c1",
            vec![segment("c1", "s1", "RepSignal is interesting.")],
        )]);

        assert!(extract_mentions(&calls, &transcripts).is_empty());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let calls = vec![call(
            "c1",
            vec![party("s1", "Dana", Affiliation::External)],
        )];
        let transcripts = transcripts(vec![(
            "c1",
            vec![segment("c1", "s1", "we use MEDSCOUT and definitive healthcare")],
        )]);

        let mentions = extract_mentions(&calls, &transcripts);
        assert_eq!(mentions.len(), 1);
        assert_eq!(
            mentions[0].competitors,
            vec!["MedScout", "Definitive Healthcare"]
        );
    }

    #[test]
    fn test_no_competitor_text_yields_nothing() {
        let calls = vec![call(
            "c1",
            vec![party("s1", "Dana", Affiliation::External)],
        )];
        let transcripts = transcripts(vec![(
            "c1",
            vec![segment("c1", "s1", "The weather has been great lately.")],
        )]);

        assert!(extract_mentions(&calls, &transcripts).is_empty());
    }

    #[test]
    fn test_call_without_transcript_skipped() {
        let calls = vec![call(
            "c1",
            vec![party("s1", "Dana", Affiliation::External)],
        )];
        assert!(extract_mentions(&calls, &HashMap::new()).is_empty());
    }

    #[test]
    fn test_group_by_call_preserves_order() {
        let calls = vec![
            call("c1", vec![party("s1", "Dana", Affiliation::External)]),
            call("c2", vec![party("s2", "Lee", Affiliation::External)]),
        ];
        let transcripts = transcripts(vec![
            (
                "c1",
                vec![
                    segment("c1", "s1", "MedScout was slow."),
                    segment("c1", "s1", "RepSignal looked better."),
                ],
            ),
            ("c2", vec![segment("c2", "s2", "MedScout pricing hurts.")]),
        ]);

        let mentions = extract_mentions(&calls, &transcripts);
        let groups = group_by_call(&mentions);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].call_id, "c1");
        assert_eq!(groups[0].mentions.len(), 2);
        assert_eq!(groups[1].call_id, "c2");
        assert_eq!(groups[1].mentions.len(), 1);
    }
}
