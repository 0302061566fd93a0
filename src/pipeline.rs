//! The weekly generation cycle, from Gong fetch to the approval post.
//!
//! One worker task consumes triggers off a channel, so cycles never
//! interleave. The gate additionally lets the event handler reject manual
//! triggers while a cycle is running instead of queueing them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::compose::{ComposedDigest, DateRange};
use crate::config::Config;
use crate::digest::DigestRecord;
use crate::error::BotError;
use crate::gong::GongClient;
use crate::market_intel::IntelProvider;
use crate::mentions::extract_mentions;
use crate::render;
use crate::slack::ChatPlatform;
use crate::store::DigestStore;
use crate::synthesizer::InsightSynthesizer;

/// Why a generation cycle started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Scheduled,
    Manual { user: String, channel: String },
}

// ============================================================================
// Generation gate
// ============================================================================

/// In-flight flag for the generation cycle. A manual trigger arriving while
/// a cycle runs is rejected outright rather than queued; the weekly cadence
/// makes a queued duplicate worthless by the time it would run.
#[derive(Clone, Default)]
pub struct GenerationGate {
    running: Arc<AtomicBool>,
}

pub struct GateGuard {
    running: Arc<AtomicBool>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the gate, or None when a cycle is already in flight. The guard
    /// releases on drop.
    pub fn try_acquire(&self) -> Option<GateGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(GateGuard {
                running: Arc::clone(&self.running),
            })
        } else {
            None
        }
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    pub gong: GongClient,
    pub synthesizer: Arc<dyn InsightSynthesizer>,
    pub intel: Arc<dyn IntelProvider>,
    pub platform: Arc<dyn ChatPlatform>,
    pub store: DigestStore,
    pub config: Arc<Config>,
}

impl Pipeline {
    /// Build the previous-week digest and park it in the approval channel.
    pub async fn generate_and_send(&self) -> Result<(), BotError> {
        let range = DateRange::previous_week(Utc::now());
        log::info!("Starting digest generation for {}", range);

        let digest = self.build_digest(range).await?;
        if digest.is_empty() {
            log::info!("No competitor activity found for {}", range);
        }

        let rendered = render::digest_text(&digest);
        let record = DigestRecord::new(digest, rendered);
        let id = record.id.clone();
        let blocks = render::approval_blocks(&id, &record.digest);
        self.store.insert(record);

        let posted = self
            .platform
            .post_message(
                &self.config.approval_channel,
                "Competitor digest pending review",
                &blocks,
            )
            .await;

        match posted {
            Ok(message) => {
                log::info!("Digest {} parked for review at {}", id, message.ts);
                self.store.set_review_message(&id, message);
                Ok(())
            }
            Err(e) => {
                // No review message means no way to act on the entry; drop it.
                self.store.remove(&id);
                Err(e)
            }
        }
    }

    async fn build_digest(&self, range: DateRange) -> Result<ComposedDigest, BotError> {
        let calls = self.gong.fetch_calls(&range).await?;
        let call_ids: Vec<String> = calls.iter().map(|c| c.id.clone()).collect();
        let transcripts = self.gong.fetch_transcripts(&call_ids).await;

        let mentions = extract_mentions(&calls, &transcripts);
        let insights = self.synthesizer.synthesize(&mentions).await;
        let intel = self.intel.collect().await;

        Ok(ComposedDigest::compose(insights, intel, range))
    }
}

/// Single consumer of generation triggers. Exits when every sender is gone.
pub async fn run_worker(
    pipeline: Arc<Pipeline>,
    gate: GenerationGate,
    mut triggers: mpsc::Receiver<Trigger>,
) {
    while let Some(trigger) = triggers.recv().await {
        let Some(_guard) = gate.try_acquire() else {
            log::warn!("Dropping {:?} trigger, generation already in flight", trigger);
            continue;
        };

        match pipeline.generate_and_send().await {
            Ok(()) => log::info!("Digest cycle complete ({:?})", trigger),
            Err(e) => {
                log::error!("Digest cycle failed: {}", e);
                if let Trigger::Manual { user, channel } = &trigger {
                    let notice = format!("Digest generation failed: {}", e);
                    if let Err(e) = pipeline.platform.post_ephemeral(channel, user, &notice).await
                    {
                        log::error!("Failed to notify {} of cycle failure: {}", user, e);
                    }
                }
            }
        }
    }
    log::info!("Trigger channel closed, generation worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_rejects_while_held() {
        let gate = GenerationGate::new();
        assert!(!gate.is_running());

        let guard = gate.try_acquire().unwrap();
        assert!(gate.is_running());
        assert!(gate.try_acquire().is_none());

        drop(guard);
        assert!(!gate.is_running());
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn test_gate_clones_share_state() {
        let gate = GenerationGate::new();
        let clone = gate.clone();
        let _guard = gate.try_acquire().unwrap();
        assert!(clone.is_running());
        assert!(clone.try_acquire().is_none());
    }
}
