//! Approval-flow event handling.
//!
//! Every inbound event resolves to user-visible feedback; no handler path
//! returns an error to the event loop. Terminal actions claim the record
//! with a single `remove`, so two reviewers racing on the same digest see
//! exactly one winner and one expiry notice.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::digest::MessageRef;
use crate::pipeline::{GenerationGate, Trigger};
use crate::render;
use crate::slack::{ChatEvent, ChatPlatform, DigestAction};
use crate::store::DigestStore;

pub struct Handler {
    store: DigestStore,
    platform: Arc<dyn ChatPlatform>,
    config: Arc<Config>,
    trigger_tx: mpsc::Sender<Trigger>,
    gate: GenerationGate,
}

impl Handler {
    pub fn new(
        store: DigestStore,
        platform: Arc<dyn ChatPlatform>,
        config: Arc<Config>,
        trigger_tx: mpsc::Sender<Trigger>,
        gate: GenerationGate,
    ) -> Self {
        Self {
            store,
            platform,
            config,
            trigger_tx,
            gate,
        }
    }

    /// Consume events until every sender is gone.
    pub async fn run(self, mut events: mpsc::Receiver<ChatEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        log::info!("Event channel closed, handler stopping");
    }

    pub async fn handle(&self, event: ChatEvent) {
        match event {
            ChatEvent::Action {
                action,
                digest_id,
                channel,
                message_ts,
                trigger_id,
                user,
            } => {
                let review_message = MessageRef {
                    channel: channel.clone(),
                    ts: message_ts,
                };
                match action {
                    DigestAction::Approve => {
                        self.approve(&digest_id, &review_message, &user).await
                    }
                    DigestAction::Dismiss => {
                        self.dismiss(&digest_id, &review_message, &user).await
                    }
                    DigestAction::Edit => {
                        self.edit(&digest_id, &channel, &user, trigger_id.as_deref())
                            .await
                    }
                }
            }
            ChatEvent::EditSubmitted {
                digest_id,
                text,
                user,
            } => self.submit_edit(&digest_id, text, &user).await,
            ChatEvent::ManualTrigger { user, channel } => {
                self.manual_trigger(&user, &channel).await
            }
        }
    }

    async fn approve(&self, digest_id: &str, review_message: &MessageRef, user: &str) {
        let Some(record) = self.store.remove(digest_id) else {
            self.notify_expired(&review_message.channel, user).await;
            return;
        };
        log::info!("Digest {} approved by {}", digest_id, user);

        let blocks = if record.was_edited() {
            render::published_edited_blocks(record.current_text())
        } else {
            render::published_blocks(&record.digest)
        };

        let published = self
            .platform
            .post_message(
                &self.config.target_channel,
                "Weekly competitor intelligence digest",
                &blocks,
            )
            .await;

        if let Err(e) = published {
            // The entry stays removed; approved digests are never replayed.
            log::error!("Failed to publish digest {}: {}", digest_id, e);
            let notice = format!(
                "Failed to post the digest to {}: {}",
                self.config.target_channel, e
            );
            self.ephemeral(&review_message.channel, user, &notice).await;
            return;
        }

        let notice = render::approved_notice(user, &self.config.target_channel);
        self.resolve_review_message(&record.review_message, review_message, "Digest approved", &notice)
            .await;
    }

    async fn dismiss(&self, digest_id: &str, review_message: &MessageRef, user: &str) {
        let Some(record) = self.store.remove(digest_id) else {
            self.notify_expired(&review_message.channel, user).await;
            return;
        };
        log::info!("Digest {} dismissed by {}", digest_id, user);

        let notice = render::dismissed_notice(user);
        self.resolve_review_message(&record.review_message, review_message, "Digest dismissed", &notice)
            .await;
    }

    async fn edit(&self, digest_id: &str, channel: &str, user: &str, trigger_id: Option<&str>) {
        let Some(record) = self.store.get(digest_id) else {
            self.notify_expired(channel, user).await;
            return;
        };

        let Some(trigger_id) = trigger_id else {
            log::warn!("Edit for {} arrived without a trigger id", digest_id);
            self.ephemeral(channel, user, "Could not open the editor, please try again.")
                .await;
            return;
        };

        let view = render::edit_modal_view(digest_id, record.current_text());
        if let Err(e) = self.platform.open_modal(trigger_id, view).await {
            log::error!("Failed to open edit modal for {}: {}", digest_id, e);
            self.ephemeral(channel, user, "Could not open the editor, please try again.")
                .await;
        }
    }

    async fn submit_edit(&self, digest_id: &str, text: String, user: &str) {
        if !self.store.store_edit(digest_id, text.clone()) {
            self.notify_expired(&self.config.approval_channel, user).await;
            return;
        }
        log::info!("Digest {} edited by {}", digest_id, user);

        let blocks = render::edited_review_blocks(digest_id, &text);
        match self
            .platform
            .post_message(
                &self.config.approval_channel,
                "Edited competitor digest pending review",
                &blocks,
            )
            .await
        {
            Ok(message) => self.store.set_review_message(digest_id, message),
            Err(e) => {
                log::error!("Failed to re-post review for {}: {}", digest_id, e);
                self.ephemeral(
                    &self.config.approval_channel,
                    user,
                    "Your edit was saved, but re-posting the review message failed.",
                )
                .await;
            }
        }
    }

    async fn manual_trigger(&self, user: &str, channel: &str) {
        if !self.config.is_approver(user) {
            log::warn!("Manual trigger refused for non-approver {}", user);
            self.ephemeral(channel, user, "Only digest approvers can trigger a generation.")
                .await;
            return;
        }

        if self.gate.is_running() {
            self.ephemeral(
                channel,
                user,
                "A digest generation is already running, try again once it finishes.",
            )
            .await;
            return;
        }

        match self.trigger_tx.try_send(Trigger::Manual {
            user: user.to_string(),
            channel: channel.to_string(),
        }) {
            Ok(()) => {
                self.ephemeral(channel, user, "Generating the competitor digest now...")
                    .await
            }
            Err(e) => {
                log::warn!("Manual trigger not accepted: {}", e);
                self.ephemeral(
                    channel,
                    user,
                    "A digest generation is already pending, try again later.",
                )
                .await;
            }
        }
    }

    /// Mutate the originating review message into a terminal notice. Prefers
    /// the tracked ref (it survives edit re-posts); falls back to the
    /// message the button press came from.
    async fn resolve_review_message(
        &self,
        tracked: &Option<MessageRef>,
        fallback: &MessageRef,
        text: &str,
        blocks: &[render::Block],
    ) {
        let target = tracked.as_ref().unwrap_or(fallback);
        if let Err(e) = self.platform.update_message(target, text, blocks).await {
            log::error!("Failed to update review message {}: {}", target.ts, e);
        }
    }

    async fn notify_expired(&self, channel: &str, user: &str) {
        self.ephemeral(channel, user, &render::expired_notice_text())
            .await;
    }

    async fn ephemeral(&self, channel: &str, user: &str, text: &str) {
        if let Err(e) = self.platform.post_ephemeral(channel, user, text).await {
            log::error!("Failed to send ephemeral to {}: {}", user, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ComposedDigest, DateRange};
    use crate::config;
    use crate::digest::DigestRecord;
    use crate::error::BotError;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Message {
            channel: String,
            blocks: String,
        },
        Update {
            ts: String,
            blocks: String,
        },
        Ephemeral {
            channel: String,
            user: String,
            text: String,
        },
        Modal {
            trigger_id: String,
            initial_value: String,
        },
    }

    #[derive(Default)]
    struct MockPlatform {
        sent: Mutex<Vec<Sent>>,
        fail_posts: AtomicBool,
        ts_counter: AtomicU32,
    }

    impl MockPlatform {
        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().clone()
        }

        fn next_ts(&self) -> String {
            format!("ts-{}", self.ts_counter.fetch_add(1, Ordering::SeqCst))
        }
    }

    #[async_trait]
    impl ChatPlatform for MockPlatform {
        async fn post_message(
            &self,
            channel: &str,
            _text: &str,
            blocks: &[render::Block],
        ) -> Result<MessageRef, BotError> {
            if self.fail_posts.load(Ordering::SeqCst) {
                return Err(BotError::ChatPlatform("post failed".to_string()));
            }
            self.sent.lock().push(Sent::Message {
                channel: channel.to_string(),
                blocks: serde_json::to_string(blocks).unwrap(),
            });
            Ok(MessageRef {
                channel: channel.to_string(),
                ts: self.next_ts(),
            })
        }

        async fn update_message(
            &self,
            message: &MessageRef,
            _text: &str,
            blocks: &[render::Block],
        ) -> Result<(), BotError> {
            self.sent.lock().push(Sent::Update {
                ts: message.ts.clone(),
                blocks: serde_json::to_string(blocks).unwrap(),
            });
            Ok(())
        }

        async fn post_ephemeral(
            &self,
            channel: &str,
            user: &str,
            text: &str,
        ) -> Result<(), BotError> {
            self.sent.lock().push(Sent::Ephemeral {
                channel: channel.to_string(),
                user: user.to_string(),
                text: text.to_string(),
            });
            Ok(())
        }

        async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<(), BotError> {
            let initial_value = view["blocks"][0]["element"]["initial_value"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            self.sent.lock().push(Sent::Modal {
                trigger_id: trigger_id.to_string(),
                initial_value,
            });
            Ok(())
        }
    }

    struct Fixture {
        handler: Handler,
        store: DigestStore,
        platform: Arc<MockPlatform>,
        trigger_rx: mpsc::Receiver<Trigger>,
        gate: GenerationGate,
    }

    fn fixture() -> Fixture {
        let store = DigestStore::new();
        let platform = Arc::new(MockPlatform::default());
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let gate = GenerationGate::new();
        let handler = Handler::new(
            store.clone(),
            platform.clone(),
            Arc::new(config::test_config()),
            trigger_tx,
            gate.clone(),
        );
        Fixture {
            handler,
            store,
            platform,
            trigger_rx,
            gate,
        }
    }

    fn pending_record(store: &DigestStore, text: &str) -> String {
        let range = DateRange::previous_week(
            Utc.with_ymd_and_hms(2025, 1, 8, 9, 0, 0).unwrap(),
        );
        let digest = ComposedDigest::compose(Vec::new(), HashMap::new(), range);
        let record = DigestRecord::new(digest, text.to_string());
        let id = record.id.clone();
        store.insert(record);
        id
    }

    fn action(action: DigestAction, id: &str, user: &str) -> ChatEvent {
        ChatEvent::Action {
            action,
            digest_id: id.to_string(),
            channel: "C-approvals".to_string(),
            message_ts: "ts-origin".to_string(),
            trigger_id: Some("trig-1".to_string()),
            user: user.to_string(),
        }
    }

    #[tokio::test]
    async fn test_approve_publishes_and_evicts() {
        let f = fixture();
        let id = pending_record(&f.store, "digest body");

        f.handler
            .handle(action(DigestAction::Approve, &id, "U01"))
            .await;

        let sent = f.platform.sent();
        let Sent::Message { channel, .. } = &sent[0] else {
            panic!("expected publish first, got {:?}", sent[0]);
        };
        assert_eq!(channel, "#competitors");
        let Sent::Update { blocks, .. } = &sent[1] else {
            panic!("expected review message update, got {:?}", sent[1]);
        };
        assert!(blocks.contains("approved by <@U01>"));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_approve_unknown_id_reports_expired() {
        let f = fixture();
        f.handler
            .handle(action(DigestAction::Approve, "gone1234", "U01"))
            .await;

        let sent = f.platform.sent();
        assert_eq!(sent.len(), 1);
        let Sent::Ephemeral { text, .. } = &sent[0] else {
            panic!("expected ephemeral, got {:?}", sent[0]);
        };
        assert!(text.contains("no longer pending"));
    }

    #[tokio::test]
    async fn test_edit_then_submit_then_approve_publishes_edited_text() {
        // create -> edit -> submit "X" -> approve publishes "X", id gone
        let f = fixture();
        let id = pending_record(&f.store, "original body");

        f.handler.handle(action(DigestAction::Edit, &id, "U01")).await;
        let sent = f.platform.sent();
        let Sent::Modal { initial_value, .. } = &sent[0] else {
            panic!("expected modal, got {:?}", sent[0]);
        };
        assert_eq!(initial_value, "original body");

        f.handler
            .handle(ChatEvent::EditSubmitted {
                digest_id: id.clone(),
                text: "X".to_string(),
                user: "U01".to_string(),
            })
            .await;
        assert_eq!(f.store.get(&id).unwrap().current_text(), "X");

        f.handler
            .handle(action(DigestAction::Approve, &id, "U02"))
            .await;

        let sent = f.platform.sent();
        let publish = sent
            .iter()
            .find(|s| matches!(s, Sent::Message { channel, .. } if channel == "#competitors"))
            .unwrap();
        let Sent::Message { blocks, .. } = publish else {
            unreachable!()
        };
        assert!(blocks.contains("\"X\""));
        assert!(blocks.contains("reviewed and edited"));
        assert!(f.store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_submit_edit_reposts_review_message() {
        let f = fixture();
        let id = pending_record(&f.store, "original body");

        f.handler
            .handle(ChatEvent::EditSubmitted {
                digest_id: id.clone(),
                text: "revised".to_string(),
                user: "U01".to_string(),
            })
            .await;

        let sent = f.platform.sent();
        let Sent::Message { channel, blocks } = &sent[0] else {
            panic!("expected re-posted review, got {:?}", sent[0]);
        };
        assert_eq!(channel, "#competitor-digest");
        assert!(blocks.contains("Edited digest awaiting approval"));
        assert!(blocks.contains("approve_digest"));
        assert!(f.store.get(&id).unwrap().review_message.is_some());
    }

    #[tokio::test]
    async fn test_double_dismiss_second_reports_expired() {
        // dismiss -> dismissed notice; dismiss again -> expired
        let f = fixture();
        let id = pending_record(&f.store, "digest body");

        f.handler
            .handle(action(DigestAction::Dismiss, &id, "U01"))
            .await;
        f.handler
            .handle(action(DigestAction::Dismiss, &id, "U01"))
            .await;

        let sent = f.platform.sent();
        assert_eq!(sent.len(), 2);
        let Sent::Update { blocks, .. } = &sent[0] else {
            panic!("expected dismissal update, got {:?}", sent[0]);
        };
        assert!(blocks.contains("dismissed by <@U01>"));
        let Sent::Ephemeral { text, .. } = &sent[1] else {
            panic!("expected expired ephemeral, got {:?}", sent[1]);
        };
        assert!(text.contains("no longer pending"));
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_notifies_and_stays_removed() {
        let f = fixture();
        let id = pending_record(&f.store, "digest body");
        f.platform.fail_posts.store(true, Ordering::SeqCst);

        f.handler
            .handle(action(DigestAction::Approve, &id, "U01"))
            .await;

        let sent = f.platform.sent();
        let Sent::Ephemeral { text, .. } = &sent[0] else {
            panic!("expected failure ephemeral, got {:?}", sent[0]);
        };
        assert!(text.contains("Failed to post"));
        assert!(f.store.get(&id).is_none());
    }

    #[tokio::test]
    async fn test_manual_trigger_requires_approver() {
        let mut f = fixture();
        f.handler
            .handle(ChatEvent::ManualTrigger {
                user: "U-outsider".to_string(),
                channel: "C1".to_string(),
            })
            .await;

        let sent = f.platform.sent();
        let Sent::Ephemeral { text, .. } = &sent[0] else {
            panic!("expected refusal, got {:?}", sent[0]);
        };
        assert!(text.contains("Only digest approvers"));
        assert!(f.trigger_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_manual_trigger_forwards_for_approver() {
        let mut f = fixture();
        f.handler
            .handle(ChatEvent::ManualTrigger {
                user: "U01".to_string(),
                channel: "C1".to_string(),
            })
            .await;

        assert_eq!(
            f.trigger_rx.try_recv().unwrap(),
            Trigger::Manual {
                user: "U01".to_string(),
                channel: "C1".to_string(),
            }
        );
        let sent = f.platform.sent();
        let Sent::Ephemeral { text, .. } = &sent[0] else {
            panic!("expected ack, got {:?}", sent[0]);
        };
        assert!(text.contains("Generating"));
    }

    #[tokio::test]
    async fn test_manual_trigger_rejected_while_in_flight() {
        let mut f = fixture();
        let _guard = f.gate.try_acquire().unwrap();

        f.handler
            .handle(ChatEvent::ManualTrigger {
                user: "U01".to_string(),
                channel: "C1".to_string(),
            })
            .await;

        assert!(f.trigger_rx.try_recv().is_err());
        let sent = f.platform.sent();
        let Sent::Ephemeral { text, .. } = &sent[0] else {
            panic!("expected rejection, got {:?}", sent[0]);
        };
        assert!(text.contains("already running"));
    }
}
