//! Event Dispatch
//!
//! Drives one delivery through verify → decode → acknowledge → fan-out.
//!
//! Fan-out runs after the HTTP response is sent, on a task tracked by the
//! dispatcher so shutdown can drain it. Every message record runs on its
//! own task: an error or panic while routing or sending one record is
//! logged and the remaining records still run. Records of one change run
//! in array order; different changes run concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::error::{RecordError, WebhookError};
use super::events::{self, EventBatch, InboundEvent, MessageRecord, RecordSource};
use super::replay::{GuardVerdict, ReplayGuard};
use super::signing::SignatureVerifier;
use crate::persistence::MessageSink;
use crate::reply::{normalize_text, ReplyRouter};
use crate::util::{mask_id, preview};
use crate::whatsapp::MessageSender;

/// Result of authenticating and decoding a delivery.
#[derive(Debug)]
pub enum Acceptance {
    /// Not a WhatsApp Business Account event. Acknowledged, nothing to do.
    Ignored { object: Option<String> },
    /// Decoded records ready for fan-out.
    Accepted(EventBatch),
}

/// What happened to one message record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Duplicate,
    Stale,
    /// No `from`, nobody to reply to.
    NoRecipient,
    /// Router had nothing to say.
    NoReply,
    Replied,
    Failed,
}

/// Per-delivery tally of record outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub replied: usize,
    pub duplicates: usize,
    pub stale: usize,
    pub skipped: usize,
    pub failed: usize,
    pub statuses: usize,
    pub errors: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Duplicate => self.duplicates += 1,
            RecordOutcome::Stale => self.stale += 1,
            RecordOutcome::NoRecipient | RecordOutcome::NoReply => self.skipped += 1,
            RecordOutcome::Replied => self.replied += 1,
            RecordOutcome::Failed => self.failed += 1,
        }
    }

    /// Number of message records accounted for.
    pub const fn total(&self) -> usize {
        self.replied + self.duplicates + self.stale + self.skipped + self.failed
    }
}

/// Webhook pipeline orchestrator.
pub struct Dispatcher {
    verifier: SignatureVerifier,
    guard: ReplayGuard,
    router: Arc<dyn ReplyRouter>,
    sender: Arc<dyn MessageSender>,
    sink: Option<Arc<dyn MessageSink>>,
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        verifier: SignatureVerifier,
        guard: ReplayGuard,
        router: Arc<dyn ReplyRouter>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            verifier,
            guard,
            router,
            sender,
            sink: None,
            tracker: TaskTracker::new(),
        }
    }

    /// Persist raw messages of every accepted delivery to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub const fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Verify the signature over the raw body, then decode it.
    ///
    /// Nothing is dispatched here; the caller acknowledges first and then
    /// hands an accepted batch to [`Dispatcher::spawn`].
    pub fn accept(&self, body: &[u8], signature: Option<&str>) -> Result<Acceptance, WebhookError> {
        if !self.verifier.verify(body, signature) {
            warn!(
                signature_present = signature.is_some(),
                "Rejected webhook delivery with invalid signature"
            );
            return Err(WebhookError::InvalidSignature);
        }

        let payload: Value = serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, body_len = body.len(), "Rejected webhook delivery with invalid JSON");
            WebhookError::from(e)
        })?;

        let event = InboundEvent::from_value(&payload);
        if !event.is_expected_object() {
            info!(object = ?event.object, "Ignoring event for unexpected object");
            return Ok(Acceptance::Ignored {
                object: event.object,
            });
        }

        Ok(Acceptance::Accepted(events::parse(&event)))
    }

    /// Run fan-out for `batch` in the background.
    ///
    /// The returned handle resolves to `None` if the fan-out itself
    /// panicked; the panic is logged either way.
    pub fn spawn(self: &Arc<Self>, batch: EventBatch) -> JoinHandle<Option<DispatchReport>> {
        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            let handle = tokio::spawn(async move { this.dispatch(batch).await });
            match handle.await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!("Webhook dispatch task panicked: {}", e);
                    None
                }
            }
        })
    }

    /// Process every record of `batch` and wait for all of them.
    #[tracing::instrument(
        skip_all,
        fields(
            messages = batch.messages.len(),
            statuses = batch.statuses.len(),
            errors = batch.errors.len()
        )
    )]
    pub async fn dispatch(self: &Arc<Self>, batch: EventBatch) -> DispatchReport {
        let EventBatch {
            messages,
            statuses,
            errors,
        } = batch;

        self.persist(&messages);

        for status in &statuses {
            info!(
                message_id = status.id.as_deref().unwrap_or_default(),
                status = status.status.as_deref().unwrap_or_default(),
                recipient = %status.recipient_id.as_deref().map(mask_id).unwrap_or_default(),
                "Message status update"
            );
            for err in &status.errors {
                warn!(code = ?err.code, title = ?err.title, "Message delivery error");
            }
        }
        for err in &errors {
            warn!(
                code = ?err.code,
                title = ?err.title,
                message = ?err.message,
                "Platform reported error"
            );
        }

        let mut groups: BTreeMap<RecordSource, Vec<MessageRecord>> = BTreeMap::new();
        for record in messages {
            groups.entry(record.source).or_default().push(record);
        }

        let outcomes = join_all(groups.into_values().map(|records| self.run_group(records))).await;

        let mut report = DispatchReport {
            statuses: statuses.len(),
            errors: errors.len(),
            ..DispatchReport::default()
        };
        for outcome in outcomes.into_iter().flatten() {
            report.record(outcome);
        }

        debug!(?report, "Webhook dispatch finished");
        report
    }

    /// Wait for every in-flight fan-out, then accept new work again.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Records of one change, in array order.
    async fn run_group(self: &Arc<Self>, records: Vec<MessageRecord>) -> Vec<RecordOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            outcomes.push(self.run_record(record).await);
        }
        outcomes
    }

    /// Run one record on its own task so a panic stays contained.
    async fn run_record(self: &Arc<Self>, record: MessageRecord) -> RecordOutcome {
        let message_id = record.id.clone().unwrap_or_default();
        let from = record.from.as_deref().map(mask_id).unwrap_or_default();

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.process_record(record).await });

        match handle.await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(message_id = %message_id, from = %from, error = %e, "Failed to process message");
                RecordOutcome::Failed
            }
            Err(e) => {
                let e = RecordError::Panicked(e.to_string());
                error!(message_id = %message_id, from = %from, error = %e, "Failed to process message");
                RecordOutcome::Failed
            }
        }
    }

    async fn process_record(&self, record: MessageRecord) -> Result<RecordOutcome, RecordError> {
        let message_id = record.id.as_deref().unwrap_or_default();

        match self
            .guard
            .check(record.id.as_deref(), record.timestamp.as_deref())
            .await
        {
            GuardVerdict::Duplicate => {
                debug!(message_id, "Skipping duplicate message");
                return Ok(RecordOutcome::Duplicate);
            }
            GuardVerdict::Stale => {
                info!(message_id, timestamp = ?record.timestamp, "Skipping stale message");
                return Ok(RecordOutcome::Stale);
            }
            GuardVerdict::Fresh => {}
        }

        let Some(from) = record.from.as_deref().filter(|f| !f.is_empty()) else {
            debug!(message_id, "Message has no sender, not replying");
            return Ok(RecordOutcome::NoRecipient);
        };

        let text = normalize_text(&record.text);
        info!(
            message_id,
            from = %mask_id(from),
            kind = %record.kind,
            text = %preview(&text, 80),
            "Inbound message"
        );

        let Some(reply) = self.router.route(&text) else {
            return Ok(RecordOutcome::NoReply);
        };

        let receipt = self.sender.send_text(from, &reply).await?;
        info!(
            message_id,
            to = %mask_id(from),
            reply_id = ?receipt.message_id,
            "Reply sent"
        );
        Ok(RecordOutcome::Replied)
    }

    /// Store raw messages without holding up dispatch.
    fn persist(&self, messages: &[MessageRecord]) {
        let Some(sink) = self.sink.clone() else {
            return;
        };
        if messages.is_empty() {
            return;
        }

        let raw: Vec<Value> = messages.iter().map(|m| m.raw.clone()).collect();
        self.tracker.spawn(async move {
            if let Err(e) = sink.persist(&raw).await {
                error!(count = raw.len(), error = %e, "Failed to persist messages");
            }
        });
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("verifier", &self.verifier)
            .field("threshold_secs", &self.guard.threshold_secs())
            .field("persisting", &self.sink.is_some())
            .field("in_flight", &self.tracker.len())
            .finish_non_exhaustive()
    }
}
