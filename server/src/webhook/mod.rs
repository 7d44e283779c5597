//! WhatsApp Webhook Intake
//!
//! Signature verification, replay protection, event parsing and the
//! dispatch pipeline behind `GET`/`POST /webhook`.

pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod replay;
pub mod signing;

pub use dispatch::{Acceptance, DispatchReport, Dispatcher, RecordOutcome};
pub use error::{RecordError, WebhookError};
pub use events::{EventBatch, InboundEvent, MessageRecord};
pub use handlers::router;
pub use replay::{DedupStore, GuardVerdict, MemoryDedupStore, RedisDedupStore, ReplayGuard};
pub use signing::SignatureVerifier;
