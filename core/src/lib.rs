//! # Cliniq Core
//!
//! Domain model and engine for the clinic queue ticketing and real-time
//! notification platform.
//!
//! ## Components
//!
//! - [`types`]: identities, queues, tickets, and lifecycle statuses
//! - [`store`]: the record-store seam with its atomicity contract
//! - [`service`]: the [`QueueService`](service::QueueService) — ticket
//!   allocator and serving state machine
//! - [`notify`]: topics, live events, and the change-notifier seam
//! - [`push`]: the best-effort push seam the dispatcher implements
//! - [`clock`]: injectable time
//!
//! ## Architecture Principles
//!
//! - Per-queue serialization, full parallelism across queues
//! - Explicit trait seams for every external collaborator
//! - Notification failures never fail or roll back a queue mutation

pub mod clock;
pub mod error;
pub mod notify;
pub mod push;
pub mod service;
pub mod store;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use error::QueueError;
pub use notify::{ChangeNotifier, LiveEvent, Topic};
pub use push::{DispatchReport, MessageKind, PushSender};
pub use service::{AdvanceOutcome, QueueService, QueueStatus};
pub use store::RecordStore;
pub use types::{
    AccountId, Caller, Disposition, DoctorId, HospitalId, Queue, QueueKey, QueueState, Role,
    Ticket, TicketId, TicketStatus,
};
