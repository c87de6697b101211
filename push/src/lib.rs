//! # Cliniq Push
//!
//! Best-effort push notification dispatcher: subscription storage seam,
//! the opaque delivery gateway, and the per-account fan-out implementing
//! [`cliniq_core::PushSender`].
//!
//! Push is at-most-once per device and never a correctness dependency of
//! the queue: every failure mode here ends in a log line and a counter,
//! not an error to the caller.

pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod subscription;

pub use dispatcher::{PushDispatcher, DEFAULT_DELIVERY_TIMEOUT};
pub use error::{DeliveryError, PushError};
pub use gateway::{HttpPushGateway, PushGateway};
pub use subscription::{Subscription, SubscriptionKeys, SubscriptionStore};
