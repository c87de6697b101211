//! Business metrics for the queue engine.
//!
//! Descriptions for the counters recorded inside `cliniq-core` and
//! `cliniq-push`. Call [`register_business_metrics`] once at startup,
//! before any metrics are recorded.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `cliniq_tickets_issued_total` - Tickets issued across all queues
//! - `cliniq_queue_advances_total` - Successful advance operations
//! - `cliniq_tickets_resolved_total{status}` - Tickets reaching a terminal status
//! - `cliniq_hospital_alerts_total` - Hospital alerts broadcast
//! - `cliniq_push_deliveries_total{outcome}` - Push attempts by outcome
//!   (delivered, retired, failed)

use metrics::describe_counter;

/// Initialize and register all business metric descriptions.
pub fn register_business_metrics() {
    describe_counter!(
        "cliniq_tickets_issued_total",
        "Total number of tickets issued across all queues"
    );
    describe_counter!(
        "cliniq_queue_advances_total",
        "Total number of successful queue advance operations"
    );
    describe_counter!(
        "cliniq_tickets_resolved_total",
        "Total tickets reaching a terminal status (completed, cancelled, missed)"
    );
    describe_counter!(
        "cliniq_hospital_alerts_total",
        "Total hospital-wide alerts broadcast"
    );
    describe_counter!(
        "cliniq_push_deliveries_total",
        "Push delivery attempts by outcome (delivered, retired, failed)"
    );

    tracing::info!("Business metrics registered");
}
