//! Property tests for the advance scan rule.
//!
//! For arbitrary cancellation patterns over a freshly booked queue, the
//! serving counter must be monotone, bounded by the high-water mark, land
//! only on scheduled tickets, and skip every resolved one.
//!
//! Run with: `cargo test -p cliniq-core --test property_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use cliniq_core::{
    AccountId, Caller, DoctorId, QueueError, QueueService, RecordStore, Role, Ticket, TicketStatus,
};
use cliniq_testing::{test_clock, CapturingNotifier, InMemoryRecordStore, RecordingPushSender};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime builds")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn advance_is_monotone_and_skips_resolved(cancel_mask in prop::collection::vec(any::<bool>(), 1..12)) {
        runtime().block_on(async move {
            let store = Arc::new(InMemoryRecordStore::new());
            let store_dyn: Arc<dyn RecordStore> = store.clone();
            let service = QueueService::new(
                store_dyn,
                Arc::new(CapturingNotifier::new()),
                Arc::new(RecordingPushSender::new()),
                Arc::new(test_clock()),
            );
            let doctor = DoctorId::new();
            let staff = Caller::new(AccountId::new(), Role::Staff);

            let mut tickets: Vec<Ticket> = Vec::new();
            for i in 0..cancel_mask.len() {
                let caller = Caller::new(AccountId::new(), Role::Patient);
                let ticket = service
                    .book_ticket(&caller, doctor, None, format!("visit {i}"))
                    .await
                    .expect("booking succeeds");
                tickets.push(ticket);
            }
            for (ticket, cancel) in tickets.iter().zip(&cancel_mask) {
                if *cancel {
                    let holder = Caller::new(ticket.holder, Role::Patient);
                    service
                        .cancel_ticket(&holder, ticket.id)
                        .await
                        .expect("cancel succeeds");
                }
            }

            let key = tickets[0].queue;
            let mut previous_current = 0u32;
            for _ in 0..=cancel_mask.len() {
                match service.advance_queue(&staff, doctor, None, None).await {
                    Ok(outcome) => {
                        prop_assert!(
                            outcome.current_number >= previous_current,
                            "current went backwards: {} -> {}",
                            previous_current,
                            outcome.current_number
                        );
                        prop_assert!(outcome.current_number <= outcome.last_assigned);

                        if let Some(serving) = &outcome.serving {
                            prop_assert_eq!(serving.number, outcome.current_number);
                            prop_assert_eq!(serving.status, TicketStatus::Scheduled);
                        }

                        // Everything strictly between the old and new position
                        // has been resolved one way or another.
                        for ticket in store.tickets_of(key) {
                            if ticket.number > previous_current
                                && ticket.number < outcome.current_number
                            {
                                prop_assert!(
                                    ticket.status != TicketStatus::Scheduled,
                                    "skipped a scheduled ticket {}",
                                    ticket.number
                                );
                            }
                        }

                        previous_current = outcome.current_number;
                    }
                    Err(QueueError::QueueExhausted { current, last_assigned }) => {
                        prop_assert_eq!(current, previous_current);
                        prop_assert!(current >= last_assigned);
                        break;
                    }
                    Err(other) => {
                        return Err(TestCaseError::fail(format!("unexpected error: {other}")));
                    }
                }
            }
            Ok(())
        })?;
    }

    #[test]
    fn sequential_bookings_are_gapless(count in 1u32..40) {
        runtime().block_on(async move {
            let store = Arc::new(InMemoryRecordStore::new());
            let store_dyn: Arc<dyn RecordStore> = store.clone();
            let service = QueueService::new(
                store_dyn,
                Arc::new(CapturingNotifier::new()),
                Arc::new(RecordingPushSender::new()),
                Arc::new(test_clock()),
            );
            let doctor = DoctorId::new();

            for i in 0..count {
                let caller = Caller::new(AccountId::new(), Role::Patient);
                let ticket = service
                    .book_ticket(&caller, doctor, None, "visit".to_string())
                    .await
                    .expect("booking succeeds");
                prop_assert_eq!(ticket.number, i + 1, "issuance order assigns numbers");
            }
            Ok(())
        })?;
    }
}
