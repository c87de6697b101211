//! Concurrency tests for the ticket allocator.
//!
//! Verifies the two racing-booking guarantees: concurrent issues on one
//! doctor-day produce exactly `{1..N}` with no duplicates or gaps, and
//! simultaneous first bookings create exactly one queue row.
//!
//! Run with: `cargo test -p cliniq-core --test concurrency_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use cliniq_core::{AccountId, Caller, QueueKey, QueueService, Role};
use cliniq_core::{DoctorId, RecordStore};
use cliniq_testing::{test_clock, CapturingNotifier, InMemoryRecordStore, RecordingPushSender};
use std::collections::BTreeSet;
use std::sync::Arc;

fn service_over(store: &Arc<InMemoryRecordStore>) -> Arc<QueueService> {
    let store_dyn: Arc<dyn RecordStore> = store.clone();
    Arc::new(QueueService::new(
        store_dyn,
        Arc::new(CapturingNotifier::new()),
        Arc::new(RecordingPushSender::new()),
        Arc::new(test_clock()),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_issue_contiguous_numbers() {
    const BOOKINGS: u32 = 32;

    let store = Arc::new(InMemoryRecordStore::new());
    let service = service_over(&store);
    let doctor = DoctorId::new();

    let mut handles = Vec::new();
    for i in 0..BOOKINGS {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let caller = Caller::new(AccountId::new(), Role::Patient);
            service
                .book_ticket(&caller, doctor, None, format!("visit {i}"))
                .await
                .expect("booking should succeed")
        }));
    }

    let mut numbers = BTreeSet::new();
    for handle in handles {
        let ticket = handle.await.expect("task should not panic");
        assert!(
            numbers.insert(ticket.number),
            "number {} was issued twice",
            ticket.number
        );
    }

    let expected: BTreeSet<u32> = (1..=BOOKINGS).collect();
    assert_eq!(numbers, expected, "sequence must be contiguous from 1");
    assert_eq!(store.queue_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn simultaneous_first_bookings_create_exactly_one_queue() {
    let store = Arc::new(InMemoryRecordStore::new());
    let service = service_over(&store);
    let doctor = DoctorId::new();

    let first = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let caller = Caller::new(AccountId::new(), Role::Patient);
            service
                .book_ticket(&caller, doctor, None, "first".to_string())
                .await
                .expect("booking should succeed")
        })
    };
    let second = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            let caller = Caller::new(AccountId::new(), Role::Patient);
            service
                .book_ticket(&caller, doctor, None, "second".to_string())
                .await
                .expect("booking should succeed")
        })
    };

    let (a, b) = (first.await.unwrap(), second.await.unwrap());

    assert_eq!(store.queue_count(), 1, "exactly one queue row");
    let numbers: BTreeSet<u32> = [a.number, b.number].into();
    assert_eq!(numbers, BTreeSet::from([1, 2]), "two distinct numbers");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bookings_racing_an_advance_never_corrupt_counters() {
    let store = Arc::new(InMemoryRecordStore::new());
    let service = service_over(&store);
    let doctor = DoctorId::new();
    let staff = Caller::new(AccountId::new(), Role::Staff);

    // Seed a couple of tickets so advances have work to do.
    for _ in 0..2 {
        let caller = Caller::new(AccountId::new(), Role::Patient);
        service
            .book_ticket(&caller, doctor, None, "seed".to_string())
            .await
            .unwrap();
    }

    let booker = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            for _ in 0..10 {
                let caller = Caller::new(AccountId::new(), Role::Patient);
                service
                    .book_ticket(&caller, doctor, None, "raced".to_string())
                    .await
                    .expect("booking should succeed");
            }
        })
    };
    let advancer = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            for _ in 0..5 {
                // Exhaustion is a legal outcome while racing; corruption is not.
                let _ = service.advance_queue(&staff, doctor, None, None).await;
            }
        })
    };

    booker.await.unwrap();
    advancer.await.unwrap();

    let key = QueueKey::new(doctor, test_clock_date());
    let queue = store.queue(key).await.unwrap().expect("queue exists");
    assert_eq!(queue.last_assigned, 12);
    assert!(queue.current_number <= queue.last_assigned);

    let tickets = store.tickets_of(key);
    assert_eq!(tickets.len(), 12);
    for (i, ticket) in tickets.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let expected = i as u32 + 1;
        assert_eq!(ticket.number, expected, "numbers stay gapless");
    }
}

fn test_clock_date() -> chrono::NaiveDate {
    chrono::NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}
