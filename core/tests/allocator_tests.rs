//! Allocator behavior over the in-memory backends.
//!
//! Covers the request lifecycle, the ledger delta of every transition, and
//! compensation when the status write fails.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::time::Duration;

use bloodbank_core::{
    BloodType, Error, NewBloodRequest, RequestStatus, RequestStore, StorageError, Urgency,
};
use bloodbank_testing::TestBank;
use bloodbank_testing::helpers::RequestBuilder;

#[tokio::test]
async fn exact_stock_fulfils_then_next_request_waits() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);

    let first = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 5).build())
        .await
        .unwrap();
    assert_eq!(first.status, RequestStatus::Fulfilled);
    assert_eq!(bank.units(BloodType::OPositive).await, 0);

    let second = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 1).build())
        .await
        .unwrap();
    assert_eq!(second.status, RequestStatus::Pending);
    assert_eq!(bank.units(BloodType::OPositive).await, 0);

    // Cancelling the fulfilled request returns its units
    let canceled = bank
        .allocator
        .transition(first.id, RequestStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(canceled.status, RequestStatus::Canceled);
    assert_eq!(bank.units(BloodType::OPositive).await, 5);

    // The waiting request is not fulfilled automatically
    let still_pending = bank.allocator.read().get_request(second.id).await.unwrap();
    assert_eq!(still_pending.status, RequestStatus::Pending);

    let fulfilled = bank
        .allocator
        .transition(second.id, RequestStatus::Fulfilled)
        .await
        .unwrap();
    assert_eq!(fulfilled.status, RequestStatus::Fulfilled);
    assert_eq!(bank.units(BloodType::OPositive).await, 4);
}

#[tokio::test]
async fn one_unit_short_stays_pending() {
    let bank = TestBank::with_stock(&[(BloodType::BNegative, 4)]);

    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::BNegative, 5).build())
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(bank.units(BloodType::BNegative).await, 4);
}

#[tokio::test]
async fn urgency_does_not_change_the_decision() {
    let bank = TestBank::with_stock(&[(BloodType::ANegative, 1)]);

    let critical = bank
        .allocator
        .submit(
            RequestBuilder::new(BloodType::ANegative, 2)
                .urgency(Urgency::Critical)
                .build(),
        )
        .await
        .unwrap();
    let normal = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::ANegative, 1).build())
        .await
        .unwrap();

    assert_eq!(critical.status, RequestStatus::Pending);
    assert_eq!(normal.status, RequestStatus::Fulfilled);
}

#[tokio::test]
async fn submit_without_any_entry_is_pending() {
    let bank = TestBank::new();

    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::AbPositive, 1).build())
        .await
        .unwrap();

    assert_eq!(request.status, RequestStatus::Pending);
    assert!(bank.allocator.read().inventory().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_submission_touches_nothing() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);
    let mut request = RequestBuilder::new(BloodType::OPositive, 1).build();
    request.details.contact_number = String::new();

    let err = bank.allocator.submit(request).await.unwrap_err();

    assert!(matches!(err, Error::Validation(msg) if msg.contains("contactNumber")));
    assert_eq!(bank.ledger.mutation_calls(), 0);
    assert!(bank.allocator.read().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn zero_quantity_is_rejected() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);

    let err = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 0).build())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(bank.units(BloodType::OPositive).await, 5);
}

#[tokio::test]
async fn oversized_quantity_is_rejected_before_the_ledger() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);

    let oversized = NewBloodRequest::MAX_QUANTITY + 1;

    let err = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, oversized).build())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(msg) if msg.contains("quantity")));
    assert_eq!(bank.ledger.mutation_calls(), 0);
    assert!(bank.allocator.read().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn fulfil_pending_without_stock_is_insufficient() {
    let bank = TestBank::with_stock(&[(BloodType::ONegative, 1)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::ONegative, 3).build())
        .await
        .unwrap();

    let err = bank
        .allocator
        .transition(request.id, RequestStatus::Fulfilled)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InsufficientStock {
            blood_type: BloodType::ONegative,
            requested: 3
        }
    ));
    let stored = bank.allocator.read().get_request(request.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(bank.units(BloodType::ONegative).await, 1);
}

#[tokio::test]
async fn cancel_pending_leaves_ledger_alone() {
    let bank = TestBank::with_stock(&[(BloodType::BPositive, 2)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::BPositive, 3).build())
        .await
        .unwrap();
    let calls_before = bank.ledger.mutation_calls();

    let canceled = bank
        .allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();

    assert_eq!(canceled.status, RequestStatus::Canceled);
    assert_eq!(bank.ledger.mutation_calls(), calls_before);
    assert_eq!(bank.units(BloodType::BPositive).await, 2);
}

#[tokio::test]
async fn cancelling_twice_releases_once() {
    let bank = TestBank::with_stock(&[(BloodType::APositive, 3)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::APositive, 3).build())
        .await
        .unwrap();
    assert_eq!(bank.units(BloodType::APositive).await, 0);

    bank.allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();
    let again = bank
        .allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();

    assert_eq!(again.status, RequestStatus::Canceled);
    assert_eq!(bank.units(BloodType::APositive).await, 3);
}

#[tokio::test]
async fn same_status_is_a_no_op() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 4)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 2).build())
        .await
        .unwrap();
    let calls_before = bank.ledger.mutation_calls();

    let unchanged = bank
        .allocator
        .transition(request.id, RequestStatus::Fulfilled)
        .await
        .unwrap();

    assert_eq!(unchanged, request);
    assert_eq!(bank.ledger.mutation_calls(), calls_before);
    assert_eq!(bank.store.set_status_calls(), 0);
    assert_eq!(bank.units(BloodType::OPositive).await, 2);
}

#[tokio::test]
async fn fulfilled_cannot_return_to_pending() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 4)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 2).build())
        .await
        .unwrap();

    let err = bank
        .allocator
        .transition(request.id, RequestStatus::Pending)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: RequestStatus::Fulfilled,
            to: RequestStatus::Pending,
            ..
        }
    ));
    assert_eq!(bank.units(BloodType::OPositive).await, 2);
}

#[tokio::test]
async fn canceled_is_terminal() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 4)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 2).build())
        .await
        .unwrap();
    bank.allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();

    for to in [RequestStatus::Pending, RequestStatus::Fulfilled] {
        let err = bank.allocator.transition(request.id, to).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: RequestStatus::Canceled,
                ..
            }
        ));
    }
    assert_eq!(bank.units(BloodType::OPositive).await, 4);
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let bank = TestBank::new();
    let id = bloodbank_core::RequestId::new();

    let err = bank
        .allocator
        .transition(id, RequestStatus::Canceled)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(missing) if missing == id));
}

#[tokio::test]
async fn fulfil_cancel_round_trip_restores_stock() {
    let bank = TestBank::with_stock(&[(BloodType::AbNegative, 6)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::AbNegative, 7).build())
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);

    bloodbank_core::StockLedger::release(bank.ledger.as_ref(), BloodType::AbNegative, 1)
        .await
        .unwrap();

    bank.allocator
        .transition(request.id, RequestStatus::Fulfilled)
        .await
        .unwrap();
    assert_eq!(bank.units(BloodType::AbNegative).await, 0);

    bank.allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(bank.units(BloodType::AbNegative).await, 7);
}

// ============================================================================
// Compensation
// ============================================================================

#[tokio::test]
async fn failed_insert_releases_the_reservation() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);
    bank.store.fail_create(true);

    let err = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 3).build())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(StorageError::Unavailable(_))));
    assert_eq!(bank.units(BloodType::OPositive).await, 5);
    assert!(bank.allocator.read().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_fulfil_write_gives_units_back() {
    let bank = TestBank::with_stock(&[(BloodType::BPositive, 1)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::BPositive, 4).build())
        .await
        .unwrap();
    bloodbank_core::StockLedger::release(bank.ledger.as_ref(), BloodType::BPositive, 3)
        .await
        .unwrap();
    bank.store.fail_set_status(true);

    let err = bank
        .allocator
        .transition(request.id, RequestStatus::Fulfilled)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(bank.units(BloodType::BPositive).await, 4);
    let stored = bank.store.get(request.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
}

#[tokio::test]
async fn failed_cancel_write_takes_units_back() {
    let bank = TestBank::with_stock(&[(BloodType::ANegative, 5)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::ANegative, 5).build())
        .await
        .unwrap();
    bank.store.fail_set_status(true);

    let err = bank
        .allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(bank.units(BloodType::ANegative).await, 0);
    let stored = bank.store.get(request.id).await.unwrap();
    assert_eq!(stored.status, RequestStatus::Fulfilled);

    // Once the store recovers the cancel goes through normally
    bank.store.fail_set_status(false);
    bank.allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(bank.units(BloodType::ANegative).await, 5);
}

#[tokio::test]
async fn ledger_failure_on_submit_surfaces_and_records_nothing() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);
    bank.ledger.fail_reserve(true);

    let err = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 1).build())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Storage(_)));
    assert!(bank.allocator.read().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn abandoned_submit_still_records_its_reservation() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);
    bank.store.delay_writes(Duration::from_millis(50));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        bank.allocator.submit(RequestBuilder::new(BloodType::OPositive, 5).build()),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;

    let requests = bank.allocator.read().list_all().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, RequestStatus::Fulfilled);
    assert_eq!(bank.units(BloodType::OPositive).await, 0);
}

#[tokio::test]
async fn abandoned_cancel_then_retry_releases_once() {
    let bank = TestBank::with_stock(&[(BloodType::OPositive, 5)]);
    let request = bank
        .allocator
        .submit(RequestBuilder::new(BloodType::OPositive, 5).build())
        .await
        .unwrap();
    assert_eq!(bank.units(BloodType::OPositive).await, 0);
    bank.store.delay_writes(Duration::from_millis(50));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        bank.allocator.transition(request.id, RequestStatus::Canceled),
    )
    .await;
    assert!(abandoned.is_err());

    // Waits behind the abandoned cancel, then finds the request already canceled
    let retried = bank
        .allocator
        .transition(request.id, RequestStatus::Canceled)
        .await
        .unwrap();
    assert_eq!(retried.status, RequestStatus::Canceled);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bank.units(BloodType::OPositive).await, 5);
    assert_eq!(bank.store.set_status_calls(), 1);
}
