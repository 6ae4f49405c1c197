mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use vendory::entities::stock_reservation::{InventoryLevel, ReservationStatus};
use vendory::errors::ServiceError;
use vendory::events::Event;

use common::{ctx, setup, ORG};

const COLA: &str = "prod-cola";
const OP_IVAN: &str = "op-ivan";

fn reserve_request(quantity: i32) -> vendory::services::reservations::ReserveStock {
    vendory::services::reservations::ReserveStock {
        organization_id: ORG.to_string(),
        task_id: "task-route-9".to_string(),
        product_id: COLA.to_string(),
        inventory_level: InventoryLevel::Warehouse,
        operator_id: None,
        quantity,
        requested_by: "tester".to_string(),
        expires_at: None,
    }
}

#[tokio::test]
async fn reserving_shrinks_availability_not_quantity() {
    let mut app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();

    let reservation = app.reservations.reserve(reserve_request(30)).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending.as_str());
    assert!(reservation.number.starts_with("RSV-"));
    assert!(reservation.expires_at.is_some());

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    assert_eq!(warehouse.current_quantity, 50);
    assert_eq!(warehouse.reserved_quantity, 30);
    assert_eq!(warehouse.available_quantity(), 20);

    // The remaining 20 are still reservable, 25 are not.
    let err = app.reservations.reserve(reserve_request(25)).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    app.reservations.reserve(reserve_request(20)).await.unwrap();

    assert!(app
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::StockReserved { quantity: 30, .. })));
}

#[tokio::test]
async fn reserving_without_a_balance_row_is_insufficient_stock() {
    let app = setup().await;
    let err = app.reservations.reserve(reserve_request(1)).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn operator_level_reservation_requires_operator_id() {
    let app = setup().await;
    let mut request = reserve_request(5);
    request.inventory_level = InventoryLevel::Operator;

    let err = app.reservations.reserve(request).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn operator_level_holds_weigh_on_the_operator_balance() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 20, None)
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 15)
        .await
        .unwrap();

    let mut request = reserve_request(10);
    request.inventory_level = InventoryLevel::Operator;
    request.operator_id = Some(OP_IVAN.to_string());
    app.reservations.reserve(request).await.unwrap();

    let operator = app
        .balances
        .operator_balance(ORG, OP_IVAN, COLA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(operator.reserved_quantity, 10);
    assert_eq!(operator.available_quantity(), 5);

    // Holds bind reservations, not refills: refill sufficiency checks
    // the current quantity, so the full 15 may still be loaded.
    app.transfers
        .operator_to_machine(&ctx(), OP_IVAN, "vm-17", COLA, 15, None)
        .await
        .unwrap();

    // But a second operator-level hold sees nothing left.
    let mut request = reserve_request(1);
    request.inventory_level = InventoryLevel::Operator;
    request.operator_id = Some(OP_IVAN.to_string());
    let err = app.reservations.reserve(request).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn fulfillment_consumes_reserved_and_current_together() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();
    let reservation = app.reservations.reserve(reserve_request(30)).await.unwrap();

    let partial = app
        .reservations
        .fulfill(reservation.id, 10, "tester")
        .await
        .unwrap();
    assert_eq!(partial.status, ReservationStatus::PartiallyFulfilled.as_str());
    assert_eq!(partial.quantity_fulfilled, 10);

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    assert_eq!(warehouse.current_quantity, 40);
    assert_eq!(warehouse.reserved_quantity, 20);
    assert_eq!(warehouse.available_quantity(), 20);

    let full = app
        .reservations
        .fulfill(reservation.id, 20, "tester")
        .await
        .unwrap();
    assert_eq!(full.status, ReservationStatus::Fulfilled.as_str());
    assert!(full.fulfilled_at.is_some());

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    assert_eq!(warehouse.current_quantity, 20);
    assert_eq!(warehouse.reserved_quantity, 0);

    // Terminal reservations reject further fulfillment.
    let err = app
        .reservations
        .fulfill(reservation.id, 1, "tester")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn overfulfillment_is_rejected() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();
    let reservation = app.reservations.reserve(reserve_request(10)).await.unwrap();

    let err = app
        .reservations
        .fulfill(reservation.id, 11, "tester")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn cancellation_releases_only_the_remainder() {
    let mut app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();
    let reservation = app.reservations.reserve(reserve_request(30)).await.unwrap();
    app.reservations
        .fulfill(reservation.id, 10, "tester")
        .await
        .unwrap();

    let cancelled = app
        .reservations
        .cancel(reservation.id, Some("task aborted".to_string()), "tester")
        .await
        .unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled.as_str());
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("task aborted"));

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    // 10 were consumed by fulfillment, the held 20 came back.
    assert_eq!(warehouse.current_quantity, 40);
    assert_eq!(warehouse.reserved_quantity, 0);

    assert!(app
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::ReservationCancelled { released_quantity: 20, .. })));

    let err = app
        .reservations
        .cancel(reservation.id, None, "tester")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn confirm_transitions_only_from_pending() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();
    let reservation = app.reservations.reserve(reserve_request(5)).await.unwrap();

    let confirmed = app.reservations.confirm(reservation.id).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed.as_str());

    let err = app.reservations.confirm(reservation.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn expiry_sweep_releases_overdue_holds_once() {
    let mut app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();

    let mut overdue = reserve_request(20);
    overdue.expires_at = Some(Utc::now() - Duration::minutes(5));
    let overdue = app.reservations.reserve(overdue).await.unwrap();

    let mut fresh = reserve_request(10);
    fresh.expires_at = Some(Utc::now() + Duration::hours(1));
    app.reservations.reserve(fresh).await.unwrap();

    let outcome = app.reservations.expire_due(Utc::now()).await.unwrap();
    assert_eq!(outcome.expired_count, 1);
    assert_eq!(outcome.skipped_count, 0);

    let expired = app.reservations.get(overdue.id).await.unwrap();
    assert_eq!(expired.status, ReservationStatus::Expired.as_str());

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    assert_eq!(warehouse.reserved_quantity, 10);

    assert!(app
        .drain_events()
        .iter()
        .any(|e| matches!(e, Event::ReservationExpired { released_quantity: 20, .. })));

    // A second sweep finds nothing left to do.
    let outcome = app.reservations.expire_due(Utc::now()).await.unwrap();
    assert_eq!(outcome.expired_count, 0);
    assert_eq!(outcome.skipped_count, 0);
}

#[tokio::test]
async fn expired_reservation_rejects_fulfillment() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();

    let mut request = reserve_request(10);
    request.expires_at = Some(Utc::now() - Duration::seconds(1));
    let reservation = app.reservations.reserve(request).await.unwrap();
    app.reservations.expire_due(Utc::now()).await.unwrap();

    let err = app
        .reservations
        .fulfill(reservation.id, 5, "tester")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn lookups_and_stats_cover_open_holds() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();
    let reservation = app.reservations.reserve(reserve_request(12)).await.unwrap();

    let by_number = app
        .reservations
        .get_by_number(&reservation.number)
        .await
        .unwrap();
    assert_eq!(by_number.id, reservation.id);

    let for_task = app
        .reservations
        .list_for_task(ORG, "task-route-9")
        .await
        .unwrap();
    assert_eq!(for_task.len(), 1);

    app.reservations
        .fulfill(reservation.id, 5, "tester")
        .await
        .unwrap();
    let stats = app.reservations.stats(ORG).await.unwrap();
    assert_eq!(stats.active_count, 1);
    assert_eq!(stats.active_quantity, 7);

    let err = app.reservations.get(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn reservation_lifecycle_is_visible_in_the_movement_log() {
    let app = setup().await;
    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();
    let reservation = app.reservations.reserve(reserve_request(10)).await.unwrap();
    app.reservations
        .fulfill(reservation.id, 4, "tester")
        .await
        .unwrap();
    app.reservations
        .cancel(reservation.id, None, "tester")
        .await
        .unwrap();

    let movements = app.movements.list_for_task(ORG, "task-route-9").await.unwrap();
    let types: Vec<&str> = movements.iter().map(|m| m.movement_type.as_str()).collect();
    assert!(types.contains(&"reservation_created"));
    assert!(types.contains(&"reservation_fulfilled"));
    assert!(types.contains(&"reservation_cancelled"));
    assert!(movements
        .iter()
        .all(|m| m.reservation_id == Some(reservation.id)));
}
