mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use vendory::entities::stock_adjustment::BalanceLevel;
use vendory::entities::stock_movement::MovementType;
use vendory::errors::ServiceError;
use vendory::events::Event;
use vendory::services::TransferContext;

use common::{ctx, setup, setup_with_config, test_config, ORG};

const COLA: &str = "prod-cola";
const OP_IVAN: &str = "op-ivan";
const VM_17: &str = "vm-17";

#[tokio::test]
async fn full_chain_conserves_stock_across_levels() {
    let app = setup().await;

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 100, Some(dec!(0.45)))
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 40)
        .await
        .unwrap();
    app.transfers
        .operator_to_machine(&ctx(), OP_IVAN, VM_17, COLA, 25, Some("A3".to_string()))
        .await
        .unwrap();
    app.transfers
        .record_machine_sale(&ctx(), VM_17, COLA, 3)
        .await
        .unwrap();

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    let operator = app
        .balances
        .operator_balance(ORG, OP_IVAN, COLA)
        .await
        .unwrap()
        .unwrap();
    let machine = app
        .balances
        .machine_balance(ORG, VM_17, COLA)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(warehouse.current_quantity, 60);
    assert_eq!(operator.current_quantity, 15);
    assert_eq!(machine.current_quantity, 22);
    assert_eq!(machine.total_sold, 3);
    assert_eq!(machine.slot_code.as_deref(), Some("A3"));
    assert!(machine.last_refilled_at.is_some());
    assert!(machine.last_sale_at.is_some());

    // Every step left exactly one movement row.
    let (movements, total) = app.movements.list_for_product(ORG, COLA, 1, 50).await.unwrap();
    assert_eq!(total, 4);
    let types: Vec<&str> = movements.iter().map(|m| m.movement_type.as_str()).collect();
    assert!(types.contains(&MovementType::WarehouseIn.as_str()));
    assert!(types.contains(&MovementType::MachineSale.as_str()));
}

#[tokio::test]
async fn receipt_records_cost_snapshot() {
    let app = setup().await;

    let movement = app
        .transfers
        .receive_to_warehouse(&ctx(), COLA, 10, Some(dec!(0.45)))
        .await
        .unwrap();

    assert_eq!(movement.unit_cost, Some(dec!(0.45)));
    assert_eq!(movement.total_cost, Some(dec!(4.50)));
}

#[tokio::test]
async fn transfer_from_missing_warehouse_row_is_not_found() {
    let app = setup().await;

    let err = app
        .transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 5)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn insufficient_warehouse_stock_leaves_balances_untouched() {
    let app = setup().await;

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 10, None)
        .await
        .unwrap();
    let err = app
        .transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 20)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    let warehouse = app.balances.warehouse_balance(ORG, COLA).await.unwrap().unwrap();
    assert_eq!(warehouse.current_quantity, 10);
    assert!(app
        .balances
        .operator_balance(ORG, OP_IVAN, COLA)
        .await
        .unwrap()
        .is_none());
    // The rejected attempt left no movement row.
    let (_, total) = app.movements.list_for_product(ORG, COLA, 1, 50).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn zero_and_negative_quantities_are_rejected() {
    let app = setup().await;

    let err = app
        .transfers
        .receive_to_warehouse(&ctx(), COLA, 0, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .transfers
        .record_machine_sale(&ctx(), VM_17, COLA, -2)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn machine_pull_returns_stock_to_operator() {
    let app = setup().await;

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 30, None)
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 30)
        .await
        .unwrap();
    app.transfers
        .operator_to_machine(&ctx(), OP_IVAN, VM_17, COLA, 20, None)
        .await
        .unwrap();
    app.transfers
        .machine_to_operator(&ctx(), VM_17, OP_IVAN, COLA, 8)
        .await
        .unwrap();

    let operator = app
        .balances
        .operator_balance(ORG, OP_IVAN, COLA)
        .await
        .unwrap()
        .unwrap();
    let machine = app
        .balances
        .machine_balance(ORG, VM_17, COLA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(operator.current_quantity, 18);
    assert_eq!(machine.current_quantity, 12);

    let err = app
        .transfers
        .machine_to_operator(&ctx(), VM_17, OP_IVAN, COLA, 50)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn sale_may_drive_machine_stock_negative_and_alerts() {
    let mut app = setup().await;

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 10, None)
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 2)
        .await
        .unwrap();
    app.transfers
        .operator_to_machine(&ctx(), OP_IVAN, VM_17, COLA, 2, None)
        .await
        .unwrap();
    app.drain_events();

    app.transfers
        .record_machine_sale(&ctx(), VM_17, COLA, 3)
        .await
        .unwrap();

    let machine = app
        .balances
        .machine_balance(ORG, VM_17, COLA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(machine.current_quantity, -1);
    assert_eq!(machine.total_sold, 3);

    let events = app.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::MachineSaleRecorded { remaining_quantity: -1, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        Event::NegativeStockDetected {
            current_quantity: -1,
            ..
        }
    )));
}

#[tokio::test]
async fn sale_landing_exactly_at_zero_raises_no_alert() {
    let mut app = setup().await;

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 10, None)
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 4)
        .await
        .unwrap();
    app.transfers
        .operator_to_machine(&ctx(), OP_IVAN, VM_17, COLA, 4, None)
        .await
        .unwrap();
    app.drain_events();

    app.transfers
        .record_machine_sale(&ctx(), VM_17, COLA, 4)
        .await
        .unwrap();

    let machine = app
        .balances
        .machine_balance(ORG, VM_17, COLA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(machine.current_quantity, 0);

    let events = app.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::MachineSaleRecorded { remaining_quantity: 0, .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::NegativeStockDetected { .. })));
}

#[tokio::test]
async fn sale_ingestion_creates_machine_row_when_untracked() {
    let app = setup().await;

    app.transfers
        .record_machine_sale(&ctx(), VM_17, COLA, 2)
        .await
        .unwrap();

    let machine = app
        .balances
        .machine_balance(ORG, VM_17, COLA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(machine.current_quantity, -2);
    assert_eq!(machine.total_sold, 2);
}

#[tokio::test]
async fn negative_sales_rejected_when_policy_disallows() {
    let mut config = test_config();
    config.allow_negative_machine_stock = false;
    let app = setup_with_config(config).await;

    let err = app
        .transfers
        .record_machine_sale(&ctx(), VM_17, COLA, 1)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
    assert!(app
        .balances
        .machine_balance(ORG, VM_17, COLA)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn organizations_are_isolated() {
    let app = setup().await;
    let other = TransferContext::new("org-rival", "tester");

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 50, None)
        .await
        .unwrap();

    let err = app
        .transfers
        .warehouse_to_operator(&other, OP_IVAN, COLA, 5)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert!(app
        .balances
        .warehouse_balance("org-rival", COLA)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn write_off_debits_the_targeted_level() {
    let app = setup().await;

    app.transfers
        .receive_to_warehouse(&ctx(), COLA, 20, None)
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&ctx(), OP_IVAN, COLA, 10)
        .await
        .unwrap();

    let movement = app
        .transfers
        .write_off(
            &ctx(),
            BalanceLevel::Operator,
            OP_IVAN,
            COLA,
            4,
            Some("crushed in transit".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(movement.movement_type, MovementType::WriteOff.as_str());
    assert_eq!(movement.operator_id.as_deref(), Some(OP_IVAN));

    let operator = app
        .balances
        .operator_balance(ORG, OP_IVAN, COLA)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(operator.current_quantity, 6);
}

#[tokio::test]
async fn movement_history_links_task_and_machine() {
    let app = setup().await;
    let task_ctx = ctx().with_task("task-route-9");

    app.transfers
        .receive_to_warehouse(&task_ctx, COLA, 30, None)
        .await
        .unwrap();
    app.transfers
        .warehouse_to_operator(&task_ctx, OP_IVAN, COLA, 10)
        .await
        .unwrap();
    app.transfers
        .operator_to_machine(&task_ctx, OP_IVAN, VM_17, COLA, 10, None)
        .await
        .unwrap();

    let by_task = app.movements.list_for_task(ORG, "task-route-9").await.unwrap();
    assert_eq!(by_task.len(), 3);

    let by_machine = app.movements.list_for_machine(ORG, VM_17).await.unwrap();
    assert_eq!(by_machine.len(), 1);
    assert_eq!(
        by_machine[0].movement_type,
        MovementType::OperatorToMachine.as_str()
    );
}

#[tokio::test]
async fn low_stock_report_flags_machines_at_minimum() {
    let app = setup().await;

    app.transfers
        .record_machine_sale(&ctx(), VM_17, COLA, 1)
        .await
        .unwrap();

    let low = app.balances.low_stock_machines(ORG).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].machine_id, VM_17);
    assert_eq!(low[0].current_quantity, -1);
}
