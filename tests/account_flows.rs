mod common;

use std::time::Duration;

use common::*;
use corebank::domain::{
    AccountCommand, BankError, Confirmable, ConfirmationId, EmployeeCommand, InitiatorId,
    MessageBase, OrgId, PurchaseDeclinedReason, ValidationError,
};
use corebank::port::EmailMessage;
use rust_decimal_macros::dec;

#[tokio::test]
async fn deposit_updates_live_state_and_read_model() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Operating", dec!(100)).await;

    bank.send(AccountCommand::DepositCash {
        base: base(account_id, org_id),
        amount: dec!(50),
    })
    .await
    .unwrap();

    let state = bank.get_account(account_id).await.unwrap().unwrap();
    assert_eq!(state.balance, dec!(150));

    assert!(
        eventually(Duration::from_secs(2), || async {
            bank.read_model
                .row(account_id)
                .await
                .is_some_and(|row| row.balance == dec!(150))
        })
        .await,
        "read model catches up"
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn redelivered_envelope_is_confirmed_without_double_apply() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Operating", dec!(100)).await;

    let envelope = Confirmable::first(
        AccountCommand::DepositCash {
            base: base(account_id, org_id),
            amount: dec!(40),
        },
        ConfirmationId::new("delivery:42"),
    );

    let first = bank.send_envelope(envelope.clone()).await.unwrap();
    let redelivery = Confirmable {
        delivery_attempt: 2,
        ..envelope
    };
    let second = bank.send_envelope(redelivery).await.unwrap();

    assert_eq!(first, second);
    let state = bank.get_account(account_id).await.unwrap().unwrap();
    assert_eq!(state.balance, dec!(140));

    bank.shutdown().await;
}

#[tokio::test]
async fn card_purchase_debits_account_and_settles_on_employee() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Operating", dec!(1000)).await;
    let (employee_id, card_id) = onboard_employee(&bank, org_id, account_id).await;

    bank.send_employee(EmployeeCommand::PurchaseIntent {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        card_id,
        amount: dec!(150),
        merchant: "Office Supplies".into(),
    })
    .await
    .unwrap();

    assert!(
        eventually(Duration::from_secs(3), || async {
            bank.get_account(account_id)
                .await
                .unwrap()
                .is_some_and(|state| state.balance == dec!(850))
        })
        .await,
        "account debited"
    );

    assert!(
        eventually(Duration::from_secs(3), || async {
            bank.get_employee(employee_id)
                .await
                .unwrap()
                .is_some_and(|employee| {
                    employee.pending_purchases.is_empty()
                        && employee.cards[&card_id].daily_accrued == dec!(150)
                })
        })
        .await,
        "purchase settled on the card"
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn insufficient_balance_purchase_is_declined_back_to_employee() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Operating", dec!(10)).await;
    let (employee_id, card_id) = onboard_employee(&bank, org_id, account_id).await;

    bank.send_employee(EmployeeCommand::PurchaseIntent {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        card_id,
        amount: dec!(20),
        merchant: "Coffee".into(),
    })
    .await
    .unwrap();

    // The decline settles the pending purchase without accruing spend.
    assert!(
        eventually(Duration::from_secs(3), || async {
            bank.get_employee(employee_id)
                .await
                .unwrap()
                .is_some_and(|employee| {
                    employee.pending_purchases.is_empty()
                        && employee.cards[&card_id].daily_accrued == dec!(0)
                })
        })
        .await,
        "decline settles the purchase"
    );

    // No debit event was ever persisted on the account.
    let events = account_events(&bank, account_id).await;
    assert!(
        events
            .iter()
            .all(|event| !matches!(event, corebank::domain::AccountEvent::Debited { .. }))
    );
    let state = bank.get_account(account_id).await.unwrap().unwrap();
    assert_eq!(state.balance, dec!(10));

    // The decline reason carries the balance and owner name.
    assert!(
        eventually(Duration::from_secs(3), || async {
            bank.email.sent().await.iter().any(|message| {
                matches!(
                    message,
                    EmailMessage::PurchaseDeclined {
                        reason: PurchaseDeclinedReason::InsufficientAccountFunds {
                            balance,
                            owner_name,
                        },
                        ..
                    } if *balance == dec!(10) && owner_name == "Operating"
                )
            })
        })
        .await,
        "decline email queued"
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn validation_rejection_reaches_the_caller() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Operating", dec!(10)).await;

    let result = bank
        .send(AccountCommand::DepositCash {
            base: base(account_id, org_id),
            amount: dec!(-5),
        })
        .await;

    assert!(matches!(
        result,
        Err(BankError::Validation(ValidationError::DepositTooSmall))
    ));

    bank.shutdown().await;
}
