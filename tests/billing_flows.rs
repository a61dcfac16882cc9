mod common;

use std::time::Duration;

use common::*;
use corebank::domain::{AccountCommand, AccountEvent, OrgId};
use corebank::port::EmailMessage;
use rust_decimal_macros::dec;

#[tokio::test]
async fn qualifying_deposit_skips_the_maintenance_fee() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Member", dec!(100)).await;

    // 300 >= the 250 qualifying threshold.
    bank.send(AccountCommand::DepositCash {
        base: base(account_id, org_id),
        amount: dec!(300),
    })
    .await
    .unwrap();

    // Let the read model see the account, then fan out.
    assert!(
        eventually(Duration::from_secs(2), || async {
            bank.read_model.row(account_id).await.is_some()
        })
        .await
    );
    bank.trigger_billing_fanout();

    assert!(
        eventually(Duration::from_secs(3), || async {
            let events = account_events(&bank, account_id).await;
            let started = events
                .iter()
                .any(|e| matches!(e, AccountEvent::BillingCycleStarted { .. }));
            let skipped = events.iter().any(|e| {
                matches!(
                    e,
                    AccountEvent::MaintenanceFeeSkipped { criteria, .. }
                        if criteria.qualifying_deposit_found
                )
            });
            started && skipped
        })
        .await,
        "cycle started and fee skipped on the deposit criterion"
    );

    // Balance untouched by the cycle.
    assert_eq!(
        bank.get_account(account_id).await.unwrap().unwrap().balance,
        dec!(400)
    );

    // Statement appended and billing email queued.
    assert!(
        eventually(Duration::from_secs(2), || async {
            bank.statements
                .statements()
                .await
                .iter()
                .any(|s| s.account_id == account_id)
        })
        .await,
        "statement appended"
    );
    assert!(
        bank.email
            .sent()
            .await
            .iter()
            .any(|m| matches!(m, EmailMessage::BillingStatement { account_id: id, .. } if *id == account_id)),
        "billing email queued"
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn fee_is_debited_when_no_criterion_holds() {
    let bank = boot().await;
    let org_id = OrgId::new();
    // Low balance, no qualifying deposit: both criteria fail.
    let account_id = open_account(&bank, org_id, "Member", dec!(100)).await;
    bank.send(AccountCommand::DepositCash {
        base: base(account_id, org_id),
        amount: dec!(20),
    })
    .await
    .unwrap();

    assert!(
        eventually(Duration::from_secs(2), || async {
            bank.read_model.row(account_id).await.is_some()
        })
        .await
    );
    bank.trigger_billing_fanout();

    assert!(
        eventually(Duration::from_secs(3), || async {
            account_events(&bank, account_id)
                .await
                .iter()
                .any(|e| matches!(e, AccountEvent::MaintenanceFeeDebited { amount, .. } if *amount == dec!(5)))
        })
        .await,
        "maintenance fee debited"
    );
    assert_eq!(
        bank.get_account(account_id).await.unwrap().unwrap().balance,
        dec!(115)
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn high_balance_skips_the_fee_on_the_balance_criterion() {
    let bank = boot().await;
    let org_id = OrgId::new();
    // Opened and held above the 1500 threshold, no qualifying deposit
    // needed.
    let account_id = open_account(&bank, org_id, "Member", dec!(5000)).await;

    assert!(
        eventually(Duration::from_secs(2), || async {
            bank.read_model.row(account_id).await.is_some()
        })
        .await
    );
    bank.trigger_billing_fanout();

    assert!(
        eventually(Duration::from_secs(3), || async {
            account_events(&bank, account_id).await.iter().any(|e| {
                matches!(
                    e,
                    AccountEvent::MaintenanceFeeSkipped { criteria, .. }
                        if criteria.daily_balance_threshold_met
                )
            })
        })
        .await,
        "fee skipped on the balance criterion"
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn a_second_fanout_in_the_same_period_is_a_noop() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Member", dec!(5000)).await;

    assert!(
        eventually(Duration::from_secs(2), || async {
            bank.read_model.row(account_id).await.is_some()
        })
        .await
    );
    bank.trigger_billing_fanout();

    assert!(
        eventually(Duration::from_secs(3), || async {
            account_events(&bank, account_id)
                .await
                .iter()
                .any(|e| matches!(e, AccountEvent::BillingCycleStarted { .. }))
        })
        .await
    );

    // The read model now records the cycle, so the account is no longer
    // due; even a direct command is refused by the aggregate.
    bank.trigger_billing_fanout();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let cycles = account_events(&bank, account_id)
        .await
        .iter()
        .filter(|e| matches!(e, AccountEvent::BillingCycleStarted { .. }))
        .count();
    assert_eq!(cycles, 1, "at most one cycle per period");

    bank.shutdown().await;
}
