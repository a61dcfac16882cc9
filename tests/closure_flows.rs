mod common;

use std::time::Duration;

use common::*;
use corebank::adapter::GatewayBehavior;
use corebank::domain::{
    AccountCommand, AccountStatus, BankError, Depository, DomesticRecipient, EntityId, OrgId,
    PaymentNetwork, RecipientStatus, ValidationError,
};
use corebank::port::EmailMessage;
use rust_decimal_macros::dec;

#[tokio::test]
async fn closing_a_quiescent_account_deletes_its_journal() {
    let bank = boot().await;
    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Leaver", dec!(50)).await;

    bank.send(AccountCommand::CloseAccount {
        base: base(account_id, org_id),
        reference: Some("customer request".into()),
    })
    .await
    .unwrap();

    // No in-flight transfers: straight to ReadyForDelete, then the
    // finalizer deregisters obligations and drives journal deletion.
    assert!(
        eventually(Duration::from_secs(5), || async {
            bank.scheduler.deregistered().await.contains(&account_id)
        })
        .await,
        "scheduled obligations deregistered"
    );

    assert!(
        eventually(Duration::from_secs(5), || async {
            bank.deps()
                .journal
                .read(&EntityId::account(account_id), 1, u64::MAX)
                .await
                .unwrap()
                .is_empty()
        })
        .await,
        "journal soft-deleted"
    );

    assert!(
        bank.email
            .sent()
            .await
            .iter()
            .any(|m| matches!(m, EmailMessage::AccountClose { account_id: id, .. } if *id == account_id)),
        "closure email queued"
    );

    bank.shutdown().await;
}

#[tokio::test]
async fn closed_account_drains_in_flight_transfers_before_deletion() {
    let bank = boot().await;
    // Three progress checks at 50ms keep the wire in flight long enough
    // to close around it.
    bank.gateway
        .set_behavior(GatewayBehavior::Accept {
            checks_until_complete: 3,
        })
        .await;

    let org_id = OrgId::new();
    let account_id = open_account(&bank, org_id, "Leaver", dec!(500)).await;
    let utility = DomesticRecipient {
        name: "Utility Co".into(),
        account_number: "000111222".into(),
        routing_number: "123456789".into(),
        depository: Depository::Checking,
        payment_network: PaymentNetwork::Ach,
        status: RecipientStatus::Confirmed,
    };
    bank.send(AccountCommand::RegisterDomesticRecipient {
        base: base(account_id, org_id),
        recipient: utility.clone(),
    })
    .await
    .unwrap();
    bank.send(AccountCommand::DomesticTransfer {
        base: base(account_id, org_id),
        amount: dec!(75),
        recipient_id: utility.recipient_id(),
    })
    .await
    .unwrap();

    bank.send(AccountCommand::CloseAccount {
        base: base(account_id, org_id),
        reference: None,
    })
    .await
    .unwrap();

    // New business is refused while the transfer drains.
    let refused = bank
        .send(AccountCommand::DepositCash {
            base: base(account_id, org_id),
            amount: dec!(10),
        })
        .await;
    assert!(matches!(
        refused,
        Err(BankError::Validation(ValidationError::AccountNotActive))
    ));

    // The in-flight wire still settles, draining the account into
    // ReadyForDelete. Deletion may already have happened by the time we
    // observe, in which case the journal is empty.
    assert!(
        eventually(Duration::from_secs(5), || async {
            let drained = bank
                .get_account(account_id)
                .await
                .ok()
                .flatten()
                .is_some_and(|s| s.status == AccountStatus::ReadyForDelete && s.drained());
            let deleted = bank
                .deps()
                .journal
                .read(&EntityId::account(account_id), 1, u64::MAX)
                .await
                .unwrap()
                .is_empty();
            drained || deleted
        })
        .await,
        "drained into ReadyForDelete"
    );

    // Deletion follows once drained (the finalizer keeps retrying).
    assert!(
        eventually(Duration::from_secs(5), || async {
            bank.deps()
                .journal
                .read(&EntityId::account(account_id), 1, u64::MAX)
                .await
                .unwrap()
                .is_empty()
        })
        .await,
        "journal soft-deleted after drain"
    );

    bank.shutdown().await;
}
