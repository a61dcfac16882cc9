//! Shared test context: a booted bank node with fast timings and helpers
//! for building commands and observing journal contents.

use std::future::Future;
use std::time::Duration;

use corebank::config::Config;
use corebank::domain::{
    AccountCommand, AccountEvent, AccountId, AccountOwner, Card, CardId, EmployeeCommand,
    EmployeeId, EmployeeRole, EntityId, InitiatorId, MessageBase, OrgId, RecipientStatus,
    TransferRecipient,
};
use corebank::port::decode_event;
use corebank::service::Bank;
use rust_decimal::Decimal;

/// Config with timings tightened for tests. Passivation stays long so
/// entities do not vanish mid-assertion; the passivation test overrides
/// it.
pub fn fast_config() -> Config {
    Config {
        shard_count: 4,
        passivation_timeout: Duration::from_secs(30),
        ask_timeout: Duration::from_secs(2),
        breaker_cooldown: Duration::from_millis(200),
        progress_check_interval: Duration::from_millis(50),
        billing_refill_per_sec: 1000.0,
        ..Config::default()
    }
}

pub async fn boot() -> Bank {
    Bank::boot(fast_config()).await.expect("bank boots")
}

pub async fn boot_with(config: Config) -> Bank {
    Bank::boot(config).await.expect("bank boots")
}

pub fn base(account_id: AccountId, org_id: OrgId) -> MessageBase {
    MessageBase::new(account_id, org_id, InitiatorId::new())
}

pub async fn open_account(
    bank: &Bank,
    org_id: OrgId,
    name: &str,
    initial: Decimal,
) -> AccountId {
    let account_id = AccountId::new();
    bank.send(AccountCommand::Create {
        base: base(account_id, org_id),
        owner: AccountOwner {
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        },
        currency: "USD".into(),
        initial_deposit: initial,
    })
    .await
    .expect("account opens");
    account_id
}

pub async fn register_within_org(bank: &Bank, sender: AccountId, org_id: OrgId, recipient: AccountId) {
    bank.send(AccountCommand::RegisterInternalRecipient {
        base: base(sender, org_id),
        recipient: TransferRecipient::InternalWithinOrg {
            account_id: recipient,
            name: "Peer".into(),
            status: RecipientStatus::Confirmed,
        },
    })
    .await
    .expect("recipient registers");
}

/// Employee with one active card, ready to purchase against `account_id`.
pub async fn onboard_employee(
    bank: &Bank,
    org_id: OrgId,
    account_id: AccountId,
) -> (EmployeeId, CardId) {
    let employee_id = EmployeeId::new();
    let card_id = CardId::new();
    let token = uuid::Uuid::new_v4();

    bank.send_employee(EmployeeCommand::Create {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        name: "Dara Cardholder".into(),
        email: "dara@example.com".into(),
        role: EmployeeRole::CardHolder,
        account_id,
        invite_token: token,
    })
    .await
    .expect("employee created");
    bank.send_employee(EmployeeCommand::AcceptInvite {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        token,
    })
    .await
    .expect("invite accepted");
    bank.send_employee(EmployeeCommand::RegisterCard {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        card: Card::issue(card_id, "4242", false),
    })
    .await
    .expect("card registered");

    (employee_id, card_id)
}

/// Decoded event stream of one account, journal order.
pub async fn account_events(bank: &Bank, account_id: AccountId) -> Vec<AccountEvent> {
    let records = bank
        .deps()
        .journal
        .read(&EntityId::account(account_id), 1, u64::MAX)
        .await
        .expect("journal reads");
    records
        .iter()
        .map(|record| decode_event::<AccountEvent>(record).expect("event decodes"))
        .collect()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}
