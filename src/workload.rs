//! Demo and simulation workloads for the CLI. These drive the node the
//! way the external API layer would: typed commands through confirmable
//! envelopes, results observed through the read model.

use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{
    AccountCommand, AccountId, AccountOwner, Card, CardId, Depository, DomesticRecipient,
    EmployeeCommand, EmployeeId, EmployeeRole, InitiatorId, MessageBase, OrgId, PaymentNetwork,
    RecipientStatus, TransferRecipient,
};
use crate::service::Bank;

type AnyError = Box<dyn std::error::Error>;

fn base(account_id: AccountId, org_id: OrgId) -> MessageBase {
    MessageBase::new(account_id, org_id, InitiatorId::new())
}

fn create_account(account_id: AccountId, org_id: OrgId, name: &str, initial: Decimal) -> AccountCommand {
    AccountCommand::Create {
        base: base(account_id, org_id),
        owner: AccountOwner {
            full_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        },
        currency: "USD".into(),
        initial_deposit: initial,
    }
}

pub async fn demo_scenario(bank: &Bank) -> Result<(), AnyError> {
    let org_id = OrgId::new();
    let operating = AccountId::new();
    let savings = AccountId::new();
    let employee_id = EmployeeId::new();
    let card_id = CardId::new();

    println!("== opening accounts");
    bank.send(create_account(operating, org_id, "Operating", dec!(1000)))
        .await?;
    bank.send(create_account(savings, org_id, "Savings", dec!(0)))
        .await?;

    println!("== onboarding employee with card");
    let invite_token = uuid::Uuid::new_v4();
    bank.send_employee(EmployeeCommand::Create {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        name: "Dara Cardholder".into(),
        email: "dara@example.com".into(),
        role: EmployeeRole::CardHolder,
        account_id: operating,
        invite_token,
    })
    .await?;
    bank.send_employee(EmployeeCommand::AcceptInvite {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        token: invite_token,
    })
    .await?;
    bank.send_employee(EmployeeCommand::RegisterCard {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        card: Card::issue(card_id, "4242", false),
    })
    .await?;

    println!("== internal transfer within the org");
    bank.send(AccountCommand::RegisterInternalRecipient {
        base: base(operating, org_id),
        recipient: TransferRecipient::InternalWithinOrg {
            account_id: savings,
            name: "Savings".into(),
            status: RecipientStatus::Confirmed,
        },
    })
    .await?;
    bank.send(AccountCommand::InternalTransferWithinOrg {
        base: base(operating, org_id),
        amount: dec!(200),
        recipient_id: savings,
    })
    .await?;

    println!("== card purchase (approved), then one the balance cannot cover");
    bank.send_employee(EmployeeCommand::PurchaseIntent {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        card_id,
        amount: dec!(150),
        merchant: "Office Supplies".into(),
    })
    .await?;
    bank.send_employee(EmployeeCommand::PurchaseIntent {
        base: MessageBase::new(employee_id, org_id, InitiatorId::new()),
        card_id,
        amount: dec!(5000),
        merchant: "Conference Travel".into(),
    })
    .await?;

    println!("== domestic wire through the gateway");
    let utility = DomesticRecipient {
        name: "Utility Co".into(),
        account_number: "000111222".into(),
        routing_number: "123456789".into(),
        depository: Depository::Checking,
        payment_network: PaymentNetwork::Ach,
        status: RecipientStatus::Confirmed,
    };
    bank.send(AccountCommand::RegisterDomesticRecipient {
        base: base(operating, org_id),
        recipient: utility.clone(),
    })
    .await?;
    bank.send(AccountCommand::DomesticTransfer {
        base: base(operating, org_id),
        amount: dec!(75),
        recipient_id: utility.recipient_id(),
    })
    .await?;

    // Cross-entity workflows settle asynchronously.
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("== billing fan-out");
    bank.trigger_billing_fanout();
    tokio::time::sleep(Duration::from_millis(500)).await;

    print_summary(bank).await;
    println!("emails queued: {}", bank.email.sent().await.len());
    Ok(())
}

/// Random workload in the shape of real traffic: a population of
/// accounts, deposits and transfers interleaved across them.
pub async fn simulate(bank: &Bank, count: usize) -> Result<(), AnyError> {
    let org_id = OrgId::new();
    let population = (count / 20).clamp(2, 50);
    let mut rng = rand::rng();

    let accounts: Vec<AccountId> = (0..population).map(|_| AccountId::new()).collect();
    for (index, account_id) in accounts.iter().enumerate() {
        bank.send(create_account(
            *account_id,
            org_id,
            &format!("Account {index}"),
            dec!(1000),
        ))
        .await?;
    }

    // Everyone can transfer to everyone within the org.
    for sender in &accounts {
        for recipient in &accounts {
            if sender == recipient {
                continue;
            }
            bank.send(AccountCommand::RegisterInternalRecipient {
                base: base(*sender, org_id),
                recipient: TransferRecipient::InternalWithinOrg {
                    account_id: *recipient,
                    name: "Peer".into(),
                    status: RecipientStatus::Confirmed,
                },
            })
            .await?;
        }
    }

    let mut commands = Vec::with_capacity(count);
    for _ in 0..count {
        let account = accounts[rng.random_range(0..accounts.len())];
        if rng.random_bool(0.6) {
            commands.push(AccountCommand::DepositCash {
                base: base(account, org_id),
                amount: Decimal::from(rng.random_range(10..500)),
            });
        } else {
            let mut recipient = accounts[rng.random_range(0..accounts.len())];
            while recipient == account {
                recipient = accounts[rng.random_range(0..accounts.len())];
            }
            commands.push(AccountCommand::InternalTransferWithinOrg {
                base: base(account, org_id),
                amount: Decimal::from(rng.random_range(10..800)),
                recipient_id: recipient,
            });
        }
    }
    commands.shuffle(&mut rng);

    let mut rejected = 0usize;
    for command in commands {
        if bank.send(command).await.is_err() {
            rejected += 1;
        }
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    print_summary(bank).await;
    println!("rejected commands: {rejected}");
    Ok(())
}

async fn print_summary(bank: &Bank) {
    let mut rows = bank.read_model.rows().await;
    rows.sort_by_key(|row| row.account_id);

    println!("{:<38} {:>12} {:>8} owner", "account", "balance", "status");
    for row in rows {
        println!(
            "{:<38} {:>12} {:>8} {}",
            row.account_id,
            row.balance,
            format!("{:?}", row.status),
            row.owner_name
        );
    }
}
