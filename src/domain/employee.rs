//! Employee aggregate. Deliberately small: it exists where card purchases
//! couple to account debits. A purchase intent emits `DebitRequested`,
//! the employee runtime forwards a `Debit` command to the account, and
//! the account answers with an approval or a decline.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    AccountId, CardId, CorrelationId, EmployeeId, MessageBase, OrgId, ValidationError,
    account::same_month,
};

pub type EmployeeMsgBase = MessageBase<EmployeeId>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeRole {
    Admin,
    CardHolder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeStatus {
    PendingInvite { token: Uuid },
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardStatus {
    Active,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_id: CardId,
    pub last4: String,
    pub virtual_card: bool,
    pub status: CardStatus,
    pub daily_limit: Option<Decimal>,
    pub monthly_limit: Option<Decimal>,
    pub daily_accrued: Decimal,
    pub monthly_accrued: Decimal,
    pub last_purchase_date: Option<NaiveDate>,
}

impl Card {
    pub fn issue(card_id: CardId, last4: impl Into<String>, virtual_card: bool) -> Self {
        Self {
            card_id,
            last4: last4.into(),
            virtual_card,
            status: CardStatus::Active,
            daily_limit: None,
            monthly_limit: None,
            daily_accrued: Decimal::ZERO,
            monthly_accrued: Decimal::ZERO,
            last_purchase_date: None,
        }
    }

    fn daily_accrued_on(&self, date: NaiveDate) -> Decimal {
        if self.last_purchase_date == Some(date) {
            self.daily_accrued
        } else {
            Decimal::ZERO
        }
    }

    fn monthly_accrued_in(&self, date: NaiveDate) -> Decimal {
        match self.last_purchase_date {
            Some(last) if same_month(last, date) => self.monthly_accrued,
            _ => Decimal::ZERO,
        }
    }
}

/// Purchase awaiting the account's verdict, keyed by correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPurchase {
    pub card_id: CardId,
    pub amount: Decimal,
    pub merchant: String,
    pub account_id: AccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeState {
    pub employee_id: EmployeeId,
    pub org_id: OrgId,
    /// Org account the employee's cards debit.
    pub account_id: AccountId,
    pub name: String,
    pub email: String,
    pub role: EmployeeRole,
    pub status: EmployeeStatus,
    pub cards: HashMap<CardId, Card>,
    pub pending_purchases: HashMap<CorrelationId, PendingPurchase>,
}

/// Why a card purchase was declined; echoed back to the card network and
/// to the employee by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseDeclinedReason {
    InsufficientAccountFunds { balance: Decimal, owner_name: String },
    CardLocked,
    ExceededDailyLimit { limit: Decimal, accrued: Decimal },
    ExceededMonthlyLimit { limit: Decimal, accrued: Decimal },
    AccountNotActive,
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EmployeeCommand {
    Create {
        base: EmployeeMsgBase,
        name: String,
        email: String,
        role: EmployeeRole,
        account_id: AccountId,
        invite_token: Uuid,
    },
    AcceptInvite {
        base: EmployeeMsgBase,
        token: Uuid,
    },
    RegisterCard {
        base: EmployeeMsgBase,
        card: Card,
    },
    PurchaseIntent {
        base: EmployeeMsgBase,
        card_id: CardId,
        amount: Decimal,
        merchant: String,
    },
    ApproveDebit {
        base: EmployeeMsgBase,
    },
    DeclineDebit {
        base: EmployeeMsgBase,
        reason: PurchaseDeclinedReason,
    },
    LockCard {
        base: EmployeeMsgBase,
        card_id: CardId,
    },
    UnlockCard {
        base: EmployeeMsgBase,
        card_id: CardId,
    },
}

impl EmployeeCommand {
    pub fn base(&self) -> &EmployeeMsgBase {
        match self {
            Self::Create { base, .. }
            | Self::AcceptInvite { base, .. }
            | Self::RegisterCard { base, .. }
            | Self::PurchaseIntent { base, .. }
            | Self::ApproveDebit { base, .. }
            | Self::DeclineDebit { base, .. }
            | Self::LockCard { base, .. }
            | Self::UnlockCard { base, .. } => base,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EmployeeEvent {
    Created {
        base: EmployeeMsgBase,
        name: String,
        email: String,
        role: EmployeeRole,
        account_id: AccountId,
        invite_token: Uuid,
    },
    InviteAccepted {
        base: EmployeeMsgBase,
    },
    CardRegistered {
        base: EmployeeMsgBase,
        card: Card,
    },
    DebitRequested {
        base: EmployeeMsgBase,
        card_id: CardId,
        card_last4: String,
        amount: Decimal,
        merchant: String,
        account_id: AccountId,
    },
    DebitApproved {
        base: EmployeeMsgBase,
        card_id: CardId,
        amount: Decimal,
    },
    DebitDeclined {
        base: EmployeeMsgBase,
        card_id: CardId,
        amount: Decimal,
        reason: PurchaseDeclinedReason,
    },
    CardLocked {
        base: EmployeeMsgBase,
        card_id: CardId,
    },
    CardUnlocked {
        base: EmployeeMsgBase,
        card_id: CardId,
    },
}

impl EmployeeEvent {
    pub fn base(&self) -> &EmployeeMsgBase {
        match self {
            Self::Created { base, .. }
            | Self::InviteAccepted { base, .. }
            | Self::CardRegistered { base, .. }
            | Self::DebitRequested { base, .. }
            | Self::DebitApproved { base, .. }
            | Self::DebitDeclined { base, .. }
            | Self::CardLocked { base, .. }
            | Self::CardUnlocked { base, .. } => base,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created { .. } => "EmployeeCreated",
            Self::InviteAccepted { .. } => "InviteAccepted",
            Self::CardRegistered { .. } => "CardRegistered",
            Self::DebitRequested { .. } => "DebitRequested",
            Self::DebitApproved { .. } => "DebitApproved",
            Self::DebitDeclined { .. } => "DebitDeclined",
            Self::CardLocked { .. } => "CardLocked",
            Self::CardUnlocked { .. } => "CardUnlocked",
        }
    }
}

pub fn decide(
    state: Option<&EmployeeState>,
    command: &EmployeeCommand,
) -> Result<EmployeeEvent, ValidationError> {
    let Some(state) = state else {
        return match command {
            EmployeeCommand::Create {
                base,
                name,
                email,
                role,
                account_id,
                invite_token,
            } => Ok(EmployeeEvent::Created {
                base: base.clone(),
                name: name.clone(),
                email: email.clone(),
                role: *role,
                account_id: *account_id,
                invite_token: *invite_token,
            }),
            _ => Err(ValidationError::AccountNotActive),
        };
    };

    match command {
        EmployeeCommand::Create { .. } => Err(ValidationError::AccountNotReadyToActivate),

        EmployeeCommand::AcceptInvite { base, token } => match &state.status {
            EmployeeStatus::PendingInvite { token: expected } if expected == token => {
                Ok(EmployeeEvent::InviteAccepted { base: base.clone() })
            }
            EmployeeStatus::PendingInvite { .. } => Err(ValidationError::ValidationFailure {
                field: "token".into(),
                reason: "invite token mismatch".into(),
            }),
            EmployeeStatus::Active => Err(ValidationError::AccountNotReadyToActivate),
        },

        EmployeeCommand::RegisterCard { base, card } => Ok(EmployeeEvent::CardRegistered {
            base: base.clone(),
            card: card.clone(),
        }),

        EmployeeCommand::PurchaseIntent {
            base,
            card_id,
            amount,
            merchant,
        } => {
            if state.status != EmployeeStatus::Active {
                return Err(ValidationError::AccountNotActive);
            }
            if *amount <= Decimal::ZERO {
                return Err(ValidationError::DebitAmountNotPositive);
            }
            let card = state
                .cards
                .get(card_id)
                .ok_or_else(|| ValidationError::ValidationFailure {
                    field: "card_id".into(),
                    reason: "unknown card".into(),
                })?;
            if card.status == CardStatus::Locked {
                return Err(ValidationError::AccountCardLocked);
            }
            let today = base.timestamp.date_naive();
            if let Some(limit) = card.daily_limit {
                let accrued = card.daily_accrued_on(today);
                if accrued + *amount > limit {
                    return Err(ValidationError::ExceededDailyDebit { limit, accrued });
                }
            }
            if let Some(limit) = card.monthly_limit {
                let accrued = card.monthly_accrued_in(today);
                if accrued + *amount > limit {
                    return Err(ValidationError::ExceededMonthlyDebit { limit, accrued });
                }
            }
            Ok(EmployeeEvent::DebitRequested {
                base: base.clone(),
                card_id: *card_id,
                card_last4: card.last4.clone(),
                amount: *amount,
                merchant: merchant.clone(),
                account_id: state.account_id,
            })
        }

        EmployeeCommand::ApproveDebit { base } => {
            let purchase = state
                .pending_purchases
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            Ok(EmployeeEvent::DebitApproved {
                base: base.clone(),
                card_id: purchase.card_id,
                amount: purchase.amount,
            })
        }

        EmployeeCommand::DeclineDebit { base, reason } => {
            let purchase = state
                .pending_purchases
                .get(&base.correlation_id)
                .ok_or(ValidationError::TransferAlreadyProgressed)?;
            Ok(EmployeeEvent::DebitDeclined {
                base: base.clone(),
                card_id: purchase.card_id,
                amount: purchase.amount,
                reason: reason.clone(),
            })
        }

        EmployeeCommand::LockCard { base, card_id } => {
            ensure_card(state, card_id)?;
            Ok(EmployeeEvent::CardLocked {
                base: base.clone(),
                card_id: *card_id,
            })
        }

        EmployeeCommand::UnlockCard { base, card_id } => {
            ensure_card(state, card_id)?;
            Ok(EmployeeEvent::CardUnlocked {
                base: base.clone(),
                card_id: *card_id,
            })
        }
    }
}

pub fn apply(state: Option<EmployeeState>, event: &EmployeeEvent) -> EmployeeState {
    let Some(mut state) = state else {
        return originate(event);
    };

    match event {
        EmployeeEvent::Created { .. } => {}

        EmployeeEvent::InviteAccepted { .. } => {
            state.status = EmployeeStatus::Active;
        }

        EmployeeEvent::CardRegistered { card, .. } => {
            state.cards.insert(card.card_id, card.clone());
        }

        EmployeeEvent::DebitRequested {
            base,
            card_id,
            amount,
            merchant,
            account_id,
            ..
        } => {
            state.pending_purchases.insert(
                base.correlation_id,
                PendingPurchase {
                    card_id: *card_id,
                    amount: *amount,
                    merchant: merchant.clone(),
                    account_id: *account_id,
                },
            );
        }

        EmployeeEvent::DebitApproved {
            base,
            card_id,
            amount,
        } => {
            state.pending_purchases.remove(&base.correlation_id);
            if let Some(card) = state.cards.get_mut(card_id) {
                let today = base.timestamp.date_naive();
                card.daily_accrued = card.daily_accrued_on(today) + *amount;
                card.monthly_accrued = card.monthly_accrued_in(today) + *amount;
                card.last_purchase_date = Some(today);
            }
        }

        EmployeeEvent::DebitDeclined { base, .. } => {
            state.pending_purchases.remove(&base.correlation_id);
        }

        EmployeeEvent::CardLocked { card_id, .. } => {
            if let Some(card) = state.cards.get_mut(card_id) {
                card.status = CardStatus::Locked;
            }
        }

        EmployeeEvent::CardUnlocked { card_id, .. } => {
            if let Some(card) = state.cards.get_mut(card_id) {
                card.status = CardStatus::Active;
            }
        }
    }

    state
}

fn originate(event: &EmployeeEvent) -> EmployeeState {
    let base = event.base();
    let (name, email, role, account_id, invite_token) = match event {
        EmployeeEvent::Created {
            name,
            email,
            role,
            account_id,
            invite_token,
            ..
        } => (
            name.clone(),
            email.clone(),
            *role,
            *account_id,
            *invite_token,
        ),
        _ => (
            String::new(),
            String::new(),
            EmployeeRole::CardHolder,
            AccountId::new(),
            Uuid::nil(),
        ),
    };

    EmployeeState {
        employee_id: base.entity_id,
        org_id: base.org_id,
        account_id,
        name,
        email,
        role,
        status: EmployeeStatus::PendingInvite {
            token: invite_token,
        },
        cards: HashMap::new(),
        pending_purchases: HashMap::new(),
    }
}

fn ensure_card(state: &EmployeeState, card_id: &CardId) -> Result<(), ValidationError> {
    state
        .cards
        .contains_key(card_id)
        .then_some(())
        .ok_or(ValidationError::ValidationFailure {
            field: "card_id".into(),
            reason: "unknown card".into(),
        })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::InitiatorId;

    fn employee_base(employee_id: EmployeeId) -> EmployeeMsgBase {
        MessageBase::new(employee_id, OrgId::new(), InitiatorId::new())
    }

    fn active_employee_with_card(card: Card) -> EmployeeState {
        let employee_id = EmployeeId::new();
        let created = decide(
            None,
            &EmployeeCommand::Create {
                base: employee_base(employee_id),
                name: "Dara".into(),
                email: "dara@example.com".into(),
                role: EmployeeRole::CardHolder,
                account_id: AccountId::new(),
                invite_token: Uuid::new_v4(),
            },
        )
        .unwrap();
        let mut state = apply(None, &created);
        state.status = EmployeeStatus::Active;
        state.cards.insert(card.card_id, card);
        state
    }

    #[test]
    fn purchase_on_locked_card_is_refused() {
        let mut card = Card::issue(CardId::new(), "4242", false);
        card.status = CardStatus::Locked;
        let card_id = card.card_id;
        let state = active_employee_with_card(card);

        let result = decide(
            Some(&state),
            &EmployeeCommand::PurchaseIntent {
                base: employee_base(state.employee_id),
                card_id,
                amount: dec!(10),
                merchant: "coffee".into(),
            },
        );

        assert_eq!(result.unwrap_err(), ValidationError::AccountCardLocked);
    }

    #[test]
    fn purchase_over_daily_limit_is_refused() {
        let mut card = Card::issue(CardId::new(), "4242", false);
        card.daily_limit = Some(dec!(100));
        let card_id = card.card_id;
        let state = active_employee_with_card(card);

        let result = decide(
            Some(&state),
            &EmployeeCommand::PurchaseIntent {
                base: employee_base(state.employee_id),
                card_id,
                amount: dec!(101),
                merchant: "hardware".into(),
            },
        );

        assert!(matches!(
            result,
            Err(ValidationError::ExceededDailyDebit { .. })
        ));
    }

    #[test]
    fn approved_debit_accrues_card_spend() {
        let card = Card::issue(CardId::new(), "4242", false);
        let card_id = card.card_id;
        let state = active_employee_with_card(card);

        let base = employee_base(state.employee_id);
        let requested = decide(
            Some(&state),
            &EmployeeCommand::PurchaseIntent {
                base: base.clone(),
                card_id,
                amount: dec!(40),
                merchant: "books".into(),
            },
        )
        .unwrap();
        let state = apply(Some(state), &requested);
        assert!(state.pending_purchases.contains_key(&base.correlation_id));

        let approved = decide(Some(&state), &EmployeeCommand::ApproveDebit { base }).unwrap();
        let state = apply(Some(state), &approved);

        assert!(state.pending_purchases.is_empty());
        assert_eq!(state.cards[&card_id].daily_accrued, dec!(40));
    }

    #[test]
    fn decline_without_pending_purchase_is_noop_error() {
        let card = Card::issue(CardId::new(), "4242", false);
        let state = active_employee_with_card(card);

        let result = decide(
            Some(&state),
            &EmployeeCommand::DeclineDebit {
                base: employee_base(state.employee_id),
                reason: PurchaseDeclinedReason::CardLocked,
            },
        );

        assert_eq!(
            result.unwrap_err(),
            ValidationError::TransferAlreadyProgressed
        );
    }
}
