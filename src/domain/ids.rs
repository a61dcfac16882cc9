use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
        )]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(raw)?))
            }
        }
    };
}

uuid_id!(
    /// Stable identifier of an account aggregate.
    AccountId
);
uuid_id!(
    /// Organization an account or employee belongs to.
    OrgId
);
uuid_id!(
    /// Identifier of an employee aggregate.
    EmployeeId
);
uuid_id!(
    /// Identifier of a card held by an employee.
    CardId
);
uuid_id!(
    /// Threads a multi-step workflow: a transfer's pending event and its
    /// terminal event carry the same correlation id.
    CorrelationId
);
uuid_id!(
    /// Who initiated a command (a user, an employee, or the system itself).
    InitiatorId
);

/// Journal stream key. Each aggregate owns exactly one stream; shard
/// indexes get their own streams so remember-entities survives restarts.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn account(id: AccountId) -> Self {
        Self(format!("account-{id}"))
    }

    pub fn employee(id: EmployeeId) -> Self {
        Self(format!("employee-{id}"))
    }

    pub fn shard(shard: u32) -> Self {
        Self(format!("shard-{shard}"))
    }

    /// Stream owned by a node-wide singleton (closure finalizer etc).
    pub fn singleton(role: &str) -> Self {
        Self(format!("singleton-{role}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_round_trips_through_display() {
        let id = AccountId::new();
        let parsed: AccountId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn entity_ids_are_namespaced() {
        let account = AccountId::new();
        assert!(EntityId::account(account).as_str().starts_with("account-"));
        assert!(EntityId::shard(3).as_str().starts_with("shard-"));
    }
}
