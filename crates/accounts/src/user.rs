use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lectern_auth::{Principal, Role};
use lectern_core::{DomainError, DomainResult, Entity, Money, UserId};

/// Registration input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Replacement profile fields (admin edit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// A platform user.
///
/// # Invariants
/// - `balance` is never negative (enforced by [`Money`]).
/// - `username` and `email` are non-empty; uniqueness is checked against storage
///   by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub balance: Money,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a user with a zero balance.
    pub fn register(new: NewUser, role: Role, now: DateTime<Utc>) -> DomainResult<Self> {
        validate_identity(&new.username, &new.email)?;
        Ok(Self {
            id: UserId::new(),
            username: new.username.trim().to_string(),
            email: new.email.trim().to_string(),
            first_name: new.first_name,
            last_name: new.last_name,
            balance: Money::ZERO,
            is_admin: role.is_admin(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn role(&self) -> Role {
        Role::from_admin_flag(self.is_admin)
    }

    pub fn principal(&self) -> Principal {
        Principal::new(self.id, self.role())
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Charge `price` against the balance.
    ///
    /// Leaves the balance untouched on failure.
    pub fn debit(&mut self, price: Money, now: DateTime<Utc>) -> DomainResult<Money> {
        let remaining = self
            .balance
            .checked_sub(price)
            .ok_or_else(|| DomainError::insufficient_funds("insufficient balance"))?;
        self.balance = remaining;
        self.updated_at = now;
        Ok(remaining)
    }

    /// Add a signed increment; results below zero clamp to zero.
    ///
    /// Leaves the balance untouched when the increment is rejected.
    pub fn adjust_balance(&mut self, increment: Decimal, now: DateTime<Utc>) -> DomainResult<Money> {
        self.balance = self.balance.adjust_clamped(increment)?;
        self.updated_at = now;
        Ok(self.balance)
    }

    pub fn apply_profile(&mut self, update: ProfileUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        validate_identity(&update.username, &update.email)?;
        self.username = update.username.trim().to_string();
        self.email = update.email.trim().to_string();
        self.first_name = update.first_name;
        self.last_name = update.last_name;
        self.updated_at = now;
        Ok(())
    }

    /// Case-insensitive match over username, names and email.
    pub fn matches_search(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.username, &self.first_name, &self.last_name, &self.email]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_identity(username: &str, email: &str) -> DomainResult<()> {
    if username.trim().is_empty() {
        return Err(DomainError::validation("username must not be empty"));
    }
    if !email.contains('@') {
        return Err(DomainError::validation("email must contain '@'"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_user() -> User {
        User::register(
            NewUser {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
            },
            Role::User,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn registration_starts_with_zero_balance() {
        let user = test_user();
        assert_eq!(user.balance, Money::ZERO);
        assert_eq!(user.role(), Role::User);
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn registration_rejects_blank_username() {
        let err = User::register(
            NewUser {
                username: "  ".to_string(),
                email: "x@example.com".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            },
            Role::User,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn debit_of_entire_balance_leaves_zero() {
        let mut user = test_user();
        user.adjust_balance(Decimal::from(100), Utc::now()).unwrap();
        let remaining = user.debit(Money::from_units(100), Utc::now()).unwrap();
        assert_eq!(remaining, Money::ZERO);
        assert_eq!(user.balance, Money::ZERO);
    }

    #[test]
    fn failed_debit_leaves_balance_untouched() {
        let mut user = test_user();
        user.adjust_balance(Decimal::from(40), Utc::now()).unwrap();
        let err = user.debit(Money::from_units(50), Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::insufficient_funds("insufficient balance"));
        assert_eq!(user.balance, Money::from_units(40));
    }

    #[test]
    fn negative_adjustment_clamps_at_zero() {
        let mut user = test_user();
        user.adjust_balance(Decimal::from(30), Utc::now()).unwrap();
        assert_eq!(user.adjust_balance(Decimal::from(-80), Utc::now()).unwrap(), Money::ZERO);
    }

    #[test]
    fn out_of_range_adjustment_keeps_balance() {
        let mut user = test_user();
        user.adjust_balance(Decimal::from(5), Utc::now()).unwrap();
        let err = user.adjust_balance(Decimal::MAX, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(user.balance, Money::from_units(5));
    }

    #[test]
    fn search_is_case_insensitive() {
        let user = test_user();
        assert!(user.matches_search("LOVE"));
        assert!(user.matches_search("example.com"));
        assert!(!user.matches_search("babbage"));
    }

    proptest! {
        #[test]
        fn debit_succeeds_exactly_when_balance_covers_price(balance in 0u64..10_000, price in 0u64..10_000) {
            let mut user = test_user();
            user.adjust_balance(Decimal::from(balance), Utc::now()).unwrap();
            let result = user.debit(Money::from_units(price), Utc::now());
            if balance >= price {
                prop_assert_eq!(result.unwrap(), Money::from_units(balance - price));
            } else {
                prop_assert!(result.is_err());
                prop_assert_eq!(user.balance, Money::from_units(balance));
            }
        }
    }
}
