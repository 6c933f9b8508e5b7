//! Accounts domain module (users and their balance ledger).
//!
//! Pure domain logic: no IO, no HTTP, no storage. The balance is only ever
//! changed through [`User::debit`] (purchases) and [`User::adjust_balance`]
//! (admin adjustments).

pub mod user;

pub use user::{NewUser, ProfileUpdate, User};
