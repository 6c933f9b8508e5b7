//! Module reordering rules.
//!
//! The lenient policy applies whatever the caller sends. The strict policy
//! rejects incoherent requests and refuses any result in which two modules of
//! the course share a position.

use core::str::FromStr;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use lectern_core::{DomainError, DomainResult, ModuleId};

/// One `(module, new position)` pair of a reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleOrder {
    pub module_id: ModuleId,
    pub order: i32,
}

impl ModuleOrder {
    pub fn new(module_id: ModuleId, order: i32) -> Self {
        Self { module_id, order }
    }
}

/// How much validation a reorder gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorderPolicy {
    /// Apply every pair as given; gaps and duplicates are the caller's problem.
    #[default]
    Lenient,
    /// Positions must be positive and unique, before and after applying.
    Strict,
}

impl ReorderPolicy {
    /// Checks run before any write.
    pub fn check_request(self, request: &[ModuleOrder]) -> DomainResult<()> {
        if self == ReorderPolicy::Lenient {
            return Ok(());
        }

        let mut modules = HashSet::with_capacity(request.len());
        let mut positions = HashSet::with_capacity(request.len());
        for item in request {
            if item.order < 1 {
                return Err(DomainError::validation(format!(
                    "module {} has non-positive order {}",
                    item.module_id, item.order
                )));
            }
            if !modules.insert(item.module_id) {
                return Err(DomainError::validation(format!(
                    "module {} appears more than once",
                    item.module_id
                )));
            }
            if !positions.insert(item.order) {
                return Err(DomainError::validation(format!(
                    "order {} is assigned more than once",
                    item.order
                )));
            }
        }
        Ok(())
    }

    /// Checks run against the course's full ordering after the writes, inside
    /// the same transaction.
    pub fn check_result(self, orders: &[(ModuleId, i32)]) -> DomainResult<()> {
        if self == ReorderPolicy::Lenient {
            return Ok(());
        }

        let mut seen = HashSet::with_capacity(orders.len());
        for (module_id, order) in orders {
            if !seen.insert(*order) {
                return Err(DomainError::validation(format!(
                    "reorder leaves order {order} shared (module {module_id})"
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for ReorderPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(ReorderPolicy::Lenient),
            "strict" => Ok(ReorderPolicy::Strict),
            other => Err(DomainError::validation(format!(
                "unknown reorder policy '{other}' (expected 'lenient' or 'strict')"
            ))),
        }
    }
}
