//! Bond Ledger
//!
//! Per-node-operator bond accounting with guarantor and depositor
//! indirection and a pull-only refund bucket for replaced guarantors.
//!
//! Every mutating method validates all of its preconditions before touching
//! state, so an `Err` always leaves the ledger unchanged.

use crate::error::PdgError;
use cl_proof::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Bond of one node operator. Invariant: `locked <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeOperatorBalance {
    pub total: Amount,
    pub locked: Amount,
}

impl NodeOperatorBalance {
    /// Portion of the bond not backing any predeposit
    #[must_use]
    pub const fn unlocked(&self) -> Amount {
        self.total.saturating_sub(self.locked)
    }
}

/// Balances, custody assignments and claimable refunds
#[derive(Debug, Clone, Default)]
pub struct BondLedger {
    balances: HashMap<Address, NodeOperatorBalance>,
    guarantors: HashMap<Address, Address>,
    depositors: HashMap<Address, Address>,
    claimable: HashMap<Address, Amount>,
}

impl BondLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn balance(&self, node_operator: &Address) -> NodeOperatorBalance {
        self.balances.get(node_operator).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn unlocked(&self, node_operator: &Address) -> Amount {
        self.balance(node_operator).unlocked()
    }

    /// Guarantor of `node_operator`; the operator itself unless reassigned
    #[must_use]
    pub fn guarantor(&self, node_operator: &Address) -> Address {
        self.guarantors
            .get(node_operator)
            .copied()
            .unwrap_or(*node_operator)
    }

    /// Depositor delegate of `node_operator`; the operator itself unless reassigned
    #[must_use]
    pub fn depositor(&self, node_operator: &Address) -> Address {
        self.depositors
            .get(node_operator)
            .copied()
            .unwrap_or(*node_operator)
    }

    #[must_use]
    pub fn claimable_refund(&self, guarantor: &Address) -> Amount {
        self.claimable.get(guarantor).copied().unwrap_or(0)
    }

    /// Caller must be the node operator or its guarantor
    ///
    /// # Errors
    /// Returns [`PdgError::Unauthorized`] otherwise.
    pub fn ensure_operator_or_guarantor(
        &self,
        caller: Address,
        node_operator: &Address,
    ) -> Result<(), PdgError> {
        if caller == *node_operator || caller == self.guarantor(node_operator) {
            return Ok(());
        }
        Err(PdgError::Unauthorized {
            sender: caller,
            role: "node operator or guarantor",
        })
    }

    /// Caller must be the node operator or its depositor
    ///
    /// # Errors
    /// Returns [`PdgError::Unauthorized`] otherwise.
    pub fn ensure_operator_or_depositor(
        &self,
        caller: Address,
        node_operator: &Address,
    ) -> Result<(), PdgError> {
        if caller == *node_operator || caller == self.depositor(node_operator) {
            return Ok(());
        }
        Err(PdgError::Unauthorized {
            sender: caller,
            role: "node operator or depositor",
        })
    }

    fn ensure_operator(caller: Address, node_operator: &Address) -> Result<(), PdgError> {
        if caller != *node_operator {
            return Err(PdgError::Unauthorized {
                sender: caller,
                role: "node operator",
            });
        }
        Ok(())
    }

    /// Add `amount` to the bond.
    ///
    /// # Errors
    /// Zero amount, wrong caller or overflow.
    pub fn top_up(
        &mut self,
        caller: Address,
        node_operator: Address,
        amount: Amount,
    ) -> Result<NodeOperatorBalance, PdgError> {
        ensure_positive(amount)?;
        self.ensure_operator_or_guarantor(caller, &node_operator)?;

        let mut balance = self.balance(&node_operator);
        balance.total = balance
            .total
            .checked_add(amount)
            .ok_or(PdgError::ArithmeticOverflow)?;
        self.balances.insert(node_operator, balance);
        Ok(balance)
    }

    /// Remove `amount` of unlocked bond. The caller pays it out.
    ///
    /// # Errors
    /// Zero amount, wrong caller or not enough unlocked bond.
    pub fn withdraw(
        &mut self,
        caller: Address,
        node_operator: Address,
        amount: Amount,
    ) -> Result<NodeOperatorBalance, PdgError> {
        ensure_positive(amount)?;
        self.ensure_operator_or_guarantor(caller, &node_operator)?;

        let mut balance = self.balance(&node_operator);
        let available = balance.unlocked();
        if amount > available {
            return Err(PdgError::InsufficientUnlocked {
                requested: amount,
                available,
            });
        }
        balance.total -= amount;
        self.balances.insert(node_operator, balance);
        Ok(balance)
    }

    /// Hand custody to `new_guarantor`.
    ///
    /// The whole bond, locked part included, becomes claimable by the
    /// previous guarantor and the operator's ledger balance drops to zero.
    /// Returns the amount moved.
    ///
    /// # Errors
    /// Wrong caller, unchanged guarantor or overflow of the refund bucket.
    pub fn set_guarantor(
        &mut self,
        caller: Address,
        node_operator: Address,
        new_guarantor: Address,
    ) -> Result<Amount, PdgError> {
        Self::ensure_operator(caller, &node_operator)?;
        let previous = self.guarantor(&node_operator);
        if previous == new_guarantor {
            return Err(PdgError::NoOpGuarantorChange(new_guarantor));
        }

        let moved = self.balance(&node_operator).total;
        let refund = self
            .claimable_refund(&previous)
            .checked_add(moved)
            .ok_or(PdgError::ArithmeticOverflow)?;

        if moved > 0 {
            self.claimable.insert(previous, refund);
        }
        self.balances.remove(&node_operator);
        if new_guarantor == node_operator {
            self.guarantors.remove(&node_operator);
        } else {
            self.guarantors.insert(node_operator, new_guarantor);
        }
        debug!(%node_operator, %previous, %new_guarantor, moved, "Guarantor reassigned");
        Ok(moved)
    }

    /// Delegate predeposit rights to `new_depositor`.
    ///
    /// # Errors
    /// Wrong caller.
    pub fn set_depositor(
        &mut self,
        caller: Address,
        node_operator: Address,
        new_depositor: Address,
    ) -> Result<(), PdgError> {
        Self::ensure_operator(caller, &node_operator)?;
        if new_depositor == node_operator {
            self.depositors.remove(&node_operator);
        } else {
            self.depositors.insert(node_operator, new_depositor);
        }
        Ok(())
    }

    /// Take the caller's whole claimable refund. The caller pays it out.
    ///
    /// # Errors
    /// [`PdgError::NothingToClaim`] when the bucket is empty.
    pub fn claim_refund(&mut self, caller: Address) -> Result<Amount, PdgError> {
        match self.claimable.remove(&caller) {
            Some(amount) if amount > 0 => Ok(amount),
            _ => Err(PdgError::NothingToClaim(caller)),
        }
    }

    /// Lock `amount` of unlocked bond.
    ///
    /// # Errors
    /// [`PdgError::InsufficientUnlocked`] when the bond cannot cover it.
    pub fn lock(&mut self, node_operator: Address, amount: Amount) -> Result<(), PdgError> {
        let mut balance = self.balance(&node_operator);
        let available = balance.unlocked();
        if amount > available {
            return Err(PdgError::InsufficientUnlocked {
                requested: amount,
                available,
            });
        }
        balance.locked += amount;
        self.balances.insert(node_operator, balance);
        Ok(())
    }

    /// Release up to `amount` of locked bond back to unlocked.
    ///
    /// A guarantor change may already have cleared the lock, so this
    /// releases what is still there and returns it.
    pub fn release(&mut self, node_operator: Address, amount: Amount) -> Amount {
        let Some(balance) = self.balances.get_mut(&node_operator) else {
            return 0;
        };
        let released = amount.min(balance.locked);
        balance.locked -= released;
        released
    }

    /// Remove up to `amount` of locked bond from the ledger entirely.
    /// Returns what was actually taken.
    pub fn forfeit(&mut self, node_operator: Address, amount: Amount) -> Amount {
        let Some(balance) = self.balances.get_mut(&node_operator) else {
            return 0;
        };
        let taken = amount.min(balance.locked);
        balance.locked -= taken;
        balance.total -= taken;
        taken
    }

    /// Return an undelivered withdrawal to the operator's bond.
    ///
    /// # Errors
    /// [`PdgError::ArithmeticOverflow`].
    pub fn credit_bond(&mut self, node_operator: Address, amount: Amount) -> Result<(), PdgError> {
        let mut balance = self.balance(&node_operator);
        balance.total = balance
            .total
            .checked_add(amount)
            .ok_or(PdgError::ArithmeticOverflow)?;
        self.balances.insert(node_operator, balance);
        Ok(())
    }

    /// Credit `amount` to a pull-only refund bucket.
    ///
    /// # Errors
    /// [`PdgError::ArithmeticOverflow`].
    pub fn credit_claimable(&mut self, owner: Address, amount: Amount) -> Result<(), PdgError> {
        let refund = self
            .claimable_refund(&owner)
            .checked_add(amount)
            .ok_or(PdgError::ArithmeticOverflow)?;
        self.claimable.insert(owner, refund);
        Ok(())
    }
}

fn ensure_positive(amount: Amount) -> Result<(), PdgError> {
    if amount == 0 {
        return Err(PdgError::InvalidArgument("amount must be positive".to_string()));
    }
    Ok(())
}
