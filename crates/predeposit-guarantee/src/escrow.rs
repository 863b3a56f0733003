//! Predeposit guarantee escrow entity
//!
//! Combines the [`BondLedger`] and [`ValidatorLifecycle`] behind one
//! serialized message handler. Every payout is committed locally first and
//! kept in flight under its delivery id until the host reports the outcome;
//! an undeliverable payout is credited back to whoever it was taken from.

use crate::error::PdgError;
use crate::ledger::{BondLedger, NodeOperatorBalance};
use crate::lifecycle::{ValidatorLifecycle, ValidatorRecord, ValidatorStage};
use crate::messages::{PayoutKind, PdgNotification, PdgRequest};
use cl_proof::{
    Address, Amount, Contract, DeliveryId, Envelope, Hash32, Outbound, ReplayGuard, RequestId,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Bond locked per predeposited validator (1 unit at 9 decimals)
pub const PREDEPOSIT_AMOUNT: Amount = 1_000_000_000;

/// A committed payout whose delivery outcome is not yet known
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InFlightPayout {
    pub to: Address,
    pub amount: Amount,
    pub kind: PayoutKind,
}

/// The escrow entity
#[derive(Debug, Clone)]
pub struct PredepositGuarantee {
    admin: Address,
    proof_authority: Address,
    paused: bool,
    ledger: BondLedger,
    lifecycle: ValidatorLifecycle,
    replay: ReplayGuard,
    in_flight: HashMap<DeliveryId, InFlightPayout>,
}

impl PredepositGuarantee {
    #[must_use]
    pub fn new(admin: Address, proof_authority: Address) -> Self {
        Self {
            admin,
            proof_authority,
            paused: false,
            ledger: BondLedger::new(),
            lifecycle: ValidatorLifecycle::new(),
            replay: ReplayGuard::new(),
            in_flight: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn admin(&self) -> Address {
        self.admin
    }

    #[must_use]
    pub const fn proof_authority(&self) -> Address {
        self.proof_authority
    }

    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused
    }

    #[must_use]
    pub const fn predeposit_amount(&self) -> Amount {
        PREDEPOSIT_AMOUNT
    }

    #[must_use]
    pub fn balance(&self, node_operator: &Address) -> NodeOperatorBalance {
        self.ledger.balance(node_operator)
    }

    #[must_use]
    pub fn unlocked_balance(&self, node_operator: &Address) -> Amount {
        self.ledger.unlocked(node_operator)
    }

    #[must_use]
    pub fn guarantor(&self, node_operator: &Address) -> Address {
        self.ledger.guarantor(node_operator)
    }

    #[must_use]
    pub fn depositor(&self, node_operator: &Address) -> Address {
        self.ledger.depositor(node_operator)
    }

    #[must_use]
    pub fn claimable_refund(&self, guarantor: &Address) -> Amount {
        self.ledger.claimable_refund(guarantor)
    }

    #[must_use]
    pub fn validator_stage(&self, pubkey_hash: &Hash32) -> ValidatorStage {
        self.lifecycle.stage(pubkey_hash)
    }

    #[must_use]
    pub fn validator(&self, pubkey_hash: &Hash32) -> Option<&ValidatorRecord> {
        self.lifecycle.record(pubkey_hash)
    }

    #[must_use]
    pub fn pending_activations(&self, staking_vault: &Address) -> u64 {
        self.lifecycle.pending_activations(staking_vault)
    }

    #[must_use]
    pub fn is_processed(&self, request_id: RequestId) -> bool {
        self.replay.is_processed(request_id)
    }

    /// Payout committed under `delivery_id` and not yet settled
    #[must_use]
    pub fn in_flight(&self, delivery_id: DeliveryId) -> Option<&InFlightPayout> {
        self.in_flight.get(&delivery_id)
    }

    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    fn ensure_admin(&self, sender: Address) -> Result<(), PdgError> {
        if sender != self.admin {
            return Err(PdgError::Unauthorized {
                sender,
                role: "admin",
            });
        }
        Ok(())
    }

    fn ensure_proof_authority(&self, sender: Address) -> Result<(), PdgError> {
        if sender != self.proof_authority {
            return Err(PdgError::Unauthorized {
                sender,
                role: "proof authority",
            });
        }
        Ok(())
    }

    /// Record a payout as in flight and build its outbound message
    fn pay(
        &mut self,
        delivery_id: DeliveryId,
        to: Address,
        amount: Amount,
        kind: PayoutKind,
    ) -> Outbound<PdgNotification> {
        self.in_flight.insert(
            delivery_id,
            InFlightPayout {
                to,
                amount,
                kind: kind.clone(),
            },
        );
        Outbound {
            delivery_id,
            to,
            body: PdgNotification::Payout { amount, kind },
        }
    }

    fn apply(
        &mut self,
        sender: Address,
        request_id: RequestId,
        body: PdgRequest,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        let outbound = match body {
            PdgRequest::TopUp {
                node_operator,
                amount,
            } => {
                let balance = self.ledger.top_up(sender, node_operator, amount)?;
                info!(%node_operator, amount, total = balance.total, "Bond topped up");
                Vec::new()
            }
            PdgRequest::Withdraw {
                node_operator,
                amount,
                recipient,
            } => {
                let balance = self.ledger.withdraw(sender, node_operator, amount)?;
                info!(%node_operator, amount, %recipient, total = balance.total, "Bond withdrawn");
                vec![self.pay(
                    request_id,
                    recipient,
                    amount,
                    PayoutKind::Withdrawal { node_operator },
                )]
            }
            PdgRequest::SetGuarantor {
                node_operator,
                new_guarantor,
            } => {
                let moved = self
                    .ledger
                    .set_guarantor(sender, node_operator, new_guarantor)?;
                let unbacked = self.lifecycle.release_bond_backing(&node_operator);
                info!(%node_operator, %new_guarantor, moved, unbacked, "Guarantor changed");
                Vec::new()
            }
            PdgRequest::SetDepositor {
                node_operator,
                new_depositor,
            } => {
                self.ledger
                    .set_depositor(sender, node_operator, new_depositor)?;
                info!(%node_operator, %new_depositor, "Depositor changed");
                Vec::new()
            }
            PdgRequest::ClaimGuarantorRefund { recipient } => {
                let amount = self.ledger.claim_refund(sender)?;
                info!(guarantor = %sender, %recipient, amount, "Guarantor refund claimed");
                vec![self.pay(
                    request_id,
                    recipient,
                    amount,
                    PayoutKind::GuarantorRefund { guarantor: sender },
                )]
            }
            PdgRequest::Predeposit {
                node_operator,
                staking_vault,
                pubkey_hash,
            } => {
                self.ledger
                    .ensure_operator_or_depositor(sender, &node_operator)?;
                self.lifecycle.ensure_new(&pubkey_hash)?;
                self.ledger.lock(node_operator, PREDEPOSIT_AMOUNT)?;
                self.lifecycle
                    .predeposit(pubkey_hash, staking_vault, node_operator)?;
                info!(
                    %node_operator,
                    %staking_vault,
                    pubkey_hash = %hex::encode(pubkey_hash),
                    "Validator predeposited"
                );
                Vec::new()
            }
            PdgRequest::ProveWcAndActivate {
                pubkey_hash,
                proof_hash,
            } => {
                self.ensure_proof_authority(sender)?;
                let backed = self.lifecycle.ensure_predeposited(&pubkey_hash)?.bond_locked;
                let record = self
                    .lifecycle
                    .finish(&pubkey_hash, ValidatorStage::Activated, proof_hash)?;
                let released = if backed {
                    self.ledger.release(record.node_operator, PREDEPOSIT_AMOUNT)
                } else {
                    0
                };
                info!(
                    pubkey_hash = %hex::encode(pubkey_hash),
                    node_operator = %record.node_operator,
                    released,
                    "Validator activated"
                );
                vec![Outbound {
                    delivery_id: request_id,
                    to: record.staking_vault,
                    body: PdgNotification::ValidatorActivated { pubkey_hash },
                }]
            }
            PdgRequest::ProveInvalidValidatorWc {
                pubkey_hash,
                proof_hash,
            } => {
                self.ensure_proof_authority(sender)?;
                let backed = self.lifecycle.ensure_predeposited(&pubkey_hash)?.bond_locked;
                let record = self
                    .lifecycle
                    .finish(&pubkey_hash, ValidatorStage::Compensated, proof_hash)?;
                let forfeited = if backed {
                    self.ledger.forfeit(record.node_operator, PREDEPOSIT_AMOUNT)
                } else {
                    0
                };
                info!(
                    pubkey_hash = %hex::encode(pubkey_hash),
                    staking_vault = %record.staking_vault,
                    forfeited,
                    "Validator compensated"
                );
                if forfeited == 0 {
                    warn!(
                        node_operator = %record.node_operator,
                        "No locked bond left to compensate"
                    );
                    Vec::new()
                } else {
                    vec![self.pay(
                        request_id,
                        record.staking_vault,
                        forfeited,
                        PayoutKind::Compensation {
                            staking_vault: record.staking_vault,
                            pubkey_hash,
                        },
                    )]
                }
            }
            PdgRequest::Pause => {
                self.ensure_admin(sender)?;
                self.paused = true;
                info!("Escrow paused");
                Vec::new()
            }
            PdgRequest::Resume => {
                self.ensure_admin(sender)?;
                self.paused = false;
                info!("Escrow resumed");
                Vec::new()
            }
        };
        Ok(outbound)
    }
}

impl Contract for PredepositGuarantee {
    type Request = PdgRequest;
    type Notification = PdgNotification;
    type Error = PdgError;

    fn name(&self) -> &'static str {
        "guarantee"
    }

    fn handle(
        &mut self,
        msg: Envelope<PdgRequest>,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        let Envelope {
            sender,
            request_id,
            body,
        } = msg;
        self.replay.ensure_fresh(request_id)?;
        if self.paused && body.blocked_by_pause() {
            return Err(PdgError::Paused);
        }

        let outbound = self.apply(sender, request_id, body)?;
        self.replay.consume(request_id);
        Ok(outbound)
    }

    fn on_delivery_failed(
        &mut self,
        failed: &Outbound<PdgNotification>,
    ) -> Result<(), PdgError> {
        if let PdgNotification::ValidatorActivated { pubkey_hash } = &failed.body {
            warn!(
                to = %failed.to,
                pubkey_hash = %hex::encode(pubkey_hash),
                "Activation notice undeliverable"
            );
            return Ok(());
        }

        let payout = self
            .in_flight
            .get(&failed.delivery_id)
            .ok_or(PdgError::UnknownDelivery(failed.delivery_id))?;

        match &payout.kind {
            PayoutKind::Withdrawal { node_operator } => {
                self.ledger.credit_bond(*node_operator, payout.amount)?;
            }
            PayoutKind::GuarantorRefund { guarantor } => {
                self.ledger.credit_claimable(*guarantor, payout.amount)?;
            }
            PayoutKind::Compensation { staking_vault, .. } => {
                self.ledger.credit_claimable(*staking_vault, payout.amount)?;
            }
        }
        warn!(
            delivery_id = failed.delivery_id,
            to = %payout.to,
            amount = payout.amount,
            kind = ?payout.kind,
            "Payout undeliverable, credited back"
        );
        self.in_flight.remove(&failed.delivery_id);
        Ok(())
    }

    fn on_delivered(&mut self, delivered: &Outbound<PdgNotification>) -> Result<(), PdgError> {
        if matches!(delivered.body, PdgNotification::ValidatorActivated { .. }) {
            return Ok(());
        }
        self.in_flight
            .remove(&delivered.delivery_id)
            .ok_or(PdgError::UnknownDelivery(delivered.delivery_id))?;
        debug!(delivery_id = delivered.delivery_id, "Payout settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_proof::hash::word_from_u128;

    fn admin() -> Address {
        Address::from_label("admin")
    }
    fn proof_verifier() -> Address {
        Address::from_label("proofVerifier")
    }
    fn node_operator() -> Address {
        Address::from_label("nodeOperator")
    }
    fn guarantor() -> Address {
        Address::from_label("guarantor")
    }
    fn depositor() -> Address {
        Address::from_label("depositor")
    }
    fn vault() -> Address {
        Address::from_label("vault")
    }
    fn recipient() -> Address {
        Address::from_label("recipient")
    }
    fn random_user() -> Address {
        Address::from_label("random")
    }

    fn validator_pubkey() -> Hash32 {
        word_from_u128(12345)
    }

    fn pdg() -> PredepositGuarantee {
        PredepositGuarantee::new(admin(), proof_verifier())
    }

    fn send(
        pdg: &mut PredepositGuarantee,
        sender: Address,
        request_id: RequestId,
        body: PdgRequest,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        pdg.handle(Envelope::new(sender, request_id, body))
    }

    fn top_up(pdg: &mut PredepositGuarantee, request_id: RequestId, amount: Amount) {
        send(
            pdg,
            node_operator(),
            request_id,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount,
            },
        )
        .expect("top up");
    }

    fn predeposit(
        pdg: &mut PredepositGuarantee,
        request_id: RequestId,
        pubkey_hash: Hash32,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        send(
            pdg,
            node_operator(),
            request_id,
            PdgRequest::Predeposit {
                node_operator: node_operator(),
                staking_vault: vault(),
                pubkey_hash,
            },
        )
    }

    fn prove_valid(
        pdg: &mut PredepositGuarantee,
        sender: Address,
        request_id: RequestId,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        send(
            pdg,
            sender,
            request_id,
            PdgRequest::ProveWcAndActivate {
                pubkey_hash: validator_pubkey(),
                proof_hash: word_from_u128(999),
            },
        )
    }

    fn withdraw(
        pdg: &mut PredepositGuarantee,
        sender: Address,
        request_id: RequestId,
        amount: Amount,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        send(
            pdg,
            sender,
            request_id,
            PdgRequest::Withdraw {
                node_operator: node_operator(),
                amount,
                recipient: recipient(),
            },
        )
    }

    fn set_guarantor(
        pdg: &mut PredepositGuarantee,
        request_id: RequestId,
    ) -> Result<Vec<Outbound<PdgNotification>>, PdgError> {
        send(
            pdg,
            node_operator(),
            request_id,
            PdgRequest::SetGuarantor {
                node_operator: node_operator(),
                new_guarantor: guarantor(),
            },
        )
    }

    #[test]
    fn test_self_guarantor_can_top_up() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        assert!(pdg.balance(&node_operator()).total >= PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_self_guarantor_can_withdraw_unlocked_balance() {
        let mut pdg = pdg();
        top_up(&mut pdg, 2, PREDEPOSIT_AMOUNT);

        let out = withdraw(&mut pdg, node_operator(), 3, PREDEPOSIT_AMOUNT).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, recipient());
        assert_eq!(out[0].body.amount(), PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.balance(&node_operator()).total, 0);
        assert!(pdg.in_flight(3).is_some());
    }

    #[test]
    fn test_non_guarantor_cannot_top_up() {
        let mut pdg = pdg();
        let err = send(
            &mut pdg,
            random_user(),
            4,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount: PREDEPOSIT_AMOUNT,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert!(!pdg.is_processed(4));
    }

    #[test]
    fn test_cannot_withdraw_more_than_unlocked() {
        let mut pdg = pdg();
        top_up(&mut pdg, 5, PREDEPOSIT_AMOUNT);
        let err = withdraw(&mut pdg, node_operator(), 6, PREDEPOSIT_AMOUNT * 2).unwrap_err();
        assert_eq!(err.kind(), "insufficient_unlocked");
        assert_eq!(pdg.in_flight_count(), 0);
    }

    #[test]
    fn test_zero_value_top_up_is_rejected() {
        let mut pdg = pdg();
        let err = send(
            &mut pdg,
            node_operator(),
            7,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount: 0,
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn test_operator_can_set_external_guarantor() {
        let mut pdg = pdg();
        set_guarantor(&mut pdg, 10).unwrap();
        assert_eq!(pdg.guarantor(&node_operator()), guarantor());
    }

    #[test]
    fn test_cannot_set_same_guarantor() {
        let mut pdg = pdg();
        set_guarantor(&mut pdg, 11).unwrap();
        let err = set_guarantor(&mut pdg, 12).unwrap_err();
        assert_eq!(err, PdgError::NoOpGuarantorChange(guarantor()));
    }

    #[test]
    fn test_changing_guarantor_with_balance_creates_claimable_refund() {
        let mut pdg = pdg();
        top_up(&mut pdg, 13, PREDEPOSIT_AMOUNT);
        set_guarantor(&mut pdg, 14).unwrap();
        assert!(pdg.claimable_refund(&node_operator()) >= PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_guarantor_can_claim_refund() {
        let mut pdg = pdg();
        top_up(&mut pdg, 15, PREDEPOSIT_AMOUNT);
        set_guarantor(&mut pdg, 16).unwrap();

        let out = send(
            &mut pdg,
            node_operator(),
            17,
            PdgRequest::ClaimGuarantorRefund {
                recipient: recipient(),
            },
        )
        .unwrap();
        assert_eq!(out[0].body.amount(), PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.claimable_refund(&node_operator()), 0);
    }

    #[test]
    fn test_cannot_claim_with_nothing_to_refund() {
        let mut pdg = pdg();
        let err = send(
            &mut pdg,
            random_user(),
            18,
            PdgRequest::ClaimGuarantorRefund {
                recipient: recipient(),
            },
        )
        .unwrap_err();
        assert_eq!(err, PdgError::NothingToClaim(random_user()));
    }

    #[test]
    fn test_external_guarantor_can_top_up_and_withdraw() {
        let mut pdg = pdg();
        set_guarantor(&mut pdg, 19).unwrap();
        send(
            &mut pdg,
            guarantor(),
            20,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount: PREDEPOSIT_AMOUNT,
            },
        )
        .unwrap();
        withdraw(&mut pdg, guarantor(), 21, PREDEPOSIT_AMOUNT).unwrap();
    }

    #[test]
    fn test_predeposit_creates_predeposited_validator() {
        let mut pdg = pdg();
        top_up(&mut pdg, 29, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 30, validator_pubkey()).unwrap();

        assert_eq!(pdg.validator_stage(&validator_pubkey()).code(), 1);
        assert_eq!(
            pdg.balance(&node_operator()),
            NodeOperatorBalance {
                total: PREDEPOSIT_AMOUNT,
                locked: PREDEPOSIT_AMOUNT
            }
        );
    }

    #[test]
    fn test_predeposit_needs_unlocked_bond() {
        let mut pdg = pdg();
        let err = predeposit(&mut pdg, 30, validator_pubkey()).unwrap_err();
        assert_eq!(err.kind(), "insufficient_unlocked");
        assert_eq!(pdg.validator_stage(&validator_pubkey()), ValidatorStage::None);
    }

    #[test]
    fn test_cannot_predeposit_same_validator_twice() {
        let mut pdg = pdg();
        top_up(&mut pdg, 100, PREDEPOSIT_AMOUNT * 2);
        predeposit(&mut pdg, 31, validator_pubkey()).unwrap();

        let err = predeposit(&mut pdg, 32, validator_pubkey()).unwrap_err();
        assert_eq!(err, PdgError::DuplicateValidator(validator_pubkey()));
        assert_eq!(pdg.balance(&node_operator()).locked, PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_depositor_can_predeposit_for_operator() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        let request = PdgRequest::Predeposit {
            node_operator: node_operator(),
            staking_vault: vault(),
            pubkey_hash: validator_pubkey(),
        };

        let err = send(&mut pdg, depositor(), 2, request.clone()).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");

        send(
            &mut pdg,
            node_operator(),
            3,
            PdgRequest::SetDepositor {
                node_operator: node_operator(),
                new_depositor: depositor(),
            },
        )
        .unwrap();
        assert_eq!(pdg.depositor(&node_operator()), depositor());
        send(&mut pdg, depositor(), 4, request).unwrap();
    }

    #[test]
    fn test_proof_verifier_can_prove_and_activate() {
        let mut pdg = pdg();
        top_up(&mut pdg, 101, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 33, validator_pubkey()).unwrap();

        let out = prove_valid(&mut pdg, proof_verifier(), 34).unwrap();
        assert_eq!(pdg.validator_stage(&validator_pubkey()).code(), 3);
        assert_eq!(pdg.balance(&node_operator()).locked, 0);
        assert_eq!(out[0].to, vault());
        assert_eq!(
            pdg.validator(&validator_pubkey()).unwrap().proof_hash,
            Some(word_from_u128(999))
        );
    }

    #[test]
    fn test_non_verifier_cannot_prove() {
        let mut pdg = pdg();
        top_up(&mut pdg, 102, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 35, validator_pubkey()).unwrap();

        let err = prove_valid(&mut pdg, random_user(), 36).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(pdg.validator_stage(&validator_pubkey()), ValidatorStage::Predeposited);
    }

    #[test]
    fn test_prove_unknown_validator_is_invalid_transition() {
        let mut pdg = pdg();
        let err = prove_valid(&mut pdg, proof_verifier(), 36).unwrap_err();
        assert_eq!(
            err,
            PdgError::InvalidStateTransition {
                pubkey_hash: validator_pubkey(),
                from: ValidatorStage::None
            }
        );
    }

    #[test]
    fn test_prove_invalid_wc_compensates_vault() {
        let mut pdg = pdg();
        top_up(&mut pdg, 37, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 38, validator_pubkey()).unwrap();

        let out = send(
            &mut pdg,
            proof_verifier(),
            39,
            PdgRequest::ProveInvalidValidatorWc {
                pubkey_hash: validator_pubkey(),
                proof_hash: word_from_u128(888),
            },
        )
        .unwrap();

        assert_eq!(pdg.validator_stage(&validator_pubkey()).code(), 4);
        assert_eq!(pdg.balance(&node_operator()), NodeOperatorBalance::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, vault());
        assert_eq!(out[0].body.amount(), PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.pending_activations(&vault()), 0);
    }

    #[test]
    fn test_activated_validator_cannot_be_compensated() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 2, validator_pubkey()).unwrap();
        prove_valid(&mut pdg, proof_verifier(), 3).unwrap();

        let err = send(
            &mut pdg,
            proof_verifier(),
            4,
            PdgRequest::ProveInvalidValidatorWc {
                pubkey_hash: validator_pubkey(),
                proof_hash: word_from_u128(888),
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_state_transition");
    }

    #[test]
    fn test_query_replay_is_rejected() {
        let mut pdg = pdg();
        top_up(&mut pdg, 104, PREDEPOSIT_AMOUNT * 2);
        predeposit(&mut pdg, 50, validator_pubkey()).unwrap();

        let err = predeposit(&mut pdg, 50, word_from_u128(99999)).unwrap_err();
        assert_eq!(err, PdgError::AlreadyProcessed(50));
        assert_eq!(pdg.validator_stage(&word_from_u128(99999)), ValidatorStage::None);
    }

    #[test]
    fn test_rejected_request_id_can_be_retried() {
        let mut pdg = pdg();
        assert!(predeposit(&mut pdg, 70, validator_pubkey()).is_err());
        top_up(&mut pdg, 71, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 70, validator_pubkey()).unwrap();
    }

    #[test]
    fn test_operations_fail_when_paused() {
        let mut pdg = pdg();
        send(&mut pdg, admin(), 51, PdgRequest::Pause).unwrap();
        assert!(pdg.is_paused());

        let err = send(
            &mut pdg,
            node_operator(),
            52,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount: PREDEPOSIT_AMOUNT,
            },
        )
        .unwrap_err();
        assert_eq!(err, PdgError::Paused);
        assert!(!pdg.is_processed(52));
    }

    #[test]
    fn test_admin_can_pause_and_resume() {
        let mut pdg = pdg();
        send(&mut pdg, admin(), 53, PdgRequest::Pause).unwrap();
        assert!(pdg.is_paused());
        send(&mut pdg, admin(), 54, PdgRequest::Resume).unwrap();
        assert!(!pdg.is_paused());
    }

    #[test]
    fn test_non_admin_cannot_pause() {
        let mut pdg = pdg();
        let err = send(&mut pdg, random_user(), 55, PdgRequest::Pause).unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert!(!pdg.is_paused());
    }

    #[test]
    fn test_getters_return_defaults() {
        let pdg = pdg();
        assert_eq!(pdg.balance(&random_user()), NodeOperatorBalance::default());
        assert_eq!(pdg.unlocked_balance(&random_user()), 0);
        assert_eq!(pdg.validator_stage(&[0; 32]).code(), 0);
        assert_eq!(pdg.pending_activations(&vault()), 0);
        assert_eq!(pdg.predeposit_amount(), PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.guarantor(&random_user()), random_user());
        assert_eq!(pdg.admin(), admin());
        assert_eq!(pdg.proof_authority(), proof_verifier());
    }

    #[test]
    fn test_set_depositor_works() {
        let mut pdg = pdg();
        send(
            &mut pdg,
            node_operator(),
            60,
            PdgRequest::SetDepositor {
                node_operator: node_operator(),
                new_depositor: depositor(),
            },
        )
        .unwrap();
        assert_eq!(pdg.depositor(&node_operator()), depositor());
    }

    #[test]
    fn test_pending_activations_tracks_correctly() {
        let mut pdg = pdg();
        top_up(&mut pdg, 103, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 61, validator_pubkey()).unwrap();
        assert_eq!(pdg.pending_activations(&vault()), 1);

        prove_valid(&mut pdg, proof_verifier(), 62).unwrap();
        assert_eq!(pdg.pending_activations(&vault()), 0);
    }

    #[test]
    fn test_failed_withdraw_credits_bond_once() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        let out = withdraw(&mut pdg, node_operator(), 2, PREDEPOSIT_AMOUNT).unwrap();
        assert_eq!(pdg.balance(&node_operator()).total, 0);

        pdg.on_delivery_failed(&out[0]).unwrap();
        assert_eq!(pdg.balance(&node_operator()).total, PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.in_flight_count(), 0);

        let err = pdg.on_delivery_failed(&out[0]).unwrap_err();
        assert_eq!(err, PdgError::UnknownDelivery(2));
        assert_eq!(pdg.balance(&node_operator()).total, PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_failed_refund_is_claimable_again() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        set_guarantor(&mut pdg, 2).unwrap();
        let out = send(
            &mut pdg,
            node_operator(),
            3,
            PdgRequest::ClaimGuarantorRefund {
                recipient: recipient(),
            },
        )
        .unwrap();

        pdg.on_delivery_failed(&out[0]).unwrap();
        assert_eq!(pdg.claimable_refund(&node_operator()), PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_failed_compensation_is_claimable_by_vault() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 2, validator_pubkey()).unwrap();
        let out = send(
            &mut pdg,
            proof_verifier(),
            3,
            PdgRequest::ProveInvalidValidatorWc {
                pubkey_hash: validator_pubkey(),
                proof_hash: word_from_u128(888),
            },
        )
        .unwrap();

        pdg.on_delivery_failed(&out[0]).unwrap();
        assert_eq!(pdg.claimable_refund(&vault()), PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.validator_stage(&validator_pubkey()), ValidatorStage::Compensated);
    }

    #[test]
    fn test_delivery_confirmation_settles_payout() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        let out = withdraw(&mut pdg, node_operator(), 2, PREDEPOSIT_AMOUNT).unwrap();

        pdg.on_delivered(&out[0]).unwrap();
        assert_eq!(pdg.in_flight_count(), 0);
        assert_eq!(
            pdg.on_delivery_failed(&out[0]).unwrap_err(),
            PdgError::UnknownDelivery(2)
        );
    }

    #[test]
    fn test_reconciliation_runs_while_paused() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        let out = withdraw(&mut pdg, node_operator(), 2, PREDEPOSIT_AMOUNT).unwrap();
        send(&mut pdg, admin(), 3, PdgRequest::Pause).unwrap();

        pdg.on_delivery_failed(&out[0]).unwrap();
        assert_eq!(pdg.balance(&node_operator()).total, PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_guarantor_change_after_predeposit_leaves_nothing_to_forfeit() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 2, validator_pubkey()).unwrap();
        set_guarantor(&mut pdg, 3).unwrap();

        let out = send(
            &mut pdg,
            proof_verifier(),
            4,
            PdgRequest::ProveInvalidValidatorWc {
                pubkey_hash: validator_pubkey(),
                proof_hash: word_from_u128(888),
            },
        )
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(pdg.claimable_refund(&node_operator()), PREDEPOSIT_AMOUNT);
    }

    #[test]
    fn test_guarantor_change_leaves_new_lock_for_new_validator() {
        let mut pdg = pdg();
        let old_key = word_from_u128(1);
        let new_key = word_from_u128(2);
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 2, old_key).unwrap();
        set_guarantor(&mut pdg, 3).unwrap();
        send(
            &mut pdg,
            guarantor(),
            4,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount: PREDEPOSIT_AMOUNT,
            },
        )
        .unwrap();
        predeposit(&mut pdg, 5, new_key).unwrap();

        let invalidate = |pdg: &mut PredepositGuarantee, request_id, pubkey_hash| {
            send(
                pdg,
                proof_verifier(),
                request_id,
                PdgRequest::ProveInvalidValidatorWc {
                    pubkey_hash,
                    proof_hash: word_from_u128(888),
                },
            )
        };

        // the old record lost its backing when the guarantor changed
        let out = invalidate(&mut pdg, 6, old_key).unwrap();
        assert!(out.is_empty());
        assert_eq!(pdg.validator_stage(&old_key).code(), 4);
        assert_eq!(
            pdg.balance(&node_operator()),
            NodeOperatorBalance {
                total: PREDEPOSIT_AMOUNT,
                locked: PREDEPOSIT_AMOUNT,
            }
        );

        let out = invalidate(&mut pdg, 7, new_key).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, vault());
        assert_eq!(out[0].body.amount(), PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.balance(&node_operator()), NodeOperatorBalance::default());
    }

    #[test]
    fn test_activating_unbacked_validator_releases_nothing() {
        let mut pdg = pdg();
        top_up(&mut pdg, 1, PREDEPOSIT_AMOUNT);
        predeposit(&mut pdg, 2, validator_pubkey()).unwrap();
        set_guarantor(&mut pdg, 3).unwrap();
        send(
            &mut pdg,
            guarantor(),
            4,
            PdgRequest::TopUp {
                node_operator: node_operator(),
                amount: PREDEPOSIT_AMOUNT,
            },
        )
        .unwrap();
        predeposit(&mut pdg, 5, word_from_u128(2)).unwrap();

        prove_valid(&mut pdg, proof_verifier(), 6).unwrap();
        assert_eq!(pdg.validator_stage(&validator_pubkey()), ValidatorStage::Activated);
        assert_eq!(pdg.balance(&node_operator()).locked, PREDEPOSIT_AMOUNT);
        assert_eq!(pdg.unlocked_balance(&node_operator()), 0);
    }
}
