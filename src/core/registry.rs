//! Position registry.
//!
//! Owns every trove plus, per cohort, the risk-ordered index, the
//! redistribution ledger and the stake totals. All ratio reads here use
//! *entire* amounts (recorded plus pending redistribution) so ordering and
//! liquidation decisions never act on stale recorded values.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::core::accrual::PricingContext;
use crate::core::interactions::Interactions;
use crate::core::pools::{PoolId, Pools};
use crate::core::rewards::RewardsLedger;
use crate::core::sorted_troves::{InsertHint, SortedTroves};
use crate::core::trove::{Cohort, RewardSnapshot, Trove, TroveStatus};
use crate::error::{Error, Result};
use crate::utils::constants::WAD;
use crate::utils::crypto::{AccountId, Hash, TroveId};
use crate::utils::math::{compute_cr, compute_nominal_cr, mul_div, safe_add};

// ═══════════════════════════════════════════════════════════════════════════════
// COHORT BOOK
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-cohort index, rewards and stake totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortBook {
    cohort: Cohort,
    sorted: SortedTroves,
    rewards: RewardsLedger,
    total_stakes: u128,
    /// Total stakes right after the last liquidation
    total_stakes_snapshot: u128,
    /// Active plus pending collateral right after the last liquidation
    total_collateral_snapshot: u128,
    /// Sum of recorded normalized debt of open positions
    active_normalized_debt: u128,
}

impl CohortBook {
    fn new(cohort: Cohort) -> Self {
        Self {
            cohort,
            sorted: SortedTroves::new(),
            rewards: RewardsLedger::new(),
            total_stakes: 0,
            total_stakes_snapshot: 0,
            total_collateral_snapshot: 0,
            active_normalized_debt: 0,
        }
    }

    /// Cohort tag
    pub fn cohort(&self) -> Cohort {
        self.cohort
    }

    /// Risk-ordered index
    pub fn sorted(&self) -> &SortedTroves {
        &self.sorted
    }

    /// Redistribution ledger
    pub fn rewards(&self) -> &RewardsLedger {
        &self.rewards
    }

    /// Sum of open stakes
    pub fn total_stakes(&self) -> u128 {
        self.total_stakes
    }

    /// Stake total at the last snapshot
    pub fn total_stakes_snapshot(&self) -> u128 {
        self.total_stakes_snapshot
    }

    /// Collateral total at the last snapshot
    pub fn total_collateral_snapshot(&self) -> u128 {
        self.total_collateral_snapshot
    }

    /// Recorded normalized debt of open positions
    pub fn active_normalized_debt(&self) -> u128 {
        self.active_normalized_debt
    }

    /// Redistributed normalized debt not yet applied
    pub fn pending_normalized_debt(&self) -> u128 {
        self.rewards.pending_debt()
    }

    /// All normalized debt attributed to this cohort
    pub fn total_normalized_debt(&self) -> u128 {
        self.active_normalized_debt
            .saturating_add(self.rewards.pending_debt())
    }

    /// Canonical encoding: list order, ledger and totals
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&bincode::serialize(&self.sorted.to_vec()).unwrap_or_default());
        out.extend_from_slice(&bincode::serialize(&self.rewards).unwrap_or_default());
        for value in [
            self.total_stakes,
            self.total_stakes_snapshot,
            self.total_collateral_snapshot,
            self.active_normalized_debt,
        ] {
            out.extend_from_slice(&value.to_be_bytes());
        }
    }

    /// Stake for `collateral` at the current snapshot ratio
    fn compute_stake(&self, collateral: u128) -> Result<u128> {
        if self.total_collateral_snapshot == 0 {
            Ok(collateral)
        } else {
            mul_div(
                collateral,
                self.total_stakes_snapshot,
                self.total_collateral_snapshot,
            )
        }
    }
}

/// Recorded values plus pending redistribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntireDebtAndColl {
    /// Actual debt including pending
    pub debt: u128,
    /// Collateral including pending
    pub collateral: u128,
    /// Normalized debt including pending
    pub normalized_debt: u128,
    /// Actual pending debt
    pub pending_debt: u128,
    /// Pending collateral
    pub pending_collateral: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Store of all positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveRegistry {
    troves: HashMap<TroveId, Trove>,
    /// Open positions; each trove's `array_index` points into this
    owners: Vec<TroveId>,
    standard: CohortBook,
    shielded: CohortBook,
    nonce: u64,
}

impl Default for TroveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TroveRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            troves: HashMap::new(),
            owners: Vec::new(),
            standard: CohortBook::new(Cohort::Standard),
            shielded: CohortBook::new(Cohort::Shielded),
            nonce: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // READS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Position by id, open or closed
    pub fn get(&self, id: &TroveId) -> Option<&Trove> {
        self.troves.get(id)
    }

    /// Lifecycle status; unknown ids are `NonExistent`
    pub fn status(&self, id: &TroveId) -> TroveStatus {
        self.troves
            .get(id)
            .map(|t| t.status)
            .unwrap_or(TroveStatus::NonExistent)
    }

    /// Open position by id
    pub fn active(&self, id: &TroveId) -> Result<&Trove> {
        match self.troves.get(id) {
            Some(trove) if trove.is_active() => Ok(trove),
            Some(trove) => Err(Error::InvalidPosition(format!(
                "{} is {:?}",
                id.short(),
                trove.status
            ))),
            None => Err(Error::InvalidPosition(format!("{} does not exist", id.short()))),
        }
    }

    /// Cohort book
    pub fn book(&self, cohort: Cohort) -> &CohortBook {
        match cohort {
            Cohort::Standard => &self.standard,
            Cohort::Shielded => &self.shielded,
        }
    }

    fn book_mut(&mut self, cohort: Cohort) -> &mut CohortBook {
        match cohort {
            Cohort::Standard => &mut self.standard,
            Cohort::Shielded => &mut self.shielded,
        }
    }

    /// Book and trove map borrowed together
    fn split(&mut self, cohort: Cohort) -> (&mut CohortBook, &mut HashMap<TroveId, Trove>) {
        let book = match cohort {
            Cohort::Standard => &mut self.standard,
            Cohort::Shielded => &mut self.shielded,
        };
        (book, &mut self.troves)
    }

    /// Open positions in owner-array order
    pub fn owners(&self) -> &[TroveId] {
        &self.owners
    }

    /// Number of open positions
    pub fn active_count(&self) -> usize {
        self.owners.len()
    }

    /// Open positions
    pub fn iter_active(&self) -> impl Iterator<Item = &Trove> {
        self.owners.iter().filter_map(|id| self.troves.get(id))
    }

    /// Open positions of one owner
    pub fn troves_of(&self, owner: &AccountId) -> Vec<TroveId> {
        self.iter_active()
            .filter(|t| t.owner == *owner)
            .map(|t| t.id)
            .collect()
    }

    /// Riskiest position of a cohort
    pub fn last(&self, cohort: Cohort) -> Option<TroveId> {
        self.book(cohort).sorted.last()
    }

    /// Safest position of a cohort
    pub fn first(&self, cohort: Cohort) -> Option<TroveId> {
        self.book(cohort).sorted.first()
    }

    /// Next safer position in the same cohort
    pub fn prev(&self, cohort: Cohort, id: &TroveId) -> Option<TroveId> {
        self.book(cohort).sorted.prev(id)
    }

    /// Next riskier position in the same cohort
    pub fn next(&self, cohort: Cohort, id: &TroveId) -> Option<TroveId> {
        self.book(cohort).sorted.next(id)
    }

    /// Pending collateral reward of a position
    pub fn pending_collateral_reward(&self, id: &TroveId) -> Result<u128> {
        let trove = self.active(id)?;
        self.book(trove.cohort)
            .rewards
            .pending_collateral_reward(trove.stake, &trove.snapshot)
    }

    /// Pending normalized debt reward of a position
    pub fn pending_debt_reward(&self, id: &TroveId) -> Result<u128> {
        let trove = self.active(id)?;
        self.book(trove.cohort)
            .rewards
            .pending_debt_reward(trove.stake, &trove.snapshot)
    }

    /// Whether a position has unapplied redistribution
    pub fn has_pending_rewards(&self, id: &TroveId) -> bool {
        match self.active(id) {
            Ok(trove) => self.book(trove.cohort).rewards.has_pending(&trove.snapshot),
            Err(_) => false,
        }
    }

    /// Recorded values plus pending redistribution at `accumulated_rate`
    pub fn entire_debt_and_coll(
        &self,
        id: &TroveId,
        accumulated_rate: u128,
    ) -> Result<EntireDebtAndColl> {
        let trove = self.active(id)?;
        let rewards = &self.book(trove.cohort).rewards;
        let pending_collateral = rewards.pending_collateral_reward(trove.stake, &trove.snapshot)?;
        let pending_normalized = rewards.pending_debt_reward(trove.stake, &trove.snapshot)?;

        let normalized_debt = safe_add(trove.normalized_debt, pending_normalized)?;
        Ok(EntireDebtAndColl {
            debt: mul_div(normalized_debt, accumulated_rate, WAD)?,
            collateral: safe_add(trove.collateral, pending_collateral)?,
            normalized_debt,
            pending_debt: mul_div(pending_normalized, accumulated_rate, WAD)?,
            pending_collateral,
        })
    }

    /// Individual collateral ratio with par-adjusted entire debt
    pub fn current_icr(&self, id: &TroveId, pricing: &PricingContext) -> Result<u128> {
        let cohort = self.active(id)?.cohort;
        let entire = self.entire_debt_and_coll(id, pricing.accumulated(cohort))?;
        Ok(compute_cr(
            entire.collateral,
            entire.debt,
            pricing.price,
            pricing.par,
        ))
    }

    /// Nominal ratio used for ordering
    pub fn nominal_icr(&self, id: &TroveId) -> Result<u128> {
        let trove = self.active(id)?;
        Ok(entire_nicr(trove, &self.book(trove.cohort).rewards))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register a new position and index it
    pub fn open(
        &mut self,
        owner: AccountId,
        cohort: Cohort,
        collateral: u128,
        normalized_debt: u128,
        now: u64,
        hint: InsertHint,
    ) -> Result<TroveId> {
        let id = TroveId::generate(&owner, self.nonce);
        if self.troves.contains_key(&id) {
            return Err(Error::Internal(format!("trove id collision {}", id.short())));
        }
        self.nonce += 1;

        let array_index = self.owners.len();
        let (book, troves) = self.split(cohort);
        let stake = book.compute_stake(collateral)?;
        let nicr = compute_nominal_cr(collateral, normalized_debt);
        {
            let CohortBook { sorted, rewards, .. } = &mut *book;
            let troves = &*troves;
            sorted.insert(id, nicr, hint, |k| lookup_nicr(troves, rewards, k))?;
        }
        book.total_stakes = safe_add(book.total_stakes, stake)?;
        book.active_normalized_debt = safe_add(book.active_normalized_debt, normalized_debt)?;
        let snapshot = book.rewards.snapshot();

        troves.insert(
            id,
            Trove {
                id,
                owner,
                cohort,
                collateral,
                normalized_debt,
                stake,
                status: TroveStatus::Active,
                array_index,
                snapshot,
                opened_at: now,
                last_updated: now,
            },
        );
        self.owners.push(id);

        debug!(trove = %id.short(), %cohort, collateral, normalized_debt, stake, "Trove opened");
        Ok(id)
    }

    /// Fold pending redistribution into a position.
    ///
    /// Moves the matching amounts from the Default pool to the cohort's
    /// active pool. Returns `false` when there was nothing to apply.
    pub fn apply_pending_rewards(
        &mut self,
        id: &TroveId,
        pools: &mut Pools,
        accumulated_rate: u128,
        now: u64,
        fx: &mut Interactions,
    ) -> Result<bool> {
        let (cohort, stake, snapshot) = {
            let trove = self.active(id)?;
            (trove.cohort, trove.stake, trove.snapshot)
        };

        let (book, troves) = self.split(cohort);
        if !book.rewards.has_pending(&snapshot) {
            return Ok(false);
        }

        let pending_collateral = book.rewards.pending_collateral_reward(stake, &snapshot)?;
        let pending_normalized = book.rewards.pending_debt_reward(stake, &snapshot)?;
        book.rewards.settle(pending_collateral, pending_normalized);
        book.active_normalized_debt = safe_add(book.active_normalized_debt, pending_normalized)?;
        let new_snapshot = book.rewards.snapshot();

        let trove = troves
            .get_mut(id)
            .ok_or_else(|| Error::InvalidPosition(format!("{} does not exist", id.short())))?;
        trove.collateral = safe_add(trove.collateral, pending_collateral)?;
        trove.normalized_debt = safe_add(trove.normalized_debt, pending_normalized)?;
        trove.snapshot = new_snapshot;
        trove.last_updated = now;

        // Per-trove rounding can exceed what the pool holds by dust
        let debt_moved = pools
            .default
            .release_debt(mul_div(pending_normalized, accumulated_rate, WAD)?);
        let collateral_moved = pools.default.release_collateral(pending_collateral);
        let active = pools.active_mut(cohort);
        active.increase_collateral(collateral_moved)?;
        active.increase_debt(debt_moved)?;
        fx.transfer_collateral(PoolId::Default, PoolId::active_for(cohort), collateral_moved);

        debug!(
            trove = %id.short(),
            collateral = pending_collateral,
            normalized_debt = pending_normalized,
            "Pending rewards applied"
        );
        Ok(true)
    }

    /// Replace a position's recorded amounts, refresh its stake and reorder it
    pub fn resize(
        &mut self,
        id: &TroveId,
        collateral: u128,
        normalized_debt: u128,
        now: u64,
        hint: InsertHint,
    ) -> Result<u128> {
        let cohort = self.active(id)?.cohort;
        let (book, troves) = self.split(cohort);

        let new_stake = book.compute_stake(collateral)?;
        {
            let trove = troves
                .get_mut(id)
                .ok_or_else(|| Error::InvalidPosition(format!("{} does not exist", id.short())))?;
            book.total_stakes = safe_add(book.total_stakes.saturating_sub(trove.stake), new_stake)?;
            book.active_normalized_debt = safe_add(
                book.active_normalized_debt
                    .saturating_sub(trove.normalized_debt),
                normalized_debt,
            )?;
            trove.collateral = collateral;
            trove.normalized_debt = normalized_debt;
            trove.stake = new_stake;
            trove.last_updated = now;
        }

        let nicr = compute_nominal_cr(collateral, normalized_debt);
        let CohortBook { sorted, rewards, .. } = &mut *book;
        let troves = &*troves;
        sorted.reinsert(*id, nicr, hint, |k| lookup_nicr(troves, rewards, k))?;
        Ok(new_stake)
    }

    /// Close a position, returning its last open state.
    ///
    /// Pending rewards must already be applied; anything still pending stays
    /// in the ledger totals.
    pub fn close(&mut self, id: &TroveId, status: TroveStatus) -> Result<Trove> {
        if status.is_active() || status == TroveStatus::NonExistent {
            return Err(Error::InvalidParameter {
                name: "status".into(),
                reason: format!("{:?} is not a closing status", status),
            });
        }

        let closed = self.active(id)?.clone();
        let book = self.book_mut(closed.cohort);
        book.total_stakes = book.total_stakes.saturating_sub(closed.stake);
        book.active_normalized_debt = book
            .active_normalized_debt
            .saturating_sub(closed.normalized_debt);
        book.sorted.remove(id)?;

        self.remove_owner(id, closed.array_index)?;

        if let Some(trove) = self.troves.get_mut(id) {
            trove.status = status;
            trove.collateral = 0;
            trove.normalized_debt = 0;
            trove.stake = 0;
            trove.snapshot = RewardSnapshot::default();
            trove.array_index = 0;
        }
        Ok(closed)
    }

    /// Swap-remove from the owner array, fixing the moved entry's index
    fn remove_owner(&mut self, id: &TroveId, index: usize) -> Result<()> {
        if self.owners.get(index) != Some(id) {
            return Err(Error::InvariantViolation(format!(
                "owner array index {} does not hold {}",
                index,
                id.short()
            )));
        }
        self.owners.swap_remove(index);
        if let Some(moved) = self.owners.get(index).copied() {
            if let Some(trove) = self.troves.get_mut(&moved) {
                trove.array_index = index;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDISTRIBUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cohort that should absorb a redistribution from `cohort`, ignoring
    /// `excluded_stake` of the position being liquidated
    pub fn redistribution_target(&self, cohort: Cohort, excluded_stake: u128) -> Option<Cohort> {
        if self.book(cohort).total_stakes.saturating_sub(excluded_stake) > 0 {
            Some(cohort)
        } else if self.book(cohort.other()).total_stakes > 0 {
            Some(cohort.other())
        } else {
            None
        }
    }

    /// Spread actual `debt` and `collateral` over a cohort's stakes
    pub fn redistribute(
        &mut self,
        cohort: Cohort,
        collateral: u128,
        debt: u128,
        accumulated_rate: u128,
    ) -> Result<()> {
        let normalized = mul_div(debt, WAD, accumulated_rate)?;
        let book = self.book_mut(cohort);
        let total_stakes = book.total_stakes;
        book.rewards.redistribute(collateral, normalized, total_stakes)?;
        debug!(%cohort, collateral, debt, normalized, total_stakes, "Redistributed");
        Ok(())
    }

    /// Hash over positions sorted by id, the owner array and both books
    pub fn state_hash(&self) -> Hash {
        let mut ids: Vec<&TroveId> = self.troves.keys().collect();
        ids.sort_unstable();

        let mut data = Vec::new();
        for id in ids {
            if let Some(trove) = self.troves.get(id) {
                data.extend_from_slice(trove.hash().as_bytes());
            }
        }
        data.extend_from_slice(&bincode::serialize(&self.owners).unwrap_or_default());
        self.standard.encode(&mut data);
        self.shielded.encode(&mut data);
        data.extend_from_slice(&self.nonce.to_be_bytes());
        Hash::sha256(&data)
    }

    /// Refresh the stake/collateral snapshot after a liquidation
    pub fn update_system_snapshots(&mut self, cohort: Cohort, active_collateral: u128) {
        let book = self.book_mut(cohort);
        book.total_stakes_snapshot = book.total_stakes;
        book.total_collateral_snapshot =
            active_collateral.saturating_add(book.rewards.pending_collateral());
    }
}

fn entire_nicr(trove: &Trove, rewards: &RewardsLedger) -> u128 {
    let collateral = trove.collateral.saturating_add(
        rewards
            .pending_collateral_reward(trove.stake, &trove.snapshot)
            .unwrap_or(0),
    );
    let debt = trove.normalized_debt.saturating_add(
        rewards
            .pending_debt_reward(trove.stake, &trove.snapshot)
            .unwrap_or(0),
    );
    compute_nominal_cr(collateral, debt)
}

fn lookup_nicr(troves: &HashMap<TroveId, Trove>, rewards: &RewardsLedger, id: &TroveId) -> u128 {
    troves
        .get(id)
        .map(|t| entire_nicr(t, rewards))
        .unwrap_or(0)
}
