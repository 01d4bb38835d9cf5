//! In-process claim registry: the contribution/claim API surface over a
//! pluggable store.
//!
//! - `ClaimStore` abstracts persistence; writes of `ClaimState` go through
//!   compare-and-swap so two concurrent claims cannot both pass the limit.
//! - `ClaimRegistry` validates with `ClaimLedger` before persisting and
//!   publishes events on a `tokio::sync::broadcast` channel.
//! - `MemClaimStore` is the in-memory store used by tests and the CLI.

use crate::claims::{ClaimLedger, ClaimState, ClaimStatus};
use crate::sale::SaleTerms;
use crate::vesting::VestingCalculator;
use crate::{Amount, LaunchpadError, SaleId, Timestamp, Wallet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// CAS attempts before a claim gives up with `StoreError::Conflict`.
const DEFAULT_CAS_RETRIES: usize = 16;

/// One allocation: a wallet's position in a sale.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub struct ClaimKey {
    pub sale: SaleId,
    pub wallet: Wallet,
}

impl ClaimKey {
    pub fn new(sale: SaleId, wallet: Wallet) -> Self {
        Self { sale, wallet }
    }
}

/// Audit record of a successful claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub sale: SaleId,
    pub wallet: Wallet,
    pub amount: Amount,
    pub claimed_to_date: Amount,
    pub at: Timestamp,
}

/// Claim state of one allocation as returned to a wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSummary {
    pub sale: SaleId,
    pub state: ClaimState,
    pub status: ClaimStatus,
    pub claimable: Amount,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("concurrent update, state changed")]
    Conflict,
    #[error("record missing")]
    Missing,
    #[error("record already exists")]
    Duplicate,
    #[error("backend failure: {0}")]
    Other(String),
}

/// Persistence for claim states and receipts.
pub trait ClaimStore: Send + Sync + 'static {
    fn get(&self, key: &ClaimKey) -> Result<Option<ClaimState>, StoreError>;

    /// Insert a new record; `Duplicate` if the key exists.
    fn insert(&self, key: ClaimKey, state: ClaimState) -> Result<(), StoreError>;

    /// Replace `expected` with `next`; `Conflict` if the stored value differs.
    fn compare_and_swap(&self, key: &ClaimKey, expected: &ClaimState, next: ClaimState) -> Result<(), StoreError>;

    /// Swap in `next` and record `receipt` as one write: either both land or
    /// neither does. `Conflict` if the stored value differs from `expected`.
    fn commit_claim(
        &self,
        key: &ClaimKey,
        expected: &ClaimState,
        next: ClaimState,
        receipt: ClaimReceipt,
    ) -> Result<(), StoreError>;

    fn by_wallet(&self, wallet: &Wallet) -> Result<Vec<(SaleId, ClaimState)>, StoreError>;

    fn history(&self, wallet: &Wallet) -> Result<Vec<ClaimReceipt>, StoreError>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemClaimStore {
    claims: RwLock<BTreeMap<ClaimKey, ClaimState>>,
    receipts: RwLock<Vec<ClaimReceipt>>,
}

impl MemClaimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemClaimStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemClaimStore")
            .field("claims", &self.claims.read().len())
            .field("receipts", &self.receipts.read().len())
            .finish()
    }
}

impl ClaimStore for MemClaimStore {
    fn get(&self, key: &ClaimKey) -> Result<Option<ClaimState>, StoreError> {
        Ok(self.claims.read().get(key).copied())
    }

    fn insert(&self, key: ClaimKey, state: ClaimState) -> Result<(), StoreError> {
        let mut m = self.claims.write();
        if m.contains_key(&key) {
            return Err(StoreError::Duplicate);
        }
        m.insert(key, state);
        Ok(())
    }

    fn compare_and_swap(&self, key: &ClaimKey, expected: &ClaimState, next: ClaimState) -> Result<(), StoreError> {
        let mut m = self.claims.write();
        let slot = m.get_mut(key).ok_or(StoreError::Missing)?;
        if slot != expected {
            return Err(StoreError::Conflict);
        }
        *slot = next;
        Ok(())
    }

    fn by_wallet(&self, wallet: &Wallet) -> Result<Vec<(SaleId, ClaimState)>, StoreError> {
        Ok(self
            .claims
            .read()
            .iter()
            .filter(|(k, _)| &k.wallet == wallet)
            .map(|(k, s)| (k.sale, *s))
            .collect())
    }

    fn commit_claim(
        &self,
        key: &ClaimKey,
        expected: &ClaimState,
        next: ClaimState,
        receipt: ClaimReceipt,
    ) -> Result<(), StoreError> {
        // claims before receipts, same order everywhere
        let mut m = self.claims.write();
        let mut log = self.receipts.write();
        let slot = m.get_mut(key).ok_or(StoreError::Missing)?;
        if slot != expected {
            return Err(StoreError::Conflict);
        }
        *slot = next;
        log.push(receipt);
        Ok(())
    }

    fn history(&self, wallet: &Wallet) -> Result<Vec<ClaimReceipt>, StoreError> {
        Ok(self
            .receipts
            .read()
            .iter()
            .filter(|r| &r.wallet == wallet)
            .cloned()
            .collect())
    }
}

// ---------- Events ----------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistryEvent {
    SaleRegistered(SaleId),
    Contributed { sale: SaleId, wallet: Wallet, amount: Amount, tokens: Amount },
    Claimed { sale: SaleId, wallet: Wallet, amount: Amount, claimed_to_date: Amount },
}

// ---------- Registry ----------

pub struct ClaimRegistry<S: ClaimStore> {
    store: Arc<S>,
    ledger: ClaimLedger,
    calculator: VestingCalculator,
    sales: RwLock<BTreeMap<SaleId, SaleTerms>>,
    events_tx: broadcast::Sender<RegistryEvent>,
    cas_retries: usize,
}

impl<S: ClaimStore> fmt::Debug for ClaimRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClaimRegistry")
            .field("sales", &self.sales.read().len())
            .field("cas_retries", &self.cas_retries)
            .finish()
    }
}

impl<S: ClaimStore> ClaimRegistry<S> {
    pub fn new(store: Arc<S>, event_capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(event_capacity.max(1));
        let calculator = VestingCalculator::new();
        Arc::new(Self {
            store,
            ledger: ClaimLedger::new(calculator),
            calculator,
            sales: RwLock::new(BTreeMap::new()),
            events_tx: tx,
            cas_retries: DEFAULT_CAS_RETRIES,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events_tx.subscribe()
    }

    pub fn register_sale(&self, id: SaleId, terms: SaleTerms) -> Result<(), LaunchpadError> {
        let mut sales = self.sales.write();
        if sales.contains_key(&id) {
            return Err(LaunchpadError::InvalidInput("sale already registered"));
        }
        sales.insert(id, terms);
        info!(sale = id.0, "sale registered");
        let _ = self.events_tx.send(RegistryEvent::SaleRegistered(id));
        Ok(())
    }

    pub fn terms(&self, id: SaleId) -> Result<SaleTerms, LaunchpadError> {
        self.sales.read().get(&id).cloned().ok_or(LaunchpadError::NotFound)
    }

    /// Record a contribution and fold its allocation into the wallet's claim state.
    pub fn contribute(
        &self,
        sale: SaleId,
        wallet: Wallet,
        amount: Amount,
        at: Timestamp,
    ) -> Result<ClaimState, LaunchpadError> {
        let terms = self.terms(sale)?;
        let contribution = terms.check_contribution(amount, at)?;
        let alloc = self.calculator.allocate(contribution.amount, &terms)?;
        let key = ClaimKey::new(sale, wallet.clone());

        for _ in 0..self.cas_retries {
            let written = match self.store.get(&key)? {
                None => {
                    let state = ClaimState::new(alloc);
                    self.store.insert(key.clone(), state).map(|_| state)
                }
                Some(current) => {
                    let next = current.add_allocation(alloc)?;
                    self.store.compare_and_swap(&key, &current, next).map(|_| next)
                }
            };
            match written {
                Ok(state) => {
                    debug!(sale = sale.0, wallet = %wallet, amount, tokens = alloc.total_tokens, "contribution recorded");
                    let _ = self.events_tx.send(RegistryEvent::Contributed {
                        sale,
                        wallet,
                        amount,
                        tokens: alloc.total_tokens,
                    });
                    return Ok(state);
                }
                Err(StoreError::Conflict | StoreError::Duplicate) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        warn!(sale = sale.0, wallet = %wallet, "contribution gave up after concurrent updates");
        Err(StoreError::Conflict.into())
    }

    pub fn claimable(&self, sale: SaleId, wallet: &Wallet, now: Timestamp) -> Result<Amount, LaunchpadError> {
        let terms = self.terms(sale)?;
        let state = self
            .store
            .get(&ClaimKey::new(sale, wallet.clone()))?
            .ok_or(LaunchpadError::NotFound)?;
        Ok(self.ledger.claimable_now(&state, &terms, now))
    }

    /// Claim `amount` of unlocked tokens. The store is only written when the
    /// ledger accepts the claim against the state it was computed from, and
    /// the new total and its receipt are committed together.
    pub fn claim(
        &self,
        sale: SaleId,
        wallet: Wallet,
        amount: Amount,
        now: Timestamp,
    ) -> Result<ClaimReceipt, LaunchpadError> {
        let terms = self.terms(sale)?;
        let key = ClaimKey::new(sale, wallet.clone());

        for attempt in 0..self.cas_retries {
            let current = self.store.get(&key)?.ok_or(LaunchpadError::NotFound)?;
            let next = self.ledger.record_claim(&current, &terms, now, amount)?;
            let receipt = ClaimReceipt {
                sale,
                wallet: wallet.clone(),
                amount,
                claimed_to_date: next.claimed_to_date(),
                at: now,
            };
            match self.store.commit_claim(&key, &current, next, receipt.clone()) {
                Ok(()) => {
                    info!(sale = sale.0, wallet = %wallet, amount, claimed_to_date = next.claimed_to_date(), "claim recorded");
                    let _ = self.events_tx.send(RegistryEvent::Claimed {
                        sale,
                        wallet,
                        amount,
                        claimed_to_date: next.claimed_to_date(),
                    });
                    return Ok(receipt);
                }
                Err(StoreError::Conflict) => {
                    debug!(sale = sale.0, wallet = %wallet, attempt, "claim raced, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(sale = sale.0, wallet = %wallet, "claim gave up after concurrent updates");
        Err(StoreError::Conflict.into())
    }

    /// All allocations of a wallet with what is claimable at `now`.
    pub fn claims_for(&self, wallet: &Wallet, now: Timestamp) -> Result<Vec<ClaimSummary>, LaunchpadError> {
        let sales = self.sales.read();
        let mut out = Vec::new();
        for (sale, state) in self.store.by_wallet(wallet)? {
            let terms = sales.get(&sale).ok_or(LaunchpadError::NotFound)?;
            out.push(ClaimSummary {
                sale,
                state,
                status: state.status(),
                claimable: self.ledger.claimable_now(&state, terms, now),
            });
        }
        Ok(out)
    }

    pub fn history(&self, wallet: &Wallet) -> Result<Vec<ClaimReceipt>, LaunchpadError> {
        Ok(self.store.history(wallet)?)
    }
}

/* ---------------------------------- TESTS ---------------------------------- */
