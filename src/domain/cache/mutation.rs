//! Optimistic mutation values.
//!
//! A `MutationPlan` is what a caller asks for; a `MutationContext` is the
//! pre-mutation snapshot captured when the plan begins and consumed when the
//! mutation settles. `KeyOwners` stacks the claims of in-flight mutations per
//! key and decides what each settlement writes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use super::invalidation::domains;
use super::{CacheKey, KeyPattern};

/// Value stored under a cache key.
pub type CacheValue = serde_json::Value;

/// Process-unique identifier for one mutation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationId(u64);

impl MutationId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// The mutating operations the storefront performs optimistically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    UpdateStock,
    ReschedulePickup,
    UpdateProfile,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::UpdateStock => "update_stock",
            MutationKind::ReschedulePickup => "reschedule_pickup",
            MutationKind::UpdateProfile => "update_profile",
        }
    }

    /// Broader views to refetch after this kind of mutation succeeds.
    pub fn related_patterns(&self) -> Vec<KeyPattern> {
        let names: &[&'static str] = match self {
            MutationKind::UpdateStock => &[domains::INVENTORY, domains::PRODUCTS, domains::DASHBOARD],
            MutationKind::ReschedulePickup => &[domains::PICKUPS, domains::ORDERS, domains::DASHBOARD],
            MutationKind::UpdateProfile => &[domains::PROFILE],
        };
        names.iter().copied().map(KeyPattern::for_domain).collect()
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a mutation will write optimistically and what it refetches on success.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPlan {
    pub kind: MutationKind,
    pub optimistic: Vec<(CacheKey, CacheValue)>,
    pub related: Vec<KeyPattern>,
}

impl MutationPlan {
    /// Plan with the kind's default related patterns and no writes yet.
    pub fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            optimistic: Vec::new(),
            related: kind.related_patterns(),
        }
    }

    /// Adds a tentative value. A later write to the same key replaces it.
    pub fn with_optimistic(mut self, key: CacheKey, value: CacheValue) -> Self {
        self.optimistic.retain(|(k, _)| k != &key);
        self.optimistic.push((key, value));
        self
    }

    pub fn with_related(mut self, related: Vec<KeyPattern>) -> Self {
        self.related = related;
        self
    }

    pub fn touched_keys(&self) -> BTreeSet<CacheKey> {
        self.optimistic.iter().map(|(k, _)| k.clone()).collect()
    }
}

/// A cached value together with its freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: CacheValue,
    pub stale: bool,
}

impl CacheEntry {
    pub fn fresh(value: CacheValue) -> Self {
        Self {
            value,
            stale: false,
        }
    }

    pub fn stale(value: CacheValue) -> Self {
        Self { value, stale: true }
    }
}

/// Pre-mutation state of every key a mutation touches.
///
/// Built once at begin and never modified; consumed by `into_success` or
/// `into_failure` when the mutation settles.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationContext {
    id: MutationId,
    kind: MutationKind,
    snapshot: BTreeMap<CacheKey, Option<CacheEntry>>,
    optimistic: BTreeMap<CacheKey, CacheValue>,
    related: Vec<KeyPattern>,
}

impl MutationContext {
    /// Captures `snapshot`, which must hold an entry for every touched key.
    /// `None` means the key had no value before the mutation.
    pub fn capture(
        id: MutationId,
        plan: &MutationPlan,
        snapshot: BTreeMap<CacheKey, Option<CacheEntry>>,
    ) -> Self {
        debug_assert!(plan.touched_keys().iter().all(|k| snapshot.contains_key(k)));
        Self {
            id,
            kind: plan.kind,
            snapshot,
            optimistic: plan.optimistic.iter().cloned().collect(),
            related: plan.related.clone(),
        }
    }

    pub fn id(&self) -> MutationId {
        self.id
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn touched_keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.snapshot.keys()
    }

    pub fn prior(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.snapshot.get(key).and_then(Option::as_ref)
    }

    pub fn related(&self) -> &[KeyPattern] {
        &self.related
    }

    /// Outcome of every touched key after the remote call succeeded.
    ///
    /// Touched keys with a server value are confirmed, the others keep an
    /// unconfirmed optimistic guess. Server values for keys outside the plan
    /// come last, as confirmations of keys this mutation never claimed.
    pub fn into_success(
        self,
        authoritative: Vec<(CacheKey, CacheValue)>,
    ) -> Vec<(CacheKey, KeyOutcome)> {
        let mut confirmed: BTreeMap<CacheKey, CacheValue> = authoritative.into_iter().collect();
        let mut outcomes: Vec<(CacheKey, KeyOutcome)> = self
            .optimistic
            .into_iter()
            .map(|(key, guess)| match confirmed.remove(&key) {
                Some(value) => (key, KeyOutcome::Confirmed(value)),
                None => (key, KeyOutcome::Unconfirmed(guess)),
            })
            .collect();
        outcomes.extend(
            confirmed
                .into_iter()
                .map(|(key, value)| (key, KeyOutcome::Confirmed(value))),
        );
        outcomes
    }

    /// Outcome of every touched key after the remote call failed.
    pub fn into_failure(self) -> Vec<(CacheKey, KeyOutcome)> {
        self.snapshot
            .into_keys()
            .map(|key| (key, KeyOutcome::Failed))
            .collect()
    }
}

/// Successful remote result plus the server's authoritative cache values.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResponse<T> {
    pub output: T,
    pub authoritative: Vec<(CacheKey, CacheValue)>,
}

impl<T> MutationResponse<T> {
    pub fn new(output: T, authoritative: Vec<(CacheKey, CacheValue)>) -> Self {
        Self {
            output,
            authoritative,
        }
    }
}

/// How a settling mutation left one key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// The server returned this value.
    Confirmed(CacheValue),
    /// The remote call succeeded but said nothing about the key; the
    /// optimistic guess is all there is.
    Unconfirmed(CacheValue),
    Failed,
}

/// The write a settling owner must make to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    Set(CacheValue),
    /// Put back an entry exactly, freshness included. `None` removes the key.
    Restore(Option<CacheEntry>),
    /// Keep the current value but have it refetched.
    Invalidate,
}

#[derive(Debug, Clone, PartialEq)]
struct Claim {
    id: MutationId,
    /// What the key holds if this claim and every claim above it fail.
    base: Option<CacheEntry>,
}

/// In-flight claims on each key, oldest first.
///
/// The newest claimant owns the key and is the only one whose settlement
/// writes to the store. A claimant that settles underneath it hands its
/// result to the claim directly above as that claim's new base, so a later
/// rollback lands on the newest known state instead of a superseded guess.
#[derive(Debug, Default)]
pub struct KeyOwners {
    claims: HashMap<CacheKey, Vec<Claim>>,
}

impl KeyOwners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the context's mutation the owner of every key it touches, with
    /// the captured snapshot as base.
    pub fn claim(&mut self, context: &MutationContext) {
        for (key, prior) in &context.snapshot {
            self.claims.entry(key.clone()).or_default().push(Claim {
                id: context.id,
                base: prior.clone(),
            });
        }
    }

    pub fn owner_of(&self, key: &CacheKey) -> Option<MutationId> {
        self.claims
            .get(key)
            .and_then(|stack| stack.last())
            .map(|claim| claim.id)
    }

    pub fn owns(&self, id: MutationId, key: &CacheKey) -> bool {
        self.owner_of(key) == Some(id)
    }

    /// The base `id` would restore for `key` if it failed now.
    pub fn base_of(&self, id: MutationId, key: &CacheKey) -> Option<&CacheEntry> {
        self.claims
            .get(key)?
            .iter()
            .find(|claim| claim.id == id)?
            .base
            .as_ref()
    }

    /// Drops `id`'s claim on `key` and says what, if anything, to write.
    ///
    /// Only the owner gets a write back. A confirmation for a key `id`
    /// never claimed is written when the key is free, and otherwise becomes
    /// the base under every pending claim.
    pub fn settle(&mut self, id: MutationId, key: &CacheKey, outcome: KeyOutcome) -> Option<StoreWrite> {
        let Some(stack) = self.claims.get_mut(key) else {
            return match outcome {
                KeyOutcome::Confirmed(value) => Some(StoreWrite::Set(value)),
                _ => None,
            };
        };
        let Some(position) = stack.iter().position(|claim| claim.id == id) else {
            if let KeyOutcome::Confirmed(value) = outcome {
                stack[0].base = Some(CacheEntry::fresh(value));
            }
            return None;
        };

        let claim = stack.remove(position);
        let write = if position == stack.len() {
            Some(match outcome {
                KeyOutcome::Confirmed(value) => StoreWrite::Set(value),
                KeyOutcome::Unconfirmed(_) => StoreWrite::Invalidate,
                KeyOutcome::Failed => StoreWrite::Restore(claim.base),
            })
        } else {
            stack[position].base = match outcome {
                KeyOutcome::Confirmed(value) => Some(CacheEntry::fresh(value)),
                KeyOutcome::Unconfirmed(guess) => Some(CacheEntry::stale(guess)),
                KeyOutcome::Failed => claim.base,
            };
            None
        };
        if stack.is_empty() {
            self.claims.remove(key);
        }
        write
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
