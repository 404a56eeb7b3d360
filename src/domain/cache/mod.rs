//! Cache domain - keys, fan-out rules and optimistic mutation values.

mod invalidation;
mod key;
mod mutation;

pub use invalidation::{domains, merge_patterns, InvalidationRequest, InvalidationRules};
pub use key::{CacheKey, KeyPattern};
pub use mutation::{
    CacheEntry, CacheValue, KeyOutcome, KeyOwners, MutationContext, MutationId, MutationKind,
    MutationPlan, MutationResponse, StoreWrite,
};
