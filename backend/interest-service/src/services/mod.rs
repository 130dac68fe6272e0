pub mod content;
pub mod dispatcher;
pub mod exclusion;
pub mod profile_store;
pub mod recommendation;
pub mod weighting;

pub use content::{ContentStore, InMemoryContentStore, RedisContentStore};
pub use dispatcher::{DispatchOutcome, DispatcherConfig, EventDispatcher};
pub use exclusion::{ExclusionIndex, InMemoryExclusionIndex, RedisExclusionIndex};
pub use profile_store::{
    ApplyOutcome, InMemoryProfileStore, OptimisticProfileStore, ProfileStore, RedisProfileBackend,
};
pub use recommendation::{RecommendationConfig, RecommendationEngine, ScoredContent};
