pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filters;
pub mod memory;
pub mod model;
pub mod queries;
pub mod remote;
pub mod selection;
pub mod session;
pub mod telemetry;

pub use cache::{MutationId, QueryCache, QueryData, QueryKey, QueryKind, QueryPattern};
pub use config::{AppConfig, ConfigOverrides};
pub use coordinator::{MutationCoordinator, MutationKind, MutationPhase};
pub use error::{MutationError, StoreError, ValidationError};
pub use filters::{filter_keys, FilterFacets, KeyFilter};
pub use memory::MemoryStore;
pub use model::*;
pub use queries::QueryClient;
pub use remote::RemoteStore;
pub use selection::{SelectionState, SelectionStore};
pub use session::Session;
