pub mod admission;
pub mod config;
pub mod error;
pub mod form;
pub mod gate;
pub mod pool;
pub mod probe;
pub mod render;
pub mod stats;
pub mod template;

pub use admission::{Acquire, AdmissionController, Permit};
pub use config::Config;
pub use error::{BoxError, Error};
pub use gate::Gate;
pub use pool::{HandleFactory, ResourcePool};
pub use render::{DataProvider, DocumentRenderer, Lookup, ProviderError, RenderError};
pub use stats::{AdmissionStats, PoolStats};
