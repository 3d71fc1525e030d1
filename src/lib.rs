pub use admission::{Admission, AdmissionController};
pub use context::{ExecutionOutput, ExecutionRequest};
pub use engine::{EngineConfig, IsolationEngine};
pub use error::CatGateError;
pub use gateway::{Gateway, GatewayConfig, Route};
pub use language::Language;
pub use registry::{Session, SessionRegistry};
pub use resources::{NodeUsage, ResourceSnapshot};
pub use runtime::{RuntimeConfig, RuntimeState};

pub mod admission;
pub mod cluster;
pub mod config;
pub mod context;
pub mod engine;
mod error;
pub mod gateway;
pub mod language;
pub mod provision;
pub mod registry;
pub mod resources;
pub mod runtime;
pub mod utils;
