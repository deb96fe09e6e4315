pub mod bootstrap;
pub mod cadence;
pub mod config;
pub mod consumer;
pub mod error;
pub mod metrics;
pub mod offset;
pub mod registry;
pub mod shutdown;
pub mod tolerance;

#[cfg(test)]
pub(crate) mod test_utils;

pub use bootstrap::{ConsumerExit, ConsumerOutcome, Engine};
pub use config::{ComponentConfig, ConfigParser, ConsumerSettings, LumberConfig, PartitionConfig, TomlParser};
pub use consumer::{Collaborators, Consumer, ConsumerReport, ExitReason};
pub use error::EngineError;
pub use registry::ComponentRegistry;
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
