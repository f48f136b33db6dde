//! Thread-safe facade over a host's lazily available "active repositories"
//! service.
//!
//! The host service appears only after an activation signal, must be located
//! on an exclusive execution context, and may fail at any time. The facade
//! ([`ActiveRepositories`]) keeps an immutable snapshot of the mapped
//! repository list, refreshes it under a single mutex, notifies subscribers
//! only when content changes, and exposes a drain barrier for shutdown.

mod activation;
mod config;
mod error;
mod facade;
mod factory;
mod listeners;
mod model;
mod service;
mod state;

pub use activation::{ActivationCallback, ActivationLatch, ActivationSignal};
pub use config::ActiveReposConfig;
pub use error::{BuildError, ConfigError, InitError, MappingError, RefreshError, ServiceError};
pub use facade::{ActiveRepositories, ActiveRepositoriesBuilder};
pub use factory::{LocalRepositoryFactory, RepositoryFactory};
pub use listeners::{ChangeListener, ListenerId};
pub use model::{LocalRepository, RepositoryDescriptor, RepositoryRecord, RepositorySnapshot};
pub use reposcope_worker::{DedicatedThread, ExclusiveContext, ExclusiveError, ExclusiveJob, GateStats, WorkerRuntime};
pub use service::{ChangeCallback, InMemoryService, RepositoryService, ServiceProvider};
pub use state::FacadeState;
