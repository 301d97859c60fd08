//! Reactive stores and asynchronous caches for single-threaded programs.
//!
//! A [`Store`] holds a value or computes one from other stores, tracking
//! exactly which parts of them it read. A [`Cache`] runs an async function,
//! keeps its result together with stale/updating/connected flags, and guards
//! every late continuation with a generation number. [`create_cache`] pools
//! caches per argument in an [`InstanceCache`], and [`ResourceGroup`]s
//! invalidate or clear many caches at once without keeping them alive.
//!
//! Caches and timers run on Tokio's local executor and must be used from
//! inside a `tokio::task::LocalSet`.

pub mod macros;

mod addr;
mod cache;
mod cache_state;
mod computed;
mod context;
mod dependencies;
mod error;
mod evaluation;
mod factory;
mod hashed;
mod instance_cache;
mod options;
mod registry;
mod resource_group;
mod store;
mod subscription;
mod timer;
mod tracked;

pub use cache::{Cache, Promise, WeakCache};
pub use cache_state::{CacheState, Status};
pub use context::{CacheContext, Sink};
pub use error::Error;
pub use evaluation::Evaluation;
pub use factory::{create_cache, create_cache_with_key, CacheFactory};
pub use hashed::Hashed;
pub use instance_cache::{InstanceCache, WeakHandle};
pub use options::{CacheOptions, GetOptions, InvalidateAfter, Update};
pub use registry::{CacheDefaults, Registry};
pub use resource_group::{AsResource, Resource, ResourceGroup};
pub use store::{Store, WeakStore};
pub use subscription::{Equality, SubscribeOptions, Subscription, Teardown};
pub use timer::Timer;
pub use tracked::Tracked;
