//! Location subsystem for the rental portal.
//!
//! Resolves Chilean regions and communes from the DPA API, with a shared
//! TTL cache and a built-in fallback dataset.

pub mod cache;
pub mod providers;
pub mod resolver;
pub mod types;

pub use cache::{FileCache, LocationCache, MemoryCache};
pub use providers::{DpaClient, OfflineSource, RemoteSource, DPA_BASE_URL};
pub use resolver::{LocationResolver, ResolverConfig, PLACEHOLDER_COMMUNE_NAME};
pub use types::{Commune, LocationError, LocationSource, Region, Resolved, Selection, SelectionError};
