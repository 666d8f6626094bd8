//! Region and commune lookups for the rental portal's listing form.

pub mod config;
pub mod location;
pub mod server;
