#![warn(
    rust_2018_idioms,
    future_incompatible,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused,
    unused_qualifications,
    variant_size_differences
)]

//! Server definitions and implementation.

#[macro_use]
extern crate diesel;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

/// Utilities to connect to the database.
pub mod connection;
/// Process-wide configuration loaded from the environment.
pub mod config;
/// The error taxonomy shared by every repository and broker operation.
pub mod error;
/// The pure publish-time attribute filter engine.
pub mod filter;
/// The periodic job that expires and dead-letters messages.
pub mod cleanup;
pub(crate) mod models;
pub(crate) mod router;
pub(crate) mod routes;
pub(crate) mod schema;

pub use models::PgRepository;
pub use router::make_router;
