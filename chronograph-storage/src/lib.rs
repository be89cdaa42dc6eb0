//! Postgres/diesel-async implementation of the five components of §4:
//! Storage Gateway, Versioning Engine, Search Engine, Traversal Engine,
//! Merge Analyser. This crate has the only database dependency in the
//! workspace; `chronograph-core` stays storage-agnostic.

pub mod connect;
pub mod gateway;
pub mod locks;
pub mod merge;
pub mod orm;
pub mod pg_error;
pub mod schema;
pub mod search;
pub mod traversal;
pub mod vector_probe;
pub mod versioning;

pub use connect::connect;
pub use pg_error::from_diesel;
