//! rubbs: a multi-board bulletin content and ledger engine.
//!
//! The engine owns board storage shapes, thread ordering, the point ledger,
//! access resolution, fragment caching and cross-board relocation. Rendering,
//! routing, uploads and mail stay outside, reached through the narrow traits
//! in `latest`, `files`, `mail` and `session`.

pub mod access;
pub mod cache;
pub mod config;
pub mod counter;
pub mod db;
pub mod error;
pub mod files;
pub mod latest;
pub mod mail;
pub mod orm;
pub mod point;
pub mod relocate;
pub mod schema;
pub mod session;
pub mod thread;
pub mod write;

pub use config::Config;
pub use error::{Error, Result};
