//! Crossposting publish/subscribe engine: forwards posts from a source
//! network's public walls to messaging-platform chat destinations.
//!
//! Module layout mirrors `examples/original_source/*.go`'s file split
//! one-to-one where it made sense, folded into a Cargo crate the way
//! `roslibrust`'s workspace splits `ros1`/`common`/`codegen` into modules
//! under one crate root.

pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod locale;
pub mod messaging_client;
pub mod model;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod source_client;
pub mod splitter;
pub mod stats;
pub mod store;
pub mod worker;

pub use commands::Commands;
pub use config::Config;
pub use error::{Error, Result, UserError};
pub use orchestrator::Crossposter;
