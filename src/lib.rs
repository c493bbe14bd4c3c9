//! Graphgate: a validated access layer over a remote Bolt graph database.
//!
//! The crate wraps a single graph engine behind four operation families
//! ([`graph::GraphOperations`], [`path::PathFinder`], [`query::QueryGateway`] and
//! [`stats::StatsCollector`]), all of which obtain their backend access through one
//! shared [`connection::ConnectionManager`]. Labels and relationship types are the only
//! caller-supplied tokens ever spliced into statement text, and they can only get there
//! as [`validation::Identifier`] values.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod graph;
pub mod path;
pub mod query;
pub mod server;
pub mod stats;
pub mod validation;

pub use error::{GatewayError, Result};
