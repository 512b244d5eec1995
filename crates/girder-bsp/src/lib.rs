//! Build Server Protocol client.
//!
//! Speaks JSON-RPC 2.0 over `Content-Length`-framed stdio to a build server
//! such as Gradle's. [`BspClient`] owns the server process and connection;
//! the [`BuildServer`] trait is the request surface consumed by project
//! synchronization, and [`BuildClientListener`] receives server-push
//! notifications.

mod client;
mod connection;
mod model;

pub use client::{
    BspClient, BspClientConfig, BspError, BuildClientListener, BuildServer, NoopListener, RpcError,
};
pub use connection::{
    discover_server_launch, parse_args, BspConnectionFile, ServerLaunch, ENV_ARGS, ENV_PROGRAM,
};
pub use model::*;
