//! pub node - a peer-to-peer publishing node served as a Tor onion service.

#![forbid(unsafe_code)]

pub mod api;
pub mod cli;
pub mod config;
pub mod server;
pub mod tor;

pub use cli::Cli;
pub use config::NodeConfig;
pub use server::NodeServer;
