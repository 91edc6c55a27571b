//! Library facade for the `entronet-node` binary, so integration tests can
//! load configs and drive the service without the CLI.

pub mod config;
pub mod service;
