mod client;
mod config;

pub use client::{
    ConfigSource, Error, ErrorKind, LocateError, create_client, create_metrics_client,
    master_from_kubeconfig, resolve_config,
};
pub use config::ClientConnection;
