mod client;
pub mod config;
pub mod flowcontrol;
mod metrics;
mod resource;
mod version;

pub use client::{Client, Error, ErrorResponse, ListParams, VersionMatch};
pub use config::{Auth, Config, InCluster, InClusterError, Kubeconfig, KubeconfigError};
pub use config::default_user_agent;
pub use metrics::MetricsClient;
pub use resource::{
    ContainerMetrics, ListMeta, Node, NodeMetrics, NodeSpec, ObjectList, ObjectMeta, Pod,
    PodMetrics, PodSpec, PodStatus, Resource,
};
pub use version::Version;
