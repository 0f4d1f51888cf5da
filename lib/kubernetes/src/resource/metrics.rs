use std::collections::BTreeMap;

use serde::Deserialize;

use super::{ObjectMeta, Resource};

const METRICS_GROUP: &str = "metrics.k8s.io";
const METRICS_VERSION: &str = "v1beta1";

/// NodeMetrics sets resource usage metrics of a node.
///
/// Usage values are quantities as the metrics server reports them, e.g.
/// `cpu: 250m`, `memory: 1024Ki`.
#[derive(Debug, Deserialize)]
pub struct NodeMetrics {
    pub metadata: ObjectMeta,

    /// The end of the window the usage was collected in.
    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub window: Option<String>,

    #[serde(default)]
    pub usage: BTreeMap<String, String>,
}

impl Resource for NodeMetrics {
    const GROUP: &'static str = METRICS_GROUP;
    const VERSION: &'static str = METRICS_VERSION;
    const KIND: &'static str = "NodeMetrics";
    const PLURAL: &'static str = "nodes";
}

/// PodMetrics sets resource usage metrics of a pod.
#[derive(Debug, Deserialize)]
pub struct PodMetrics {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub timestamp: Option<String>,

    #[serde(default)]
    pub window: Option<String>,

    #[serde(default)]
    pub containers: Vec<ContainerMetrics>,
}

impl Resource for PodMetrics {
    const GROUP: &'static str = METRICS_GROUP;
    const VERSION: &'static str = METRICS_VERSION;
    const KIND: &'static str = "PodMetrics";
    const PLURAL: &'static str = "pods";
}

/// ContainerMetrics sets resource usage metrics of a container.
#[derive(Debug, Deserialize)]
pub struct ContainerMetrics {
    pub name: String,

    #[serde(default)]
    pub usage: BTreeMap<String, String>,
}
