use serde::Deserialize;

use super::{ObjectMeta, Resource};

/// Node is a worker node in Kubernetes.
///
/// See https://kubernetes.io/docs/reference/generated/kubernetes-api/v1.31/#node-v1-core
#[derive(Debug, Deserialize)]
pub struct Node {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: NodeSpec,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NodeSpec {
    /// Unschedulable controls node schedulability of new pods.
    pub unschedulable: bool,

    #[serde(rename = "podCIDR")]
    pub pod_cidr: Option<String>,
}

impl Resource for Node {
    const GROUP: &'static str = "";
    const VERSION: &'static str = "v1";
    const KIND: &'static str = "Node";
    const PLURAL: &'static str = "nodes";
}

/// Pod is a collection of containers that can run on a host. This resource
/// is created by clients and scheduled onto hosts.
///
/// See https://kubernetes.io/docs/reference/generated/kubernetes-api/v1.31/#pod-v1-core
#[derive(Debug, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,

    #[serde(default)]
    pub spec: PodSpec,

    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodSpec {
    /// The node the pod is scheduled onto, empty while pending.
    pub node_name: Option<String>,

    pub priority_class_name: Option<String>,

    pub priority: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PodStatus {
    /// Pending, Running, Succeeded, Failed or Unknown.
    pub phase: Option<String>,
}

impl Resource for Pod {
    const GROUP: &'static str = "";
    const VERSION: &'static str = "v1";
    const KIND: &'static str = "Pod";
    const PLURAL: &'static str = "pods";
}
