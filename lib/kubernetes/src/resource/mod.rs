mod core_v1;
mod metadata;
mod metrics;

use serde::Deserialize;
use serde::de::DeserializeOwned;

pub use core_v1::{Node, NodeSpec, Pod, PodSpec, PodStatus};
pub use metadata::{ListMeta, ObjectMeta};
pub use metrics::{ContainerMetrics, NodeMetrics, PodMetrics};

/// An accessor trait for a kubernetes Resource.
pub trait Resource: DeserializeOwned {
    /// The group of the resource, or the empty string if the resource doesn't have a
    /// group.
    const GROUP: &'static str;

    /// The version of the resource.
    const VERSION: &'static str;

    const KIND: &'static str;

    /// The plural of this resource, which is used to construct URLS
    const PLURAL: &'static str;

    /// Creates a url path for http requests for this resource
    fn url_path(namespace: Option<&str>) -> String {
        let group = if Self::GROUP.is_empty() {
            "api"
        } else {
            "apis"
        };
        let api_version = if Self::GROUP.is_empty() {
            Self::VERSION.to_string()
        } else {
            format!("{}/{}", Self::GROUP, Self::VERSION)
        };
        let namespace = match namespace {
            Some(namespace) => format!("namespaces/{}/", namespace),
            None => String::new(),
        };
        let plural = Self::PLURAL;

        format!("/{group}/{api_version}/{namespace}{plural}")
    }

    /// Creates a url path for a single named object
    fn object_path(namespace: Option<&str>, name: &str) -> String {
        format!("{}/{}", Self::url_path(namespace), name)
    }
}

/// A generic Kubernetes object list
///
/// This is used instead of a full struct for `NodeList`, `PodList`, etc.
#[derive(Debug, Deserialize)]
pub struct ObjectList<T> {
    /// ListMeta - only really used for its `resourceVersion` and `continue`
    #[serde(default)]
    pub metadata: ListMeta,

    /// These items we are actually interested in.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

impl<T> ObjectList<T> {
    /// The token to fetch the next page, if there is one.
    pub fn continue_token(&self) -> Option<&str> {
        self.metadata
            .continue_
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}
