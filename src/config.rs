use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const fn default_burst() -> i32 {
    100
}

const fn default_qps() -> f32 {
    50.0
}

/// Settings of the connection to the API server.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClientConnection {
    /// Path of the kubeconfig file. When unset or empty, the credentials of
    /// the service account mounted into the pod are used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Maximum burst for throttle.
    #[serde(default = "default_burst")]
    pub burst: i32,

    /// Queries per second allowed to the API server. A negative value
    /// disables client side rate limiting.
    #[serde(default = "default_qps")]
    pub qps: f32,
}

impl Default for ClientConnection {
    fn default() -> Self {
        ClientConnection {
            kubeconfig: None,
            burst: default_burst(),
            qps: default_qps(),
        }
    }
}

impl ClientConnection {
    pub fn new(kubeconfig: impl Into<PathBuf>, burst: i32, qps: f32) -> Self {
        ClientConnection {
            kubeconfig: Some(kubeconfig.into()),
            burst,
            qps,
        }
    }

    /// The kubeconfig path, `None` when it is not set or empty.
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }
}
