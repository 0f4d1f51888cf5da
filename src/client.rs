use std::path::{Path, PathBuf};

use kubernetes::{
    Client, Config, InCluster, InClusterError, Kubeconfig, KubeconfigError, MetricsClient,
};
use tracing::debug;

use crate::config::ClientConnection;

/// Broad classification of resolution failures, for callers which only
/// care whether the input was malformed or the environment was unusable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The kubeconfig file could not be read or understood.
    Parse,

    /// The configuration could not be assembled from the inputs or the
    /// environment.
    Configuration,

    /// The client could not be constructed from a resolved configuration.
    Client,
}

/// Errors from looking up the API server address in a kubeconfig file.
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("failed to load kubeconfig: {0}")]
    Load(#[source] KubeconfigError),

    /// The context named by `current-context` does not exist.
    #[error("failed to get master address from kubeconfig")]
    ContextNotFound(String),

    /// The cluster referenced by the current context does not exist.
    #[error("failed to get master address from kubeconfig")]
    ClusterNotFound(String),
}

impl LocateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LocateError::Load(_) => ErrorKind::Parse,
            LocateError::ContextNotFound(_) | LocateError::ClusterNotFound(_) => {
                ErrorKind::Configuration
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse kubeconfig file: {0}")]
    ParseKubeconfig(#[source] LocateError),

    #[error("unable to build config: {0}")]
    BuildConfig(#[source] KubeconfigError),

    #[error("unable to build in cluster config: {0}")]
    BuildInClusterConfig(#[source] InClusterError),

    #[error("create client failed, {0}")]
    CreateClient(#[source] kubernetes::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ParseKubeconfig(_) => ErrorKind::Parse,
            Error::BuildConfig(_) | Error::BuildInClusterConfig(_) => ErrorKind::Configuration,
            Error::CreateClient(_) => ErrorKind::Client,
        }
    }
}

/// Where the connection settings come from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigSource {
    /// An explicitly supplied kubeconfig file.
    Kubeconfig(PathBuf),

    /// The service account the cluster runtime mounts into the pod.
    InCluster,
}

impl From<&ClientConnection> for ConfigSource {
    fn from(connection: &ClientConnection) -> Self {
        match connection.kubeconfig() {
            Some(path) => ConfigSource::Kubeconfig(path.to_path_buf()),
            None => ConfigSource::InCluster,
        }
    }
}

/// Returns the server address of the cluster referenced by the current
/// context of the kubeconfig at `path`. The address is empty when the
/// cluster entry does not record one.
pub fn master_from_kubeconfig(path: impl AsRef<Path>) -> Result<String, LocateError> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(LocateError::Load)?;

    let current_context = kubeconfig.current_context.as_deref().unwrap_or_default();
    let context = kubeconfig
        .context(current_context)
        .ok_or_else(|| LocateError::ContextNotFound(current_context.to_string()))?;
    let cluster = kubeconfig
        .cluster(&context.cluster)
        .ok_or_else(|| LocateError::ClusterNotFound(context.cluster.clone()))?;

    Ok(cluster.server.clone().unwrap_or_default())
}

/// Builds the connection config from the kubeconfig of `connection`, or from
/// the in-cluster service account when no kubeconfig is set, and applies the
/// burst and qps of `connection` to it.
pub fn resolve_config(connection: &ClientConnection) -> Result<Config, Error> {
    resolve_with(connection, InCluster::from_env)
}

fn resolve_with(
    connection: &ClientConnection,
    in_cluster: impl FnOnce() -> InCluster,
) -> Result<Config, Error> {
    let source = ConfigSource::from(connection);
    debug!(
        message = "resolving client config",
        ?source,
        burst = connection.burst,
        qps = connection.qps
    );

    let mut config = match source {
        ConfigSource::Kubeconfig(path) => {
            let master = master_from_kubeconfig(&path).map_err(Error::ParseKubeconfig)?;

            Config::from_kubeconfig_with_master(&path, &master).map_err(Error::BuildConfig)?
        }
        ConfigSource::InCluster => in_cluster()
            .load()
            .map_err(Error::BuildInClusterConfig)?,
    };

    config.burst = connection.burst;
    config.qps = connection.qps;

    Ok(config)
}

/// Creates a client for the API server. A non-empty `user_agent` is appended
/// to the default user agent so requests of this caller can be told apart.
pub fn create_client(connection: &ClientConnection, user_agent: &str) -> Result<Client, Error> {
    let config = resolve_config(connection)?;

    build_client(config, user_agent)
}

fn build_client(mut config: Config, user_agent: &str) -> Result<Client, Error> {
    if !user_agent.is_empty() {
        config.add_user_agent(user_agent);
    }

    Client::new(config).map_err(Error::CreateClient)
}

/// Creates a client for the resource metrics API.
pub fn create_metrics_client(connection: &ClientConnection) -> Result<MetricsClient, Error> {
    let config = resolve_config(connection)?;

    MetricsClient::new(config).map_err(Error::CreateClient)
}
