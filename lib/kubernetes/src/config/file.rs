use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use super::tls::{self, NoCertificateVerification, client_auth};
use super::{Auth, Config, LoadDataError, RefreshableToken};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to read kube config
    #[error("failed to read '{1:?}': {0}")]
    ReadFile(#[source] std::io::Error, PathBuf),
    /// Failed to parse kube config YAML
    #[error("failed to parse kube config YAML: {0}")]
    Parse(#[source] serde_yaml::Error),
    /// Two entries of the same list share a name
    #[error("duplicate {0} name {1:?}")]
    DuplicateName(&'static str, String),
    /// Failed to determine current context
    #[error("failed to determine current context")]
    CurrentContextNotSet,
    /// Failed to load current context
    #[error("failed to load current context: {0}")]
    LoadContext(String),
    /// Failed to load the cluster of context
    #[error("failed to load the cluster of context: {0}")]
    LoadClusterOfContext(String),
    /// Failed to find named user
    #[error("failed to find named user: {0}")]
    FindUser(String),
    /// Cluster url is missing on selected cluster
    #[error("cluster url is missing on selected cluster")]
    MissingClusterUrl,
    /// Failed to parse cluster uri
    #[error("failed to parse cluster url: {0}")]
    ParseClusterUri(#[source] http::uri::InvalidUri),
    #[error("build tls config failed, {0}")]
    Tls(#[from] tls::Error),
    /// Failed to load client certificate
    #[error("failed to load client certificate")]
    LoadClientCertificate(#[source] LoadDataError),
    /// Failed to load client key
    #[error("failed to load client key")]
    LoadClientKey(#[source] LoadDataError),
    /// Failed to load certificate authority
    #[error("failed to load certificate authority")]
    LoadCertificateAuthority(#[source] LoadDataError),
    /// Failed to read the token file
    #[error("failed to read token file '{1:?}': {0}")]
    ReadTokenFile(#[source] std::io::Error, PathBuf),
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthInfo {
    /// The username for basic authentication to the kubernetes cluster.
    pub username: Option<String>,
    /// the password for basic authentication to the kubernetes cluster.
    pub password: Option<String>,

    /// The bearer token for authentication to the kubernetes cluster.
    pub token: Option<String>,
    /// Pointer to a file that contains a bearer token (as described above).
    #[serde(rename = "tokenFile")]
    pub token_file: Option<PathBuf>,

    /// Path to a client cert file for TLS.
    #[serde(rename = "client-certificate")]
    pub client_certificate: Option<PathBuf>,
    /// PEM-encoded data from a client cert file for TLS. Overrides `client_certificate`
    #[serde(rename = "client-certificate-data")]
    pub client_certificate_data: Option<String>,

    /// Path to a client key file for TLS
    #[serde(rename = "client-key")]
    pub client_key: Option<PathBuf>,
    /// PEM-encoded data from a client key file for TLS. Overrides `client_key`
    #[serde(rename = "client-key-data")]
    pub client_key_data: Option<String>,
}

impl AuthInfo {
    fn has_identity(&self) -> bool {
        self.client_certificate.is_some()
            || self.client_certificate_data.is_some()
            || self.client_key.is_some()
            || self.client_key_data.is_some()
    }
}

/// NamedAuthInfo associates name with authentication.
#[derive(Debug, Deserialize)]
pub struct NamedAuthInfo {
    /// Name of the user
    pub name: String,

    /// Information that describes identity of the user
    #[serde(rename = "user")]
    pub auth_info: Option<AuthInfo>,
}

/// Cluster stores information to connect Kubernetes cluster.
#[derive(Clone, Debug, Deserialize)]
pub struct Cluster {
    /// The address of the kubernetes cluster (https://hostname:port)
    pub server: Option<String>,

    /// Skips the validity check for the server's certificate. This will make your HTTPS
    /// connections insecure.
    #[serde(rename = "insecure-skip-tls-verify", default)]
    pub insecure_skip_tls_verify: bool,

    /// The path to a cert file for the certificate authority.
    #[serde(rename = "certificate-authority")]
    pub certificate_authority: Option<PathBuf>,

    /// PEM-encoded certificate authority certificates. Overrides `certificate_authority`
    #[serde(rename = "certificate-authority-data")]
    pub certificate_authority_data: Option<String>,
}

/// NamedCluster associates name with cluster.
#[derive(Debug, Deserialize)]
pub struct NamedCluster {
    /// Name of cluster
    pub name: String,

    /// Information about how to communicate with  a kubernetes cluster.
    pub cluster: Option<Cluster>,
}

/// Context stores tuple of cluster and user information.
#[derive(Clone, Debug, Deserialize)]
pub struct Context {
    /// Name of the cluster for this context.
    pub cluster: String,

    /// Name of the `AuthInfo` for this context.
    #[serde(default)]
    pub user: String,

    /// The default namespace to use on unspecified requests
    pub namespace: Option<String>,
}

/// NamedContext associates name with context.
#[derive(Debug, Deserialize)]
pub struct NamedContext {
    /// Name of the context
    pub name: String,

    /// Associations for the context
    pub context: Option<Context>,
}

/// [`Kubeconfig`] represents information on how to connect to a remote
/// Kubernetes cluster.
///
/// NOTE: Only necessary fields are present here.
///
/// An analogue of the [config type from client-go](https://github.com/kubernetes/client-go/blob/7697067af71046b18e03dbda04e01a5bb17f9809/tools/clientcmd/api/types.go).
#[derive(Debug, Default, Deserialize)]
pub struct Kubeconfig {
    /// Referencable names to cluster configs
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,

    /// Referencable names to user configs
    #[serde(rename = "users", default)]
    pub auth_infos: Vec<NamedAuthInfo>,

    /// Referencable names to context configs
    #[serde(default)]
    pub contexts: Vec<NamedContext>,

    /// The name of the context that you would like to use by default
    #[serde(rename = "current-context")]
    pub current_context: Option<String>,
}

impl Kubeconfig {
    /// Read and parse the kubeconfig at `path`.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Kubeconfig, Error> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| Error::ReadFile(err, path.into()))?;

        serde_yaml::from_slice::<Kubeconfig>(&data)
            .map_err(Error::Parse)
            .and_then(Kubeconfig::validate)
    }

    pub fn from_yaml(text: &str) -> Result<Kubeconfig, Error> {
        serde_yaml::from_str::<Kubeconfig>(text)
            .map_err(Error::Parse)
            .and_then(Kubeconfig::validate)
    }

    /// Lookups are by name, so names must be unique within each list.
    fn validate(self) -> Result<Kubeconfig, Error> {
        check_unique("cluster", self.clusters.iter().map(|c| c.name.as_str()))?;
        check_unique("context", self.contexts.iter().map(|c| c.name.as_str()))?;
        check_unique("user", self.auth_infos.iter().map(|u| u.name.as_str()))?;

        Ok(self)
    }

    pub fn context(&self, name: &str) -> Option<&Context> {
        self.contexts
            .iter()
            .find(|ctx| ctx.name == name)
            .and_then(|ctx| ctx.context.as_ref())
    }

    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters
            .iter()
            .find(|cluster| cluster.name == name)
            .and_then(|named_cluster| named_cluster.cluster.as_ref())
    }

    pub fn user(&self, name: &str) -> Option<&AuthInfo> {
        self.auth_infos
            .iter()
            .find(|named_user| named_user.name == name)
            .and_then(|named_user| named_user.auth_info.as_ref())
    }
}

fn check_unique<'a>(kind: &'static str, names: impl Iterator<Item = &'a str>) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::DuplicateName(kind, name.to_string()));
        }
    }

    Ok(())
}

pub fn from_config(path: &Path, master: Option<&str>) -> Result<Config, Error> {
    let config = Kubeconfig::read_from(path)?;

    let context_name = config
        .current_context
        .as_deref()
        .ok_or(Error::CurrentContextNotSet)?;
    let context = config
        .context(context_name)
        .ok_or_else(|| Error::LoadContext(context_name.to_string()))?;
    let cluster = config
        .cluster(&context.cluster)
        .ok_or_else(|| Error::LoadClusterOfContext(context.cluster.clone()))?;
    let auth_info = if context.user.is_empty() {
        AuthInfo::default()
    } else {
        config
            .user(&context.user)
            .cloned()
            .ok_or_else(|| Error::FindUser(context.user.clone()))?
    };

    let server = match master {
        Some(master) => master,
        None => cluster
            .server
            .as_deref()
            .filter(|server| !server.is_empty())
            .ok_or(Error::MissingClusterUrl)?,
    };
    let cluster_url = server
        .parse::<http::Uri>()
        .map_err(Error::ParseClusterUri)?;
    let default_namespace = context
        .namespace
        .clone()
        .unwrap_or_else(|| String::from("default"));

    let root_store = if cluster.certificate_authority.is_none()
        && cluster.certificate_authority_data.is_none()
    {
        tls::native_root_store()?
    } else {
        let data = load_base64_or_file(
            cluster.certificate_authority_data.as_ref(),
            cluster.certificate_authority.as_ref(),
        )
        .map_err(Error::LoadCertificateAuthority)?;

        tls::root_store(&data)?
    };

    let builder = tls::builder(root_store)?;
    let mut tls = if auth_info.has_identity() {
        let client_cert = load_base64_or_file(
            auth_info.client_certificate_data.as_ref(),
            auth_info.client_certificate.as_ref(),
        )
        .map_err(Error::LoadClientCertificate)?;
        let mut identity_pem = load_base64_or_file(
            auth_info.client_key_data.as_ref(),
            auth_info.client_key.as_ref(),
        )
        .map_err(Error::LoadClientKey)?;
        identity_pem.extend_from_slice(&client_cert);

        let (chain, pkey) = client_auth(&identity_pem)?;
        builder
            .with_client_auth_cert(chain, pkey)
            .map_err(tls::Error::InvalidPrivateKey)?
    } else {
        builder.with_no_client_auth()
    };

    if cluster.insecure_skip_tls_verify {
        tls.dangerous()
            .set_certificate_verifier(Arc::new(NoCertificateVerification::default()));
    }

    let auth = if let (Some(username), Some(password)) = (auth_info.username, auth_info.password) {
        Auth::Basic { username, password }
    } else if let Some(path) = auth_info.token_file {
        let refreshable_token = RefreshableToken::new(path.clone())
            .map_err(|err| Error::ReadTokenFile(err, path))?;

        Auth::RefreshableToken(refreshable_token)
    } else if let Some(token) = auth_info.token {
        Auth::Bearer { token }
    } else {
        Auth::None
    };

    debug!(
        message = "kubeconfig loaded",
        ?path,
        context = context_name,
        cluster = %context.cluster,
        %cluster_url
    );

    Ok(Config {
        cluster_url,
        default_namespace,
        auth,
        tls,
        burst: 0,
        qps: 0.0,
        user_agent: None,
    })
}

/// Inline data is base64 encoded, a referenced file holds the raw content.
fn load_base64_or_file(
    data: Option<&String>,
    file: Option<&PathBuf>,
) -> Result<Vec<u8>, LoadDataError> {
    if let Some(data) = data {
        use base64::Engine;

        return base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(LoadDataError::DecodeBase64);
    }

    match file {
        Some(path) => std::fs::read(path).map_err(|err| LoadDataError::ReadFile(err, path.clone())),
        None => Err(LoadDataError::MissingDataOrFile),
    }
}
