use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::tls;
use super::{Auth, Config, RefreshableToken};

const SERVICE_HOSTENV: &str = "KUBERNETES_SERVICE_HOST";
const SERVICE_PORTENV: &str = "KUBERNETES_SERVICE_PORT";

// Mounted credential files
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const SERVICE_TOKENFILE: &str = "token";
const SERVICE_CERTFILE: &str = "ca.crt";
const SERVICE_DEFAULT_NS: &str = "namespace";

/// Errors from loading in-cluster config
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The service environment variables are not set, so this process is not
    /// running inside a cluster.
    #[error(
        "unable to load in-cluster configuration, KUBERNETES_SERVICE_HOST and KUBERNETES_SERVICE_PORT must be defined"
    )]
    NotInCluster,

    /// Failed to read the default namespace for the service account
    #[error("failed to read the default namespace: {0}")]
    ReadDefaultNamespace(#[source] std::io::Error),

    /// Failed to read a certificate
    #[error("failed to read the certificate file {0}")]
    ReadCertificate(#[source] std::io::Error),

    /// Failed to parse cluster port value
    #[error("failed to parse cluster port: {0}")]
    ParseClusterPort(#[source] std::num::ParseIntError),

    /// Failed to parse cluster url
    #[error("failed to parse cluster uri: {0}")]
    ParseClusterUri(#[source] http::uri::InvalidUri),

    /// Failed to read token file
    #[error("failed to read token file: '{1:?}': {0}")]
    ReadTokenFile(#[source] std::io::Error, PathBuf),

    #[error("build tls config failed, {0}")]
    Tls(#[from] tls::Error),
}

/// Where the cluster runtime exposes the API server address and the service
/// account credentials of the current pod.
#[derive(Clone, Debug)]
pub struct InCluster {
    host: Option<String>,
    port: Option<String>,
    service_account_dir: PathBuf,
}

impl InCluster {
    /// Read `KUBERNETES_SERVICE_HOST` and `KUBERNETES_SERVICE_PORT` from the
    /// process environment, credentials from the default mount path.
    pub fn from_env() -> Self {
        InCluster {
            host: env::var(SERVICE_HOSTENV).ok(),
            port: env::var(SERVICE_PORTENV).ok(),
            service_account_dir: PathBuf::from(SERVICE_ACCOUNT_DIR),
        }
    }

    pub fn new(
        host: Option<String>,
        port: Option<String>,
        service_account_dir: impl Into<PathBuf>,
    ) -> Self {
        InCluster {
            host,
            port,
            service_account_dir: service_account_dir.into(),
        }
    }

    pub fn service_account_dir(&self) -> &Path {
        &self.service_account_dir
    }

    pub fn load(&self) -> Result<Config, Error> {
        let (host, port) = match (self.host.as_deref(), self.port.as_deref()) {
            (Some(host), Some(port)) if !host.is_empty() && !port.is_empty() => (host, port),
            _ => return Err(Error::NotInCluster),
        };

        let cluster_url = try_uri(host, port)?;
        let default_namespace = self.load_default_namespace()?;
        let tls = self.load_tls()?;
        let token_file = self.service_account_dir.join(SERVICE_TOKENFILE);
        let refreshable_token = RefreshableToken::new(token_file.clone())
            .map_err(|err| Error::ReadTokenFile(err, token_file))?;

        debug!(
            message = "in-cluster config loaded",
            %cluster_url,
            namespace = default_namespace.as_str()
        );

        Ok(Config {
            cluster_url,
            default_namespace,
            auth: Auth::RefreshableToken(refreshable_token),
            tls,
            burst: 0,
            qps: 0.0,
            user_agent: None,
        })
    }

    /// Returns the default namespace of the service account, `default` if
    /// the runtime did not mount one.
    fn load_default_namespace(&self) -> Result<String, Error> {
        match std::fs::read_to_string(self.service_account_dir.join(SERVICE_DEFAULT_NS)) {
            Ok(namespace) => Ok(namespace.trim().to_string()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(String::from("default")),
            Err(err) => Err(Error::ReadDefaultNamespace(err)),
        }
    }

    /// Returns tls config trusting the mounted cluster CA.
    fn load_tls(&self) -> Result<rustls::ClientConfig, Error> {
        let data = std::fs::read(self.service_account_dir.join(SERVICE_CERTFILE))
            .map_err(Error::ReadCertificate)?;
        let root_store = tls::root_store(&data)?;

        Ok(tls::builder(root_store)?.with_no_client_auth())
    }
}

/// Returns the URI of the Kubernetes API server from the service host and
/// port.
fn try_uri(host: &str, port: &str) -> Result<http::Uri, Error> {
    let port = port.parse::<u16>().map_err(Error::ParseClusterPort)?;

    // Format a host and, if not using 443, a port.
    //
    // Ensure that IPv6 addresses are properly bracketed.
    const HTTPS: &str = "https";

    let uri = match host.parse::<std::net::IpAddr>() {
        Ok(ip) => {
            if port == 443 {
                if ip.is_ipv6() {
                    format!("{HTTPS}://[{ip}]")
                } else {
                    format!("{HTTPS}://{ip}")
                }
            } else if ip.is_ipv6() {
                format!("{HTTPS}://[{ip}]:{port}")
            } else {
                format!("{HTTPS}://{ip}:{port}")
            }
        }
        Err(_err) => {
            if port == 443 {
                format!("{HTTPS}://{host}")
            } else {
                format!("{HTTPS}://{host}:{port}")
            }
        }
    };

    uri.parse().map_err(Error::ParseClusterUri)
}
