mod file;
mod incluster;
pub(crate) mod tls;

use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use headers::authorization::InvalidBearerToken;
use headers::{Authorization, HeaderMapExt};
use http::Request;
use tokio::time::Instant;

pub use file::{
    AuthInfo, Cluster, Context, Error as KubeconfigError, Kubeconfig, NamedAuthInfo, NamedCluster,
    NamedContext,
};
pub use incluster::{Error as InClusterError, InCluster};
pub use tls::Error as TlsError;

/// How long a token read from disk is trusted before it is read again.
const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Errors from loading data from a base64 string or a file
#[derive(Debug, thiserror::Error)]
pub enum LoadDataError {
    /// Failed to decode base64 data
    #[error("failed to decode base64 data: {0}")]
    DecodeBase64(#[source] base64::DecodeError),

    /// Failed to read file
    #[error("failed to read file '{1:?}': {0}")]
    ReadFile(#[source] std::io::Error, PathBuf),

    /// No base64 data or file path was provided
    #[error("missing base64 data or file")]
    MissingDataOrFile,
}

/// Errors from attaching credentials to an outgoing request
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("refresh token failed, {0}")]
    RefreshToken(#[source] std::io::Error),

    #[error("invalid bearer token")]
    InvalidBearerToken(InvalidBearerToken),
}

struct Inner {
    token: String,
    expire_at: Instant,
}

/// A bearer token backed by a file which the cluster runtime rotates.
#[derive(Clone)]
pub struct RefreshableToken {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl Debug for RefreshableToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        f.debug_struct("RefreshableToken")
            .field("path", &self.path)
            .field("expire_at", &inner.expire_at)
            .finish()
    }
}

impl RefreshableToken {
    pub(crate) fn new(path: PathBuf) -> std::io::Result<Self> {
        let token = read_token(&path)?;

        Ok(RefreshableToken {
            path,
            inner: Arc::new(Mutex::new(Inner {
                token,
                expire_at: Instant::now() + TOKEN_REFRESH_INTERVAL,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> std::io::Result<String> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        if now > inner.expire_at {
            inner.token = read_token(&self.path)?;
            inner.expire_at = now + TOKEN_REFRESH_INTERVAL;
        }

        Ok(inner.token.clone())
    }
}

fn read_token(path: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(path).map(|content| content.trim().to_string())
}

#[derive(Clone, Debug)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    RefreshableToken(RefreshableToken),
}

impl Auth {
    pub fn apply<T>(&self, req: &mut Request<T>) -> Result<(), AuthError> {
        match self {
            Auth::None => {}
            Auth::Basic { username, password } => {
                req.headers_mut()
                    .typed_insert(Authorization::basic(username, password));
            }
            Auth::Bearer { token } => {
                let authorization =
                    Authorization::bearer(token).map_err(AuthError::InvalidBearerToken)?;
                req.headers_mut().typed_insert(authorization);
            }
            Auth::RefreshableToken(refreshable_token) => {
                let token = refreshable_token.token().map_err(AuthError::RefreshToken)?;
                let authorization =
                    Authorization::bearer(&token).map_err(AuthError::InvalidBearerToken)?;
                req.headers_mut().typed_insert(authorization);
            }
        }

        Ok(())
    }
}

/// The user agent sent when no identity is configured,
/// `<name>/<version> (<os>/<arch>)`.
pub fn default_user_agent() -> String {
    format!(
        "{}/{} ({}/{})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Configuration object detailing things like cluster URL, default namespace,
/// credentials, rate limits and the user agent.
///
/// # Usage
/// Construct a [`Config`] with [`Config::from_kubeconfig`],
/// [`Config::from_kubeconfig_with_master`] or [`Config::incluster`], adjust
/// `burst`, `qps` and the user agent, then hand it to a client.
///
/// If you only need to inspect a kubeconfig file see [`Kubeconfig`].
#[derive(Debug)]
pub struct Config {
    /// The configured cluster url.
    pub cluster_url: http::Uri,

    /// The configured default namespace.
    pub default_namespace: String,

    /// Stores information to tell the cluster who you are.
    pub auth: Auth,

    pub tls: rustls::ClientConfig,

    /// Maximum burst for throttle. Zero selects the client default.
    pub burst: i32,

    /// Queries per second allowed to the API server. Zero selects the client
    /// default, a negative value disables rate limiting.
    pub qps: f32,

    /// Sent as the `User-Agent` of every request, [`default_user_agent`]
    /// when unset.
    pub user_agent: Option<String>,
}

impl Config {
    /// Build a config from the current context of the kubeconfig at `path`.
    pub fn from_kubeconfig(path: impl AsRef<Path>) -> Result<Config, KubeconfigError> {
        file::from_config(path.as_ref(), None)
    }

    /// Build a config from the current context of the kubeconfig at `path`,
    /// using `master` as the server address. An empty `master` keeps the
    /// address recorded in the file.
    pub fn from_kubeconfig_with_master(
        path: impl AsRef<Path>,
        master: &str,
    ) -> Result<Config, KubeconfigError> {
        let master = (!master.is_empty()).then_some(master);

        file::from_config(path.as_ref(), master)
    }

    /// Build a config from the service account the cluster runtime mounts
    /// into every pod.
    pub fn incluster() -> Result<Config, InClusterError> {
        InCluster::from_env().load()
    }

    /// Appends `agent` to the default user agent, so the server can tell
    /// requests of this caller apart.
    pub fn add_user_agent(&mut self, agent: &str) {
        self.user_agent = Some(format!("{}/{}", default_user_agent(), agent));
    }

    /// The user agent requests will be sent with.
    pub fn user_agent(&self) -> String {
        self.user_agent.clone().unwrap_or_else(default_user_agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent() {
        let root = testify::temp_dir();
        let path = testify::write_file(&root, "kubeconfig", &file::tests::kubeconfig("ctx1"));

        let mut config = Config::from_kubeconfig(&path).unwrap();
        assert_eq!(config.user_agent, None);
        assert_eq!(config.user_agent(), default_user_agent());

        config.add_user_agent("my-controller");
        let agent = config.user_agent();
        assert!(agent.starts_with("kubernetes/"));
        assert_eq!(agent, format!("{}/my-controller", default_user_agent()));
    }

    #[test]
    fn refreshable_token() {
        let root = testify::temp_dir();
        let path = testify::write_file(&root, "token", "first\n");

        let token = RefreshableToken::new(path.clone()).unwrap();
        assert_eq!(token.token().unwrap(), "first");

        // not expired yet, so the cached value is returned
        std::fs::write(&path, "second").unwrap();
        assert_eq!(token.token().unwrap(), "first");
    }

    #[test]
    fn apply_bearer() {
        let auth = Auth::Bearer {
            token: "abc".to_string(),
        };
        let mut req = Request::new(());
        auth.apply(&mut req).unwrap();

        assert_eq!(
            req.headers().get(http::header::AUTHORIZATION).unwrap(),
            "Bearer abc"
        );
    }

    #[test]
    fn apply_invalid_bearer() {
        let auth = Auth::Bearer {
            token: "a\nb".to_string(),
        };
        let mut req = Request::new(());

        assert!(matches!(
            auth.apply(&mut req),
            Err(AuthError::InvalidBearerToken(_))
        ));
    }

    #[test]
    fn apply_none() {
        let mut req = Request::new(());
        Auth::None.apply(&mut req).unwrap();

        assert!(req.headers().is_empty());
    }
}
