use std::sync::Arc;

use bytes::Bytes;
use http::header::{ACCEPT, HeaderValue, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client as HttpClient;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use super::config::{Auth, AuthError, Config};
use super::flowcontrol::{self, TokenBucket};
use super::resource::{ObjectList, Resource};
use super::version::Version;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("build http request failed, {0}")]
    BuildRequest(http::Error),
    #[error("read http response failed, {0}")]
    ReadResponse(hyper::Error),
    #[error(transparent)]
    Http(hyper_util::client::legacy::Error),
    #[error("invalid config, {0}")]
    Validation(String),
    #[error("invalid config, {0}")]
    RateLimit(#[from] flowcontrol::Error),
    #[error("invalid user agent {0:?}")]
    InvalidUserAgent(String),
    #[error("api server error, status: {}, reason: {}, message: {}", .0.status, .0.reason, .0.message)]
    Api(ErrorResponse),
    #[error("deserialize response failed, {0}")]
    Deserialize(serde_json::Error),
    #[error("apply credentials failed, {0}")]
    Auth(#[from] AuthError),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialize(err)
    }
}

impl From<hyper::Error> for Error {
    fn from(err: hyper::Error) -> Self {
        Error::ReadResponse(err)
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Error::BuildRequest(err)
    }
}

/// An error response from the API.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    /// The status
    #[serde(default)]
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    #[serde(default)]
    pub code: u16,
}

/// Controls how the resource version parameter is applied for list calls
///
/// See <https://kubernetes.io/docs/reference/using-api/api-concepts/#semantics-for-get-and-list> for details.
#[derive(Debug, PartialEq)]
pub enum VersionMatch {
    /// Returns data at least as new as the provided resource version.
    NotOlderThan,

    /// Return data at the exact resource version provided.
    ///
    /// Note that `Exact` cannot be used with resource version "0".
    Exact,
}

/// Common query parameters used in list calls on collections
#[derive(Debug, Default)]
pub struct ListParams {
    /// A selector to restrict the list of returned objects by their labels.
    pub label_selector: Option<String>,

    /// A selector to restrict the list of returned objects by their fields.
    pub field_selector: Option<String>,

    /// Timeout for the list call in seconds.
    pub timeout: Option<u32>,

    /// Limit the number of results
    ///
    /// If there are more results, the server will respond with a continue token
    /// which can be used to fetch another page of results.
    pub limit: Option<u32>,

    /// Fetch a second page of results.
    pub continue_token: Option<String>,

    /// Determines how resourceVersion is matched applied to list calls
    pub version_match: Option<VersionMatch>,

    /// An explicit resourceVersion using the given `VersionMatch` strategy
    pub resource_version: Option<String>,
}

impl ListParams {
    fn validate(&self) -> Result<(), Error> {
        if let Some(rv) = &self.resource_version {
            if self.version_match == Some(VersionMatch::Exact) && rv == "0" {
                return Err(Error::Validation(
                    "A non-zero resource_version is required when using an Exact match".into(),
                ));
            }
        } else if self.version_match.is_some() {
            return Err(Error::Validation(
                "A resource_version is required when using an explicit match".into(),
            ));
        }

        Ok(())
    }

    /// Validates the params and encodes them as a query string.
    pub fn query(&self) -> Result<String, Error> {
        self.validate()?;

        let mut builder = form_urlencoded::Serializer::new(String::new());

        if let Some(field_selector) = &self.field_selector {
            builder.append_pair("fieldSelector", field_selector);
        }
        if let Some(label_selector) = &self.label_selector {
            builder.append_pair("labelSelector", label_selector);
        }
        if let Some(timeout) = &self.timeout {
            builder.append_pair("timeoutSeconds", &timeout.to_string());
        }
        if let Some(limit) = &self.limit {
            builder.append_pair("limit", &limit.to_string());
        }
        if let Some(continue_token) = &self.continue_token {
            builder.append_pair("continue", continue_token);
        } else if let Some(resource_version) = &self.resource_version {
            // When there's a continue token, we don't want to set resourceVersion
            if resource_version != "0" || self.limit.is_none() {
                builder.append_pair("resourceVersion", resource_version);

                match self.version_match {
                    None => {}
                    Some(VersionMatch::NotOlderThan) => {
                        builder.append_pair("resourceVersionMatch", "NotOlderThan");
                    }
                    Some(VersionMatch::Exact) => {
                        builder.append_pair("resourceVersionMatch", "Exact");
                    }
                }
            }
        }

        Ok(builder.finish())
    }
}

/// A handle to the API server.
///
/// Cloning is cheap, clones share the connection pool and the rate limiter.
#[derive(Clone)]
pub struct Client {
    http_client: HttpClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    auth: Auth,
    endpoint: String,
    default_namespace: String,
    user_agent: HeaderValue,
    rate_limiter: Option<Arc<TokenBucket>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.endpoint)
            .field("default_namespace", &self.default_namespace)
            .field("user_agent", &self.user_agent)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new(config: Config) -> Result<Self, Error> {
        let rate_limiter = TokenBucket::from_config(config.qps, config.burst)?.map(Arc::new);
        let user_agent = config.user_agent();
        let user_agent =
            HeaderValue::from_str(&user_agent).map_err(|_err| Error::InvalidUserAgent(user_agent))?;

        let builder = HttpsConnectorBuilder::new()
            .with_tls_config(config.tls)
            .https_or_http();
        let mut inner = HttpConnector::new();
        inner.enforce_http(false);
        let connector = builder.enable_http1().wrap_connector(inner);

        let http_client =
            hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build(connector);

        let endpoint = config
            .cluster_url
            .to_string()
            .trim_end_matches('/')
            .to_string();

        Ok(Client {
            http_client,
            auth: config.auth,
            endpoint,
            default_namespace: config.default_namespace,
            user_agent,
            rate_limiter,
        })
    }

    /// The namespace of the kubeconfig context or of the service account.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.to_str().unwrap_or_default()
    }

    /// `None` when rate limiting is disabled by a negative qps.
    pub fn rate_limiter(&self) -> Option<&TokenBucket> {
        self.rate_limiter.as_deref()
    }

    /// Retrieve version info of the API server, so we can check the compatibility
    pub async fn version(&self) -> Result<Version, Error> {
        self.request("/version".to_string()).await
    }

    /// List a collection of a resource, across all namespaces when
    /// `namespace` is `None`.
    pub async fn list<R: Resource>(
        &self,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<ObjectList<R>, Error> {
        let query = params.query()?;
        let mut path = R::url_path(namespace);
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query);
        }

        self.request(path).await
    }

    /// Get a single named object.
    pub async fn get<R: Resource>(&self, namespace: Option<&str>, name: &str) -> Result<R, Error> {
        self.request(R::object_path(namespace, name)).await
    }

    async fn request<T: DeserializeOwned>(&self, path: String) -> Result<T, Error> {
        if let Some(rate_limiter) = &self.rate_limiter {
            rate_limiter.accept().await;
        }

        let uri = format!("{}{}", self.endpoint, path);
        trace!(message = "doing http request", uri);

        let mut req = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json")
            .body(Full::<Bytes>::default())?;

        self.auth.apply(&mut req)?;

        let resp = self.http_client.request(req).await.map_err(Error::Http)?;
        let (parts, incoming) = resp.into_parts();
        let body = incoming.collect().await?.to_bytes();

        if parts.status.is_success() {
            return serde_json::from_slice(&body).map_err(Error::Deserialize);
        }

        let err = serde_json::from_slice::<ErrorResponse>(&body).unwrap_or_else(|_err| {
            ErrorResponse {
                status: "Failure".to_string(),
                message: String::from_utf8_lossy(&body).into_owned(),
                reason: parts
                    .status
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string(),
                code: parts.status.as_u16(),
            }
        });

        Err(Error::Api(err))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use http::{Response, StatusCode};
    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use rustls::RootCertStore;
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::tls;
    use crate::{Node, Pod};

    #[derive(Clone, Debug)]
    pub(crate) struct Recorded {
        pub path: String,
        pub query: Option<String>,
        pub user_agent: Option<String>,
        pub authorization: Option<String>,
    }

    pub(crate) type Routes = Vec<(&'static str, StatusCode, &'static str)>;

    /// Serves the canned responses of `routes` by path, recording every
    /// request it sees.
    pub(crate) async fn mock_server(routes: Routes) -> (SocketAddr, Arc<Mutex<Vec<Recorded>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(routes);
        let recorded = Arc::new(Mutex::new(Vec::new()));

        let requests = Arc::clone(&recorded);
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();

                let routes = Arc::clone(&routes);
                let requests = Arc::clone(&requests);
                tokio::spawn(async move {
                    let service = service_fn(move |req: Request<Incoming>| {
                        let header = |name| {
                            req.headers()
                                .get(name)
                                .and_then(|value: &HeaderValue| value.to_str().ok())
                                .map(ToString::to_string)
                        };
                        requests.lock().unwrap().push(Recorded {
                            path: req.uri().path().to_string(),
                            query: req.uri().query().map(ToString::to_string),
                            user_agent: header(USER_AGENT),
                            authorization: header(http::header::AUTHORIZATION),
                        });

                        let (status, body) = routes
                            .iter()
                            .find(|(path, _, _)| *path == req.uri().path())
                            .map(|(_, status, body)| (*status, *body))
                            .unwrap_or((StatusCode::NOT_FOUND, "404 page not found"));

                        async move {
                            Ok::<_, Infallible>(
                                Response::builder()
                                    .status(status)
                                    .header("Content-Type", "application/json")
                                    .body(Full::new(Bytes::from_static(body.as_bytes())))
                                    .unwrap(),
                            )
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                    {
                        panic!("failed to serve connection: {err}")
                    }
                });
            }
        });

        (addr, recorded)
    }

    pub(crate) fn config(addr: SocketAddr) -> Config {
        Config {
            cluster_url: format!("http://{addr}").parse().unwrap(),
            default_namespace: "default".to_string(),
            auth: Auth::Bearer {
                token: "test-token".to_string(),
            },
            tls: tls::builder(RootCertStore::empty())
                .unwrap()
                .with_no_client_auth(),
            burst: 0,
            qps: 0.0,
            user_agent: None,
        }
    }

    const VERSION: &str = r#"{
  "major": "1",
  "minor": "31",
  "gitVersion": "v1.31.0",
  "gitCommit": "9edcffcde5595e8a5b1a35f88c421764e575afce",
  "platform": "linux/amd64"
}"#;

    const PODS: &str = r#"{
  "kind": "PodList",
  "apiVersion": "v1",
  "metadata": {"resourceVersion": "2048"},
  "items": [
    {"metadata": {"name": "nginx", "namespace": "default"}, "spec": {"nodeName": "node-1"}},
    {"metadata": {"name": "redis", "namespace": "default"}, "status": {"phase": "Pending"}}
  ]
}"#;

    const NOT_FOUND: &str = r#"{
  "kind": "Status",
  "apiVersion": "v1",
  "status": "Failure",
  "message": "nodes \"node-9\" not found",
  "reason": "NotFound",
  "code": 404
}"#;

    #[test]
    fn query() {
        let params = ListParams {
            label_selector: Some("app=nginx".to_string()),
            field_selector: Some("spec.nodeName=node-1".to_string()),
            limit: Some(10),
            resource_version: Some("100".to_string()),
            version_match: Some(VersionMatch::NotOlderThan),
            ..Default::default()
        };

        assert_eq!(
            params.query().unwrap(),
            "fieldSelector=spec.nodeName%3Dnode-1&labelSelector=app%3Dnginx&limit=10&resourceVersion=100&resourceVersionMatch=NotOlderThan"
        );
        assert_eq!(ListParams::default().query().unwrap(), "");
    }

    #[test]
    fn query_continue_skips_resource_version() {
        let params = ListParams {
            continue_token: Some("next".to_string()),
            resource_version: Some("100".to_string()),
            ..Default::default()
        };

        assert_eq!(params.query().unwrap(), "continue=next");
    }

    #[test]
    fn query_validation() {
        let params = ListParams {
            version_match: Some(VersionMatch::Exact),
            resource_version: Some("0".to_string()),
            ..Default::default()
        };
        assert!(matches!(params.query(), Err(Error::Validation(_))));

        let params = ListParams {
            version_match: Some(VersionMatch::NotOlderThan),
            ..Default::default()
        };
        assert!(matches!(params.query(), Err(Error::Validation(_))));
    }

    #[test]
    fn rate_limit_from_config() {
        let mut config = config("127.0.0.1:6443".parse().unwrap());
        config.burst = 50;
        config.qps = 20.0;

        let client = Client::new(config).unwrap();
        let rate_limiter = client.rate_limiter().unwrap();
        assert_eq!(rate_limiter.qps(), 20.0);
        assert_eq!(rate_limiter.burst(), 50);
    }

    #[test]
    fn rate_limit_disabled() {
        let mut config = config("127.0.0.1:6443".parse().unwrap());
        config.qps = -1.0;

        let client = Client::new(config).unwrap();
        assert!(client.rate_limiter().is_none());
    }

    #[test]
    fn burst_required() {
        let mut config = config("127.0.0.1:6443".parse().unwrap());
        config.qps = 10.0;
        config.burst = 0;

        assert!(matches!(
            Client::new(config),
            Err(Error::RateLimit(flowcontrol::Error::InvalidBurst))
        ));
    }

    #[test]
    fn invalid_user_agent() {
        let mut config = config("127.0.0.1:6443".parse().unwrap());
        config.user_agent = Some("bad\nagent".to_string());

        assert!(matches!(
            Client::new(config),
            Err(Error::InvalidUserAgent(_))
        ));
    }

    #[test]
    fn debug_hides_credentials() {
        let client = Client::new(config("127.0.0.1:6443".parse().unwrap())).unwrap();
        let text = format!("{client:?}");

        assert!(text.contains("http://127.0.0.1:6443"), "{text}");
        assert!(!text.contains("test-token"), "{text}");

        let err = Client::new(Config {
            burst: -1,
            qps: 10.0,
            ..config("127.0.0.1:6443".parse().unwrap())
        })
        .unwrap_err();
        assert!(matches!(err, Error::RateLimit(_)));
    }

    #[tokio::test]
    async fn version() {
        let (addr, recorded) = mock_server(vec![("/version", StatusCode::OK, VERSION)]).await;
        let mut config = config(addr);
        config.add_user_agent("my-controller");

        let client = Client::new(config).unwrap();
        let version = client.version().await.unwrap();
        assert_eq!(version.major, "1");
        assert_eq!(version.minor, "31");
        assert_eq!(version.git_version, "v1.31.0");

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].path, "/version");
        assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer test-token"));
        assert_eq!(recorded[0].user_agent.as_deref(), Some(client.user_agent()));
        assert!(client.user_agent().ends_with("/my-controller"));
    }

    #[tokio::test]
    async fn list() {
        let (addr, recorded) =
            mock_server(vec![("/api/v1/namespaces/default/pods", StatusCode::OK, PODS)]).await;
        let client = Client::new(config(addr)).unwrap();

        let params = ListParams {
            label_selector: Some("app=nginx".to_string()),
            ..Default::default()
        };
        let list = client
            .list::<Pod>(Some(client.default_namespace()), &params)
            .await
            .unwrap();

        assert_eq!(list.metadata.resource_version.as_deref(), Some("2048"));
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].spec.node_name.as_deref(), Some("node-1"));
        assert_eq!(list.items[1].status.phase.as_deref(), Some("Pending"));

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded[0].query.as_deref(), Some("labelSelector=app%3Dnginx"));
        assert_eq!(
            recorded[0].user_agent.as_deref(),
            Some(crate::default_user_agent().as_str())
        );
    }

    #[tokio::test]
    async fn get_not_found() {
        let (addr, _recorded) =
            mock_server(vec![("/api/v1/nodes/node-9", StatusCode::NOT_FOUND, NOT_FOUND)]).await;
        let client = Client::new(config(addr)).unwrap();

        match client.get::<Node>(None, "node-9").await {
            Err(Error::Api(resp)) => {
                assert_eq!(resp.code, 404);
                assert_eq!(resp.reason, "NotFound");
                assert_eq!(resp.message, "nodes \"node-9\" not found");
            }
            result => panic!("unexpected result {:?}", result.map(|node| node.metadata.name)),
        }
    }

    #[tokio::test]
    async fn plain_text_error() {
        let (addr, _recorded) = mock_server(vec![]).await;
        let client = Client::new(config(addr)).unwrap();

        match client.version().await {
            Err(Error::Api(resp)) => {
                assert_eq!(resp.code, 404);
                assert_eq!(resp.reason, "Not Found");
                assert_eq!(resp.message, "404 page not found");
            }
            result => panic!("unexpected result {result:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_body() {
        let (addr, _recorded) = mock_server(vec![("/version", StatusCode::OK, "[]")]).await;
        let client = Client::new(config(addr)).unwrap();

        assert!(matches!(
            client.version().await,
            Err(Error::Deserialize(_))
        ));
    }
}
