use super::client::{Client, Error, ListParams};
use super::config::Config;
use super::resource::{NodeMetrics, ObjectList, PodMetrics};

/// A client for the resource metrics API, `metrics.k8s.io/v1beta1`, served
/// by metrics-server.
#[derive(Clone, Debug)]
pub struct MetricsClient {
    client: Client,
}

impl MetricsClient {
    pub fn new(config: Config) -> Result<Self, Error> {
        Client::new(config).map(|client| MetricsClient { client })
    }

    /// The underlying API client, sharing the connection pool and rate limiter.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Usage of every node.
    pub async fn node_metrics(&self, params: &ListParams) -> Result<ObjectList<NodeMetrics>, Error> {
        self.client.list::<NodeMetrics>(None, params).await
    }

    pub async fn node_metric(&self, name: &str) -> Result<NodeMetrics, Error> {
        self.client.get::<NodeMetrics>(None, name).await
    }

    /// Usage of pods in `namespace`, or in all namespaces when `None`.
    pub async fn pod_metrics(
        &self,
        namespace: Option<&str>,
        params: &ListParams,
    ) -> Result<ObjectList<PodMetrics>, Error> {
        self.client.list::<PodMetrics>(namespace, params).await
    }

    pub async fn pod_metric(&self, namespace: &str, name: &str) -> Result<PodMetrics, Error> {
        self.client.get::<PodMetrics>(Some(namespace), name).await
    }
}
