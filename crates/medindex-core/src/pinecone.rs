//! Pinecone serverless index over its REST API.
//!
//! The control plane (`{control_url}/indexes`) is used to check for, create and
//! describe the index; upserts go to the index's own host returned by describe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::PineconeConfig;
use crate::documents::Metadata;
use crate::store::{EmbeddedChunk, StoreError, VectorStore};

/// Metadata key holding the chunk text, where LangChain-style retrievers look for it.
pub const TEXT_KEY: &str = "text";

const METRIC: &str = "cosine";

pub struct PineconeStore {
    client: Client,
    control_url: String,
    index_name: String,
    dimension: usize,
    cloud: String,
    region: String,
    batch_size: usize,
    ready_poll: Duration,
    /// Data-plane base URL, known once the index has been described.
    host: Option<String>,
}

impl PineconeStore {
    pub fn new(
        api_key: &str,
        index_name: &str,
        dimension: usize,
        config: &PineconeConfig,
    ) -> Result<Self, StoreError> {
        url::Url::parse(&config.control_url)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key.trim()).map_err(|_| StoreError::InvalidApiKey)?,
        );
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_str(&config.api_version)
                .map_err(|_| StoreError::InvalidApiVersion(config.api_version.clone()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(headers).build()?;
        Ok(Self {
            client,
            control_url: config.control_url.trim_end_matches('/').to_string(),
            index_name: index_name.to_string(),
            dimension,
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            batch_size: config.upsert_batch_size.max(1),
            ready_poll: Duration::from_millis(config.ready_poll_ms),
            host: None,
        })
    }

    /// `None` when the index does not exist.
    async fn describe(&self) -> Result<Option<IndexModel>, StoreError> {
        let url = format!("{}/indexes/{}", self.control_url, self.index_name);
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp).await?;
        Ok(Some(resp.json().await?))
    }

    /// Returns false when the index already existed (409 conflict).
    async fn create(&self) -> Result<bool, StoreError> {
        let body = CreateIndexRequest {
            name: &self.index_name,
            dimension: self.dimension,
            metric: METRIC,
            spec: json!({ "serverless": { "cloud": self.cloud, "region": self.region } }),
        };
        let url = format!("{}/indexes", self.control_url);
        let resp = self.client.post(url).json(&body).send().await?;
        if resp.status() == StatusCode::CONFLICT {
            return Ok(false);
        }
        check(resp).await?;
        Ok(true)
    }

    /// Describe until the index reports ready. Polls without a deadline.
    async fn wait_until_ready(&self) -> Result<IndexModel, StoreError> {
        loop {
            let model = self
                .describe()
                .await?
                .ok_or_else(|| StoreError::IndexNotFound(self.index_name.clone()))?;
            if model.status.ready {
                return Ok(model);
            }
            tracing::debug!(index = %self.index_name, state = %model.status.state, "waiting for index");
            tokio::time::sleep(self.ready_poll).await;
        }
    }

    fn check_dimension(&self, model: &IndexModel) -> Result<(), StoreError> {
        match model.dimension {
            Some(existing) if existing != self.dimension => Err(StoreError::DimensionMismatch {
                name: self.index_name.clone(),
                existing,
                expected: self.dimension,
            }),
            _ => Ok(()),
        }
    }

    async fn host(&mut self) -> Result<String, StoreError> {
        if let Some(host) = &self.host {
            return Ok(host.clone());
        }
        let model = self
            .describe()
            .await?
            .ok_or_else(|| StoreError::IndexNotFound(self.index_name.clone()))?;
        let host = data_plane_url(&model.host);
        self.host = Some(host.clone());
        Ok(host)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn create_if_absent(&mut self) -> Result<(), StoreError> {
        let model = match self.describe().await? {
            Some(model) => {
                tracing::info!(index = %self.index_name, "index exists, reusing it");
                model
            }
            None => {
                if self.create().await? {
                    tracing::info!(
                        index = %self.index_name,
                        dimension = self.dimension,
                        cloud = %self.cloud,
                        region = %self.region,
                        "created index"
                    );
                }
                self.wait_until_ready().await?
            }
        };
        self.check_dimension(&model)?;
        self.host = Some(data_plane_url(&model.host));
        Ok(())
    }

    async fn upsert(&mut self, items: Vec<EmbeddedChunk>) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        let url = format!("{}/vectors/upsert", self.host().await?);
        let mut upserted = 0;
        for batch in items.chunks(self.batch_size) {
            let vectors: Vec<Vector> = batch.iter().map(Vector::from).collect();
            let resp = self
                .client
                .post(&url)
                .json(&UpsertRequest { vectors })
                .send()
                .await?;
            let resp: UpsertResponse = check(resp).await?.json().await?;
            tracing::debug!(count = resp.upserted_count, "upserted batch");
            upserted += resp.upserted_count;
        }
        Ok(upserted)
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}

/// Pass successful responses through; turn anything else into [`StoreError::Api`].
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(StoreError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Pinecone returns bare hostnames; keep an explicit scheme if one is present.
fn data_plane_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: &'a str,
    spec: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct IndexModel {
    #[serde(default)]
    dimension: Option<usize>,
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    state: String,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<Vector<'a>>,
}

#[derive(Serialize)]
struct Vector<'a> {
    id: String,
    values: &'a [f32],
    metadata: Metadata,
}

impl<'a> From<&'a EmbeddedChunk> for Vector<'a> {
    fn from(item: &'a EmbeddedChunk) -> Self {
        let mut metadata = item.chunk.metadata.clone();
        metadata.insert(TEXT_KEY.into(), json!(item.chunk.text));
        Self {
            id: item.chunk.id(),
            values: &item.embedding,
            metadata,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::chunks::Chunk;
    use crate::documents::SOURCE_KEY;

    const INDEX: &str = "medical-chatbot";

    fn store_for(server: &MockServer) -> PineconeStore {
        let config = PineconeConfig {
            control_url: server.uri(),
            ready_poll_ms: 1,
            upsert_batch_size: 2,
            ..PineconeConfig::default()
        };
        PineconeStore::new("pc-key", INDEX, 384, &config).unwrap()
    }

    fn described(server: &MockServer, dimension: usize, ready: bool) -> serde_json::Value {
        let state = if ready { "Ready" } else { "Initializing" };
        json!({
            "name": INDEX,
            "dimension": dimension,
            "metric": "cosine",
            "host": server.uri(),
            "status": { "ready": ready, "state": state }
        })
    }

    fn item(index: usize) -> EmbeddedChunk {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.into(), json!("data/guide.pdf"));
        EmbeddedChunk {
            chunk: Chunk {
                text: format!("chunk {index}"),
                metadata,
                index,
                start: index * 10,
            },
            embedding: vec![0.1; 384],
        }
    }

    #[tokio::test]
    async fn existing_index_is_not_recreated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .and(header("Api-Key", "pc-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 384, true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        store.create_if_absent().await.unwrap();
        assert_eq!(store.host.as_deref(), Some(server.uri().as_str()));
    }

    #[tokio::test]
    async fn missing_index_is_created_serverless_and_awaited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 384, false)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 384, true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .and(body_partial_json(json!({
                "name": INDEX,
                "dimension": 384,
                "metric": "cosine",
                "spec": { "serverless": { "cloud": "aws", "region": "us-east-1" } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(described(&server, 384, false)))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        store.create_if_absent().await.unwrap();
        assert!(store.host.is_some());
    }

    #[tokio::test]
    async fn create_conflict_counts_as_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 384, false)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 384, true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(409).set_body_string("ALREADY_EXISTS"))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        store.create_if_absent().await.unwrap();
        assert_eq!(store.host.as_deref(), Some(server.uri().as_str()));
    }

    #[tokio::test]
    async fn create_conflict_still_checks_dimension() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(404))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 1536, true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        let err = store.create_if_absent().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { existing: 1536, expected: 384, .. }
        ));
    }

    #[test]
    fn bad_api_version_is_reported_as_such() {
        let config = PineconeConfig {
            api_version: "2025-01\n".to_string(),
            ..PineconeConfig::default()
        };
        match PineconeStore::new("pc-key", INDEX, 384, &config) {
            Err(StoreError::InvalidApiVersion(v)) => assert_eq!(v, "2025-01\n"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("header value with a newline was accepted"),
        }
    }

    #[tokio::test]
    async fn dimension_mismatch_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 768, true)))
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        let err = store.create_if_absent().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch { existing: 768, expected: 384, .. }
        ));
    }

    #[tokio::test]
    async fn auth_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API Key"))
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        match store.create_if_absent().await.unwrap_err() {
            StoreError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Invalid API Key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn upserts_in_batches_with_text_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/indexes/{INDEX}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(described(&server, 384, true)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(body_partial_json(json!({
                "vectors": [{
                    "id": item(0).chunk.id(),
                    "metadata": { "source": "data/guide.pdf", "text": "chunk 0" }
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 2 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "upsertedCount": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        store.create_if_absent().await.unwrap();
        let n = store.upsert(vec![item(0), item(1), item(2)]).await.unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn upsert_without_index_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut store = store_for(&server);
        let err = store.upsert(vec![item(0)]).await.unwrap_err();
        assert!(matches!(err, StoreError::IndexNotFound(_)));
    }

    #[test]
    fn bare_hosts_get_https() {
        assert_eq!(
            data_plane_url("medical-chatbot-abc.svc.aped-4627.pinecone.io"),
            "https://medical-chatbot-abc.svc.aped-4627.pinecone.io"
        );
        assert_eq!(data_plane_url("http://127.0.0.1:8080/"), "http://127.0.0.1:8080");
    }
}
