//! Docker Engine HTTP API client.
//!
//! Talks to the engine over its Unix socket. Every call except the event
//! subscription body is bounded by the configured timeout.
//!
//! Reference: https://docs.docker.com/engine/api/latest/

use std::fmt::Write as _;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hyper::{Body, Client, Method, Request, Response, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use imgsweep_id::{ImageId, ImageRef};
use serde::de::DeserializeOwned;
use tracing::{debug, error};

use super::events::spawn_reader;
use super::types::{
    ContainerSummary, ErrorBody, ImageDeleteItem, ImageInspect, ImageSummary, PruneResponse,
};
use crate::config::Config;
use crate::runtime::{
    EventStream, ImageReferences, ImageRuntime, PruneReport, RemovedImage, RuntimeError,
};

/// Docker Engine client for Unix socket communication.
#[derive(Clone)]
pub struct DockerClient {
    socket_path: String,
    api_prefix: String,
    timeout: Duration,
    client: Client<UnixConnector>,
}

impl DockerClient {
    /// Create a client for the given socket path.
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        let socket_path = socket_path.as_ref().to_string_lossy().to_string();
        Self {
            socket_path,
            api_prefix: String::new(),
            timeout: Duration::from_secs(crate::config::DEFAULT_RUNTIME_TIMEOUT_SECS),
            client: Client::unix(),
        }
    }

    /// Create a client from the sweeper configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.docker_socket)
            .with_api_version(config.docker_api_version.as_deref())
            .with_timeout(config.runtime_timeout)
    }

    /// Pin requests to an engine API version such as `1.43`.
    pub fn with_api_version(mut self, version: Option<&str>) -> Self {
        self.api_prefix = match version {
            Some(v) if !v.is_empty() => format!("/v{}", v),
            _ => String::new(),
        };
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Check if the socket exists.
    pub fn socket_exists(&self) -> bool {
        Path::new(&self.socket_path).exists()
    }

    /// Fail with [`RuntimeError::SocketNotFound`] unless the socket exists.
    pub fn ensure_socket(&self) -> Result<(), RuntimeError> {
        if self.socket_exists() {
            Ok(())
        } else {
            Err(RuntimeError::SocketNotFound(self.socket_path.clone()))
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<Request<Body>, RuntimeError> {
        let uri = Uri::new(&self.socket_path, &format!("{}{}", self.api_prefix, path));
        Ok(Request::builder()
            .method(method)
            .uri(uri)
            .header("Accept", "application/json")
            .body(Body::empty())?)
    }

    /// Send a request and wait for the response head.
    async fn send(&self, method: Method, path: &str) -> Result<Response<Body>, RuntimeError> {
        debug!(method = %method, path = path, "Docker API request");
        let request = self.request(method, path)?;
        let response = tokio::time::timeout(self.timeout, self.client.request(request))
            .await
            .map_err(|_| RuntimeError::Timeout(self.timeout))??;
        Ok(response)
    }

    /// Perform a request and read the whole body, mapping error statuses.
    async fn call(&self, method: Method, path: &str) -> Result<Bytes, RuntimeError> {
        let exchange = async {
            let response = self.send(method, path).await?;
            let status = response.status();
            let body = hyper::body::to_bytes(response.into_body()).await?;
            Ok::<_, RuntimeError>((status, body))
        };
        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RuntimeError::Timeout(self.timeout))??;

        if status.is_success() {
            Ok(body)
        } else {
            Err(status_error(status, &body))
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RuntimeError> {
        let body = self.call(Method::GET, path).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn inspect(&self, reference: &str) -> Result<ImageInspect, RuntimeError> {
        self.get_json(&format!("/images/{}/json", reference)).await
    }
}

/// Build the error for a non-2xx response.
fn status_error(status: StatusCode, body: &[u8]) -> RuntimeError {
    let message = serde_json::from_slice::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    if status == StatusCode::NOT_FOUND {
        return RuntimeError::NotFound(message);
    }

    error!(status = %status, message = %message, "Docker API error");
    RuntimeError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Percent-encode a query parameter value.
///
/// Everything outside the unreserved set is escaped.
pub fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => {
                let _ = write!(out, "%{:02X}", byte);
            }
        }
    }
    out
}

/// JSON `filters` query value for the engine's list endpoints.
fn filters(json: serde_json::Value) -> String {
    encode_query_value(&json.to_string())
}

fn parse_image_id(raw: &str) -> Result<ImageId, RuntimeError> {
    ImageId::parse(raw).map_err(|e| {
        RuntimeError::InvalidResponse(format!("{} id '{}': {}", ImageId::KIND, raw, e))
    })
}

fn removed_items(items: Vec<ImageDeleteItem>) -> Vec<RemovedImage> {
    let mut removed = Vec::with_capacity(items.len());
    for item in items {
        if let Some(reference) = item.untagged.as_deref() {
            match ImageRef::parse(reference) {
                Ok(reference) => removed.push(RemovedImage::Untagged(reference)),
                Err(e) => debug!(reference, error = %e, "Ignoring unparsable untagged reference"),
            }
        }
        if let Some(id) = item.deleted.as_deref() {
            match ImageId::parse(id) {
                Ok(id) => removed.push(RemovedImage::Deleted(id)),
                Err(e) => debug!(id, error = %e, "Ignoring unparsable deleted id"),
            }
        }
    }
    removed
}

#[async_trait]
impl ImageRuntime for DockerClient {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.ensure_socket()?;
        self.call(Method::GET, "/_ping").await?;
        Ok(())
    }

    async fn resolve_image(&self, reference: &str) -> Result<Option<ImageId>, RuntimeError> {
        match self.inspect(reference).await {
            Ok(inspect) => parse_image_id(&inspect.id).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_images(&self) -> Result<Vec<ImageId>, RuntimeError> {
        let images: Vec<ImageSummary> = self.get_json("/images/json").await?;
        images.iter().map(|i| parse_image_id(&i.id)).collect()
    }

    async fn image_references(&self, id: &ImageId) -> Result<ImageReferences, RuntimeError> {
        let inspect = self.inspect(id.as_str()).await?;

        let mut repo_tags = Vec::new();
        for tag in inspect.tags() {
            match ImageRef::parse(tag) {
                Ok(reference) => repo_tags.push(reference),
                Err(e) => debug!(image_id = %id, tag, error = %e, "Ignoring unparsable tag"),
            }
        }

        Ok(ImageReferences {
            repo_tags,
            labels: inspect.labels(),
        })
    }

    async fn count_containers(
        &self,
        id: &ImageId,
        include_stopped: bool,
    ) -> Result<usize, RuntimeError> {
        let path = format!(
            "/containers/json?all={}&filters={}",
            include_stopped,
            filters(serde_json::json!({ "ancestor": [id.as_str()] }))
        );
        let containers: Vec<ContainerSummary> = self.get_json(&path).await?;
        for container in &containers {
            debug!(
                image_id = %id,
                container_id = %container.id,
                state = container.state.as_deref().unwrap_or("unknown"),
                "Image in use by container"
            );
        }
        Ok(containers.len())
    }

    async fn remove_image(
        &self,
        id: &ImageId,
        force: bool,
    ) -> Result<Vec<RemovedImage>, RuntimeError> {
        let path = format!("/images/{}?force={}", id.as_str(), force);
        let body = self.call(Method::DELETE, &path).await?;
        let items: Vec<ImageDeleteItem> = serde_json::from_slice(&body)?;
        Ok(removed_items(items))
    }

    async fn prune_dangling(&self) -> Result<PruneReport, RuntimeError> {
        let path = format!(
            "/images/prune?filters={}",
            filters(serde_json::json!({ "dangling": ["true"] }))
        );
        let body = self.call(Method::POST, &path).await?;
        let response: PruneResponse = serde_json::from_slice(&body)?;

        let images_deleted = response
            .images_deleted
            .unwrap_or_default()
            .iter()
            .filter(|item| item.deleted.is_some())
            .count();

        Ok(PruneReport {
            images_deleted,
            space_reclaimed: response.space_reclaimed,
        })
    }

    async fn subscribe_creation_events(&self) -> Result<EventStream, RuntimeError> {
        let path = format!(
            "/events?filters={}",
            filters(serde_json::json!({ "type": ["container"], "event": ["create"] }))
        );
        let response = self.send(Method::GET, &path).await?;
        let status = response.status();

        if !status.is_success() {
            let body = hyper::body::to_bytes(response.into_body()).await?;
            return Err(status_error(status, &body));
        }

        let (tx, stream) = EventStream::channel(EventStream::DEFAULT_CAPACITY);
        spawn_reader(response.into_body(), tx);
        debug!("Subscribed to container creation events");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{UnixListener, UnixStream};

    const IMAGE: &str = "sha256:aa";

    /// What the engine sends back for one request.
    enum Reply {
        /// A complete response with a JSON body.
        Json(u16, String),
        /// A close-delimited body made of these records, one per line.
        Stream(Vec<String>),
    }

    type Route = Arc<dyn Fn(&str, &str) -> Reply + Send + Sync>;

    /// A Docker engine on a temporary Unix socket that answers each
    /// request from `route(method, target)` and records the request line.
    struct FakeEngine {
        _dir: TempDir,
        path: PathBuf,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeEngine {
        fn start<F>(route: F) -> Self
        where
            F: Fn(&str, &str) -> Reply + Send + Sync + 'static,
        {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("docker.sock");
            let listener = UnixListener::bind(&path).unwrap();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let route: Route = Arc::new(route);

            let recorded = requests.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    tokio::spawn(answer(stream, route.clone(), recorded.clone()));
                }
            });

            Self {
                _dir: dir,
                path,
                requests,
            }
        }

        fn client(&self) -> DockerClient {
            DockerClient::new(&self.path).with_timeout(Duration::from_secs(5))
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn answer(mut stream: UnixStream, route: Route, requests: Arc<Mutex<Vec<String>>>) {
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => head.extend_from_slice(&buf[..n]),
            }
        }

        let head = String::from_utf8_lossy(&head).to_string();
        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default().to_string();
        let target = request_line.next().unwrap_or_default().to_string();
        requests.lock().unwrap().push(format!("{} {}", method, target));

        let response = match route(&method, &target) {
            Reply::Json(status, body) => {
                let reason = StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("");
                format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                )
            }
            Reply::Stream(records) => {
                let mut response = String::from(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n",
                );
                for record in records {
                    response.push_str(&record);
                    response.push('\n');
                }
                response
            }
        };

        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }

    fn ok(body: &str) -> Reply {
        Reply::Json(200, body.to_string())
    }

    fn not_found(what: &str) -> Reply {
        Reply::Json(404, format!(r#"{{"message":"No such image: {}"}}"#, what))
    }

    #[tokio::test]
    async fn test_ping_against_engine() {
        let engine = FakeEngine::start(|_, _| ok("OK"));

        engine.client().ping().await.unwrap();
        assert_eq!(engine.requests(), vec!["GET /_ping"]);
    }

    #[tokio::test]
    async fn test_api_version_prefixes_every_path() {
        let engine = FakeEngine::start(|_, _| ok("OK"));

        let client = engine.client().with_api_version(Some("1.43"));
        client.ping().await.unwrap();
        assert_eq!(engine.requests(), vec!["GET /v1.43/_ping"]);
    }

    #[tokio::test]
    async fn test_resolve_image_hit_and_miss() {
        let engine = FakeEngine::start(|_, target| match target {
            "/images/web:v1/json" => ok(r#"{"Id":"sha256:aa","RepoTags":["web:v1"]}"#),
            _ => not_found("ghost:1"),
        });
        let client = engine.client();

        assert_eq!(
            client.resolve_image("web:v1").await.unwrap(),
            Some(ImageId::parse(IMAGE).unwrap())
        );
        assert_eq!(client.resolve_image("ghost:1").await.unwrap(), None);
        assert_eq!(
            engine.requests(),
            vec!["GET /images/web:v1/json", "GET /images/ghost:1/json"]
        );
    }

    #[tokio::test]
    async fn test_resolve_image_server_error_is_not_a_miss() {
        let engine = FakeEngine::start(|_, _| {
            Reply::Json(500, r#"{"message":"daemon is busy"}"#.to_string())
        });

        let err = engine.client().resolve_image("web:v1").await.unwrap_err();
        assert!(matches!(err, RuntimeError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_count_containers_query() {
        let engine = FakeEngine::start(|_, _| ok(r#"[{"Id":"c1","State":"exited"}]"#));
        let id = ImageId::parse(IMAGE).unwrap();

        assert_eq!(engine.client().count_containers(&id, true).await.unwrap(), 1);
        assert_eq!(
            engine.requests(),
            vec!["GET /containers/json?all=true&filters=%7B%22ancestor%22%3A%5B%22sha256%3Aaa%22%5D%7D"]
        );
    }

    #[tokio::test]
    async fn test_remove_image_reports_items() {
        let engine = FakeEngine::start(|_, _| {
            ok(r#"[{"Untagged":"web:v1"},{"Deleted":"sha256:aa"}]"#)
        });
        let id = ImageId::parse(IMAGE).unwrap();

        let removed = engine.client().remove_image(&id, true).await.unwrap();
        assert_eq!(
            removed,
            vec![
                RemovedImage::Untagged(ImageRef::parse("web:v1").unwrap()),
                RemovedImage::Deleted(id.clone()),
            ]
        );
        assert_eq!(engine.requests(), vec!["DELETE /images/sha256:aa?force=true"]);
    }

    #[tokio::test]
    async fn test_remove_missing_image_is_not_found() {
        let engine = FakeEngine::start(|_, _| not_found("sha256:aa"));
        let id = ImageId::parse(IMAGE).unwrap();

        let err = engine.client().remove_image(&id, false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_prune_dangling_report() {
        let engine = FakeEngine::start(|_, _| {
            ok(r#"{"ImagesDeleted":[{"Untagged":"old:1"},{"Deleted":"sha256:bb"},{"Deleted":"sha256:cc"}],"SpaceReclaimed":2048}"#)
        });

        let report = engine.client().prune_dangling().await.unwrap();
        assert_eq!(report.images_deleted, 2);
        assert_eq!(report.space_reclaimed, 2048);
        assert_eq!(
            engine.requests(),
            vec!["POST /images/prune?filters=%7B%22dangling%22%3A%5B%22true%22%5D%7D"]
        );
    }

    #[tokio::test]
    async fn test_event_subscription_delivers_then_closes() {
        let engine = FakeEngine::start(|_, _| {
            Reply::Stream(vec![
                r#"{"Type":"container","Action":"create","Actor":{"ID":"c0ffee","Attributes":{"image":"web:v1"}},"time":1700000000}"#.to_string(),
            ])
        });

        let mut events = engine.client().subscribe_creation_events().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap()
            .expect("one event")
            .unwrap();
        assert_eq!(event.image, ImageRef::parse("web:v1").unwrap());
        assert_eq!(event.time, Some(1_700_000_000));

        let end = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .unwrap();
        assert!(end.is_none());

        let requests = engine.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("GET /events?filters="));
    }

    #[tokio::test]
    async fn test_event_subscription_rejected() {
        let engine = FakeEngine::start(|_, _| {
            Reply::Json(400, r#"{"message":"invalid filter"}"#.to_string())
        });

        let err = engine.client().subscribe_creation_events().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Api { status: 400, .. }));
    }

    #[test]
    fn test_encode_query_value() {
        assert_eq!(encode_query_value("abc-1.2_~"), "abc-1.2_~");
        assert_eq!(
            encode_query_value(r#"{"dangling":["true"]}"#),
            "%7B%22dangling%22%3A%5B%22true%22%5D%7D"
        );
        assert_eq!(encode_query_value("a b/c"), "a%20b%2Fc");
    }

    #[test]
    fn test_status_error_mapping() {
        let not_found = status_error(
            StatusCode::NOT_FOUND,
            br#"{"message":"No such image: web:v1"}"#,
        );
        assert!(not_found.is_not_found());
        assert!(not_found.to_string().contains("No such image"));

        match status_error(StatusCode::CONFLICT, b"conflict\n") {
            RuntimeError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message, "conflict");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_removed_items() {
        let items = vec![
            ImageDeleteItem {
                untagged: Some("web:v1".into()),
                deleted: None,
            },
            ImageDeleteItem {
                untagged: None,
                deleted: Some("sha256:4b1a".into()),
            },
        ];

        assert_eq!(
            removed_items(items),
            vec![
                RemovedImage::Untagged(ImageRef::parse("web:v1").unwrap()),
                RemovedImage::Deleted(ImageId::parse("sha256:4b1a").unwrap()),
            ]
        );
    }

    #[test]
    fn test_api_version_prefix() {
        let client = DockerClient::new("/tmp/docker.sock").with_api_version(Some("1.43"));
        assert_eq!(client.api_prefix, "/v1.43");

        let client = client.with_api_version(None);
        assert!(client.api_prefix.is_empty());
    }

    #[tokio::test]
    async fn test_missing_socket_fails_ping() {
        let dir = TempDir::new().unwrap();
        let client = DockerClient::new(dir.path().join("docker.sock"));

        assert!(!client.socket_exists());
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, RuntimeError::SocketNotFound(_)));
    }

    #[tokio::test]
    async fn test_unresponsive_socket_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("docker.sock");
        // Accept connections but never answer.
        let _listener = tokio::net::UnixListener::bind(&path).unwrap();
        let client = DockerClient::new(&path).with_timeout(Duration::from_millis(100));

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout(_)));
    }
}
