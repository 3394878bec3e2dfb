// This file contains the implementation of the HubClient struct, which talks to the
// Docker Hub repository API: paginated tag listing, per-tag digest lookups and the
// repository description endpoints used to mirror textual metadata.

use crate::common::RetryPolicy;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{MirrorError, Result};
use crate::image::Repository;
use crate::logging::Logger;
use crate::registry::metadata::{Description, DescriptionUpdate, RegistryMetadata};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HUB_URL: &str = "https://hub.docker.com/";

/// Docker Hub caps the short description at this many characters
const SHORT_DESCRIPTION_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub(crate) struct TagPage {
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub results: Vec<TagResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagResult {
    pub name: String,
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(default)]
    pub images: Vec<TagImage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagImage {
    #[serde(default)]
    pub digest: Option<String>,
}

impl TagResult {
    /// Manifest-list digest when present, otherwise the first platform image digest
    pub fn content_digest(&self) -> Option<String> {
        self.digest
            .clone()
            .filter(|d| !d.is_empty())
            .or_else(|| self.images.iter().find_map(|i| i.digest.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct RepositoryInfo {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    full_description: Option<String>,
}

enum PageCursor {
    Start,
    Next(String),
    Done,
}

pub struct HubClientBuilder {
    hub_url: String,
    token: Option<String>,
    timeout: u64,
    page_size: u32,
    retry: RetryPolicy,
    logger: Logger,
}

impl HubClientBuilder {
    pub fn new(hub_url: impl Into<String>) -> Self {
        Self {
            hub_url: hub_url.into(),
            token: None,
            timeout: 60,
            page_size: 100,
            retry: RetryPolicy::default(),
            logger: Logger::new(false),
        }
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, 100);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<HubClient> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout))
            .user_agent(concat!("docker-image-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MirrorError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let mut base = self.hub_url;
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)?;

        Ok(HubClient {
            client,
            base,
            token: self.token,
            page_size: self.page_size,
            retry: self.retry,
            logger: self.logger,
        })
    }
}

pub struct HubClient {
    client: Client,
    base: Url,
    token: Option<String>,
    page_size: u32,
    retry: RetryPolicy,
    logger: Logger,
}

impl HubClient {
    pub fn builder(hub_url: impl Into<String>) -> HubClientBuilder {
        HubClientBuilder::new(hub_url)
    }

    fn repository_url(&self, repository: &dyn Repository) -> Result<Url> {
        Ok(self.base.join(&format!(
            "v2/repositories/{}/{}/",
            repository.namespace(),
            repository.name()
        ))?)
    }

    fn tags_url(&self, repository: &dyn Repository) -> Result<Url> {
        let mut url = self.repository_url(repository)?.join("tags")?;
        url.query_pairs_mut()
            .append_pair("page_size", &self.page_size.to_string());
        Ok(url)
    }

    fn tag_url(&self, repository: &dyn Repository, tag: &str) -> Result<Url> {
        Ok(self.repository_url(repository)?.join(&format!("tags/{}", tag))?)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET a JSON document; `Ok(None)` on 404
    async fn get_json<T: DeserializeOwned>(&self, url: Url, operation: &str) -> Result<Option<T>> {
        self.logger.debug(&format!("GET {}", url));

        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, operation))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_registry_error(status, &error_text, operation));
        }

        let body = response
            .text()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, operation))?;
        let value = serde_json::from_str(&body)
            .map_err(|e| MirrorError::Parse(format!("Failed to parse {} response: {}", operation, e)))?;
        Ok(Some(value))
    }

    async fn get_json_with_retry<T: DeserializeOwned>(&self, url: Url, operation: &str) -> Result<Option<T>> {
        self.retry
            .run(&self.logger, operation, MirrorError::is_transient, || {
                self.get_json(url.clone(), operation)
            })
            .await
            .map_err(|e| escalate(e, operation))
    }

    async fn fetch_tag_page(
        &self,
        repository: &dyn Repository,
        cursor: PageCursor,
    ) -> Result<Option<(Vec<String>, PageCursor)>> {
        let url = match cursor {
            PageCursor::Done => return Ok(None),
            PageCursor::Start => self.tags_url(repository)?,
            PageCursor::Next(next) => Url::parse(&next)?,
        };
        let operation = format!("tag listing for {}", repository.path());

        let page: Option<TagPage> = self.get_json_with_retry(url, &operation).await?;
        let Some(page) = page else {
            self.logger
                .verbose(&format!("Repository {} not found, no tags", repository.path()));
            return Ok(None);
        };

        if page.results.is_empty() {
            return Ok(None);
        }

        let names = page.results.into_iter().map(|t| t.name).collect();
        let next = page
            .next
            .filter(|n| !n.is_empty())
            .map_or(PageCursor::Done, PageCursor::Next);
        Ok(Some((names, next)))
    }

    async fn send_description(
        &self,
        method: Method,
        url: Url,
        body: serde_json::Value,
        operation: &str,
    ) -> Result<StatusCode> {
        self.retry
            .run(&self.logger, operation, MirrorError::is_transient, || {
                let request = self.request(method.clone(), url.clone()).json(&body);
                async move {
                    let response = request
                        .send()
                        .await
                        .map_err(|e| NetworkErrorHandler::handle_network_error(&e, operation))?;
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        return Err(HttpErrorHandler::handle_registry_error(status, &error_text, operation));
                    }
                    Ok(status)
                }
            })
            .await
            .map_err(|e| escalate(e, operation))
    }
}

/// Transient errors that survived the retry budget become `MetadataUnavailable`
fn escalate(err: MirrorError, operation: &str) -> MirrorError {
    if err.is_transient() {
        MirrorError::MetadataUnavailable(format!("{}: {}", operation, err))
    } else {
        err
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[async_trait]
impl RegistryMetadata for HubClient {
    fn list_tags<'a>(&'a self, repository: &'a dyn Repository) -> BoxStream<'a, Result<String>> {
        stream::try_unfold(PageCursor::Start, move |cursor| async move {
            self.fetch_tag_page(repository, cursor).await
        })
        .map_ok(|names: Vec<String>| stream::iter(names.into_iter().map(Ok::<String, MirrorError>)))
        .try_flatten()
        .boxed()
    }

    async fn get_digest(&self, repository: &dyn Repository, tag: &str) -> Result<Option<String>> {
        let url = self.tag_url(repository, tag)?;
        let operation = format!("digest lookup for {}:{}", repository.path(), tag);
        let result: Option<TagResult> = self.get_json_with_retry(url, &operation).await?;
        Ok(result.and_then(|t| t.content_digest()))
    }

    async fn get_description(&self, repository: &dyn Repository) -> Result<Description> {
        let url = self.repository_url(repository)?;
        let operation = format!("description fetch for {}", repository.path());
        let info: Option<RepositoryInfo> = self.get_json_with_retry(url, &operation).await?;

        Ok(info
            .map(|i| {
                Description::new(
                    i.description.unwrap_or_default(),
                    i.full_description.unwrap_or_default(),
                )
            })
            .unwrap_or_default())
    }

    async fn set_description(
        &self,
        repository: &dyn Repository,
        description: &Description,
    ) -> Result<DescriptionUpdate> {
        let url = self.repository_url(repository)?;
        let operation = format!("description update for {}", repository.path());
        let body = json!({
            "description": truncate_chars(&description.short, SHORT_DESCRIPTION_LIMIT),
            "full_description": description.full,
        });

        let status = self.send_description(Method::PATCH, url, body, &operation).await?;
        Ok(match status.as_u16() {
            200..=299 => DescriptionUpdate::Updated,
            403 | 404 => DescriptionUpdate::Forbidden,
            code => DescriptionUpdate::Failed(code),
        })
    }

    async fn create_repository(&self, repository: &dyn Repository, description: &Description) -> Result<()> {
        let url = self.base.join("v2/repositories/")?;
        let operation = format!("repository creation for {}", repository.path());
        let body = json!({
            "namespace": repository.namespace(),
            "name": repository.name(),
            "description": truncate_chars(&description.short, SHORT_DESCRIPTION_LIMIT),
            "full_description": description.full,
            "is_private": false,
        });

        let status = self.send_description(Method::POST, url, body, &operation).await?;
        if status.is_success() {
            self.logger
                .success(&format!("Created repository {}", repository.path()));
            Ok(())
        } else {
            Err(HttpErrorHandler::handle_registry_error(status, "", &operation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::RepositoryRef;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer each connection with the next canned `(status, body)` and record request paths
    fn serve(listener: TcpListener, responses: Vec<(u16, String)>) -> Arc<Mutex<Vec<String>>> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head);
                let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                seen.lock().unwrap().push(path);

                let response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        requests
    }

    async fn local_hub() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}/", listener.local_addr().unwrap());
        (listener, base)
    }

    fn local_client(base: &str) -> HubClient {
        HubClient::builder(base)
            .with_retry(RetryPolicy::new(2, Duration::ZERO))
            .with_timeout(5)
            .with_logger(Logger::new_quiet())
            .build()
            .unwrap()
    }

    fn tag_page(next: Option<String>, names: &[&str]) -> String {
        let results: Vec<_> = names.iter().map(|n| json!({ "name": n })).collect();
        json!({ "next": next, "results": results }).to_string()
    }

    fn client() -> HubClient {
        HubClient::builder("https://hub.example.test")
            .with_page_size(50)
            .with_logger(Logger::new_quiet())
            .build()
            .unwrap()
    }

    #[test]
    fn urls_follow_hub_layout() {
        let client = client();
        let repo = RepositoryRef::new("library", "redis");
        assert_eq!(
            client.tags_url(&repo).unwrap().as_str(),
            "https://hub.example.test/v2/repositories/library/redis/tags?page_size=50"
        );
        assert_eq!(
            client.tag_url(&repo, "7.2").unwrap().as_str(),
            "https://hub.example.test/v2/repositories/library/redis/tags/7.2"
        );
        assert_eq!(
            client.repository_url(&repo.target("me")).unwrap().as_str(),
            "https://hub.example.test/v2/repositories/me/library_redis/"
        );
    }

    #[test]
    fn tag_page_parsing() {
        let body = r#"{
            "count": 3,
            "next": "https://hub.example.test/v2/repositories/library/redis/tags?page=2&page_size=2",
            "results": [
                {"name": "latest", "digest": "sha256:aaa", "images": []},
                {"name": "7.2", "images": [{"digest": "sha256:bbb"}]}
            ]
        }"#;
        let page: TagPage = serde_json::from_str(body).unwrap();
        assert!(page.next.is_some());
        assert_eq!(page.results[0].content_digest().as_deref(), Some("sha256:aaa"));
        assert_eq!(page.results[1].content_digest().as_deref(), Some("sha256:bbb"));

        let last: TagPage = serde_json::from_str(r#"{"next": null, "results": []}"#).unwrap();
        assert!(last.next.is_none());
        assert!(last.results.is_empty());
    }

    #[test]
    fn exhausted_transient_errors_escalate() {
        let err = escalate(MirrorError::Network("reset".into()), "tag listing");
        assert!(matches!(err, MirrorError::MetadataUnavailable(_)));
        let err = escalate(MirrorError::RateLimited("429".into()), "tag listing");
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn tag_listing_follows_cursor_until_empty_page() {
        let (listener, base) = local_hub().await;
        let page = |n: u32| Some(format!("{}v2/repositories/library/redis/tags?page={}", base, n));
        let requests = serve(
            listener,
            vec![
                (200, tag_page(page(2), &["a", "b"])),
                (200, tag_page(page(3), &["c"])),
                (200, tag_page(page(4), &[])),
            ],
        );
        let client = local_client(&base);
        let repo = RepositoryRef::new("library", "redis");

        let tags: Vec<String> = client.list_tags(&repo).try_collect().await.unwrap();

        assert_eq!(tags, vec!["a", "b", "c"]);
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], "/v2/repositories/library/redis/tags?page_size=100");
        assert_eq!(requests[2], "/v2/repositories/library/redis/tags?page=3");
    }

    #[tokio::test]
    async fn missing_repository_lists_no_tags() {
        let (listener, base) = local_hub().await;
        serve(listener, vec![(404, r#"{"message": "object not found"}"#.to_string())]);
        let client = local_client(&base);
        let repo = RepositoryRef::new("me", "library_redis");

        let tags: Vec<String> = client.list_tags(&repo).try_collect().await.unwrap();

        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn server_errors_exhaust_retries_into_metadata_unavailable() {
        let (listener, base) = local_hub().await;
        let requests = serve(
            listener,
            vec![
                (503, "unavailable".to_string()),
                (503, "unavailable".to_string()),
            ],
        );
        let client = local_client(&base);
        let repo = RepositoryRef::new("library", "redis");

        let result: Result<Vec<String>> = client.list_tags(&repo).try_collect().await;

        assert!(matches!(result, Err(MirrorError::MetadataUnavailable(_))), "{:?}", result);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[test]
    fn short_description_is_capped() {
        let long = "x".repeat(150);
        assert_eq!(truncate_chars(&long, SHORT_DESCRIPTION_LIMIT).len(), 100);
    }
}
