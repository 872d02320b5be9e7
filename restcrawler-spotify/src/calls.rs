//! Spotify Web API calls.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use restcrawler::call::{Call, CallRequest, CallResponse, OutputSink};
use restcrawler::CallError;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Tracks returned per search page.
pub const PAGE_SIZE: usize = 50;

/// Endpoint and credentials shared by every call of a crawl.
pub struct SpotifyApi {
    base: String,
    token: String,
}

impl SpotifyApi {
    /// Creates an API handle. A trailing slash on `base` is ignored.
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            base,
            token: token.into(),
        }
    }

    fn get(&self, path_and_query: &str) -> Result<CallRequest, CallError> {
        CallRequest::get(&format!("{}{path_and_query}", self.base))?
            .accept_json()
            .with_bearer_token(&self.token)
    }
}

impl fmt::Debug for SpotifyApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyApi")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<TrackRef>,
}

#[derive(Debug, Deserialize)]
struct TrackRef {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct Track {
    uri: String,
    #[serde(default)]
    name: Option<String>,
}

/// Extracts the id from a `spotify:track:<id>` URI.
fn track_id(uri: &str) -> Option<&str> {
    uri.split(':').nth(2).filter(|id| !id.is_empty())
}

/// Fetches one page of track search results and emits a detail call for
/// every track found.
#[derive(Debug)]
pub struct SearchTracksCall {
    api: Arc<SpotifyApi>,
    page: usize,
}

impl SearchTracksCall {
    /// Creates the call for the zero-based search `page`.
    pub fn new(api: Arc<SpotifyApi>, page: usize) -> Self {
        Self { api, page }
    }
}

#[async_trait]
impl Call for SearchTracksCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        self.api.get(&format!(
            "/v1/search?q=p&type=track&market=US&limit={PAGE_SIZE}&offset={}",
            self.page * PAGE_SIZE
        ))
    }

    async fn handle_response(
        &self,
        response: CallResponse,
        sink: &OutputSink,
    ) -> Result<(), CallError> {
        response.ensure_authorized()?;
        if !response.is_success() {
            return Err(CallError::handler(format!(
                "search page {} returned {}",
                self.page,
                response.status()
            )));
        }

        let results: SearchResponse = response.json()?;
        let mut emitted = 0;
        for track in results.tracks.items {
            let Some(id) = track_id(&track.uri) else {
                warn!(uri = %track.uri, "skipping malformed track uri");
                continue;
            };
            sink.emit(TrackDetailCall::new(Arc::clone(&self.api), id))
                .await?;
            emitted += 1;
        }
        debug!(page = self.page, emitted, "handle response finished");
        Ok(())
    }
}

/// Fetches a single track and logs its URI.
#[derive(Debug)]
pub struct TrackDetailCall {
    api: Arc<SpotifyApi>,
    id: String,
}

impl TrackDetailCall {
    /// Creates the call for track `id`.
    pub fn new(api: Arc<SpotifyApi>, id: impl Into<String>) -> Self {
        Self {
            api,
            id: id.into(),
        }
    }
}

#[async_trait]
impl Call for TrackDetailCall {
    fn build_request(&self) -> Result<CallRequest, CallError> {
        self.api.get(&format!("/v1/tracks/{}", self.id))
    }

    async fn handle_response(
        &self,
        response: CallResponse,
        _sink: &OutputSink,
    ) -> Result<(), CallError> {
        response.ensure_authorized()?;
        if !response.is_success() {
            return Err(CallError::handler(format!(
                "track {} returned {}",
                self.id,
                response.status()
            )));
        }

        let track: Track = response.json()?;
        info!(
            uri = %track.uri,
            name = track.name.as_deref().unwrap_or_default(),
            "detail uri"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restcrawler::executor::{ExecutorConfig, HttpExecutor, ReqwestExecutor};
    use restcrawler::queue::queue;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(base: &str) -> Arc<SpotifyApi> {
        Arc::new(SpotifyApi::new(base, "secret-token"))
    }

    async fn fetch(call: &dyn Call) -> CallResponse {
        let request = call.build_request().unwrap();
        ReqwestExecutor::new(&ExecutorConfig::default())
            .unwrap()
            .execute(&request)
            .await
            .unwrap()
    }

    #[test]
    fn test_track_id() {
        assert_eq!(
            track_id("spotify:track:4uLU6hMCjMI75M1A2tKUQC"),
            Some("4uLU6hMCjMI75M1A2tKUQC")
        );
        assert_eq!(track_id("spotify:track"), None);
        assert_eq!(track_id("spotify:track:"), None);
    }

    #[test]
    fn test_search_request() {
        let call = SearchTracksCall::new(api("https://api.example.com/"), 3);
        let request = call.build_request().unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/v1/search?q=p&type=track&market=US&limit=50&offset=150"
        );
        let headers = request.headers();
        assert_eq!(headers.get("accept").unwrap().to_str().unwrap(), "application/json");
        assert_eq!(
            headers.get("authorization").unwrap().to_str().unwrap(),
            "Bearer secret-token"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let call = TrackDetailCall::new(api("https://api.example.com"), "abc");
        let rendered = format!("{call:?}");
        assert!(rendered.contains("abc"));
        assert!(!rendered.contains("secret-token"));
    }

    #[tokio::test]
    async fn test_search_emits_detail_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("offset", "0"))
            .and(header("authorization", "Bearer secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": {
                    "items": [
                        {"uri": "spotify:track:one"},
                        {"uri": "bogus"},
                        {"uri": "spotify:track:two"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        let call = SearchTracksCall::new(api(&server.uri()), 0);
        let response = fetch(&call).await;

        let (tx, mut rx) = queue(4);
        let sink = OutputSink::new(tx);
        call.handle_response(response, &sink).await.unwrap();

        assert_eq!(sink.emitted(), 2);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.build_request().unwrap().url().path().ends_with("/v1/tracks/one"));
        assert!(second.build_request().unwrap().url().path().ends_with("/v1/tracks/two"));
    }

    #[tokio::test]
    async fn test_unauthorized_search_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let call = SearchTracksCall::new(api(&server.uri()), 0);
        let response = fetch(&call).await;
        let err = call
            .handle_response(response, &OutputSink::terminal())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_detail_requires_uri() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tracks/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "no uri"})))
            .mount(&server)
            .await;

        let call = TrackDetailCall::new(api(&server.uri()), "abc");
        let response = fetch(&call).await;
        let err = call
            .handle_response(response, &OutputSink::terminal())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Body(_)));
    }
}
