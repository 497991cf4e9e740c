//! Model listing via the daemon's tags endpoint.

use indexmap::IndexSet;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{endpoint, normalize_base_url, TinypadConfig, TAGS_PATH};
use crate::dispatch::Dispatcher;
use crate::error::OllamaError;
use crate::DEFAULT_OLLAMA_URL;

/// Ordered set of model identifiers, in the order the daemon listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelList {
    names: IndexSet<String>,
}

impl ModelList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn first(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// An empty listing means "use the default identifier".
    pub fn or_default(self, default_model: &str) -> Self {
        if self.is_empty() {
            std::iter::once(default_model.to_string()).collect()
        } else {
            self
        }
    }
}

impl FromIterator<String> for ModelList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ModelList {
    type Item = &'a String;
    type IntoIter = indexmap::set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.names.iter()
    }
}

/// Response from the tags API.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Client for the daemon's model listing.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::with_url(DEFAULT_OLLAMA_URL)
    }

    pub fn with_url(base_url: impl AsRef<str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: normalize_base_url(base_url.as_ref()),
        }
    }

    pub fn from_config(config: &TinypadConfig) -> Result<Self, OllamaError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// List installed models. Any failure yields an empty list: the listing
    /// only feeds a picker, and callers fall back to a default model.
    pub async fn list_models(&self) -> ModelList {
        match self.fetch().await {
            Ok(models) => {
                debug!("Daemon lists {} models", models.len());
                models
            }
            Err(e) => {
                warn!("Error fetching models: {}", e);
                ModelList::new()
            }
        }
    }

    /// Load the listing on a background task and hand it to the foreground,
    /// substituting `default_model` for an empty result.
    pub fn spawn_load(&self, default_model: impl Into<String>, dispatcher: Dispatcher) -> JoinHandle<()> {
        let catalog = self.clone();
        let default_model = default_model.into();
        tokio::spawn(async move {
            let models = catalog.list_models().await.or_default(&default_model);
            dispatcher.models_loaded(models);
        })
    }

    /// Same as [`list_models`](Self::list_models) but reports the failure.
    pub async fn fetch(&self) -> Result<ModelList, OllamaError> {
        let url = endpoint(&self.base_url, TAGS_PATH);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_connect() {
                OllamaError::ServerNotRunning(self.base_url.clone())
            } else {
                OllamaError::Http(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(OllamaError::Api(format!(
                "listing models returned {}",
                response.status()
            )));
        }

        let body = response.bytes().await?;
        let tags: TagsResponse = serde_json::from_slice(&body)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve_tags(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_lists_names_in_order() {
        let server = serve_tags(ResponseTemplate::new(200).set_body_json(json!({
            "models": [
                { "name": "qwen2.5:7b", "size": 4683087332u64 },
                { "name": "llama3.2:latest", "digest": "a80c4f17acd5" },
                { "name": "qwen2.5:7b" },
                { "name": "mistral:7b" }
            ]
        })))
        .await;

        let models = ModelCatalog::with_url(server.uri()).list_models().await;
        let names: Vec<_> = models.iter().collect();
        assert_eq!(names, vec!["qwen2.5:7b", "llama3.2:latest", "mistral:7b"]);
        assert_eq!(models.first(), Some("qwen2.5:7b"));
    }

    #[tokio::test]
    async fn test_server_error_yields_empty() {
        let server = serve_tags(ResponseTemplate::new(500)).await;
        let catalog = ModelCatalog::with_url(server.uri());
        assert!(catalog.list_models().await.is_empty());
        assert!(matches!(catalog.fetch().await, Err(OllamaError::Api(_))));
    }

    #[tokio::test]
    async fn test_malformed_body_yields_empty() {
        let server =
            serve_tags(ResponseTemplate::new(200).set_body_string("<html>proxy</html>")).await;
        let catalog = ModelCatalog::with_url(server.uri());
        assert!(catalog.list_models().await.is_empty());
        assert!(matches!(catalog.fetch().await, Err(OllamaError::Json(_))));
    }

    #[tokio::test]
    async fn test_missing_models_key_is_empty() {
        let server = serve_tags(ResponseTemplate::new(200).set_body_json(json!({}))).await;
        let models = ModelCatalog::with_url(server.uri()).list_models().await;
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_yields_empty() {
        let catalog = ModelCatalog::with_url("http://127.0.0.1:9");
        assert!(catalog.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_load_falls_back_to_default() {
        let server = serve_tags(ResponseTemplate::new(500)).await;
        let (dispatcher, mut events) = crate::dispatch::channel();

        ModelCatalog::with_url(server.uri())
            .spawn_load("llama3.2", dispatcher)
            .await
            .unwrap();

        match events.try_recv() {
            Some(crate::dispatch::UiEvent::ModelsLoaded(models)) => {
                assert_eq!(models.iter().collect::<Vec<_>>(), vec!["llama3.2"]);
            }
            other => panic!("expected model list, got {:?}", other),
        }
    }

    #[test]
    fn test_or_default() {
        let empty = ModelList::new().or_default("llama3.2");
        assert_eq!(empty.iter().collect::<Vec<_>>(), vec!["llama3.2"]);

        let listed: ModelList = vec!["a".to_string(), "b".to_string()].into_iter().collect();
        let kept = listed.clone().or_default("llama3.2");
        assert_eq!(kept, listed);
        assert!(!kept.contains("llama3.2"));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "models": [{ "name": "m1" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let models = ModelCatalog::with_url(format!("{}/", server.uri()))
            .fetch()
            .await
            .unwrap();
        assert_eq!(models.first(), Some("m1"));
    }

    #[test]
    fn test_for_loop_over_listing() {
        let models: ModelList = ["b", "a", "b"].iter().map(|s| s.to_string()).collect();
        let mut seen = Vec::new();
        for name in &models {
            seen.push(name.as_str());
        }
        assert_eq!(seen, vec!["b", "a"]);
    }
}
