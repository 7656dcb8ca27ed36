//! JSON:API client for the content service.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::HashMap;
use url::Url;

use super::{ContentDetail, ContentGateway, Page};
use crate::config::ApiConfig;
use crate::db::{Bookmark, Content, Group, Progression};
use crate::retry::fetch_with_retry;
use crate::types::{ContentFilters, ContentType, SortOrder};
use crate::{Error, Result};

const JSON_API: &str = "application/vnd.api+json";

#[derive(Debug, Deserialize)]
struct Document<D> {
    data: D,
    #[serde(default)]
    included: Vec<Resource>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Value,
    #[serde(default)]
    relationships: HashMap<String, Relationship>,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    #[serde(default)]
    data: Linkage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Linkage {
    #[default]
    Empty,
    One(Identifier),
    Many(Vec<Identifier>),
}

#[derive(Debug, Deserialize)]
struct Identifier {
    id: String,
}

impl Linkage {
    fn ids(&self) -> Vec<&str> {
        match self {
            Linkage::Empty => Vec::new(),
            Linkage::One(one) => vec![one.id.as_str()],
            Linkage::Many(many) => many.iter().map(|i| i.id.as_str()).collect(),
        }
    }
}

impl Resource {
    fn related_ids(&self, name: &str) -> Vec<&str> {
        self.relationships
            .get(name)
            .map(|r| r.data.ids())
            .unwrap_or_default()
    }

    fn attributes<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.attributes.clone())?)
    }
}

#[derive(Debug, Deserialize)]
struct ContentAttributes {
    name: String,
    content_type: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    card_artwork_url: Option<String>,
    #[serde(default)]
    technology_triple_string: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    released_at: Option<String>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    video_identifier: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GroupAttributes {
    name: String,
    #[serde(default)]
    ordinal: i64,
}

#[derive(Debug, Deserialize)]
struct ProgressionAttributes {
    #[serde(default)]
    progress: i64,
    #[serde(default)]
    finished: bool,
}

#[derive(Debug, Deserialize)]
struct RenditionAttributes {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

fn content_from(resource: &Resource) -> Result<Content> {
    let attrs: ContentAttributes = resource.attributes()?;

    let technologies = attrs
        .technology_triple_string
        .as_deref()
        .map(|triple| {
            triple
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let released_at = attrs
        .released_at
        .as_deref()
        .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.timestamp())
        .unwrap_or(0);

    Ok(Content {
        id: resource.id.clone(),
        content_type: attrs.content_type,
        name: attrs.name,
        description: attrs.description,
        duration_secs: attrs.duration,
        card_artwork_url: attrs.card_artwork_url,
        technologies,
        difficulty: attrs.difficulty,
        released_at,
        popularity: attrs.popularity,
        video_id: attrs.video_identifier,
    })
}

/// Extract `page[number]` from a JSON:API `links.next` URL
fn next_page_number(next: Option<&str>) -> Option<u32> {
    let next = Url::parse(next?).ok()?;
    next.query_pairs()
        .find(|(key, _)| key == "page[number]")
        .and_then(|(_, value)| value.parse().ok())
}

fn page_query(page_number: u32, page_size: u32, filters: &ContentFilters) -> Vec<(String, String)> {
    let mut query = vec![
        ("page[number]".to_string(), page_number.max(1).to_string()),
        ("page[size]".to_string(), page_size.to_string()),
    ];

    let types: Vec<ContentType> = if filters.content_types.is_empty() {
        vec![ContentType::Screencast, ContentType::Collection]
    } else {
        filters.content_types.clone()
    };
    for content_type in types {
        query.push((
            "filter[content_types][]".to_string(),
            content_type.as_str().to_string(),
        ));
    }
    for tech in &filters.technologies {
        query.push(("filter[technologies][]".to_string(), tech.clone()));
    }
    for difficulty in &filters.difficulties {
        query.push(("filter[difficulties][]".to_string(), difficulty.clone()));
    }
    if let Some(search) = filters.search.as_deref().map(str::trim)
        && !search.is_empty()
    {
        query.push(("filter[q]".to_string(), search.to_string()));
    }
    if filters.bookmarked_only {
        query.push(("filter[bookmarked]".to_string(), "true".to_string()));
    }
    if filters.completed_only {
        query.push(("filter[completion_status]".to_string(), "completed".to_string()));
    } else if filters.in_progress_only {
        query.push(("filter[completion_status]".to_string(), "in_progress".to_string()));
    }

    let sort = match filters.sort {
        SortOrder::Newest => "-released_at",
        SortOrder::Popularity => "-popularity",
    };
    query.push(("sort".to_string(), sort.to_string()));
    query
}

/// [`ContentGateway`] over the JSON:API content service
pub struct HttpContentGateway {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpContentGateway {
    /// Create a gateway from API settings
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("offline-catalog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.config.base_url.join(path).map_err(|e| {
            Error::config(
                "api.base_url",
                format!("Failed to build URL for '{}': {}", path, e),
            )
        })
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url).header(ACCEPT, JSON_API);
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> Result<Vec<u8>> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T> {
        let body = Self::send(builder).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ContentGateway for HttpContentGateway {
    async fn fetch_page(
        &self,
        page_number: u32,
        page_size: u32,
        filters: &ContentFilters,
    ) -> Result<Page> {
        let url = self.endpoint("contents")?;
        let query = page_query(page_number, page_size, filters);

        let document: Document<Vec<Resource>> = fetch_with_retry(&self.config.retry, || {
            let builder = self.request(Method::GET, url.clone()).query(&query);
            Self::send_json(builder)
        })
        .await?;

        let items = document
            .data
            .iter()
            .map(content_from)
            .collect::<Result<Vec<_>>>()?;
        let next_page_number = next_page_number(document.links.next.as_deref());

        tracing::debug!(
            page = page_number,
            items = items.len(),
            next = ?next_page_number,
            "Fetched catalog page"
        );

        Ok(Page {
            items,
            next_page_number,
        })
    }

    async fn fetch_detail(&self, content_id: &str) -> Result<ContentDetail> {
        let url = self.endpoint(&format!("contents/{}", content_id))?;

        let document: Document<Resource> = fetch_with_retry(&self.config.retry, || {
            Self::send_json(self.request(Method::GET, url.clone()))
        })
        .await?;

        let content = content_from(&document.data)?;

        let included: HashMap<(&str, &str), &Resource> = document
            .included
            .iter()
            .map(|r| ((r.kind.as_str(), r.id.as_str()), r))
            .collect();

        let mut groups = Vec::new();
        for group_id in document.data.related_ids("groups") {
            let Some(resource) = included.get(&("groups", group_id)) else {
                continue;
            };
            let attrs: GroupAttributes = resource.attributes()?;

            let episodes = resource
                .related_ids("contents")
                .into_iter()
                .filter_map(|id| included.get(&("contents", id)))
                .map(|r| content_from(r))
                .collect::<Result<Vec<_>>>()?;

            groups.push(Group {
                id: resource.id.clone(),
                content_id: content.id.clone(),
                name: attrs.name,
                ordinal: attrs.ordinal,
                episodes,
            });
        }
        groups.sort_by_key(|g| g.ordinal);

        Ok(ContentDetail { content, groups })
    }

    async fn resolve_download_url(&self, video_id: i64) -> Result<Option<String>> {
        let url = self.endpoint(&format!("videos/{}/download", video_id))?;

        let document: Document<Vec<Resource>> =
            match Self::send_json(self.request(Method::GET, url)).await {
                Ok(document) => document,
                Err(Error::Api { status: 404, .. }) => return Ok(None),
                Err(e) => return Err(e),
            };

        let renditions = document
            .data
            .iter()
            .map(|r| r.attributes::<RenditionAttributes>())
            .collect::<Result<Vec<_>>>()?;

        let quality = self.config.download_quality.as_str();
        let preferred = renditions
            .iter()
            .find(|r| r.kind.as_deref() == Some(quality) && r.url.is_some())
            .or_else(|| renditions.iter().find(|r| r.url.is_some()));

        Ok(preferred.and_then(|r| r.url.clone()))
    }

    async fn create_bookmark(&self, content_id: &str) -> Result<Bookmark> {
        let url = self.endpoint("bookmarks")?;
        let body = json!({
            "data": {
                "type": "bookmarks",
                "relationships": {
                    "content": { "data": { "type": "contents", "id": content_id } }
                }
            }
        });

        let document: Document<Resource> =
            Self::send_json(self.request(Method::POST, url).json(&body)).await?;

        let content_id = document
            .data
            .related_ids("content")
            .first()
            .map(|id| id.to_string())
            .unwrap_or_else(|| content_id.to_string());

        Ok(Bookmark {
            id: document.data.id,
            content_id,
        })
    }

    async fn delete_bookmark(&self, bookmark_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("bookmarks/{}", bookmark_id))?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn update_progression(
        &self,
        content_id: &str,
        progress: i64,
        finished: bool,
    ) -> Result<Progression> {
        let url = self.endpoint("progressions")?;
        let body = json!({
            "data": {
                "type": "progressions",
                "attributes": { "progress": progress, "finished": finished },
                "relationships": {
                    "content": { "data": { "type": "contents", "id": content_id } }
                }
            }
        });

        let document: Document<Resource> =
            Self::send_json(self.request(Method::POST, url).json(&body)).await?;
        let attrs: ProgressionAttributes = document.data.attributes()?;

        Ok(Progression {
            id: document.data.id,
            content_id: content_id.to_string(),
            progress: attrs.progress,
            finished: attrs.finished,
        })
    }

    async fn delete_progression(&self, progression_id: &str) -> Result<()> {
        let url = self.endpoint(&format!("progressions/{}", progression_id))?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadQuality, RetryConfig};
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> HttpContentGateway {
        let config = ApiConfig {
            base_url: Url::parse(&format!("{}/api/", server.uri())).unwrap(),
            auth_token: Some("secret".to_string()),
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(10),
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..Default::default()
        };
        HttpContentGateway::new(config).unwrap()
    }

    fn content_json(id: &str, content_type: &str) -> Value {
        json!({
            "id": id,
            "type": "contents",
            "attributes": {
                "name": format!("Item {}", id),
                "content_type": content_type,
                "duration": 300,
                "technology_triple_string": "Swift 5, iOS 13, Xcode 11",
                "released_at": "2020-01-02T03:04:05Z",
                "video_identifier": 42
            }
        })
    }

    #[test]
    fn test_next_page_number_parsing() {
        assert_eq!(
            next_page_number(Some(
                "https://api.example.com/api/contents?page%5Bnumber%5D=3&page%5Bsize%5D=20"
            )),
            Some(3)
        );
        assert_eq!(next_page_number(None), None);
        assert_eq!(next_page_number(Some("not a url")), None);
    }

    #[test]
    fn test_page_zero_maps_to_first_api_page() {
        let query = page_query(0, 20, &ContentFilters::default());
        assert!(query.contains(&("page[number]".to_string(), "1".to_string())));
        assert!(query.contains(&("sort".to_string(), "-released_at".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_page_parses_items_and_next() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contents"))
            .and(query_param("page[number]", "1"))
            .and(query_param("page[size]", "10"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [content_json("1", "screencast"), content_json("2", "collection")],
                "links": { "next": format!("{}/api/contents?page[number]=2", server.uri()) }
            })))
            .mount(&server)
            .await;

        let page = gateway(&server)
            .fetch_page(0, 10, &ContentFilters::default())
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page_number, Some(2));
        assert_eq!(page.items[0].technologies, vec!["Swift 5", "iOS 13", "Xcode 11"]);
        assert_eq!(page.items[0].released_at, 1_577_934_245);
        assert_eq!(page.items[1].content_type, "collection");
    }

    #[tokio::test]
    async fn test_fetch_page_last_page_has_no_next() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let page = gateway(&server)
            .fetch_page(2, 10, &ContentFilters::default())
            .await
            .unwrap();

        assert!(page.items.is_empty());
        assert_eq!(page.next_page_number, None);
    }

    #[tokio::test]
    async fn test_fetch_page_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/contents"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = gateway(&server)
            .fetch_page(0, 10, &ContentFilters::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_detail_builds_groups_in_order() {
        let server = MockServer::start().await;
        let mut collection = content_json("col", "collection");
        collection["relationships"] = json!({
            "groups": { "data": [{ "id": "g2", "type": "groups" }, { "id": "g1", "type": "groups" }] }
        });

        Mock::given(method("GET"))
            .and(path("/api/contents/col"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": collection,
                "included": [
                    {
                        "id": "g1", "type": "groups",
                        "attributes": { "name": "Intro", "ordinal": 1 },
                        "relationships": { "contents": { "data": [
                            { "id": "ep1", "type": "contents" },
                            { "id": "ep2", "type": "contents" }
                        ] } }
                    },
                    {
                        "id": "g2", "type": "groups",
                        "attributes": { "name": "Deep dive", "ordinal": 2 },
                        "relationships": { "contents": { "data": [{ "id": "ep3", "type": "contents" }] } }
                    },
                    content_json("ep1", "episode"),
                    content_json("ep2", "episode"),
                    content_json("ep3", "episode")
                ]
            })))
            .mount(&server)
            .await;

        let detail = gateway(&server).fetch_detail("col").await.unwrap();

        assert!(detail.has_episodes());
        assert_eq!(detail.groups[0].id, "g1");
        assert_eq!(detail.groups[0].content_id, "col");
        let ids: Vec<&str> = detail.episodes().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ep1", "ep2", "ep3"]);
    }

    #[tokio::test]
    async fn test_resolve_download_url_prefers_configured_quality() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/videos/42/download"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "a", "type": "attachments", "attributes": { "kind": "hd", "url": "https://cdn/hd.mp4" } },
                    { "id": "b", "type": "attachments", "attributes": { "kind": "sd", "url": "https://cdn/sd.mp4" } }
                ]
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        assert_eq!(gw.config.download_quality, DownloadQuality::Sd);
        let url = gw.resolve_download_url(42).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://cdn/sd.mp4"));
    }

    #[tokio::test]
    async fn test_resolve_download_url_missing_video() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/videos/7/download"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(gateway(&server).resolve_download_url(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bookmark_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/bookmarks"))
            .and(body_partial_json(json!({
                "data": { "relationships": { "content": { "data": { "id": "c1" } } } }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "data": {
                    "id": "b9", "type": "bookmarks",
                    "relationships": { "content": { "data": { "id": "c1", "type": "contents" } } }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/bookmarks/b9"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let bookmark = gw.create_bookmark("c1").await.unwrap();
        assert_eq!(bookmark.id, "b9");
        assert_eq!(bookmark.content_id, "c1");
        gw.delete_bookmark("b9").await.unwrap();
    }

    #[tokio::test]
    async fn test_progression_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/progressions"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid"))
            .expect(1)
            .mount(&server)
            .await;

        let err = gateway(&server)
            .update_progression("c1", 10, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 422, .. }));
    }
}
