//! TMDB (The Movie Database) catalog client.
//!
//! TMDB requires an API key for access.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{CatalogMovie, CollectionRequest, ReviewRef, TrailerRef};
use super::youtube;
use super::{CatalogClient, CatalogClientError};

const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3";
const DEFAULT_IMAGE_BASE_URL: &str = "https://image.tmdb.org/t/p";
const DEFAULT_POSTER_SIZE: &str = "w342";

/// TMDB client configuration. This is the `[catalog]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbConfig {
    /// TMDB API key.
    #[serde(default)]
    pub api_key: String,
    /// Base URL (default: https://api.themoviedb.org/3).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Image base URL for posters/backdrops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base_url: Option<String>,
    /// Image size segment (default: w342).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_size: Option<String>,
    /// Per-request deadline in seconds (default: 10).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TmdbConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            image_base_url: None,
            poster_size: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    10
}

/// TMDB API client.
pub struct TmdbCatalogClient {
    client: Client,
    base_url: String,
    api_key: String,
    /// Image base joined with the size segment, e.g. `https://image.tmdb.org/t/p/w342`.
    image_prefix: String,
    timeout: Duration,
}

impl TmdbCatalogClient {
    /// Create a new TMDB client.
    pub fn new(config: &TmdbConfig) -> Result<Self, CatalogClientError> {
        if config.api_key.is_empty() {
            return Err(CatalogClientError::NotConfigured(
                "TMDB API key is required".to_string(),
            ));
        }

        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(timeout).build()?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let image_base_url = config
            .image_base_url
            .as_deref()
            .unwrap_or(DEFAULT_IMAGE_BASE_URL)
            .trim_end_matches('/');
        let poster_size = config.poster_size.as_deref().unwrap_or(DEFAULT_POSTER_SIZE);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            image_prefix: format!("{}/{}", image_base_url, poster_size),
            timeout,
        })
    }

    fn image_url(&self, path: &str) -> String {
        format!("{}{}", self.image_prefix, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, CatalogClientError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;

        response.json().await.map_err(|e| {
            CatalogClientError::ParseError(format!("Failed to parse {} response: {}", path, e))
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> CatalogClientError {
        if e.is_timeout() {
            CatalogClientError::Timeout(self.timeout)
        } else {
            CatalogClientError::HttpError(e)
        }
    }

    fn convert_movie(&self, r: TmdbMovieResult) -> CatalogMovie {
        CatalogMovie {
            id: r.id,
            title: r.title,
            original_title: r.original_title.unwrap_or_default(),
            poster_url: r
                .poster_path
                .map(|p| self.image_url(&p))
                .unwrap_or_default(),
            overview: r.overview.unwrap_or_default(),
            release_date: r.release_date.unwrap_or_default(),
            vote_average: r.vote_average.unwrap_or_default(),
            backdrop_url: r.backdrop_path.map(|p| self.image_url(&p)),
        }
    }
}

async fn check_status(response: Response) -> Result<Response, CatalogClientError> {
    let status = response.status();
    if status == 401 {
        return Err(CatalogClientError::NotConfigured(
            "Invalid TMDB API key".to_string(),
        ));
    }
    if status == 429 {
        return Err(CatalogClientError::RateLimitExceeded);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CatalogClientError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(response)
}

#[async_trait]
impl CatalogClient for TmdbCatalogClient {
    async fn fetch_collection(
        &self,
        request: &CollectionRequest,
    ) -> Result<Vec<CatalogMovie>, CatalogClientError> {
        debug!(
            "TMDB fetch collection: sort_key={}, language={}, page={}",
            request.sort_key, request.language, request.page
        );

        let page: TmdbPage<TmdbMovieResult> = self
            .get_json(
                &format!("/movie/{}", request.sort_key.as_str()),
                &[
                    ("language", request.language.clone()),
                    ("page", request.page.to_string()),
                ],
            )
            .await?;

        Ok(page
            .results
            .into_iter()
            .map(|r| self.convert_movie(r))
            .collect())
    }

    async fn fetch_trailers(&self, movie_id: i64) -> Result<Vec<TrailerRef>, CatalogClientError> {
        debug!("TMDB fetch trailers: id={}", movie_id);

        let page: TmdbPage<TmdbVideoResult> = self
            .get_json(&format!("/movie/{}/videos", movie_id), &[])
            .await?;

        Ok(page.results.into_iter().filter_map(TrailerRef::from_video).collect())
    }

    async fn fetch_reviews(&self, movie_id: i64) -> Result<Vec<ReviewRef>, CatalogClientError> {
        debug!("TMDB fetch reviews: id={}", movie_id);

        let page: TmdbPage<TmdbReviewResult> = self
            .get_json(&format!("/movie/{}/reviews", movie_id), &[])
            .await?;

        Ok(page
            .results
            .into_iter()
            .map(|r| ReviewRef {
                author: r.author.unwrap_or_default(),
                content: r.content,
            })
            .collect())
    }
}

// ============================================================================
// TMDB API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TmdbPage<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovieResult {
    id: i64,
    title: String,
    original_title: Option<String>,
    release_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TmdbVideoResult {
    key: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    site: String,
}

#[derive(Debug, Deserialize)]
struct TmdbReviewResult {
    author: Option<String>,
    content: String,
}

impl TrailerRef {
    /// Only YouTube videos can be played from a key alone.
    fn from_video(v: TmdbVideoResult) -> Option<Self> {
        if !v.site.eq_ignore_ascii_case("youtube") {
            return None;
        }
        Some(TrailerRef {
            name: v.name,
            url: youtube::watch_url(&v.key),
        })
    }
}
