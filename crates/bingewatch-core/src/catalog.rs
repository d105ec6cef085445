//! Movie catalog client (TMDb REST API).
//!
//! Every request carries the static bearer token. Methods return
//! `FetchError` directly so they can be wrapped in an `AsyncResource`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;

/// One movie as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
}

impl Movie {
    /// Release year, if the release date is present.
    pub fn release_year(&self) -> Option<&str> {
        self.release_date
            .as_deref()
            .and_then(|date| date.get(..4))
            .filter(|year| year.chars().all(|c| c.is_ascii_digit()))
    }
}

/// One page of catalog results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieList {
    #[serde(default)]
    pub page: u32,
    pub results: Vec<Movie>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    status_message: Option<String>,
}

#[derive(Clone)]
pub struct MovieCatalog {
    http: reqwest::Client,
    base_url: String,
    image_base_url: String,
    token: String,
}

impl MovieCatalog {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        image_base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            image_base_url: image_base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Builds a catalog client from config.
    ///
    /// # Errors
    /// Fails when no API token is configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let token = config.catalog.effective_api_token().ok_or_else(|| {
            anyhow::anyhow!("catalog.api_token or BINGEWATCH_TMDB_TOKEN is required")
        })?;
        Ok(Self::new(
            config.http_client()?,
            config.catalog.effective_base_url(),
            config.catalog.image_base_url.clone(),
            token,
        ))
    }

    /// Movies sorted by popularity.
    pub async fn fetch_popular_movies(&self) -> Result<MovieList, FetchError> {
        self.get("discover/movie", &[("sort_by", "popularity.desc")])
            .await
    }

    /// Free-text search. A blank query falls back to the popular list.
    pub async fn search_movies(&self, query: &str) -> Result<MovieList, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return self.fetch_popular_movies().await;
        }
        self.get("search/movie", &[("query", query)]).await
    }

    /// Looks a movie up by id within the popular list.
    pub async fn find_movie(&self, id: u64) -> Result<Option<Movie>, FetchError> {
        let list = self.fetch_popular_movies().await?;
        Ok(list.results.into_iter().find(|movie| movie.id == id))
    }

    /// Full poster URL for a movie's `poster_path`.
    pub fn poster_url(&self, movie: &Movie) -> Option<String> {
        movie
            .poster_path
            .as_deref()
            .map(|path| format!("{}/{}", self.image_base_url, path.trim_start_matches('/')))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "catalog request");
        let response = self
            .http
            .get(&url)
            .query(query)
            .header("accept", "application/json")
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|err| err.status_message)
                .map(|message| format!(" ({message})"))
                .unwrap_or_default();
            return Err(FetchError::status(
                status,
                format!("Failed to fetch movies from API: {}{detail}", status.as_u16()),
            ));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn popular_body() -> serde_json::Value {
        serde_json::json!({
            "page": 1,
            "results": [
                {
                    "id": 12345,
                    "title": "Example Movie",
                    "overview": "This is a movie description.",
                    "release_date": "2024-01-01",
                    "poster_path": "/path/to/image.jpg",
                    "vote_average": 7.5
                },
                { "id": 678, "title": "Sparse Movie" }
            ],
            "total_pages": 100,
            "total_results": 1000
        })
    }

    fn catalog(server: &MockServer) -> MovieCatalog {
        MovieCatalog::new(
            reqwest::Client::new(),
            server.uri(),
            "https://image.tmdb.org/t/p/w500",
            "test-token",
        )
    }

    #[tokio::test]
    async fn test_fetch_popular_sends_bearer_and_sort() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .and(query_param("sort_by", "popularity.desc"))
            .and(header("authorization", "Bearer test-token"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(popular_body()))
            .expect(1)
            .mount(&server)
            .await;

        let list = catalog(&server).fetch_popular_movies().await.unwrap();
        assert_eq!(list.total_results, 1000);
        assert_eq!(list.results.len(), 2);
        assert_eq!(list.results[0].release_year(), Some("2024"));
        assert_eq!(list.results[1].overview, "");
        assert_eq!(list.results[1].poster_path, None);
    }

    #[tokio::test]
    async fn test_non_success_status_becomes_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status_code": 7,
                "status_message": "Invalid API key"
            })))
            .mount(&server)
            .await;

        let err = catalog(&server).fetch_popular_movies().await.unwrap_err();
        assert_eq!(
            err,
            FetchError::Status {
                status: 401,
                message: "Failed to fetch movies from API: 401 (Invalid API key)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = catalog(&server).fetch_popular_movies().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_search_sends_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/movie"))
            .and(query_param("query", "dune"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "page": 1,
                "results": [{ "id": 1, "title": "Dune" }],
                "total_pages": 1,
                "total_results": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let list = catalog(&server).search_movies("  dune ").await.unwrap();
        assert_eq!(list.results[0].title, "Dune");
    }

    #[tokio::test]
    async fn test_blank_search_falls_back_to_popular() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(popular_body()))
            .expect(1)
            .mount(&server)
            .await;

        let list = catalog(&server).search_movies("   ").await.unwrap();
        assert_eq!(list.results.len(), 2);
    }

    #[tokio::test]
    async fn test_find_movie_looks_up_popular_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/discover/movie"))
            .respond_with(ResponseTemplate::new(200).set_body_json(popular_body()))
            .mount(&server)
            .await;

        let catalog = catalog(&server);
        let movie = catalog.find_movie(12345).await.unwrap().unwrap();
        assert_eq!(movie.title, "Example Movie");
        assert_eq!(
            catalog.poster_url(&movie).as_deref(),
            Some("https://image.tmdb.org/t/p/w500/path/to/image.jpg")
        );
        assert_eq!(catalog.find_movie(1).await.unwrap(), None);
    }
}
