use crate::model::Movie;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const IMAGE_URL: &str = "https://image.tmdb.org/t/p/w500";

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("movie database request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

#[derive(Deserialize)]
struct SearchPage {
    results: Vec<SearchResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MovieDetails {
    pub title: String,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

impl MovieDetails {
    /// Builds the record to store for `owner_id`, or `None` if the release
    /// date carries no usable year.
    pub fn into_movie(self, owner_id: u64) -> Option<Movie> {
        let year = release_year(self.release_date.as_deref()?)?;
        Some(Movie {
            owner_id,
            title: self.title,
            year,
            description: self.overview.unwrap_or_default(),
            img_url: poster_url(self.poster_path.as_deref()),
        })
    }
}

/// `"2010-07-16"` -> `2010`
pub fn release_year(release_date: &str) -> Option<i32> {
    release_date.split('-').next()?.trim().parse().ok()
}

pub fn poster_url(poster_path: Option<&str>) -> String {
    match poster_path {
        Some(path) => format!("{}{}", IMAGE_URL, path),
        None => String::new(),
    }
}

#[async_trait]
pub trait MovieLookup: Send + Sync {
    async fn search(&self, title: &str) -> Result<Vec<SearchResult>, LookupError>;
    async fn details(&self, id: u64) -> Result<MovieDetails, LookupError>;
}

pub struct TmdbClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl TmdbClient {
    pub fn new(api_url: &str, api_key: &str, timeout: Duration) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(TmdbClient {
            http,
            api_url: api_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        })
    }
}

#[async_trait]
impl MovieLookup for TmdbClient {
    async fn search(&self, title: &str) -> Result<Vec<SearchResult>, LookupError> {
        let page: SearchPage = self
            .http
            .get(format!("{}/search/movie", self.api_url))
            .query(&[("api_key", self.api_key.as_str()), ("query", title)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page.results)
    }

    async fn details(&self, id: u64) -> Result<MovieDetails, LookupError> {
        let details: MovieDetails = self
            .http
            .get(format!("{}/movie/{}", self.api_url, id))
            .query(&[("api_key", self.api_key.as_str()), ("language", "en-US")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(details)
    }
}
