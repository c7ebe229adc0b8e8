//! Types exchanged with the remote movie catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::Collection;

/// Remote listing a synced collection mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Popular,
    TopRated,
}

impl SortKey {
    pub const ALL: [SortKey; 2] = [SortKey::Popular, SortKey::TopRated];

    /// The collection a sync for this key replaces.
    pub fn collection(&self) -> Collection {
        match self {
            SortKey::Popular => Collection::Popular,
            SortKey::TopRated => Collection::TopRated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Popular => "popular",
            SortKey::TopRated => "top_rated",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "popular" => Ok(SortKey::Popular),
            "top_rated" => Ok(SortKey::TopRated),
            other => Err(format!("Unknown sort key: {}", other)),
        }
    }
}

/// One page request for a sorted listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    pub sort_key: SortKey,
    /// ISO 639-1 language with optional region (e.g. "en-US").
    pub language: String,
    /// 1-based page number.
    pub page: u32,
}

impl CollectionRequest {
    pub fn new(sort_key: SortKey) -> Self {
        Self {
            sort_key,
            language: "en-US".to_string(),
            page: 1,
        }
    }
}

/// A movie record as returned by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogMovie {
    pub id: i64,
    pub title: String,
    pub original_title: String,
    /// Absolute poster URL, empty when the catalog has none.
    pub poster_url: String,
    pub overview: String,
    pub release_date: String,
    pub vote_average: f64,
    /// Absolute backdrop URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_url: Option<String>,
}

/// A trailer reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrailerRef {
    pub name: String,
    /// Playable URL of the trailer.
    pub url: String,
}

/// A user review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRef {
    pub author: String,
    pub content: String,
}
