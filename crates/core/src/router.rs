//! Resource paths and the router that maps them onto storage.
//!
//! Recognized paths: `popular`, `top_rated`, `favorites`, `favorites/{id}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Collection;

/// Vendor prefix for directory content types.
const DIR_CONTENT_TYPE: &str = "vnd.moviecache.dir";
/// Vendor prefix for single-item content types.
const ITEM_CONTENT_TYPE: &str = "vnd.moviecache.item";

/// Router errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The path does not name a known resource. This is a caller bug.
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),
}

/// Identifier of a routable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourcePath {
    Popular,
    TopRated,
    Favorites,
    Favorite { movie_id: i64 },
}

impl ResourcePath {
    /// The path addressing a whole collection.
    pub fn collection(collection: Collection) -> Self {
        match collection {
            Collection::Popular => ResourcePath::Popular,
            Collection::TopRated => ResourcePath::TopRated,
            Collection::Favorites => ResourcePath::Favorites,
        }
    }

    /// Parse a path such as `favorites/550`. Leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        let trimmed = path.trim_matches('/');
        let unsupported = || RouteError::UnsupportedResource(path.to_string());

        let mut segments = trimmed.split('/');
        let head = segments.next().ok_or_else(unsupported)?;
        let tail = segments.next();
        if segments.next().is_some() {
            return Err(unsupported());
        }

        match (head, tail) {
            ("popular", None) => Ok(ResourcePath::Popular),
            ("top_rated", None) => Ok(ResourcePath::TopRated),
            ("favorites", None) => Ok(ResourcePath::Favorites),
            ("favorites", Some(id)) => id
                .parse::<i64>()
                .ok()
                .filter(|id| *id >= 0)
                .map(|movie_id| ResourcePath::Favorite { movie_id })
                .ok_or_else(unsupported),
            _ => Err(unsupported()),
        }
    }

    /// The collection this path lives in.
    pub fn collection_of(&self) -> Collection {
        route(self).collection
    }

    /// True if `event_path` concerns what a subscriber to `self` watches.
    ///
    /// A collection path covers the items inside it; an item path also
    /// covers collection-wide changes to its collection.
    pub fn covers(&self, event_path: &ResourcePath) -> bool {
        if self == event_path {
            return true;
        }
        if self.collection_of() != event_path.collection_of() {
            return false;
        }
        !route(self).single_item || !route(event_path).single_item
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourcePath::Popular => f.write_str("popular"),
            ResourcePath::TopRated => f.write_str("top_rated"),
            ResourcePath::Favorites => f.write_str("favorites"),
            ResourcePath::Favorite { movie_id } => write!(f, "favorites/{}", movie_id),
        }
    }
}

impl FromStr for ResourcePath {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Where a resource path lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub collection: Collection,
    pub single_item: bool,
    /// The movie id for single-item routes.
    pub movie_id: Option<i64>,
}

impl Route {
    /// Content-type tag, e.g. `vnd.moviecache.dir/popular`.
    pub fn content_type(&self) -> String {
        let prefix = if self.single_item {
            ITEM_CONTENT_TYPE
        } else {
            DIR_CONTENT_TYPE
        };
        format!("{}/{}", prefix, self.collection.table_name())
    }
}

/// Resolve a typed path. Exhaustive, so it cannot fail.
pub fn route(path: &ResourcePath) -> Route {
    match *path {
        ResourcePath::Popular => Route {
            collection: Collection::Popular,
            single_item: false,
            movie_id: None,
        },
        ResourcePath::TopRated => Route {
            collection: Collection::TopRated,
            single_item: false,
            movie_id: None,
        },
        ResourcePath::Favorites => Route {
            collection: Collection::Favorites,
            single_item: false,
            movie_id: None,
        },
        ResourcePath::Favorite { movie_id } => Route {
            collection: Collection::Favorites,
            single_item: true,
            movie_id: Some(movie_id),
        },
    }
}

/// Parse and resolve a raw path in one step.
pub fn resolve(path: &str) -> Result<Route, RouteError> {
    ResourcePath::parse(path).map(|p| route(&p))
}
