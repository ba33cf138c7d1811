use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A cached storefront collection; the unit of partial refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionType {
    Products,
    Categories,
    Pages,
    Posts,
    Menus,
    SiteInfo,
}

impl CollectionType {
    pub const ALL: [CollectionType; 6] = [
        CollectionType::Products,
        CollectionType::Categories,
        CollectionType::Pages,
        CollectionType::Posts,
        CollectionType::Menus,
        CollectionType::SiteInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CollectionType::Products => "products",
            CollectionType::Categories => "categories",
            CollectionType::Pages => "pages",
            CollectionType::Posts => "posts",
            CollectionType::Menus => "menus",
            CollectionType::SiteInfo => "site-info",
        }
    }
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown collection type `{0}`")]
pub struct ParseCollectionError(pub String);

impl FromStr for CollectionType {
    type Err = ParseCollectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        CollectionType::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == value.trim())
            .ok_or_else(|| ParseCollectionError(value.to_string()))
    }
}

/// Target of a refresh request: everything, or one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTarget {
    All,
    Collection(CollectionType),
}

impl RefreshTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshTarget::All => "all",
            RefreshTarget::Collection(collection) => collection.as_str(),
        }
    }
}

impl FromStr for RefreshTarget {
    type Err = ParseCollectionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "all" => Ok(RefreshTarget::All),
            other => other.parse().map(RefreshTarget::Collection),
        }
    }
}

impl<'de> Deserialize<'de> for RefreshTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl Serialize for RefreshTarget {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
