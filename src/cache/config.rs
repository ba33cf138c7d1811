//! Cache configuration.
//!
//! Directory and per-collection TTLs, resolved from the `[cache]` section.

use std::path::PathBuf;

use crate::domain::CollectionType;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub directory: PathBuf,
    pub products_ttl_minutes: u32,
    pub categories_ttl_minutes: u32,
    pub pages_ttl_minutes: u32,
    pub posts_ttl_minutes: u32,
    pub menus_ttl_minutes: u32,
    pub site_info_ttl_minutes: u32,
    /// TTL for keys that are not a collection name, e.g. `product-42`.
    pub resource_ttl_minutes: u32,
}

impl CacheConfig {
    /// Defaults rooted at `directory`.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            products_ttl_minutes: 60,
            categories_ttl_minutes: 120,
            pages_ttl_minutes: 120,
            posts_ttl_minutes: 60,
            menus_ttl_minutes: 720,
            site_info_ttl_minutes: 1440,
            resource_ttl_minutes: 60,
        }
    }

    pub fn ttl_for(&self, collection: CollectionType) -> u32 {
        match collection {
            CollectionType::Products => self.products_ttl_minutes,
            CollectionType::Categories => self.categories_ttl_minutes,
            CollectionType::Pages => self.pages_ttl_minutes,
            CollectionType::Posts => self.posts_ttl_minutes,
            CollectionType::Menus => self.menus_ttl_minutes,
            CollectionType::SiteInfo => self.site_info_ttl_minutes,
        }
    }

    /// TTL for an arbitrary key: collection keys use their own TTL, single
    /// resources inherit the TTL of their owning collection.
    pub fn ttl_for_key(&self, key: &str) -> u32 {
        if let Ok(collection) = key.parse::<CollectionType>() {
            return self.ttl_for(collection);
        }
        if key.starts_with("product-") {
            return self.products_ttl_minutes;
        }
        self.resource_ttl_minutes
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            directory: settings.directory.clone(),
            products_ttl_minutes: settings.products_ttl_minutes.get(),
            categories_ttl_minutes: settings.categories_ttl_minutes.get(),
            pages_ttl_minutes: settings.pages_ttl_minutes.get(),
            posts_ttl_minutes: settings.posts_ttl_minutes.get(),
            menus_ttl_minutes: settings.menus_ttl_minutes.get(),
            site_info_ttl_minutes: settings.site_info_ttl_minutes.get(),
            resource_ttl_minutes: settings.products_ttl_minutes.get(),
        }
    }
}
