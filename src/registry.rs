//! Resource registration and URL-name dispatch.

use crate::error::ConfigError;
use crate::resource::Resource;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Make a name URL friendly: letters lowered, digits kept, any other
/// printable character becomes a dash.
pub fn slugify(name: &str) -> String {
    name.chars()
        .filter_map(|c| {
            if c.is_numeric() {
                Some(c)
            } else if c.is_alphabetic() {
                Some(c.to_ascii_lowercase())
            } else if c.is_control() {
                None
            } else {
                Some('-')
            }
        })
        .collect()
}

/// All registered resources, keyed by their URL path segment. Built at
/// startup and shared read-only with every request.
#[derive(Default)]
pub struct Registry {
    resources: BTreeMap<String, Arc<Resource>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, resource: Arc<Resource>) -> Result<(), ConfigError> {
        let slug = resource.path_name().to_string();
        if self.resources.contains_key(&slug) {
            return Err(ConfigError::DuplicateResource(slug));
        }
        self.resources.insert(slug, resource);
        Ok(())
    }

    pub fn get(&self, slug: &str) -> Option<&Arc<Resource>> {
        self.resources.get(slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<Resource>)> {
        self.resources.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Index payload mapping every resource name to its collection URL.
    pub fn index(&self) -> Json {
        let urls: BTreeMap<&str, String> = self
            .resources
            .keys()
            .map(|slug| (slug.as_str(), format!("/{}", slug)))
            .collect();
        json!(urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Relation};

    #[test]
    fn slugify_lowers_and_dashes() {
        assert_eq!(slugify("Ca CB"), "ca-cb");
        assert_eq!(slugify("CO_IN"), "co-in");
        assert_eq!(slugify("users2"), "users2");
        assert_eq!(slugify("tab\tle"), "table");
    }

    fn resource(name: &str) -> Arc<Resource> {
        let relation = Relation::build(name)
            .column(Column::integer("id"))
            .primary_key(["id"])
            .finish()
            .unwrap();
        Resource::build(relation).finish().unwrap()
    }

    #[test]
    fn duplicate_slugs_are_rejected() {
        let mut registry = Registry::new();
        registry.register(resource("users")).unwrap();
        let err = registry.register(resource("users")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateResource(_)));
    }

    #[test]
    fn index_lists_collection_urls() {
        let mut registry = Registry::new();
        registry.register(resource("users")).unwrap();
        registry.register(resource("events")).unwrap();
        assert_eq!(
            registry.index(),
            serde_json::json!({"events": "/events", "users": "/users"})
        );
    }
}
