//! Client-side record of the images this session created in tev.
//!
//! tev is never queried about its state; this registry is what `push` uses to
//! find the layers of an image again. Keys are normalized image names.

use std::collections::BTreeMap;

use tev_core::Layer;

/// The layer set, resolution and channel layout an image was created with.
#[derive(Debug, Clone)]
pub struct RegisteredImage {
    pub width: usize,
    pub height: usize,
    /// Channel count of each layer at registration, in layer order.
    pub channels: Vec<usize>,
    pub layers: Vec<Layer>,
}

/// Registered images keyed by normalized name.
#[derive(Debug, Default)]
pub struct ImageRegistry {
    images: BTreeMap<String, RegisteredImage>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredImage> {
        self.images.get(name)
    }

    /// Stores `image` under `name`, replacing any previous entry wholesale.
    pub fn insert(&mut self, name: String, image: RegisteredImage) -> Option<RegisteredImage> {
        self.images.insert(name, image)
    }

    pub fn remove(&mut self, name: &str) -> Option<RegisteredImage> {
        self.images.remove(name)
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.images.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn clear(&mut self) {
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tev_core::FloatImage;

    use super::*;

    fn entry(channels: usize) -> RegisteredImage {
        RegisteredImage {
            width: 2,
            height: 2,
            channels: vec![channels],
            layers: vec![Layer::new("", Arc::new(FloatImage::new(2, 2, channels)))],
        }
    }

    #[test]
    fn test_insert_then_lookup() {
        let mut registry = ImageRegistry::new();
        assert!(registry.insert("a".to_string(), entry(1)).is_none());

        assert!(registry.contains("a"));
        assert_eq!(registry.get("a").map(|e| e.layers.len()), Some(1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_insert_replaces_previous_entry_wholesale() {
        let mut registry = ImageRegistry::new();
        registry.insert("a".to_string(), entry(1));

        let old = registry.insert("a".to_string(), entry(3));

        assert_eq!(old.map(|e| e.layers[0].source().num_channels()), Some(1));
        assert_eq!(registry.get("a").unwrap().layers[0].source().num_channels(), 3);
    }

    #[test]
    fn test_remove_missing_name_is_none() {
        let mut registry = ImageRegistry::new();
        assert!(registry.remove("nothing").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = ImageRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.insert(name.to_string(), entry(1));
        }

        let names: Vec<&str> = registry.names().collect();

        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }
}
