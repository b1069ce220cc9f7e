//! Collections: the closed set of content buckets a site knows about.
//!
//! A collection decides two things for every post it owns:
//!
//! - **Where the post file lives**: `_<id>/` under the site root.
//! - **Where its images live**: `<assets_root>/<id>/` for originals and
//!   `<assets_root>/<id>/thumbs/` for thumbnails.
//!
//! Whether a collection carries pictures is derived from its identity when the
//! registry is built: the configured text collection holds plain posts, every
//! other collection holds picture posts. Posts and pictures never store that
//! flag themselves; they ask their collection.
//!
//! Collections are immutable once registered and shared through
//! [`CollectionRef`], so a post and all of its pictures observe the same
//! collection without copying it.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, non-owning handle to a registered collection.
pub type CollectionRef = Arc<Collection>;

/// Prefix marking a collection's post directory (`_artwork/`).
pub const DIRECTORY_MARKER: char = '_';

/// What kind of posts a collection holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Plain text posts. Pictures are never attached.
    Text,
    /// Posts with an ordered list of attached pictures.
    Pictures,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    id: String,
    label: String,
    assets_root: String,
    kind: CollectionKind,
}

impl Collection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Name of the directory holding this collection's post files.
    pub fn directory_name(&self) -> String {
        format!("{}{}", DIRECTORY_MARKER, self.id)
    }

    /// Site-relative directory for full-size images, without trailing slash.
    pub fn asset_dir(&self) -> String {
        format!("{}/{}", self.assets_root.trim_end_matches('/'), self.id)
    }

    /// Site-relative directory for thumbnails, without trailing slash.
    pub fn thumbnail_dir(&self) -> String {
        format!("{}/thumbs", self.asset_dir())
    }
}

/// The fixed set of collections known at configuration time.
///
/// Lookups are by id. Iteration follows registration order so reports list
/// collections the way the config file does.
#[derive(Debug, Clone, Default)]
pub struct CollectionRegistry {
    order: Vec<String>,
    by_id: BTreeMap<String, CollectionRef>,
}

impl CollectionRegistry {
    /// Build a registry from `(id, label)` pairs.
    ///
    /// `text_collection` names the collection holding plain posts; pass `None`
    /// when every collection is a picture collection. Duplicate ids keep the
    /// first registration.
    pub fn new<'a>(
        collections: impl IntoIterator<Item = (&'a str, &'a str)>,
        assets_root: &str,
        text_collection: Option<&str>,
    ) -> Self {
        let mut registry = Self::default();
        for (id, label) in collections {
            if registry.by_id.contains_key(id) {
                continue;
            }
            let kind = if text_collection == Some(id) {
                CollectionKind::Text
            } else {
                CollectionKind::Pictures
            };
            registry.order.push(id.to_string());
            registry.by_id.insert(
                id.to_string(),
                Arc::new(Collection {
                    id: id.to_string(),
                    label: label.to_string(),
                    assets_root: assets_root.to_string(),
                    kind,
                }),
            );
        }
        registry
    }

    pub fn get(&self, id: &str) -> Option<CollectionRef> {
        self.by_id.get(id).cloned()
    }

    /// Resolve a post directory name (`_artwork`) to its collection.
    ///
    /// Exactly one leading marker is stripped. Names without the marker are
    /// not collection directories.
    pub fn from_directory_name(&self, dir_name: &str) -> Option<CollectionRef> {
        dir_name
            .strip_prefix(DIRECTORY_MARKER)
            .and_then(|id| self.get(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionRef> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
