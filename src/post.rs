//! In-memory post model.
//!
//! Pure data plus path helpers. Nothing here reads or writes the filesystem:
//! asset paths are composed from the owning collection's prefixes and the
//! stored filenames, whether or not the files exist.
//!
//! ## Filenames vs. paths
//!
//! Pictures and priority thumbnails store **basenames only**. Full
//! site-relative paths are derived from the collection every time they are
//! needed, which is what the codec writes to disk. A post moved to another
//! collection's directory therefore re-encodes with that collection's prefix.
//!
//! ## Tag ordering
//!
//! Tags are an ordered set. [`Post::normalize_tags`] drops duplicates (first
//! occurrence wins) and orders the rest by a site-wide [`TagPriority`] list.
//! Tags the list doesn't mention rank first, in the order they were written.

use crate::collection::{CollectionKind, CollectionRef};
use crate::naming::PostName;
use chrono::NaiveDate;
use std::collections::HashSet;

/// Crop focus used when nothing else is known, as a percentage.
pub const DEFAULT_THUMBNAIL_OFFSET: u8 = 50;

const EXCERPT_CHARS: usize = 500;

/// Site-wide tag ordering.
///
/// A tag's rank is `0` when absent from the list and `index + 1` otherwise,
/// so unlisted tags always sort ahead of listed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagPriority {
    tags: Vec<String>,
}

impl TagPriority {
    pub fn new(tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    pub fn rank(&self, tag: &str) -> usize {
        self.tags
            .iter()
            .position(|t| t == tag)
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    /// Deduplicate and order `tags`.
    pub fn apply(&self, tags: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut unique: Vec<String> = tags
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();
        // sort_by_key is stable: equal ranks keep first-occurrence order
        unique.sort_by_key(|t| self.rank(t));
        unique
    }
}

/// A picture attached to a picture post.
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub original_filename: String,
    pub thumbnail_filename: String,
    /// Crop focus, 0–100.
    pub thumbnail_offset: u8,
    pub label: Option<String>,
    collection: CollectionRef,
}

impl Picture {
    pub fn new(collection: CollectionRef) -> Self {
        Self {
            original_filename: String::new(),
            thumbnail_filename: String::new(),
            thumbnail_offset: DEFAULT_THUMBNAIL_OFFSET,
            label: None,
            collection,
        }
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn thumbnail_path(&self) -> String {
        format!(
            "{}/{}",
            self.collection.thumbnail_dir(),
            self.thumbnail_filename
        )
    }

    pub fn original_path(&self) -> String {
        format!("{}/{}", self.collection.asset_dir(), self.original_filename)
    }

    /// Label for listings. Unlabelled pictures show a placeholder.
    pub fn display_label(&self) -> &str {
        match self.label.as_deref() {
            Some(l) if !l.is_empty() => l,
            _ => "<no label>",
        }
    }
}

/// A post record: metadata, body text and (for picture collections) pictures.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub body: String,
    pub tags: Vec<String>,
    /// Basename of a thumbnail that overrides the first picture's.
    pub priority_thumbnail: Option<String>,
    pictures: Vec<Picture>,
    collection: CollectionRef,
}

impl Post {
    /// An empty post in `collection`, named by `name`.
    pub fn new(collection: CollectionRef, name: PostName) -> Self {
        Self {
            id: name.id,
            title: String::new(),
            date: name.date,
            body: String::new(),
            tags: Vec::new(),
            priority_thumbnail: None,
            pictures: Vec::new(),
            collection,
        }
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn is_picture_post(&self) -> bool {
        self.collection.kind() == CollectionKind::Pictures
    }

    pub fn pictures(&self) -> &[Picture] {
        &self.pictures
    }

    pub fn pictures_mut(&mut self) -> &mut [Picture] {
        &mut self.pictures
    }

    /// Append a picture scoped to this post's collection.
    ///
    /// Returns `None` for text posts, which never carry pictures.
    pub fn new_picture(&mut self) -> Option<&mut Picture> {
        if !self.is_picture_post() {
            return None;
        }
        self.pictures.push(Picture::new(self.collection.clone()));
        self.pictures.last_mut()
    }

    pub fn remove_picture(&mut self, index: usize) -> Option<Picture> {
        (index < self.pictures.len()).then(|| self.pictures.remove(index))
    }

    pub fn name(&self) -> PostName {
        PostName::new(self.date, self.id.clone())
    }

    pub fn internal_name(&self) -> String {
        self.name().internal_name()
    }

    pub fn filename(&self) -> String {
        self.name().filename()
    }

    pub fn priority_thumbnail_path(&self) -> Option<String> {
        self.priority_thumbnail
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| format!("{}/{}", self.collection.thumbnail_dir(), name))
    }

    pub fn normalize_tags(&mut self, priority: &TagPriority) {
        self.tags = priority.apply(&self.tags);
    }

    /// The tags as [`normalize_tags`](Self::normalize_tags) would leave them.
    pub fn normalized_tags(&self, priority: &TagPriority) -> Vec<String> {
        priority.apply(&self.tags)
    }

    /// First 500 characters of the body, for index listings.
    pub fn excerpt(&self) -> String {
        let mut chars = self.body.chars();
        let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}
