//! Front matter + body codec for current-schema post files.
//!
//! A post file is a YAML mapping fenced by `---` lines, followed by free text:
//!
//! ```text
//! ---
//! title: Harbour at dusk
//! version: 3
//! pictures:
//! - thumbnail: /assets/img/posts/artwork/thumbs/harbour.jpg
//!   thumbpos: 50
//!   original: /assets/img/posts/artwork/harbour.jpg
//!   label: Full size
//! prioritythumb: /assets/img/posts/artwork/thumbs/cover.jpg
//! tags:
//! - sea
//! ---
//! Body text, verbatim.
//! ```
//!
//! ## Paths on disk, basenames in memory
//!
//! The file stores full site-relative asset paths; the model stores basenames.
//! Encoding rebuilds every path from the post's collection, so the prefix on
//! disk always reflects the collection the post was last saved under.
//!
//! ## Body handling
//!
//! Only the first closing fence ends the front matter. Anything after it,
//! including further `---` lines, is body. Encoding appends one newline to
//! the body and decoding removes exactly one, so bodies survive round trips
//! unchanged.
//!
//! ## Line endings
//!
//! Files saved with CRLF line endings are read by folding every `\r\n` to
//! `\n` before splitting. Encoding always writes `\n`.
//!
//! This module only understands the current schema. Legacy files go through
//! [`crate::migrate`] first.

use crate::collection::CollectionRef;
use crate::detect::SchemaVersion;
use crate::naming::{PostName, basename};
use crate::post::{Picture, Post, TagPriority};
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use std::borrow::Cow;
use thiserror::Error;

const FENCE: &str = "---\n";
const CRLF_FENCE: &str = "---\r\n";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("missing front matter (expected '---' as the first line)")]
    MissingFrontMatter,
    #[error("unterminated front matter (missing closing '---' line)")]
    UnterminatedFrontMatter,
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("front matter must be a YAML mapping")]
    NotMapping,
    #[error("missing required key `{0}`")]
    MissingKey(&'static str),
    #[error("picture {index} is missing required key `{key}`")]
    MissingPictureKey { index: usize, key: &'static str },
    #[error("invalid value for `{key}`: {reason}")]
    InvalidValue {
        key: &'static str,
        reason: &'static str,
    },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("YAML serialization failed: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Serialize)]
struct FrontMatterWire {
    title: String,
    version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pictures: Option<Vec<PictureWire>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prioritythumb: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PictureWire {
    thumbnail: String,
    thumbpos: u8,
    original: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl From<&Picture> for PictureWire {
    fn from(picture: &Picture) -> Self {
        Self {
            thumbnail: picture.thumbnail_path(),
            thumbpos: picture.thumbnail_offset,
            original: picture.original_path(),
            label: picture.label.clone(),
        }
    }
}

/// Encodes and decodes post files against a site's tag ordering.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    tag_priority: TagPriority,
}

impl Codec {
    pub fn new(tag_priority: TagPriority) -> Self {
        Self { tag_priority }
    }

    pub fn tag_priority(&self) -> &TagPriority {
        &self.tag_priority
    }

    /// Serialize a post as a complete current-schema document.
    pub fn encode(&self, post: &Post) -> Result<String, EncodeError> {
        let wire = FrontMatterWire {
            title: post.title.clone(),
            version: SchemaVersion::CURRENT.number(),
            pictures: post
                .is_picture_post()
                .then(|| post.pictures().iter().map(PictureWire::from).collect()),
            prioritythumb: post.priority_thumbnail_path(),
            tags: post.normalized_tags(&self.tag_priority),
        };

        let yaml = serde_yaml::to_string(&wire)?;
        let front_matter = yaml.strip_suffix('\n').unwrap_or(&yaml);

        Ok(format!("{FENCE}{front_matter}\n{FENCE}{}\n", post.body))
    }

    /// Decode a current-schema document into a post named by `name`.
    pub fn decode(
        &self,
        text: &str,
        collection: &CollectionRef,
        name: PostName,
    ) -> Result<Post, DecodeError> {
        let text = normalize_newlines(text);
        let (front_matter, body) = split_front_matter(&text)?;
        self.decode_parts(front_matter, body, collection, name)
    }

    /// Decode front matter and body that were already split apart.
    ///
    /// The store uses this after migrating the front matter on its own.
    pub fn decode_parts(
        &self,
        front_matter: &str,
        body: &str,
        collection: &CollectionRef,
        name: PostName,
    ) -> Result<Post, DecodeError> {
        let doc = match serde_yaml::from_str::<Value>(front_matter)? {
            Value::Mapping(m) => m,
            _ => return Err(DecodeError::NotMapping),
        };

        let mut post = Post::new(collection.clone(), name);

        let title = doc.get("title").ok_or(DecodeError::MissingKey("title"))?;
        post.title = scalar_string(title, "title")?;
        post.body = body.strip_suffix('\n').unwrap_or(body).to_string();

        if let Some(version) = doc.get("version").and_then(Value::as_u64)
            && version > u64::from(SchemaVersion::CURRENT.number())
        {
            tracing::warn!(version, "front matter claims a newer schema than this build knows");
        }

        match doc.get("prioritythumb") {
            None | Some(Value::Null) => {}
            Some(v) => {
                let path = scalar_string(v, "prioritythumb")?;
                post.priority_thumbnail = Some(basename(&path).to_string());
            }
        }

        if let Some(tags) = doc.get("tags") {
            post.tags = string_list(tags, "tags")?;
            post.normalize_tags(&self.tag_priority);
        }

        if post.is_picture_post() {
            decode_pictures(&doc, &mut post)?;
        }

        Ok(post)
    }
}

/// Fold CRLF line endings to LF. Borrows when there is nothing to fold.
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if text.contains("\r\n") {
        Cow::Owned(text.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Split a post file into raw front matter and body.
///
/// The first line must be `---`. The front matter runs up to the next line
/// that is exactly `---`; everything after that line is returned verbatim.
/// Either fence may end in `\r\n`; callers that want LF-only parts fold the
/// text with [`normalize_newlines`] first.
pub fn split_front_matter(text: &str) -> Result<(&str, &str), DecodeError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let rest = text
        .strip_prefix(FENCE)
        .or_else(|| text.strip_prefix(CRLF_FENCE))
        .ok_or(DecodeError::MissingFrontMatter)?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\n', '\r']) == "---" {
            return Ok((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }

    Err(DecodeError::UnterminatedFrontMatter)
}

fn decode_pictures(doc: &Mapping, post: &mut Post) -> Result<(), DecodeError> {
    let entries = match doc.get("pictures") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Sequence(entries)) => entries,
        Some(_) => {
            return Err(DecodeError::InvalidValue {
                key: "pictures",
                reason: "expected a list",
            });
        }
    };

    for (index, entry) in entries.iter().enumerate() {
        let entry = entry.as_mapping().ok_or(DecodeError::InvalidValue {
            key: "pictures",
            reason: "expected a list of mappings",
        })?;
        let required = |key: &'static str| {
            entry
                .get(key)
                .ok_or(DecodeError::MissingPictureKey { index, key })
        };

        let original = scalar_string(required("original")?, "original")?;
        let thumbnail = scalar_string(required("thumbnail")?, "thumbnail")?;
        let offset = thumbnail_offset(required("thumbpos")?)?;
        let label = match entry.get("label") {
            None | Some(Value::Null) => None,
            Some(v) => Some(scalar_string(v, "label")?),
        };

        if let Some(picture) = post.new_picture() {
            picture.original_filename = basename(&original).to_string();
            picture.thumbnail_filename = basename(&thumbnail).to_string();
            picture.thumbnail_offset = offset;
            picture.label = label;
        }
    }
    Ok(())
}

/// Coerce `thumbpos` to a 0–100 integer.
///
/// Accepts integers, floats (truncated) and numeric strings.
fn thumbnail_offset(value: &Value) -> Result<u8, DecodeError> {
    const INVALID: DecodeError = DecodeError::InvalidValue {
        key: "thumbpos",
        reason: "expected an integer percentage between 0 and 100",
    };

    let as_float = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    let n = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(as_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(as_float))
        }
        _ => None,
    };

    n.and_then(|n| u8::try_from(n).ok())
        .filter(|n| *n <= 100)
        .ok_or(INVALID)
}

fn scalar_string(value: &Value, key: &'static str) -> Result<String, DecodeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(DecodeError::InvalidValue {
            key,
            reason: "expected text",
        }),
    }
}

fn string_list(value: &Value, key: &'static str) -> Result<Vec<String>, DecodeError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items.iter().map(|v| scalar_string(v, key)).collect(),
        scalar => Ok(vec![scalar_string(scalar, key)?]),
    }
}
