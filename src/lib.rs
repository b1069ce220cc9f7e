//! # postfmt
//!
//! Reads and writes blog post files: markdown documents with a YAML
//! front-matter block, stored one directory per collection and named
//! `YYYY-MM-DD-<id>.md`. The front-matter schema has changed twice over the
//! life of the site; files in either older schema are recognized, backed up,
//! and migrated to the current one when loaded.
//!
//! # Load Path
//!
//! ```text
//! _artwork/2019-03-02-sunset.md
//!   │ naming     filename → date, id           (rejects before reading)
//!   │ store      parent dir → collection
//!   │ codec      split front matter / body
//!   │ detect     raw text → schema version     (rule table, first match)
//!   │ store      stale? copy bytes to .bak     (never overwritten)
//!   │ migrate    v1 → v2 → v3                  (one step per version)
//!   ▼ codec      v3 front matter → Post
//! ```
//!
//! Saving runs the codec in reverse and always writes the current schema.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`collection`] | The closed set of collections and their directory and asset paths |
//! | [`post`] | `Post` and `Picture` records, tag priority ordering |
//! | [`naming`] | `YYYY-MM-DD-<id>.md` filename convention parser |
//! | [`detect`] | Schema version detection on raw front-matter text |
//! | [`migrate`] | Ordered per-version migration steps up to the current schema |
//! | [`codec`] | Current-schema front-matter encoding and decoding |
//! | [`store`] | File loading with backup and migration, atomic saves, in-place upgrades |
//! | [`config`] | `postfmt.toml` loading, validation, and merging over stock defaults |
//! | [`output`] | CLI report formatting, text and JSON |
//!
//! # Design Decisions
//!
//! ## Detection Before Parsing
//!
//! The oldest schema is not valid YAML as written: its picture entries are
//! flow mappings at inconsistent indentation. Detection therefore works on
//! text, and the first migration step normalizes indentation before it parses
//! anything. Later steps work on parsed YAML values.
//!
//! ## Exhaustive Migration Table
//!
//! [`migrate::MIGRATIONS`] is a fixed-size array whose length is derived from
//! [`detect::SchemaVersion::CURRENT`]. Adding a schema version without a
//! migration into it does not build.
//!
//! ## Filename Is Authoritative
//!
//! A post's date and id exist only in its filename. Decoding ignores any
//! `date` or `id` keys in front matter, and saving derives the filename from
//! the post, so the two can never disagree on disk.
//!
//! ## Basenames In Memory, Paths On Disk
//!
//! Pictures store only filenames. Full asset paths are rebuilt from the
//! collection on every encode, so after `assets_root` changes the next save
//! of a post writes the new paths.

pub mod codec;
pub mod collection;
pub mod config;
pub mod detect;
pub mod migrate;
pub mod naming;
pub mod output;
pub mod post;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;
