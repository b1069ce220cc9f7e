//! Post persistence: load, migrate, back up, and save post files.
//!
//! A site keeps each collection's posts in its own directory:
//!
//! ```text
//! site/
//! ├── _blog/
//! │   └── 2021-05-01-hello.md
//! └── _artwork/
//!     ├── 2019-03-02-sunset.md          # legacy schema
//!     └── 2019-03-02-sunset.md.bak      # left by the first load
//! ```
//!
//! ## Load
//!
//! The filename is checked before the file is opened; date and id come from
//! it, never from the front matter. The parent directory picks the
//! collection. After reading, the front matter is classified and, when stale,
//! the original bytes are copied to `<path>.bak` before any migration runs.
//! That copy is created exclusively: an existing backup always wins, so it
//! keeps the oldest content the store ever saw at that path.
//!
//! Loading never rewrites the source file. [`FileStore::upgrade`] does.
//!
//! ## Save
//!
//! Saves go through a temporary file in the target directory which is then
//! renamed over the destination, so readers see either the old or the new
//! document.

use crate::codec::{self, Codec, DecodeError, EncodeError};
use crate::collection::{CollectionRef, CollectionRegistry};
use crate::config::{self, ConfigError, SiteConfig};
use crate::detect::{self, Detection};
use crate::migrate::{self, MigrationError};
use crate::naming::{self, NamingError};
use crate::post::Post;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix appended to a post path to name its backup.
pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Naming(#[from] NamingError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("{0}")]
    Migration(#[from] MigrationError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("unknown collection directory: {0}")]
    UnknownCollection(String),
    #[error("collection directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("post file is not valid UTF-8: {}", .0.display())]
    NotUtf8(PathBuf),
}

/// What happened to the backup of a stale file during a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backup {
    /// This load wrote the backup.
    Created(PathBuf),
    /// A backup was already there and was left untouched.
    Kept(PathBuf),
}

impl Backup {
    pub fn path(&self) -> &Path {
        match self {
            Backup::Created(p) | Backup::Kept(p) => p,
        }
    }
}

/// A loaded post together with how it was found on disk.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub post: Post,
    pub path: PathBuf,
    pub detection: Detection,
    /// `None` for files already in the current schema.
    pub backup: Option<Backup>,
}

impl LoadReport {
    /// Whether the file on disk was written in an older schema.
    pub fn is_stale(&self) -> bool {
        !self.detection.version.is_current()
    }
}

/// Reads and writes posts under a site root.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    registry: CollectionRegistry,
    codec: Codec,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, registry: CollectionRegistry, codec: Codec) -> Self {
        Self {
            root: root.into(),
            registry,
            codec,
        }
    }

    /// Open a site, reading `postfmt.toml` from its root if present.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        let config = config::load_config(&root)?;
        Ok(Self::from_config(root, &config))
    }

    pub fn from_config(root: impl Into<PathBuf>, config: &SiteConfig) -> Self {
        Self::new(root, config.registry(), Codec::new(config.tag_priority()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Directory a collection's posts are saved into.
    pub fn collection_dir(&self, collection: &CollectionRef) -> PathBuf {
        self.root.join(collection.directory_name())
    }

    /// Load a post, migrating it in memory if it is stale.
    pub fn load(&self, path: &Path) -> Result<Post, StoreError> {
        self.load_report(path).map(|report| report.post)
    }

    /// Load a post and report its detected schema and backup.
    pub fn load_report(&self, path: &Path) -> Result<LoadReport, StoreError> {
        let name = naming::parse_post_path(path)?;
        let collection = self.collection_for(path)?;

        let bytes = fs::read(path)?;
        let text =
            std::str::from_utf8(&bytes).map_err(|_| StoreError::NotUtf8(path.to_path_buf()))?;
        // The backup keeps the raw bytes; parsing sees LF only.
        let text = codec::normalize_newlines(text);
        let (front_matter, body) = codec::split_front_matter(&text)?;

        let detection = detect::detect(front_matter);
        tracing::debug!(
            path = %path.display(),
            version = %detection.version,
            rule = detection.rule.unwrap_or("none"),
            "detected schema"
        );

        if detection.version.is_current() {
            let post = self
                .codec
                .decode_parts(front_matter, body, &collection, name)?;
            return Ok(LoadReport {
                post,
                path: path.to_path_buf(),
                detection,
                backup: None,
            });
        }

        let backup = write_backup(path, &bytes)?;
        let migrated = migrate::migrate_to_current(detection.version, front_matter)?;
        let post = self.codec.decode_parts(&migrated, body, &collection, name)?;

        Ok(LoadReport {
            post,
            path: path.to_path_buf(),
            detection,
            backup: Some(backup),
        })
    }

    /// Write a post to `<root>/_<collection>/<filename>`, replacing any
    /// existing file.
    pub fn save(&self, post: &Post) -> Result<PathBuf, StoreError> {
        let name = post.name();
        naming::validate(&name)?;

        let dir = self.collection_dir(post.collection());
        if !dir.is_dir() {
            return Err(StoreError::MissingDirectory(dir));
        }

        let text = self.codec.encode(post)?;
        let path = dir.join(name.filename());
        write_atomic(&dir, &path, &text)?;
        tracing::debug!(path = %path.display(), "saved post");
        Ok(path)
    }

    /// Load a post and, if it was stale, rewrite it in place in the current
    /// schema. Current files are left untouched.
    pub fn upgrade(&self, path: &Path) -> Result<LoadReport, StoreError> {
        let report = self.load_report(path)?;
        if report.is_stale() {
            let text = self.codec.encode(&report.post)?;
            write_atomic(&parent_dir(path)?, path, &text)?;
            tracing::info!(
                path = %path.display(),
                from = %report.detection.version,
                "upgraded post"
            );
        }
        Ok(report)
    }

    fn collection_for(&self, path: &Path) -> Result<CollectionRef, StoreError> {
        let dir = parent_dir(path)?;
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.registry
            .from_directory_name(&dir_name)
            .ok_or(StoreError::UnknownCollection(dir_name))
    }
}

/// `<path>.bak`, keeping the full original filename.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Directory containing `path`; the working directory for bare filenames.
fn parent_dir(path: &Path) -> io::Result<PathBuf> {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => Ok(p.to_path_buf()),
        _ => std::env::current_dir(),
    }
}

fn write_backup(path: &Path, bytes: &[u8]) -> Result<Backup, StoreError> {
    let backup = backup_path(path);
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&backup)
    {
        Ok(mut file) => {
            if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
                // A truncated backup would block every later attempt.
                drop(file);
                let _ = fs::remove_file(&backup);
                return Err(e.into());
            }
            tracing::info!(backup = %backup.display(), "wrote backup");
            Ok(Backup::Created(backup))
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::warn!(backup = %backup.display(), "backup already exists, keeping it");
            Ok(Backup::Kept(backup))
        }
        Err(e) => Err(e.into()),
    }
}

fn write_atomic(dir: &Path, path: &Path, text: &str) -> io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::SchemaVersion;
    use crate::naming::PostName;
    use crate::test_helpers::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    // =========================================================================
    // Load
    // =========================================================================

    #[test]
    fn load_current_post_writes_no_backup() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2023-01-09-ink-studies.md");

        let report = store.load_report(&path).unwrap();

        assert_eq!(report.detection.version, SchemaVersion::V3);
        assert!(report.backup.is_none());
        assert!(!backup_path(&path).exists());
        assert_eq!(report.post.id, "ink-studies");
        assert_eq!(report.post.collection().id(), "artwork");
    }

    #[test]
    fn load_stale_post_backs_up_original_bytes() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2019-03-02-sunset.md");
        let before = fs::read(&path).unwrap();

        let report = store.load_report(&path).unwrap();

        assert_eq!(report.detection.version, SchemaVersion::V1);
        let bak = backup_path(&path);
        assert_eq!(report.backup, Some(Backup::Created(bak.clone())));
        assert_eq!(fs::read(&bak).unwrap(), before);
        // Loading alone never touches the source.
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(count_backups(path.parent().unwrap()), 1);
    }

    #[test]
    fn second_load_keeps_existing_backup() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2020-06-14-harbour.md");
        let bak = backup_path(&path);
        fs::write(&bak, "older content").unwrap();

        let report = store.load_report(&path).unwrap();

        assert_eq!(report.backup, Some(Backup::Kept(bak.clone())));
        assert_eq!(fs::read_to_string(&bak).unwrap(), "older content");
    }

    #[test]
    fn repeated_loads_leave_one_backup() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2019-03-02-sunset.md");
        let before = fs::read(&path).unwrap();

        store.load(&path).unwrap();
        store.load(&path).unwrap();

        assert_eq!(count_backups(path.parent().unwrap()), 1);
        assert_eq!(fs::read(backup_path(&path)).unwrap(), before);
    }

    #[test]
    fn load_v1_fixture_migrates_pictures() {
        let (_tmp, store) = setup_store();
        let post = store
            .load(&post_path(&store, "_artwork", "2019-03-02-sunset.md"))
            .unwrap();

        assert_eq!(post.title, "Sunset over the estuary");
        assert_eq!(post.date, NaiveDate::from_ymd_opt(2019, 3, 2).unwrap());
        assert_eq!(post.priority_thumbnail.as_deref(), Some("sunset-cover.jpg"));
        // lowres comes first when both variants exist.
        let first = find_picture(&post, "Web size");
        assert_eq!(first.original_filename, "sunset-1-web.jpg");
        assert_eq!(first.thumbnail_filename, "sunset-1.jpg");
        assert_eq!(first.thumbnail_offset, 50);
        assert_eq!(post.pictures()[0], *first);
        assert_eq!(post.pictures()[1].original_filename, "sunset-2.jpg");
        assert_eq!(post.pictures().len(), 2);
    }

    #[test]
    fn load_v2_fixture_keeps_first_variant() {
        let (_tmp, store) = setup_store();
        let post = store
            .load(&post_path(&store, "_artwork", "2020-06-14-harbour.md"))
            .unwrap();

        assert_eq!(post.pictures().len(), 1);
        assert_eq!(post.pictures()[0].original_filename, "harbour.jpg");
        assert_eq!(post.pictures()[0].label.as_deref(), Some("Full size"));
        assert!(post.body.contains("Notes on the second sitting."));
    }

    #[test]
    fn load_text_post_has_no_pictures() {
        let (_tmp, store) = setup_store();
        let post = store
            .load(&post_path(&store, "_blog", "2021-05-01-hello-world.md"))
            .unwrap();
        assert!(!post.is_picture_post());
        assert_eq!(post.body, "First post.");
    }

    #[test]
    fn load_rejects_bad_filename_before_reading() {
        let (_tmp, store) = setup_store();
        // The file does not exist; a naming error proves nothing was read.
        let err = store
            .load(&store.root().join("_blog").join("not-a-post.txt"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Naming(NamingError::Pattern(_))));
    }

    #[test]
    fn load_rejects_unknown_collection() {
        let (tmp, store) = setup_store();
        let dir = tmp.path().join("_drafts");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("2020-01-01-x.md");
        fs::write(&path, "---\ntitle: x\n---\n").unwrap();

        let err = store.load(&path).unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(ref d) if d == "_drafts"));
    }

    #[test]
    fn load_requires_directory_marker() {
        let (tmp, store) = setup_store();
        let dir = tmp.path().join("artwork");
        fs::create_dir(&dir).unwrap();
        let path = dir.join("2020-01-01-x.md");
        fs::write(&path, "---\ntitle: x\nversion: 3\n---\n").unwrap();

        let err = store.load(&path).unwrap_err();
        assert!(matches!(err, StoreError::UnknownCollection(ref d) if d == "artwork"));
    }

    #[test]
    fn load_crlf_current_post() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_blog", "2020-01-01-windows.md");
        fs::write(&path, "---\r\ntitle: Windows\r\nversion: 3\r\n---\r\nBody\r\n").unwrap();

        let report = store.load_report(&path).unwrap();
        assert_eq!(report.post.title, "Windows");
        assert_eq!(report.post.body, "Body");
        assert!(report.backup.is_none());
    }

    #[test]
    fn load_crlf_stale_post_backs_up_raw_bytes() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2020-01-01-windows.md");
        let raw = concat!(
            "---\r\ntitle: Windows\r\npictures:\r\n",
            "- thumbnail: /x/thumbs/w.jpg\r\n  thumbpos: center\r\n",
            "  variants:\r\n  - file: /x/w.jpg\r\n---\r\nBody\r\n",
        );
        fs::write(&path, raw).unwrap();

        let report = store.load_report(&path).unwrap();
        assert_eq!(report.detection.version, SchemaVersion::V2);
        assert_eq!(report.post.pictures()[0].original_filename, "w.jpg");
        assert_eq!(report.post.body, "Body");
        assert_eq!(fs::read(backup_path(&path)).unwrap(), raw.as_bytes());
    }

    #[test]
    fn load_rejects_non_utf8() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_blog", "2020-01-01-binary.md");
        fs::write(&path, [0x2d, 0x2d, 0x2d, 0x0a, 0xff, 0xfe]).unwrap();
        assert!(matches!(store.load(&path), Err(StoreError::NotUtf8(_))));
    }

    #[test]
    fn failed_migration_still_leaves_backup() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2020-02-02-broken.md");
        fs::write(&path, "---\ntitle: x\npictures:\n- variants: []\n---\n").unwrap();

        let err = store.load(&path).unwrap_err();
        assert!(matches!(err, StoreError::Migration(_)));
        assert!(backup_path(&path).exists());
    }

    #[test]
    fn filename_wins_over_front_matter() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_blog", "2022-02-02-real-id.md");
        fs::write(&path, "---\ntitle: x\nversion: 3\nid: fake\ndate: 1999-01-01\n---\n").unwrap();

        let post = store.load(&path).unwrap();
        assert_eq!(post.id, "real-id");
        assert_eq!(post.date, NaiveDate::from_ymd_opt(2022, 2, 2).unwrap());
    }

    // =========================================================================
    // Save
    // =========================================================================

    #[test]
    fn save_writes_canonical_path() {
        let (_tmp, store) = setup_store();
        let blog = store.registry().get("blog").unwrap();
        let mut post = Post::new(
            blog,
            PostName::new(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(), "new-post"),
        );
        post.title = "New post".into();
        post.body = "Hello.".into();

        let path = store.save(&post).unwrap();

        assert_eq!(path, store.root().join("_blog").join("2024-04-01-new-post.md"));
        assert_eq!(store.load(&path).unwrap(), post);
    }

    #[test]
    fn save_overwrites_existing_file() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_blog", "2021-05-01-hello-world.md");
        let mut post = store.load(&path).unwrap();
        post.title = "Changed".into();

        store.save(&post).unwrap();

        assert_eq!(store.load(&path).unwrap().title, "Changed");
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn save_requires_collection_directory() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::from_config(tmp.path(), &SiteConfig::default());
        let post = Post::new(
            store.registry().get("artwork").unwrap(),
            PostName::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "x"),
        );

        let err = store.save(&post).unwrap_err();
        assert!(matches!(err, StoreError::MissingDirectory(ref d) if d.ends_with("_artwork")));
    }

    #[test]
    fn save_rejects_unloadable_id() {
        let (_tmp, store) = setup_store();
        let mut post = Post::new(
            store.registry().get("blog").unwrap(),
            PostName::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), "ok"),
        );
        post.id = "a/b".into();
        assert!(matches!(store.save(&post), Err(StoreError::Naming(_))));
    }

    #[test]
    fn saved_posts_with_lookalike_text_load_as_current() {
        let long_title = format!(
            "{} lowres: and maxres: both appear past the wrap column",
            "A rather long title that keeps going well beyond eighty columns,"
        );
        let cases = [
            ("Notes\n[draft] second pass", None),
            ("Export sizes: lowres: vs maxres: compared", Some("thumbnail: no")),
            ("variants: a title", Some("Two takes\nvariants: ink and wash")),
            ("[wip] harbour", Some("[wip]")),
            ("Line one\nmaxres: line two", Some("- lowres: a\n- maxres: b")),
            (long_title.as_str(), Some("{braced} label")),
            ("{braced} title", Some("")),
        ];

        let (_tmp, store) = setup_store();
        let artwork = store.registry().get("artwork").unwrap();
        for (i, (title, label)) in cases.into_iter().enumerate() {
            let date = NaiveDate::from_ymd_opt(2024, 5, 1 + i as u32).unwrap();
            let mut post = Post::new(artwork.clone(), PostName::new(date, "lookalike"));
            post.title = title.to_string();
            post.body = "Body.".into();
            let picture = post.new_picture().unwrap();
            picture.original_filename = "p.jpg".into();
            picture.thumbnail_filename = "p-t.jpg".into();
            picture.label = label.map(str::to_string);

            let path = store.save(&post).unwrap();
            let report = store.load_report(&path).unwrap();

            assert!(report.backup.is_none(), "{title:?} was read as stale");
            assert_eq!(report.detection.version, SchemaVersion::CURRENT, "{title:?}");
            assert_eq!(report.post, post, "{title:?}");
            assert!(!backup_path(&path).exists(), "{title:?}");
        }
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_blog", "2021-05-01-hello-world.md");
        let post = store.load(&path).unwrap();
        store.save(&post).unwrap();

        let names: Vec<String> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["2021-05-01-hello-world.md"]);
    }

    // =========================================================================
    // Upgrade
    // =========================================================================

    #[test]
    fn upgrade_rewrites_stale_file_in_current_schema() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2020-06-14-harbour.md");
        let before = fs::read(&path).unwrap();

        let report = store.upgrade(&path).unwrap();

        assert!(report.is_stale());
        let after = fs::read_to_string(&path).unwrap();
        let (front_matter, _) = codec::split_front_matter(&after).unwrap();
        assert!(detect::detect(front_matter).version.is_current());
        assert_eq!(fs::read(backup_path(&path)).unwrap(), before);
        assert_eq!(store.load(&path).unwrap(), report.post);
    }

    #[test]
    fn upgrade_leaves_current_file_untouched() {
        let (_tmp, store) = setup_store();
        let path = post_path(&store, "_artwork", "2023-01-09-ink-studies.md");
        let before = fs::read(&path).unwrap();

        let report = store.upgrade(&path).unwrap();

        assert!(!report.is_stale());
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn backup_path_appends_suffix() {
        assert_eq!(
            backup_path(Path::new("site/_blog/2020-01-01-x.md")),
            PathBuf::from("site/_blog/2020-01-01-x.md.bak")
        );
    }

    #[test]
    fn open_reads_site_config() {
        let (tmp, _) = setup_store();
        let store = FileStore::open(tmp.path()).unwrap();
        assert_eq!(store.codec().tag_priority().rank("featured"), 1);
    }
}
