//! Shared test utilities for the postfmt test suite.
//!
//! Sets up an isolated copy of the fixture site and offers lookups that panic
//! with a useful message on a miss.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let (_tmp, store) = setup_store();
//! let path = post_path(&store, "_artwork", "2019-03-02-sunset.md");
//! let post = store.load(&path).unwrap();
//! let picture = find_picture(&post, "Web size");
//! assert_eq!(picture.original_filename, "sunset-1-web.jpg");
//! ```
//!
//! The fixture site holds one post per legacy schema plus two current ones:
//!
//! ```text
//! fixtures/site/
//! ├── postfmt.toml
//! ├── _blog/2021-05-01-hello-world.md      (v3, text)
//! └── _artwork/
//!     ├── 2019-03-02-sunset.md             (v1)
//!     ├── 2020-06-14-harbour.md            (v2)
//!     └── 2023-01-09-ink-studies.md        (v3)
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::post::{Picture, Post};
use crate::store::{BACKUP_SUFFIX, FileStore};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/site/` to a temp directory and return it.
///
/// Loads of stale fixtures write backups, so every test needs its own copy.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_site(&fixtures, tmp.path()).unwrap();
    tmp
}

/// Fixture copy plus a store opened on it with the fixture's `postfmt.toml`.
pub fn setup_store() -> (TempDir, FileStore) {
    let tmp = setup_fixtures();
    let store = FileStore::open(tmp.path()).unwrap();
    (tmp, store)
}

/// Mirror a site tree (config file plus `_<collection>` folders) under `dst`.
fn copy_site(site: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(site)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_site(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

// =========================================================================
// Lookups (panic with a clear message on miss)
// =========================================================================

/// Path of a post file inside the store's root.
pub fn post_path(store: &FileStore, dir: &str, filename: &str) -> PathBuf {
    store.root().join(dir).join(filename)
}

/// Find a picture by label. Panics if not found.
pub fn find_picture<'a>(post: &'a Post, label: &str) -> &'a Picture {
    post.pictures()
        .iter()
        .find(|p| p.label.as_deref() == Some(label))
        .unwrap_or_else(|| {
            let labels: Vec<&str> = post.pictures().iter().map(|p| p.display_label()).collect();
            panic!("picture '{label}' not found in '{}'. Available: {labels:?}", post.id)
        })
}

/// Number of backup files directly inside `dir`.
pub fn count_backups(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .file_name()
                .to_string_lossy()
                .ends_with(BACKUP_SUFFIX)
        })
        .count()
}
