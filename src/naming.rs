//! Post filename parsing for the `YYYY-MM-DD-<id>.md` convention.
//!
//! The filename is the only place a post's date and id are stored. The front
//! matter never repeats them, so a file that fails this pattern cannot be
//! loaded at all:
//!
//! - `2019-03-02-sunset.md` → date 2019-03-02, id `sunset`
//! - `2021-11-30-night-market.md` → date 2021-11-30, id `night-market`
//!   (everything after the third dash is the id, dashes included)
//! - `2020-1-1-x.md` → rejected, date components must be zero-padded
//! - `2020-02-30-x.md` → rejected, not a calendar date

use chrono::NaiveDate;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

static POST_FILENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})-([^/]+)\.md$").expect("post filename pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("not a post filename (expected YYYY-MM-DD-id.md): {0}")]
    Pattern(String),
    #[error("post filename has an invalid date: {0}")]
    InvalidDate(String),
}

/// Date and id parsed from a post filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostName {
    pub date: NaiveDate,
    /// Slug after the date, verbatim. May contain dashes.
    pub id: String,
}

impl PostName {
    pub fn new(date: NaiveDate, id: impl Into<String>) -> Self {
        Self {
            date,
            id: id.into(),
        }
    }

    /// `YYYY-MM-DD-<id>`, the filename without its extension.
    pub fn internal_name(&self) -> String {
        format!("{}-{}", self.date.format("%Y-%m-%d"), self.id)
    }

    /// Canonical filename, `YYYY-MM-DD-<id>.md`.
    pub fn filename(&self) -> String {
        format!("{}.md", self.internal_name())
    }
}

/// Parse a bare filename (no directory part).
pub fn parse_post_filename(filename: &str) -> Result<PostName, NamingError> {
    let caps = POST_FILENAME
        .captures(filename)
        .ok_or_else(|| NamingError::Pattern(filename.to_string()))?;

    // All three groups are ASCII digits of fixed width, so the parses only
    // fail on out-of-range values, which from_ymd_opt rejects anyway.
    let year: i32 = caps[1].parse().unwrap_or(0);
    let month: u32 = caps[2].parse().unwrap_or(0);
    let day: u32 = caps[3].parse().unwrap_or(0);

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| NamingError::InvalidDate(filename.to_string()))?;

    Ok(PostName {
        date,
        id: caps[4].to_string(),
    })
}

/// Parse the final component of a path.
pub fn parse_post_path(path: &Path) -> Result<PostName, NamingError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    parse_post_filename(&filename)
}

/// Last `/`-separated component of a site-relative asset path.
///
/// Front matter stores full asset paths; the model keeps basenames.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Check that a name would produce a loadable file.
///
/// Used before writing, so a post with an empty id or an id containing a path
/// separator is refused instead of being saved under a name it could never be
/// loaded back from.
pub fn validate(name: &PostName) -> Result<(), NamingError> {
    let filename = name.filename();
    parse_post_filename(&filename).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn simple_id() {
        let n = parse_post_filename("2019-03-02-sunset.md").unwrap();
        assert_eq!(n.date, date(2019, 3, 2));
        assert_eq!(n.id, "sunset");
    }

    #[test]
    fn id_keeps_its_dashes() {
        let n = parse_post_filename("2021-11-30-night-market.md").unwrap();
        assert_eq!(n.date, date(2021, 11, 30));
        assert_eq!(n.id, "night-market");
    }

    #[test]
    fn id_may_contain_dots() {
        let n = parse_post_filename("2021-11-30-v1.2-notes.md").unwrap();
        assert_eq!(n.id, "v1.2-notes");
    }

    #[test]
    fn rejects_non_post_name() {
        assert_eq!(
            parse_post_filename("not-a-post.txt"),
            Err(NamingError::Pattern("not-a-post.txt".into()))
        );
    }

    #[test]
    fn rejects_unpadded_date() {
        assert!(matches!(
            parse_post_filename("2020-1-1-x.md"),
            Err(NamingError::Pattern(_))
        ));
    }

    #[test]
    fn rejects_missing_id() {
        assert!(parse_post_filename("2020-01-01-.md").is_err());
        assert!(parse_post_filename("2020-01-01.md").is_err());
    }

    #[test]
    fn rejects_wrong_extension() {
        assert!(parse_post_filename("2020-01-01-x.markdown").is_err());
        assert!(parse_post_filename("2020-01-01-x.md.bak").is_err());
    }

    #[test]
    fn rejects_impossible_date() {
        assert_eq!(
            parse_post_filename("2020-02-30-x.md"),
            Err(NamingError::InvalidDate("2020-02-30-x.md".into()))
        );
        assert!(matches!(
            parse_post_filename("2020-13-01-x.md"),
            Err(NamingError::InvalidDate(_))
        ));
    }

    #[test]
    fn accepts_leap_day() {
        assert_eq!(
            parse_post_filename("2024-02-29-leap.md").unwrap().date,
            date(2024, 2, 29)
        );
    }

    #[test]
    fn parse_path_uses_last_component() {
        let n = parse_post_path(Path::new("site/_artwork/2019-03-02-sunset.md")).unwrap();
        assert_eq!(n.id, "sunset");
    }

    #[test]
    fn filename_is_zero_padded() {
        let n = PostName::new(date(2020, 1, 5), "hello");
        assert_eq!(n.internal_name(), "2020-01-05-hello");
        assert_eq!(n.filename(), "2020-01-05-hello.md");
    }

    #[test]
    fn filename_round_trips_through_parse() {
        let n = PostName::new(date(2018, 12, 31), "year-end");
        assert_eq!(parse_post_filename(&n.filename()).unwrap(), n);
    }

    #[test]
    fn basename_of_paths() {
        assert_eq!(basename("/assets/img/posts/artwork/a.jpg"), "a.jpg");
        assert_eq!(basename("a.jpg"), "a.jpg");
        assert_eq!(basename("dir/"), "");
    }

    #[test]
    fn validate_rejects_unloadable_ids() {
        assert!(validate(&PostName::new(date(2020, 1, 1), "")).is_err());
        assert!(validate(&PostName::new(date(2020, 1, 1), "a/b")).is_err());
        assert!(validate(&PostName::new(date(2020, 1, 1), "ok")).is_ok());
    }
}
