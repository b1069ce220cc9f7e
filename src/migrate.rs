//! Forward migration of legacy front matter.
//!
//! Each schema boundary has exactly one step, a pure function from the raw
//! front-matter text at version N to the text at version N+1. Steps never
//! touch the filesystem; taking a backup before a rewrite is the store's job.
//!
//! ```text
//! V1 ──strip indentation, lowres/maxres → variants──▶ V2
//! V2 ──first variant → original, thumbpos = 50─────▶ V3 (current)
//! ```
//!
//! ## Step table
//!
//! [`MIGRATIONS`] is an array whose length is `CURRENT - 1`, so adding a
//! schema version without adding a step fails to compile, and a const check
//! below verifies that entry `i` migrates from version `i + 1`. Steps run
//! strictly in order; each consumes the previous step's full output.
//!
//! ## Lossy steps
//!
//! V2 → V3 keeps only the first variant of each picture and resets the crop
//! offset to 50%. The old two-axis pixel offsets have no percentage
//! equivalent, and the current schema has a single original per picture.

use crate::detect::SchemaVersion;
use crate::naming::basename;
use crate::post::DEFAULT_THUMBNAIL_OFFSET;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

/// Why a single step could not map its input forward.
#[derive(Error, Debug)]
pub enum MigrationFailure {
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("front matter is not a mapping")]
    NotMapping,
    #[error("missing key `{0}`")]
    MissingKey(&'static str),
    #[error("`{key}` should be {expected}")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
    },
}

/// A failed migration, with the text the pipeline was given.
#[derive(Error, Debug)]
#[error("cannot migrate front matter from {version}: {failure}")]
pub struct MigrationError {
    /// Version of the input to the step that failed.
    pub version: SchemaVersion,
    /// Front matter exactly as handed to [`migrate_to_current`].
    pub original: String,
    #[source]
    pub failure: MigrationFailure,
}

pub type MigrationFn = fn(&str) -> Result<String, MigrationFailure>;

pub struct Migration {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    apply: MigrationFn,
}

const STEP_COUNT: usize = SchemaVersion::CURRENT as usize - 1;

pub const MIGRATIONS: [Migration; STEP_COUNT] = [
    Migration {
        from: SchemaVersion::V1,
        to: SchemaVersion::V2,
        apply: v1_to_v2,
    },
    Migration {
        from: SchemaVersion::V2,
        to: SchemaVersion::V3,
        apply: v2_to_v3,
    },
];

const _: () = {
    let mut i = 0;
    while i < STEP_COUNT {
        assert!(MIGRATIONS[i].from as usize == i + 1);
        assert!(MIGRATIONS[i].to as usize == i + 2);
        i += 1;
    }
};

impl Migration {
    /// The step that upgrades `version`. `None` once current.
    pub fn for_version(version: SchemaVersion) -> Option<&'static Migration> {
        if version.is_current() {
            return None;
        }
        MIGRATIONS.get(version as usize - 1)
    }

    pub fn apply(&self, raw: &str) -> Result<String, MigrationFailure> {
        (self.apply)(raw)
    }
}

/// Run every step from `version` up to [`SchemaVersion::CURRENT`].
///
/// Current-version input is returned unchanged.
pub fn migrate_to_current(version: SchemaVersion, raw: &str) -> Result<String, MigrationError> {
    let mut text = raw.to_string();
    let mut version = version;
    while let Some(step) = Migration::for_version(version) {
        tracing::debug!(from = %step.from, to = %step.to, "migrating front matter");
        text = step.apply(&text).map_err(|failure| MigrationError {
            version,
            original: raw.to_string(),
            failure,
        })?;
        version = step.to;
    }
    Ok(text)
}

// =============================================================================
// V1 → V2
// =============================================================================

/// V1 picture fields holding a variant, in the order they become `variants`.
const HARDCODED_VARIANTS: [&str; 2] = ["lowres", "maxres"];

fn v1_to_v2(raw: &str) -> Result<String, MigrationFailure> {
    // V1 indentation is inconsistent; every entry is a one-line flow
    // collection, so flattening it is lossless.
    let flattened = raw.lines().map(str::trim_start).collect::<Vec<_>>().join("\n");
    let mut doc = parse_mapping(&flattened)?;

    for picture in pictures_mut(&mut doc)? {
        let mut variants = Vec::new();
        for key in HARDCODED_VARIANTS {
            match picture.remove(key) {
                None | Some(Value::Null) => {}
                Some(value) => variants.push(v1_variant(key, value)?),
            }
        }
        picture.insert("variants".into(), Value::Sequence(variants));

        if let Some(pos) = picture.get_mut("thumbpos") {
            *pos = v1_thumbpos(pos)?;
        }
    }

    to_yaml(doc)
}

/// A V1 variant is either `{file, label?}` or a bare path.
fn v1_variant(key: &'static str, value: Value) -> Result<Value, MigrationFailure> {
    let (file, label) = match value {
        Value::String(file) => (file, None),
        Value::Mapping(m) => {
            let file = m
                .get("file")
                .ok_or(MigrationFailure::MissingKey("file"))?
                .as_str()
                .ok_or(MigrationFailure::TypeMismatch {
                    key: "file",
                    expected: "a path",
                })?
                .to_string();
            let label = m.get("label").and_then(Value::as_str).map(String::from);
            (file, label)
        }
        _ => {
            return Err(MigrationFailure::TypeMismatch {
                key,
                expected: "a mapping or a path",
            });
        }
    };

    let mut variant = Mapping::new();
    variant.insert("file".into(), file.into());
    if let Some(label) = label {
        variant.insert("label".into(), label.into());
    }
    Ok(Value::Mapping(variant))
}

/// `[x, y]` → `"x y"`, numeric axes in pixels. Strings pass through.
fn v1_thumbpos(pos: &Value) -> Result<Value, MigrationFailure> {
    const EXPECTED: MigrationFailure = MigrationFailure::TypeMismatch {
        key: "thumbpos",
        expected: "a pair of offsets",
    };
    match pos {
        Value::String(_) => Ok(pos.clone()),
        Value::Sequence(axes) if axes.len() == 2 => {
            let axes = axes
                .iter()
                .map(|axis| match axis {
                    Value::String(s) => Ok(s.clone()),
                    Value::Number(n) => Ok(format!("{n}px")),
                    _ => Err(EXPECTED),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::String(axes.join(" ")))
        }
        _ => Err(EXPECTED),
    }
}

// =============================================================================
// V2 → V3
// =============================================================================

fn v2_to_v3(raw: &str) -> Result<String, MigrationFailure> {
    let mut doc = parse_mapping(raw)?;

    for picture in pictures_mut(&mut doc)? {
        let variants = match picture.remove("variants") {
            Some(Value::Sequence(v)) => v,
            Some(_) => {
                return Err(MigrationFailure::TypeMismatch {
                    key: "variants",
                    expected: "a list",
                });
            }
            None => return Err(MigrationFailure::MissingKey("variants")),
        };
        let first = variants
            .into_iter()
            .next()
            .ok_or(MigrationFailure::TypeMismatch {
                key: "variants",
                expected: "a non-empty list",
            })?;
        let first = match first {
            Value::Mapping(m) => m,
            _ => {
                return Err(MigrationFailure::TypeMismatch {
                    key: "variants",
                    expected: "a list of mappings",
                });
            }
        };
        let file = first
            .get("file")
            .ok_or(MigrationFailure::MissingKey("file"))?
            .as_str()
            .ok_or(MigrationFailure::TypeMismatch {
                key: "file",
                expected: "a path",
            })?;

        picture.insert(
            "thumbpos".into(),
            Value::Number(DEFAULT_THUMBNAIL_OFFSET.into()),
        );
        picture.insert("original".into(), basename(file).into());
        if let Some(label) = first.get("label").and_then(Value::as_str) {
            picture.insert("label".into(), label.into());
        }
    }

    if let Some(thumbnail) = doc.remove("thumbnail") {
        doc.insert("prioritythumb".into(), thumbnail);
    }
    doc.insert(
        "version".into(),
        Value::Number(SchemaVersion::V3.number().into()),
    );

    to_yaml(doc)
}

// =============================================================================
// Shared helpers
// =============================================================================

fn parse_mapping(text: &str) -> Result<Mapping, MigrationFailure> {
    match serde_yaml::from_str(text)? {
        Value::Mapping(m) => Ok(m),
        _ => Err(MigrationFailure::NotMapping),
    }
}

/// Picture mappings of a document. A document without pictures yields none.
fn pictures_mut(doc: &mut Mapping) -> Result<Vec<&mut Mapping>, MigrationFailure> {
    match doc.get_mut("pictures") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(pictures)) => pictures
            .iter_mut()
            .map(|p| {
                p.as_mapping_mut().ok_or(MigrationFailure::TypeMismatch {
                    key: "pictures",
                    expected: "a list of mappings",
                })
            })
            .collect(),
        Some(_) => Err(MigrationFailure::TypeMismatch {
            key: "pictures",
            expected: "a list",
        }),
    }
}

fn to_yaml(doc: Mapping) -> Result<String, MigrationFailure> {
    Ok(serde_yaml::to_string(&Value::Mapping(doc))?)
}
