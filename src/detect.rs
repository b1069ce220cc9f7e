//! Schema version detection for post front matter.
//!
//! Only the current schema writes a `version` field, so older files have to be
//! recognized by their shape. Detection runs on the raw front-matter text,
//! before any YAML parsing: V1 files are not valid YAML until their
//! indentation is normalized.
//!
//! ## Rules
//!
//! Rules are evaluated top to bottom and the first match wins. V1 rules come
//! first because V1 documents can also trip the V2 rules.
//!
//! | Rule | Version | Matches |
//! |------|---------|---------|
//! | `flow-collection` | V1 | a non-empty inline `[…]` or `{…}` value outside `tags` |
//! | `hardcoded-variants` | V1 | a `lowres:` or `maxres:` key |
//! | `variants-list` | V2 | a `variants:` key |
//! | `post-thumbnail` | V2 | a `thumbnail:` key at column 0 (post level) |
//!
//! Anything else is the current schema, as is any document carrying a
//! top-level `version:` key: no legacy schema ever wrote one.
//!
//! ## Structural view
//!
//! Rules never see scalar content. Before matching, the front matter is
//! reduced to its structure: the bodies of block scalars (`|`, `>`) are
//! dropped, quoted scalars are blanked out (including ones the emitter
//! wrapped across lines), and comments are cut. A title such as
//! `Export sizes: lowres: vs maxres:` or a multi-line label starting with
//! `variants:` therefore cannot look like a key.
//!
//! ## What counts as a flow collection
//!
//! V1 wrote pictures as one-line flow mappings and crop offsets as flow pairs
//! (`thumbpos: [center, 40]`). The current encoder never emits flow
//! collections except the empty `[]`, and it quotes any scalar that would
//! start with a bracket, so a bracket only counts when it opens a value:
//! after `key: ` or after a list dash. A title like `A [draft] study` does
//! not match.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Known front-matter schemas, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaVersion {
    /// Inline flow pictures with hardcoded `lowres`/`maxres` variants.
    V1 = 1,
    /// Block YAML with a `variants` list per picture.
    V2 = 2,
    /// Single original per picture, percentage crop offset, `version` field.
    V3 = 3,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion::V3;

    pub const fn number(self) -> u32 {
        self as u32
    }

    /// The version a migration from `self` produces. `None` for the current schema.
    pub const fn next(self) -> Option<SchemaVersion> {
        match self {
            SchemaVersion::V1 => Some(SchemaVersion::V2),
            SchemaVersion::V2 => Some(SchemaVersion::V3),
            SchemaVersion::V3 => None,
        }
    }

    pub fn is_current(self) -> bool {
        self == Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

/// Outcome of [`detect`]: the version and the rule that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub version: SchemaVersion,
    /// `None` when no legacy rule matched.
    pub rule: Option<&'static str>,
}

struct Rule {
    name: &'static str,
    version: SchemaVersion,
    matches: fn(&str) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        name: "flow-collection",
        version: SchemaVersion::V1,
        matches: has_flow_collection,
    },
    Rule {
        name: "hardcoded-variants",
        version: SchemaVersion::V1,
        matches: has_hardcoded_variants,
    },
    Rule {
        name: "variants-list",
        version: SchemaVersion::V2,
        matches: has_variants_list,
    },
    Rule {
        name: "post-thumbnail",
        version: SchemaVersion::V2,
        matches: has_post_thumbnail,
    },
];

/// Classify raw front-matter text.
pub fn detect(front_matter: &str) -> Detection {
    const CURRENT: Detection = Detection {
        version: SchemaVersion::CURRENT,
        rule: None,
    };

    let structure = structural_view(front_matter);
    if VERSION_KEY.is_match(&structure) {
        return CURRENT;
    }
    RULES
        .iter()
        .find(|rule| (rule.matches)(&structure))
        .map(|rule| Detection {
            version: rule.version,
            rule: Some(rule.name),
        })
        .unwrap_or(CURRENT)
}

/// Front matter with scalar content removed, line for line.
///
/// Block scalar bodies become empty lines, characters inside quoted scalars
/// become `_`, and comments are dropped. Keys, indicators and plain scalars
/// are kept as written.
fn structural_view(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    // Lines indented deeper than this belong to an open block scalar.
    let mut block_parent: Option<usize> = None;

    for line in text.lines() {
        if let Some(parent) = block_parent {
            if line.trim().is_empty() || indentation(line) > parent {
                out.push('\n');
                continue;
            }
            block_parent = None;
        }

        let masked = mask_scalars(line, &mut quote);
        if quote.is_none() {
            block_parent = block_scalar_parent(&masked);
        }
        out.push_str(&masked);
        out.push('\n');
    }
    out
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

/// Blank out quoted scalar content and cut comments.
///
/// `quote` carries an unterminated quote into the next line.
fn mask_scalars(line: &str, quote: &mut Option<char>) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    // Last non-space character emitted outside a quoted scalar.
    let mut prev: Option<char> = None;
    let mut after_space = true;

    while let Some(c) = chars.next() {
        match *quote {
            Some('"') => match c {
                '\\' => {
                    out.push('_');
                    if chars.next().is_some() {
                        out.push('_');
                    }
                }
                '"' => {
                    out.push(c);
                    *quote = None;
                    prev = Some(c);
                }
                _ => out.push('_'),
            },
            Some(_) => {
                if c == '\'' && chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push_str("__");
                } else if c == '\'' {
                    out.push(c);
                    *quote = None;
                    prev = Some(c);
                } else {
                    out.push('_');
                }
            }
            None => {
                if c == '#' && after_space {
                    break;
                }
                let opens = matches!(c, '"' | '\'')
                    && matches!(prev, None | Some(':' | ',' | '[' | '{' | '-' | '?'));
                if opens {
                    *quote = Some(c);
                }
                out.push(c);
                if !c.is_whitespace() {
                    prev = Some(c);
                }
                after_space = c.is_whitespace();
            }
        }
    }
    out
}

// `key: |-`, `- |`, `- key: >2` and the like.
static BLOCK_SCALAR_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( *)((?:- +)*)([^ ].*?:\s+)?[|>][-+1-9]{0,2}\s*$")
        .expect("block scalar header pattern is valid")
});

/// Indentation that the body of a block scalar opened on `line` must exceed.
fn block_scalar_parent(line: &str) -> Option<usize> {
    let caps = BLOCK_SCALAR_HEADER.captures(line)?;
    let spaces = caps[1].len();
    let dashes = &caps[2];
    let parent = if caps.get(3).is_some() {
        // Owned by the key, which starts after any list dashes.
        spaces + dashes.len()
    } else if !dashes.is_empty() {
        // Owned by the innermost list entry.
        spaces + dashes.trim_end().len() - 1
    } else {
        spaces
    };
    Some(parent)
}

// Value position: after a list dash or after `key:`. A bare opener at the
// start of a line is a wrapped plain scalar, not a value.
// Captures the opener and the first non-space character after it.
static FLOW_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\s+(?:[A-Za-z_][\w-]*\s*:\s+)?|[A-Za-z_][\w-]*\s*:\s+)([\[{])\s*(\S)")
        .expect("flow opener pattern is valid")
});

// Key position only: line start (after dashes) or inside a flow mapping.
static HARDCODED_VARIANT_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^\s*(?:-\s+)*|[{,]\s*)(?:lowres|maxres)\s*:(?:\s|$)")
        .expect("variant key pattern is valid")
});

static VARIANTS_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:-\s+)*variants\s*:(?:\s|$)").expect("variants key pattern is valid")
});

static POST_THUMBNAIL_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^thumbnail\s*:").expect("thumbnail key pattern is valid"));

static VERSION_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^version\s*:").expect("version key pattern is valid"));

fn has_flow_collection(text: &str) -> bool {
    let mut in_tags = false;
    for line in text.lines() {
        // A column-0 key starts a new top-level entry; track whether we're
        // inside the tags list, where brackets are expected.
        if line.chars().next().is_some_and(|c| !c.is_whitespace() && c != '-') {
            in_tags = line.starts_with("tags:");
        }
        if in_tags {
            continue;
        }
        if let Some(caps) = FLOW_OPENER.captures(line) {
            let opener = &caps[1];
            let first = &caps[2];
            let empty = (opener == "[" && first == "]") || (opener == "{" && first == "}");
            if !empty {
                return true;
            }
        }
    }
    false
}

fn has_hardcoded_variants(text: &str) -> bool {
    HARDCODED_VARIANT_KEY.is_match(text)
}

fn has_variants_list(text: &str) -> bool {
    VARIANTS_KEY.is_match(text)
}

fn has_post_thumbnail(text: &str) -> bool {
    POST_THUMBNAIL_KEY.is_match(text)
}
