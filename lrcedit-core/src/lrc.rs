use crate::config::DocumentOptions;
use crate::error::{LrcError, Result};
use crate::flags::ErrorFlags;
use crate::timestamp::Timestamp;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// `leading [inner] trailing`, where leading holds no `[` and inner no `]`
#[allow(clippy::expect_used)]
static LINE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^\[]*)\[([^\]]*)\](.*)$").expect("line pattern is valid"));

#[allow(clippy::expect_used)]
static TIMESTAMP_SHAPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+:[0-9]+\.[0-9]+$").expect("timestamp shape pattern is valid")
});

#[allow(clippy::expect_used)]
static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9_-]*):(.*)$").expect("tag pattern is valid")
});

#[allow(clippy::expect_used)]
static TAG_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("tag name pattern is valid"));

/// The reserved LRC ID tags, in the order they are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TagKey {
    Artist,
    Album,
    Title,
    Author,
    Length,
    Offset,
    By,
    Re,
    Ve,
}

impl TagKey {
    pub const ALL: [Self; 9] = [
        Self::Artist,
        Self::Album,
        Self::Title,
        Self::Author,
        Self::Length,
        Self::Offset,
        Self::By,
        Self::Re,
        Self::Ve,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Artist => "ar",
            Self::Album => "al",
            Self::Title => "ti",
            Self::Author => "au",
            Self::Length => "length",
            Self::Offset => "offset",
            Self::By => "by",
            Self::Re => "re",
            Self::Ve => "ve",
        }
    }

    /// Look up a reserved tag, ignoring ASCII case
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value slot of a tag: one value, or every value seen in file order.
///
/// A `Multiple` slot always holds at least two values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValue {
    Single(String),
    Multiple(Vec<String>),
}

impl TagValue {
    /// The value that wins when the tag is written out
    #[must_use]
    pub fn last(&self) -> &str {
        match self {
            Self::Single(value) => value,
            Self::Multiple(values) => values.last().map_or("", String::as_str),
        }
    }

    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        }
    }

    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => {
                *self = Self::Multiple(vec![std::mem::take(first), value]);
            }
            Self::Multiple(values) => values.push(value),
        }
    }

    fn collapse(&mut self) {
        if let Self::Multiple(values) = self {
            let last = values.pop().unwrap_or_default();
            *self = Self::Single(last);
        }
    }
}

/// A single lyrics line with an optional timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsLine {
    pub timestamp: Option<Timestamp>,
    pub text: String,
}

impl LyricsLine {
    pub fn new(timestamp: Timestamp, text: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp),
            text: text.into(),
        }
    }

    pub fn untimed(text: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            text: text.into(),
        }
    }

    /// Build a line from edited text fields; an empty timestamp means untimed.
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::Timestamp`] if `timestamp` is neither empty nor a
    /// valid `mm:ss.xx` value.
    pub fn from_parts(timestamp: &str, text: impl Into<String>) -> Result<Self> {
        let timestamp = timestamp.trim();
        if timestamp.is_empty() {
            return Ok(Self::untimed(text));
        }
        Ok(Self::new(Timestamp::parse(timestamp)?, text))
    }
}

impl fmt::Display for LyricsLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.timestamp {
            Some(timestamp) => write!(f, "[{timestamp}]{}", self.text),
            None => write!(f, "[]{}", self.text),
        }
    }
}

/// Check a sequence of lines for missing, decreasing and repeated timestamps.
///
/// Only flags in [`ErrorFlags::TIMESTAMP_CHECKS`] are ever returned.
#[must_use]
pub fn check_timestamps(lines: &[LyricsLine]) -> ErrorFlags {
    let mut flags = ErrorFlags::empty();
    let present: Vec<Timestamp> = lines.iter().filter_map(|line| line.timestamp).collect();

    if present.len() < lines.len() {
        flags |= ErrorFlags::NO_TIMESTAMP;
    }

    // File order
    if present.windows(2).any(|pair| pair[1] < pair[0]) {
        flags |= ErrorFlags::OUT_OF_ORDER;
    }

    // Anywhere in the file
    let mut sorted = present;
    sorted.sort_unstable();
    if sorted.windows(2).any(|pair| pair[0] == pair[1]) {
        flags |= ErrorFlags::DUPLICATE_TIMESTAMPS;
    }

    flags
}

/// An LRC file held in memory for reading and editing.
///
/// Parsing never fails: problems are collected as [`ErrorFlags`]. Edits are
/// validated before they are applied, and accessors hand out copies so the
/// flags always describe the real content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LrcDocument {
    path: Option<PathBuf>,
    tags: BTreeMap<TagKey, TagValue>,
    unknown_tags: BTreeMap<String, TagValue>,
    lines: Vec<LyricsLine>,
    errors: ErrorFlags,
    options: DocumentOptions,
    changed: bool,
}

impl LrcDocument {
    /// Parse LRC text into a document with no backing file
    #[must_use]
    pub fn parse(input: &str, options: DocumentOptions) -> Self {
        let mut doc = Self {
            options,
            ..Self::default()
        };

        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        for (index, line) in input.lines().enumerate() {
            doc.parse_line(index + 1, line);
        }

        doc.errors = (doc.errors - ErrorFlags::TIMESTAMP_CHECKS) | check_timestamps(&doc.lines);
        doc
    }

    /// Read and parse a file. Bytes that are not valid UTF-8 are replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn open(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let mut doc = Self::parse(&String::from_utf8_lossy(&bytes), options);
        doc.path = Some(path.to_path_buf());

        info!(
            "Opened {} ({} tags, {} lines, {} problems)",
            path.display(),
            doc.tags.len() + doc.unknown_tags.len(),
            doc.lines.len(),
            doc.errors.iter().count()
        );
        Ok(doc)
    }

    /// Start a new, empty document and write it to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn create(path: impl AsRef<Path>, options: DocumentOptions) -> Result<Self> {
        let mut doc = Self {
            options,
            ..Self::default()
        };
        doc.save_to(path)?;
        Ok(doc)
    }

    fn parse_line(&mut self, number: usize, line: &str) {
        let Some(caps) = LINE_REGEX.captures(line) else {
            let text = line.trim();
            if !text.is_empty() {
                debug!("Line {number}: lyrics without timestamp");
                self.lines.push(LyricsLine::untimed(text));
                self.errors |= ErrorFlags::NO_TIMESTAMP;
            }
            return;
        };

        let (leading, inner, trailing) = (&caps[1], &caps[2], caps[3].trim());

        if !leading.trim().is_empty() {
            debug!("Line {number}: text before opening bracket");
            self.errors |= ErrorFlags::BAD_DATA;
            return;
        }

        if TIMESTAMP_SHAPE_REGEX.is_match(inner) {
            let timestamp = match Timestamp::parse(inner) {
                Ok(timestamp) => Some(timestamp),
                Err(e) => {
                    debug!("Line {number}: {e}");
                    self.errors |= ErrorFlags::BAD_TIMESTAMP;
                    None
                }
            };
            self.lines.push(LyricsLine {
                timestamp,
                text: trailing.to_string(),
            });
        } else if let Some(tag) = TAG_REGEX.captures(inner) {
            if !self.lines.is_empty() {
                debug!("Line {number}: tag after lyrics");
                self.errors |= ErrorFlags::BAD_LAYOUT;
            }
            self.record_tag(number, &tag[1], tag[2].trim().to_string());
        } else if inner.is_empty() {
            debug!("Line {number}: empty timestamp");
            self.lines.push(LyricsLine::untimed(trailing));
            self.errors |= ErrorFlags::NO_TIMESTAMP;
        } else {
            debug!("Line {number}: unrecognized bracket content '{inner}'");
            self.errors |= ErrorFlags::BAD_DATA;
        }
    }

    fn record_tag(&mut self, number: usize, name: &str, value: String) {
        let duplicate = if let Some(key) = TagKey::from_name(name) {
            add_occurrence(&mut self.tags, key, value)
        } else {
            debug!("Line {number}: unknown tag '{name}'");
            self.errors |= ErrorFlags::UNKNOWN_TAGS;
            add_occurrence(&mut self.unknown_tags, name.to_string(), value)
        };

        if duplicate {
            debug!("Line {number}: tag '{name}' repeated");
            self.errors |= ErrorFlags::DUPLICATE_TAGS;
        }
    }

    /// File this document was opened from or last saved to
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub const fn options(&self) -> DocumentOptions {
        self.options
    }

    /// Change what the next save keeps
    pub fn set_options(&mut self, options: DocumentOptions) {
        self.options = options;
    }

    #[must_use]
    pub const fn errors(&self) -> ErrorFlags {
        self.errors
    }

    /// One message per active problem, for display
    #[must_use]
    pub fn get_errors(&self) -> Vec<String> {
        self.errors
            .messages()
            .map(|(_, message)| message.to_string())
            .collect()
    }

    /// Whether there are edits that have not been saved
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        self.changed
    }

    /// Reserved tags (copy)
    #[must_use]
    pub fn tags(&self) -> BTreeMap<TagKey, TagValue> {
        self.tags.clone()
    }

    /// Non-reserved tags (copy)
    #[must_use]
    pub fn unknown_tags(&self) -> BTreeMap<String, TagValue> {
        self.unknown_tags.clone()
    }

    /// Lyrics lines in file order (copy)
    #[must_use]
    pub fn lyrics(&self) -> Vec<LyricsLine> {
        self.lines.clone()
    }

    /// Effective value of a tag, reserved or not
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.slot(name).map(TagValue::last)
    }

    /// Number of tags currently holding more than one value
    #[must_use]
    pub fn duplicate_tag_count(&self) -> usize {
        self.tags
            .values()
            .chain(self.unknown_tags.values())
            .filter(|slot| slot.is_duplicate())
            .count()
    }

    /// Replace every lyrics line at once.
    ///
    /// The new lines are checked first; nothing changes if they are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::InvalidUsage`] if a line's text contains a line
    /// break, or [`LrcError::Validation`] if timestamps are repeated or out of
    /// order, or if a line lacks a timestamp while such lines are not saved.
    pub fn set_lines(&mut self, lines: Vec<LyricsLine>) -> Result<()> {
        if let Some(index) = lines.iter().position(|line| line.text.contains(['\n', '\r'])) {
            warn!("Rejected lyrics edit: line {index} contains a line break");
            return Err(LrcError::InvalidUsage {
                reason: format!("text of line {index} contains a line break"),
            });
        }

        let shadow = check_timestamps(&lines);

        let mut rejected = shadow
            & (ErrorFlags::BAD_TIMESTAMP
                | ErrorFlags::DUPLICATE_TIMESTAMPS
                | ErrorFlags::OUT_OF_ORDER);
        if shadow.contains(ErrorFlags::NO_TIMESTAMP) && !self.options.save_lines_without_timestamp {
            rejected |= ErrorFlags::NO_TIMESTAMP;
        }

        if !rejected.is_empty() {
            warn!("Rejected lyrics edit: {rejected:?}");
            return Err(LrcError::Validation { flags: rejected });
        }

        self.errors =
            (self.errors - ErrorFlags::TIMESTAMP_CHECKS - ErrorFlags::BAD_TIMESTAMP) | shadow;
        self.lines = lines;
        self.changed = true;
        Ok(())
    }

    /// Set a tag to a single value, replacing any duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::InvalidUsage`] if the name or value could not be
    /// written to and read back from an LRC file.
    pub fn set_tag(&mut self, name: &str, value: impl Into<String>) -> Result<()> {
        let value = value.into().trim().to_string();
        if !TAG_NAME_REGEX.is_match(name) {
            return Err(LrcError::InvalidUsage {
                reason: format!("'{name}' is not a valid tag name"),
            });
        }
        if value.contains(']') || value.contains(['\n', '\r']) {
            return Err(LrcError::InvalidUsage {
                reason: format!("value for tag '{name}' contains ']' or a line break"),
            });
        }

        let slot = TagValue::Single(value);
        let differs = if let Some(key) = TagKey::from_name(name) {
            self.tags.insert(key, slot.clone()) != Some(slot)
        } else {
            self.unknown_tags.insert(name.to_string(), slot.clone()) != Some(slot)
        };

        if differs {
            self.changed = true;
        }
        self.refresh_tag_flags();
        Ok(())
    }

    /// Remove a tag and every value it holds
    pub fn delete_tag(&mut self, name: &str) -> Option<TagValue> {
        let removed = match TagKey::from_name(name) {
            Some(key) => self.tags.remove(&key),
            None => self.unknown_tags.remove(name),
        };

        if removed.is_some() {
            self.changed = true;
            self.refresh_tag_flags();
        }
        removed
    }

    /// Drop the value at `index` from a duplicated tag and return it.
    ///
    /// When one value remains the tag becomes a single value again.
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::NotDuplicate`] if the tag does not hold several
    /// values, or [`LrcError::InvalidUsage`] if `index` is out of range.
    pub fn resolve_duplicate(&mut self, name: &str, index: usize) -> Result<String> {
        let slot = match TagKey::from_name(name) {
            Some(key) => self.tags.get_mut(&key),
            None => self.unknown_tags.get_mut(name),
        };
        let Some(slot) = slot else {
            return Err(LrcError::NotDuplicate {
                tag: name.to_string(),
            });
        };
        let TagValue::Multiple(values) = slot else {
            return Err(LrcError::NotDuplicate {
                tag: name.to_string(),
            });
        };
        if index >= values.len() {
            return Err(LrcError::InvalidUsage {
                reason: format!(
                    "tag '{name}' has {} values, index {index} is out of range",
                    values.len()
                ),
            });
        }

        let removed = values.remove(index);
        if values.len() == 1 {
            slot.collapse();
        }

        self.changed = true;
        self.refresh_tag_flags();
        Ok(removed)
    }

    fn slot(&self, name: &str) -> Option<&TagValue> {
        match TagKey::from_name(name) {
            Some(key) => self.tags.get(&key),
            None => self.unknown_tags.get(name),
        }
    }

    fn refresh_tag_flags(&mut self) {
        self.errors
            .set(ErrorFlags::UNKNOWN_TAGS, !self.unknown_tags.is_empty());
        self.errors
            .set(ErrorFlags::DUPLICATE_TAGS, self.duplicate_tag_count() > 0);
    }

    /// Render the document as it would be saved
    #[must_use]
    pub fn to_lrc_string(&self) -> String {
        let mut out = String::new();

        for (key, value) in &self.tags {
            out.push_str(&format!("[{key}:{}]\n", value.last()));
        }

        let write_unknown = self.options.save_unknown_tags && !self.unknown_tags.is_empty();
        if write_unknown {
            if !self.tags.is_empty() {
                out.push('\n');
            }
            for (name, value) in &self.unknown_tags {
                out.push_str(&format!("[{name}:{}]\n", value.last()));
            }
        }

        if !self.tags.is_empty() || write_unknown {
            out.push('\n');
        }

        for line in &self.lines {
            if line.timestamp.is_some() || self.options.save_lines_without_timestamp {
                out.push_str(&format!("{line}\n"));
            }
        }

        out
    }

    /// Write to the file the document came from.
    ///
    /// # Errors
    ///
    /// Returns [`LrcError::NoPath`] if the document has no backing file, or an
    /// IO error if writing fails.
    pub fn save(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or(LrcError::NoPath)?;
        self.save_to(path)
    }

    /// Write to `path`, replacing it atomically, and make it the backing file.
    ///
    /// Afterwards the document holds exactly what was written: duplicated
    /// tags keep their last value, and anything the options leave out of the
    /// file is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; the target is left as
    /// it was.
    pub fn save_to(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = self.to_lrc_string();
        write_atomically(path, &content)?;

        self.canonicalize();
        self.path = Some(path.to_path_buf());
        self.changed = false;

        info!("Saved {} ({} lines)", path.display(), self.lines.len());
        Ok(())
    }

    fn canonicalize(&mut self) {
        for slot in self.tags.values_mut().chain(self.unknown_tags.values_mut()) {
            slot.collapse();
        }
        if !self.options.save_unknown_tags {
            self.unknown_tags.clear();
        }
        if !self.options.save_lines_without_timestamp {
            self.lines.retain(|line| line.timestamp.is_some());
        }

        self.errors
            .remove(ErrorFlags::BAD_DATA | ErrorFlags::BAD_LAYOUT | ErrorFlags::DUPLICATE_TAGS);
        self.errors
            .set(ErrorFlags::UNKNOWN_TAGS, !self.unknown_tags.is_empty());
        self.errors = (self.errors - ErrorFlags::TIMESTAMP_CHECKS) | check_timestamps(&self.lines);
    }

    /// Value of the `offset` tag in milliseconds, 0 if absent or unreadable
    #[must_use]
    pub fn offset_ms(&self) -> i64 {
        self.tags
            .get(&TagKey::Offset)
            .and_then(|value| value.last().trim().parse().ok())
            .unwrap_or(0)
    }

    /// Index of the line being sung at `position`.
    ///
    /// This is the last timed line starting at or before `position` once the
    /// `offset` tag is applied. Lines without a timestamp are never current.
    #[must_use]
    pub fn current_line_index(&self, position: Duration) -> Option<usize> {
        let offset = self.offset_ms();
        self.lines
            .iter()
            .enumerate()
            .rev()
            .find(|(_, line)| {
                line.timestamp
                    .is_some_and(|ts| apply_offset(ts.to_duration(), offset) <= position)
            })
            .map(|(i, _)| i)
    }

    /// Lines around the current position for display (copy)
    #[must_use]
    pub fn visible_lines(&self, position: Duration, before: usize, after: usize) -> Vec<LyricsLine> {
        let current_idx = self.current_line_index(position).unwrap_or(0);

        let start = current_idx.saturating_sub(before);
        let end = current_idx
            .saturating_add(after)
            .saturating_add(1)
            .min(self.lines.len());

        self.lines.get(start..end).map(<[_]>::to_vec).unwrap_or_default()
    }
}

/// Add a value for `key`, returning whether the tag was already present
fn add_occurrence<K: Ord>(map: &mut BTreeMap<K, TagValue>, key: K, value: String) -> bool {
    match map.entry(key) {
        Entry::Vacant(entry) => {
            entry.insert(TagValue::Single(value));
            false
        }
        Entry::Occupied(mut entry) => {
            entry.get_mut().push(value);
            true
        }
    }
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}

/// Apply a millisecond offset to a duration (can be negative)
fn apply_offset(duration: Duration, offset_ms: i64) -> Duration {
    let shift = Duration::from_millis(offset_ms.unsigned_abs());
    if offset_ms >= 0 {
        duration.saturating_add(shift)
    } else {
        duration.saturating_sub(shift)
    }
}
