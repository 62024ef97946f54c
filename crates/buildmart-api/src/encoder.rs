// ── Multipart form-data encoder ──
//
// Flattens a nested `Payload` into an ordered list of form entries.
// Nested keys become `a[b][2][c]` (or `a.b.2.c` without brackets),
// booleans become "1"/"0", dates ISO-8601. Optional per-field file
// validation fails the whole encode instead of dropping files.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::payload::{FileHandle, Payload, Value, format_date};

/// Appended to a key to mark an empty list (`tags[]` with an empty value).
const EMPTY_LIST_MARKER: &str = "[]";

// ── Configuration ───────────────────────────────────────────────────

/// Upload constraints for one field (or for every field, as a global rule).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRule {
    /// Maximum size of a single file, in bytes.
    pub max_size: Option<u64>,
    /// Accepted extensions (`.png`), MIME types (`application/pdf`) or
    /// wildcard MIME prefixes (`image/*`). Empty accepts everything.
    pub allowed_types: Vec<String>,
    /// Maximum number of files in a list field.
    pub max_files: Option<usize>,
}

/// Field-specific rules with an optional fallback applied to every field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRules {
    pub global: Option<FileRule>,
    pub fields: HashMap<String, FileRule>,
}

impl FileRules {
    pub fn for_field(&self, field: &str) -> Option<&FileRule> {
        self.fields.get(field).or(self.global.as_ref())
    }

    pub fn with_field(mut self, field: impl Into<String>, rule: FileRule) -> Self {
        self.fields.insert(field.into(), rule);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderConfig {
    /// Encode nested keys as `a[b]` rather than `a.b`.
    pub array_brackets: bool,
    /// Recurse into nested mappings. When off, a nested mapping is sent
    /// as one JSON text entry.
    pub nested_objects: bool,
    pub file_rules: FileRules,
    pub validate_files: bool,
    /// Skip empty lists under keys containing "file".
    pub exclude_empty_files: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            array_brackets: true,
            nested_objects: true,
            file_rules: FileRules::default(),
            validate_files: false,
            exclude_empty_files: false,
        }
    }
}

impl EncoderConfig {
    /// Turn on validation with the given rules.
    pub fn validating(mut self, rules: FileRules) -> Self {
        self.file_rules = rules;
        self.validate_files = true;
        self
    }
}

// ── Validation errors ───────────────────────────────────────────────

/// A single violated upload rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    TooLarge {
        file_name: String,
        size: u64,
        max_size: u64,
    },
    TypeNotAllowed {
        file_name: String,
        content_type: String,
        allowed: Vec<String>,
    },
    TooManyFiles {
        count: usize,
        max_files: usize,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge {
                file_name,
                size,
                max_size,
            } => write!(
                f,
                "{file_name} is {size} bytes, larger than the {max_size} byte limit"
            ),
            Self::TypeNotAllowed {
                file_name,
                content_type,
                allowed,
            } => write!(
                f,
                "{file_name} ({content_type}) is not an allowed type ({})",
                allowed.join(", ")
            ),
            Self::TooManyFiles { count, max_files } => {
                write!(f, "{count} files given, at most {max_files} allowed")
            }
        }
    }
}

/// Encoding stopped because uploads broke their field's rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid upload for `{field}`: {}", join_violations(.violations))]
pub struct FileValidationError {
    pub field: String,
    pub violations: Vec<Violation>,
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Output ──────────────────────────────────────────────────────────

/// A single multipart entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEntry {
    Text(String),
    File(FileHandle),
}

/// Ordered form entries, independent of any HTTP client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartPayload {
    entries: Vec<(String, FormEntry)>,
}

impl MultipartPayload {
    pub fn entries(&self) -> &[(String, FormEntry)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// First text value stored under `key`.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|(k, e)| match e {
            FormEntry::Text(t) if k == key => Some(t.as_str()),
            _ => None,
        })
    }

    /// First file stored under `key`.
    pub fn file(&self, key: &str) -> Option<&FileHandle> {
        self.entries.iter().find_map(|(k, e)| match e {
            FormEntry::File(f) if k == key => Some(f),
            _ => None,
        })
    }

    pub fn has_files(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, e)| matches!(e, FormEntry::File(_)))
    }

    /// Text entries as query pairs. Returns `None` if any entry is a file.
    pub fn into_query_pairs(self) -> Option<Vec<(String, String)>> {
        self.entries
            .into_iter()
            .map(|(k, e)| match e {
                FormEntry::Text(t) => Some((k, t)),
                FormEntry::File(_) => None,
            })
            .collect()
    }

    /// Build a `reqwest` multipart form from the entries.
    ///
    /// Field names are written raw (`images[0]`), the way form-parsing
    /// backends expect them. Fails if a file's content type is not a MIME
    /// type.
    pub fn into_form(self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        let mut form = reqwest::multipart::Form::new().percent_encode_noop();
        for (key, entry) in self.entries {
            form = match entry {
                FormEntry::Text(text) => form.text(key, text),
                FormEntry::File(file) => {
                    let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
                        .file_name(file.name)
                        .mime_str(&file.content_type)?;
                    form.part(key, part)
                }
            };
        }
        Ok(form)
    }

    fn push_text(&mut self, key: String, text: impl Into<String>) {
        self.entries.push((key, FormEntry::Text(text.into())));
    }

    fn push_file(&mut self, key: String, file: FileHandle) {
        self.entries.push((key, FormEntry::File(file)));
    }
}

// ── Encoding ────────────────────────────────────────────────────────

/// Flatten `payload` into multipart entries.
///
/// Pure function of its inputs. Null leaves are skipped, so the literal
/// strings "null" and "undefined" never reach the wire.
pub fn encode(
    payload: &Payload,
    config: &EncoderConfig,
) -> Result<MultipartPayload, FileValidationError> {
    let mut encoder = Encoder {
        config,
        out: MultipartPayload::default(),
    };
    for (key, value) in payload {
        encoder.value(key.clone(), key, value)?;
    }
    Ok(encoder.out)
}

struct Encoder<'a> {
    config: &'a EncoderConfig,
    out: MultipartPayload,
}

impl Encoder<'_> {
    /// Encode one node. `field` is the nearest named key, used for rule lookup.
    fn value(&mut self, key: String, field: &str, value: &Value) -> Result<(), FileValidationError> {
        match value {
            Value::Null => {}
            Value::Bool(b) => self.out.push_text(key, if *b { "1" } else { "0" }),
            Value::Number(n) => self.out.push_text(key, n.to_string()),
            Value::Text(s) => self.out.push_text(key, s.clone()),
            Value::Date(d) => self.out.push_text(key, format_date(d)),
            Value::File(file) => {
                if let Some(rule) = self.rule_for(field) {
                    let violations = check_file(file, rule);
                    if !violations.is_empty() {
                        return Err(FileValidationError {
                            field: field.to_owned(),
                            violations,
                        });
                    }
                }
                self.out.push_file(key, file.clone());
            }
            Value::List(items) => self.list(key, field, items)?,
            Value::Map(map) => {
                if self.config.nested_objects {
                    for (child, child_value) in map {
                        let child_key = self.join(&key, child);
                        self.value(child_key, child, child_value)?;
                    }
                } else {
                    self.out.push_text(key, value.to_json().to_string());
                }
            }
        }
        Ok(())
    }

    fn list(&mut self, key: String, field: &str, items: &[Value]) -> Result<(), FileValidationError> {
        if items.is_empty() {
            if !(self.config.exclude_empty_files && field.to_ascii_lowercase().contains("file")) {
                self.out.push_text(format!("{key}{EMPTY_LIST_MARKER}"), "");
            }
            return Ok(());
        }

        if let Some(rule) = self.rule_for(field) {
            let files: Vec<&FileHandle> = items
                .iter()
                .filter_map(|v| match v {
                    Value::File(f) => Some(f),
                    _ => None,
                })
                .collect();
            if !files.is_empty() {
                let mut violations = Vec::new();
                if let Some(max_files) = rule.max_files {
                    if files.len() > max_files {
                        violations.push(Violation::TooManyFiles {
                            count: files.len(),
                            max_files,
                        });
                    }
                }
                for file in &files {
                    violations.extend(check_file(file, rule));
                }
                if !violations.is_empty() {
                    return Err(FileValidationError {
                        field: field.to_owned(),
                        violations,
                    });
                }
            }
        }

        for (index, item) in items.iter().enumerate() {
            let child_key = self.join(&key, &index.to_string());
            match item {
                // Already validated as a group above.
                Value::File(file) => self.out.push_file(child_key, file.clone()),
                other => self.value(child_key, field, other)?,
            }
        }
        Ok(())
    }

    fn rule_for(&self, field: &str) -> Option<&FileRule> {
        if self.config.validate_files {
            self.config.file_rules.for_field(field)
        } else {
            None
        }
    }

    fn join(&self, parent: &str, child: &str) -> String {
        if self.config.array_brackets {
            format!("{parent}[{child}]")
        } else {
            format!("{parent}.{child}")
        }
    }
}

/// Check one file against a rule, collecting every violation.
fn check_file(file: &FileHandle, rule: &FileRule) -> Vec<Violation> {
    let mut violations = Vec::new();

    if let Some(max_size) = rule.max_size {
        if file.size() > max_size {
            violations.push(Violation::TooLarge {
                file_name: file.name.clone(),
                size: file.size(),
                max_size,
            });
        }
    }

    if !rule.allowed_types.is_empty() && !type_allowed(file, &rule.allowed_types) {
        violations.push(Violation::TypeNotAllowed {
            file_name: file.name.clone(),
            content_type: file.content_type.clone(),
            allowed: rule.allowed_types.clone(),
        });
    }

    violations
}

fn type_allowed(file: &FileHandle, allowed: &[String]) -> bool {
    let extension = file.extension();
    let mime = file.content_type.to_ascii_lowercase();

    allowed.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern.starts_with('.') {
            extension.as_deref() == Some(pattern.as_str())
        } else if let Some(prefix) = pattern.strip_suffix("/*") {
            mime.split_once('/').is_some_and(|(top, _)| top == prefix)
        } else {
            mime == pattern
        }
    })
}

// ── Decoding ────────────────────────────────────────────────────────

/// Rebuild a nested payload from flattened entries.
///
/// The inverse of [`encode`] for file-free payloads: every leaf comes back
/// as `Value::Text` (booleans as "1"/"0", dates as ISO-8601), a branch
/// whose keys are exactly `0..n` becomes a list, and a `key[]` marker
/// becomes an empty list. Files are restored as-is. Empty mappings produce
/// no entries when encoded, so they do not come back.
pub fn decode(form: &MultipartPayload, config: &EncoderConfig) -> Payload {
    let mut root: IndexMap<String, Node> = IndexMap::new();
    for (key, entry) in form.entries() {
        let (key, leaf) = match entry {
            FormEntry::Text(t) => match key.strip_suffix(EMPTY_LIST_MARKER) {
                Some(list_key) if t.is_empty() => (list_key, Value::List(Vec::new())),
                _ => (key.as_str(), Value::Text(t.clone())),
            },
            FormEntry::File(f) => (key.as_str(), Value::File(f.clone())),
        };
        insert(&mut root, &split_key(key, config.array_brackets), leaf);
    }
    root.into_iter().map(|(k, n)| (k, n.into_value())).collect()
}

enum Node {
    Leaf(Value),
    Branch(IndexMap<String, Node>),
}

impl Node {
    fn into_value(self) -> Value {
        match self {
            Self::Leaf(v) => v,
            Self::Branch(children) => {
                let is_list = children
                    .keys()
                    .enumerate()
                    .all(|(i, k)| k.parse::<usize>().ok() == Some(i));
                if is_list {
                    Value::List(children.into_values().map(Self::into_value).collect())
                } else {
                    Value::Map(
                        children
                            .into_iter()
                            .map(|(k, n)| (k, n.into_value()))
                            .collect(),
                    )
                }
            }
        }
    }
}

fn insert(level: &mut IndexMap<String, Node>, segments: &[String], leaf: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        level.insert(head.clone(), Node::Leaf(leaf));
        return;
    }
    let node = level
        .entry(head.clone())
        .or_insert_with(|| Node::Branch(IndexMap::new()));
    if let Node::Leaf(_) = node {
        *node = Node::Branch(IndexMap::new());
    }
    if let Node::Branch(children) = node {
        insert(children, rest, leaf);
    }
}

/// `a[b][2]` -> `["a", "b", "2"]`; `a.b.2` -> same when brackets are off.
fn split_key(key: &str, brackets: bool) -> Vec<String> {
    if !brackets {
        return key.split('.').map(str::to_owned).collect();
    }
    let Some(open) = key.find('[') else {
        return vec![key.to_owned()];
    };
    let mut segments = vec![key[..open].to_owned()];
    segments.extend(
        key[open..]
            .split('[')
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches(']').to_owned()),
    );
    segments
}
