//! Field value store: the only writer of field values for a session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use super::uploads::UploadId;

/// A file the user picked. Cloning shares the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub content_type: Option<String>,
    pub data: Arc<[u8]>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        FileHandle {
            name: name.into(),
            content_type: None,
            data: Arc::from(data.into()),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// One selection event's file, identified by the upload id it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedFile {
    pub id: UploadId,
    pub file: FileHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    List(Vec<String>),
    Files(Vec<AttachedFile>),
}

impl Value {
    /// Empty string (after trimming), empty list, or no files.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Text(s) => s.trim().is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Files(files) => files.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Serializable copy of a value for views and browser calls. Files become names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ValueSnapshot {
    Text(String),
    List(Vec<String>),
}

impl From<&Value> for ValueSnapshot {
    fn from(value: &Value) -> Self {
        match value {
            Value::Text(s) => ValueSnapshot::Text(s.clone()),
            Value::List(items) => ValueSnapshot::List(items.clone()),
            Value::Files(files) => {
                ValueSnapshot::List(files.iter().map(|f| f.file.name.clone()).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    values: HashMap<String, Value>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn set_text(&mut self, name: &str, value: String) {
        self.values.insert(name.to_string(), Value::Text(value));
    }

    /// Add `option` if absent, remove it if present. Returns whether it is now selected.
    pub(crate) fn toggle(&mut self, name: &str, option: &str) -> bool {
        let entry = self
            .values
            .entry(name.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        if !matches!(entry, Value::List(_)) {
            *entry = Value::List(Vec::new());
        }
        let Value::List(items) = entry else {
            return false;
        };
        if let Some(pos) = items.iter().position(|o| o == option) {
            items.remove(pos);
            false
        } else {
            items.push(option.to_string());
            true
        }
    }

    pub(crate) fn push_files(&mut self, name: &str, files: impl IntoIterator<Item = AttachedFile>) {
        let entry = self
            .values
            .entry(name.to_string())
            .or_insert_with(|| Value::Files(Vec::new()));
        if !matches!(entry, Value::Files(_)) {
            *entry = Value::Files(Vec::new());
        }
        if let Value::Files(list) = entry {
            list.extend(files);
        }
    }

    pub(crate) fn remove_file(&mut self, name: &str, index: usize) -> Option<AttachedFile> {
        match self.values.get_mut(name) {
            Some(Value::Files(list)) if index < list.len() => Some(list.remove(index)),
            _ => None,
        }
    }

    /// Files currently attached to `name`, in selection order.
    pub fn files(&self, name: &str) -> &[AttachedFile] {
        match self.values.get(name) {
            Some(Value::Files(list)) => list,
            _ => &[],
        }
    }
}
