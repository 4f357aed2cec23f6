//! Diagnostic attachments collected while a scenario runs.
//!
//! Scenarios attach captured text, JSON details, screenshots and raw LLM
//! responses. After the attempt, [`Attachments::write_to`] flushes them to
//! `<output>/<scenario-id>/`, one file per attachment.

use crate::result::ProbeResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// MIME type of JSON attachments
pub const JSON: &str = "application/json";
/// MIME type of plain-text attachments
pub const TEXT: &str = "text/plain";
/// MIME type of screenshots
pub const PNG: &str = "image/png";

/// One named blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Name, unique within a scenario attempt by convention
    pub name: String,
    /// MIME type
    pub content_type: String,
    /// Payload
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl Attachment {
    /// File extension matching the content type
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self.content_type.as_str() {
            JSON => "json",
            PNG => "png",
            TEXT => "txt",
            _ => "bin",
        }
    }

    fn stem(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    /// File name on disk: the name with unsafe characters replaced
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), self.extension())
    }

    /// Body as UTF-8 text, if it is
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// Attachments of one scenario attempt, in attach order
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    items: Vec<Attachment>,
}

impl Attachments {
    /// Empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach raw bytes
    pub fn attach(&mut self, name: impl Into<String>, content_type: &str, body: Vec<u8>) {
        let name = name.into();
        tracing::debug!(%name, content_type, bytes = body.len(), "attachment");
        self.items.push(Attachment {
            name,
            content_type: content_type.to_string(),
            body,
        });
    }

    /// Attach pretty-printed JSON
    ///
    /// Serialization failures are logged and the attachment is dropped.
    pub fn attach_json<T: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &T) {
        let name = name.into();
        match serde_json::to_vec_pretty(value) {
            Ok(body) => self.attach(name, JSON, body),
            Err(e) => tracing::warn!(%name, error = %e, "could not serialize attachment"),
        }
    }

    /// Attach plain text
    pub fn attach_text(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.attach(name, TEXT, text.into().into_bytes());
    }

    /// Attach a PNG screenshot
    pub fn attach_png(&mut self, name: impl Into<String>, png: Vec<u8>) {
        self.attach(name, PNG, png);
    }

    /// All attachments
    #[must_use]
    pub fn items(&self) -> &[Attachment] {
        &self.items
    }

    /// Names, in attach order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|a| a.name.clone()).collect()
    }

    /// Latest attachment with `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Attachment> {
        self.items.iter().rev().find(|a| a.name == name)
    }

    /// Latest JSON attachment with `name`, parsed
    #[must_use]
    pub fn json(&self, name: &str) -> Option<serde_json::Value> {
        self.get(name).and_then(|a| serde_json::from_slice(&a.body).ok())
    }

    /// Number of attachments
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// No attachments
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Write every attachment under `dir`, creating it
    ///
    /// A repeated name gets a numeric suffix instead of overwriting.
    ///
    /// # Errors
    ///
    /// I/O errors from creating the directory or writing files.
    pub fn write_to(&self, dir: &Path) -> ProbeResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written: Vec<PathBuf> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let mut path = dir.join(item.file_name());
            let mut n = 1;
            while written.contains(&path) {
                n += 1;
                path = dir.join(format!("{}-{n}.{}", item.stem(), item.extension()));
            }
            std::fs::write(&path, &item.body)?;
            written.push(path);
        }
        Ok(written)
    }
}
