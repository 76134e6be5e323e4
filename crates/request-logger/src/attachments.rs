// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Text content logged as named files.
//!
//! Every [`Attachment`] exclusively owns a temporary file. Dropping the
//! attachment deletes the file; deletion failures are ignored.

use regex::Regex;
use std::io::{self, Write};
use std::path::Path;
use std::sync::LazyLock;
use tempfile::NamedTempFile;

pub const DEFAULT_FILE_NAME: &str = "File";

#[allow(clippy::expect_used)]
static FILE_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_\-\+\. ]+").expect("file name pattern is valid"));

/// Strips every character outside `[a-zA-Z0-9_-+. ]`, falling back to
/// [`DEFAULT_FILE_NAME`] when nothing is left.
#[must_use]
pub fn sanitize_file_name(file_name: Option<&str>) -> String {
    let trimmed = file_name.map(str::trim).unwrap_or_default();
    let sanitized = FILE_NAME_REGEX.replace_all(trimmed, "");
    let sanitized = sanitized.trim();

    if sanitized.is_empty() {
        DEFAULT_FILE_NAME.to_string()
    } else {
        sanitized.to_string()
    }
}

#[derive(Debug)]
pub struct Attachment {
    file: NamedTempFile,
    display_name: String,
    size: usize,
}

impl Attachment {
    /// Writes `contents` to a fresh temporary file.
    ///
    /// On failure the partially written file is removed before the error is
    /// returned.
    pub fn create(contents: &str, display_name: String) -> io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;

        Ok(Self {
            file,
            display_name,
            size: contents.len(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Reads the backing file, or `None` when it no longer exists.
    pub(crate) fn read(&self) -> Option<Vec<u8>> {
        if !self.path().exists() {
            return None;
        }
        crate::best_effort("reading attachment", std::fs::read(self.path()))
    }
}
