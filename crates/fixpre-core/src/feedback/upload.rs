use std::path::Path;

use anyhow::{Context, Result};
use reqwest::multipart;

use crate::api::ApiError;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Multipart field the service reads the presentation from
pub const PRESENTATION_FIELD: &str = "presentation";

const NO_FILE_SELECTED: &str = "Please select a file first.";

/// A presentation ready to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime_type: None,
        }
    }

    /// Read a file from disk, guessing the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "presentation".to_string());
        Ok(Self {
            mime_type: mime_for(path).map(str::to_string),
            file_name,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub(crate) fn to_form(&self) -> Result<multipart::Form, ApiError> {
        let mut part = multipart::Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        if let Some(mime) = self.mime_type.as_deref() {
            part = part
                .mime_str(mime)
                .map_err(|_| ApiError::Validation(format!("Invalid MIME type: {}", mime)))?;
        }
        Ok(multipart::Form::new().part(PRESENTATION_FIELD, part))
    }
}

fn mime_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "pptx" => Some("application/vnd.openxmlformats-officedocument.presentationml.presentation"),
        "ppt" => Some("application/vnd.ms-powerpoint"),
        "pdf" => Some("application/pdf"),
        "key" => Some("application/vnd.apple.keynote"),
        "odp" => Some("application/vnd.oasis.opendocument.presentation"),
        _ => None,
    }
}

/// What the client checks before sending anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Inclusive upper bound; `None` accepts any size
    pub max_bytes: Option<u64>,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: Some(crate::config::DEFAULT_MAX_UPLOAD_BYTES),
        }
    }
}

impl UploadPolicy {
    pub fn unlimited() -> Self {
        Self { max_bytes: None }
    }

    pub fn validate<'a>(&self, file: Option<&'a UploadFile>) -> Result<&'a UploadFile, ApiError> {
        let file = file.ok_or_else(|| ApiError::Validation(NO_FILE_SELECTED.to_string()))?;
        if let Some(max) = self.max_bytes {
            if file.size() > max {
                return Err(ApiError::Validation(format!(
                    "File is too large. The limit is {}MB. Your file is {:.2}MB.",
                    format_limit(max),
                    file.size() as f64 / BYTES_PER_MIB
                )));
            }
        }
        Ok(file)
    }
}

/// Whole mebibytes print without decimals
fn format_limit(bytes: u64) -> String {
    let mib = bytes as f64 / BYTES_PER_MIB;
    if mib.fract() == 0.0 {
        format!("{}", mib as u64)
    } else {
        format!("{:.2}", mib)
    }
}
