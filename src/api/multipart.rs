//! Buffered multipart forms.
//!
//! Upload endpoints read the whole form first, then validate, then touch
//! the blob store, so that a bad request never leaves half its files on
//! disk.

use axum::extract::Multipart;
use bytes::Bytes;
use std::collections::HashMap;

use super::error::ApiError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct Form {
    fields: HashMap<String, String>,
    files: HashMap<String, Vec<UploadedFile>>,
}

impl Form {
    /// Drain a multipart body. Parts carrying a file name are files, the
    /// rest are text fields (the last value wins for repeated names).
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Form::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let bytes = field.bytes().await?;
                    form.files
                        .entry(name)
                        .or_default()
                        .push(UploadedFile { file_name, bytes });
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// A non-blank text field, or a validation error naming it
    pub fn require_text(&self, name: &str) -> Result<&str, ApiError> {
        match self.text(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ApiError::validation_field(name, format!("{} is required", name))),
        }
    }

    /// A text field holding a positive integer id
    pub fn require_id(&self, name: &str) -> Result<i64, ApiError> {
        let raw = self.require_text(name)?;
        match raw.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(id),
            _ => Err(ApiError::validation_field(name, format!("Invalid {}", name))),
        }
    }

    pub fn files(&self, name: &str) -> &[UploadedFile] {
        self.files.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files(name).first()
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        fields: &[(&str, &str)],
        files: &[(&str, &str, &'static [u8])],
    ) -> Self {
        let mut form = Form::default();
        for (name, value) in fields {
            form.fields.insert(name.to_string(), value.to_string());
        }
        for (name, file_name, bytes) in files {
            form.files.entry(name.to_string()).or_default().push(UploadedFile {
                file_name: file_name.to_string(),
                bytes: Bytes::from_static(bytes),
            });
        }
        form
    }
}
