//! Submitted form payloads and their field-level validation.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use serde::Serialize;

pub const REQUIRED_FIELD: &str = "This field is required.";
pub const INVALID_GROUP: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Validation messages keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, field: &str) -> bool {
        !self.field(field).is_empty()
    }

    /// `Ok(value)` when no field failed validation.
    pub fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

/// Image file received with a post form.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Bytes,
}

impl ImageUpload {
    /// True when the payload starts with a recognised raster image header.
    pub fn is_image(&self) -> bool {
        imagesize::blob_size(&self.data).is_ok()
    }
}

/// Post create/edit submission.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    /// Group slug; empty or absent means no group.
    pub group: Option<String>,
    pub image: Option<ImageUpload>,
}

impl PostInput {
    pub fn group_slug(&self) -> Option<&str> {
        self.group
            .as_deref()
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentInput {
    pub text: String,
}

/// Body text is required and must contain something other than whitespace.
pub fn require_text(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED_FIELD);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_GIF: &[u8] = &[
        0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
        0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
        0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
    ];

    #[test]
    fn blank_text_is_required() {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "text", "   \n");
        assert_eq!(errors.field("text"), [REQUIRED_FIELD.to_string()]);
        assert!(errors.finish(()).is_err());
    }

    #[test]
    fn clean_form_finishes_with_value() {
        let mut errors = FieldErrors::new();
        require_text(&mut errors, "text", "hello");
        assert_eq!(errors.finish(7), Ok(7));
    }

    #[test]
    fn gif_payload_is_recognised_as_image() {
        let upload = ImageUpload {
            file_name: "small.gif".to_string(),
            data: Bytes::from_static(SMALL_GIF),
        };
        assert!(upload.is_image());

        let text = ImageUpload {
            file_name: "notes.gif".to_string(),
            data: Bytes::from_static(b"plain text"),
        };
        assert!(!text.is_image());
    }

    #[test]
    fn blank_group_means_no_group() {
        let input = PostInput {
            group: Some("  ".to_string()),
            ..PostInput::default()
        };
        assert_eq!(input.group_slug(), None);
    }

    #[test]
    fn display_lists_every_message() {
        let mut errors = FieldErrors::new();
        errors.add("text", REQUIRED_FIELD);
        errors.add("group", INVALID_GROUP);
        let rendered = errors.to_string();
        assert!(rendered.contains("text: This field is required."));
        assert!(rendered.starts_with("group: "));
    }
}
