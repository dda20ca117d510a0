//! Multipart post form parsing.

use axum::http::StatusCode;
use axum_extra::extract::Multipart;
use axum_extra::extract::multipart::MultipartError;
use tracing::error;

use crate::application::error::HttpError;
use crate::application::forms::{ImageUpload, PostInput};

const SOURCE: &str = "infra::http::forms::read_post_form";
const DEFAULT_IMAGE_NAME: &str = "image";

/// Collects the `text`, `group` and `image` fields of a post submission.
///
/// An image field with no file selected is treated as absent.
pub(super) async fn read_post_form(multipart: &mut Multipart) -> Result<PostInput, HttpError> {
    let mut input = PostInput::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => return Err(multipart_error(err)),
        };

        match field.name() {
            Some("text") => {
                input.text = field.text().await.map_err(multipart_error)?;
            }
            Some("group") => {
                let value = field.text().await.map_err(multipart_error)?;
                input.group = Some(value);
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    input.image = Some(ImageUpload {
                        file_name: file_name.unwrap_or_else(|| DEFAULT_IMAGE_NAME.to_string()),
                        data,
                    });
                }
            }
            _ => continue,
        }
    }

    Ok(input)
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    error!(
        target = SOURCE,
        status = status.as_u16(),
        error = %err,
        "failed to read multipart payload"
    );

    match status {
        StatusCode::PAYLOAD_TOO_LARGE => HttpError::new(
            SOURCE,
            StatusCode::PAYLOAD_TOO_LARGE,
            "Upload too large",
            err.to_string(),
        ),
        _ => HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Invalid form data",
            err.to_string(),
        ),
    }
}
