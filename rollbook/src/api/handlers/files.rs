//! File download, plus the multipart plumbing shared by every upload form.

use std::collections::HashMap;

use axum::{
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use crate::{
    AppState,
    db::{
        errors::DbError,
        handlers::Files,
        models::files::{FileCreateDBRequest, FileSummaryDBResponse},
    },
    errors::{Error, Result},
    types::{FileId, StudentId},
};

pub const MAX_FILENAME_LEN: usize = 255;
pub const MAX_CONTENT_TYPE_LEN: usize = 100;
const DEFAULT_FILENAME: &str = "upload.bin";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A file part received in a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn validate(&self) -> Result<()> {
        if self.filename.chars().count() > MAX_FILENAME_LEN {
            return Err(Error::BadRequest {
                message: format!("File name must be at most {MAX_FILENAME_LEN} characters."),
            });
        }
        if self.content_type.chars().count() > MAX_CONTENT_TYPE_LEN {
            return Err(Error::BadRequest {
                message: format!("File type must be at most {MAX_CONTENT_TYPE_LEN} characters."),
            });
        }
        Ok(())
    }
}

/// Text fields and the optional `file` part of a multipart form
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    pub file: Option<UploadedFile>,
}

impl MultipartForm {
    /// Value of a text field, or an empty string when it was not sent
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { message: e.body_text() }
    } else {
        Error::BadRequest {
            message: format!("Failed to parse multipart data: {e}"),
        }
    }
}

/// Read a whole multipart form, enforcing `max_file_size` on the `file` part.
///
/// An empty file part (a form submitted without choosing a file) counts as no file.
pub async fn read_multipart(mut multipart: Multipart, max_file_size: usize) -> Result<MultipartForm> {
    let mut form = MultipartForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        if field_name != "file" {
            let value = field.text().await.map_err(multipart_error)?;
            form.fields.insert(field_name, value);
            continue;
        }

        let filename = field
            .file_name()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();
        let content_type = field
            .content_type()
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            data.extend_from_slice(&chunk);
            if data.len() > max_file_size {
                warn!(
                    filename = %filename,
                    max_file_size = max_file_size,
                    "File size limit exceeded, aborting upload"
                );
                return Err(Error::PayloadTooLarge {
                    message: format!(
                        "File size exceeds maximum allowed size of {} bytes ({} MB)",
                        max_file_size,
                        max_file_size / (1024 * 1024)
                    ),
                });
            }
        }

        if data.is_empty() {
            debug!("Ignoring empty file part");
            continue;
        }

        form.file = Some(UploadedFile {
            filename,
            content_type,
            data,
        });
    }

    Ok(form)
}

/// Store an uploaded file, optionally attached to a student
#[instrument(skip(state, file), fields(filename = %file.filename, size = file.data.len()), err)]
pub async fn save_file(state: &AppState, file: UploadedFile, student_id: Option<StudentId>) -> Result<FileSummaryDBResponse> {
    file.validate()?;

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let stored = Files::new(&mut conn)
        .create(&FileCreateDBRequest {
            filename: file.filename,
            content_type: file.content_type,
            data: file.data,
            student_id,
        })
        .await?;

    Ok(stored)
}

/// `Content-Disposition` value that survives any stored filename
fn attachment_disposition(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if matches!(c, '"' | '\\') { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

/// Download a stored file
#[tracing::instrument(skip_all, fields(file_id = %id))]
pub async fn download_file(State(state): State<AppState>, Path(id): Path<FileId>) -> Result<Response> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let file = Files::new(&mut conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "File".to_string(),
        id: id.to_string(),
    })?;

    let content_type =
        HeaderValue::from_str(&file.content_type).unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let disposition = HeaderValue::from_str(&attachment_disposition(&file.filename)).map_err(|e| Error::Internal {
        operation: format!("build content disposition: {e}"),
    })?;

    Ok((
        [(header::CONTENT_TYPE, content_type), (header::CONTENT_DISPOSITION, disposition)],
        file.data,
    )
        .into_response())
}
