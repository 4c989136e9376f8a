//! Spreadsheet upload page for bulk registration.

use axum::{
    extract::{Multipart, State},
    response::Html,
};
use minijinja::context;

use crate::{
    AppState,
    api::handlers::files::read_multipart,
    errors::{Error, Result},
    import::import_students,
};

const NO_ROWS: &str = "No student rows found in the uploaded file.";

fn render(state: &AppState, messages: Vec<String>, error: Option<String>) -> Result<Html<String>> {
    state.templates.render("upload_excel.html", context! { messages, error })
}

#[tracing::instrument(skip_all)]
pub async fn upload_excel_form(State(state): State<AppState>) -> Result<Html<String>> {
    render(&state, Vec::new(), None)
}

/// Import the uploaded sheet and show what happened to its rows.
///
/// Problems with the file itself are shown on the page rather than returned as error statuses.
#[tracing::instrument(skip_all)]
pub async fn upload_excel(State(state): State<AppState>, multipart: Multipart) -> Result<Html<String>> {
    let upload = match read_multipart(multipart, state.config.uploads.max_file_size).await {
        Ok(upload) => upload,
        Err(e @ (Error::BadRequest { .. } | Error::PayloadTooLarge { .. })) => return render(&state, Vec::new(), Some(e.user_message())),
        Err(e) => return Err(e),
    };

    let Some(file) = upload.file else {
        return render(&state, Vec::new(), Some("Please choose a spreadsheet to upload.".to_string()));
    };

    match import_students(&state, &file.filename, &file.data).await {
        Ok(report) if report.is_empty() => render(&state, vec![NO_ROWS.to_string()], None),
        Ok(report) => render(&state, report.messages(), None),
        Err(Error::BadRequest { message }) => render(&state, Vec::new(), Some(message)),
        Err(e) => Err(e),
    }
}
