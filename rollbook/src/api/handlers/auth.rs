//! Student login, logout and the logged-in profile page.

use axum::{
    Form,
    extract::{Multipart, Path, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use tracing::{info, instrument, warn};

use crate::{
    AppState,
    api::{
        handlers::files::{read_multipart, save_file},
        models::{
            files::FileResponse,
            students::{LoginForm, StudentResponse},
        },
    },
    auth::{
        current_student::CurrentStudent,
        password::{self, Argon2Params},
        session,
    },
    db::{
        errors::DbError,
        handlers::{Files, Repository, Students},
    },
    errors::{Error, Result},
    types::{FileId, StudentId},
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[tracing::instrument(skip_all)]
pub async fn login_form(State(state): State<AppState>) -> Result<Html<String>> {
    state.templates.render("login.html", context! {})
}

/// Check an email and password; on success set the session cookie and go to the profile
#[instrument(skip_all, fields(email = %form.email))]
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response> {
    let email = form.email.trim().to_string();

    let student = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Students::new(&mut conn).get_by_email(&email).await?
    };

    let valid = match &student {
        Some(student) => password::verify_password(form.password, student.password_hash.clone()).await?,
        None => password::verify_dummy_password(form.password, Argon2Params::from(&state.config.password)).await?,
    };

    let student = match student {
        Some(student) if valid => student,
        _ => {
            warn!("Failed login attempt");
            let page = state
                .templates
                .render("login.html", context! { email, error => INVALID_CREDENTIALS })?;
            return Ok(page.into_response());
        }
    };

    let current = CurrentStudent {
        id: student.id,
        email: student.email,
        name: student.name,
    };
    let token = session::create_session_token(&current, &state.config)?;
    info!(student_id = current.id, "Student logged in");

    Ok((
        [(header::SET_COOKIE, session::session_cookie(&token, &state.config))],
        Redirect::to("/profile"),
    )
        .into_response())
}

#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> Response {
    end_session(&state)
}

/// Clear the session cookie and send the browser to the login page
fn end_session(state: &AppState) -> Response {
    (
        [(header::SET_COOKIE, session::cleared_session_cookie(&state.config))],
        Redirect::to("/login"),
    )
        .into_response()
}

/// Whether the session's student still has a row. Cookies outlive deletions.
async fn student_exists(state: &AppState, id: StudentId) -> Result<bool> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Ok(Students::new(&mut conn).get_by_id(id).await?.is_some())
}

/// The logged-in student's details and files
#[tracing::instrument(skip_all, fields(student_id = %current.id))]
pub async fn profile(State(state): State<AppState>, current: CurrentStudent) -> Result<Response> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;

    let Some(student) = Students::new(&mut conn).get_by_id(current.id).await? else {
        // Deleted since the cookie was issued
        return Ok(end_session(&state));
    };

    let files: Vec<FileResponse> = Files::new(&mut conn)
        .list_for_student(student.id)
        .await?
        .into_iter()
        .map(FileResponse::from)
        .collect();
    drop(conn);

    let student = StudentResponse::from(student);
    Ok(state
        .templates
        .render("profile.html", context! { student, files })?
        .into_response())
}

/// Attach a file to the logged-in student
#[tracing::instrument(skip_all, fields(student_id = %current.id))]
pub async fn upload_profile_file(State(state): State<AppState>, current: CurrentStudent, multipart: Multipart) -> Result<Response> {
    if !student_exists(&state, current.id).await? {
        return Ok(end_session(&state));
    }

    let upload = read_multipart(multipart, state.config.uploads.max_file_size).await?;
    let file = upload.file.ok_or_else(|| Error::BadRequest {
        message: "Please choose a file to upload.".to_string(),
    })?;

    let stored = save_file(&state, file, Some(current.id)).await?;
    info!(file_id = stored.id, "Stored profile file");

    Ok(Redirect::to("/profile").into_response())
}

/// Delete one of the logged-in student's files
#[tracing::instrument(skip_all, fields(student_id = %current.id, file_id = %id))]
pub async fn delete_profile_file(State(state): State<AppState>, current: CurrentStudent, Path(id): Path<FileId>) -> Result<Response> {
    if !student_exists(&state, current.id).await? {
        return Ok(end_session(&state));
    }

    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut files = Files::new(&mut conn);

    let owned = files
        .get_summary(id)
        .await?
        .is_some_and(|file| file.student_id == Some(current.id));
    // Someone else's file looks the same as a missing one
    if !owned {
        return Err(Error::NotFound {
            resource: "File".to_string(),
            id: id.to_string(),
        });
    }

    files.delete(id).await?;
    info!("Deleted profile file");

    Ok(Redirect::to("/profile").into_response())
}
