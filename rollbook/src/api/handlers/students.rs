//! Student pages: listing, search, registration, verification, editing and deletion.

use axum::{
    Form,
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use minijinja::context;
use tracing::{info, instrument};

use crate::{
    AppState,
    api::{
        handlers::files::{read_multipart, save_file},
        models::{
            files::FileResponse,
            students::{SearchQuery, StudentForm, StudentResponse, VerifyForm},
        },
    },
    auth::password::{self, Argon2Params},
    db::{
        errors::DbError,
        handlers::{Files, Repository, StudentFilter, Students},
        models::students::{StudentCreateDBRequest, StudentDBResponse, StudentUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{StudentAction, StudentId},
};

const DUPLICATE_EMAIL: &str = "This email is already registered.";

/// Validate, hash and store a new student, then send the welcome SMS.
///
/// Shared by the registration form and spreadsheet import.
#[instrument(skip_all, fields(email = %form.email), err)]
pub async fn create_student(state: &AppState, form: StudentForm) -> Result<StudentDBResponse> {
    form.validate(&state.config.password, true)?;

    let password_hash = password::hash_password(form.password, Argon2Params::from(&state.config.password)).await?;

    let student = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Students::new(&mut conn)
            .create(&StudentCreateDBRequest {
                name: form.name,
                email: form.email,
                phone: form.phone,
                password_hash,
            })
            .await?
    };
    info!(student_id = student.id, "Registered student");

    state
        .sms
        .notify_student(StudentAction::Registered, &student.name, &student.phone)
        .await;

    Ok(student)
}

async fn find_student(state: &AppState, id: StudentId) -> Result<StudentDBResponse> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Students::new(&mut conn).get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "Student".to_string(),
        id: id.to_string(),
    })
}

async fn render_list(state: &AppState, filter: StudentFilter) -> Result<Html<String>> {
    let query = filter.search.clone().unwrap_or_default();
    let students: Vec<StudentResponse> = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Students::new(&mut conn)
            .list(&filter)
            .await?
            .into_iter()
            .map(StudentResponse::from)
            .collect()
    };

    state.templates.render("students.html", context! { students, query })
}

/// Student list (`/` and `/students/`)
#[tracing::instrument(skip_all)]
pub async fn list_students(State(state): State<AppState>) -> Result<Html<String>> {
    render_list(&state, StudentFilter::new()).await
}

/// Students whose name or email contains the query
#[tracing::instrument(skip_all, fields(query = %params.query))]
pub async fn search_students(State(state): State<AppState>, Query(params): Query<SearchQuery>) -> Result<Html<String>> {
    render_list(&state, StudentFilter::new().search(params.query)).await
}

fn render_register(state: &AppState, form: &StudentForm, error: Option<String>) -> Result<Html<String>> {
    state.templates.render("register.html", context! { form, error })
}

#[tracing::instrument(skip_all)]
pub async fn register_form(State(state): State<AppState>) -> Result<Html<String>> {
    render_register(&state, &StudentForm::default(), None)
}

/// Register a student from the multipart form, storing the optional attachment against them
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, multipart: Multipart) -> Result<Response> {
    let upload = read_multipart(multipart, state.config.uploads.max_file_size).await?;
    let form = StudentForm {
        name: upload.text("name"),
        email: upload.text("email"),
        phone: upload.text("phone"),
        password: upload.text("password"),
    }
    .normalized();

    if let Some(file) = &upload.file
        && let Err(Error::BadRequest { message }) = file.validate()
    {
        return Ok(render_register(&state, &form, Some(message))?.into_response());
    }

    let student = match create_student(&state, form.clone()).await {
        Ok(student) => student,
        Err(Error::BadRequest { message }) => return Ok(render_register(&state, &form, Some(message))?.into_response()),
        Err(Error::Database(e)) if e.is_duplicate_email() => {
            return Ok(render_register(&state, &form, Some(DUPLICATE_EMAIL.to_string()))?.into_response());
        }
        Err(e) => return Err(e),
    };

    if let Some(file) = upload.file {
        save_file(&state, file, Some(student.id)).await?;
    }

    Ok(Redirect::to("/").into_response())
}

async fn list_files(state: &AppState, student_id: StudentId) -> Result<Vec<FileResponse>> {
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Ok(Files::new(&mut conn)
        .list_for_student(student_id)
        .await?
        .into_iter()
        .map(FileResponse::from)
        .collect())
}

/// Password prompt in front of a student's details
#[tracing::instrument(skip_all, fields(student_id = %id))]
pub async fn verify_form(State(state): State<AppState>, Path(id): Path<StudentId>) -> Result<Html<String>> {
    let student = StudentResponse::from(find_student(&state, id).await?);
    state.templates.render("student_password.html", context! { student })
}

#[tracing::instrument(skip_all, fields(student_id = %id))]
pub async fn verify(State(state): State<AppState>, Path(id): Path<StudentId>, Form(form): Form<VerifyForm>) -> Result<Html<String>> {
    let stored = find_student(&state, id).await?;
    let valid = password::verify_password(form.password, stored.password_hash.clone()).await?;
    let student = StudentResponse::from(stored);

    if !valid {
        return state.templates.render(
            "student_password.html",
            context! { student, error => "Incorrect password." },
        );
    }

    let files = list_files(&state, id).await?;
    state.templates.render("student_detail.html", context! { student, files })
}

fn render_edit(state: &AppState, student_id: StudentId, form: &StudentForm, error: Option<String>) -> Result<Html<String>> {
    state
        .templates
        .render("edit_student.html", context! { student_id, form, error })
}

#[tracing::instrument(skip_all, fields(student_id = %id))]
pub async fn edit_form(State(state): State<AppState>, Path(id): Path<StudentId>) -> Result<Html<String>> {
    let student = StudentResponse::from(find_student(&state, id).await?);
    render_edit(&state, id, &StudentForm::from(&student), None)
}

/// Update a student. A blank password keeps the current one.
#[tracing::instrument(skip_all, fields(student_id = %id))]
pub async fn edit(State(state): State<AppState>, Path(id): Path<StudentId>, Form(form): Form<StudentForm>) -> Result<Response> {
    let form = form.normalized();

    match form.validate(&state.config.password, false) {
        Ok(()) => {}
        Err(Error::BadRequest { message }) => return Ok(render_edit(&state, id, &form, Some(message))?.into_response()),
        Err(e) => return Err(e),
    }

    let password_hash = if form.password.is_empty() {
        None
    } else {
        Some(password::hash_password(form.password.clone(), Argon2Params::from(&state.config.password)).await?)
    };

    let updated = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Students::new(&mut conn)
            .update(
                id,
                &StudentUpdateDBRequest {
                    name: form.name.clone(),
                    email: form.email.clone(),
                    phone: form.phone.clone(),
                    password_hash,
                },
            )
            .await
    };

    let student = match updated {
        Ok(student) => student,
        Err(DbError::NotFound) => {
            return Err(Error::NotFound {
                resource: "Student".to_string(),
                id: id.to_string(),
            });
        }
        Err(e) if e.is_duplicate_email() => {
            return Ok(render_edit(&state, id, &form, Some(DUPLICATE_EMAIL.to_string()))?.into_response());
        }
        Err(e) => return Err(e.into()),
    };
    info!("Updated student");

    state
        .sms
        .notify_student(StudentAction::Updated, &student.name, &student.phone)
        .await;

    Ok(Redirect::to("/").into_response())
}

/// Delete a student, texting them first. Unknown ids are ignored.
#[tracing::instrument(skip_all, fields(student_id = %id))]
pub async fn delete_student(State(state): State<AppState>, Path(id): Path<StudentId>) -> Result<Redirect> {
    let existing = {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Students::new(&mut conn).get_by_id(id).await?
    };

    if let Some(student) = existing {
        state
            .sms
            .notify_student(StudentAction::Deleted, &student.name, &student.phone)
            .await;

        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Students::new(&mut conn).delete(id).await?;
        info!("Deleted student");
    }

    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Application,
        config::DatabaseConfig,
        test_utils::{
            create_test_app, create_test_app_with_config, create_test_config, create_test_student, multipart_student,
            twilio_sms_config,
        },
    };
    use axum::http::StatusCode;
    use axum_test::{TestServer, multipart::Part};
    use sqlx::SqlitePool;
    use std::{
        collections::HashMap,
        path::PathBuf,
        sync::{Arc, Mutex},
    };
    use wiremock::{
        Mock, MockServer, Respond, ResponseTemplate,
        matchers::{method, path},
    };

    const TWILIO_MESSAGES_PATH: &str = "/2010-04-01/Accounts/AC123/Messages.json";

    fn twilio_created() -> ResponseTemplate {
        ResponseTemplate::new(201).set_body_json(serde_json::json!({"sid": "SM1", "status": "queued"}))
    }

    /// A test app whose notifications go to a mock Twilio
    async fn create_app_with_twilio() -> (TestServer, AppState, MockServer) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TWILIO_MESSAGES_PATH))
            .respond_with(twilio_created())
            .mount(&mock_server)
            .await;

        let mut config = create_test_config();
        config.sms = twilio_sms_config(&mock_server.uri());
        let (server, state) = create_test_app_with_config(config).await;
        (server, state, mock_server)
    }

    /// Decoded form bodies of every message the mock Twilio received
    async fn sent_messages(mock_server: &MockServer) -> Vec<HashMap<String, String>> {
        mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| serde_urlencoded::from_bytes(&request.body).unwrap())
            .collect()
    }

    async fn get_student(state: &AppState, id: StudentId) -> Option<StudentDBResponse> {
        let mut conn = state.db.acquire().await.unwrap();
        Students::new(&mut conn).get_by_id(id).await.unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_list_and_search() {
        let (server, state) = create_test_app().await;
        create_test_student(&state.db, "alice@example.com", "pass1123").await;
        create_test_student(&state.db, "bob@school.org", "pass1123").await;

        let response = server.get("/").await;
        response.assert_status_ok();
        let page = response.text();
        assert!(page.contains("alice@example.com"));
        assert!(page.contains("bob@school.org"));

        server.get("/students/").await.assert_status_ok();

        let page = server.get("/students/search/").add_query_param("query", "SCHOOL").await.text();
        assert!(page.contains("bob@school.org"));
        assert!(!page.contains("alice@example.com"));
        assert!(page.contains("value=\"SCHOOL\""));

        // Missing query lists everyone
        let page = server.get("/students/search/").await.text();
        assert!(page.contains("alice@example.com"));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_creates_student_and_attachment() {
        let (server, state) = create_test_app().await;

        let form = multipart_student("Ada", "ada@example.com", "9123456789", "pass1123")
            .add_part("file", Part::bytes(b"%PDF-1.4".to_vec()).file_name("cv.pdf").mime_type("application/pdf"));

        let response = server.post("/register").multipart(form).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/");

        let mut conn = state.db.acquire().await.unwrap();
        let student = Students::new(&mut conn).get_by_email("ada@example.com").await.unwrap().unwrap();
        assert_eq!(student.name, "Ada");
        assert!(student.password_hash.starts_with("$argon2id$"));

        let files = Files::new(&mut conn).list_for_student(student.id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "cv.pdf");
        assert_eq!(files[0].content_type, "application/pdf");
    }

    #[test_log::test(tokio::test)]
    async fn test_register_ignores_empty_file_part() {
        let (server, state) = create_test_app().await;

        let form = multipart_student("Ada", "ada@example.com", "9123456789", "pass1123")
            .add_part("file", Part::bytes(Vec::new()).file_name("").mime_type("application/octet-stream"));
        server.post("/register").multipart(form).await.assert_status(StatusCode::SEE_OTHER);

        let mut conn = state.db.acquire().await.unwrap();
        let student = Students::new(&mut conn).get_by_email("ada@example.com").await.unwrap().unwrap();
        assert!(Files::new(&mut conn).list_for_student(student.id).await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_register_duplicate_email_rerenders_form() {
        let (server, state) = create_test_app().await;
        create_test_student(&state.db, "taken@example.com", "pass1123").await;

        let response = server
            .post("/register")
            .multipart(multipart_student("Someone", "Taken@Example.com", "9123456789", "pass1123"))
            .await;

        response.assert_status_ok();
        let page = response.text();
        assert!(page.contains("This email is already registered."));
        // Entered values are kept
        assert!(page.contains("value=\"Someone\""));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_validation_error_rerenders_form() {
        let (server, _state) = create_test_app().await;

        let response = server
            .post("/register")
            .multipart(multipart_student("", "ada@example.com", "9123456789", "pass1123"))
            .await;

        response.assert_status_ok();
        assert!(response.text().contains("Name is required."));
    }

    #[test_log::test(tokio::test)]
    async fn test_register_rejects_oversized_attachment() {
        let (server, state) = create_test_app().await;
        let too_big = vec![b'x'; state.config.uploads.max_file_size + 1];

        let form = multipart_student("Ada", "ada@example.com", "9123456789", "pass1123")
            .add_part("file", Part::bytes(too_big).file_name("big.bin"));
        server
            .post("/register")
            .multipart(form)
            .await
            .assert_status(StatusCode::PAYLOAD_TOO_LARGE);

        assert!(get_student(&state, 1).await.is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_verify_student_password() {
        let (server, state) = create_test_app().await;
        let student = create_test_student(&state.db, "ada@example.com", "pass1123").await;

        server.get(&format!("/student/{}/verify", student.id)).await.assert_status_ok();
        server.get("/student/999/verify").await.assert_status_not_found();

        let wrong = server
            .post(&format!("/student/{}/verify", student.id))
            .form(&[("password", "nope")])
            .await;
        wrong.assert_status_ok();
        assert!(wrong.text().contains("Incorrect password."));

        let right = server
            .post(&format!("/student/{}/verify", student.id))
            .form(&[("password", "pass1123")])
            .await;
        right.assert_status_ok();
        let page = right.text();
        assert!(page.contains("ada@example.com"));
        assert!(!page.contains("Incorrect password."));
    }

    #[test_log::test(tokio::test)]
    async fn test_edit_student() {
        let (server, state) = create_test_app().await;
        let student = create_test_student(&state.db, "ada@example.com", "pass1123").await;

        let page = server.get(&format!("/student/{}/edit/", student.id)).await.text();
        assert!(page.contains("value=\"ada@example.com\""));

        let response = server
            .post(&format!("/student/{}/edit/", student.id))
            .form(&[
                ("name", "Ada King"),
                ("email", "ada.king@example.com"),
                ("phone", "9000000000"),
                ("password", ""),
            ])
            .await;
        response.assert_status(StatusCode::SEE_OTHER);

        let updated = get_student(&state, student.id).await.unwrap();
        assert_eq!(updated.name, "Ada King");
        assert_eq!(updated.email, "ada.king@example.com");
        // Blank password keeps the old hash
        assert_eq!(updated.password_hash, student.password_hash);
    }

    #[test_log::test(tokio::test)]
    async fn test_edit_changes_password() {
        let (server, state) = create_test_app().await;
        let student = create_test_student(&state.db, "ada@example.com", "pass1123").await;

        server
            .post(&format!("/student/{}/edit/", student.id))
            .form(&[
                ("name", "Ada"),
                ("email", "ada@example.com"),
                ("phone", "9000000000"),
                ("password", "newpass99"),
            ])
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let updated = get_student(&state, student.id).await.unwrap();
        assert!(password::verify_string("newpass99", &updated.password_hash).unwrap());
    }

    #[test_log::test(tokio::test)]
    async fn test_edit_duplicate_email_and_unknown_student() {
        let (server, state) = create_test_app().await;
        create_test_student(&state.db, "taken@example.com", "pass1123").await;
        let student = create_test_student(&state.db, "ada@example.com", "pass1123").await;

        let fields = [
            ("name", "Ada"),
            ("email", "taken@example.com"),
            ("phone", "9000000000"),
            ("password", ""),
        ];

        let response = server.post(&format!("/student/{}/edit/", student.id)).form(&fields).await;
        response.assert_status_ok();
        assert!(response.text().contains("This email is already registered."));

        server.get("/student/999/edit/").await.assert_status_not_found();
        server.post("/student/999/edit/").form(&fields).await.assert_status_not_found();
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_student() {
        let (server, state) = create_test_app().await;
        let student = create_test_student(&state.db, "ada@example.com", "pass1123").await;

        let response = server.get(&format!("/student/{}/delete", student.id)).await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/");
        assert!(get_student(&state, student.id).await.is_none());

        // Unknown ids still redirect
        server.post("/student/999/delete").await.assert_status(StatusCode::SEE_OTHER);
    }

    #[test_log::test(tokio::test)]
    async fn test_register_sends_welcome_sms() {
        let (server, _state, mock_server) = create_app_with_twilio().await;

        server
            .post("/register")
            .multipart(multipart_student("Ada", "ada@example.com", "9123456789", "pass1123"))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let messages = sent_messages(&mock_server).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["To"], "+919123456789");
        assert_eq!(messages[0]["From"], "+15005550006");
        assert_eq!(
            messages[0]["Body"],
            "Hi Ada, welcome! Your registration is successful in the Test School."
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_edit_sends_update_sms_with_new_details() {
        let (server, state, mock_server) = create_app_with_twilio().await;
        let student = create_test_student(&state.db, "ada@example.com", "pass1123").await;

        server
            .post(&format!("/student/{}/edit/", student.id))
            .form(&[
                ("name", "Ada King"),
                ("email", "ada@example.com"),
                ("phone", "9000000000"),
                ("password", ""),
            ])
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let messages = sent_messages(&mock_server).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["To"], "+919000000000");
        assert_eq!(messages[0]["Body"], "Hi Ada King, your student profile has been updated.");
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_requests_send_no_sms() {
        let (server, state, mock_server) = create_app_with_twilio().await;
        create_test_student(&state.db, "taken@example.com", "pass1123").await;

        server.get("/student/999/delete").await.assert_status(StatusCode::SEE_OTHER);
        server.post("/student/999/delete").await.assert_status(StatusCode::SEE_OTHER);

        let duplicate = server
            .post("/register")
            .multipart(multipart_student("Someone", "taken@example.com", "9123456789", "pass1123"))
            .await;
        duplicate.assert_status_ok();
        assert!(duplicate.text().contains("This email is already registered."));

        let invalid = server
            .post("/register")
            .multipart(multipart_student("", "new@example.com", "9123456789", "pass1123"))
            .await;
        invalid.assert_status_ok();
        assert!(invalid.text().contains("Name is required."));

        assert!(sent_messages(&mock_server).await.is_empty());
    }

    /// Answers like Twilio, recording whether the student row still existed when the message arrived
    struct RecordStudentPresence {
        database_url: String,
        student_id: StudentId,
        present: Arc<Mutex<Option<bool>>>,
    }

    impl Respond for RecordStudentPresence {
        fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
            let url = self.database_url.clone();
            let id = self.student_id;
            // A separate connection on its own runtime, since this runs inside the mock server
            let present = std::thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
                runtime.block_on(async move {
                    let pool = SqlitePool::connect(&url).await.unwrap();
                    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE id = ?")
                        .bind(id)
                        .fetch_one(&pool)
                        .await
                        .unwrap();
                    pool.close().await;
                    count == 1
                })
            })
            .join()
            .unwrap();

            *self.present.lock().unwrap() = Some(present);
            twilio_created()
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_delete_texts_stored_details_before_removing_student() {
        let dir: PathBuf = std::env::temp_dir().join(format!("rollbook-delete-sms-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let db_path = dir.join("students.db");
        let _ = std::fs::remove_file(&db_path);
        let database_url = format!("sqlite://{}", db_path.display());

        let pool = crate::setup_database(&DatabaseConfig {
            url: database_url.clone(),
            ..Default::default()
        })
        .await
        .unwrap();
        let student = create_test_student(&pool, "ada@example.com", "pass1123").await;

        let present = Arc::new(Mutex::new(None));
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TWILIO_MESSAGES_PATH))
            .respond_with(RecordStudentPresence {
                database_url,
                student_id: student.id,
                present: present.clone(),
            })
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut config = create_test_config();
        config.sms = twilio_sms_config(&mock_server.uri());
        let server = Application::new_with_pool(config, pool.clone()).unwrap().into_test_server();

        server
            .post(&format!("/student/{}/delete", student.id))
            .await
            .assert_status(StatusCode::SEE_OTHER);

        let messages = sent_messages(&mock_server).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["To"], "+919123456789");
        assert_eq!(
            messages[0]["Body"],
            "Hi Test Student, your student profile has been deleted from the system."
        );
        assert_eq!(*present.lock().unwrap(), Some(true));

        let mut conn = pool.acquire().await.unwrap();
        assert!(Students::new(&mut conn).get_by_id(student.id).await.unwrap().is_none());
        drop(conn);

        pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
