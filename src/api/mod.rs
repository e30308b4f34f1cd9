//! HTTP surface.
//!
//! Request field names are the web client's wire contract and are not
//! uniformly cased: lesson, lead, sales and registration bodies are
//! camelCase (`courseId`, `lessonId`, `igNick`), while password changes,
//! participants and payments stay snake_case (`old_password`,
//! `student_id`, `course_duration`).

pub mod access;
mod auth;
mod courses;
pub mod error;
mod homework;
mod leads;
mod lessons;
pub mod multipart;
pub mod rate_limit;
mod sales;
pub mod session;
mod users;
pub mod validation;

#[cfg(test)]
mod tests;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::AppState;

use self::error::ApiError;

/// Parse an id path segment into a positive integer
pub(crate) fn path_id(raw: &str) -> Result<i64, ApiError> {
    validation::parse_id(raw, "id").map_err(|e| ApiError::validation_field("id", e))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let origin = HeaderValue::from_str(&state.config.cors.allowed_origin).unwrap_or_else(|_| {
        tracing::warn!(
            origin = %state.config.cors.allowed_origin,
            "Invalid CORS origin, falling back to http://localhost:5173"
        );
        HeaderValue::from_static("http://localhost:5173")
    });

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(12 * 60 * 60))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Credential endpoints share the process-wide token bucket
    let credential_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/change_password", post(auth::change_password))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_auth,
        ));

    let account_routes = Router::new()
        .route("/check_auth", get(auth::check_auth))
        .route("/logout", get(auth::logout))
        .route("/register", post(auth::register))
        .route("/users/:id", delete(auth::delete_user))
        .route("/profile/:id", get(users::get_profile))
        .route("/avatar_update", put(users::update_avatar))
        .route("/get_users", get(users::get_users));

    let course_routes = Router::new()
        .route("/courses", get(courses::list_courses).post(courses::create_course))
        .route(
            "/courses/:id",
            get(courses::get_course).delete(courses::delete_course),
        )
        .route("/courses/student_courses/:id", get(courses::student_courses))
        .route(
            "/courses/update_user_payments",
            put(courses::update_user_payments),
        )
        .route(
            "/courses/:id/participants",
            get(courses::list_participants).post(courses::add_participant),
        )
        .route(
            "/courses/:id/participants/:student_id",
            delete(courses::remove_participant),
        );

    let lesson_routes = Router::new()
        .route("/lessons", post(lessons::create_lesson))
        .route(
            "/lessons/:id",
            get(lessons::list_lessons).delete(lessons::delete_lesson),
        )
        .route("/lesson_tasks", post(lessons::add_lesson_tasks))
        .route("/lesson_tasks/screenrecord", post(lessons::add_screenrecord))
        .route("/lesson_tasks/homework", post(homework::submit_homework))
        .route("/lesson_tasks/get_grades", get(homework::get_grades))
        .route("/lesson_tasks/download/:file", get(lessons::download_file))
        .route(
            "/lesson_tasks/list_homeworks/:id",
            get(homework::list_homeworks),
        )
        .route("/lesson_tasks/submissions/:id", post(homework::grade_homework))
        .route("/lesson_tasks/:id", get(lessons::get_lesson_tasks));

    let crm_routes = Router::new()
        .route("/leads", get(leads::list_leads).post(leads::create_lead))
        .route("/leads/:id", delete(leads::delete_lead))
        .route("/sales", get(sales::list_sales))
        .route("/sales/:id", get(sales::get_sales).put(sales::update_sales));

    let body_limit = state.config.storage.max_upload_mb.saturating_mul(1024 * 1024);

    Router::new()
        .route("/health", get(health_check))
        .merge(credential_routes)
        .merge(account_routes)
        .merge(course_routes)
        .merge(lesson_routes)
        .merge(crm_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
