//! End-to-end tests driving the full router with in-memory state.

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;
use crate::db::{self, NewUser, Role};
use crate::AppState;

use super::create_router;

const ADMIN_EMAIL: &str = "admin@x.com";
const ADMIN_PASSWORD: &str = "admin-pass";
const BOUNDARY: &str = "codev-test-boundary";

struct TestApp {
    router: Router,
    _uploads: TempDir,
}

struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
    raw: Vec<u8>,
}

async fn app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let uploads = TempDir::new().unwrap();

    let mut config = Config::default();
    config.session.secret = Some("test-session-secret".to_string());
    config.session.secure = false;
    config.storage.upload_dir = uploads.path().to_path_buf();
    config.rate_limit.enabled = false;
    configure(&mut config);

    let db = db::init_in_memory().await.unwrap();
    db::create_user(
        &db,
        &NewUser {
            email: ADMIN_EMAIL,
            first_name: "Ada",
            last_name: "Admin",
            password: ADMIN_PASSWORD,
            role: Role::Admin,
        },
    )
    .await
    .unwrap();

    let state = Arc::new(AppState::new(config, db));
    TestApp {
        router: create_router(state),
        _uploads: uploads,
    }
}

async fn app() -> TestApp {
    app_with(|_| {}).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let raw = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            raw,
        }
    }

    async fn json(&self, method: Method, uri: &str, cookie: Option<&str>, body: Value) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn multipart(
        &self,
        method: Method,
        uri: &str,
        cookie: &str,
        fields: &[(&str, &str)],
        files: &[(&str, &str, &[u8])],
    ) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .header(header::COOKIE, cookie)
            .body(Body::from(multipart_body(fields, files)))
            .unwrap();
        self.send(request).await
    }

    /// Log in and return the cookie pair to send back
    async fn login(&self, email: &str, password: &str, role: &str) -> String {
        let response = self
            .json(
                Method::POST,
                "/login",
                None,
                json!({ "email": email, "password": password, "role": role }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
        session_cookie(&response.headers)
    }

    async fn admin(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD, "admin").await
    }

    async fn register(&self, admin: &str, email: &str, role: &str) -> i64 {
        let response = self
            .json(
                Method::POST,
                "/register",
                Some(admin),
                json!({
                    "email": email,
                    "firstName": "First",
                    "lastName": "Last",
                    "password": "secret",
                    "role": role
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_i64().unwrap()
    }

    async fn create_course(&self, admin: &str, name: &str, teacher_id: i64) -> i64 {
        let teacher = teacher_id.to_string();
        let response = self
            .multipart(
                Method::POST,
                "/courses",
                admin,
                &[
                    ("name", name),
                    ("description", "Learn it"),
                    ("duration", "3"),
                    ("price", "100"),
                    ("teacher_id", teacher.as_str()),
                ],
                &[("preview_image", "cover.PNG", &b"png-bytes"[..])],
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_i64().unwrap()
    }

    async fn create_lesson(&self, cookie: &str, course_id: i64, name: &str) -> i64 {
        let response = self
            .json(
                Method::POST,
                "/lessons",
                Some(cookie),
                json!({ "name": name, "description": "first steps", "courseId": course_id }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_i64().unwrap()
    }

    async fn enroll(&self, admin: &str, course_id: i64, student_id: i64) -> TestResponse {
        self.json(
            Method::POST,
            &format!("/courses/{}/participants", course_id),
            Some(admin),
            json!({ "student_id": student_id, "course_duration": 3 }),
        )
        .await
    }
}

fn session_cookie(headers: &HeaderMap) -> String {
    headers
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn error_message(response: &TestResponse) -> &str {
    response.body["error"]["message"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.raw, &b"OK"[..]);
}

#[tokio::test]
async fn test_login_returns_snapshot_without_password() {
    let app = app().await;
    let response = app
        .json(
            Method::POST,
            "/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD, "role": "admin", "remember": true }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let user = &response.body["user"];
    assert_eq!(user["email"], ADMIN_EMAIL);
    assert_eq!(user["role"], "admin");
    assert!(user["lastLogin"].is_string());
    assert!(user.get("password_hash").is_none());
    assert!(user.get("passwordHash").is_none());

    let set_cookie = response.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age=2592000"));
}

#[tokio::test]
async fn test_plain_login_cookie_lasts_a_day() {
    let app = app().await;
    let response = app
        .json(
            Method::POST,
            "/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD, "role": "admin" }),
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let set_cookie = response.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=86400"), "{}", set_cookie);
}

#[tokio::test]
async fn test_malformed_json_body_is_a_bad_request() {
    let app = app().await;

    let response = app
        .json(Method::POST, "/login", None, json!({ "email": "a@x.com" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"]["code"], "bad_request");
    assert_eq!(error_message(&response), "Invalid request payload");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&response), "Invalid request payload");
}

#[tokio::test]
async fn test_failed_logins_share_one_message() {
    let app = app().await;

    let attempts = [
        json!({ "email": ADMIN_EMAIL, "password": "wrong", "role": "admin" }),
        json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD, "role": "teacher" }),
        json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD, "role": "wizard" }),
        json!({ "email": "nobody@x.com", "password": ADMIN_PASSWORD, "role": "admin" }),
    ];

    for attempt in attempts {
        let response = app.json(Method::POST, "/login", None, attempt).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(error_message(&response), "Invalid role or password");
        assert!(response.headers.get(header::SET_COOKIE).is_none());
    }
}

#[tokio::test]
async fn test_check_auth_and_logout() {
    let app = app().await;

    let response = app.get("/check_auth", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let cookie = app.admin().await;
    let response = app.get("/check_auth", Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], ADMIN_EMAIL);

    let response = app.get("/logout", Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::OK);
    let set_cookie = response.headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));

    let response = app.get("/check_auth", Some("session=garbage")).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_role_gates() {
    let app = app().await;
    let admin = app.admin().await;
    app.register(&admin, "s@x.com", "student").await;
    let student = app.login("s@x.com", "secret", "student").await;

    let response = app.get("/get_users?students=true", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app.get("/get_users?students=true", Some(&student)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.get("/leads", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.get("/get_users?students=true", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body.as_array().unwrap().len(), 1);
    assert_eq!(response.body[0]["email"], "s@x.com");
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = app().await;
    let admin = app.admin().await;
    app.register(&admin, "t@x.com", "teacher").await;

    let response = app
        .json(
            Method::POST,
            "/register",
            Some(&admin),
            json!({ "email": "t@x.com", "firstName": "A", "lastName": "B", "password": "x", "role": "teacher" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_change_password() {
    let app = app().await;
    let admin = app.admin().await;

    let response = app
        .json(
            Method::POST,
            "/change_password",
            Some(&admin),
            json!({ "old_password": "wrong", "new_password": "next-pass" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app
        .json(
            Method::POST,
            "/change_password",
            Some(&admin),
            json!({ "old_password": ADMIN_PASSWORD, "new_password": ADMIN_PASSWORD }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app
        .json(
            Method::POST,
            "/change_password",
            Some(&admin),
            json!({ "old_password": ADMIN_PASSWORD, "new_password": "next-pass" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    app.login(ADMIN_EMAIL, "next-pass", "admin").await;
}

#[tokio::test]
async fn test_delete_user() {
    let app = app().await;
    let admin = app.admin().await;
    let id = app.register(&admin, "gone@x.com", "student").await;
    let admin_id = app.get("/check_auth", Some(&admin)).await.body["user"]["id"]
        .as_i64()
        .unwrap();

    let response = app
        .json(Method::DELETE, &format!("/users/{}", admin_id), Some(&admin), json!({}))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.json(Method::DELETE, "/users/abc", Some(&admin), json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let uri = format!("/users/{}", id);
    let response = app.json(Method::DELETE, &uri, Some(&admin), json!({})).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.json(Method::DELETE, &uri, Some(&admin), json!({})).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_course_keeps_its_teacher() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;

    let response = app.get(&format!("/courses/{}", course_id), Some(&admin)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["teacherId"], teacher_id);
    assert_eq!(response.body["teacher"]["id"], teacher_id);
    assert!(response.body["previewImage"].as_str().unwrap().ends_with(".png"));

    let response = app.get("/courses/999", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_course_preview_must_be_an_image() {
    let app = app().await;
    let admin = app.admin().await;

    let response = app
        .multipart(
            Method::POST,
            "/courses",
            &admin,
            &[("name", "Rust"), ("description", "d"), ("duration", "3"), ("price", "1")],
            &[("preview_image", "cover.exe", &b"nope"[..])],
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_enrolled_student_sees_exactly_the_lesson() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    let student_id = app.register(&admin, "s@x.com", "student").await;
    app.register(&admin, "other@x.com", "student").await;

    let course_id = app.create_course(&admin, "Rust", teacher_id).await;
    let lesson_id = app.create_lesson(&admin, course_id, "Ownership").await;

    let response = app.enroll(&admin, course_id, student_id).await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

    let student = app.login("s@x.com", "secret", "student").await;
    let response = app.get(&format!("/lessons/{}", course_id), Some(&student)).await;
    assert_eq!(response.status, StatusCode::OK);
    let lessons = response.body.as_array().unwrap();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0]["id"], lesson_id);
    assert_eq!(lessons[0]["name"], "Ownership");

    let response = app.get("/courses", Some(&student)).await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);

    let outsider = app.login("other@x.com", "secret", "student").await;
    let response = app.get(&format!("/lessons/{}", course_id), Some(&outsider)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_teacher_manages_only_own_courses() {
    let app = app().await;
    let admin = app.admin().await;
    let owner_id = app.register(&admin, "owner@x.com", "teacher").await;
    app.register(&admin, "other@x.com", "teacher").await;
    let course_id = app.create_course(&admin, "Rust", owner_id).await;

    let owner = app.login("owner@x.com", "secret", "teacher").await;
    app.create_lesson(&owner, course_id, "Borrowing").await;

    let other = app.login("other@x.com", "secret", "teacher").await;
    let response = app
        .json(
            Method::POST,
            "/lessons",
            Some(&other),
            json!({ "name": "Hijack", "description": "", "courseId": course_id }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_duplicate_enrollment_conflicts() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    let student_id = app.register(&admin, "s@x.com", "student").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;

    assert_eq!(app.enroll(&admin, course_id, student_id).await.status, StatusCode::CREATED);
    assert_eq!(app.enroll(&admin, course_id, student_id).await.status, StatusCode::CONFLICT);

    let response = app.get(&format!("/courses/{}/participants", course_id), Some(&admin)).await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);
    assert_eq!(response.body[0]["firstName"], "First");

    let uri = format!("/courses/{}/participants/{}", course_id, student_id);
    assert_eq!(app.json(Method::DELETE, &uri, Some(&admin), json!({})).await.status, StatusCode::OK);
    assert_eq!(
        app.json(Method::DELETE, &uri, Some(&admin), json!({})).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_payment_updates_report_unmatched() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    let student_id = app.register(&admin, "s@x.com", "student").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;
    app.enroll(&admin, course_id, student_id).await;

    let response = app
        .json(
            Method::PUT,
            "/courses/update_user_payments",
            Some(&admin),
            json!([
                { "user_id": student_id, "course_id": course_id, "paid": true },
                { "user_id": student_id, "course_id": 999, "paid": true }
            ]),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["updated"], 1);
    assert_eq!(response.body["unmatched"][0]["course_id"], 999);

    let response = app
        .get(&format!("/courses/student_courses/{}", student_id), Some(&admin))
        .await;
    assert_eq!(response.body["user_id"], student_id);
    assert_eq!(response.body["courses"][0]["paid"], true);
    assert!(response.body["courses"][0]["paid_date"].is_string());
}

#[tokio::test]
async fn test_homework_submit_once_and_grade_once() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    let student_id = app.register(&admin, "s@x.com", "student").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;
    app.enroll(&admin, course_id, student_id).await;

    let teacher = app.login("t@x.com", "secret", "teacher").await;
    let lesson_id = app.create_lesson(&teacher, course_id, "Traits").await;
    let lesson = lesson_id.to_string();

    let student = app.login("s@x.com", "secret", "student").await;
    let response = app
        .multipart(
            Method::POST,
            "/lesson_tasks/homework",
            &student,
            &[("lessonId", lesson.as_str())],
            &[("homework_files", "my answer.rs", &b"fn main() {}"[..])],
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    assert_eq!(response.body["homework"][0], "my_answer.rs");
    let homework_id = response.body["id"].as_i64().unwrap();

    let response = app
        .multipart(
            Method::POST,
            "/lesson_tasks/homework",
            &student,
            &[("lessonId", lesson.as_str())],
            &[("homework_files", "again.rs", &b"fn main() {}"[..])],
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app
        .get(&format!("/lesson_tasks/list_homeworks/{}", lesson_id), Some(&teacher))
        .await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);
    assert_eq!(response.body[0]["user"]["email"], "s@x.com");

    let grade_uri = format!("/lesson_tasks/submissions/{}", homework_id);
    let response = app
        .json(Method::POST, &grade_uri, Some(&teacher), json!({ "points": "ninety" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(error_message(&response), "Invalid request payload");

    let response = app
        .json(Method::POST, &grade_uri, Some(&teacher), json!({ "points": 90, "comment": "good" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .json(Method::POST, &grade_uri, Some(&teacher), json!({ "points": 10, "comment": "bad" }))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app
        .get(&format!("/lesson_tasks/get_grades?lessonId={}", lesson_id), Some(&student))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["points"], 90);
    assert_eq!(response.body["comment"], "good");
    assert_eq!(response.body["checked"], true);

    let response = app
        .get(
            &format!("/lesson_tasks/get_grades?lessonId={}&userId={}", lesson_id, student_id + 100),
            Some(&student),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_only_the_course_teacher_grades() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    app.register(&admin, "other@x.com", "teacher").await;
    let student_id = app.register(&admin, "s@x.com", "student").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;
    app.enroll(&admin, course_id, student_id).await;
    let lesson = app.create_lesson(&admin, course_id, "Traits").await.to_string();

    let student = app.login("s@x.com", "secret", "student").await;
    let response = app
        .multipart(
            Method::POST,
            "/lesson_tasks/homework",
            &student,
            &[("lessonId", lesson.as_str())],
            &[("homework_files", "answer.rs", &b"fn main() {}"[..])],
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    let grade_uri = format!("/lesson_tasks/submissions/{}", response.body["id"]);

    let other = app.login("other@x.com", "secret", "teacher").await;
    let response = app
        .json(Method::POST, &grade_uri, Some(&other), json!({ "points": 5 }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let teacher = app.login("t@x.com", "secret", "teacher").await;
    let response = app
        .json(Method::POST, &grade_uri, Some(&teacher), json!({ "points": 80 }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["points"], 80);

    let response = app
        .json(Method::POST, "/lesson_tasks/submissions/999", Some(&teacher), json!({ "points": 80 }))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_homework_requires_enrollment() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    app.register(&admin, "s@x.com", "student").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;
    let lesson = app.create_lesson(&admin, course_id, "Traits").await.to_string();

    let student = app.login("s@x.com", "secret", "student").await;
    let response = app
        .multipart(
            Method::POST,
            "/lesson_tasks/homework",
            &student,
            &[("lessonId", lesson.as_str())],
            &[("homework_files", "a.rs", &b"x"[..])],
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_lesson_files_upload_and_download() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    let course_id = app.create_course(&admin, "Rust", teacher_id).await;
    let lesson_id = app.create_lesson(&admin, course_id, "Intro").await;
    let lesson = lesson_id.to_string();

    let response = app
        .multipart(
            Method::POST,
            "/lesson_tasks",
            &admin,
            &[("lessonId", lesson.as_str())],
            &[
                ("homework_files", "task 1.pdf", &b"hw"[..]),
                ("classwork_files", "slides.pdf", &b"cw"[..]),
            ],
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

    let response = app
        .multipart(
            Method::POST,
            "/lesson_tasks/screenrecord",
            &admin,
            &[("lessonId", lesson.as_str()), ("screenrecord_name", "lesson 1.mp4")],
            &[("screenrecord", "capture.mp4", &b"video"[..])],
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);

    let response = app.get(&format!("/lesson_tasks/{}", lesson_id), Some(&admin)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["lessonID"], lesson_id);
    assert_eq!(response.body["homework"], json!(["task_1.pdf"]));
    assert_eq!(response.body["classwork"], json!(["slides.pdf", "lesson_1.mp4"]));

    let response = app.get("/lesson_tasks/download/task_1.pdf", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.raw, &b"hw"[..]);
    assert_eq!(
        response.headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"task_1.pdf\""
    );
    assert_eq!(
        response.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );

    let response = app.get("/lesson_tasks/download/missing.pdf", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.get("/lesson_tasks/download/task_1.pdf", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_avatar_update() {
    let app = app().await;
    let admin = app.admin().await;

    let response = app
        .multipart(Method::PUT, "/avatar_update", &admin, &[], &[("avatar", "me.JPG", &b"jpg"[..])])
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let stored = response.body["success"].as_str().unwrap().to_string();
    assert!(stored.ends_with(".jpg"));

    let admin_id = app.get("/check_auth", Some(&admin)).await.body["user"]["id"]
        .as_i64()
        .unwrap();
    let response = app.get(&format!("/profile/{}", admin_id), Some(&admin)).await;
    assert_eq!(response.body["avatar"], stored);

    let response = app
        .multipart(Method::PUT, "/avatar_update", &admin, &[], &[("avatar", "me.gif", &b"gif"[..])])
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_leads_and_sales_flow() {
    let app = app().await;
    let admin = app.admin().await;
    let teacher_id = app.register(&admin, "t@x.com", "teacher").await;
    app.create_course(&admin, "Rust", teacher_id).await;
    app.register(&admin, "lead@x.com", "lead").await;
    app.register(&admin, "sales@x.com", "sales").await;

    let lead_user = app.login("lead@x.com", "secret", "lead").await;
    let lead = |phone: &str, author: &str, course: &str| {
        json!({
            "name": "Jane",
            "description": "interested",
            "date": "2025-03-01",
            "phone": phone,
            "igNick": "@jane",
            "status": "new",
            "source": "dm",
            "author": author,
            "course": course
        })
    };

    let response = app
        .json(Method::POST, "/leads", Some(&lead_user), lead("+79001234567", "lead@x.com", "Rust"))
        .await;
    assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
    let sales_id = response.body["sales"]["id"].as_i64().unwrap();

    let response = app
        .json(Method::POST, "/leads", Some(&lead_user), lead("+79001234567", "lead@x.com", "Rust"))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app
        .json(Method::POST, "/leads", Some(&lead_user), lead("+79007654321", "boss@x.com", "Rust"))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .json(Method::POST, "/leads", Some(&lead_user), lead("+79007654321", "lead@x.com", "Go"))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.get("/leads", Some(&lead_user)).await;
    assert_eq!(response.body.as_array().unwrap().len(), 1);

    let sales_user = app.login("sales@x.com", "secret", "sales").await;
    let response = app.get("/sales", Some(&sales_user)).await;
    assert_eq!(response.status, StatusCode::OK);
    let records = response.body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["lead"]["phone"], "+79001234567");
    assert_eq!(records[0]["course"]["name"], "Rust");

    let uri = format!("/sales/{}", sales_id);
    let response = app
        .json(Method::PUT, &uri, Some(&sales_user), json!({ "payed": true, "note": "call back" }))
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.body);
    assert_eq!(response.body["paid"], true);
    assert_eq!(response.body["note"], "call back");

    let response = app.json(Method::PUT, &uri, Some(&sales_user), json!({})).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = app.get(&uri, Some(&sales_user)).await;
    assert_eq!(response.body["paid"], true);

    let response = app.get("/sales/999", Some(&sales_user)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_seventh_rapid_login_is_rate_limited() {
    // Practically no refill while the six logins run
    let app = app_with(|config| {
        config.rate_limit.enabled = true;
        config.rate_limit.refill_per_second = 0.001;
    })
    .await;
    let attempt = json!({ "email": ADMIN_EMAIL, "password": "wrong", "role": "admin" });

    for _ in 0..6 {
        let response = app.json(Method::POST, "/login", None, attempt.clone()).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let response = app.json(Method::POST, "/login", None, attempt).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers.get(header::RETRY_AFTER).is_some());

    // Other endpoints do not draw from the bucket
    let response = app.get("/health", None).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limited_endpoint_recovers_after_refill() {
    let app = app_with(|config| {
        config.rate_limit.enabled = true;
        config.rate_limit.capacity = 1;
        config.rate_limit.refill_per_second = 4.0;
    })
    .await;
    let body = json!({ "old_password": "a", "new_password": "b" });

    let response = app.json(Method::POST, "/change_password", None, body.clone()).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = app.json(Method::POST, "/change_password", None, body.clone()).await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);

    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    let response = app.json(Method::POST, "/change_password", None, body).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cors_preflight_allows_configured_origin() {
    let app = app().await;
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/courses")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PATCH")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await;

    assert_eq!(response.status, StatusCode::OK);
    let headers = &response.headers;
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
    assert!(methods.contains("PATCH"));
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "43200");
}
