use std::sync::{Arc, OnceLock};

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{bootstrap, config::Settings, state::AppState};
use crate::db::models::{Exam, Question, Student, StudentAnswer, Teacher};
use crate::db::store::{DocumentStore, MemoryStore};
use crate::repositories;
use crate::repositories::exams::CreateExam;
use crate::repositories::results::CreateResult;
use crate::repositories::teachers::CreateTeacher;

pub(crate) const TEST_ADMIN_PASSWORD: &str = "admin-pass";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _guard: OwnedMutexGuard<()>,
}

impl TestContext {
    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.state.store()
    }
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("EXAMDESK_ENV", "test");
    std::env::set_var("EXAMDESK_STRICT_CONFIG", "0");
    std::env::set_var("ADMIN_PASSWORD", TEST_ADMIN_PASSWORD);
    std::env::set_var("PROMETHEUS_ENABLED", "0");
    std::env::remove_var("BACKEND_CORS_ORIGINS");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("INTEGRITY_GRACE_SECONDS");
    std::env::remove_var("INTEGRITY_RESIZE_DEBOUNCE_MS");
    std::env::remove_var("INTEGRITY_RESIZE_THRESHOLD_PERCENT");
    std::env::remove_var("INTEGRITY_BASELINE_SETTLE_MS");
    std::env::remove_var("SESSION_CHANNEL_NAME");
    std::env::remove_var("DESK_URL");
    std::env::remove_var("DESK_POLL_INTERVAL_SECONDS");
    std::env::remove_var("DESK_REQUEST_TIMEOUT_SECONDS");
}

pub(crate) async fn setup_test_context() -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let settings = Settings::load().expect("settings");
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let state = AppState::new(settings, store);
    bootstrap::ensure_app_config(&state).await.expect("app config");
    let app = api::router::router(state.clone());

    TestContext { state, app, _guard: guard }
}

/// `bank_size` questions `q0..`, each with correct answer `i % 4`.
pub(crate) fn sample_exam(bank_size: usize, total_questions: u32) -> Exam {
    Exam {
        id: "exam-1".into(),
        teacher_id: "teacher-1".into(),
        subject: "Science".into(),
        title: "Unit test".into(),
        questions: (0..bank_size).map(sample_question).collect(),
        total_questions,
        time_limit: 10,
        min_submit_time: 0,
        is_active: true,
        exam_code: "SCI101".into(),
        require_fullscreen: false,
        restricted_room: None,
        restricted_grade: None,
        school_name: None,
    }
}

fn sample_question(index: usize) -> Question {
    Question {
        id: format!("q{index}"),
        question_text: format!("Question {index}"),
        options: [
            format!("{index}-a"),
            format!("{index}-b"),
            format!("{index}-c"),
            format!("{index}-d"),
        ],
        correct_answer_index: (index % 4) as u8,
    }
}

pub(crate) fn sample_student(room: &str) -> Student {
    Student {
        prefix: "ด.ช.".into(),
        first_name: "Somchai".into(),
        last_name: "Jaidee".into(),
        grade: "M.5".into(),
        room: room.into(),
        number: "12".into(),
    }
}

pub(crate) fn create_exam(teacher_id: &str, exam_code: &str) -> CreateExam {
    let exam = sample_exam(5, 3);
    CreateExam {
        teacher_id: teacher_id.into(),
        subject: exam.subject,
        title: exam.title,
        questions: exam.questions,
        total_questions: exam.total_questions,
        time_limit: exam.time_limit,
        min_submit_time: exam.min_submit_time,
        is_active: true,
        exam_code: exam_code.into(),
        require_fullscreen: false,
        restricted_room: None,
        restricted_grade: None,
        school_name: None,
    }
}

pub(crate) fn create_result(exam_id: &str, room: &str) -> CreateResult {
    CreateResult {
        exam_id: exam_id.into(),
        student: sample_student(room),
        score: 1,
        total: 3,
        answers: vec![
            StudentAnswer { question_id: "q0".into(), selected_answer_index: Some(0) },
            StudentAnswer::unanswered("q1"),
            StudentAnswer { question_id: "q2".into(), selected_answer_index: Some(3) },
        ],
    }
}

pub(crate) async fn insert_teacher(
    store: &dyn DocumentStore,
    email: &str,
    password: &str,
    approved: bool,
) -> Teacher {
    repositories::teachers::create(
        store,
        CreateTeacher {
            name: "Kru Malee".into(),
            email: email.into(),
            password: password.into(),
            school_name: Some("Wat Pho School".into()),
            approved,
        },
    )
    .await
    .expect("insert teacher")
}

pub(crate) fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

pub(crate) fn admin_auth() -> String {
    basic_auth("admin", TEST_ADMIN_PASSWORD)
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    authorization: Option<&str>,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(authorization) = authorization {
        builder = builder.header(header::AUTHORIZATION, authorization);
    }

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
