use std::sync::Arc;

use tokio::sync::watch;

use crate::db::models::{Exam, ExamResult, Student};
use crate::db::store::{DocumentStore, MemoryStore};
use crate::repositories;
use crate::repositories::exams::CreateExam;
use crate::services::exam_access::{self, AccessError};
use crate::services::exam_codes;
use crate::services::DeskError;
use crate::session::{ResultSink, StoreResultSink};

/// The desk embedded in the same process as the session: exams and results
/// live in a shared [`DocumentStore`].
#[derive(Clone)]
pub struct LocalDesk {
    store: Arc<dyn DocumentStore>,
}

impl LocalDesk {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.store)
    }

    /// Stores `exam` under a fresh id. A blank or taken exam code is replaced
    /// by a generated one.
    pub async fn publish_exam(&self, exam: Exam) -> Result<Exam, DeskError> {
        let existing = repositories::exams::list(self.store.as_ref()).await?;
        let wanted = exam_codes::sanitize_code(&exam.exam_code);
        let taken = existing
            .iter()
            .any(|other| exam_codes::sanitize_code(&other.exam_code) == wanted);
        let exam_code = if wanted.is_empty() || taken {
            exam_codes::generate_unique_code(existing.iter().map(|other| other.exam_code.as_str()))
        } else {
            wanted
        };

        let created = repositories::exams::create(
            self.store.as_ref(),
            CreateExam {
                teacher_id: exam.teacher_id,
                subject: exam.subject,
                title: exam.title,
                questions: exam.questions,
                total_questions: exam.total_questions,
                time_limit: exam.time_limit,
                min_submit_time: exam.min_submit_time,
                is_active: exam.is_active,
                exam_code,
                require_fullscreen: exam.require_fullscreen,
                restricted_room: exam.restricted_room,
                restricted_grade: exam.restricted_grade,
                school_name: exam.school_name,
            },
        )
        .await?;

        tracing::info!(exam_id = %created.id, exam_code = %created.exam_code, "Exam published");
        Ok(created)
    }

    /// Resolves a typed exam code for `student`.
    pub async fn lookup(&self, code: &str, student: Option<&Student>) -> Result<Exam, DeskError> {
        let exam = repositories::exams::find_by_code(self.store.as_ref(), code)
            .await?
            .ok_or_else(|| AccessError::NotFound(exam_codes::sanitize_code(code)))?;
        exam_access::admit(
            &exam,
            student.map(|student| student.room.as_str()),
            student.map(|student| student.grade.as_str()),
        )?;
        Ok(exam)
    }

    pub async fn fetch_exam(&self, exam_id: &str) -> Result<Exam, DeskError> {
        repositories::exams::find_by_id(self.store.as_ref(), exam_id)
            .await?
            .ok_or_else(|| DeskError::ExamNotFound(exam_id.to_string()))
    }

    pub async fn set_exam_active(&self, exam_id: &str, active: bool) -> Result<Exam, DeskError> {
        let exam = repositories::exams::set_active(self.store.as_ref(), exam_id, active).await?;
        tracing::info!(exam_id = %exam.id, is_active = exam.is_active, "Exam activation changed");
        Ok(exam)
    }

    pub fn watch_exam_active(&self, exam: &Exam) -> watch::Receiver<bool> {
        repositories::exams::observe_active(self.store(), &exam.id, exam.is_active)
    }

    pub fn result_sink(&self) -> Arc<dyn ResultSink> {
        Arc::new(StoreResultSink::new(self.store()))
    }

    pub async fn results_for(&self, exam_id: &str) -> Result<Vec<ExamResult>, DeskError> {
        Ok(repositories::results::list_by_exam(self.store.as_ref(), exam_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn lookup_tells_missing_from_closed() {
        let desk = LocalDesk::in_memory();
        let mut exam = test_support::sample_exam(3, 3);
        exam.exam_code = "ab-12cd".into();
        exam.is_active = false;
        let exam = desk.publish_exam(exam).await.expect("publish");
        assert_eq!(exam.exam_code, "AB12CD");

        let missing = desk.lookup("zz9999", None).await.expect_err("missing");
        assert!(matches!(
            missing,
            DeskError::Access(AccessError::NotFound(code)) if code == "ZZ9999"
        ));

        let closed = desk.lookup(" ab12cd ", None).await.expect_err("closed");
        assert!(matches!(closed, DeskError::Access(AccessError::NotOpen(_))));

        desk.set_exam_active(&exam.id, true).await.expect("activate");
        let found = desk.lookup("ab12cd", None).await.expect("open");
        assert_eq!(found.id, exam.id);
    }

    #[tokio::test]
    async fn publish_replaces_taken_code() {
        let desk = LocalDesk::in_memory();
        let first = desk.publish_exam(test_support::sample_exam(3, 3)).await.expect("first");
        let second = desk.publish_exam(test_support::sample_exam(3, 3)).await.expect("second");

        assert_eq!(first.exam_code, "SCI101");
        assert_ne!(second.exam_code, first.exam_code);
        assert_eq!(second.exam_code.len(), exam_codes::EXAM_CODE_LEN);
    }

    #[tokio::test]
    async fn lookup_enforces_room_restriction() {
        let desk = LocalDesk::in_memory();
        let mut exam = test_support::sample_exam(3, 3);
        exam.restricted_room = Some("5/1".into());
        desk.publish_exam(exam).await.expect("publish");

        let allowed = test_support::sample_student("5/1");
        let other = test_support::sample_student("5/3");
        assert!(desk.lookup("SCI101", Some(&allowed)).await.is_ok());
        let err = desk.lookup("SCI101", Some(&other)).await.expect_err("restricted");
        assert!(matches!(err, DeskError::Access(AccessError::Restricted { field: "room", .. })));
    }

    #[tokio::test]
    async fn activity_feed_follows_teacher_toggle() {
        let desk = LocalDesk::in_memory();
        let exam = desk.publish_exam(test_support::sample_exam(3, 3)).await.expect("publish");
        let mut active = desk.watch_exam_active(&exam);
        assert!(*active.borrow());

        desk.set_exam_active(&exam.id, false).await.expect("close");
        active.changed().await.expect("change");
        assert!(!*active.borrow());
    }
}
