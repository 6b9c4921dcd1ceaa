use thiserror::Error;

use crate::db::models::Exam;

/// Why a student cannot open an exam they typed the code for.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("no exam matches code '{0}'")]
    NotFound(String),
    #[error("exam '{0}' is not open")]
    NotOpen(String),
    #[error("exam is limited to {field} {expected}")]
    Restricted { field: &'static str, expected: String },
}

/// Decides whether a student in `room`/`grade` may start `exam`.
///
/// Restrictions are only enforced when the caller supplies the matching
/// student field; comparison ignores case and surrounding whitespace.
pub fn admit(exam: &Exam, room: Option<&str>, grade: Option<&str>) -> Result<(), AccessError> {
    if !exam.is_active {
        return Err(AccessError::NotOpen(exam.exam_code.clone()));
    }
    check_restriction("room", exam.restricted_room.as_deref(), room)?;
    check_restriction("grade", exam.restricted_grade.as_deref(), grade)?;
    Ok(())
}

fn check_restriction(
    field: &'static str,
    expected: Option<&str>,
    actual: Option<&str>,
) -> Result<(), AccessError> {
    let Some(expected) = expected.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(());
    };
    match actual {
        Some(actual) if !actual.trim().eq_ignore_ascii_case(expected) => {
            Err(AccessError::Restricted { field, expected: expected.to_string() })
        }
        _ => Ok(()),
    }
}
