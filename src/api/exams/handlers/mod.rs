mod create;
mod list;
mod manage;

pub(super) use create::{create_exam, lookup_exam};
pub(super) use list::{delete_exam_results, list_exam_results, list_exams};
pub(super) use manage::{delete_exam, exam_status, get_exam, set_activation, update_exam};
