mod handlers;
mod helpers;
mod queries;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_exam).get(handlers::list_exams))
        .route("/lookup", post(handlers::lookup_exam))
        .route(
            "/:exam_id",
            get(handlers::get_exam).patch(handlers::update_exam).delete(handlers::delete_exam),
        )
        .route("/:exam_id/status", get(handlers::exam_status))
        .route("/:exam_id/activation", post(handlers::set_activation))
        .route(
            "/:exam_id/results",
            get(handlers::list_exam_results).delete(handlers::delete_exam_results),
        )
}
