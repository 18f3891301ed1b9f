mod evaluate;
mod execute;
mod languages;

pub use evaluate::evaluate_handler;
pub use execute::execute_handler;
pub use languages::get_languages_handler;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse, Responder, get, post, web};
use serde::Serialize;

use crate::service::{EvaluateRequest, ExecuteRequest, JudgeService};

#[derive(Serialize)]
struct ErrorResponse {
    reason: &'static str,
    code: u32,
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    log::warn!("Rejected request body: {err}");
    let response = HttpResponse::BadRequest().json(ErrorResponse {
        reason: "ERR_INVALID_ARGUMENT",
        code: 1,
    });
    InternalError::from_response(err, response).into()
}

/// Registers every route of the service on an actix `App`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(execute_handler)
        .service(evaluate_handler)
        .service(get_languages_handler);
}
