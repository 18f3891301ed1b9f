use super::*;

#[post("/evaluate")]
pub async fn evaluate_handler(
    service: web::Data<JudgeService>,
    body: web::Json<EvaluateRequest>,
) -> impl Responder {
    let request = body.into_inner();
    log::info!(
        "Evaluate request for language {} with {} test cases",
        request.language,
        request.test_cases.len()
    );

    let response = service.evaluate(request).await;
    if let Some(status) = response.status {
        log::info!(
            "Evaluation finished: {status}, score {} ({}/{})",
            response.score,
            response.passed_tests,
            response.total_tests
        );
    }
    HttpResponse::Ok().json(response)
}
