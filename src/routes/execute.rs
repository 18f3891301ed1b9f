use super::*;

#[post("/execute")]
pub async fn execute_handler(
    service: web::Data<JudgeService>,
    body: web::Json<ExecuteRequest>,
) -> impl Responder {
    let request = body.into_inner();
    log::info!("Execute request for language {}", request.language);

    let response = service.execute(request).await;
    HttpResponse::Ok().json(response)
}
