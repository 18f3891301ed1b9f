use super::*;

#[get("/languages")]
pub async fn get_languages_handler(service: web::Data<JudgeService>) -> impl Responder {
    HttpResponse::Ok().json(service.languages().names())
}
