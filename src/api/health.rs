use actix_web::{HttpResponse, Responder, get, web};

/// Liveness check endpoint
///
/// Only says the process is up. The job API and S3 are not probed.
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain; charset=utf-8").body("ok")
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config.service(health_check);
}
