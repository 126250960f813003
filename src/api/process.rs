use std::borrow::Cow;

use actix_web::{HttpResponse, Responder, web};
use actix_web_validator::Query;
use serde::Deserialize;
use tracing::info;
use validator::{Validate, ValidationError};

use crate::job_api::is_dot_segment;
use crate::worker::PipelineRunner;

/// Query string of the process trigger
#[derive(Debug, Deserialize, Validate)]
pub struct ProcessQuery {
    #[serde(rename = "jobId")]
    #[validate(
        length(min = 1, message = "missing jobId"),
        custom(function = "validate_job_id_segment")
    )]
    pub job_id: String,
}

/// The job id becomes one path segment of the job API URL
fn validate_job_id_segment(job_id: &str) -> Result<(), ValidationError> {
    if is_dot_segment(job_id) {
        let mut err = ValidationError::new("dot_segment");
        err.message = Some(Cow::from("jobId cannot be '.' or '..'"));
        return Err(err);
    }
    Ok(())
}

/// Start a pipeline run for `jobId` and return without waiting for it
///
/// Every accepted call starts a new run, even for a job id that is already
/// being processed.
async fn process(runner: web::Data<PipelineRunner>, query: Query<ProcessQuery>) -> impl Responder {
    let job_id = query.into_inner().job_id;
    info!("Accepted job {} for processing", job_id);

    let runner = runner.into_inner();
    let run_id = job_id.clone();
    tokio::spawn(async move {
        runner.run(&run_id).await;
    });

    HttpResponse::Accepted()
        .content_type("text/plain; charset=utf-8")
        .body(format!("started processing job {}\n", job_id))
}

pub fn process_config(config: &mut web::ServiceConfig) {
    config.service(
        web::resource("/process")
            .route(web::get().to(process))
            .route(web::post().to(process)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::validation;
    use crate::job_api::JobApiClient;
    use actix_web::{App, http::StatusCode, test};
    use tokio::time::{Duration, sleep};
    use url::Url;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn job_api() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    fn runner_for(server: &MockServer) -> web::Data<PipelineRunner> {
        let client = JobApiClient::new(Url::parse(&server.uri()).unwrap());
        web::Data::new(PipelineRunner::simulated(client, Duration::ZERO))
    }

    async fn patch_count(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.to_string() == "PATCH")
            .count()
    }

    #[actix_web::test]
    async fn missing_job_id_is_rejected() {
        let server = job_api().await;
        let app = test::init_service(
            App::new()
                .app_data(runner_for(&server))
                .app_data(validation::query_config())
                .configure(process_config),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::post().uri("/process").to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Request validation failed");
        assert!(body["fields"]["message"]
            .as_str()
            .unwrap()
            .contains("missing field `jobId`"));

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/process?jobId=").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["fields"]["jobId"]["errors"], serde_json::json!(["missing jobId"]));

        assert_eq!(patch_count(&server).await, 0);
    }

    #[actix_web::test]
    async fn dot_segment_job_ids_are_rejected() {
        let server = job_api().await;
        let app = test::init_service(
            App::new()
                .app_data(runner_for(&server))
                .app_data(validation::query_config())
                .configure(process_config),
        )
        .await;

        for uri in ["/process?jobId=.", "/process?jobId=..", "/process?jobId=%2E%2E"] {
            let resp = test::call_service(&app, test::TestRequest::post().uri(uri).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
            let body: serde_json::Value = test::read_body_json(resp).await;
            assert_eq!(
                body["fields"]["jobId"]["errors"],
                serde_json::json!(["jobId cannot be '.' or '..'"])
            );
        }

        assert_eq!(patch_count(&server).await, 0);
    }

    #[actix_web::test]
    async fn same_job_id_twice_starts_two_runs() {
        let server = job_api().await;
        let client = JobApiClient::new(Url::parse(&server.uri()).unwrap());
        let runner = web::Data::new(PipelineRunner::simulated(client, Duration::from_millis(200)));
        let app = test::init_service(
            App::new()
                .app_data(runner.clone())
                .app_data(validation::query_config())
                .configure(process_config),
        )
        .await;

        for _ in 0..2 {
            let resp = test::call_service(
                &app,
                test::TestRequest::post().uri("/process?jobId=abc").to_request(),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::ACCEPTED);
        }

        for _ in 0..50 {
            if runner.in_flight() == 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(runner.in_flight(), 2);

        for _ in 0..200 {
            if patch_count(&server).await == 10 && runner.in_flight() == 0 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(patch_count(&server).await, 10);
        assert_eq!(runner.in_flight(), 0);
    }

    #[actix_web::test]
    async fn accepted_job_runs_in_background() {
        let server = job_api().await;
        let runner = runner_for(&server);
        let app = test::init_service(
            App::new()
                .app_data(runner.clone())
                .app_data(validation::query_config())
                .configure(process_config),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post().uri("/process?jobId=abc-123").to_request(),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(test::read_body(resp).await, "started processing job abc-123\n");

        for _ in 0..100 {
            if patch_count(&server).await == 5 && runner.in_flight() == 0 {
                break;
            }
            sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(patch_count(&server).await, 5);
        assert_eq!(runner.in_flight(), 0);
    }

    #[actix_web::test]
    async fn get_is_accepted_and_other_methods_are_not() {
        let server = job_api().await;
        let app = test::init_service(
            App::new()
                .app_data(runner_for(&server))
                .app_data(validation::query_config())
                .configure(process_config),
        )
        .await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/process?jobId=abc").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        let resp = test::call_service(
            &app,
            test::TestRequest::delete().uri("/process?jobId=abc").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
