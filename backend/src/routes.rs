use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use shared::{AiAssessment, ErrorResponse, HealthStatus, PredictResponse, ServiceStatus};
use std::time::Instant;
use uuid::Uuid;

use crate::assessment::AssessmentService;
use crate::inference::{Classifier, PipelineError};

pub const DEFAULT_AGE: u32 = 30;
pub const DEFAULT_GENDER: &str = "other";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Model not loaded")]
    ModelUnavailable,
    #[error("File must be an image")]
    NotAnImage,
    #[error("{0}")]
    InvalidForm(String),
    #[error("Prediction failed: {0}")]
    PredictionFailed(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotAnImage => StatusCode::BAD_REQUEST,
            ApiError::InvalidForm(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PredictionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            detail: self.to_string(),
        })
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ModelLoad(_) => ApiError::ModelUnavailable,
            other => ApiError::PredictionFailed(other.to_string()),
        }
    }
}

struct Upload {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

struct PredictForm {
    file: Upload,
    age: u32,
    gender: String,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(root)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/predict").route(web::post().to(predict)));
}

async fn root(classifier: web::Data<Classifier>) -> HttpResponse {
    HttpResponse::Ok().json(ServiceStatus {
        status: "healthy".to_string(),
        message: "SkinGuard API is running".to_string(),
        model_loaded: classifier.session().is_loaded(),
    })
}

async fn health(classifier: web::Data<Classifier>) -> HttpResponse {
    HttpResponse::Ok().json(HealthStatus {
        status: "healthy".to_string(),
        model_loaded: classifier.session().is_loaded(),
        model_path: classifier.session().model_path().display().to_string(),
    })
}

async fn read_form(mut payload: Multipart) -> Result<PredictForm, ApiError> {
    let mut file = None;
    let mut age = None;
    let mut gender = None;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| ApiError::InvalidForm(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|mime| mime.to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk
                .map_err(|e| ApiError::InvalidForm(format!("Malformed multipart body: {}", e)))?;
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" => {
                file = Some(Upload {
                    content_type,
                    bytes: data,
                })
            }
            "age" => {
                let raw = String::from_utf8_lossy(&data).trim().to_string();
                age = Some(raw.parse::<u32>().map_err(|_| {
                    ApiError::InvalidForm(format!("age must be an integer, got {:?}", raw))
                })?);
            }
            "gender" => gender = Some(String::from_utf8_lossy(&data).trim().to_string()),
            other => warn!("Ignoring unexpected form field {:?}", other),
        }
    }

    let file = file.ok_or_else(|| ApiError::InvalidForm("Field required: file".to_string()))?;
    Ok(PredictForm {
        file,
        age: age.unwrap_or(DEFAULT_AGE),
        gender: gender
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| DEFAULT_GENDER.to_string()),
    })
}

async fn predict(
    classifier: web::Data<Classifier>,
    assessor: web::Data<AssessmentService>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let form = read_form(payload).await?;

    let is_image = form
        .file
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        warn!(
            "[{}] Rejected upload with content type {:?}",
            request_id, form.file.content_type
        );
        return Err(ApiError::NotAnImage);
    }

    let started = Instant::now();
    let bytes = form.file.bytes;
    let worker = classifier.clone();
    let prediction = web::block(move || worker.classify(&bytes))
        .await
        .map_err(|e| ApiError::PredictionFailed(e.to_string()))?
        .map_err(|e| {
            error!("[{}] {}", request_id, e);
            ApiError::from(e)
        })?;

    info!(
        "[{}] Predicted {} ({:.3}) in {:?}",
        request_id,
        prediction.predicted_class,
        prediction.confidence,
        started.elapsed()
    );

    let assessment = assessor
        .assess(&prediction.predicted_class, form.age, &form.gender)
        .await;
    if assessment.is_none() && assessor.is_enabled() {
        warn!("[{}] Returning response without AI assessment", request_id);
    }

    Ok(HttpResponse::Ok().json(PredictResponse {
        model_prediction: prediction,
        ai_assessment: AiAssessment::from(assessment),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::preprocess::tests::{gradient_rgb, png_bytes};
    use crate::inference::session::tests::FixedRunner;
    use crate::inference::{
        InferenceSession, LabelTable, ModelLoadError, ModelRunner, ModelVariant, OutputTensor,
    };
    use crate::assessment::openai::ResponsesClient;
    use crate::config::AssessmentConfig;
    use actix_web::{test, App, HttpServer};
    use shared::{ConsultDoctor, SeverityLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    const BOUNDARY: &str = "----skinguard-test-boundary";

    struct Part<'a> {
        name: &'a str,
        content_type: Option<&'a str>,
        data: &'a [u8],
    }

    fn multipart(parts: &[Part<'_>]) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part.content_type {
                Some(ct) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        part.name, ct
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        (format!("multipart/form-data; boundary={BOUNDARY}"), body)
    }

    struct Fixture {
        classifier: Classifier,
        loads: Arc<AtomicUsize>,
        runner: Arc<FixedRunner>,
    }

    fn fixture(logits: Vec<f32>) -> Fixture {
        let runner = Arc::new(FixedRunner::new(
            vec![1, 3, 224, 224],
            OutputTensor {
                shape: vec![1, logits.len()],
                data: logits,
            },
        ));
        let loads = Arc::new(AtomicUsize::new(0));

        let (shared_runner, counter) = (runner.clone(), loads.clone());
        let session = InferenceSession::with_loader("model/test.onnx", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(shared_runner.clone() as Arc<dyn ModelRunner>)
        });

        Fixture {
            classifier: Classifier::new(
                session,
                ModelVariant::ImagenetSoftmax,
                224,
                LabelTable::fixed(["Benign", "Malignant"]),
            ),
            loads,
            runner,
        }
    }

    macro_rules! app {
        ($classifier:expr) => {
            app!($classifier, AssessmentService::disabled())
        };
        ($classifier:expr, $assessor:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($classifier))
                    .app_data(web::Data::new($assessor))
                    .configure(configure_routes),
            )
            .await
        };
    }

    struct FakeLlm {
        base_url: String,
        hits: Arc<AtomicUsize>,
        instructions: Arc<Mutex<Vec<String>>>,
    }

    /// Local stand-in for the Responses API that always answers `status`
    /// with `body`.
    fn fake_llm(status: StatusCode, body: serde_json::Value) -> FakeLlm {
        let hits = Arc::new(AtomicUsize::new(0));
        let instructions = Arc::new(Mutex::new(Vec::new()));

        let (counter, seen) = (hits.clone(), instructions.clone());
        let server = HttpServer::new(move || {
            let (body, counter, seen) = (body.clone(), counter.clone(), seen.clone());
            App::new().route(
                "/v1/responses",
                web::post().to(move |request: web::Json<serde_json::Value>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if let Some(text) = request["instructions"].as_str() {
                        seen.lock().unwrap().push(text.to_string());
                    }
                    let body = body.clone();
                    async move { HttpResponse::build(status).json(body) }
                }),
            )
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();

        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());

        FakeLlm {
            base_url: format!("http://{addr}/v1"),
            hits,
            instructions,
        }
    }

    fn message_reply(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "resp_test",
            "output": [
                {"type": "reasoning", "summary": []},
                {
                    "type": "message",
                    "role": "assistant",
                    "content": [{"type": "output_text", "text": text, "annotations": []}]
                }
            ]
        })
    }

    fn assessor_for(llm: &FakeLlm) -> AssessmentService {
        let config = AssessmentConfig {
            base_url: llm.base_url.clone(),
            timeout_secs: 10,
            ..AssessmentConfig::default()
        };
        AssessmentService::with_client(ResponsesClient::new(&config, "sk-test".to_string()).unwrap())
    }

    fn image_upload() -> test::TestRequest {
        let image = png_bytes(gradient_rgb(64, 64));
        let (content_type, body) = multipart(&[
            Part {
                name: "file",
                content_type: Some("image/png"),
                data: &image,
            },
            Part {
                name: "age",
                content_type: None,
                data: b"52",
            },
            Part {
                name: "gender",
                content_type: None,
                data: b"male",
            },
        ]);
        test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn root_reports_liveness() {
        let app = app!(fixture(vec![0.0, 1.0]).classifier);
        let resp: ServiceStatus =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/").to_request())
                .await;
        assert_eq!(resp.status, "healthy");
        assert!(!resp.model_loaded);
    }

    #[actix_web::test]
    async fn health_reports_model_path() {
        let fixture = fixture(vec![0.0, 1.0]);
        fixture.classifier.session().ensure_loaded().unwrap();
        let app = app!(fixture.classifier);
        let resp: HealthStatus = test::call_and_read_body_json(
            &app,
            test::TestRequest::get().uri("/health").to_request(),
        )
        .await;
        assert!(resp.model_loaded);
        assert_eq!(resp.model_path, "model/test.onnx");
    }

    #[actix_web::test]
    async fn non_image_upload_is_rejected_before_inference() {
        let Fixture {
            classifier,
            loads,
            runner,
        } = fixture(vec![0.0, 1.0]);
        let app = app!(classifier);

        let (content_type, body) = multipart(&[Part {
            name: "file",
            content_type: Some("text/plain"),
            data: b"hello",
        }]);
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.detail, "File must be an image");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[actix_web::test]
    async fn prediction_survives_missing_assessment() {
        let app = app!(fixture(vec![-1.0, 3.0]).classifier);

        let image = png_bytes(gradient_rgb(120, 80));
        let (content_type, body) = multipart(&[
            Part {
                name: "file",
                content_type: Some("image/png"),
                data: &image,
            },
            Part {
                name: "age",
                content_type: None,
                data: b"45",
            },
            Part {
                name: "gender",
                content_type: None,
                data: b"female",
            },
        ]);
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: PredictResponse = test::read_body_json(resp).await;
        assert_eq!(body.model_prediction.predicted_class, "Malignant");
        assert!(body.model_prediction.confidence > 0.9);
        assert_eq!(body.ai_assessment, AiAssessment::unavailable());
    }

    #[actix_web::test]
    async fn missing_model_is_service_unavailable() {
        let session = InferenceSession::with_loader("model/absent.onnx", |path| {
            Err(ModelLoadError::NotFound(path.to_path_buf()))
        });
        let classifier = Classifier::new(
            session,
            ModelVariant::ImagenetSoftmax,
            224,
            LabelTable::fixed(["Benign", "Malignant"]),
        );
        let app = app!(classifier);

        let image = png_bytes(gradient_rgb(8, 8));
        let (content_type, body) = multipart(&[Part {
            name: "file",
            content_type: Some("image/png"),
            data: &image,
        }]);
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn corrupt_image_is_prediction_failure() {
        let app = app!(fixture(vec![0.0, 1.0]).classifier);

        let (content_type, body) = multipart(&[Part {
            name: "file",
            content_type: Some("image/jpeg"),
            data: b"\xff\xd8 truncated",
        }]);
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: ErrorResponse = test::read_body_json(resp).await;
        assert!(body.detail.starts_with("Prediction failed: "));
    }

    #[actix_web::test]
    async fn missing_file_field_is_unprocessable() {
        let app = app!(fixture(vec![0.0, 1.0]).classifier);

        let (content_type, body) = multipart(&[Part {
            name: "age",
            content_type: None,
            data: b"30",
        }]);
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn non_numeric_age_is_unprocessable() {
        let app = app!(fixture(vec![0.0, 1.0]).classifier);

        let image = png_bytes(gradient_rgb(8, 8));
        let (content_type, body) = multipart(&[
            Part {
                name: "file",
                content_type: Some("image/png"),
                data: &image,
            },
            Part {
                name: "age",
                content_type: None,
                data: b"thirty",
            },
        ]);
        let req = test::TestRequest::post()
            .uri("/predict")
            .insert_header(("content-type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn malformed_assessment_falls_back_to_placeholder() {
        let llm = fake_llm(
            StatusCode::OK,
            message_reply("Honestly this looks like it could be a few things."),
        );
        let app = app!(fixture(vec![-1.0, 3.0]).classifier, assessor_for(&llm));

        let resp = test::call_service(&app, image_upload().to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: PredictResponse = test::read_body_json(resp).await;
        assert_eq!(body.model_prediction.predicted_class, "Malignant");
        assert_eq!(body.ai_assessment, AiAssessment::unavailable());
        assert_eq!(llm.hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn failing_assessment_api_falls_back_to_placeholder() {
        let llm = fake_llm(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({"error": {"message": "The server is overloaded"}}),
        );
        let app = app!(fixture(vec![2.0, 0.5]).classifier, assessor_for(&llm));

        let resp = test::call_service(&app, image_upload().to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: PredictResponse = test::read_body_json(resp).await;
        assert_eq!(body.model_prediction.predicted_class, "Benign");
        assert_eq!(body.ai_assessment, AiAssessment::unavailable());
        assert_eq!(llm.hits.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn fenced_assessment_is_returned_with_prediction() {
        let document = r#"```json
{
  "disease_description": "Melanoma is a serious form of skin cancer.",
  "severity_level": "High",
  "immediate_action": "See a dermatologist this week.",
  "things_to_keep_in_mind": ["Track size changes", "Avoid sunburn"],
  "consult_doctor": "Yes",
  "consult_doctor_reasoning": "Early treatment changes outcomes."
}
```"#;
        let llm = fake_llm(StatusCode::OK, message_reply(document));
        let app = app!(fixture(vec![-1.0, 3.0]).classifier, assessor_for(&llm));

        let resp = test::call_service(&app, image_upload().to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: PredictResponse = test::read_body_json(resp).await;
        assert_eq!(body.model_prediction.predicted_class, "Malignant");
        match body.ai_assessment {
            AiAssessment::Available(doc) => {
                assert_eq!(doc.severity_level, SeverityLevel::High);
                assert_eq!(doc.consult_doctor, ConsultDoctor::Yes);
                assert_eq!(doc.things_to_keep_in_mind.len(), 2);
            }
            AiAssessment::Unavailable { error } => panic!("assessment missing: {error}"),
        }

        let instructions = llm.instructions.lock().unwrap();
        assert_eq!(instructions.len(), 1);
        assert!(instructions[0].contains("Analyze Malignant for a 52-year-old male patient."));
    }
}
