//! Implementation of the actix server.

use actix_web::{
    error::InternalError,
    get,
    http::StatusCode,
    middleware::Logger,
    post,
    web::{self, Data, Json},
    App, HttpResponse, HttpServer, Responder, ResponseError,
};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::{
    common::GenomeRelease,
    err::{AnalysisError, ErrorKind},
    kb::{KbError, KnowledgeBaseInfo},
    pgx::{
        analyze::{
            self, analyze_batch, analyze_vcf, parse_drug_list, AnalyzeResponse, BatchItem,
            BatchResponse,
        },
        extract::ExtractOptions,
    },
};

use super::{Args, WebServerData};

/// Maximal size of JSON request bodies, VCF files are sent inline.
const JSON_LIMIT: usize = 64 * 1024 * 1024;

/// Body of error responses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorDetail {
    pub detail: String,
}

#[derive(Debug)]
struct CustomError {
    status: StatusCode,
    detail: String,
}

impl std::fmt::Display for CustomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.detail)
    }
}

impl CustomError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        CustomError {
            status,
            detail: detail.into(),
        }
    }
}

impl ResponseError for CustomError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(ErrorDetail {
            detail: self.detail.clone(),
        })
    }
}

impl From<AnalysisError> for CustomError {
    fn from(err: AnalysisError) -> Self {
        let status = match err.kind() {
            ErrorKind::ParseError => StatusCode::BAD_REQUEST,
            ErrorKind::UnsupportedGene => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::GuidelineNotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        CustomError::new(status, err.to_string())
    }
}

impl From<KbError> for CustomError {
    fn from(err: KbError) -> Self {
        let status = match &err {
            KbError::NoPath => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        CustomError::new(status, err.to_string())
    }
}

/// Span for one request, tagged with a fresh request ID.
fn request_span(endpoint: &'static str) -> tracing::Span {
    tracing::info_span!("request", endpoint, id = %uuid::Uuid::new_v4())
}

/// Body of `/api/v1/analyze` and `/api/v1/analyze-with-explanation`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub patient_id: String,
    pub gene: String,
    pub diplotype: String,
    pub drug: String,
}

/// Body of `/api/v1/analyze-batch`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeBatchRequest {
    pub patient_id: String,
    pub items: Vec<BatchItem>,
    #[serde(default)]
    pub enrich: bool,
}

/// Body of `/api/v1/analyze-vcf`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeVcfRequest {
    pub patient_id: String,
    /// VCF file content.
    pub vcf: String,
    /// Comma separated list of drugs.
    pub drugs: String,
    #[serde(default)]
    pub genome_release: GenomeRelease,
    #[serde(default)]
    pub sample: Option<String>,
    #[serde(default)]
    pub enrich: bool,
}

/// Run one analysis on the current knowledge base.
async fn analyze_one(
    data: &WebServerData,
    request: AnalyzeRequest,
    enrich: bool,
) -> Result<Json<AnalyzeResponse>, CustomError> {
    let kb = data.store.snapshot();
    let response = analyze::analyze(
        &kb,
        data.narrator.as_ref(),
        &request.patient_id,
        &request.gene,
        &request.diplotype,
        &request.drug,
        enrich,
    )
    .await?;
    Ok(Json(response))
}

/// Verdict for a pre-resolved diplotype.
#[post("/api/v1/analyze")]
async fn handle_analyze(
    data: Data<WebServerData>,
    body: Json<AnalyzeRequest>,
) -> actix_web::Result<impl Responder, CustomError> {
    analyze_one(&data, body.into_inner(), false)
        .instrument(request_span("analyze"))
        .await
}

/// Verdict with explanation, if the narrator answers.
#[post("/api/v1/analyze-with-explanation")]
async fn handle_analyze_with_explanation(
    data: Data<WebServerData>,
    body: Json<AnalyzeRequest>,
) -> actix_web::Result<impl Responder, CustomError> {
    analyze_one(&data, body.into_inner(), true)
        .instrument(request_span("analyze-with-explanation"))
        .await
}

/// Verdicts for several (gene, diplotype, drug) items.
#[post("/api/v1/analyze-batch")]
async fn handle_analyze_batch(
    data: Data<WebServerData>,
    body: Json<AnalyzeBatchRequest>,
) -> actix_web::Result<impl Responder, CustomError> {
    let request = body.into_inner();
    if request.items.is_empty() {
        return Err(CustomError::new(StatusCode::BAD_REQUEST, "no items given"));
    }
    let kb = data.store.snapshot();
    let response: BatchResponse = analyze_batch(
        kb,
        data.narrator.clone(),
        &request.patient_id,
        request.items,
        request.enrich,
    )
    .instrument(request_span("analyze-batch"))
    .await;
    Ok(Json(response))
}

/// Verdicts for several drugs from a VCF file.
#[post("/api/v1/analyze-vcf")]
async fn handle_analyze_vcf(
    data: Data<WebServerData>,
    body: Json<AnalyzeVcfRequest>,
) -> actix_web::Result<impl Responder, CustomError> {
    let request = body.into_inner();
    if request.vcf.trim().is_empty() {
        return Err(CustomError::new(
            StatusCode::BAD_REQUEST,
            "no VCF content given",
        ));
    }
    let drugs = parse_drug_list(&request.drugs);
    if drugs.is_empty() {
        return Err(CustomError::new(StatusCode::BAD_REQUEST, "no drug given"));
    }

    let kb = data.store.snapshot();
    let options = ExtractOptions {
        genome_release: request.genome_release,
        sample: request.sample,
    };
    let response = analyze_vcf(
        kb,
        data.narrator.clone(),
        &request.patient_id,
        request.vcf.into_bytes(),
        drugs,
        options,
        request.enrich,
    )
    .instrument(request_span("analyze-vcf"))
    .await;
    Ok(Json(response))
}

/// Information on the current knowledge base.
#[get("/api/v1/knowledge-base")]
async fn handle_knowledge_base(
    data: Data<WebServerData>,
) -> actix_web::Result<impl Responder, CustomError> {
    Ok(Json(data.store.snapshot().info()))
}

/// Re-read the knowledge base file and swap it in.
#[post("/api/v1/knowledge-base/reload")]
async fn handle_knowledge_base_reload(
    data: Data<WebServerData>,
) -> actix_web::Result<impl Responder, CustomError> {
    let store_data = data.clone();
    let kb = web::block(move || store_data.store.reload())
        .await
        .map_err(|e| CustomError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;
    let info: KnowledgeBaseInfo = kb.info();
    Ok(Json(info))
}

#[get("/")]
async fn handle_index() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "PharmaGuard pharmacogenomic risk engine",
        "version": crate::common::worker_version(),
    }))
}

/// Map JSON payload errors to `400` with `{detail}` body.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            let response = HttpResponse::BadRequest().json(ErrorDetail {
                detail: format!("invalid request body: {}", err),
            });
            InternalError::from_response(err, response).into()
        })
}

/// Register the endpoints; shared between server and tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(handle_index)
        .service(handle_analyze)
        .service(handle_analyze_with_explanation)
        .service(handle_analyze_batch)
        .service(handle_analyze_vcf)
        .service(handle_knowledge_base)
        .service(handle_knowledge_base_reload);
}

#[actix_web::main]
pub async fn main(args: &Args, data: Data<WebServerData>) -> std::io::Result<()> {
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .configure(configure)
            .wrap(Logger::default())
    })
    .bind((args.listen_host.as_str(), args.listen_port))?
    .run()
    .await
}
