//! The 6 HTTP endpoints in §6, thin translators between Actix and the
//! `qcache_frontend::Frontend` the core logic lives behind: one handler
//! function per route, state injected via `web::Data`.

use std::time::Instant;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use qcache_frame::io::{csv, json};

use qcache_common::error::{QError, QResult};
use qcache_frame::ast::parse_query;
use qcache_frame::QFrame;
use qcache_frontend::Frontend;
use qcache_shard::{ContentType, InsertRequest};

use crate::api::headers::{check_content_encoding, parse_stand_in_header, parse_type_hints};
use crate::web_error::WebError;

#[derive(serde::Deserialize)]
pub struct QueryParam {
    #[serde(default)]
    q: Option<String>,
}

fn content_type_of(req: &HttpRequest) -> QResult<ContentType> {
    let raw = req
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    if raw.starts_with("text/csv") {
        Ok(ContentType::Csv)
    } else if raw.starts_with("application/json") {
        Ok(ContentType::Json)
    } else {
        Err(QError::UnsupportedMedia(raw.to_string()))
    }
}

/// `text/csv` only when the client asked for it explicitly; JSON otherwise,
/// matching §6's "`Accept: application/json` (default) or `text/csv`".
fn wants_csv(req: &HttpRequest) -> bool {
    req.headers()
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/csv"))
        .unwrap_or(false)
}

fn encode_frame(frame: &QFrame, as_csv: bool) -> QResult<(Vec<u8>, &'static str)> {
    if as_csv {
        Ok((csv::to_csv(frame)?, "text/csv"))
    } else {
        Ok((json::to_json(frame)?, "application/json"))
    }
}

#[post("/qcache/dataset/{key}")]
pub async fn insert_dataset(
    req: HttpRequest,
    path: web::Path<String>,
    frontend: web::Data<Frontend>,
    body: web::Bytes,
) -> Result<HttpResponse, WebError> {
    check_content_encoding(&req)?;
    let content_type = content_type_of(&req)?;
    let type_hints = parse_type_hints(&req)?;
    let stand_ins = parse_stand_in_header(&req)?;

    frontend
        .insert(InsertRequest {
            key: path.into_inner(),
            body: body.to_vec(),
            content_type,
            type_hints,
            stand_ins,
        })
        .await?;

    Ok(HttpResponse::Created().finish())
}

async fn run_query(
    req: &HttpRequest,
    key: &str,
    query_json: serde_json::Value,
    frontend: &Frontend,
) -> Result<HttpResponse, WebError> {
    // Validated up front so a malformed AST is reported before the shard
    // round-trip, matching §4.3's "evaluator never sees an invalid AST".
    parse_query(&query_json).map_err(WebError::from)?;

    let started = Instant::now();
    let result = frontend.query(key, query_json).await?;
    let elapsed = started.elapsed().as_secs_f64();

    let as_csv = wants_csv(req);
    let (body, content_type) = encode_frame(&result.frame, as_csv).map_err(WebError::from)?;

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header(("X-QCache-unsliced-length", result.unsliced_length.to_string()))
        .insert_header(("X-QCache-stats", format!("{{\"shard_execution_duration\":{elapsed}}}")))
        .body(body))
}

#[get("/qcache/dataset/{key}")]
pub async fn query_dataset_get(
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<QueryParam>,
    frontend: web::Data<Frontend>,
) -> Result<HttpResponse, WebError> {
    let query_json: serde_json::Value = match &params.q {
        Some(q) => serde_json::from_str(q)
            .map_err(|e| WebError::from(QError::MalformedQuery(e.to_string())))?,
        None => serde_json::json!({}),
    };
    run_query(&req, &path.into_inner(), query_json, frontend.get_ref()).await
}

#[post("/qcache/dataset/{key}/q")]
pub async fn query_dataset_post(
    req: HttpRequest,
    path: web::Path<String>,
    frontend: web::Data<Frontend>,
    body: web::Bytes,
) -> Result<HttpResponse, WebError> {
    let query_json: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| WebError::from(QError::MalformedQuery(e.to_string())))?;
    run_query(&req, &path.into_inner(), query_json, frontend.get_ref()).await
}

#[delete("/qcache/dataset/{key}")]
pub async fn delete_dataset(
    path: web::Path<String>,
    frontend: web::Data<Frontend>,
) -> Result<HttpResponse, WebError> {
    frontend.delete(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().finish())
}

#[get("/qcache/status")]
pub async fn status(frontend: web::Data<Frontend>) -> HttpResponse {
    match frontend.status().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(_) => HttpResponse::InternalServerError().body("NOT OK"),
    }
}

#[get("/qcache/statistics")]
pub async fn statistics(frontend: web::Data<Frontend>) -> Result<HttpResponse, WebError> {
    let merged = frontend.statistics().await?;
    Ok(HttpResponse::Ok().json(merged))
}
