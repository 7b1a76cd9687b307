// src/api/handlers.rs
use std::collections::HashMap;
use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::SessionError;
use crate::models::{Event, Session};
use crate::rpc::signaling::SignalingRegistry;
use crate::services::SessionEngine;

/// Body shared by the lifecycle endpoints: the event plus per-session
/// options.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionEventRequest {
    #[serde(default)]
    pub event: Event,
    #[serde(default)]
    pub opts: Event,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicateRequest {
    #[serde(rename = "SessionIDs", default)]
    pub session_ids: Vec<String>,
    #[serde(default)]
    pub passive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegisterClientRequest {
    #[serde(rename = "ConnID")]
    pub conn_id: String,
    pub url: String,
}

pub async fn health_check(engine: web::Data<Arc<SessionEngine>>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "apolo-session-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "node_id": engine.node_id(),
    }))
}

pub async fn authorize_event(
    req: web::Json<SessionEventRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    let req = req.into_inner();
    let max_usage = engine.authorize_event(req.event, req.opts).await?;
    Ok(HttpResponse::Ok().json(json!({ "MaxUsage": max_usage.as_nanos() as u64 })))
}

pub async fn initiate_session(
    req: web::Json<SessionEventRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    let req = req.into_inner();
    let max_usage = engine.initiate_session(req.event, req.opts).await?;
    Ok(HttpResponse::Ok().json(json!({ "MaxUsage": max_usage.as_nanos() as u64 })))
}

pub async fn update_session(
    req: web::Json<SessionEventRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    let max_usage = engine.update_session(req.into_inner().event).await?;
    Ok(HttpResponse::Ok().json(json!({ "MaxUsage": max_usage.as_nanos() as u64 })))
}

pub async fn terminate_session(
    req: web::Json<SessionEventRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    engine.terminate_session(req.into_inner().event).await?;
    Ok(HttpResponse::Ok().json(json!({ "Result": "OK" })))
}

pub async fn process_message(
    req: web::Json<SessionEventRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    let req = req.into_inner();
    let max_usage = engine.process_message(req.event, req.opts).await?;
    Ok(HttpResponse::Ok().json(json!({ "MaxUsage": max_usage.as_nanos() as u64 })))
}

pub async fn process_cdr(
    req: web::Json<SessionEventRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    engine.process_cdr(req.into_inner().event).await?;
    Ok(HttpResponse::Ok().json(json!({ "Result": "OK" })))
}

/// Replication receiver on the passive side.
pub async fn set_passive_session(
    session: web::Json<Session>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    engine.set_passive_session(session.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "Result": "OK" })))
}

pub async fn replicate_sessions(
    req: web::Json<ReplicateRequest>,
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    let req = req.into_inner();
    let pushed = engine
        .replicate_sessions(&req.session_ids, req.passive)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "Replicated": pushed })))
}

pub async fn backup_sessions(
    engine: web::Data<Arc<SessionEngine>>,
) -> Result<HttpResponse, SessionError> {
    let stored = engine.backup_active_sessions().await?;
    Ok(HttpResponse::Ok().json(json!({ "Stored": stored })))
}

pub async fn get_active_sessions(
    filters: web::Query<HashMap<String, String>>,
    engine: web::Data<Arc<SessionEngine>>,
) -> HttpResponse {
    HttpResponse::Ok().json(engine.get_sessions(&filters, false).await)
}

pub async fn get_active_session_count(
    filters: web::Query<HashMap<String, String>>,
    engine: web::Data<Arc<SessionEngine>>,
) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "Count": engine.session_count(&filters, false).await }))
}

pub async fn get_passive_sessions(
    filters: web::Query<HashMap<String, String>>,
    engine: web::Data<Arc<SessionEngine>>,
) -> HttpResponse {
    HttpResponse::Ok().json(engine.get_sessions(&filters, true).await)
}

pub async fn get_passive_session_count(
    filters: web::Query<HashMap<String, String>>,
    engine: web::Data<Arc<SessionEngine>>,
) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "Count": engine.session_count(&filters, true).await }))
}

pub async fn register_client(
    req: web::Json<RegisterClientRequest>,
    signaling: web::Data<Arc<SignalingRegistry>>,
) -> HttpResponse {
    let req = req.into_inner();
    signaling.register_client(&req.conn_id, &req.url).await;
    HttpResponse::Ok().json(json!({ "Result": "OK" }))
}

pub async fn unregister_client(
    conn_id: web::Path<String>,
    signaling: web::Data<Arc<SignalingRegistry>>,
) -> HttpResponse {
    if signaling.unregister_client(&conn_id).await {
        HttpResponse::Ok().json(json!({ "Result": "OK" }))
    } else {
        HttpResponse::NotFound().json(json!({
            "error": "client_not_found",
            "message": format!("no signaling client registered: {}", conn_id)
        }))
    }
}
