// src/api/routes.rs
use actix_web::web;
use crate::api::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(handlers::health_check))
            .route("/sessions/authorize", web::post().to(handlers::authorize_event))
            .route("/sessions/initiate", web::post().to(handlers::initiate_session))
            .route("/sessions/update", web::post().to(handlers::update_session))
            .route("/sessions/terminate", web::post().to(handlers::terminate_session))
            .route("/sessions/process-message", web::post().to(handlers::process_message))
            .route("/sessions/process-cdr", web::post().to(handlers::process_cdr))
            // replication and backup surfaces (peer nodes and operators)
            .route("/sessions/passive", web::post().to(handlers::set_passive_session))
            .route("/sessions/replicate", web::post().to(handlers::replicate_sessions))
            .route("/sessions/backup", web::post().to(handlers::backup_sessions))
            // monitoring
            .route("/sessions/active", web::get().to(handlers::get_active_sessions))
            .route("/sessions/active/count", web::get().to(handlers::get_active_session_count))
            .route("/sessions/passive", web::get().to(handlers::get_passive_sessions))
            .route("/sessions/passive/count", web::get().to(handlers::get_passive_session_count))
            // signaling client callbacks
            .route("/clients", web::post().to(handlers::register_client))
            .route("/clients/{conn_id}", web::delete().to(handlers::unregister_client)),
    );
}
