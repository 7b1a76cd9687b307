// src/main.rs
use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use apolo_session_engine::api;
use apolo_session_engine::config::Config;
use apolo_session_engine::rpc::cdrs::CdrsClient;
use apolo_session_engine::rpc::peer::PeerClient;
use apolo_session_engine::rpc::rater::RaterClient;
use apolo_session_engine::rpc::signaling::SignalingRegistry;
use apolo_session_engine::services::SessionEngine;
use apolo_session_engine::storage::RedisBackupStore;
use apolo_session_engine::traits::{
    BackupStore, CdrApi, PeerApi, RaterApi, ResourceApi, SignalingApi,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .init();

    info!("🚀 Starting Apolo Session Engine (Rust)");

    // Load configuration
    let config = Config::from_env().expect("Failed to load configuration");

    info!(
        "Environment: {}, node: {}",
        config.environment, config.node_id
    );

    // Remote collaborators
    let rater = Arc::new(
        RaterClient::new(&config.rater_url, config.reply_timeout)
            .expect("Failed to create rater client"),
    );
    match rater.ping().await {
        Ok(true) => info!("✅ Rater reachable at {}", config.rater_url),
        _ => warn!("⚠️  Rater not reachable at {}, continuing", config.rater_url),
    }

    let cdrs = Arc::new(
        CdrsClient::new(&config.cdrs_url, config.reply_timeout)
            .expect("Failed to create CDR client"),
    );

    let mut peers: Vec<Arc<dyn PeerApi>> = Vec::new();
    for peer_cfg in &config.replication_peers {
        let peer = PeerClient::new(peer_cfg, config.reply_timeout)
            .expect("Failed to create replication peer client");
        peers.push(Arc::new(peer));
    }
    if !peers.is_empty() {
        info!("✅ Replicating to {} peer(s)", peers.len());
    }

    let signaling = Arc::new(SignalingRegistry::new(config.reply_timeout));

    let backup_store: Option<Arc<dyn BackupStore>> = match &config.redis_url {
        Some(url) => {
            let store = RedisBackupStore::new(url)
                .await
                .expect("Failed to connect backup store");
            info!("✅ Backup store connected");
            Some(Arc::new(store))
        }
        None => {
            info!("⚠️  No backup store configured, sessions are memory-only");
            None
        }
    };

    let engine = SessionEngine::new(
        config.clone(),
        rater.clone() as Arc<dyn RaterApi>,
        peers,
        signaling.clone() as Arc<dyn SignalingApi>,
        cdrs.clone() as Arc<dyn CdrApi>,
        cdrs.clone() as Arc<dyn ResourceApi>,
        backup_store,
    );

    // Restore surviving sessions, then keep the incremental backup going
    match engine.restore_sessions().await {
        Ok(count) if count > 0 => info!("✅ {} session(s) restored from backup", count),
        Ok(_) => {}
        Err(e) => error!("Session restore failed: {}", e),
    }

    let backup_stop = CancellationToken::new();
    let backup_task = tokio::spawn(engine.clone().run_backup_loop(backup_stop.clone()));

    // HTTP Server
    let bind_address = format!("{}:{}", config.host, config.port);
    info!("🌐 Starting HTTP server on {}", bind_address);

    let http_engine = engine.clone();
    let http_signaling = signaling.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::Data::new(http_engine.clone()))
            .app_data(web::Data::new(http_signaling.clone()))
            .configure(api::routes::configure)
    })
    .workers(8)
    .bind(&bind_address)?
    .run();

    let result = server.await;

    // Final backup before the process goes away
    backup_stop.cancel();
    if let Err(e) = backup_task.await {
        error!("Backup loop join failed: {}", e);
    }

    result
}
