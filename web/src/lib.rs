//! The HTTP boundary (§6): Actix handlers for the 6 endpoints, basic
//! auth, CORS, and optional TLS, wired to a `qcache_frontend::Frontend`
//! built from the resolved `ServerConfig`, via the usual
//! `HttpServer::new` + `middleware::Logger` + `.workers()` + `.bind()`
//! bootstrap shape.

pub mod api;
pub mod auth;
pub mod web_error;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use tracing::info;

use qcache_common::config::ServerConfig;
use qcache_frontend::Frontend;
use qcache_shard::ShardHandle;

use crate::auth::{basic_auth, BasicAuthCreds};

fn build_tls(cert_file: &str, key_file: &str) -> std::io::Result<openssl::ssl::SslAcceptorBuilder> {
    use openssl::ssl::{SslAcceptor, SslFiletype, SslMethod};
    let mut builder = SslAcceptor::mozilla_intermediate(SslMethod::tls())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    builder
        .set_private_key_file(key_file, SslFiletype::PEM)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    builder
        .set_certificate_chain_file(cert_file)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    Ok(builder)
}

/// Spawns `cfg.cache_shards` shard workers (splitting `size_bytes`/
/// `l2_cache_size` evenly across them), builds the front-end, and serves
/// the HTTP surface until the process is killed.
pub async fn run(cfg: ServerConfig) -> std::io::Result<()> {
    info!(port = cfg.port, shards = cfg.cache_shards, "starting qcache server");

    let per_shard_size = (cfg.size_bytes as usize) / cfg.cache_shards.max(1);
    let per_shard_l2 = (cfg.l2_cache_size as usize) / cfg.cache_shards.max(1);
    let shards: Vec<ShardHandle> = (0..cfg.cache_shards)
        .map(|_| {
            qcache_shard::spawn(per_shard_size, cfg.age_secs, per_shard_l2, cfg.statistics_buffer_size)
        })
        .collect();
    let frontend = web::Data::new(Frontend::new(shards));
    let creds = web::Data::new(BasicAuthCreds(cfg.basic_auth.clone()));

    let workers = cfg.api_workers.max(1);
    let port = cfg.port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(frontend.clone())
            .app_data(creds.clone())
            .wrap(middleware::from_fn(basic_auth))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .service(api::dataset::insert_dataset)
            .service(api::dataset::query_dataset_get)
            .service(api::dataset::query_dataset_post)
            .service(api::dataset::delete_dataset)
            .service(api::dataset::status)
            .service(api::dataset::statistics)
    })
    .workers(workers);

    let server = match (&cfg.cert_file, &cfg.ca_file) {
        (Some(cert), Some(key)) => {
            let tls = build_tls(cert, key)?;
            server.bind_openssl(format!("0.0.0.0:{port}"), tls)?
        }
        _ => server.bind(format!("0.0.0.0:{port}"))?,
    };

    server.run().await
}
