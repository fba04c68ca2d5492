use actix_web::{dev::Service, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use personalization_service::config::{Config, StoreBackend};
use personalization_service::handlers;
use personalization_service::jobs::store_health::{start_store_health_check, StoreHealthConfig};
use personalization_service::metrics;
use personalization_service::services::{
    HttpScoringOracle, NytArticleSource, PersonalizationService, ScoringGateway,
};
use personalization_service::store::StoreHandle;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.app.default_filter().into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    info!(
        "Starting personalization-service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Environment: {}", config.app.env);

    let store = match config.store.backend {
        StoreBackend::Redis => {
            let handle = StoreHandle::redis(&config.store.redis_url, config.store.connect_timeout());
            // Startup continues without Redis; the handle reconnects on use
            // and the health job keeps probing.
            if let Err(e) = handle.connect().await {
                warn!(error = %e, "Redis unavailable at startup, running degraded");
            }
            Arc::new(handle)
        }
        StoreBackend::Memory => {
            warn!("Using in-process memory store; state is lost on restart");
            Arc::new(StoreHandle::in_memory())
        }
    };

    let health_store = Arc::clone(&store);
    let health_config = StoreHealthConfig::from(&config.store);
    tokio::spawn(async move {
        start_store_health_check(health_store, health_config).await;
    });

    let source = NytArticleSource::new(&config.source).context("Failed to build article source")?;
    let oracle =
        HttpScoringOracle::new(&config.oracle).context("Failed to build scoring oracle client")?;
    let gateway = ScoringGateway::new(Arc::new(oracle), &config.oracle);

    let service = web::Data::new(PersonalizationService::new(
        Arc::new(source),
        gateway,
        Arc::clone(&store),
        &config.personalization,
    ));
    let store_data = web::Data::from(Arc::clone(&store));

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(store_data.clone())
            .configure(handlers::configure)
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            metrics::observe_http_request(&method, &path, 500, start.elapsed());
                            Err(err)
                        }
                    }
                }
            })
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {}", bind_addr))?
    .run()
    .await
    .context("HTTP server error")?;

    store.disconnect().await;
    info!("personalization-service stopped");
    Ok(())
}
