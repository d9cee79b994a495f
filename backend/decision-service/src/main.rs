use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use decision_service::bootstrap::{build_state, Wiring};
use decision_service::cache::{InMemoryTtlCache, RedisTtlCache, TtlCache};
use decision_service::handlers;
use decision_service::services::candidate_pool::CatalogFile;
use decision_service::store::{DecisionStore, InMemoryStore, PgStore, SettingsStore};
use decision_service::Config;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info".into());
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        "Starting {} on {}:{}",
        config.service.service_name, config.service.http_host, config.service.http_port
    );

    let catalog = match &config.catalog.path {
        Some(path) => {
            let catalog = CatalogFile::load(path).context("Failed to load candidate catalog")?;
            info!(path = %path, scenarios = catalog.candidates.len(), "Candidate catalog loaded");
            catalog
        }
        None => {
            warn!("CATALOG__PATH not set; only fallback candidates will be served");
            CatalogFile::default()
        }
    };

    let (decision_store, settings_store): (Arc<dyn DecisionStore>, Arc<dyn SettingsStore>) =
        match &config.database.url {
            Some(url) => {
                let store = PgStore::connect(url, config.database.max_connections)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                store
                    .migrate()
                    .await
                    .context("Failed to run decision-service migrations")?;
                info!("PostgreSQL store ready, migrations applied");
                let store = Arc::new(store);
                (store.clone(), store)
            }
            None => {
                warn!("DATABASE__URL not set; decisions are kept in memory");
                let store = Arc::new(InMemoryStore::new());
                (store.clone(), store)
            }
        };

    // pool and decision entries share one backend, separated by key prefix
    let cache: Arc<dyn TtlCache> = match &config.redis.url {
        Some(url) => {
            let cache = RedisTtlCache::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            info!("Redis cache connected");
            Arc::new(cache)
        }
        None => {
            info!("REDIS__URL not set; using in-process cache");
            Arc::new(InMemoryTtlCache::new())
        }
    };

    let wiring = Wiring::with_backends(
        &config,
        catalog,
        decision_store,
        settings_store,
        cache.clone(),
        cache,
    );
    let state = build_state(&config, wiring);

    let bind = (config.service.http_host.clone(), config.service.http_port);
    info!("HTTP server listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(TracingLogger::default())
            .configure(handlers::configure)
    })
    .bind(bind)
    .context("Failed to bind HTTP server")?
    .run()
    .await
    .context("HTTP server error")
}
