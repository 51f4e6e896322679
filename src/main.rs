//! Callsign control-plane server
//!
//! Wires the configuration, database, XML cache and FreeSWITCH connections
//! together, binds the per-call socket services and serves the `mod_xml_curl`
//! endpoints over HTTP.

use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{anyhow, Context};
use callsign_api::XmlCurlState;
use callsign_cache::{CacheTtl, XmlCache};
use callsign_core::config::{LoggingConfig, ServicesConfig};
use callsign_core::AppConfig;
use callsign_db::{
    create_pool, PgCallFlowRepository, PgConferenceRepository, PgExtensionRepository,
    PgFeatureCodeRepository, PgPageGroupRepository, PgParkingRepository, PgPool,
    PgPresenceRepository, PgQueueRepository, PgVoicemailRepository,
};
use callsign_esl::{
    CallHandler, EventClient, EventProcessor, OutboundService, ServiceRegistry, SessionManager,
    SwitchApi, TransitionPolicy,
};
use callsign_services::{
    names, BlfService, BroadcastNotifier, CallControlService, ConferenceService,
    FeatureCodeService, PresenceResolver, QueueService, Repositories, SideEffects,
    VoicemailService,
};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const NOTIFICATION_CAPACITY: usize = 1024;

/// Live handles reported by the health endpoint
struct Health {
    client: Arc<EventClient>,
    registry: Arc<ServiceRegistry>,
    sessions: Arc<SessionManager>,
}

/// Health check endpoint
async fn health_check(health: web::Data<Health>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "callsign",
        "version": env!("CARGO_PKG_VERSION"),
        "freeswitch_connected": health.client.is_connected(),
        "services_running": health.registry.is_running(),
        "services": health.registry.names(),
        "active_sessions": health.sessions.count(),
    }))
}

/// Initialize tracing/logging
fn init_tracing(logging: &LoggingConfig) {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| logging.level.clone());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "callsign={0},callsign_core={0},callsign_db={0},callsign_cache={0},\
             callsign_esl={0},callsign_services={0},callsign_api={0},actix_web=info,sqlx=warn",
            log_level
        ))
    });

    let json = logging.json.then(|| fmt::layer().json().with_target(true));
    let human = (!logging.json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(human)
        .init();
}

fn repositories(pool: &PgPool) -> Repositories {
    Repositories {
        feature_codes: Arc::new(PgFeatureCodeRepository::new(pool.clone())),
        extensions: Arc::new(PgExtensionRepository::new(pool.clone())),
        presence: Arc::new(PgPresenceRepository::new(pool.clone())),
        voicemail: Arc::new(PgVoicemailRepository::new(pool.clone())),
        call_flows: Arc::new(PgCallFlowRepository::new(pool.clone())),
        parking: Arc::new(PgParkingRepository::new(pool.clone())),
        page_groups: Arc::new(PgPageGroupRepository::new(pool.clone())),
        queues: Arc::new(PgQueueRepository::new(pool.clone())),
        conferences: Arc::new(PgConferenceRepository::new(pool.clone())),
    }
}

fn bind<H: CallHandler>(
    registry: &ServiceRegistry,
    name: &str,
    addr: &str,
    handler: Arc<H>,
    idle_timeout: Duration,
) -> anyhow::Result<()> {
    let service = OutboundService::new(name, handler, idle_timeout);
    registry
        .register(name, addr, Arc::new(service))
        .with_context(|| format!("failed to register {} service on {}", name, addr))
}

/// Register one listener per call service
fn register_services(
    registry: &ServiceRegistry,
    config: &ServicesConfig,
    repos: &Repositories,
    effects: SideEffects,
    switch: Arc<dyn SwitchApi>,
    queue: Arc<QueueService>,
) -> anyhow::Result<()> {
    let idle = config.idle_timeout();
    let feature_codes = FeatureCodeService::new(
        repos.clone(),
        effects,
        Duration::from_secs(config.webhook_timeout_secs),
    )?;

    bind(
        registry,
        names::CALLCONTROL,
        &config.callcontrol_addr,
        Arc::new(CallControlService::new()),
        idle,
    )?;
    bind(
        registry,
        names::VOICEMAIL,
        &config.voicemail_addr,
        Arc::new(VoicemailService::new(repos.clone(), config.voicemail_dir.clone())),
        idle,
    )?;
    bind(registry, names::QUEUE, &config.queue_addr, queue, idle)?;
    bind(
        registry,
        names::CONFERENCE,
        &config.conference_addr,
        Arc::new(ConferenceService::new(repos.conferences.clone(), switch)),
        idle,
    )?;
    bind(
        registry,
        names::BLF,
        &config.blf_addr,
        Arc::new(BlfService::new(PresenceResolver::new(repos.clone()))),
        idle,
    )?;
    bind(
        registry,
        names::FEATURECODES,
        &config.featurecodes_addr,
        Arc::new(feature_codes),
        idle,
    )?;
    Ok(())
}

/// Log published notifications until the channel closes
fn spawn_notification_log(notifier: &BroadcastNotifier) -> tokio::task::JoinHandle<()> {
    let mut rx = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(n) => debug!(
                    event_type = %n.event_type,
                    tenant_id = n.tenant_id,
                    payload = %n.payload,
                    "Notification"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Notification log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    info!("Starting Callsign v{}", env!("CARGO_PKG_VERSION"));

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .context("failed to create database pool")?;
    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );
    let repos = repositories(&pool);

    let cache = Arc::new(XmlCache::new());
    let sweeper = cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs));

    // Control connection and event tracking
    let client = Arc::new(EventClient::new(&config.freeswitch));
    let sessions = Arc::new(SessionManager::new(TransitionPolicy::default()));
    let processor = Arc::new(EventProcessor::with_default_handlers(sessions.clone()));
    let events = client
        .take_events()
        .ok_or_else(|| anyhow!("event stream already taken"))?;
    let processor_task = processor.start(events, client.take_errors());

    info!(addr = %config.freeswitch.addr(), "Connecting to FreeSWITCH...");
    client
        .connect()
        .await
        .context("failed to connect to FreeSWITCH")?;
    client
        .subscribe(&config.freeswitch.events)
        .await
        .context("failed to subscribe to FreeSWITCH events")?;

    let notifier = Arc::new(BroadcastNotifier::new(NOTIFICATION_CAPACITY));
    let notification_log = spawn_notification_log(&notifier);
    let switch: Arc<dyn SwitchApi> = client.clone();
    let effects = SideEffects::new(switch.clone(), cache.clone(), notifier.clone());

    let queue = Arc::new(QueueService::new(repos.clone(), switch.clone()));
    match queue.sync_agents().await {
        Ok(synced) => info!(synced, "Queue agents synced"),
        Err(e) => error!(error = %e, "Queue agent sync failed"),
    }

    let registry = Arc::new(ServiceRegistry::new());
    register_services(&registry, &config.services, &repos, effects, switch, queue)?;
    registry
        .start_all()
        .await
        .context("failed to start call services")?;

    let state = web::Data::new(
        XmlCurlState::new(
            cache.clone(),
            repos.extensions.clone(),
            repos.feature_codes.clone(),
            config.services.featurecodes_addr.clone(),
        )
        .with_ttl(CacheTtl::from(&config.cache)),
    );
    let health = web::Data::new(Health {
        client: client.clone(),
        registry: registry.clone(),
        sessions,
    });

    let bind_addr = config.server_addr();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, config.server.workers
    );

    // Runs until SIGINT/SIGTERM
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(health.clone())
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(health_check))
            .configure(callsign_api::configure)
    })
    .workers(config.server.workers)
    .bind(&bind_addr)
    .with_context(|| format!("failed to bind {}", bind_addr))?
    .run()
    .await?;

    info!("Shutting down");
    registry.stop_all().await;
    client.close().await;
    processor_task.abort();
    notification_log.abort();
    sweeper.abort();
    pool.close().await;
    info!("Stopped");
    Ok(())
}
