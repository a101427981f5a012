use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{
    AppointmentLedger, BookingService, DayLockManager, InMemoryLedger, LocalDayLocks, RedisDayLocks,
    SlotAllocator, SupabaseLedger,
};
use doctor_cell::services::{
    InMemoryScheduleRepository, ScheduleRepository, ScheduleService, SupabaseScheduleRepository,
};
use reminder_cell::{
    DispatcherConfig, HttpMailer, InMemoryReminderStore, LogMailer, Mailer, RedisReminderStore,
    ReminderDispatcher, ReminderService, ReminderStore,
};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Amae scheduling API server");

    let config = Arc::new(AppConfig::from_env());
    let clinic = &config.clinic;

    // Schedules and the ledger live in Supabase when it is configured
    let (schedule_repository, ledger): (Arc<dyn ScheduleRepository>, Arc<dyn AppointmentLedger>) =
        if config.is_configured() {
            let supabase = SupabaseClient::new(&config);
            (
                Arc::new(SupabaseScheduleRepository::new(supabase.clone())),
                Arc::new(SupabaseLedger::new(supabase)),
            )
        } else {
            warn!("Supabase not configured, schedules and appointments are kept in memory");
            (
                Arc::new(InMemoryScheduleRepository::new()),
                Arc::new(InMemoryLedger::new()),
            )
        };

    // Redis lets several API processes share day locks and reminders
    let lock_wait = Duration::from_millis(clinic.lock_wait_ms);
    let (locks, reminder_store): (Arc<dyn DayLockManager>, Arc<dyn ReminderStore>) = match &config.redis_url {
        Some(url) => (
            Arc::new(RedisDayLocks::connect(url, lock_wait, Duration::from_millis(clinic.lock_ttl_ms)).await?),
            Arc::new(RedisReminderStore::connect(url).await?),
        ),
        None => {
            warn!("REDIS_URL not set, day locks and reminders are local to this process");
            (
                Arc::new(LocalDayLocks::new(lock_wait)),
                Arc::new(InMemoryReminderStore::new()),
            )
        }
    };

    let mailer: Arc<dyn Mailer> = match HttpMailer::from_config(&config) {
        Ok(mailer) => Arc::new(mailer),
        Err(e) => {
            warn!("{}, reminders will only be logged", e);
            Arc::new(LogMailer)
        }
    };

    let dispatcher = ReminderDispatcher::with_config(
        reminder_store.clone(),
        mailer,
        DispatcherConfig {
            poll_interval: Duration::from_secs(clinic.reminder_poll_seconds),
            ..DispatcherConfig::default()
        },
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_task = tokio::spawn(async move { dispatcher.run(shutdown_rx).await });

    let schedules = Arc::new(ScheduleService::new(schedule_repository));
    let booking = Arc::new(BookingService::new(
        schedules.clone(),
        ledger,
        locks,
        Arc::new(ReminderService::new(reminder_store)),
        SlotAllocator::from_settings(clinic)?,
        chrono::Duration::minutes(clinic.reminder_lead_minutes),
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(config.clone(), schedules, booking)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, waiting for reminder dispatcher");
    let _ = shutdown_tx.send(true);
    dispatcher_task.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
