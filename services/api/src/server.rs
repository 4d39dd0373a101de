use crate::cli::ServeArgs;
use crate::infra::{demo_roster, AppState, InMemoryNotificationSink, InMemorySalonRepository};
use crate::routes::with_booking_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use salon_scheduler::config::AppConfig;
use salon_scheduler::error::AppError;
use salon_scheduler::scheduling::{BookingService, Roster, RosterImporter};
use salon_scheduler::telemetry;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let roster = load_roster(args.services_csv.take(), args.stylists_csv.take())?;
    info!(
        services = roster.services.len(),
        stylists = roster.stylists.len(),
        "salon directory seeded"
    );

    let repository = Arc::new(InMemorySalonRepository::with_roster(roster));
    let notifications = Arc::new(InMemoryNotificationSink::default());
    let booking_service = Arc::new(BookingService::new(
        repository,
        notifications,
        config.scheduling.clone(),
    ));

    let app = with_booking_routes(booking_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        conflict_rule = ?config.scheduling.conflict_rule,
        "salon booking service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

/// Both exports or neither; a lone file is a usage error.
pub(crate) fn load_roster(
    services_csv: Option<PathBuf>,
    stylists_csv: Option<PathBuf>,
) -> Result<Roster, AppError> {
    match (services_csv, stylists_csv) {
        (Some(services), Some(stylists)) => Ok(RosterImporter::from_paths(services, stylists)?),
        (None, None) => Ok(demo_roster()),
        _ => Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "--services-csv and --stylists-csv must be supplied together",
        ))),
    }
}
