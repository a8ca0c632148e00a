use std::net::SocketAddr;
use std::sync::Arc;

use planter_advisor::{CareAdvisor, FallbackCareAdvisor, OpenAiCareAdvisor, PlantIdClient, PlantIdentifier};
use planter_core::{PlanterConfig, PlanterController};
use planter_sched::SystemClock;
use planter_store::LogAlertSink;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod routes;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planter=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = PlanterConfig::from_env()?;
    match (&cfg.rtdb, &cfg.profiles_file) {
        (Some(rtdb), _) => tracing::info!(url = %rtdb.url, "using realtime database"),
        (None, Some(path)) => tracing::info!(path = %path.display(), "using local profile file, actuators disabled"),
        (None, None) => tracing::warn!("no backend configured, profiles kept in memory and actuators disabled"),
    }

    let controller = Arc::new(PlanterController::new(
        cfg.profile_store(),
        cfg.actuator_sink(),
        Arc::new(LogAlertSink),
        Arc::new(SystemClock),
        cfg.settings(),
    ));
    let restored = controller.restore().await?;
    tracing::info!(devices = restored, "restored hardware-backed profiles");

    let identifier: Option<Arc<dyn PlantIdentifier>> = cfg
        .plant_id
        .api_key
        .as_ref()
        .map(|key| Arc::new(PlantIdClient::new(cfg.plant_id.url.clone(), key.clone())) as Arc<dyn PlantIdentifier>);
    let advisor: Arc<dyn CareAdvisor> = match &cfg.llm.api_key {
        Some(key) => Arc::new(OpenAiCareAdvisor::new(
            cfg.llm.url.clone(),
            key.clone(),
            cfg.llm.model.clone(),
        )),
        None => Arc::new(FallbackCareAdvisor),
    };
    if identifier.is_none() {
        tracing::warn!("PLANT_ID_API_KEY not set, photo-derived profiles disabled");
    }

    let app_state = AppState {
        controller: Arc::clone(&controller),
        identifier,
        advisor,
    };
    let app = routes::router(app_state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = cfg.http_addr.parse()?;
    tracing::info!("planter HTTP server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("stopping devices");
    controller.shutdown().await;
    Ok(())
}
