//! LessonCraft orchestrator entry point.
//!
//! Wires storage, provisioners, the orchestration service, the background
//! sweeper, and the HTTP gateway, then serves until a termination signal.
//! Exits 0 on clean shutdown and 1 on initialization failure (storage
//! unreachable, playground bootstrap failed, port bind failed).

use std::sync::Arc;
use std::time::Duration;

use lessoncraft_auth::{AuthConfig, TokenService};
use lessoncraft_events::EventBus;
use lessoncraft_gateway::{create_router, AppState, GatewayConfig};
use lessoncraft_orchestrator::{FabricService, OrchestratorConfig, ProcLoad};
use lessoncraft_provision::{
    DindProvisioner, InstanceProvisioner, ProvisionerFactory, SingleEngineFactory,
    WindowsProvisioner,
};
use lessoncraft_scheduler::tasks::{
    CheckK8sClusterExposedPorts, CheckK8sClusterStatus, CheckPorts, CheckSwarmPorts,
    CheckSwarmStatus, CollectStats,
};
use lessoncraft_scheduler::{Supervisor, SupervisorConfig, Task};
use lessoncraft_store::{CachedLessonStore, DocStore, Playground, Store};
use lessoncraft_core::PlaygroundId;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight operations get after a termination signal before
/// streams are force-closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,lessoncraft=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "initialization failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    info!("starting LessonCraft orchestrator");
    let config = GatewayConfig::from_env();
    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        playground_domain = %config.playground_domain,
        windows_enabled = config.windows_enabled,
        "configuration loaded"
    );

    // Storage. Unreachable storage is an initialization failure.
    let store = Arc::new(DocStore::open(&config.data_dir)?);
    let lessons = Arc::new(CachedLessonStore::new(
        Arc::clone(&store),
        config.lesson_cache_ttl,
    ));
    lessons.spawn_cleaner();

    let events = Arc::new(EventBus::new());

    // Provisioning backends.
    let engines = Arc::new(SingleEngineFactory::new(config.engine_port));
    let dind = Arc::new(DindProvisioner::new(
        Arc::clone(&engines) as _,
        Arc::clone(&store),
        Arc::clone(&lessons),
    )?);
    let windows = config
        .windows_enabled
        .then(|| Arc::new(WindowsProvisioner::new(Arc::clone(&store))) as Arc<dyn InstanceProvisioner>);
    let provisioners = ProvisionerFactory::new(dind, windows);

    // Orchestration service.
    let fabric = Arc::new(FabricService::new(
        Arc::clone(&store),
        Arc::clone(&events),
        provisioners,
        Box::new(ProcLoad),
        OrchestratorConfig {
            max_load_avg: config.max_load_avg,
            default_session_duration: config.default_session_duration,
            apparmor_profile: (!config.apparmor_profile.is_empty())
                .then(|| config.apparmor_profile.clone()),
            ..OrchestratorConfig::default()
        },
    ));

    // Bootstrap the serving playground. A failure here is fatal.
    let playground = match store.playground_by_domain(&config.playground_domain).await? {
        Some(playground) => playground,
        None => {
            info!(domain = %config.playground_domain, "creating bootstrap playground");
            let mut playground =
                Playground::new(PlaygroundId::new("default"), config.playground_domain.clone());
            playground.default_duration = config.default_session_duration;
            playground.default_dind_instance_image = config.default_dind_image.clone();
            playground.available_dind_instance_images = config.available_dind_images.clone();
            playground.allow_windows_instances = config.windows_enabled;
            store.playground_put(&playground).await?;
            playground
        }
    };

    // Background sweeper.
    let tasks: Vec<Arc<dyn Task>> = vec![
        Arc::new(CheckPorts::new(
            Arc::clone(&engines) as _,
            Arc::clone(&store),
        )),
        Arc::new(CheckSwarmStatus::new(
            Arc::clone(&engines) as _,
            Arc::clone(&store),
        )),
        Arc::new(CheckSwarmPorts::new(
            Arc::clone(&engines) as _,
            Arc::clone(&store),
        )),
        Arc::new(CollectStats::new(
            Arc::clone(&engines) as _,
            Arc::clone(&store),
            Arc::clone(&events),
        )?),
        Arc::new(CheckK8sClusterStatus::new(Arc::clone(&store))),
        Arc::new(CheckK8sClusterExposedPorts::new(Arc::clone(&store))),
    ];
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&store),
        Arc::clone(&fabric),
        tasks,
        SupervisorConfig::default(),
    ));
    tokio::spawn(Arc::clone(&supervisor).run());

    // HTTP surface.
    let tokens = Arc::new(TokenService::new(AuthConfig::new(
        config.cookie_secret.clone(),
    )));
    let state = AppState::new(
        fabric,
        lessons,
        events,
        tokens,
        playground.safety_policy,
        config.clone(),
    );
    let app = create_router(state);

    // A failed bind is an initialization failure.
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(listen_addr = %config.listen_addr, "serving");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("clean shutdown");
    Ok(())
}

/// Resolves when SIGTERM or ctrl-c arrives. New sessions stop being
/// accepted immediately; a watchdog force-closes anything still running
/// after the grace period.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    info!(
        grace_s = SHUTDOWN_GRACE.as_secs(),
        "termination signal received, draining"
    );

    tokio::spawn(async {
        tokio::time::sleep(SHUTDOWN_GRACE).await;
        error!("grace period elapsed, force-closing");
        std::process::exit(0);
    });
}
