use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use enact_core::{DistanceUnit, EnactConfig};
use enact_ocm::OcmClient;
use enact_pipeline::{JobMetrics, OutcomeObserver, StationFacade, StationWorker};
use enact_queue::{JobQueue, QueuePolicy, QueueRuntime, Schedule};
use enact_store::{SqliteTacticalStore, TacticalStore};
use tokio::sync::watch;
use tracing::{info, warn};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ENACT_GIT_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "enact-daemon", version = VERSION, about = "Charging station sync worker")]
struct Cli {
    /// Config file. Falls back to $ENACT_CONFIG, then ~/.enact/enact.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process queued jobs until interrupted (default).
    Run,

    /// Register a recurring sync of the sector around a point.
    Spawn {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        /// Radius in KM (default 50).
        #[arg(long)]
        distance: Option<f64>,
    },

    /// Look up one station upstream.
    Station { id: i64 },

    /// Search stations around a point.
    Stations {
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(long)]
        distance: Option<f64>,
        /// KM or Miles.
        #[arg(long)]
        unit: Option<DistanceUnit>,
        #[arg(long)]
        max_results: Option<u32>,
    },

    /// Fetch one station upstream and save it to the tactical store.
    Save { id: i64 },

    /// Show recurring schedules and queue counts.
    Schedules,
}

/// Long-lived collaborators shared by every command.
struct Services {
    store: Arc<SqliteTacticalStore>,
    queue: Arc<JobQueue>,
    source: Arc<OcmClient>,
    facade: StationFacade,
}

impl Services {
    fn build(config: &EnactConfig) -> anyhow::Result<Self> {
        let source = Arc::new(OcmClient::new(&config.upstream).context("building upstream client")?);
        let store = Arc::new(SqliteTacticalStore::new(config.store.path.clone()));

        info!(path = %config.queue.path, "opening job queue");
        let queue = Arc::new(
            JobQueue::open(&config.queue.path, QueuePolicy::from(&config.queue))
                .with_context(|| format!("opening job queue at {}", config.queue.path))?,
        );

        let facade = StationFacade::new(source.clone(), store.clone(), queue.clone())
            .with_fetch_interval(config.jobs.fetch_interval_secs);

        Ok(Self {
            store,
            queue,
            source,
            facade,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "enact_daemon=info,enact_queue=info,enact_pipeline=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // explicit --config > ENACT_CONFIG env > ~/.enact/enact.toml
    let config_path = cli.config.or_else(|| std::env::var("ENACT_CONFIG").ok());
    let config = EnactConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        EnactConfig::default()
    });

    let services = Services::build(&config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, services).await?,
        Command::Spawn {
            latitude,
            longitude,
            distance,
        } => {
            services.facade.spawn_fetch_job(latitude, longitude, distance)?;
            println!("true");
        }
        Command::Station { id } => match services.facade.get_station(id).await? {
            Some(station) => print_json(&station)?,
            None => println!("null"),
        },
        Command::Stations {
            latitude,
            longitude,
            distance,
            unit,
            max_results,
        } => {
            let stations = services
                .facade
                .get_stations(latitude, longitude, distance, unit, max_results)
                .await?;
            print_json(&stations)?;
        }
        Command::Save { id } => {
            services
                .store
                .connect()
                .await
                .with_context(|| format!("connecting tactical store at {}", config.store.path))?;
            let saved = services.facade.save_station(id).await;
            services.store.disconnect().await?;
            match saved? {
                Some(station) => print_json(&station)?,
                None => println!("null"),
            }
        }
        Command::Schedules => print_schedules(&services.queue)?,
    }
    Ok(())
}

async fn run(config: &EnactConfig, services: Services) -> anyhow::Result<()> {
    info!(
        version = VERSION,
        upstream = %config.upstream.base_url,
        store = %config.store.path,
        "enact daemon starting"
    );

    // A failed connect leaves the store degraded: jobs keep running and
    // fail until the store comes back on a later start.
    if let Err(e) = services.store.connect().await {
        warn!("tactical store unavailable, station writes will fail: {e}");
    }

    let metrics = JobMetrics::new()?;
    let worker = StationWorker::new(services.source.clone(), services.store.clone());
    let mut runtime = QueueRuntime::new(services.queue.clone(), Arc::new(worker))
        .with_observer(Arc::new(OutcomeObserver::new(metrics.clone())))
        .with_poll_interval(Duration::from_millis(config.queue.poll_interval_ms.max(1)));
    if config.queue.retention_secs > 0 {
        runtime = runtime.with_retention(Duration::from_secs(config.queue.retention_secs));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_task = tokio::spawn(runtime.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // signal the runtime to stop, let the job in flight finish
    let _ = shutdown_tx.send(true);
    worker_task.await?;

    services.store.disconnect().await?;
    info!("job counters at shutdown:\n{}", metrics.render()?);
    Ok(())
}

fn print_schedules(queue: &JobQueue) -> anyhow::Result<()> {
    for job in queue.active_schedules()? {
        let every = match job.schedule {
            Schedule::Interval { every_secs } => format!("every {every_secs}s"),
            Schedule::Once => "once".to_string(),
        };
        let next = job
            .next_run_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {}  {}  status={} runs={} next={} last_error={}",
            job.id,
            job.kind,
            job.payload,
            every,
            job.status,
            job.run_count,
            next,
            job.last_error.as_deref().unwrap_or("-"),
        );
    }

    let stats = queue.stats()?;
    println!(
        "queued={} running={} completed={} failed={}",
        stats.queued, stats.running, stats.completed, stats.failed
    );
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
