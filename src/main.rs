use std::io::Write;
use std::sync::Arc;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tokio::signal;

use growlink::config::{self, AppConfig};
use growlink::control::CommitOutcome;
use growlink::error::{ApiError, ApiResult};
use growlink::gateway::{BackendClient, EntityStore, HassClient};
use growlink::model::prefs::PreferenceStore;
use growlink::poll::SessionEvent;
use growlink::present::{DomainGroup, GrowGroup};
use growlink::session::GatewaySession;
use growlink_api::{GatewayId, GrowId, Stage};

#[derive(Parser)]
#[command(name = "growlink")]
#[command(about = "Link Home Assistant entities to grows and control them", long_about = None)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long, default_value = "config.yaml")]
    config: Utf8PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured gateways
    Gateways,

    /// Show linked entities by grow and stage, and the linkable pool
    Entities {
        gateway: GatewayId,

        /// Free-text filter for the linkable pool
        #[arg(long, default_value = "")]
        query: String,
    },

    /// Link one or more entities to a grow stage
    Link {
        gateway: GatewayId,
        #[arg(long)]
        grow: GrowId,
        #[arg(long)]
        stage: Stage,
        #[arg(required = true)]
        entities: Vec<String>,
    },

    /// Unlink one or more entities
    Unlink {
        gateway: GatewayId,
        #[arg(required = true)]
        entities: Vec<String>,
    },

    /// Toggle a linked on/off entity
    Toggle { gateway: GatewayId, entity: String },

    /// Set the value of a linked numeric entity
    Set {
        gateway: GatewayId,
        entity: String,
        value: String,
    },

    /// Step a linked numeric entity up (or down) by one
    Step {
        gateway: GatewayId,
        entity: String,
        #[arg(long)]
        down: bool,
    },

    /// Enable or disable polling of a gateway
    Activate {
        gateway: GatewayId,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },

    /// Poll a gateway and print state changes until interrupted
    Watch { gateway: GatewayId },

    /// Edit the linkable pool filter
    #[command(subcommand)]
    Filter(FilterCommands),
}

#[derive(Subcommand)]
enum FilterCommands {
    /// Show current filter preferences
    Show,
    /// Toggle a domain in the allow-list
    Domain { domain: String },
    /// Toggle a device class in the allow-list
    Class { device_class: String },
    /// Show all domains regardless of the allow-list
    ShowAll {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Restore default preferences
    Reset,
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &["info", "reqwest=warn", "hyper_util=warn"];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    Ok(pretty_env_logger::formatted_timed_builder()
        .parse_filters(&log_filters)
        .try_init()?)
}

struct Context {
    config: AppConfig,
    backend: Arc<BackendClient>,
}

impl Context {
    fn new(config: AppConfig) -> ApiResult<Self> {
        let backend = Arc::new(BackendClient::from_env(&config.backend)?);
        Ok(Self { config, backend })
    }

    async fn session(&self, gateway_id: GatewayId) -> ApiResult<GatewaySession> {
        let gateway = self.backend.get_gateway(gateway_id).await?;
        let api = HassClient::new(&gateway, self.config.growlink.gateway_timeout())?;
        let store: Arc<dyn EntityStore> = self.backend.clone();
        let session = GatewaySession::new(
            gateway,
            Arc::new(api),
            store,
            self.config.growlink.poll_interval(),
        );
        let counts = session.load().await?;
        log::debug!(
            "[{}] {} linked, {} linkable, {} unreachable",
            session.gateway().name,
            counts.linked,
            counts.linkable,
            counts.unreachable
        );
        Ok(session)
    }
}

fn print_linked(groups: &[GrowGroup]) {
    if groups.is_empty() {
        println!("No linked entities");
    }
    for group in groups {
        println!("{}", group.label);
        for stage in &group.stages {
            println!("  {}", stage.label());
            for row in &stage.rows {
                match &row.remote {
                    Some(remote) => println!(
                        "    {:<40} {:<30} {}",
                        row.entity.entity_id,
                        row.display_name(),
                        remote.display_state()
                    ),
                    None => println!(
                        "    {:<40} {:<30} (unreachable)",
                        row.entity.entity_id,
                        row.display_name()
                    ),
                }
            }
        }
    }
}

fn print_linkable(groups: &[DomainGroup]) {
    for group in groups {
        println!("{} ({})", group.domain, group.entities.len());
        for ent in &group.entities {
            println!(
                "  {:<40} {:<30} {}",
                ent.entity_id,
                ent.friendly_name,
                ent.display_state()
            );
        }
    }
}

async fn watch(session: &mut GatewaySession) -> ApiResult<()> {
    let mut events = session.subscribe();
    session.start();
    if !session.is_polling() {
        return Err(ApiError::Validation(format!(
            "gateway {} is not active",
            session.gateway().name
        )));
    }

    loop {
        tokio::select! {
            res = signal::ctrl_c() => {
                res?;
                log::warn!("Ctrl-C pressed, exiting..");
                let _ = std::io::stderr().flush();
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::SnapshotApplied { seq, entities }) => {
                    let registry = session.registry();
                    let reg = registry.lock().await;
                    let counts = reg.counts();
                    println!(
                        "#{seq}: {entities} entities, {} linked, {} unreachable",
                        counts.linked, counts.unreachable
                    );
                    for (ent, remote) in reg.controllable() {
                        println!("  {:<40} {}", ent.entity_id, remote.display_state());
                    }
                }
                Ok(SessionEvent::PollFailed(msg)) => println!("poll failed: {msg}"),
                Ok(SessionEvent::Unauthorized) => {
                    return Err(ApiError::Unauthorized("gateway rejected credentials".to_string()));
                }
                Err(err) => log::debug!("Event stream: {err}"),
            }
        }
    }

    session.stop();
    Ok(())
}

fn run_filter(prefs_file: Utf8PathBuf, cmd: FilterCommands) -> ApiResult<()> {
    let mut store = PreferenceStore::load(prefs_file)?;
    match cmd {
        FilterCommands::Show => {}
        FilterCommands::Domain { domain } => {
            let on = store.toggle_domain(&domain)?;
            println!("domain {domain}: {}", if on { "shown" } else { "hidden" });
        }
        FilterCommands::Class { device_class } => {
            let on = store.toggle_device_class(&device_class)?;
            println!("device class {device_class}: {}", if on { "shown" } else { "hidden" });
        }
        FilterCommands::ShowAll { enabled } => store.set_show_all_domains(enabled)?,
        FilterCommands::Reset => store.reset()?,
    }
    println!("{}", serde_yml::to_string(store.prefs())?);
    Ok(())
}

async fn run() -> ApiResult<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = config::parse(&cli.config)?;
    log::debug!("Configuration loaded successfully");

    let command = match cli.command {
        Commands::Filter(cmd) => return run_filter(config.growlink.prefs_file, cmd),
        command => command,
    };

    let ctx = Context::new(config)?;

    match command {
        Commands::Gateways => {
            for gw in ctx.backend.list_gateways().await? {
                println!(
                    "{:>4}  {:<24} {:<8} {}",
                    gw.id,
                    gw.name,
                    if gw.is_active { "active" } else { "inactive" },
                    gw.api_url
                );
            }
        }
        Commands::Entities { gateway, query } => {
            let session = ctx.session(gateway).await?;
            let grows = ctx.backend.list_grows().await?;
            let prefs = PreferenceStore::load(ctx.config.growlink.prefs_file.clone())?;

            print_linked(&session.linked_groups(&grows).await);
            println!();
            print_linkable(&session.linkable_groups(prefs.prefs(), &query).await);
        }
        Commands::Link {
            gateway,
            grow,
            stage,
            entities,
        } => {
            let session = ctx.session(gateway).await?;
            if let [entity] = entities.as_slice() {
                session.link(entity, grow, stage).await?;
                println!("Linked {entity}");
            } else {
                let report = session.bulk_link(&entities, grow, stage).await?;
                for (id, err) in report.failures() {
                    println!("  {id}: {err}");
                }
                println!("{report}");
            }
        }
        Commands::Unlink { gateway, entities } => {
            let session = ctx.session(gateway).await?;
            let report = session.bulk_unlink(&entities).await?;
            for (id, err) in report.failures() {
                println!("  {id}: {err}");
            }
            println!("{report}");
        }
        Commands::Toggle { gateway, entity } => {
            let session = ctx.session(gateway).await?;
            session.toggle(&entity).await?;
            let registry = session.registry();
            let reg = registry.lock().await;
            if let Some(remote) = reg.remote(&entity) {
                println!("{entity}: {}", remote.display_state());
            }
        }
        Commands::Set {
            gateway,
            entity,
            value,
        } => {
            let session = ctx.session(gateway).await?;
            match session.commit_value(&entity, &value).await? {
                CommitOutcome::Skipped => println!("Nothing to set"),
                CommitOutcome::Committed(value) => println!("{entity}: set to {value}"),
            }
        }
        Commands::Step {
            gateway,
            entity,
            down,
        } => {
            let session = ctx.session(gateway).await?;
            let Some(value) = session.adjust_value(&entity, !down).await? else {
                return Err(ApiError::Validation(format!(
                    "{entity} does not report a numeric state"
                )));
            };
            if let CommitOutcome::Committed(value) = session.commit_value(&entity, &value).await? {
                println!("{entity}: set to {value}");
            }
        }
        Commands::Activate { gateway, active } => {
            let gw = ctx.backend.set_gateway_enabled(gateway, active).await?;
            println!(
                "{}: {}",
                gw.name,
                if gw.is_active { "active" } else { "inactive" }
            );
        }
        Commands::Watch { gateway } => {
            let mut session = ctx.session(gateway).await?;
            watch(&mut session).await?;
        }
        Commands::Filter(_) => unreachable!("filter commands run before the backend is set up"),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        if err.is_unauthorized() {
            log::error!("Credentials rejected: {err}");
            log::error!("Refresh the token and try again.");
        } else {
            log::error!("Growlink error: {err}");
        }
        std::process::exit(1);
    }
}
