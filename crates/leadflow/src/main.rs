use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leadflow::{
    config::{Config, LogFormat},
    metrics,
    store::{create_store, Lead, Store},
    workflow::TransitionEngine,
};

#[derive(Parser)]
#[command(author, version, about = "Track leads through the NEW → IN_PROGRESS/POSTPONED → DONE workflow", long_about = None)]
struct Cli {
    /// Print the metrics exposition after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema and seed the workflow states
    Init,

    /// Create a lead in state NEW
    Create {
        #[arg(short, long)]
        name: String,
    },

    /// Show one lead
    Show { id: i64 },

    /// List leads
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,

        #[arg(long, default_value_t = 0)]
        offset: i64,
    },

    /// List the workflow states
    States,

    /// Advance a lead toward DONE
    Forward { id: i64 },

    /// Toggle a lead between IN_PROGRESS and POSTPONED
    Switch { id: i64 },

    /// Assign a state id directly, bypassing the transition rules
    SetState { id: i64, state: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("invalid log level")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Full => builder.init(),
    }
    info!("Loaded configuration: {:?}", config);

    // Initialize store
    let store = create_store(&config.database).await?;
    store.init().await?;

    run(cli.command, store).await?;

    if cli.metrics {
        print!("{}", metrics::gather_metrics()?);
    }

    Ok(())
}

async fn run(command: Commands, store: Arc<dyn Store>) -> Result<()> {
    match command {
        Commands::Init => {
            info!("Database ready");
        }
        Commands::Create { name } => {
            let lead = store.create_lead(&name).await?;
            print_json(&lead)?;
        }
        Commands::Show { id } => {
            let lead = load_lead(store.as_ref(), id).await?;
            print_json(&lead)?;
        }
        Commands::List { limit, offset } => {
            let leads = store.list_leads(limit, offset).await?;
            print_json(&leads)?;
        }
        Commands::States => {
            let states = store.list_states().await?;
            print_json(&states)?;
        }
        Commands::Forward { id } => {
            let mut lead = load_lead(store.as_ref(), id).await?;
            TransitionEngine::new(store.clone(), &mut lead)
                .forward()
                .await?;
            print_json(&lead)?;
        }
        Commands::Switch { id } => {
            let mut lead = load_lead(store.as_ref(), id).await?;
            TransitionEngine::new(store.clone(), &mut lead)
                .switch()
                .await?;
            print_json(&lead)?;
        }
        Commands::SetState { id, state } => {
            let mut lead = load_lead(store.as_ref(), id).await?;
            TransitionEngine::new(store.clone(), &mut lead)
                .apply_and_persist(state)
                .await?;
            print_json(&lead)?;
        }
    }
    Ok(())
}

async fn load_lead(store: &dyn Store, id: i64) -> Result<Lead> {
    store
        .get_lead(id)
        .await?
        .ok_or_else(|| leadflow::Error::NotFound(format!("lead {}", id)).into())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
