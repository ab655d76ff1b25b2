mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{ComponentArgs, LocalArgs};
use snowdev_core::task::TaskAction;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "snowdev",
    about = "Deploy Python UDFs, stored procedures, Streamlit apps, tasks and pipes to Snowflake",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from snowdev.yaml or .git/)
    #[arg(long, global = true, env = "SNOWDEV_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the project layout, snowdev.yaml and .env template
    Init,

    /// Scaffold a new component from its template
    New {
        #[command(flatten)]
        component: ComponentArgs,
    },

    /// Run a UDF or stored procedure locally through poetry
    Test {
        #[command(flatten)]
        component: LocalArgs,
    },

    /// Deploy a component to Snowflake
    Deploy {
        #[command(flatten)]
        component: ComponentArgs,

        /// Task action to run after the task SQL: execute, resume or suspend
        #[arg(long)]
        action: Option<TaskAction>,
    },

    /// Upload static/ to the project stage
    Upload,

    /// Check whether a package is available in the Snowflake channel
    Package {
        /// Package name, e.g. pandas
        name: String,
    },

    /// Show the session environment (user, role, database, schema, warehouse)
    Info,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Deploy { .. } | Commands::Upload | Commands::Test { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    root::load_env(&root);

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::New { component } => cmd::new::run(&root, &component, cli.json),
        Commands::Test { component } => cmd::test::run(&root, &component),
        Commands::Deploy { component, action } => {
            cmd::deploy::run(&root, &component, action, cli.json)
        }
        Commands::Upload => cmd::upload::run(&root, cli.json),
        Commands::Package { name } => cmd::package::run(&root, &name, cli.json),
        Commands::Info => cmd::info::run(cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
