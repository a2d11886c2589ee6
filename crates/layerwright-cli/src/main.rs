mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CATALOG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "layerwright",
    version,
    about = "Provision cached, provenance-tracked dependency layers"
)]
struct Cli {
    /// Layers directory the dependency layer is provisioned into.
    #[arg(long, env = "CNB_LAYERS_DIR", default_value = "layers", global = true)]
    layers: PathBuf,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    /// Buildpack log level; DEBUG enables debug logging.
    #[arg(long, env = "BP_LOG_LEVEL", default_value = "INFO", global = true, hide = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Provision a dependency layer, reusing the cached one when its checksum matches.
    Build {
        /// Path to the dependency catalog.
        #[arg(long, default_value = "buildpack.toml")]
        catalog: PathBuf,
        /// Stack the layer is built for.
        #[arg(long, env = "CNB_STACK_ID")]
        stack: String,
        /// Build plan TOML. Without one, the dependency is requested with
        /// the --build/--launch flags given here.
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Catalog id of the dependency to provision.
        #[arg(long, default_value = "pnpm")]
        dependency: String,
        /// Make the layer available at build time (only without --plan).
        #[arg(long, default_value_t = false, conflicts_with = "plan")]
        build: bool,
        /// Make the layer available at launch time (only without --plan).
        #[arg(long, default_value_t = false, conflicts_with = "plan")]
        launch: bool,
        /// SBOM format to emit, by media type or short name. Repeatable.
        #[arg(long = "sbom-format", value_delimiter = ',')]
        sbom_formats: Vec<String>,
        /// Also write legacy [[bom]] entries to build.toml / launch.toml.
        #[arg(long, default_value_t = false)]
        legacy_sbom: bool,
        /// Skip SBOM generation entirely.
        #[arg(long, env = "BP_DISABLE_SBOM")]
        disable_sbom: Option<String>,
        /// Timestamp (seconds since epoch) for SBOMs. Unset stamps the Unix epoch.
        #[arg(long, env = "SOURCE_DATE_EPOCH")]
        source_date_epoch: Option<String>,
    },
    /// Show the persisted record of a provisioned layer.
    Inspect {
        /// Layer name (the dependency id).
        #[arg(default_value = "pnpm")]
        layer: String,
    },
    /// Discover upstream releases and generate catalog entries.
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
enum CatalogCommands {
    /// List upstream versions eligible for the catalog.
    Versions {
        #[command(flatten)]
        upstream: commands::catalog::Upstream,
    },
    /// Generate catalog entries for every eligible version, or one.
    Generate {
        #[command(flatten)]
        upstream: commands::catalog::Upstream,
        /// Only generate the entries for this version.
        #[arg(long)]
        version: Option<String>,
        /// Write the catalog here instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose || cli.log_level.eq_ignore_ascii_case("debug") {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("LAYERWRIGHT_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;

    let result = match cli.command {
        Commands::Build {
            catalog,
            stack,
            plan,
            dependency,
            build,
            launch,
            sbom_formats,
            legacy_sbom,
            disable_sbom,
            source_date_epoch,
        } => commands::build::run(
            &cli.layers,
            &commands::build::BuildArgs {
                catalog,
                stack,
                plan,
                dependency,
                build,
                launch,
                sbom_formats,
                legacy_sbom,
                disable_sbom,
                source_date_epoch,
            },
            json_output,
        ),
        Commands::Inspect { layer } => commands::inspect::run(&cli.layers, &layer, json_output),
        Commands::Catalog { command } => match command {
            CatalogCommands::Versions { upstream } => {
                commands::catalog::versions(&upstream, json_output)
            }
            CatalogCommands::Generate {
                upstream,
                version,
                output,
            } => commands::catalog::generate(
                &upstream,
                version.as_deref(),
                output.as_deref(),
                json_output,
            ),
        },
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("catalog error:") || msg.starts_with("plan error:") {
                EXIT_CATALOG_ERROR
            } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
