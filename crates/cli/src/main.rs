use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use provision_app::Bootstrapper;
use provision_db::MongoServer;
use provision_kernel::{Manifest, Server, Settings};

#[derive(Debug, Parser)]
#[command(name = "provision", version, about = "Provision the measurement databases")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the administrative principal and every manifest collection.
    Run(TargetArgs),
    /// Compare the server against the manifest without changing anything.
    Status(TargetArgs),
    /// Validate and print the effective manifest.
    Manifest {
        /// TOML manifest to use instead of the built-in table.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
}

#[derive(Debug, clap::Args)]
struct TargetArgs {
    /// TOML manifest to use instead of the built-in table.
    #[arg(long)]
    manifest: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the command fully succeeded.
async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let settings = Settings::load().with_context(|| "failed to load provisioning settings")?;
    provision_telemetry::init(&settings.telemetry)
        .with_context(|| "failed to initialize telemetry")?;

    tracing::info!(
        env = ?settings.environment,
        db = %settings.database.redacted_uri(),
        "provision starting"
    );

    match cli.command {
        Command::Manifest { manifest } => {
            let manifest = load_manifest(manifest, &settings)?;
            print_manifest(&manifest);
            Ok(true)
        }
        Command::Run(args) => {
            let manifest = load_manifest(args.manifest, &settings)?;
            let mut server = MongoServer::connect(&settings.database).await?;
            let mut bootstrapper = Bootstrapper::new(
                &manifest,
                &settings.principal,
                settings.database.connect_timeout(),
            );

            let result = bootstrapper.run(&mut server).await;
            server.disconnect().await;
            let report = result?;

            tracing::info!(
                created = report.created_total(),
                already_present = report.already_present_total(),
                success = report.is_success(),
                "provisioning finished"
            );
            match args.format {
                Format::Text => println!("{report}"),
                Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            }
            Ok(report.is_success())
        }
        Command::Status(args) => {
            let manifest = load_manifest(args.manifest, &settings)?;
            let mut server = MongoServer::connect(&settings.database).await?;
            let mut bootstrapper = Bootstrapper::new(
                &manifest,
                &settings.principal,
                settings.database.connect_timeout(),
            );

            let result = bootstrapper.status(&mut server).await;
            server.disconnect().await;
            let status = result?;

            match args.format {
                Format::Text => println!("{status}"),
                Format::Json => println!("{}", serde_json::to_string_pretty(&status)?),
            }
            Ok(status.is_complete())
        }
    }
}

/// `--manifest` wins over the `manifest_path` setting.
fn load_manifest(flag: Option<PathBuf>, settings: &Settings) -> anyhow::Result<Manifest> {
    let path = flag.or_else(|| settings.manifest_path.clone());
    let manifest = Manifest::resolve(path.as_deref()).with_context(|| "failed to load manifest")?;
    tracing::debug!(
        namespaces = manifest.namespaces.len(),
        collections = manifest.collection_count(),
        "manifest loaded"
    );
    Ok(manifest)
}

fn print_manifest(manifest: &Manifest) {
    for entry in &manifest.namespaces {
        println!("{} ({} collections)", entry.name, entry.collections.len());
        for collection in &entry.collections {
            println!("  {collection}");
        }
    }
}
