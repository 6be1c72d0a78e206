//! Staging store CLI
//!
//! Entry point for the `stage` command-line tool.

use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use staging_store::checks::{write_checksums, ChecksumAlgorithm};
use staging_store::config::{parse_overrides, user_config_path, PROJECT_CONFIG_PATH};
use staging_store::publish::PublishResult;
use staging_store::{
    Artifact, ArtifactStoreManager, CheckRegistry, DirectoryLocker, EffectiveConfig, ManagerError,
    PublishError, PublishReport, PublishSession, PublisherRegistry, StoreAccess,
};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "STAGE_LOG";

#[derive(Parser)]
#[command(name = "stage")]
#[command(about = "Stage, validate and publish build artifacts", version)]
struct Cli {
    /// User config file (default: ~/.config/stage/config.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Project config file (default: .stage/config.toml)
    #[arg(long, global = true)]
    project_config: Option<PathBuf>,

    /// Override a config value, e.g. -D parallelism=4
    #[arg(short = 'D', value_name = "KEY=VALUE", global = true)]
    define: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new store
    Create {
        /// Template name (default: the `template` config value)
        #[arg(long, short = 't')]
        template: Option<String>,
    },

    /// List stores
    List {
        #[arg(long)]
        json: bool,
    },

    /// Show a store's metadata and artifacts
    Show {
        name: String,

        #[arg(long)]
        json: bool,
    },

    /// List available templates
    Templates,

    /// Add a file to a store
    Add {
        name: String,

        /// group:artifact[:extension[:classifier]]:version
        coordinate: String,

        file: PathBuf,

        /// Also store md5, sha1, sha256 and sha512 companions
        #[arg(long)]
        checksums: bool,
    },

    /// Drop a store
    Drop { name: String },

    /// Drop every store not in use
    DropAll,

    /// Export a store as a tar archive
    Export { name: String, file: PathBuf },

    /// Import a store from a tar archive
    Import { file: PathBuf },

    /// Validate a store against its publisher's requirements
    Prepare {
        name: String,

        #[arg(long, short = 'p')]
        publisher: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Validate and publish a store
    Perform {
        name: String,

        #[arg(long, short = 'p')]
        publisher: Option<String>,

        /// Resolve and validate, but do not transfer
        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration (secrets redacted)
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(cli) {
        if let Some(tree) = e.report().and_then(|r| r.validation.as_ref()) {
            eprint!("{}", tree.render());
        }
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> PublishResult<EffectiveConfig> {
    let user = cli.config.clone().or_else(user_config_path);
    let project = cli
        .project_config
        .clone()
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_PATH));
    let overrides = if cli.define.is_empty() {
        None
    } else {
        Some(parse_overrides(&cli.define)?)
    };
    Ok(EffectiveConfig::build(user.as_deref(), Some(project.as_path()), overrides)?)
}

fn print_json<T: Serialize>(value: &T) -> PublishResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    println!("{}", json);
    Ok(())
}

fn run(cli: Cli) -> PublishResult<()> {
    let config = load_config(&cli)?;
    let manager = ArtifactStoreManager::new(config.base_dir(), Arc::new(DirectoryLocker::new()))?;

    match cli.command {
        Commands::Create { template } => {
            let template = manager.template(template.as_deref().unwrap_or(config.template()))?;
            let store = manager.create(template)?;
            println!("{}", store.name());
            store.close().map_err(ManagerError::from)?;
        }
        Commands::List { json } => {
            let names = manager.list_sorted()?;
            if json {
                print_json(&names)?;
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        Commands::Show { name, json } => {
            let metadata = manager.peek(&name)?;
            if json {
                print_json(&metadata)?;
            } else {
                println!("{} ({}, {}, {})", metadata.name, metadata.template, metadata.repository_mode, metadata.state);
                for artifact in &metadata.artifacts {
                    println!("  {}", artifact);
                }
            }
        }
        Commands::Templates => {
            for template in manager.templates() {
                println!(
                    "{}\tprefix={}\tmode={}\tredeploy={}",
                    template.name, template.prefix, template.repository_mode, template.allow_redeploy
                );
            }
        }
        Commands::Add {
            name,
            coordinate,
            file,
            checksums,
        } => {
            let artifact = Artifact::parse(&coordinate)?;
            let mut store = manager.select(&name, StoreAccess::Write)?;
            let bytes = store.put_file(artifact.clone(), &file)?;
            if checksums {
                write_checksums(&mut store, &artifact, &ChecksumAlgorithm::all())?;
            }
            println!("{} ({} bytes)", artifact, bytes);
            store.close().map_err(ManagerError::from)?;
        }
        Commands::Drop { name } => {
            manager.drop_store(&name)?;
            println!("dropped {}", name);
        }
        Commands::DropAll => {
            let result = manager.drop_all()?;
            for name in &result.dropped {
                println!("dropped {}", name);
            }
            for (name, reason) in &result.skipped {
                eprintln!("skipped {}: {}", name, reason);
            }
        }
        Commands::Export { name, file } => {
            let summary = manager.export(&name, &file)?;
            println!(
                "exported {} ({} artifacts, {} bytes) to {}",
                summary.store,
                summary.artifacts,
                summary.bytes,
                file.display()
            );
        }
        Commands::Import { file } => {
            let store = manager.import(&file)?;
            println!("{}", store.name());
            store.close().map_err(ManagerError::from)?;
        }
        Commands::Prepare { name, publisher, json } => {
            let store = manager.select(&name, StoreAccess::Read)?;
            let publishers = publishers(&config, &config.local_repository())?;
            let session = session(&config, false)?;
            let publisher = publishers.resolve(publisher.as_deref(), &session, store.repository_mode())?;

            let result = publisher.prepare(&store, &session);
            store.close().map_err(ManagerError::from)?;
            print_report(result, json)?;
        }
        Commands::Perform {
            name,
            publisher,
            dry_run,
            json,
        } => {
            let mut store = manager.select(&name, StoreAccess::Write)?;
            let publishers = publishers(&config, &config.local_repository())?;
            let session = session(&config, dry_run)?;
            let publisher = publishers.resolve(publisher.as_deref(), &session, store.repository_mode())?;

            let result = publisher.perform(&mut store, &session);
            let published = matches!(&result, Ok(report) if !report.dry_run);
            if published && config.drop_after_publish() {
                manager.discard(store)?;
            } else {
                store.close().map_err(ManagerError::from)?;
            }
            print_report(result, json)?;
        }
        Commands::Config => {
            print_json(&config)?;
        }
    }
    Ok(())
}

fn publishers(config: &EffectiveConfig, local_repository: &Path) -> PublishResult<PublisherRegistry> {
    let checks = CheckRegistry::with_defaults(config.trusted_keys()?);
    PublisherRegistry::builtin(&checks, &config.requirement_specs()?, local_repository)
}

fn session(config: &EffectiveConfig, dry_run: bool) -> PublishResult<PublishSession<'_>> {
    Ok(PublishSession::new(config, config.distribution()?)
        .with_dry_run(dry_run || config.dry_run())
        .with_parallelism(config.parallelism())
        .with_direct_only_urls(config.direct_only_urls()))
}

fn print_report(result: Result<PublishReport, PublishError>, json: bool) -> PublishResult<()> {
    let report = match &result {
        Ok(report) => Some(report),
        Err(e) => e.report(),
    };
    if let Some(report) = report {
        if json {
            print_json(report)?;
        } else if result.is_ok() {
            if let Some(tree) = &report.validation {
                print!("{}", tree.render());
            }
            match &report.target {
                Some(target) if report.dry_run => println!("{} (dry run) -> {}", report.state, target),
                Some(target) => println!("{} -> {}", report.state, target),
                None => println!("{}", report.state),
            }
        }
    }
    result.map(|_| ())
}
