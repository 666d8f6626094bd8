use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portal_geo::config::Settings;
use portal_geo::location::{LocationResolver, Resolved};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// portal-geo — Chilean regions and communes for the rental portal
///
/// Looks up divisions from the DPA API, caching results and falling back
/// to a built-in dataset when the API is unavailable.
///
/// Examples:
///   portal-geo regions
///   portal-geo communes 13
///   portal-geo --offline communes 5
///   portal-geo validate 05 05109
///   portal-geo serve --port 8000
#[derive(Parser)]
#[command(name = "portal-geo", version, about, long_about = None)]
struct Cli {
    /// Config file (TOML). Defaults to ~/.portal-geo/config.toml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Offline mode: only use cache and built-in data.
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all regions.
    Regions,
    /// List the communes of a region.
    Communes {
        /// Region code, e.g. 13 or 05.
        region: String,
    },
    /// List every commune in the country.
    AllCommunes,
    /// Check that a region/commune pair is offered and print both names.
    Validate { region: String, commune: String },
    /// Serve the lookups over HTTP.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

fn print_resolved<T: Serialize>(what: &str, resolved: &Resolved<T>) -> Result<()> {
    eprintln!("  {} {} ({})", resolved.items.len(), what, resolved.source);
    println!("{}", serde_json::to_string_pretty(&resolved.items)?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    if cli.offline {
        settings.offline = true;
    }
    let resolver = settings.build_resolver();

    match cli.command {
        Command::Regions => print_resolved("regions", &resolver.resolve_regions()),
        Command::Communes { region } => {
            print_resolved("communes", &resolver.resolve_communes(&region))
        }
        Command::AllCommunes => print_resolved("communes", &resolver.resolve_all_communes()),
        Command::Validate { region, commune } => {
            let selection = resolver
                .validate_selection(&region, &commune)
                .with_context(|| format!("invalid selection {}/{}", region, commune))?;
            println!("{}", serde_json::to_string_pretty(&selection)?);
            Ok(())
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| settings.host.clone());
            let port = port.unwrap_or(settings.port);
            serve(resolver, &host, port)
        }
    }
}

fn serve(resolver: LocationResolver, host: &str, port: u16) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    runtime
        .block_on(portal_geo::server::start(Arc::new(resolver), host, port))
        .with_context(|| format!("serving on {}:{}", host, port))
}
