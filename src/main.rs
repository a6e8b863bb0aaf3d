//! couchapp - push CouchApp bundles to CouchDB.
//!
//! Reads the global `~/.couchapp.conf` and the application's local
//! configuration, resolves database aliases, runs hooks around each push,
//! and writes design documents (or exports them as JSON).
//!
//!   couchapp init [APP]                 # create an application skeleton
//!   couchapp push [APP] [DB]            # push one application
//!   couchapp push --export -o app.json  # export instead of pushing
//!   couchapp pushapps apps/ prod        # push every application under apps/
//!   couchapp pushdocs _docs/ prod       # push a folder of plain documents
//!   couchapp config                     # show aliases, hooks and extensions

mod application;
mod cli;
mod domain;
mod infrastructure;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::{
    bulk_docs, format_config_json, format_env_table, format_extensions, format_hooks,
    ConfigStore, PushRequest, PushService,
};
use cli::{push_targets, Cli, Commands};
use domain::CommandReport;

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(report) => {
            if let Some(output) = report.output {
                println!("{output}");
            }
            std::process::exit(report.exit_code);
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Main application logic.
fn run(cli: Cli) -> domain::Result<CommandReport> {
    let config = ConfigStore::discover()?;

    match cli.command {
        Commands::Init { path } => {
            let report = PushService::new(config).init(path.as_deref())?;
            println!("{} Initialized application", "✓".green().bold());
            Ok(report)
        }
        Commands::Push {
            targets,
            export,
            docid,
            doc_only,
            browse,
        } => {
            let (source, dest) = push_targets(&targets, export.export);
            let mut request = export.request(dest);
            request.docid = docid;
            request.options.doc_only = doc_only;
            request.options.browse = browse;

            PushService::new(config).push(source.as_deref(), &request)
        }
        Commands::Pushapps {
            root,
            dest,
            export,
            browse,
        } => {
            let mut request = export.request(dest);
            request.options.browse = browse;

            PushService::new(config).push_apps(&root, &request)
        }
        Commands::Pushdocs { docs, dest, export } => {
            cmd_pushdocs(&config, &docs, &export.request(dest))
        }
        Commands::Config => cmd_config(&config),
        Commands::Ext { name, args } => cmd_ext(&config, &name, &args),
    }
}

/// Push a folder of plain documents.
fn cmd_pushdocs(
    config: &ConfigStore,
    docs: &std::path::Path,
    request: &PushRequest,
) -> domain::Result<CommandReport> {
    let report = bulk_docs::push_docs(config, docs, request)?;
    if !request.export {
        println!("{} Pushed {}", "✓".green().bold(), docs.display());
    }
    Ok(report)
}

/// Show configuration command.
fn cmd_config(config: &ConfigStore) -> domain::Result<CommandReport> {
    println!("{}", "📂 Configuration files".bold());
    for path in config.rc_paths() {
        let marker = if path.is_file() { "✓".green() } else { "-".dimmed() };
        println!("  {} {}", marker, path.display());
    }
    if let Some(app_dir) = config.app_dir() {
        println!("  {} {} (application)", "✓".green(), app_dir.display());
    }
    println!();

    println!("{}", "Databases".bold());
    println!("{}", format_env_table(config));
    println!();

    println!("{}", format_hooks(&config.hooks()?));
    println!();
    println!("{}", format_extensions(&config.extensions()?));
    println!();

    let merged = format_config_json(config).map_err(domain::AppError::json_parse)?;
    Ok(CommandReport::with_output(merged))
}

/// Run extension command.
fn cmd_ext(config: &ConfigStore, name: &str, args: &[String]) -> domain::Result<CommandReport> {
    let extensions = config.extensions()?;
    let ext = extensions
        .iter()
        .find(|ext| ext.name() == name)
        .ok_or_else(|| domain::AppError::Extension {
            message: format!("Unknown extension '{name}'"),
        })?;

    let exit_code = ext.run(args)?;
    Ok(CommandReport {
        exit_code,
        output: None,
    })
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
