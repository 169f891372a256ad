//! Conneg CLI

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use conneg::config::{Config, DirectoryConfig};
use conneg::directory::{DirectoryOutcome, DirectoryResource};
use conneg::negotiation::{ClientPreferences, Negotiator};
use conneg::server::HttpServer;
use tracing_subscriber::EnvFilter;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage();
        process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = match args[1].as_str() {
        "serve" => {
            let Some(path) = args.get(2) else {
                eprintln!("Usage: conneg serve <config.toml>");
                process::exit(1);
            };
            serve(PathBuf::from(path))
        }
        "negotiate" => {
            if args.len() < 4 {
                eprintln!("Usage: conneg negotiate <root> <path> [accept] [accept-language] [accept-charset]");
                process::exit(1);
            }
            negotiate(
                PathBuf::from(&args[2]),
                &args[3],
                args.get(4).map(String::as_str),
                args.get(5).map(String::as_str),
                args.get(6).map(String::as_str),
            )
        }
        command => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'conneg' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn usage() {
    eprintln!("Conneg v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: conneg <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve <config.toml>          Serve a directory with content negotiation");
    eprintln!("  negotiate <root> <path> [accept] [accept-language] [accept-charset]");
    eprintln!("                               Resolve one request against a directory");
    eprintln!();
    eprintln!("Logging is controlled with RUST_LOG (default: info).");
}

fn serve(path: PathBuf) -> anyhow::Result<()> {
    let config = Config::from_file(&path)
        .with_context(|| format!("loading {}", path.display()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building the async runtime")?;

    let server = HttpServer::new(config)?;
    runtime.block_on(server.run())?;
    Ok(())
}

fn negotiate(
    root: PathBuf,
    path: &str,
    accept: Option<&str>,
    accept_language: Option<&str>,
    accept_charset: Option<&str>,
) -> anyhow::Result<()> {
    let config = DirectoryConfig::new(root);
    let resource = DirectoryResource::from_config(&config, Negotiator::default())?;
    let preferences = ClientPreferences::from_headers(accept, accept_language, accept_charset);

    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    match resource.get(path, query, &preferences)? {
        DirectoryOutcome::Found(found) => {
            println!("200 {}", found.path.display());
            if let Some(media_type) = &found.variant.media_type {
                println!("Content-Type: {media_type}");
            }
            for language in &found.variant.languages {
                println!("Content-Language: {language}");
            }
            if let Some(charset) = &found.variant.character_set {
                println!("Charset: {charset}");
            }
        }
        DirectoryOutcome::MultipleChoices(references) => {
            println!("300 Multiple Choices");
            for reference in references {
                println!("  {reference}");
            }
        }
        DirectoryOutcome::Listing(references) => {
            println!("200 Listing");
            for reference in references {
                println!("  {reference}");
            }
        }
        DirectoryOutcome::Redirect(location) => println!("303 {location}"),
        DirectoryOutcome::NotFound => println!("404 Not Found"),
        DirectoryOutcome::NotAcceptable => println!("406 Not Acceptable"),
    }

    Ok(())
}
