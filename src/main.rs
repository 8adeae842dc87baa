mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use cf_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env file is the normal case.
    let dotenv = dotenvy::dotenv();

    // Respect RUST_LOG if set, otherwise pick defaults from the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "clipforge=trace,cf_server=trace,cf_av=debug,cf_core=debug,tower_http=debug".to_string()
        } else {
            "clipforge=info,cf_server=info,cf_av=info,cf_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    match cli.command {
        Commands::Start { host, port } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(cf_server::start(config))?;
            Ok(())
        }
        Commands::CheckTools => {
            let config = load_config(cli.config.as_deref())?;
            check_tools(&config);
            Ok(())
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("clipforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Load the config file (or defaults) and overlay the environment.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) if p.exists() => {
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config {}", p.display()))?;
            Config::from_json(&contents)?
        }
        other => Config::load_or_default(other),
    };
    config.apply_env();
    Ok(config)
}

fn check_tools(config: &Config) {
    println!("Checking external tools...\n");

    let registry = cf_av::ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else {
        println!("Some tools are missing. Append-mode uploads still work; ffmpeg is needed for transcoding, remuxing and ffmpeg compile mode.");
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config {}", p.display()))?;
            let mut config = Config::from_json(&contents)?;
            config.apply_env();
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Storage root: {}", config.storage.root.display());
    println!("  Compile mode: {:?}", config.ingest.compile_mode);
    println!("  Transcription enabled: {}", config.transcription.enabled);
    println!("  Queue enabled: {}", config.queue.enabled);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}
