use std::{net::SocketAddr, path::Path, sync::Arc};

use arbor::{
    ConnectionAddrs, DispatchRoot, Dispatcher, FileSystemAdapter, HttpHandler,
    config::{AppConfig, AppConfigValidator, loader::load_config},
    core::exception::install_panic_hook,
    ports::StaticFiles,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};
use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
    /// Start the server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config: AppConfig = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    AppConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration: {e}"))?;

    tracing_setup::init_from_config(&config.log)?;
    install_panic_hook();

    tracing::info!("Loaded configuration from {config_path}");

    let files: Arc<dyn StaticFiles> = Arc::new(FileSystemAdapter::new());
    let mut roots = Vec::with_capacity(config.sites.len());
    for site in &config.sites {
        let root = DispatchRoot::from_site(site, files.clone())
            .with_context(|| format!("Failed to build site '{}'", site.name))?;
        tracing::info!(
            "Configured site '{}' (hosts: {:?}, nodes: {})",
            site.name,
            site.hosts,
            site.nodes.len()
        );
        roots.push(root);
    }

    let dispatcher = Arc::new(Dispatcher::new(roots));
    let router = HttpHandler::new(dispatcher).router(config.compression);

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    {
        let graceful_shutdown = graceful_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = graceful_shutdown.run_signal_handler().await {
                tracing::error!("Signal handler failed: {:?}", e);
            }
        });
    }

    let mut servers = Vec::with_capacity(config.listen.len());
    for listen in &config.listen {
        let addr: SocketAddr = listen
            .address
            .parse()
            .with_context(|| format!("Failed to parse listen address {}", listen.address))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {addr}"))?;

        tracing::info!("Arbor listening on {}", addr);
        println!("Arbor listening on {addr} (sites: {})", config.sites.len());

        let token = graceful_shutdown.shutdown_token();
        let app = router
            .clone()
            .into_make_service_with_connect_info::<ConnectionAddrs>();
        servers.push(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let reason = token.wait().await;
                    tracing::info!("Shutdown signal received on {}: {:?}", addr, reason);
                })
                .await
                .with_context(|| format!("Server error on {addr}"))
        }));
    }

    for result in futures_util::future::try_join_all(servers)
        .await
        .context("Listener task panicked")?
    {
        result?;
    }

    tracing::info!("Graceful shutdown completed");
    tracing_setup::shutdown_tracing();
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match AppConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            let addresses: Vec<&str> = config.listen.iter().map(|l| l.address.as_str()).collect();
            println!("   • Listen Addresses: {}", addresses.join(", "));
            println!("   • Compression: {}", config.compression);
            println!("   • Sites: {}", config.sites.len());
            for site in &config.sites {
                println!(
                    "     - {} (hosts: {}, nodes: {}, CDN: {})",
                    site.name,
                    site.hosts
                        .as_ref()
                        .map(|hosts| hosts.join(", "))
                        .unwrap_or_else(|| "any".to_string()),
                    site.nodes.len(),
                    site.cdn.is_some()
                );
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:3000')");
            println!("   • Give every site a unique name");
            println!("   • Leave a filter out instead of listing nothing");
            println!("   • Use a 3xx status for node redirects");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Arbor Configuration

# Compress responses when the client accepts it
compression = true

[[listen]]
address = "127.0.0.1:8080"

[log]
level = "info"
json = false

# Sites are tried in order; the first one accepting the request answers it.
[[sites]]
name = "main"
root_dir = "./public"
root_relative = "www"
hosts = ["localhost", "127.0.0.1"]
home_file = "index.html"

# Requests on the origin host for cacheable files are redirected to the CDN host.
# [sites.cdn]
# host = "cdn.example.com"
# origin_host = "www.example.com"

# "/docs", "/Docs" and "/documentation" are served from ./public/docs
[[sites.nodes]]
names = [["docs"], ["documentation"]]
relative_dir = "docs"

# "/old-blog/..." redirects permanently
[[sites.nodes]]
names = [["old", "blog"]]
redirect = { location = "/blog", status = 308 }

# Catch-all site for any other host
[[sites]]
name = "fallback"
root_dir = "./public"
root_relative = "fallback"
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'arbor serve --config {config_path}' to start the server");
    Ok(())
}
