use clap::{Parser, Subcommand};
use image_proxy::cache::CacheStore;
use image_proxy::config::{self, ConfigOverrides};
use image_proxy::fallback::FallbackImage;
use image_proxy::fetch::HttpFetcher;
use image_proxy::imaging::RustBackend;
use image_proxy::proxy::ImageProxy;
use image_proxy::server::{self, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Shared flags for commands that serve images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the transform cache; every request fetches and re-encodes
    #[arg(long, global = true)]
    no_cache: bool,
}

#[derive(clap::Args, Clone)]
struct ServeArgs {
    /// Config file (TOML). Stock defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Interface to listen on
    #[arg(long, global = true)]
    host: Option<String>,

    /// TCP port
    #[arg(long, env = "PORT", global = true)]
    port: Option<u16>,

    /// Directory of static files served ahead of the transform route
    #[arg(long, global = true)]
    public_dir: Option<PathBuf>,

    #[command(flatten)]
    cache: CacheArgs,
}

impl ServeArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            public_dir: self.public_dir.clone(),
            no_cache: self.cache.no_cache,
        }
    }
}

#[derive(Parser)]
#[command(name = "image-proxy")]
#[command(about = "On-demand image transformation proxy")]
#[command(long_about = "\
On-demand image transformation proxy

Fetches a source image, applies the requested transform and serves the result.
Results are cached on disk, keyed by the exact parameter set, for the lifetime
of the process.

Parameters may be given in the path, the query string or a JSON/form body
(query wins over body, body wins over path):

  url          source image (required); also accepted as the path segment
  width        target width in pixels
  height       target height in pixels
  fit          cover (default), contain, fill, inside, outside
  background   hex colour for padding and rotation corners (#rgb[a], #rrggbb[aa])
  rotate       clockwise degrees
  flip, flop   mirror vertically / horizontally (presence is enough)
  greyscale    also 'grayscale'
  negate       invert colours
  normalize    also 'normalise'; stretch contrast
  format       jpeg, png, webp, gif, tiff, avif, bmp

Example:

  curl 'http://localhost:8000/?url=https://example.com/cat.jpg&width=300&format=webp'

Any failure serves the fallback JPEG.

Run 'image-proxy gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,
    /// Print a stock config file with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.serve).await?,
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = config::load_config(args.config.as_deref())?.with_overrides(&args.overrides())?;

    let cache = Arc::new(if config.cache.enabled {
        CacheStore::create(config.cache.parent_dir.as_deref())?
    } else {
        CacheStore::disabled()
    });
    match cache.path() {
        Some(dir) => tracing::info!(dir = %dir.display(), "cache directory created"),
        None => tracing::info!("cache disabled"),
    }

    let proxy = ImageProxy::new(
        Arc::clone(&cache),
        Arc::new(HttpFetcher::new(&config.fetch)?),
        Arc::new(RustBackend::new()),
    );
    let fallback = FallbackImage::load(config.server.fallback_image.as_deref())?;
    let state = AppState::new(proxy, fallback, config.server.cache_max_age_secs);
    let app = server::router(state, config.server.public_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr()).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(cache = %cache.stats(), "shutting down");
    cache.close()?;
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
