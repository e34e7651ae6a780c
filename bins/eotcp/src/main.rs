//! eotcp command - bridge a TAP interface to a peer over TCP.

use std::future::{Future, pending};
use std::io;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::{ArgGroup, CommandFactory, Parser};
use eotcp::tap::TapDevice;
use eotcp::tunnel::{self, DEFAULT_PORT, Role, TunnelConfig};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eotcp", version, about = "Ethernet over TCP tunnel")]
#[command(group(ArgGroup::new("role").required(true).args(["connect", "listen"])))]
struct Cli {
    /// Run as client and connect to this server address.
    #[arg(short = 'c', long, value_name = "SERVER_ADDR")]
    connect: Option<String>,

    /// Run as server and listen on this bind address.
    #[arg(short = 's', long, value_name = "BIND_ADDR")]
    listen: Option<String>,

    /// TCP port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// TAP interface name (kernel picks one if omitted).
    #[arg(short = 't', long, value_name = "TAP")]
    tap: Option<String>,

    /// Keep the TAP interface after exit.
    #[arg(long)]
    persist: bool,

    /// Seconds between client connection attempts.
    #[arg(long, value_name = "SECS", default_value = "1", value_parser = parse_delay)]
    retry_delay: Duration,

    /// Log at debug level instead of info. Ignored when RUST_LOG is set.
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn role(&self) -> Option<(Role, &str)> {
        match (&self.connect, &self.listen) {
            (Some(addr), None) => Some((Role::Client, addr.as_str())),
            (None, Some(addr)) => Some((Role::Server, addr.as_str())),
            _ => None,
        }
    }
}

fn parse_delay(s: &str) -> Result<Duration, String> {
    let secs: f64 = s.parse().map_err(|e| format!("invalid delay '{}': {}", s, e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid delay '{}': {}", s, e))
}

/// Build the log filter: RUST_LOG when set, otherwise info (debug if verbose).
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    let default = if verbose { "debug" } else { "info" };
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

/// Wait for the first of `ctrl_c` or `terminate` to fire.
///
/// A source that fails to register is logged and then ignored, so the other
/// one keeps working.
async fn first_signal<C, T>(ctrl_c: C, terminate: T)
where
    C: Future<Output = io::Result<()>>,
    T: Future<Output = io::Result<()>>,
{
    let ctrl_c = async {
        match ctrl_c.await {
            Ok(()) => tracing::info!("interrupted, shutting down"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot install Ctrl-C handler");
                pending::<()>().await;
            }
        }
    };
    let terminate = async {
        match terminate.await {
            Ok(()) => tracing::info!("SIGTERM received, shutting down"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Cancel `cancel` on SIGTERM or Ctrl-C.
async fn watch_signals(cancel: CancellationToken) {
    let terminate = async {
        signal(SignalKind::terminate())?.recv().await;
        Ok::<(), io::Error>(())
    };
    first_signal(tokio::signal::ctrl_c(), terminate).await;
    cancel.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .init();

    let Some((role, address)) = cli.role() else {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "exactly one of --connect or --listen is required",
            )
            .exit();
    };

    let config = TunnelConfig::new(role, address)
        .port(cli.port)
        .retry_delay(cli.retry_delay);

    let mut device = match TapDevice::builder()
        .name_opt(cli.tap.as_deref())
        .persistent(cli.persist)
        .create()
    {
        Ok(device) => device,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    if let Err(e) = tunnel::run(&config, &mut device, cancel).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
