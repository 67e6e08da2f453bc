//! Thin CLI entry point (§1 Non-goals: "CLI UX" stays minimal). Loads a
//! connection catalog and hands it to `qp_broker::Broker::run`; the binary
//! itself carries no business logic.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use qp_core::ConnCatalog;

#[derive(Parser, Debug)]
#[command(name = "qp-server", version, about = "Validating SQL proxy session broker")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the session broker on a Unix socket.
    Serve {
        /// Path to the connection catalog (YAML).
        #[arg(long, short, default_value = "qp.yaml")]
        config: PathBuf,

        /// Path to the listen socket. Defaults to `<runtime-dir>/qp.sock`.
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Private runtime directory holding the socket, shared secret, and
        /// resume-token cache. Defaults to `$XDG_RUNTIME_DIR/qp` (Linux) or
        /// `$TMPDIR/qp` (macOS) per §6.
        #[arg(long, env = "QP_RUNTIME_DIR")]
        runtime_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter("info")
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Serve { config, socket, runtime_dir } => {
            let catalog = ConnCatalog::from_file(&config)
                .map_err(|e| anyhow::anyhow!("failed to load catalog {}: {e}", config.display()))?;

            let runtime_dir = runtime_dir.unwrap_or_else(default_runtime_dir);
            let socket = socket.unwrap_or_else(|| runtime_dir.join("qp.sock"));

            tracing::info!(socket = %socket.display(), runtime_dir = %runtime_dir.display(), "starting qp-server");
            let broker = qp_broker::Broker::bind(&socket, &runtime_dir, catalog).await?;
            broker.run().await?;
        }
    }
    Ok(())
}

/// `$XDG_RUNTIME_DIR/qp` on Linux, falling back to `$TMPDIR/qp` (or
/// `/tmp/qp`) when neither is set, per §6.
fn default_runtime_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(dir).join("qp");
    }
    if let Ok(dir) = std::env::var("TMPDIR") {
        return PathBuf::from(dir).join("qp");
    }
    PathBuf::from("/tmp/qp")
}
