use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whisperlock_server::keys::DEFAULT_SUBJECT;
use whisperlock_server::{create_router, AppState, PushKeys, ServerStore, SignedHttpPush};

#[derive(Parser, Debug)]
#[command(author, version, about = "WhisperLock reconciliation server", long_about = None)]
struct Args {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, env = "WHISPERLOCK_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,
    #[arg(long, env = "PUSH_PUBLIC_KEY", hide_env_values = true)]
    push_public_key: Option<String>,
    #[arg(long, env = "PUSH_PRIVATE_KEY", hide_env_values = true)]
    push_private_key: Option<String>,
    #[arg(long, env = "PUSH_SUBJECT", default_value = DEFAULT_SUBJECT)]
    push_subject: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let store = ServerStore::open(&args.data_dir)?;
    let keys = Arc::new(PushKeys::resolve(
        args.push_public_key.as_deref(),
        args.push_private_key.as_deref(),
        &args.push_subject,
        &store.keys_path(),
    )?);
    let push = Arc::new(SignedHttpPush::new(keys.clone())?);
    let app = create_router(AppState::new(store, keys, push));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    info!(%addr, data_dir = %args.data_dir.display(), "reconciliation server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "ctrl-c handler failed");
            }
            info!("shutting down");
        })
        .await?;
    Ok(())
}
