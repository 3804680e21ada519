use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whisperlock_client::agent::{CacheAgent, CacheStorage, LogNotifier, MemoryWindows};
use whisperlock_client::connected::enable_push;
use whisperlock_client::reconciler::{FlushStatus, Reconciler};
use whisperlock_client::retry::{FileRetryRegistry, RetryRegistry};
use whisperlock_client::vault_ops::{create_entry, list_entries, sync_label};
use whisperlock_client::ApiClient;
use whisperlock_core::paths::{cache_dir, data_dir, database_path, retry_registry_path};
use whisperlock_core::pin::set_pin;
use whisperlock_core::voice::{PcmDevice, VoiceMatcher};
use whisperlock_core::{SessionState, Settings, Store};
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(author, version, about = "WhisperLock local vault", long_about = None)]
struct Cli {
    #[arg(long, global = true, env = "WHISPERLOCK_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "WHISPERLOCK_SERVER_URL")]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// PIN fallback management
    Pin {
        #[command(subcommand)]
        command: PinCommands,
    },
    /// Record a voice template from raw f32 PCM input
    Enroll {
        #[arg(long)]
        input: PathBuf,
        /// Capture length in milliseconds
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Check PIN or voice without doing anything else
    Unlock {
        #[arg(long)]
        voice: Option<PathBuf>,
    },
    /// Create a vault entry and try to deliver it
    Add {
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long)]
        voice: Option<PathBuf>,
    },
    /// List vault entries, newest first
    List {
        #[arg(long)]
        voice: Option<PathBuf>,
    },
    /// Flush the outbox now
    Sync,
    /// Push notification setup
    Push {
        #[command(subcommand)]
        command: PushCommands,
    },
    /// Run the background agent until interrupted
    Agent {
        /// Refetch the application shell even if it is already cached
        #[arg(long)]
        install: bool,
    },
    /// Show local vault and outbox state
    Status,
}

#[derive(Subcommand, Debug)]
enum PinCommands {
    Set,
}

#[derive(Subcommand, Debug)]
enum PushCommands {
    Enable {
        #[arg(long)]
        endpoint: String,
    },
    Test,
}

struct Context {
    settings: Settings,
    store: Store,
    client: ApiClient,
    retry: Arc<FileRetryRegistry>,
    reconciler: Reconciler,
    data_dir: PathBuf,
}

impl Context {
    async fn open(data_dir_override: Option<PathBuf>, server_url: Option<String>) -> Result<Self> {
        let data = match data_dir_override {
            Some(dir) => dir,
            None => data_dir()?,
        };
        std::fs::create_dir_all(&data)?;
        let mut settings = Settings::load(&data)?;
        if let Some(url) = server_url {
            settings.server_url = url;
        }
        let store = Store::open(&database_path(&data)).await?;
        let client = ApiClient::new(&settings.server_url)?;
        let retry = Arc::new(FileRetryRegistry::new(retry_registry_path(&data)));
        let api = Arc::new(client.clone());
        let reconciler = Reconciler::new(store.clone(), api.clone(), api, retry.clone());
        Ok(Self {
            settings,
            store,
            client,
            retry,
            reconciler,
            data_dir: data,
        })
    }

    fn matcher(&self) -> Result<VoiceMatcher> {
        Ok(VoiceMatcher::new(
            self.settings.capture_config(),
            self.settings.threshold,
        )?)
    }

    /// Unlock by voice when an input is given, by PIN otherwise.
    async fn unlock(&self, voice: Option<&Path>) -> Result<SessionState> {
        let mut session = SessionState::default();
        match voice {
            Some(input) => {
                let device = PcmDevice::new(input);
                let verification = self.matcher()?.verify(&self.store, &device).await?;
                println!(
                    "Voice score {:.3} (threshold {:.2})",
                    verification.score(),
                    verification.threshold()
                );
                session.apply_verification(&verification);
            }
            None => {
                let pin = prompt_pin("Enter PIN: ")?;
                session.unlock_with_pin(&self.store, &pin).await?;
            }
        }
        if !session.is_unlocked() {
            return Err(anyhow!("unlock failed"));
        }
        Ok(session)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();
    let ctx = Context::open(cli.data_dir, cli.server_url).await?;
    let result = run(&ctx, cli.command).await;
    ctx.store.close().await;
    result
}

async fn run(ctx: &Context, command: Commands) -> Result<()> {
    match command {
        Commands::Pin {
            command: PinCommands::Set,
        } => {
            let first = prompt_pin("New PIN (4-8 digits): ")?;
            if std::env::var("WHISPERLOCK_PIN").is_err() {
                let second = prompt_pin("Confirm PIN: ")?;
                if *first != *second {
                    return Err(anyhow!("PINs do not match"));
                }
            }
            set_pin(&ctx.store, &first).await?;
            println!("PIN saved");
        }
        Commands::Enroll { input, duration_ms } => {
            let mut config = ctx.settings.capture_config();
            if let Some(ms) = duration_ms {
                config = config.with_duration(std::time::Duration::from_millis(ms));
            }
            let matcher = VoiceMatcher::new(config, ctx.settings.threshold)?;
            let template = matcher.enroll(&ctx.store, &PcmDevice::new(input)).await?;
            println!("Voice enrolled ({} features)", template.len());
        }
        Commands::Unlock { voice } => {
            let session = ctx.unlock(voice.as_deref()).await?;
            if let Some(unlocked) = session.unlocked() {
                println!("Unlocked by {:?}", unlocked.method());
            }
        }
        Commands::Add { title, body, voice } => {
            let session = ctx.unlock(voice.as_deref()).await?;
            let entry = create_entry(&ctx.reconciler, &session, &title, &body).await?;
            println!("Saved {}", entry.id);
            report_flush(ctx).await?;
        }
        Commands::List { voice } => {
            let session = ctx.unlock(voice.as_deref()).await?;
            for entry in list_entries(&ctx.reconciler, &session).await? {
                println!(
                    "{}  [{}]  {}",
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                    sync_label(&entry),
                    if entry.title.is_empty() { "(untitled)" } else { entry.title.as_str() }
                );
                if !entry.body.is_empty() {
                    println!("    {}", entry.body);
                }
            }
        }
        Commands::Sync => report_flush(ctx).await?,
        Commands::Push { command } => match command {
            PushCommands::Enable { endpoint } => {
                let subscription = enable_push(&ctx.client, &endpoint).await?;
                println!("Push enabled for {}", subscription.endpoint);
            }
            PushCommands::Test => {
                ctx.client.push_test().await?;
                println!("Test push sent");
            }
        },
        Commands::Agent { install } => {
            let cache = Arc::new(CacheStorage::open(cache_dir(&ctx.data_dir))?);
            let agent = CacheAgent::new(
                cache,
                Arc::new(ctx.client.clone()),
                ctx.reconciler.clone(),
                ctx.retry.clone(),
                Arc::new(LogNotifier),
                Arc::new(MemoryWindows::default()),
            );
            let precache = if install {
                agent.install().await.map(|_| true)
            } else {
                agent.ensure_installed().await
            };
            if let Err(err) = precache {
                warn!(error = %err, "shell precache failed");
            }
            agent.activate()?;
            agent
                .run(ctx.settings.retry_poll_interval(), async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "ctrl-c handler failed");
                    }
                })
                .await;
        }
        Commands::Status => {
            let profile = ctx.store.profiles().get_or_default().await?;
            println!("Data dir:      {}", ctx.data_dir.display());
            println!("Server:        {}", ctx.settings.server_url);
            println!("PIN set:       {}", profile.has_pin());
            println!("Voice enrolled: {}", profile.voice_template.is_some());
            println!("Entries:       {}", ctx.store.vault().count().await?);
            println!("Unsynced:      {}", ctx.store.vault().unsynced_count().await?);
            println!("Outbox:        {}", ctx.store.outbox().count().await?);
            println!("Pending retry: {}", ctx.retry.pending()?.join(", "));
            println!("Online:        {}", ctx.reconciler.is_online().await);
        }
    }
    Ok(())
}

async fn report_flush(ctx: &Context) -> Result<()> {
    let report = ctx.reconciler.flush().await?;
    match &report.status {
        FlushStatus::Offline => println!("Offline; entries stay queued"),
        FlushStatus::Empty => println!("Nothing to sync"),
        FlushStatus::Delivered => println!(
            "Synced {} of {} entries ({} still queued)",
            report.accepted_ids.len(),
            report.submitted,
            report.remaining
        ),
        FlushStatus::DeliveryFailed { reason } => {
            info!(reason = %reason, "sync deferred");
            println!("Sync failed; will retry in the background");
        }
    }
    Ok(())
}

fn prompt_pin(prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(pin) = std::env::var("WHISPERLOCK_PIN") {
        if !pin.is_empty() {
            return Ok(Zeroizing::new(pin));
        }
    }
    let pin = rpassword::prompt_password(prompt).map_err(|e| anyhow!("PIN prompt: {e}"))?;
    Ok(Zeroizing::new(pin))
}
