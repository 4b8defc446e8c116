//! pixsync: photo file-service client
//!
//! Commands:
//!   status                  - show backend health and session state
//!   config show             - display current configuration
//!   login-url               - print the authorization URL to open
//!   login <redirect-url>    - complete login from the redirect the browser landed on
//!   logout                  - unlink the stored session
//!   ls [folder]             - list files in a remote folder
//!   get <path> [-o file]    - download full-resolution bytes
//!   thumb <path> [-o file]  - download a thumbnail
//!   put <local> [remote]    - upload a local file
//!   rm <path>               - delete a remote file

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use opendal::Operator;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pixsync_core::config::{PixsyncConfig, StorageBackend};
use pixsync_core::types::ThumbnailFormat;
use pixsync_core::{PixsyncError, UploadStatus};
use pixsync_storage::{
    build_operator, check_health, OpendalStore, RemoteStore, S3Credentials, SessionManager,
};
use pixsync_sync::{FileService, TransferOptions};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "pixsync",
    version,
    about = "pixsync photo file-service client",
    long_about = "pixsync: browse, fetch, upload and delete photos through a cached remote store"
)]
struct Cli {
    /// Path to pixsync.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "PIXSYNC_CONFIG",
        default_value = "~/.config/pixsync/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log].level
    #[arg(long, env = "PIXSYNC_LOG")]
    log: Option<String>,

    /// Log format; overrides [log].format
    #[arg(long, env = "PIXSYNC_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show storage health and session state
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the URL to open in a browser to authorize pixsync
    #[command(name = "login-url")]
    LoginUrl,

    /// Finish authorization from the redirect URL the browser was sent to
    Login {
        /// Full redirect URL, including its fragment
        redirect: String,
    },

    /// Sign out and remove the stored session
    Logout,

    /// List files in a remote folder
    Ls {
        /// Remote folder (default: root)
        #[arg(default_value = "")]
        folder: String,
    },

    /// Download a file's full-resolution bytes
    Get {
        /// Remote path (e.g. /camera/img_001.jpg)
        path: String,
        /// Local destination (default: remote file name in current dir)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Download a thumbnail using the [thumbnails] config
    Thumb {
        /// Remote path
        path: String,
        /// Local destination (default: <name>.thumb.<ext> in current dir)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Upload a local file
    Put {
        /// Local file
        local: PathBuf,
        /// Remote destination (default: /<local file name>)
        remote: Option<String>,
    },

    /// Delete a remote file
    Rm {
        /// Remote path
        path: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let (config, from_file) = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None => LogFormat::from_str(&config.log.format, true).unwrap_or(LogFormat::Text),
    };
    init_logging(&level, &format);
    if !from_file {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            config_path.display()
        );
    }
    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "pixsync starting"
    );

    if let Commands::Config {
        action: ConfigAction::Show,
    } = cli.command
    {
        return cmd_config_show(&config, &config_path, from_file);
    }

    let client = Client::open(&config)?;
    let cancel = cancel_on_ctrl_c();

    let result = match cli.command {
        Commands::Status => cmd_status(&config, &client).await,
        Commands::Config { .. } => Ok(()),
        Commands::LoginUrl => cmd_login_url(&client),
        Commands::Login { redirect } => cmd_login(&config, &client, &redirect),
        Commands::Logout => cmd_logout(&client),
        Commands::Ls { folder } => cmd_ls(&client, &folder, &cancel).await,
        Commands::Get { path, output } => cmd_get(&client, &path, output, &cancel).await,
        Commands::Thumb { path, output } => {
            cmd_thumb(&config, &client, &path, output, &cancel).await
        }
        Commands::Put { local, remote } => cmd_put(&client, &local, remote, &cancel).await,
        Commands::Rm { path } => cmd_rm(&client, &path, &cancel).await,
    };

    match result {
        Err(e) if is_cancelled(&e) => {
            eprintln!("cancelled");
            std::process::exit(130);
        }
        other => other,
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

async fn load_config(path: &Path) -> Result<(PixsyncConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((PixsyncConfig::default(), false))
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    match s.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(format!("{home}/{rest}"))
        }
        None => path.to_path_buf(),
    }
}

// ── Client wiring ─────────────────────────────────────────────────────────────

struct Client {
    op: Operator,
    sessions: Arc<SessionManager>,
    service: FileService,
}

impl Client {
    /// Restore the session, build the operator, and wrap it in the file service.
    fn open(config: &PixsyncConfig) -> Result<Self> {
        let mut auth = config.auth.clone();
        if auth.session_file.is_none() {
            auth.session_file = Some(expand_tilde(Path::new("~/.config/pixsync/session.json")));
        }
        let sessions = Arc::new(SessionManager::load(&auth).context("loading session")?);

        let creds = match config.storage.backend {
            StorageBackend::S3 => Some(s3_credentials_from_env()?),
            StorageBackend::Fs | StorageBackend::Memory => None,
        };
        let op = build_operator(&config.storage, creds.as_ref())
            .context("building storage operator")?;

        let chunk = usize::try_from(config.storage.transfer_chunk_kib.saturating_mul(1024))
            .unwrap_or(usize::MAX);
        let store: Arc<dyn RemoteStore> =
            Arc::new(OpendalStore::new(op.clone(), sessions.clone()).with_chunk_size(chunk));
        let service = FileService::from_config(store, config);
        Ok(Client {
            op,
            sessions,
            service,
        })
    }
}

/// Reads AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY (standard S3 env vars),
/// falling back to PIXSYNC_ACCESS_KEY_ID and PIXSYNC_SECRET_ACCESS_KEY.
fn s3_credentials_from_env() -> Result<S3Credentials> {
    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
        .or_else(|_| std::env::var("PIXSYNC_ACCESS_KEY_ID"))
        .context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
    let secret = std::env::var("AWS_SECRET_ACCESS_KEY")
        .or_else(|_| std::env::var("PIXSYNC_SECRET_ACCESS_KEY"))
        .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
    Ok(S3Credentials {
        access_key_id,
        secret_access_key: SecretString::from(secret),
    })
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("ctrl-c received, cancelling");
            trigger.cancel();
        }
    });
    token
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<PixsyncError>()
            .is_some_and(PixsyncError::is_cancelled)
    })
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn percent(fraction: f64) -> u64 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u64
}

fn download_options(pb: &ProgressBar, cancel: &CancellationToken) -> TransferOptions {
    let sink = pb.clone();
    TransferOptions::new()
        .with_progress(move |f| sink.set_position(percent(f)))
        .with_cancel(cancel.clone())
}

// ── `pixsync status` ──────────────────────────────────────────────────────────

async fn cmd_status(config: &PixsyncConfig, client: &Client) -> Result<()> {
    let storage = &config.storage;
    let target = match storage.backend {
        StorageBackend::S3 => format!("{} bucket={}", storage.endpoint, storage.bucket),
        StorageBackend::Fs => format!("fs root={}", storage.root),
        StorageBackend::Memory => "memory".to_string(),
    };
    let health = match check_health(&client.op).await {
        Ok(()) => "ok".to_string(),
        Err(e) => format!("UNREACHABLE: {e}"),
    };

    let account = client
        .sessions
        .authorized_session()
        .map(|s| s.account_id().to_string());

    println!("pixsync v{}", env!("CARGO_PKG_VERSION"));
    println!("  storage:     {target} [{health}]");
    println!(
        "  session:     {}",
        match &account {
            Some(id) if !id.is_empty() => format!("authenticated ({id})"),
            Some(_) => "authenticated".to_string(),
            None => "not signed in".to_string(),
        }
    );
    println!(
        "  file cache:  {} MB",
        client.service.file_cache().limits().max_bytes / (1024 * 1024)
    );
    println!(
        "  thumb cache: {} MB",
        client.service.thumbnail_cache().limits().max_bytes / (1024 * 1024)
    );
    Ok(())
}

// ── `pixsync config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &PixsyncConfig, config_path: &Path, from_file: bool) -> Result<()> {
    if from_file {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `pixsync login-url` / `login` / `logout` ──────────────────────────────────

fn cmd_login_url(client: &Client) -> Result<()> {
    let url = client.sessions.authorize_url()?;
    println!("Open this URL to authorize pixsync:");
    println!();
    println!("  {url}");
    println!();
    println!("Then run: pixsync login '<redirect url>'");
    Ok(())
}

fn cmd_login(config: &PixsyncConfig, client: &Client, redirect: &str) -> Result<()> {
    let outcome = client
        .sessions
        .handle_redirect_url(redirect)
        .with_context(|| {
            format!(
                "not an authorization redirect (expected a URL starting with {})",
                config.auth.redirect_uri
            )
        })?;

    client.service.handle_auth_outcome(outcome.clone());
    match outcome {
        pixsync_storage::AuthOutcome::Success => {
            info!("signed in");
            println!("Signed in.");
            Ok(())
        }
        pixsync_storage::AuthOutcome::Cancel => {
            println!("Authorization cancelled.");
            Ok(())
        }
        pixsync_storage::AuthOutcome::Error { description } => {
            anyhow::bail!("authorization failed: {description}")
        }
    }
}

fn cmd_logout(client: &Client) -> Result<()> {
    client.service.sign_out();
    println!("Signed out.");
    Ok(())
}

// ── `pixsync ls` ──────────────────────────────────────────────────────────────

async fn cmd_ls(client: &Client, folder: &str, cancel: &CancellationToken) -> Result<()> {
    let pb = make_spinner("ls");
    pb.set_message(if folder.is_empty() { "/" } else { folder }.to_string());
    let files = client.service.list_files(folder, cancel).await;
    pb.finish_and_clear();

    let files = files.with_context(|| format!("listing {folder:?}"))?;
    for file in &files {
        if let Some(path) = &file.path {
            println!("{:<32} {path}", file.name);
        }
    }
    println!("{} file(s)", files.len());
    Ok(())
}

// ── `pixsync get` / `thumb` ───────────────────────────────────────────────────

fn file_name(remote: &str) -> &str {
    remote.rsplit('/').find(|s| !s.is_empty()).unwrap_or("download")
}

async fn cmd_get(
    client: &Client,
    path: &str,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    let dest = output.unwrap_or_else(|| PathBuf::from(file_name(path)));
    let pb = make_progress_bar("get");
    pb.set_message(path.to_string());

    let data = client
        .service
        .fetch_file(path, download_options(&pb, cancel))
        .await;
    pb.finish_and_clear();
    let data = data.with_context(|| format!("fetching {path}"))?;

    write_output(&dest, &data).await?;
    println!("{path} → {} ({})", dest.display(), fmt_bytes(data.len() as u64));
    Ok(())
}

async fn cmd_thumb(
    config: &PixsyncConfig,
    client: &Client,
    path: &str,
    output: Option<PathBuf>,
    cancel: &CancellationToken,
) -> Result<()> {
    let ext = match config.thumbnails.format {
        ThumbnailFormat::Png => "png",
        ThumbnailFormat::Jpeg => "jpg",
    };
    let dest = output.unwrap_or_else(|| {
        let name = file_name(path);
        let stem = name.rsplit_once('.').map_or(name, |(stem, _)| stem);
        PathBuf::from(format!("{stem}.thumb.{ext}"))
    });

    let pb = make_progress_bar("thumb");
    pb.set_message(path.to_string());
    let preview_pb = pb.clone();
    let data = client
        .service
        .fetch_thumbnail(
            path,
            download_options(&pb, cancel),
            Some(Box::new(move |full: Bytes| {
                preview_pb.set_message(format!("full image cached ({})", fmt_bytes(full.len() as u64)));
            })),
        )
        .await;
    pb.finish_and_clear();
    let data = data.with_context(|| format!("fetching thumbnail of {path}"))?;

    write_output(&dest, &data).await?;
    let (w, h) = config.thumbnails.size.dimensions();
    println!("{path} → {} ({w}x{h} box, {})", dest.display(), fmt_bytes(data.len() as u64));
    Ok(())
}

async fn write_output(dest: &Path, data: &[u8]) -> Result<()> {
    tokio::fs::write(dest, data)
        .await
        .with_context(|| format!("writing {}", dest.display()))
}

// ── `pixsync put` ─────────────────────────────────────────────────────────────

async fn cmd_put(
    client: &Client,
    local: &Path,
    remote: Option<String>,
    cancel: &CancellationToken,
) -> Result<()> {
    if !local.is_file() {
        anyhow::bail!("not a file: {}", local.display());
    }
    let remote = remote.unwrap_or_else(|| {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        format!("/{name}")
    });
    let data = tokio::fs::read(local)
        .await
        .with_context(|| format!("reading {}", local.display()))?;

    let pb = make_progress_bar("put");
    pb.set_message(remote.clone());

    // Drive the bar from the upload tracker rather than the transfer itself
    let sink = pb.clone();
    let watched = remote.clone();
    let handle = client.service.uploads().subscribe(move |snapshot| {
        match snapshot.get(&watched) {
            Some(UploadStatus::Uploading { progress }) => sink.set_position(percent(*progress)),
            Some(UploadStatus::Complete) => sink.set_position(100),
            Some(UploadStatus::Failed { message }) => sink.set_message(message.clone()),
            None => {}
        }
    });

    let result = client
        .service
        .upload(
            Bytes::from(data),
            &remote,
            TransferOptions::new().with_cancel(cancel.clone()),
        )
        .await;
    client.service.uploads().unsubscribe(handle);
    pb.finish_and_clear();

    let meta = result.with_context(|| format!("uploading {}", local.display()))?;
    println!("{} → {remote}", local.display());
    println!("  bytes:   {}", fmt_bytes(meta.size));
    if let Some(path) = &meta.path_lower {
        println!("  remote:  {path}");
    }
    Ok(())
}

// ── `pixsync rm` ──────────────────────────────────────────────────────────────

async fn cmd_rm(client: &Client, path: &str, cancel: &CancellationToken) -> Result<()> {
    client
        .service
        .delete(path, cancel)
        .await
        .with_context(|| format!("deleting {path}"))?;
    println!("deleted {path}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
