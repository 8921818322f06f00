//! Command-line caller for resumable frame uploads.

mod digest;

use anyhow::{Context, Result};
use chunklift_client::{
    ChunkTransport, ChunkedUploader, FailureKind, ResumeStatus, SessionId, UploaderConfig,
};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "chunklift")]
#[command(about = "Resumable chunked upload of captured frames")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    server: ServerArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct ServerArgs {
    /// Uploader config file path
    #[arg(long, global = true, env = "CHUNKLIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Device identifier (overrides config)
    #[arg(long, global = true)]
    device_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a captured frame, resuming a persisted session when possible
    Upload {
        /// Frame file to upload
        file: PathBuf,
        /// File holding the session id across restarts
        #[arg(long)]
        session_file: Option<PathBuf>,
        /// Do not send a SHA-256 digest for server-side verification
        #[arg(long)]
        no_hash: bool,
        /// Leave the session open after the last chunk
        #[arg(long)]
        no_finalize: bool,
    },
    /// Show how many bytes the server has confirmed for a session
    Status {
        /// Session id returned by a previous upload
        #[arg(long)]
        session_id: String,
    },
    /// Finalize a fully uploaded session
    Finalize {
        /// Session id returned by a previous upload
        #[arg(long)]
        session_id: String,
        /// Total payload size in bytes
        #[arg(long)]
        size: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { server, command } = Cli::parse();
    let config = load_config(&server)?;

    match command {
        Commands::Upload {
            file,
            session_file,
            no_hash,
            no_finalize,
        } => handle_upload(config, &file, session_file.as_deref(), no_hash, no_finalize).await,
        Commands::Status { session_id } => handle_status(config, &session_id).await,
        Commands::Finalize { session_id, size } => {
            handle_finalize(config, &session_id, size).await
        }
    }
}

/// Config file (optional), then `CHUNKLIFT_` environment variables, then flags.
fn load_config(args: &ServerArgs) -> Result<UploaderConfig> {
    let mut figment = Figment::new();

    if let Some(path) = &args.config {
        if !path.exists() {
            anyhow::bail!("config file not found: {}", path.display());
        }
        tracing::debug!(config_path = %path.display(), "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("CHUNKLIFT_"));

    if let Some(host) = &args.host {
        figment = figment.merge(Serialized::default("server_host", host));
    }
    if let Some(port) = args.port {
        figment = figment.merge(Serialized::default("server_port", port));
    }
    if let Some(device_id) = &args.device_id {
        figment = figment.merge(Serialized::default("device_id", device_id));
    }

    let config: UploaderConfig = figment
        .extract()
        .context("failed to load uploader configuration")?;
    config.validate()?;
    Ok(config)
}

/// Session persisted across restarts, tied to the payload it was opened for.
#[derive(Debug, Serialize, Deserialize)]
struct SessionRecord {
    session_id: SessionId,
    total_size: u64,
    digest: String,
}

impl SessionRecord {
    fn matches(&self, total_size: u64, digest: &str) -> bool {
        self.total_size == total_size && self.digest == digest
    }
}

async fn read_session_file(path: &Path) -> Result<Option<SessionRecord>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(anyhow::anyhow!(e).context(format!(
                "failed to read session file {}",
                path.display()
            )));
        }
    };
    match toml::from_str(&contents) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable session file");
            Ok(None)
        }
    }
}

async fn write_session_file(path: &Path, record: &SessionRecord) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = toml::to_string(record).context("failed to serialize session record")?;
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("failed to write session file {}", path.display()))
}

/// Reattach to a persisted session. `false` means the caller starts a new one.
async fn try_resume(
    uploader: &mut ChunkedUploader,
    record: &SessionRecord,
    total_size: u64,
    digest: &str,
) -> Result<bool> {
    let session_id = &record.session_id;
    if !record.matches(total_size, digest) {
        println!("Session {session_id} belongs to a different payload; starting over");
        return Ok(false);
    }

    uploader.resume_session(session_id.clone(), total_size)?;
    match uploader.query_resume_status().await {
        Ok(ResumeStatus::Resume(offset)) => {
            println!("Resuming session {session_id} at {offset}/{total_size} bytes");
            Ok(true)
        }
        Ok(ResumeStatus::Unknown) => {
            println!("Server no longer knows session {session_id}; starting over");
            uploader.abandon();
            Ok(false)
        }
        Err(e) if e.kind() == FailureKind::Protocol => {
            println!("Server state for session {session_id} does not fit this payload ({e}); starting over");
            uploader.abandon();
            Ok(false)
        }
        Err(e) => Err(anyhow::Error::new(e).context("failed to query resume status")),
    }
}

async fn handle_upload(
    config: UploaderConfig,
    file: &Path,
    session_file: Option<&Path>,
    no_hash: bool,
    no_finalize: bool,
) -> Result<()> {
    let payload = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    if payload.is_empty() {
        anyhow::bail!("{} is empty", file.display());
    }
    let total_size = payload.len() as u64;
    let digest = digest::sha256_hex(&payload);

    let mut uploader = ChunkedUploader::new(config)?;

    let persisted = match session_file {
        Some(path) => read_session_file(path).await?,
        None => None,
    };
    let resumed = match persisted {
        Some(record) => try_resume(&mut uploader, &record, total_size, &digest).await?,
        None => false,
    };

    if !resumed {
        let hash = (!no_hash).then_some(digest.as_str());
        let session_id = uploader
            .start(total_size, hash)
            .await
            .context("failed to start upload session")?;
        if let Some(path) = session_file {
            let record = SessionRecord {
                session_id: session_id.clone(),
                total_size,
                digest: digest.clone(),
            };
            write_session_file(path, &record).await?;
        }
        println!("Started session {session_id} for {total_size} bytes");
    }

    let uploaded = uploader.upload_payload(&payload).await;
    println!(
        "Progress: {}/{} bytes ({:.1}%)",
        uploader.bytes_confirmed(),
        uploader.total_size(),
        uploader.progress()
    );
    uploaded.context("upload interrupted; rerun with the same session file to resume")?;

    let session_id = uploader
        .session_id()
        .cloned()
        .context("upload finished without a session")?;

    if no_finalize {
        println!("Uploaded session {session_id} (not finalized)");
        return Ok(());
    }

    uploader
        .finalize()
        .await
        .with_context(|| format!("failed to finalize session {session_id}"))?;

    if let Some(path) = session_file
        && let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove session file");
    }

    println!("Upload verified: session {session_id}");
    Ok(())
}

async fn handle_status(config: UploaderConfig, session_id: &str) -> Result<()> {
    let session_id = SessionId::parse(session_id)?;
    let transport = ChunkTransport::new(&config)?;
    match transport.query_status(&session_id).await? {
        ResumeStatus::Resume(offset) => {
            println!("Session {session_id}: {offset} bytes confirmed");
        }
        ResumeStatus::Unknown => {
            println!("Session {session_id}: unknown to server");
        }
    }
    Ok(())
}

async fn handle_finalize(config: UploaderConfig, session_id: &str, size: u64) -> Result<()> {
    let session_id = SessionId::parse(session_id)?;
    let mut uploader = ChunkedUploader::new(config)?;
    uploader.resume_session(session_id.clone(), size)?;

    if let ResumeStatus::Unknown = uploader.query_resume_status().await? {
        anyhow::bail!("server does not know session {session_id}");
    }
    uploader
        .finalize()
        .await
        .with_context(|| format!("failed to finalize session {session_id}"))?;

    println!("Upload verified: session {session_id}");
    Ok(())
}
