//! blockput: resumable chunked uploads from the command line.
//!
//! Usage:
//!   blockput put <file> --token <token> [--key k] [--mime m] [--param x:k=v]
//!   blockput plan <file>     - show how the file would be cut up
//!   blockput clear <file>    - forget the saved checkpoint for a file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use blockput_transfer::{FileRecorder, Layout, Recorder, recorder_key};
use blockput_uploader::{
    HttpTransport, Transport, UploadConfig, UploadEvent, UploadJob, UploadManager, UploadOptions,
    UploadOutcome, default_config_path, default_recorder_dir,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "blockput")]
#[command(version)]
#[command(about = "Resumable block/chunk uploads")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "BLOCKPUT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file, resuming from a checkpoint when one exists
    Put {
        file: PathBuf,

        /// Upload token
        #[arg(long, env = "BLOCKPUT_TOKEN", hide_env_values = true)]
        token: String,

        /// Destination key; the server picks one when omitted
        #[arg(long)]
        key: Option<String>,

        /// MIME type of the stored object
        #[arg(long)]
        mime: Option<String>,

        /// Caller variable, `x:name=value` (repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Print the block and chunk segmentation of a file
    Plan { file: PathBuf },

    /// Delete the saved checkpoint for a file
    Clear {
        file: PathBuf,

        /// Destination key the upload was started with
        #[arg(long)]
        key: Option<String>,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected x:name=value, got {raw:?}"))?;
    if !name.starts_with("x:") {
        return Err(format!("parameter names must start with \"x:\", got {name:?}"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,blockput=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Put {
            file,
            token,
            key,
            mime,
            params,
        } => put(config, file, token, key, mime, params).await,
        Commands::Plan { file } => plan(&config, &file),
        Commands::Clear { file, key } => clear(&config, &file, key.as_deref()),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<UploadConfig> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    let mut config = match path {
        Some(p) => UploadConfig::load(&p).with_context(|| format!("loading {}", p.display()))?,
        None => UploadConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

fn open_recorder(config: &UploadConfig) -> anyhow::Result<FileRecorder> {
    let dir = config
        .recorder_dir
        .clone()
        .or_else(default_recorder_dir)
        .context("no checkpoint directory: set recorder_dir or BLOCKPUT_RECORDER_DIR")?;
    Ok(FileRecorder::new(dir)?)
}

async fn put(
    config: UploadConfig,
    file: PathBuf,
    token: String,
    key: Option<String>,
    mime: Option<String>,
    params: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config)?);
    let mut manager =
        match UploadManager::with_file_recorder(config.clone(), Arc::clone(&transport)) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "checkpoints disabled");
                UploadManager::new(config, transport, None)
            }
        };
    let mut events = manager
        .take_events()
        .context("event receiver already taken")?;

    let cancel = manager.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current chunk");
            cancel.cancel();
        }
    });

    let mut options = UploadOptions::new().with_params(params);
    if let Some(mime) = mime {
        options = options.with_mime_type(mime);
    }
    let handle = manager.spawn(UploadJob {
        path: file.clone(),
        key,
        token,
        options,
    })?;
    drop(manager);

    let mut last_percent = 0;
    while let Some(event) = events.recv().await {
        if let UploadEvent::Progress { fraction, .. } = event {
            let percent = (fraction * 100.0) as u32;
            if percent >= last_percent + 5 || fraction >= 1.0 {
                last_percent = percent;
                info!(file = %file.display(), percent, "progress");
            }
        }
    }

    match handle.task.await? {
        UploadOutcome::Success { info, body } => {
            let body = body.map(|b| b.to_string()).unwrap_or_default();
            println!("{body}");
            info!(%info, "done");
            Ok(())
        }
        UploadOutcome::Failed { info } => bail!(
            "upload failed: {} ({})",
            info.error.as_deref().unwrap_or("unknown error"),
            info
        ),
        UploadOutcome::Cancelled { .. } => {
            bail!("upload cancelled; run the same command again to resume")
        }
    }
}

fn plan(config: &UploadConfig, file: &Path) -> anyhow::Result<()> {
    let size = std::fs::metadata(file)
        .with_context(|| format!("reading {}", file.display()))?
        .len();
    let layout = Layout::new(size, config.block_size, config.chunk_size)?;
    println!(
        "{}: {size} bytes, {} block(s) of {} bytes, chunks of {} bytes",
        file.display(),
        layout.block_count(),
        layout.block_size(),
        layout.chunk_size()
    );
    for span in layout.chunks() {
        let op = if span.starts_block() {
            format!("mkblk/{}", layout.block_size_at(span.offset))
        } else {
            format!("bput/<ctx>/{}", span.offset_in_block)
        };
        println!(
            "  block {:>4}  offset {:>12}  len {:>8}  {op}",
            span.block_index, span.offset, span.len
        );
    }
    println!("  mkfile/{size}");
    Ok(())
}

fn clear(config: &UploadConfig, file: &Path, key: Option<&str>) -> anyhow::Result<()> {
    let size = std::fs::metadata(file)
        .with_context(|| format!("reading {}", file.display()))?
        .len();
    let recorder = open_recorder(config)?;
    let record_key = recorder_key(key, file, size);
    if recorder.get(&record_key).is_none() {
        println!("no checkpoint for {}", file.display());
        return Ok(());
    }
    recorder.del(&record_key)?;
    println!("checkpoint cleared for {}", file.display());
    Ok(())
}
