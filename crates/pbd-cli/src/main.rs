mod config;
mod console;
mod image_file;
mod remote;
mod token_store;

use anyhow::Result;
use clap::Parser;
use config::{resolve_config_path, AppConfig};
use console::Console;
use pbd_core::{Drawer, Placement};
use remote::{http_client, HttpBoard, HttpPainter, TokenClient};
use std::{
    fs::OpenOptions,
    io::{self, Write},
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pbd", about = "Draws an image onto a shared paint board")]
struct Args {
    /// Config file (defaults to $PBD_CONFIG_PATH, then ./pbd.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Start drawing right after loading the config.
    #[arg(long, default_value_t = false)]
    start: bool,
    #[arg(long, default_value_t = false)]
    debug: bool,
    /// Also append logs to a file in this directory.
    #[arg(long, default_value = "")]
    log_dir: String,
    /// Seconds to wait before an automatic start.
    #[arg(long, default_value_t = 3)]
    start_delay: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    let config_path = resolve_config_path(args.config.as_deref());
    let config = AppConfig::load(&config_path)?;
    info!(
        event = "config_loaded",
        path = %config_path.display(),
        endpoint = %config.endpoint,
        accounts = config.accounts.len()
    );

    let client = http_client()?;
    let board = Arc::new(HttpBoard::new(
        client.clone(),
        &config.endpoint,
        config.drawer.canvas_width,
        config.drawer.canvas_height,
    ));
    let painter = Arc::new(HttpPainter::new(client.clone(), &config.endpoint));
    let drawer = Arc::new(Drawer::new(
        config.drawer.clone(),
        board.clone(),
        painter,
    ));

    let mut console = Console::new(
        Arc::clone(&drawer),
        Arc::clone(&board),
        TokenClient::new(client, &config.endpoint),
        config.token_store.clone(),
    );
    if let Err(err) = console.restore_tokens() {
        warn!(event = "token_store_unreadable", error = %err);
    }
    for account in &config.accounts {
        if let Err(err) = console.register(account.uid, &account.paste).await {
            warn!(event = "account_register_failed", uid = account.uid, error = %err);
        }
    }

    if let Some(image) = &config.image {
        if let Err(err) = console.set_image(image).await {
            error!(event = "image_load_failed", path = %image.display(), error = %err);
        }
    }
    if let Err(err) = drawer.set_placement(Placement::new(config.x, config.y)) {
        error!(event = "placement_rejected", error = %err);
    }

    if args.start {
        tokio::time::sleep(Duration::from_secs(args.start_delay)).await;
        if let Err(err) = drawer.start() {
            error!(event = "auto_start_failed", error = %err);
        }
    }

    console.run().await?;
    drawer.stop().await;
    info!(event = "shutdown_complete");
    Ok(())
}

fn init_logging(args: &Args) -> Option<LogGuard> {
    let level = if args.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("PBD_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let writer = match open_log_file(&args.log_dir) {
        Ok(log_guard) => log_guard,
        Err(err) => {
            eprintln!("log_file_error: {err}");
            LogGuard { file: None }
        }
    };
    let file = writer.file.clone();
    let make_writer = BoxMakeWriter::new(move || TeeWriter::new(file.clone()));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return None;
    }
    Some(writer)
}

struct LogGuard {
    file: Option<Arc<Mutex<std::fs::File>>>,
}

/// Log sink: stderr, plus the log file when one is open. Stdout belongs to
/// the console prompt.
struct TeeWriter {
    stderr: io::Stderr,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl TeeWriter {
    fn new(file: Option<Arc<Mutex<std::fs::File>>>) -> Self {
        Self {
            stderr: io::stderr(),
            file,
        }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = self.stderr.write_all(buf);
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = self.stderr.flush();
        if let Some(file) = &self.file {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = file.flush();
        }
        Ok(())
    }
}

fn open_log_file(log_dir: &str) -> io::Result<LogGuard> {
    if log_dir.trim().is_empty() {
        return Ok(LogGuard { file: None });
    }
    let dir = PathBuf::from(log_dir);
    std::fs::create_dir_all(&dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let path = dir.join(format!("pbd-{stamp}.log"));
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(LogGuard {
        file: Some(Arc::new(Mutex::new(file))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_default_to_interactive_mode() {
        let args = Args::parse_from(["pbd"]);
        assert!(!args.start);
        assert_eq!(args.start_delay, 3);
        assert!(args.config.is_none());
    }

    #[test]
    fn log_file_is_opened_under_log_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let guard = open_log_file(dir.path().to_str().expect("utf8 path")).expect("open");
        assert!(guard.file.is_some());
        let written = std::fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(written, 1);
        assert!(open_log_file("  ").expect("blank").file.is_none());
    }
}
