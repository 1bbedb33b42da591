use crate::image_file;
use crate::remote::{HttpBoard, TokenClient};
use crate::token_store;
use anyhow::{bail, Context, Result};
use pbd_core::{BoardSource, Drawer, Placement, WorkStatus};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const USAGE: &str = "\
Commands:
  a <uid> <paste>        register an account and fetch its token
  f <uid> <token>        add a token you already have
  i <path>               set the target image (png or jpeg)
  x <n> / y <n>          move the image on the board
  s                      start drawing
  r                      stop and reset
  t                      show progress
  p board <x> <y>        print a board pixel
  p image <x> <y>        print an image pixel
  p save [path]          export the board snapshot to png
  u                      refresh the board snapshot
  c                      forget every token
  q                      quit
  h                      this help";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelSource {
    Board,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Register { uid: u32, paste: String },
    AddToken { uid: u32, token: String },
    SetImage(PathBuf),
    SetX(u32),
    SetY(u32),
    Start,
    Reset,
    Status,
    Pixel { source: PixelSource, x: u32, y: u32 },
    SaveBoard(PathBuf),
    Update,
    ClearTokens,
    Quit,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn number(arg: Option<&str>, name: &str) -> Result<u32, String> {
    let raw = arg.ok_or_else(|| format!("missing <{name}>"))?;
    raw.parse::<u32>()
        .map_err(|_| format!("invalid <{name}>: {raw}"))
}

fn text(arg: Option<&str>, name: &str) -> Result<String, String> {
    arg.map(str::to_string)
        .ok_or_else(|| format!("missing <{name}>"))
}

/// Parses one console line. Blank lines are `Ok(None)`; unknown words are
/// treated as a request for help.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let command = match head.to_lowercase().as_str() {
        "a" | "add" => Command::Register {
            uid: number(words.next(), "uid")?,
            paste: text(words.next(), "paste")?,
        },
        "f" | "fix" => Command::AddToken {
            uid: number(words.next(), "uid")?,
            token: text(words.next(), "token")?,
        },
        "i" | "image" => Command::SetImage(PathBuf::from(text(words.next(), "path")?)),
        "x" => Command::SetX(number(words.next(), "n")?),
        "y" => Command::SetY(number(words.next(), "n")?),
        "s" | "start" => Command::Start,
        "r" | "reset" | "stop" => Command::Reset,
        "t" | "status" => Command::Status,
        "p" | "pixel" => match words.next() {
            Some("board") | Some("0") => Command::Pixel {
                source: PixelSource::Board,
                x: number(words.next(), "x")?,
                y: number(words.next(), "y")?,
            },
            Some("image") | Some("1") => Command::Pixel {
                source: PixelSource::Image,
                x: number(words.next(), "x")?,
                y: number(words.next(), "y")?,
            },
            Some("save") | Some("2") => Command::SaveBoard(PathBuf::from(
                words.next().unwrap_or("board.png"),
            )),
            _ => return Err("usage: p board|image <x> <y> | p save [path]".to_string()),
        },
        "u" | "update" => Command::Update,
        "c" | "clear" => Command::ClearTokens,
        "q" | "quit" | "exit" => Command::Quit,
        _ => Command::Help,
    };
    Ok(Some(command))
}

pub fn describe_status(status: WorkStatus) -> String {
    match status {
        WorkStatus::NotRunning => "not running".to_string(),
        WorkStatus::Idle => "idle, board matches the image".to_string(),
        WorkStatus::NoCredentials => "waiting for tokens".to_string(),
        WorkStatus::EstimatedSeconds(secs) => format!("about {secs}s left"),
    }
}

pub struct Console {
    drawer: Arc<Drawer>,
    board: Arc<HttpBoard>,
    tokens: TokenClient,
    store_path: PathBuf,
    image_path: Option<PathBuf>,
}

impl Console {
    pub fn new(
        drawer: Arc<Drawer>,
        board: Arc<HttpBoard>,
        tokens: TokenClient,
        store_path: PathBuf,
    ) -> Self {
        Self {
            drawer,
            board,
            tokens,
            store_path,
            image_path: None,
        }
    }

    /// Hands every saved token to the drawer.
    pub fn restore_tokens(&self) -> Result<usize> {
        let saved = token_store::load(&self.store_path)?;
        for (uid, token) in &saved {
            self.drawer.add_credential(*uid, token.clone());
        }
        info!(event = "tokens_restored", count = saved.len());
        Ok(saved.len())
    }

    fn persist_tokens(&self) -> Result<()> {
        token_store::save(&self.store_path, &self.drawer.credentials())
    }

    /// Reuses a known token for `uid` or fetches a fresh one.
    pub async fn register(&self, uid: u32, paste: &str) -> Result<()> {
        if self.drawer.credentials().contains_key(&uid) {
            info!(event = "token_cached", uid);
            return Ok(());
        }
        let token = self.tokens.fetch(uid, paste).await?;
        self.drawer.add_credential(uid, token);
        self.persist_tokens()
    }

    /// Stops a running session and waits for paints already in flight, so
    /// the next session never shares a credential with the old one.
    async fn settle(&self) {
        if self.drawer.is_running() {
            self.drawer.stop().await;
        }
    }

    pub async fn set_image(&mut self, path: &Path) -> Result<()> {
        let image = image_file::load_image(path, self.drawer.config().max_image_side)?;
        self.settle().await;
        self.drawer.load_image(image)?;
        self.image_path = Some(path.to_path_buf());
        Ok(())
    }

    async fn move_to(&self, placement: Placement) -> Result<()> {
        let config = self.drawer.config();
        placement.validate(config.canvas_width, config.canvas_height)?;
        self.settle().await;
        self.drawer.set_placement(placement)?;
        Ok(())
    }

    pub async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Register { uid, paste } => {
                self.register(uid, &paste).await?;
                println!("OK!");
            }
            Command::AddToken { uid, token } => {
                self.drawer.add_credential(uid, token);
                self.persist_tokens()?;
                println!("OK");
            }
            Command::SetImage(path) => {
                self.set_image(&path).await?;
                println!("OK!");
            }
            Command::SetX(x) => {
                let current = self.drawer.placement();
                self.move_to(Placement::new(x, current.y)).await?;
                println!("Set ok !");
            }
            Command::SetY(y) => {
                let current = self.drawer.placement();
                self.move_to(Placement::new(current.x, y)).await?;
                println!("Set ok !");
            }
            Command::Start => {
                self.settle().await;
                self.drawer.start()?;
                println!("Drawing...");
            }
            Command::Reset => {
                self.drawer.stop().await;
                println!("Stopped");
            }
            Command::Status => {
                println!("{}", describe_status(self.drawer.status()));
                if let Some(stats) = self.drawer.stats() {
                    println!(
                        "since {}: painted {} / failed {} / skipped {}, {} queued",
                        stats.started_at.with_timezone(&chrono::Local).format("%H:%M:%S"),
                        stats.painted,
                        stats.failed,
                        stats.skipped,
                        self.drawer.pending_len()
                    );
                }
            }
            Command::Pixel { source, x, y } => {
                let pixel = match source {
                    PixelSource::Board => self.board.pixel_at(x, y),
                    PixelSource::Image => self.drawer.image().and_then(|image| image.pixel(x, y)),
                };
                match pixel {
                    Some(color) => println!("{color}"),
                    None => bail!("({x}, {y}) is out of range"),
                }
            }
            Command::SaveBoard(path) => {
                image_file::save_canvas_png(&path, &self.board.snapshot())?;
                println!("Saved {}", path.display());
            }
            Command::Update => {
                self.board.refresh().await?;
                println!("Update Done !");
            }
            Command::ClearTokens => {
                self.drawer.clear_credentials();
                self.persist_tokens()?;
                println!("Tokens cleared");
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Help => self.print_help(),
        }
        Ok(Flow::Continue)
    }

    fn print_help(&self) {
        println!("{USAGE}");
        println!();
        let image = self
            .image_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());
        let placement = self.drawer.placement();
        let uids: Vec<String> = self
            .drawer
            .credentials()
            .keys()
            .map(|uid| uid.to_string())
            .collect();
        println!("Image: {image}");
        println!("Position: {} {}", placement.x, placement.y);
        println!("UIDs: {}", uids.join(" "));
        println!("Status: {}", describe_status(self.drawer.status()));
    }

    /// Reads commands from stdin until `q`, Ctrl-C, or end of input. With
    /// stdin closed while drawing, keeps drawing until Ctrl-C.
    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!(">>> ");
            std::io::stdout().flush().context("Failed to flush stdout")?;

            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                line = lines.next_line() => line.context("Failed to read stdin")?,
            };
            let Some(line) = line else {
                if self.drawer.is_running() {
                    info!(event = "stdin_closed", action = "wait_for_ctrl_c");
                    let _ = tokio::signal::ctrl_c().await;
                }
                break;
            };

            let command = match parse_command(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(usage) => {
                    println!("{usage}");
                    continue;
                }
            };
            match self.execute(command).await {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(err) => {
                    warn!(event = "command_failed", error = %err);
                    println!("Failed: {err:#}");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pbd_core::{DrawerConfig, DrawerError, PaintBackend, PaintRequest, Rgb, TargetImage};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct BlankBoard;

    #[async_trait]
    impl BoardSource for BlankBoard {
        async fn refresh(&self) -> Result<(), DrawerError> {
            Ok(())
        }

        fn pixel_at(&self, _x: u32, _y: u32) -> Option<Rgb> {
            Some(Rgb::WHITE)
        }
    }

    /// Takes a while per paint and notes any uid used by two paints at once.
    #[derive(Default)]
    struct SlowPainter {
        active: Mutex<HashSet<u32>>,
        overlapped: AtomicBool,
        paints: AtomicUsize,
    }

    #[async_trait]
    impl PaintBackend for SlowPainter {
        async fn paint(&self, request: &PaintRequest) -> Result<(), DrawerError> {
            if !self.active.lock().expect("lock").insert(request.uid) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
            self.active.lock().expect("lock").remove(&request.uid);
            self.paints.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn console_over(painter: Arc<SlowPainter>, store: PathBuf) -> Console {
        let config = DrawerConfig {
            interval_secs: 0,
            cooldown_margin_ms: 0,
            worker_count: 2,
            initial_delay_ms: 0,
            update_interval_secs: 3600,
            report_interval_secs: 0,
            ..DrawerConfig::default()
        };
        let drawer = Arc::new(Drawer::new(config, Arc::new(BlankBoard), painter));
        let client = reqwest::Client::new();
        Console::new(
            drawer,
            Arc::new(HttpBoard::new(client.clone(), "http://localhost", 1000, 600)),
            TokenClient::new(client, "http://localhost"),
            store,
        )
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn moving_while_drawing_waits_for_paints_in_flight() {
        let dir = tempfile::tempdir().expect("temp dir");
        let painter = Arc::new(SlowPainter::default());
        let mut console = console_over(Arc::clone(&painter), dir.path().join("tokens.json"));
        console
            .drawer
            .load_image(TargetImage::from_rows(2, 2, vec![Rgb::BLACK; 4]).expect("image"))
            .expect("load");
        console.drawer.add_credential(1, "t");

        console.execute(Command::Start).await.expect("start");
        tokio::time::sleep(Duration::from_millis(50)).await;
        console.execute(Command::SetX(10)).await.expect("move");
        assert!(!console.drawer.is_running());
        assert!(painter.active.lock().expect("lock").is_empty());

        console.execute(Command::Start).await.expect("restart");
        tokio::time::sleep(Duration::from_millis(400)).await;
        console.execute(Command::Reset).await.expect("reset");

        assert!(!painter.overlapped.load(Ordering::SeqCst));
        assert!(painter.paints.load(Ordering::SeqCst) >= 2);
        assert_eq!(console.drawer.placement().x, 10);
    }

    #[tokio::test]
    async fn invalid_move_keeps_the_session_running() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut console = console_over(Arc::default(), dir.path().join("tokens.json"));
        console
            .drawer
            .load_image(TargetImage::from_rows(1, 1, vec![Rgb::BLACK]).expect("image"))
            .expect("load");
        console.execute(Command::Start).await.expect("start");

        assert!(console.execute(Command::SetX(5000)).await.is_err());
        assert!(console.drawer.is_running());
        console.execute(Command::Reset).await.expect("reset");
    }

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(parse_command("s"), Ok(Some(Command::Start)));
        assert_eq!(parse_command("  START "), Ok(Some(Command::Start)));
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(parse_command("x 120"), Ok(Some(Command::SetX(120))));
        assert_eq!(
            parse_command("a 7 abc123"),
            Ok(Some(Command::Register {
                uid: 7,
                paste: "abc123".to_string()
            }))
        );
        assert_eq!(
            parse_command("image art/logo.png"),
            Ok(Some(Command::SetImage(PathBuf::from("art/logo.png"))))
        );
        assert_eq!(parse_command("whatever"), Ok(Some(Command::Help)));
    }

    #[test]
    fn pixel_commands_accept_numeric_sources() {
        assert_eq!(
            parse_command("p 0 5 6"),
            Ok(Some(Command::Pixel {
                source: PixelSource::Board,
                x: 5,
                y: 6
            }))
        );
        assert_eq!(
            parse_command("p image 1 2"),
            Ok(Some(Command::Pixel {
                source: PixelSource::Image,
                x: 1,
                y: 2
            }))
        );
        assert_eq!(
            parse_command("p save"),
            Ok(Some(Command::SaveBoard(PathBuf::from("board.png"))))
        );
        assert!(parse_command("p").is_err());
    }

    #[test]
    fn bad_arguments_report_usage() {
        assert_eq!(parse_command("x"), Err("missing <n>".to_string()));
        assert_eq!(parse_command("y -3"), Err("invalid <n>: -3".to_string()));
        assert_eq!(parse_command("f 7"), Err("missing <token>".to_string()));
    }

    #[test]
    fn status_descriptions() {
        assert_eq!(describe_status(WorkStatus::EstimatedSeconds(90)), "about 90s left");
        assert_eq!(describe_status(WorkStatus::NotRunning), "not running");
    }
}
