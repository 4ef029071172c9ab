//! padterm - a gamepad-driven terminal for handheld Linux devices
//!
//! Runs a line shell with history and autocomplete, hands full-screen
//! programs a real PTY, and ships a small text editor. Everything is
//! reachable from a controller through an on-screen keyboard and chords.
//!
//! # Quick Start
//!
//! ```text
//! padterm                 # Start with the configured shell
//! padterm -s /bin/zsh     # Use another shell for child commands
//! padterm --init-config   # Write ~/.padterm/config.toml and exit
//! ```
//!
//! # Host keyboard
//!
//! | Key | Button |
//! |-----|--------|
//! | Arrows | D-Pad |
//! | z / x / a / s | A / B / X / Y |
//! | q / w | L1 / R1 |
//! | 1 / 2 | L2 / R2 |
//! | Enter / Backspace / Tab | Start / Select / Guide |

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use crossterm::event::{KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags};
use crossterm::execute;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use padterm::app::ModeController;
use padterm::config::Config;
use padterm::input::ButtonMap;
use padterm::ui::{compose, HostEvent, HostInput, Renderer};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Target frame time (~60 Hz)
const FRAME: Duration = Duration::from_millis(16);

/// Command line options
#[derive(Debug, Default)]
struct Args {
    /// Shell used to run child commands
    shell: Option<String>,
    /// Alternate config file
    config: Option<PathBuf>,
    /// Write the default config and exit
    init_config: bool,
}

fn print_help() {
    eprintln!("padterm {} - gamepad-driven terminal", VERSION);
    eprintln!();
    eprintln!("Usage: padterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell <CMD>     Shell used to run commands (default from config)");
    eprintln!("  -c, --config <PATH>   Read configuration from PATH");
    eprintln!("      --init-config     Write the default configuration and exit");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Host keyboard:");
    eprintln!("  Arrows                D-Pad");
    eprintln!("  z x a s               A B X Y");
    eprintln!("  q w                   L1 R1");
    eprintln!("  1 2                   L2 R2");
    eprintln!("  Enter                 Start");
    eprintln!("  Backspace             Select");
    eprintln!("  Tab                   Guide");
    eprintln!("  Ctrl+Q                Quit immediately");
    eprintln!();
    eprintln!("Configuration: ~/.padterm/config.toml");
    eprintln!("Log file:      ~/.padterm/padterm.log (level from PADTERM_LOG)");
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                eprintln!("padterm {}", VERSION);
                std::process::exit(0);
            }
            "-s" | "--shell" => {
                i += 1;
                let shell = args.get(i).ok_or("Missing shell argument")?;
                parsed.shell = Some(shell.clone());
            }
            "-c" | "--config" => {
                i += 1;
                let path = args.get(i).ok_or("Missing config path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--init-config" => parsed.init_config = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Log to a file; the terminal itself belongs to the renderer
fn init_logging() {
    let log_path = Config::config_dir()
        .map(|dir| dir.join("padterm.log"))
        .unwrap_or_else(|_| PathBuf::from("padterm.log"));
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_env("PADTERM_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let argv: Vec<String> = env::args().collect();
    let args = match parse_args(&argv) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if args.init_config {
        let path = match &args.config {
            Some(path) => {
                Config::default().save_to(path)?;
                path.clone()
            }
            None => Config::default().save()?,
        };
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    init_logging();
    info!("padterm {} starting...", VERSION);

    let mut config = match &args.config {
        Some(path) => Config::load_from(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(shell) = args.shell {
        config.shell = shell;
    }
    info!("Shell: {}, TERM={}", config.shell, config.term);

    // Lets child programs detect they run inside padterm
    env::set_var("PADTERM", "1");
    env::set_var("PADTERM_VERSION", VERSION);

    let cwd = env::current_dir().context("reading current directory")?;
    let result = run(config, cwd);
    if let Err(e) = &result {
        error!("Exited with error: {:#}", e);
    }
    info!("padterm stopped");
    result
}

fn run(config: Config, cwd: PathBuf) -> anyhow::Result<()> {
    let precise = crossterm::terminal::supports_keyboard_enhancement().unwrap_or(false);
    info!("Key release events: {}", if precise { "reported" } else { "synthesized" });

    let map = ButtonMap::from_indices(config.buttons.iter());
    let mut input = HostInput::new(map, config.input.axis_threshold, precise);
    let mut app = ModeController::new(config, cwd);
    app.say(&format!("[System] padterm {} - type 'help' for built-in commands", VERSION));

    let mut renderer = Renderer::new();
    renderer.init()?;
    let mut stdout = std::io::stdout();
    if precise {
        let _ = execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        );
    }

    let result = run_main_loop(&mut app, &mut input, &mut renderer);

    // Cleanup runs whatever the loop returned
    app.shutdown();
    if precise {
        let _ = execute!(stdout, PopKeyboardEnhancementFlags);
    }
    let _ = renderer.cleanup();

    result
}

fn run_main_loop(app: &mut ModeController, input: &mut HostInput, renderer: &mut Renderer) -> anyhow::Result<()> {
    let start = Instant::now();
    let mut force = true;

    while !app.should_quit() {
        let frame_start = Instant::now();
        let now_ms = start.elapsed().as_millis() as u64;

        for event in input.poll(now_ms)? {
            match event {
                HostEvent::Resize(cols, rows) => {
                    info!("Host resized to {}x{}", cols, rows);
                    renderer.invalidate();
                    force = true;
                }
                HostEvent::Quit => {
                    info!("Quit from host keyboard");
                    return Ok(());
                }
            }
        }

        let held = input.snapshot(now_ms);
        app.tick(held, now_ms);
        if app.take_redraw() || std::mem::take(&mut force) {
            renderer.render(compose(app))?;
        }

        if let Some(rest) = FRAME.checked_sub(frame_start.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("padterm")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(&argv(&["-s", "/bin/zsh", "--config", "/tmp/p.toml"])).unwrap();
        assert_eq!(args.shell.as_deref(), Some("/bin/zsh"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/p.toml")));
        assert!(!args.init_config);

        assert!(parse_args(&argv(&["--init-config"])).unwrap().init_config);
        assert!(parse_args(&argv(&["-s"])).is_err());
        assert!(parse_args(&argv(&["--bogus"])).is_err());
    }
}
