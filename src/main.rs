//! conterm - tabbed ConPTY terminal for the Windows console.
//!
//! conterm hosts any number of independent shell sessions in tabs, each
//! backed by its own pseudo console and VT100 screen.
//!
//! # Quick start
//!
//! ```text
//! conterm            # default shell (cmd.exe, or config.toml)
//! conterm -7         # PowerShell 7
//! conterm -s wsl.exe # custom shell
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | Alt+c | New tab |
//! | Alt+x | Close tab (the last tab is replaced, never removed) |
//! | Alt+n / Alt+p | Next / previous tab |
//! | Alt+1..9 | Select tab |
//! | Alt+q | Quit |
//!
//! Everything else is forwarded to the active shell.

mod config;
mod core;
mod tabs;
mod ui;

use std::env;
#[cfg(windows)]
use std::time::Duration;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[cfg(windows)]
use anyhow::Context;
#[cfg(windows)]
use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
#[cfg(windows)]
use tracing::error;

#[cfg(windows)]
use crate::config::Config;
#[cfg(windows)]
use crate::tabs::TerminalTabs;
#[cfg(windows)]
use crate::ui::{Canvas, ConsoleSurface, InputEncoder};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Command-line options.
struct CliArgs {
    shell: Option<String>,
    codepage: Option<u32>,
    working_dir: Option<std::path::PathBuf>,
    /// Shell was set explicitly, so it wins over config.toml.
    shell_from_cli: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            shell: None,
            codepage: None,
            working_dir: None,
            shell_from_cli: false,
        }
    }
}

fn print_version() {
    eprintln!("conterm {}", VERSION);
}

fn print_help() {
    eprintln!("conterm {} - tabbed ConPTY terminal for Windows", VERSION);
    eprintln!();
    eprintln!("Usage: conterm [OPTIONS]");
    eprintln!();
    eprintln!("Shell options:");
    eprintln!("  (default)             From config.toml or Command Prompt (cmd.exe)");
    eprintln!("  -c, --cmd             Command Prompt (cmd.exe)");
    eprintln!("  -p, --powershell      Windows PowerShell (powershell.exe)");
    eprintln!("  -7, --pwsh            PowerShell 7 (pwsh.exe)");
    eprintln!("  -w, --wsl             WSL (wsl.exe)");
    eprintln!("  -s, --shell <CMD>     Custom shell command");
    eprintln!();
    eprintln!("Other options:");
    eprintln!("  -d, --dir <PATH>      Working directory for new shells");
    eprintln!("  --sjis                Shift-JIS codepage (CP932) instead of UTF-8");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!(
        "Palettes (config.toml): {}",
        config::Palette::list().join(", ")
    );
}

fn parse_args() -> Result<Option<CliArgs>, String> {
    let mut args = CliArgs::default();
    let mut iter = env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-c" | "--cmd" => {
                args.shell = Some("cmd.exe".to_string());
                args.shell_from_cli = true;
            }
            "-p" | "--powershell" => {
                args.shell = Some("powershell.exe".to_string());
                args.shell_from_cli = true;
            }
            "-7" | "--pwsh" => {
                args.shell = Some("pwsh.exe".to_string());
                args.shell_from_cli = true;
            }
            "-w" | "--wsl" => {
                args.shell = Some("wsl.exe".to_string());
                args.shell_from_cli = true;
            }
            "-s" | "--shell" => {
                let shell = iter.next().ok_or("missing argument for --shell")?;
                args.shell = Some(shell);
                args.shell_from_cli = true;
            }
            "-d" | "--dir" => {
                let dir = iter.next().ok_or("missing argument for --dir")?;
                args.working_dir = Some(dir.into());
            }
            "--sjis" => args.codepage = Some(932),
            "-v" | "--version" => {
                print_version();
                return Ok(None);
            }
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            other => return Err(format!("unknown option: {}", other)),
        }
    }
    Ok(Some(args))
}

/// Log to `~/.conterm/conterm.log`; stdout belongs to the UI.
fn init_logging() {
    let log_path = config::home_dir()
        .map(|home| home.join(".conterm").join("conterm.log"))
        .unwrap_or_else(|| "conterm.log".into());
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    else {
        return;
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging();
    info!("conterm {} starting", VERSION);

    #[cfg(not(windows))]
    {
        let _ = args;
        anyhow::bail!("conterm requires Windows 10 1809+ (ConPTY)");
    }

    #[cfg(windows)]
    run(args)
}

#[cfg(windows)]
fn run(mut args: CliArgs) -> anyhow::Result<()> {
    let config = Config::load();
    if !args.shell_from_cli {
        args.shell = config.shell.clone();
    }
    // CLI --sjis wins, then config.toml, then UTF-8.
    if args.codepage.is_none() {
        args.codepage = config.codepage.or(Some(65001));
    }
    let palette = config.palette();
    info!(
        shell = args.shell.as_deref().unwrap_or("cmd.exe"),
        codepage = ?args.codepage,
        palette = palette.name,
        "configuration"
    );

    let (width, height) = ConsoleSurface::size().context("failed to query console size")?;
    let canvas = Canvas::new(ConsoleSurface::metrics(), palette);
    let (cols, rows) = canvas.grid_size(width as u32, height as u32);

    let mut terminal_tabs = TerminalTabs::new(
        cols,
        rows,
        args.shell.clone(),
        args.codepage,
        args.working_dir.clone().or_else(config::home_dir),
    );
    terminal_tabs
        .add_terminal(None)
        .context("failed to start shell")?;

    let mut surface = ConsoleSurface::new(cols, rows);
    surface.init().context("failed to initialize console")?;

    let result = event_loop(&mut terminal_tabs, &canvas, &mut surface);

    let _ = surface.cleanup();
    result
}

#[cfg(windows)]
fn event_loop(
    terminal_tabs: &mut TerminalTabs,
    canvas: &Canvas,
    surface: &mut ConsoleSurface,
) -> anyhow::Result<()> {
    use crate::core::session::SessionEvent;
    use crossterm::event;

    let encoder = InputEncoder::new();
    let poll_timeout = Duration::from_millis(10);
    let mut repaint = true;
    let mut last_title = String::new();

    loop {
        for (id, session_event) in terminal_tabs.drain_events() {
            match session_event {
                SessionEvent::Output => repaint = true,
                SessionEvent::Exited(code) => {
                    info!(session = id, code = ?code, "shell exited");
                    repaint = true;
                }
            }
        }

        if event::poll(poll_timeout)? {
            match event::read()? {
                Event::Key(key)
                    if matches!(key.kind, KeyEventKind::Press | KeyEventKind::Repeat) =>
                {
                    if key.modifiers.contains(KeyModifiers::ALT) {
                        if let Some(done) = handle_chord(terminal_tabs, key.code) {
                            if done {
                                break;
                            }
                            repaint = true;
                            continue;
                        }
                    }
                    let modes = terminal_tabs
                        .active()
                        .and_then(|session| session.with_screen(|screen| screen.modes()))
                        .unwrap_or_default();
                    if let Some(bytes) = encoder.encode(&key, &modes) {
                        terminal_tabs.write_active(&bytes);
                    }
                }
                Event::Paste(text) => {
                    let modes = terminal_tabs
                        .active()
                        .and_then(|session| session.with_screen(|screen| screen.modes()))
                        .unwrap_or_default();
                    terminal_tabs.write_active(&encoder.encode_paste(&text, &modes));
                }
                Event::Resize(width, height) => {
                    let (cols, rows) = canvas.grid_size(width as u32, height as u32);
                    terminal_tabs.resize(cols, rows);
                    surface.resize(cols, rows);
                    repaint = true;
                }
                _ => {}
            }
        }

        if repaint {
            repaint = false;
            if let Some(session) = terminal_tabs.active() {
                session.with_screen(|screen| canvas.render(screen, &mut *surface));
                if let Err(e) = surface.flush() {
                    error!(error = %e, "paint failed");
                }

                let title = format!(
                    "conterm [{}/{}] - {}",
                    terminal_tabs
                        .tab_info()
                        .iter()
                        .position(|(_, _, active)| *active)
                        .map(|i| i + 1)
                        .unwrap_or(1),
                    terminal_tabs.count(),
                    session.title()
                );
                if title != last_title {
                    print!("\x1b]0;{}\x07", title);
                    use std::io::Write;
                    let _ = std::io::stdout().flush();
                    last_title = title;
                }
            }
        }
    }

    Ok(())
}

/// Alt-chord handling. `Some(true)` quits, `Some(false)` consumed the key,
/// `None` passes it through to the shell.
#[cfg(windows)]
fn handle_chord(terminal_tabs: &mut TerminalTabs, code: KeyCode) -> Option<bool> {
    match code {
        KeyCode::Char('q') => Some(true),
        KeyCode::Char('c') => {
            if let Err(e) = terminal_tabs.add_terminal(None) {
                error!(error = %e, "failed to open tab");
            }
            Some(false)
        }
        KeyCode::Char('x') => {
            terminal_tabs.close_active();
            Some(false)
        }
        KeyCode::Char('n') => {
            terminal_tabs.next_tab();
            Some(false)
        }
        KeyCode::Char('p') => {
            terminal_tabs.prev_tab();
            Some(false)
        }
        KeyCode::Char(digit @ '1'..='9') => {
            let index = digit as usize - '1' as usize;
            terminal_tabs.set_active_index(index);
            Some(false)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_merging_to_config() {
        let args = CliArgs::default();
        assert!(args.codepage.is_none());
        assert!(args.shell.is_none());
        assert!(!args.shell_from_cli);
    }
}
