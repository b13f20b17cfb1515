//! Splash screen drawn on the terminal by its own thread.
//!
//! The thread receives an immutable [`SplashSnapshot`] when it is created
//! and a one-shot close channel. Nothing else is shared with the launch.
//! Once shown, the screen stays up for at least `min_dwell`, even when the
//! close request arrives earlier.

use crossterm::cursor;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{self, ClearType};
use crossterm::{execute, queue};
use std::io::{self, IsTerminal, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::launch_config::Presentation;
use crate::wait::CancelToken;

const FRAME: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct SplashSnapshot {
    pub presentation: Presentation,
    pub min_dwell: Duration,
    /// Set when the user aborts from the splash screen.
    pub cancel: CancelToken,
}

pub struct SplashScreen {
    close: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SplashScreen {
    /// Starts the splash thread. Drawing only happens when stdout is a
    /// terminal; otherwise the thread just honours the dwell time.
    pub fn show(snapshot: SplashSnapshot) -> io::Result<Self> {
        Self::spawn(snapshot, io::stdout().is_terminal())
    }

    fn spawn(snapshot: SplashSnapshot, interactive: bool) -> io::Result<Self> {
        let (close, closed) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("splash".to_string())
            .spawn(move || run(snapshot, closed, interactive))?;
        Ok(Self {
            close: Some(close),
            thread: Some(thread),
        })
    }

    /// Asks the screen to close and blocks until its teardown finished.
    pub fn dismiss(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("splash thread panicked");
            }
        }
    }
}

impl Drop for SplashScreen {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(snapshot: SplashSnapshot, closed: Receiver<()>, interactive: bool) {
    let shown_at = Instant::now();
    let mut screen = if interactive {
        TerminalSplash::enter(&snapshot.presentation)
            .map_err(|err| log::warn!("splash screen unavailable: {err}"))
            .ok()
    } else {
        None
    };
    let mut close_requested = false;
    let mut frame = 0usize;

    loop {
        let failed = match screen.as_mut() {
            Some(active) => active
                .draw(frame)
                .and_then(|()| active.poll_keys(&snapshot.cancel))
                .err(),
            None => None,
        };
        if let Some(err) = failed {
            log::warn!("splash screen stopped rendering: {err}");
            screen = None;
        }

        let remaining = snapshot.min_dwell.saturating_sub(shown_at.elapsed());
        if close_requested {
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(FRAME));
        } else {
            match closed.recv_timeout(FRAME) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => close_requested = true,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        frame = frame.wrapping_add(1);
    }

    drop(screen);
    log::debug!("splash screen closed after {:?}", shown_at.elapsed());
}

struct TerminalSplash {
    out: io::Stdout,
    title: String,
    loading: String,
    title_color: Color,
    loading_color: Color,
    background: Color,
}

impl TerminalSplash {
    fn enter(presentation: &Presentation) -> io::Result<Self> {
        let defaults = Presentation::default();
        let mut out = io::stdout();
        terminal::enable_raw_mode()?;
        execute!(out, terminal::EnterAlternateScreen, cursor::Hide)?;
        Ok(Self {
            out,
            title: presentation.title_text.clone(),
            loading: presentation.loading_text.clone(),
            title_color: color_or(&presentation.title_color, &defaults.title_color),
            loading_color: color_or(&presentation.loading_color, &defaults.loading_color),
            background: color_or(&presentation.background_color, &defaults.background_color),
        })
    }

    fn draw(&mut self, frame: usize) -> io::Result<()> {
        let (cols, rows) = terminal::size()?;
        let middle = rows / 2;

        // Full repaint now and then picks up terminal resizes.
        if frame % 8 == 0 {
            queue!(
                self.out,
                SetBackgroundColor(self.background),
                terminal::Clear(ClearType::All),
                cursor::MoveTo(centered(cols, &self.title), middle.saturating_sub(1)),
                SetForegroundColor(self.title_color),
                Print(&self.title),
            )?;
        }
        let dots = ".".repeat(frame % 4);
        queue!(
            self.out,
            cursor::MoveTo(centered(cols, &self.loading), middle + 1),
            SetBackgroundColor(self.background),
            SetForegroundColor(self.loading_color),
            Print(format!("{}{dots:<3}", self.loading)),
        )?;
        self.out.flush()
    }

    fn poll_keys(&mut self, cancel: &CancelToken) -> io::Result<()> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if is_abort(&key) && !cancel.is_cancelled() {
                    log::info!("launch cancelled from the splash screen");
                    cancel.cancel();
                }
            }
        }
        Ok(())
    }
}

impl Drop for TerminalSplash {
    fn drop(&mut self) {
        let _ = execute!(
            self.out,
            ResetColor,
            terminal::Clear(ClearType::All),
            cursor::Show,
            terminal::LeaveAlternateScreen
        );
        let _ = terminal::disable_raw_mode();
    }
}

fn is_abort(key: &KeyEvent) -> bool {
    if key.kind == KeyEventKind::Release {
        return false;
    }
    key.code == KeyCode::Esc
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

fn centered(cols: u16, text: &str) -> u16 {
    let width = u16::try_from(text.chars().count()).unwrap_or(u16::MAX);
    cols.saturating_sub(width) / 2
}

fn color_or(value: &str, fallback: &str) -> Color {
    parse_color(value).unwrap_or_else(|| {
        log::warn!("unknown colour {value:?}, using {fallback}");
        parse_color(fallback).unwrap_or(Color::Reset)
    })
}

/// Console colour names (`DarkBlue`, `dark_grey`, ...) or `#RRGGBB` and
/// `#AARRGGBB`. Alpha is ignored.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    let name: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect::<String>()
        .to_ascii_lowercase();
    let color = match name.as_str() {
        "black" => Color::Black,
        "white" => Color::White,
        "gray" | "grey" => Color::Grey,
        "darkgray" | "darkgrey" => Color::DarkGrey,
        "red" => Color::Red,
        "darkred" => Color::DarkRed,
        "green" => Color::Green,
        "darkgreen" => Color::DarkGreen,
        "blue" => Color::Blue,
        "darkblue" => Color::DarkBlue,
        "yellow" => Color::Yellow,
        "darkyellow" => Color::DarkYellow,
        "cyan" => Color::Cyan,
        "darkcyan" => Color::DarkCyan,
        "magenta" => Color::Magenta,
        "darkmagenta" => Color::DarkMagenta,
        _ => return None,
    };
    Some(color)
}

fn parse_hex(hex: &str) -> Option<Color> {
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let rgb = match hex.len() {
        6 => hex,
        8 => &hex[2..],
        _ => return None,
    };
    let channel = |at: usize| u8::from_str_radix(&rgb[at..at + 2], 16).ok();
    Some(Color::Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}
