use anyhow::{anyhow, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use std::io::{self, Stdout, Write};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::input::Key;
use crate::net::{PollReport, PollRequest, PollSchedule};
use crate::ui;

pub type Tui = Terminal<CrosstermBackend<Stdout>>;

/// Owns the terminal in raw mode on the alternate screen and puts it back on
/// drop. A panic hook does the same for unwinding paths that never reach it.
pub struct TerminalGuard {
    terminal: Tui,
}

impl TerminalGuard {
    pub fn acquire() -> Result<Self> {
        install_panic_hook();
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(err) = execute!(stdout, EnterAlternateScreen) {
            best_effort_cleanup();
            return Err(err.into());
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout)).and_then(|mut t| {
            t.clear()?;
            Ok(t)
        });
        match terminal {
            Ok(terminal) => {
                debug!("terminal acquired");
                Ok(Self { terminal })
            }
            Err(err) => {
                best_effort_cleanup();
                Err(err.into())
            }
        }
    }

    pub fn terminal_mut(&mut self) -> &mut Tui {
        &mut self.terminal
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
        debug!("terminal restored");
    }
}

fn install_panic_hook() {
    static HOOK: OnceLock<()> = OnceLock::new();
    HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // Background panics are caught by their threads; keep the screen.
            if std::thread::current().name() != Some("main") {
                error!("{info}");
                return;
            }
            best_effort_cleanup();
            previous(info);
        }));
    });
}

fn best_effort_cleanup() {
    let mut stdout = io::stdout();
    let _ = execute!(stdout, crossterm::cursor::Show);
    let _ = execute!(stdout, LeaveAlternateScreen);
    let _ = disable_raw_mode();
    let _ = stdout.flush();
}

pub struct PollChannels {
    pub req_tx: Sender<PollRequest>,
    pub res_rx: Receiver<PollReport>,
}

/// The foreground loop. Each pass drains poll results, waits up to one frame
/// for keys, requests a fetch when due, then builds and draws a frame.
pub fn run_app(
    terminal: &mut Tui,
    mut app: App,
    polls: PollChannels,
    frame_interval: Duration,
) -> Result<()> {
    let mut schedule = PollSchedule::default();
    info!("board running, source {}", app.url());
    loop {
        while let Ok(report) = polls.res_rx.try_recv() {
            schedule.mark_completed();
            app.apply_poll(report);
        }

        let mut wait = frame_interval;
        while event::poll(wait)? {
            if let Event::Key(event) = event::read()? {
                if let Some(key) = Key::from_event(&event) {
                    if !app.handle_key(key, Instant::now()) {
                        return Ok(());
                    }
                }
            }
            wait = Duration::ZERO;
        }

        let now = Instant::now();
        if schedule.due(now, app.interval()) {
            let request = PollRequest {
                url: app.url().to_string(),
            };
            if polls.req_tx.send(request).is_err() {
                warn!("poller thread is gone");
                return Err(anyhow!("poller stopped unexpectedly"));
            }
            schedule.mark_requested(now);
        }

        let frame = app.frame(now);
        let queued = app.request_enrichment(&frame.missing);
        if queued > 0 {
            debug!("queued {queued} enrichment lookups");
        }
        terminal.draw(|f| ui::draw(f, &frame))?;
    }
}
