//! Live render handler: a full-screen alternate-buffer view of a sweep
//! run, one pane per repo in input order, with a progress bar and footer.
//!
//! The view state has a single writer, the event loop below. Per-channel
//! drainer tasks and the input thread only feed events into the bus. If
//! the terminal cannot be initialized the handler falls back to the
//! native renderer on the same channels, so no work is lost.

pub mod event;
mod state;
mod ui;

pub use event::{Event, Queue};
pub use state::{ContentLine, RepoStatus, View};

use anyhow::Result;
use async_trait::async_trait;
use ratatui::crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::crossterm::ExecutableCommand;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;

use sweep_core::render::NO_REPOS_MESSAGE;
use sweep_core::{ChannelSink, Ctx, Native, Render};

use event::{spawn_drainers, spawn_input_thread};

pub struct Tui;

impl Tui {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Tui {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Render for Tui {
    async fn render(&mut self, ctx: &Ctx, channels: &mut [ChannelSink]) -> Result<()> {
        if channels.is_empty() {
            println!("{NO_REPOS_MESSAGE}");
            return Ok(());
        }

        // Fall back before touching the queues so the native handler sees
        // them intact.
        let mut terminal = match init_terminal() {
            Ok(terminal) => terminal,
            Err(err) => {
                restore_terminal();
                eprintln!("sweep: no terminal ({err:#}), using plain output");
                return Native::stdout().render(ctx, channels).await;
            }
        };

        let names = channels.iter().map(|s| s.name().to_string()).collect();
        let mut view = View::new(names);

        let (tx, rx) = mpsc::unbounded_channel();
        spawn_drainers(channels, &tx);
        let stop_input = spawn_input_thread(tx.clone());
        drop(tx);

        let result = event_loop(ctx, &mut terminal, rx, &mut view).await;
        stop_input.store(true, Ordering::Relaxed);
        restore_terminal();

        let print_after = result?;
        if print_after {
            print!("{}", view.render_plain());
        }
        Ok(())
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<std::io::Stdout>>> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout()))?)
}

/// Leave raw mode and the alternate screen. Safe to call when the
/// terminal was never initialized, so panic hooks can use it.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = stdout().execute(LeaveAlternateScreen);
}

/// Single-threaded loop over the event bus. Redraws on a ~10 Hz tick while
/// work is outstanding, and on input afterwards. Returns whether the full
/// log should be printed after the terminal is restored.
async fn event_loop(
    ctx: &Ctx,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    view: &mut View,
) -> Result<bool> {
    let mut tick = tokio::time::interval(Duration::from_millis(100));
    let mut print_after = ctx.config.print_results;
    let mut completion_drawn = false;

    terminal.draw(|f| ui::draw(f, view))?;

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                let Some(ev) = maybe_event else { break };
                match ev {
                    Event::Key(key) => match key_action(ctx, view, key) {
                        KeyAction::Quit => break,
                        KeyAction::QuitAndPrint => {
                            print_after = true;
                            break;
                        }
                        KeyAction::Redraw => {
                            terminal.draw(|f| ui::draw(f, view))?;
                        }
                        KeyAction::None => {}
                    },
                    Event::Resize => {
                        terminal.draw(|f| ui::draw(f, view))?;
                    }
                    other => view.apply(other),
                }
            }
            _ = tick.tick(), if !view.all_done() => {
                terminal.draw(|f| ui::draw(f, view))?;
            }
        }

        if view.all_done() {
            if !ctx.config.wait_on_exit {
                break;
            }
            if !completion_drawn {
                completion_drawn = true;
                terminal.draw(|f| ui::draw(f, view))?;
            }
        }
    }

    Ok(print_after)
}

#[derive(Debug, PartialEq, Eq)]
enum KeyAction {
    None,
    Redraw,
    Quit,
    QuitAndPrint,
}

/// Map a key press to an action. `Ctrl-C` cancels the run context; the
/// quit keys only work once every repo has completed, so the handler
/// always drains the channels fully.
fn key_action(ctx: &Ctx, view: &mut View, key: KeyEvent) -> KeyAction {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        if matches!(key.code, KeyCode::Char('c') | KeyCode::Char('C')) {
            ctx.cancel();
        }
        return KeyAction::None;
    }

    let page = view.viewport_height.max(1);
    match key.code {
        KeyCode::Up | KeyCode::Char('k') | KeyCode::Char('h') => {
            view.scroll_up(1);
            KeyAction::Redraw
        }
        KeyCode::Down | KeyCode::Char('j') | KeyCode::Char('l') => {
            view.scroll_down(1);
            KeyAction::Redraw
        }
        KeyCode::PageUp => {
            view.scroll_up(page);
            KeyAction::Redraw
        }
        KeyCode::PageDown => {
            view.scroll_down(page);
            KeyAction::Redraw
        }
        KeyCode::Home => {
            view.scroll_home();
            KeyAction::Redraw
        }
        KeyCode::End => {
            view.scroll_end();
            KeyAction::Redraw
        }
        KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter if view.all_done() => KeyAction::Quit,
        KeyCode::Char('p') if view.all_done() => KeyAction::QuitAndPrint,
        _ => KeyAction::None,
    }
}
