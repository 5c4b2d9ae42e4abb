mod app;
mod cluster;
mod columns;
mod config;
mod detail;
mod error;
mod logging;
mod models;
mod prometheus;
mod refresh;
#[cfg(test)]
mod test_server;
mod theme;
mod ui;
mod view;

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use ratatui::{backend::CrosstermBackend, Terminal};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::info;

use crate::app::App;
use crate::config::Args;
use crate::refresh::Refresher;

type Backend = CrosstermBackend<io::Stdout>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.log_file.as_deref()).context("failed to open log file")?;

    let source = args
        .cluster_source()
        .context("either --cluster-url or --cluster-file is required")?;
    info!(source = %source.describe(), team = %args.team, "starting dashboard");

    let refresher = Refresher::spawn(
        Client::new(),
        source.clone(),
        &args.team,
        args.cluster_interval(),
        args.metrics_interval(),
    );

    let (search_tx, search_rx) = mpsc::unbounded_channel::<String>();
    let mut app = App::new(
        args.team.clone(),
        source.describe(),
        args.initial_filter(),
        Box::new(move |worker: &str| {
            let _ = search_tx.send(worker.to_string());
        }),
    );

    let result = {
        let _guard = TerminalGuard::enter(io::stdout())?;
        let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;
        run(&mut terminal, &mut app, refresher, search_rx)
    };

    result?;
    if let Some(worker) = app.picked {
        println!("{worker}");
    }
    Ok(())
}

/// Raw mode plus the alternate screen, undone on drop whichever way the
/// session ends.
struct TerminalGuard<W: Write> {
    out: W,
}

impl<W: Write> TerminalGuard<W> {
    fn enter(mut out: W) -> io::Result<Self> {
        crossterm::terminal::enable_raw_mode()?;
        crossterm::execute!(
            out,
            crossterm::terminal::EnterAlternateScreen,
            crossterm::event::EnableMouseCapture
        )
        .inspect_err(|_| {
            let _ = crossterm::terminal::disable_raw_mode();
        })?;
        Ok(Self { out })
    }
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        let _ = crossterm::execute!(
            self.out,
            crossterm::terminal::LeaveAlternateScreen,
            crossterm::event::DisableMouseCapture,
            crossterm::cursor::Show
        );
        let _ = crossterm::terminal::disable_raw_mode();
    }
}

fn run(
    terminal: &mut Terminal<Backend>,
    app: &mut App,
    mut refresher: Refresher,
    mut search_rx: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    loop {
        if let Some(cluster) = refresher.latest_cluster() {
            app.apply_cluster(cluster);
        }
        if let Some(metrics) = refresher.latest_metrics() {
            app.apply_metrics(metrics);
        }

        app.tick();
        terminal.draw(|f| ui::render(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key(key.code);
                }
            }
        }

        // The search-pods callback only enqueues; picking a worker ends the session.
        while let Ok(worker) = search_rx.try_recv() {
            info!(%worker, "searching pods on worker");
            app.picked = Some(worker);
            app.should_quit = true;
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_guard_restores_screen_on_drop() {
        let mut out = Vec::new();
        drop(TerminalGuard { out: &mut out });

        let written = String::from_utf8(out).unwrap();
        assert!(written.contains("\x1b[?1049l"), "alternate screen left: {written:?}");
        assert!(written.contains("\x1b[?25h"), "cursor shown: {written:?}");
    }
}
