use std::{
    collections::VecDeque,
    sync::mpsc::{Receiver, TryRecvError},
    time::Duration,
};

use anyhow::Result;
use crossterm::{
    event::{self, Event as CEvent, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Terminal,
};
use tapbot_types::{
    events::{EventPayload, StatusLevel, SystemEvent},
    outcome::RoundOutcome,
};

const MAX_LOG_ENTRIES: usize = 120;

/// Running win/loss counts for the header.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    won: u32,
    lost: u32,
    undetermined: u32,
}

impl Tally {
    fn record(&mut self, outcome: RoundOutcome) {
        match outcome {
            RoundOutcome::Won => self.won += 1,
            RoundOutcome::Lost => self.lost += 1,
            RoundOutcome::Undetermined => self.undetermined += 1,
        }
    }
}

pub fn run(receiver: Receiver<SystemEvent>, summary: String) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.hide_cursor()?;

    let res = run_loop(&mut terminal, receiver, summary.as_str());

    terminal.show_cursor()?;
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    res
}

fn run_loop<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    receiver: Receiver<SystemEvent>,
    summary: &str,
) -> Result<()> {
    let mut logs: VecDeque<(StatusLevel, String)> = VecDeque::with_capacity(MAX_LOG_ENTRIES);
    let mut last_status = String::from("Waiting for session");
    let mut tally = Tally::default();
    let mut finished = false;

    loop {
        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if let Some(status) = status_line(&event) {
                        last_status = status;
                    }
                    if let Some(outcome) = event.outcome() {
                        tally.record(outcome);
                    }
                    if logs.len() == MAX_LOG_ENTRIES {
                        logs.pop_front();
                    }
                    logs.push_back((level_of(&event), format_event(&event)));
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(0)])
                .split(f.size());

            let header = Paragraph::new(Line::from(vec![
                Span::styled(
                    "Tapbot",
                    Style::default()
                        .fg(Color::Cyan)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("  "),
                Span::raw(last_status.clone()),
                Span::raw("  "),
                Span::styled("config:", Style::default().fg(Color::Magenta)),
                Span::raw(" "),
                Span::raw(summary),
                Span::raw("  "),
                Span::styled("q", Style::default().fg(Color::Yellow)),
                Span::raw(if finished { " to exit" } else { " to hide" }),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Status"));
            f.render_widget(header, chunks[0]);

            let counts = Paragraph::new(Line::from(vec![
                Span::styled(
                    format!("won {}", tally.won),
                    Style::default().fg(Color::Green),
                ),
                Span::raw("  "),
                Span::styled(format!("lost {}", tally.lost), Style::default().fg(Color::Red)),
                Span::raw("  "),
                Span::styled(
                    format!("undetermined {}", tally.undetermined),
                    Style::default().fg(Color::DarkGray),
                ),
            ]))
            .block(Block::default().borders(Borders::ALL).title("Games"));
            f.render_widget(counts, chunks[1]);

            let items: Vec<ListItem> = logs
                .iter()
                .rev()
                .map(|(level, entry)| ListItem::new(entry.clone()).style(level_style(*level)))
                .collect();

            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL).title("Recent events"));
            f.render_widget(list, chunks[2]);
        })?;

        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Text for the header, taken from status messages only.
fn status_line(event: &SystemEvent) -> Option<String> {
    match &event.payload {
        EventPayload::Status(status) => Some(status.message.clone()),
        _ => None,
    }
}

fn level_of(event: &SystemEvent) -> StatusLevel {
    match &event.payload {
        EventPayload::Status(status) => status.level,
        _ => StatusLevel::Info,
    }
}

fn level_style(level: StatusLevel) -> Style {
    match level {
        StatusLevel::Info => Style::default(),
        StatusLevel::Warning => Style::default().fg(Color::Yellow),
        StatusLevel::Error => Style::default().fg(Color::Red),
    }
}

fn format_event(event: &SystemEvent) -> String {
    let timestamp = event.timestamp.format("%H:%M:%S");
    match &event.payload {
        EventPayload::Lifecycle(lifecycle) => format!(
            "[{}] {:?} {}",
            timestamp,
            lifecycle.phase,
            lifecycle.details.clone().unwrap_or_default()
        ),
        EventPayload::Round(round) => format!(
            "[{}] game {} {} after {} ticks ({} ms)",
            timestamp,
            round.telemetry.game,
            round.telemetry.outcome,
            round.telemetry.ticks,
            round.telemetry.elapsed_ms
        ),
        EventPayload::Status(status) => format!("[{}] {}", timestamp, status.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapbot_types::{events::LifecyclePhase, telemetry::RoundTelemetry};

    fn round(game: u32, outcome: RoundOutcome) -> SystemEvent {
        SystemEvent::round(RoundTelemetry {
            game,
            outcome,
            ticks: 3,
            elapsed_ms: 600,
        })
    }

    #[test]
    fn tally_counts_each_outcome() {
        let mut tally = Tally::default();
        for outcome in [RoundOutcome::Won, RoundOutcome::Lost, RoundOutcome::Won] {
            tally.record(outcome);
        }
        tally.record(RoundOutcome::Undetermined);
        assert_eq!(
            tally,
            Tally {
                won: 2,
                lost: 1,
                undetermined: 1
            }
        );
    }

    #[test]
    fn header_follows_status_messages_only() {
        let status = SystemEvent::status(StatusLevel::Info, "Game lost!");
        assert_eq!(status_line(&status).as_deref(), Some("Game lost!"));
        assert_eq!(status_line(&round(1, RoundOutcome::Lost)), None);
        assert_eq!(
            status_line(&SystemEvent::lifecycle(LifecyclePhase::GameStart, None)),
            None
        );
    }

    #[test]
    fn round_lines_carry_outcome_and_ticks() {
        let line = format_event(&round(2, RoundOutcome::Won));
        assert!(line.ends_with("game 2 won after 3 ticks (600 ms)"), "{line}");
    }
}
