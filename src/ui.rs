use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::debug;
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::{io, time::Duration};
use textwrap::wrap;
use tui_input::{backend::crossterm::EventHandler, Input};

use optimist::{DeliveryStatus, Message, OptimisticChat, SendMode};

// Export types needed by main module
pub use ratatui::backend::CrosstermBackend;
pub use ratatui::Terminal;

/// What the user asked for on this tick
#[derive(Debug, Clone, PartialEq)]
pub enum UiAction {
    Submit(String),
    ToggleMode,
    Retry,
    Quit,
}

pub struct ChatUI {
    pub messages: Vec<Message>,
    input: Input,
    mode: SendMode,
    pending_count: usize,
    lock_input_while_pending: bool,
    notice: Option<(String, chrono::DateTime<chrono::Utc>)>, // Text and when it was shown
}

/// Slash commands typed into the message box
fn parse_command(line: &str) -> Option<UiAction> {
    match line.trim() {
        "/mode" => Some(UiAction::ToggleMode),
        "/retry" => Some(UiAction::Retry),
        "/quit" => Some(UiAction::Quit),
        _ => None,
    }
}

/// Trailer shown after a message, depending on where it is in its lifecycle
fn status_suffix(message: &Message) -> String {
    match message.status {
        DeliveryStatus::Sending => "⏳ Sending...".to_string(),
        DeliveryStatus::Failed => "❌ Failed".to_string(),
        DeliveryStatus::Sent => message
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M:%S")
            .to_string(),
    }
}

impl ChatUI {
    pub fn new(lock_input_while_pending: bool) -> Self {
        ChatUI {
            messages: Vec::new(),
            input: Input::default(),
            mode: SendMode::Optimistic,
            pending_count: 0,
            lock_input_while_pending,
            notice: None,
        }
    }

    /// Pull the current merged view from the chat
    pub fn sync(&mut self, chat: &OptimisticChat) {
        self.update(chat.view(), chat.mode(), chat.pending_count());
    }

    fn update(&mut self, messages: Vec<Message>, mode: SendMode, pending_count: usize) {
        self.messages = messages;
        self.mode = mode;
        self.pending_count = pending_count;
    }

    /// Confirmed mode always waits for the current send; optimistic mode only when configured to
    pub fn is_input_locked(&self) -> bool {
        self.pending_count > 0 && (self.lock_input_while_pending || self.mode == SendMode::Confirmed)
    }

    pub fn show_notice(&mut self, text: &str) {
        self.notice = Some((text.to_string(), chrono::Utc::now()));
    }

    pub fn clean_notice(&mut self, max_age_seconds: i64) {
        if let Some((_, shown_at)) = &self.notice {
            if chrono::Utc::now().signed_duration_since(*shown_at).num_seconds() >= max_age_seconds {
                self.notice = None;
            }
        }
    }

    pub fn handle_input(&mut self) -> Result<Option<UiAction>> {
        if !event::poll(Duration::from_millis(10))? {
            return Ok(None);
        }

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                return Ok(None);
            }

            match key.code {
                KeyCode::Esc => return Ok(Some(UiAction::Quit)),
                _ if self.is_input_locked() => {
                    debug!("Input locked while {} send(s) in flight", self.pending_count);
                }
                KeyCode::Enter => {
                    let line = self.input.value().to_string();
                    if line.trim().is_empty() {
                        return Ok(None);
                    }

                    // Clear input field immediately
                    self.input.reset();

                    return Ok(Some(parse_command(&line).unwrap_or(UiAction::Submit(line))));
                }
                _ => {
                    self.input.handle_event(&Event::Key(key));
                }
            }
        }

        Ok(None)
    }

    pub fn draw<B: Backend>(&self, frame: &mut Frame<B>) {
        let size = frame.size();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(5),    // Messages area
                Constraint::Length(3), // Input box
                Constraint::Length(1), // Help line
            ])
            .split(size);

        draw_messages(frame, &self.messages, chunks[0], self);

        let (input_title, input_style) = if self.is_input_locked() {
            ("Message (waiting for send to settle)", Style::default().fg(Color::DarkGray))
        } else {
            ("Message", Style::default().fg(Color::Yellow))
        };

        let input_widget = Paragraph::new(self.input.value())
            .block(Block::default().title(input_title).borders(Borders::ALL).border_style(input_style))
            .style(Style::default());
        frame.render_widget(input_widget, chunks[1]);

        let mode_style = match self.mode {
            SendMode::Optimistic => Style::default().fg(Color::Green),
            SendMode::Confirmed => Style::default().fg(Color::Yellow),
        };

        let mut help_spans = vec![
            Span::styled("ESC quit | /mode [", Style::default().fg(Color::Gray)),
            Span::styled(self.mode.label(), mode_style),
            Span::styled("] | /retry resend last failed", Style::default().fg(Color::Gray)),
        ];
        if let Some((notice, _)) = &self.notice {
            help_spans.push(Span::styled(format!(" | {}", notice), Style::default().fg(Color::Cyan)));
        }
        frame.render_widget(Paragraph::new(Line::from(help_spans)), chunks[2]);

        if !self.is_input_locked() {
            frame.set_cursor(
                // Put cursor past the end of the input text
                chunks[1].x + self.input.cursor() as u16 + 1,
                chunks[1].y + 1,
            );
        }
    }
}

fn draw_messages<B: Backend>(f: &mut Frame<B>, messages: &[Message], area: Rect, ui: &ChatUI) {
    let wrap_width = area.width.saturating_sub(2) as usize; // Account for borders

    let items: Vec<ListItem> = messages
        .iter()
        .flat_map(|m| {
            let full_content = format!("{}: {}  {}", m.sender.display_name(), m.text, status_suffix(m));

            let wrapped_lines: Vec<String> = wrap(&full_content, wrap_width.max(1))
                .into_iter()
                .map(|l| l.into_owned())
                .collect();

            let style = if m.sender.is_me() {
                match m.status {
                    DeliveryStatus::Sending => Style::default().fg(Color::Blue).add_modifier(Modifier::DIM),
                    DeliveryStatus::Failed => Style::default().fg(Color::Red),
                    DeliveryStatus::Sent => Style::default().fg(Color::Blue),
                }
            } else {
                Style::default()
            };

            wrapped_lines
                .into_iter()
                .map(move |line| ListItem::new(Text::from(line)).style(style))
        })
        .collect();

    let title = if ui.pending_count > 0 {
        format!("Messages ({} in flight)", ui.pending_count)
    } else {
        "Messages".to_string()
    };

    // Keep the newest line in view
    let mut list_state = ListState::default();
    if !items.is_empty() {
        list_state.select(Some(items.len() - 1));
    }

    let messages_list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(Style::default());

    f.render_stateful_widget(messages_list, area, &mut list_state);
}

pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

pub fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/mode"), Some(UiAction::ToggleMode));
        assert_eq!(parse_command(" /retry "), Some(UiAction::Retry));
        assert_eq!(parse_command("/quit"), Some(UiAction::Quit));
        assert_eq!(parse_command("hello /mode"), None);
        assert_eq!(parse_command("/unknown"), None);
    }

    #[test]
    fn test_status_suffix() {
        let pending = Message::sending("hi");
        assert_eq!(status_suffix(&pending), "⏳ Sending...");

        let failed = pending.into_failed().unwrap();
        assert_eq!(status_suffix(&failed), "❌ Failed");

        let sent = Message::confirmed("hi");
        let suffix = status_suffix(&sent);
        assert_eq!(suffix.len(), "00:00:00".len());
    }

    #[test]
    fn test_input_lock() {
        let mut ui = ChatUI::new(true);
        assert!(!ui.is_input_locked());

        ui.update(Vec::new(), SendMode::Optimistic, 1);
        assert!(ui.is_input_locked());

        let mut unlocked = ChatUI::new(false);
        unlocked.update(Vec::new(), SendMode::Optimistic, 2);
        assert!(!unlocked.is_input_locked());

        // Confirmed mode waits regardless of the setting
        unlocked.update(Vec::new(), SendMode::Confirmed, 1);
        assert!(unlocked.is_input_locked());
    }

    #[test]
    fn test_notice_expires() {
        let mut ui = ChatUI::new(true);
        ui.show_notice("Message failed");
        ui.clean_notice(60);
        assert!(ui.notice.is_some());

        ui.clean_notice(0);
        assert!(ui.notice.is_none());
    }
}
