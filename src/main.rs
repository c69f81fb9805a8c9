use anyhow::Result;
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod ui;
mod utils;

use crate::ui::{ChatUI, UiAction};
use optimist::settings::{self, Settings};
use optimist::{initial_messages, ChatEvent, DeliveryStatus, OptimisticChat, SendMode, SimulatedTransport};

/// Command line arguments. Anything left out falls back to the settings file, then to the defaults.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A terminal chat that shows optimistic updates against a simulated, unreliable server."
)]
struct Args {
    /// Latency of every simulated send, in milliseconds
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Probability (0.0 to 1.0) that a simulated send fails
    #[arg(long, value_name = "P")]
    failure_rate: Option<f64>,

    /// Show messages right away, or only after the send settles
    #[arg(long, value_enum)]
    mode: Option<SendMode>,

    /// Start with an empty conversation
    #[arg(long)]
    no_seed: bool,

    /// Keep the input usable while sends are in flight (optimistic mode only)
    #[arg(long)]
    unlocked_input: bool,

    /// Where to write the log
    #[arg(long, value_name = "PATH", default_value = "optimist.log")]
    log_file: PathBuf,

    /// Directory holding settings.json
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,
}

impl Args {
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(delay_ms) = self.delay_ms {
            settings.delay_ms = delay_ms;
        }
        if let Some(failure_rate) = self.failure_rate {
            settings.failure_rate = failure_rate;
        }
        if let Some(mode) = self.mode {
            settings.mode = mode;
        }
        if self.no_seed {
            settings.seed_conversation = false;
        }
        if self.unlocked_input {
            settings.lock_input_while_pending = false;
        }
        settings
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    utils::setup_logging(args.log_file.to_str(), LevelFilter::Debug)?;
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    if let Some(dir) = &args.config_dir {
        settings::set_config_dir_override(dir.clone());
    }

    let stored = match settings::load_settings() {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Ignoring unreadable settings file: {}", e);
            None
        }
    };
    let settings = args.apply(stored.unwrap_or_default());
    if let Err(e) = settings.validate() {
        error!("Invalid settings: {}", e);
        return Err(e.into());
    }
    info!(
        "Simulating sends with {}ms latency and {:.0}% failure rate",
        settings.delay_ms,
        settings.failure_rate * 100.0
    );

    let transport = Arc::new(SimulatedTransport::from_settings(&settings));
    let history = if settings.seed_conversation {
        initial_messages()
    } else {
        Vec::new()
    };
    let (chat, mut events) = OptimisticChat::with_history(transport, settings.mode, history);

    let mut terminal = ui::setup_terminal()?;
    let mut chat_ui = ChatUI::new(settings.lock_input_while_pending);

    let loop_result = run_main_loop(&mut chat_ui, &mut terminal, &chat, &mut events).await;

    chat.shutdown();
    ui::restore_terminal(terminal)?;

    // Keep the mode the user ended on
    let settings = Settings {
        mode: chat.mode(),
        ..settings
    };
    if let Err(e) = settings::save_settings(&settings) {
        eprintln!("Warning: Failed to save settings: {}", e);
    }

    loop_result?;
    println!("Chat session ended.");
    Ok(())
}

async fn run_main_loop(
    chat_ui: &mut ChatUI,
    terminal: &mut ui::Terminal<ui::CrosstermBackend<io::Stdout>>,
    chat: &OptimisticChat,
    events: &mut tokio::sync::mpsc::Receiver<ChatEvent>,
) -> Result<()> {
    loop {
        chat_ui.sync(chat);
        chat_ui.clean_notice(5);
        terminal.draw(|f| chat_ui.draw(f))?;

        while let Ok(event) = events.try_recv() {
            match event {
                ChatEvent::Submitted { local_id } => debug!("UI saw submission {}", local_id),
                ChatEvent::Settled { message, .. } if message.status == DeliveryStatus::Failed => {
                    chat_ui.show_notice("Message failed to send, /retry to resend");
                }
                ChatEvent::Settled { message, .. } => debug!("UI saw {} settle", message.id),
            }
        }

        match chat_ui.handle_input()? {
            Some(UiAction::Quit) => {
                info!("Quit requested");
                return Ok(());
            }
            Some(UiAction::Submit(text)) => {
                if chat.submit(&text).is_none() {
                    chat_ui.show_notice("Still sending, try again in a moment");
                }
            }
            Some(UiAction::ToggleMode) => {
                let mode = chat.mode().toggled();
                chat.set_mode(mode);
                chat_ui.show_notice(&format!("Switched to {} mode", mode.label()));
            }
            Some(UiAction::Retry) => {
                if let Some(notice) = retry_last_failed(chat) {
                    chat_ui.show_notice(notice);
                }
            }
            None => {
                // Let settlement tasks run between polls
                tokio::task::yield_now().await;
            }
        }
    }
}

/// Resend the most recent failure. Returns the notice to show when nothing was resent.
fn retry_last_failed(chat: &OptimisticChat) -> Option<&'static str> {
    if chat.resubmit_last_failed().is_some() {
        return None;
    }
    if chat.is_pending() && chat.mode() == SendMode::Confirmed {
        // Confirmed mode takes one send at a time
        Some("Still sending, try again in a moment")
    } else {
        Some("Nothing to retry")
    }
}
