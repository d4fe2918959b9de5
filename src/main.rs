//! lingobuddy command line: history inspection, voice tools, one-shot chat
//! and the check-in timer.

use clap::{Parser, Subcommand};
use lingobuddy::{bot, checkin, config, history, voice};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lingobuddy", about = "WeChat chatbot with LLM replies, voice and chat history")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect the chat history database
    History {
        /// Database file (defaults to the configured one)
        #[arg(long)]
        db: Option<PathBuf>,

        #[command(subcommand)]
        query: HistoryQuery,
    },
    /// Voice reply tools
    Voice {
        #[command(subcommand)]
        action: VoiceAction,
    },
    /// Answer one message the way the bot would
    Chat {
        #[arg(long, default_value = "console")]
        sender_id: String,
        #[arg(long, default_value = "console")]
        sender_name: String,
        /// Reply language for voice output (en or zh)
        #[arg(long, default_value = "zh")]
        lang: String,
        text: String,
    },
    /// Run the check-in timer and print the bot-initiated messages
    Checkin,
}

#[derive(Subcommand, Debug)]
enum HistoryQuery {
    /// Most recent turns
    Recent {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// All turns of one sender
    User { sender_id: String },
    /// Messages per day
    Stats {
        #[arg(short, long, default_value_t = 7)]
        days: u32,
    },
    /// Senders with the most messages
    Active {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Messages containing a keyword
    Search { keyword: String },
}

#[derive(Subcommand, Debug)]
enum VoiceAction {
    /// Tell whether a message asks for a voice reply
    Check { text: String },
    /// Synthesize text into a voice file
    Speak {
        #[arg(long, default_value = "zh")]
        lang: String,
        text: String,
    },
    /// Delete generated voice files
    Cleanup,
}

fn run_history(
    db: Option<PathBuf>,
    query: HistoryQuery,
    config: &config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db.unwrap_or_else(|| config.database.resolved_path());
    let reader = history::ChatHistoryReader::open(Some(db.as_path()))?;

    match query {
        HistoryQuery::Recent { limit } => {
            for msg in reader.get_recent_messages(limit) {
                println!("[{}] {}: {}", msg.created_at, msg.sender_name, msg.message);
                println!("reply: {}\n", msg.reply);
            }
        }
        HistoryQuery::User { sender_id } => {
            for msg in reader.get_user_history(&sender_id) {
                println!("[{}] {}", msg.created_at, msg.message);
                println!("reply: {}\n", msg.reply);
            }
        }
        HistoryQuery::Stats { days } => {
            for stat in reader.get_daily_stats(days) {
                println!("{}: {} messages", stat.date, stat.message_count);
            }
        }
        HistoryQuery::Active { limit } => {
            for user in reader.get_active_users(limit) {
                println!(
                    "{} ({}): {} messages",
                    user.sender_name, user.sender_id, user.message_count
                );
            }
        }
        HistoryQuery::Search { keyword } => {
            for msg in reader.search_messages(&keyword) {
                println!("[{}] {}: {}", msg.created_at, msg.sender_name, msg.message);
                println!("reply: {}\n", msg.reply);
            }
        }
    }
    Ok(())
}

async fn run_voice(
    action: VoiceAction,
    config: &config::Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let handler = voice::VoiceHandler::new(&config.tts)?;

    match action {
        VoiceAction::Check { text } => {
            println!("{}", handler.is_voice_request(&text));
        }
        VoiceAction::Speak { lang, text } => {
            let path = handler.synthesize(&text, &lang).await?;
            println!("{}", path.display());
        }
        VoiceAction::Cleanup => {
            let removed = handler.cleanup_voice_dir();
            println!("removed {removed} files from {}", handler.voice_dir().display());
        }
    }
    Ok(())
}

async fn run_checkin(config: &config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let quiet = config.quiet_hours()?;
    let mut bot = bot::Bot::new(config)?;
    let mut manager = checkin::CheckInManager::new(&config.checkin, &config.bot, quiet);

    let (tx, mut rx) = mpsc::channel(16);
    manager.start(tx);
    info!("Check-in timer running for {:?}, Ctrl-C to stop", config.bot.listen_list);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                match bot.check_in(&event).await {
                    Ok(text) => println!("[{}] {text}", event.contact),
                    Err(e) => warn!("Check-in for {} failed: {e}", event.contact),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let fired = manager.cancel();
    info!("Check-in timer stopped after {fired} check-ins");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging (suppress noisy HTTP client internals)
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper=info,reqwest=info")
    } else {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = config::Config::load(args.config.as_deref());

    match args.command {
        Command::History { db, query } => run_history(db, query, &config)?,
        Command::Voice { action } => run_voice(action, &config).await?,
        Command::Chat {
            sender_id,
            sender_name,
            lang,
            text,
        } => {
            let mut bot = bot::Bot::new(&config)?;
            if !bot.listens_to(&sender_name) {
                warn!("{sender_name} is not on the listen list");
            }
            let reply = bot.handle_message(&sender_id, &sender_name, &text, &lang).await?;
            println!("{}", reply.text);
            if let Some(path) = reply.voice {
                println!("voice: {}", path.display());
            }
        }
        Command::Checkin => run_checkin(&config).await?,
    }

    Ok(())
}
