use std::fmt;
use std::time::Instant;

use clap::Parser;
use pubnub_chat::{ChatConfig, ChatError, Console};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct Elapsed(Instant);

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let d = self.0.elapsed();
        let total_secs = d.as_secs();
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        let millis = d.subsec_millis();
        write!(w, "[{mins:02}:{secs:02}:{millis:03}]")
    }
}

#[derive(Parser)]
#[command(name = "pubnub-chat", version, about = "Terminal chat over PubNub")]
struct Cli {
    /// PubNub publish key (overrides the built-in key)
    #[arg(long)]
    publish_key: Option<String>,
    /// PubNub subscribe key (overrides the built-in key)
    #[arg(long)]
    subscribe_key: Option<String>,
    /// Chat channel name
    #[arg(long)]
    channel: Option<String>,
    /// PubNub origin host or base URL
    #[arg(long)]
    origin: Option<String>,
}

impl Cli {
    fn into_config(self) -> ChatConfig {
        let mut config = ChatConfig::default();
        if let Some(key) = self.publish_key {
            config.publish_key = key;
        }
        if let Some(key) = self.subscribe_key {
            config.subscribe_key = key;
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        config.origin = self.origin;
        config
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr and default to warnings so they stay out of the chat.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(Elapsed(Instant::now()))
        .with_writer(std::io::stderr)
        .init();

    let config = Cli::parse().into_config();
    let console = Console::stdout();

    console.line("🚀 PubNub Rust Chat Application");
    console.line("=============================");

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let code = match pubnub_chat::run(config, console.clone(), input).await {
        Ok(()) => 0,
        Err(ChatError::Config(msg)) => {
            console.line(
                "PLEASE DEFINE PUBNUB KEYS (edit config.rs or pass --publish-key/--subscribe-key)",
            );
            eprintln!("error: {msg}");
            1
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    // A stdin read left pending by Ctrl-C would block runtime shutdown.
    std::process::exit(code);
}
