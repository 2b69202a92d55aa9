use anyhow::Result;
use chat_widget::{ThreadIdConvention, WidgetConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod slash;
mod terminal;

#[derive(Parser)]
#[command(name = "chat-widget")]
#[command(version)]
#[command(about = "Talk to a chat endpoint the way the embedded widget does", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.chat-widget/config.toml)
    #[arg(long, global = true, env = "CHAT_WIDGET_CONFIG")]
    config: Option<PathBuf>,

    /// Endpoint url, overrides the config file
    #[arg(long, global = true, env = "CHAT_WIDGET_URL")]
    url: Option<String>,

    /// Read replies as a byte stream
    #[arg(long, global = true)]
    stream: bool,

    /// Where streamed replies carry the thread id
    #[arg(long, global = true)]
    thread_convention: Option<ThreadIdConvention>,

    /// Start from an existing thread
    #[arg(long, global = true)]
    thread_id: Option<String>,

    /// Log failures without showing an error message
    #[arg(long, global = true)]
    no_error_alert: bool,

    /// Save spoken replies as mp3 files in this directory
    #[arg(long, global = true)]
    audio_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (the default)
    Chat,
    /// Send one message and print the reply
    Send {
        message: String,
        /// Also print the reply rendered as HTML
        #[arg(long)]
        html: bool,
    },
    /// Write a starter config file
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Show which speech features are available
    Capabilities,
}

impl Cli {
    fn widget_config(&self) -> Result<WidgetConfig> {
        let mut config = WidgetConfig::load(self.config.as_deref())?;
        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if self.stream {
            config.response_is_a_stream = true;
        }
        if let Some(convention) = self.thread_convention {
            config.thread_id_convention = convention;
        }
        if let Some(thread_id) = &self.thread_id {
            config.thread_id = Some(thread_id.clone());
        }
        if self.no_error_alert {
            config.disable_error_alert = true;
        }
        Ok(config)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chat_widget=warn"));

    // Ignore a second init; a subscriber is already installed.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match &cli.command {
        None | Some(Commands::Chat) => {
            commands::run_chat(cli.widget_config()?, cli.audio_dir.clone()).await
        }
        Some(Commands::Send { message, html }) => {
            commands::send_once(cli.widget_config()?, message, *html).await
        }
        Some(Commands::Init { force }) => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => WidgetConfig::default_path()?,
            };
            commands::init_config(&path, cli.url.clone(), *force)
        }
        Some(Commands::Capabilities) => {
            commands::show_capabilities(cli.widget_config()?, cli.audio_dir.clone())
        }
    }
}
