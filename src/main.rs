mod api;
mod backend;
mod botui;
mod config;
mod controller;
mod fragments;
mod integration;
mod mindmap;
mod observer;
mod page;
mod sdk;
mod server;
mod session;

use crate::backend::{BackendError, backend_from_config};
use crate::botui::ConsoleBotUi;
use crate::config::WidgetConfig;
use crate::controller::{ChatController, ChatSettings, reveal_chatbot};
use crate::integration::{
    ChannelChatbotStarter, Integrations, StaticInitHook, TracingObserverProxy,
};
use crate::mindmap::{LoggingDiagramRenderer, MindmapPanel};
use crate::observer::{LeoObserver, bootstrap, tag_outbound_links};
use crate::page::Page;
use crate::server::AppState;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "resynap-gui", version, about = "Chatbot widget runtime and page host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the chatbot page and widget globals over HTTP.
    Serve,
    /// Run a chat session in the terminal.
    Chat {
        /// Visitor id to resolve; a random one is used when omitted.
        #[arg(long)]
        visitor_id: Option<String>,
        /// Host page to load; defaults to the configured page template.
        #[arg(long)]
        page: Option<PathBuf>,
    },
    /// Append the visitor-sync parameter to outbound links of an HTML file.
    RewriteLinks {
        input: PathBuf,
        #[arg(long)]
        visitor_id: String,
        /// URL the page is served from; decides which links are outbound.
        #[arg(long)]
        location: Url,
    },
    /// Render `#mindmap-code` into `#mermaid-container` and apply zoom.
    Mindmap {
        input: PathBuf,
        #[arg(long, default_value = "http://localhost/")]
        location: Url,
        #[arg(long, default_value_t = 0)]
        zoom_in: u32,
        #[arg(long, default_value_t = 0)]
        zoom_out: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve => serve().await,
        Command::Chat { visitor_id, page } => chat(visitor_id, page).await,
        Command::RewriteLinks {
            input,
            visitor_id,
            location,
        } => {
            let page = load_page(&input, location).await?;
            let rewritten = tag_outbound_links(&page, &visitor_id);
            tracing::info!(rewritten, "outbound links tagged");
            println!("{}", page.to_html());
            Ok(())
        }
        Command::Mindmap {
            input,
            location,
            zoom_in,
            zoom_out,
        } => {
            let page = load_page(&input, location).await?;
            let mut panel = MindmapPanel::default();
            panel
                .mount(&page, &LoggingDiagramRenderer, Duration::ZERO)
                .await?;
            for _ in 0..zoom_in {
                panel.zoom_in(&page);
            }
            for _ in 0..zoom_out {
                panel.zoom_out(&page);
            }
            println!("{}", page.to_html());
            Ok(())
        }
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = WidgetConfig::from_env()?;
    let addr = config.bind_addr;
    tracing::info!(%addr, "starting resynap-gui page host");
    server::run(addr, AppState::new(config)).await
}

async fn chat(visitor_id: Option<String>, page_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = WidgetConfig::from_env()?;
    let location = Url::parse(&format!("http://{}/", config.chatbot_hostname))
        .context("CHATBOT_HOSTNAME is not a valid host")?;
    let page_path = page_path.unwrap_or_else(|| config.page_template.clone());
    let page = load_page(&page_path, location).await?;
    let mut visitor_id = visitor_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut observer = None;
    if let (true, Some(cdn_domain)) = (config.tracking_ready(), config.cdn_domain.as_deref()) {
        let hook = StaticInitHook(true);
        if bootstrap(&page, cdn_domain, Some(&hook))?.is_some() {
            let leo = LeoObserver::new(Arc::new(TracingObserverProxy::new(visitor_id.clone())));
            let (starter, mut started) = ChannelChatbotStarter::new();
            let integrations = Integrations::new(None, Some(Arc::new(starter)));
            leo.on_proxy_ready(&page, &integrations).await?;
            if let Some(synced) = started.recv().await {
                visitor_id = synced;
            }
            observer = Some(leo);
        }
    }

    reveal_chatbot(&page);
    let ui = Arc::new(ConsoleBotUi::new(config.chatbot_name.clone()));
    let mut controller =
        ChatController::new(ui, backend_from_config(&config), ChatSettings::from_config(&config))
            .with_error_hook(Arc::new(|err: &BackendError| {
                eprintln!("chat backend unavailable: {err}");
            }));
    if let Some(observer) = observer {
        controller = controller.with_observer(observer);
    }
    controller.start_chatbot(&visitor_id).await?;
    controller.run().await?;
    Ok(())
}

async fn load_page(path: &Path, location: Url) -> anyhow::Result<Page> {
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Page::parse(&html, location))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
