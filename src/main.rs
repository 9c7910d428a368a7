use std::sync::{Arc, Mutex};

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use inbox_sync::alerts::{AudioCue, BellCue, DesktopPopup, Permission, TracingPopup};
use inbox_sync::config::Config;
use inbox_sync::credentials::{CredentialStore, StaticCredentials};
use inbox_sync::directory::HttpDirectory;
use inbox_sync::session::{InboxSession, SessionParts};
use inbox_sync::sync::{InboxEngine, InboxState};
use inbox_sync::transport::{ReconnectPolicy, WebSocketChannel};
use inbox_sync::view::{HealthBadge, InboxView};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    let _log_guard = init_tracing(&config)?;

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(StaticCredentials::new(config.token.clone()));
    let directory = HttpDirectory::new(&config.api_url, credentials.clone(), config.request_timeout)?;
    let channel = WebSocketChannel::new(
        &config.events_url,
        credentials,
        ReconnectPolicy::default(),
        config.request_timeout,
    )?;

    let alerts = config.alerts_enabled.then(|| {
        let popup: Arc<dyn DesktopPopup> = Arc::new(TracingPopup::new(Permission::Granted));
        let cue: Arc<dyn AudioCue> = Arc::new(BellCue);
        (popup, cue)
    });

    let session = InboxSession::start(SessionParts {
        directory: Arc::new(directory),
        channel: Arc::new(channel),
        page_size: config.page_size,
        poll_interval: config.poll_interval,
        alerts,
        observer: Some(Arc::new(log_badge_changes())),
    })
    .await;

    print_feed(&session.engine().snapshot());
    println!("Commands: ls | refresh | read <id> | read-all | rm <id> | clear | quit");

    tokio::select! {
        _ = signal::ctrl_c() => println!("Received Ctrl+C, shutting down..."),
        _ = run_commands(session.engine().clone()) => println!("Input closed, shutting down..."),
    }

    session.shutdown().await;
    println!("Shutdown complete.");
    Ok(())
}

/// Install the fmt subscriber, writing to a daily log file when a log
/// directory is configured.
fn init_tracing(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let Some(dir) = &config.log_dir else {
        tracing_subscriber::fmt()
            .with_max_level(config.log_level)
            .with_target(true)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(dir, "inbox.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking)
        .init();
    Ok(Some(guard))
}

fn log_badge_changes() -> impl Fn(&InboxState) + Send + Sync + 'static {
    let last = Mutex::new(None::<(Option<String>, HealthBadge)>);
    move |state| {
        let view = InboxView::from(state);
        let current = (view.badge, view.health);
        let mut last = last.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() != Some(&current) {
            info!(
                badge = current.0.as_deref().unwrap_or("-"),
                health = ?current.1,
                loading = view.is_loading,
                "inbox updated"
            );
            *last = Some(current);
        }
    }
}

fn print_feed(state: &InboxState) {
    let view = InboxView::from(state);
    println!(
        "🔔 {}  ({:?})",
        view.badge.as_deref().unwrap_or("0"),
        view.health
    );
    for n in &view.feed {
        let marker = if n.is_read { " " } else { "•" };
        println!(
            "{marker} {:<24} {:<28} {} ({})",
            n.id,
            n.kind.as_str(),
            n.title,
            n.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

async fn run_commands(engine: InboxEngine) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read command");
                return;
            }
        };

        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("ls"), _) => print_feed(&engine.snapshot()),
            (Some("refresh"), _) => {
                engine.fetch_all().await;
                print_feed(&engine.snapshot());
            }
            (Some("read"), Some(id)) => engine.mark_read(id).await,
            (Some("read-all"), _) => engine.mark_all_read().await,
            (Some("rm"), Some(id)) => engine.delete_one(id).await,
            (Some("clear"), _) => engine.delete_all().await,
            (Some("quit"), _) => return,
            (None, _) => {}
            _ => println!("Unknown command: {line}"),
        }
    }
}
