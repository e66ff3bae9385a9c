//! `LedgerChat` — offline demo of the chat client core.
//!
//! Signs up a local user and a peer against an in-memory backend, opens the
//! thread between them, and sends every stdin line from the local user.
//! After each line the peer's view of the conversation is printed, with
//! envelopes opened and delivery status shown.
//!
//! ```bash
//! # Plain text
//! cargo run --bin ledgerchat -- --username alice --peer bob
//!
//! # Encrypted with the recipient-derived key
//! cargo run --bin ledgerchat -- --encrypt
//!
//! # Or via environment variables
//! LEDGERCHAT_USERNAME=alice LEDGERCHAT_PEER=bob cargo run
//! ```

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use ledgerchat::chat::{ConversationView, DisplayMessage};
use ledgerchat::config::{CliArgs, ClientConfig};
use ledgerchat::directory::{Account, Directory};
use ledgerchat::realtime::hub::RealtimeHub;
use ledgerchat::realtime::{RealtimeChannel, Topic};
use ledgerchat::session::Session;
use ledgerchat::store::InMemoryBackend;
use ledgerchat::wallet::dev::DevWallet;

const DEFAULT_USERNAME: &str = "alice";
const DEFAULT_PEER: &str = "bob";

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    // Load and resolve configuration (CLI args > env > config file > defaults).
    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file so they don't interleave with the transcript.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("ledgerchat starting");
    let result = run_demo(&config).await;
    tracing::info!("ledgerchat exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("ledgerchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run_demo(config: &ClientConfig) -> io::Result<()> {
    let hub = RealtimeHub::new();
    let store = InMemoryBackend::with_hub(hub.clone());
    let directory = Directory::new(store.clone(), DevWallet::new());

    let username = config.username.as_deref().unwrap_or(DEFAULT_USERNAME);
    let peer_name = config.peer.as_deref().unwrap_or(DEFAULT_PEER);

    let local = directory
        .sign_up(username, None)
        .await
        .map_err(io::Error::other)?;
    let peer = directory
        .sign_up(peer_name, None)
        .await
        .map_err(io::Error::other)?;
    println!(
        "{username} is {}, {peer_name} is {}",
        local.keys.public_address, peer.keys.public_address
    );

    let local_session = activate(config, local.account)?;
    let peer_session = activate(config, peer.account)?;
    local_session.set_encrypt_by_default(config.encrypt_by_default);

    if let Some(file) = config.session_file() {
        match file.save(&local_session.snapshot()) {
            Ok(()) => tracing::info!(path = %file.path().display(), "session saved"),
            Err(e) => tracing::warn!(error = %e, "could not save session"),
        }
    }

    let thread = directory
        .start_chat(&local_session, peer.keys.public_address.as_str())
        .await
        .map_err(io::Error::other)?;

    let (local_view, _local_events) = ConversationView::new(
        store.clone(),
        Arc::clone(&local_session),
        thread.clone(),
        config.chat.clone(),
    );
    let (peer_view, _peer_events) =
        ConversationView::new(store, Arc::clone(&peer_session), thread, config.chat.clone());
    let local_view = Arc::new(local_view);
    let peer_view = Arc::new(peer_view);

    local_view.load_history().await.map_err(io::Error::other)?;
    peer_view.load_history().await.map_err(io::Error::other)?;

    let topic = Topic::Thread(local_view.thread().id);
    let pumps = [
        tokio::spawn({
            let view = Arc::clone(&local_view);
            let sub = hub.subscribe(topic);
            async move { view.pump(sub).await }
        }),
        tokio::spawn({
            let view = Arc::clone(&peer_view);
            let sub = hub.subscribe(topic);
            async move { view.pump(sub).await }
        }),
    ];

    println!(
        "Type messages for {peer_name} ({}), one per line. Ctrl-D to quit.",
        if local_session.encrypt_by_default() {
            "encrypted"
        } else {
            "plain"
        }
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let encrypt = local_session.encrypt_by_default();
        match local_view.submit(&line, encrypt).await {
            Ok(None) => continue,
            Ok(Some(_)) => {}
            Err(e) => {
                println!("! send failed: {e}");
                continue;
            }
        }

        // Let the peer's pump drain the push before printing.
        tokio::time::sleep(Duration::from_millis(20)).await;
        println!("--- {peer_name}'s view ---");
        for message in peer_view.messages() {
            println!("{}", render(&message, &config.timestamp_format, username, peer_name));
        }
    }

    let previews = directory
        .thread_previews(&local_session)
        .await
        .map_err(io::Error::other)?;
    for preview in previews {
        println!(
            "{} - {} ({} unread)",
            preview.participant_username, preview.last_message, preview.unread
        );
    }

    local_view.dispose();
    peer_view.dispose();
    for pump in pumps {
        if let Err(e) = pump.await {
            tracing::warn!(error = %e, "realtime pump task failed");
        }
    }
    Ok(())
}

fn activate(config: &ClientConfig, account: Account) -> io::Result<Arc<Session>> {
    let session = Session::new(config.identity_mode, config.auth_mode);
    session
        .activate(account.profile, account.wallets)
        .map_err(io::Error::other)?;
    Ok(Arc::new(session))
}

fn render(message: &DisplayMessage, time_format: &str, local: &str, peer: &str) -> String {
    let author = if message.is_own { peer } else { local };
    let lock = if message.is_encrypted { " [enc]" } else { "" };
    format!(
        "[{}] {author}: {}{lock} ({})",
        message.time_label(time_format),
        message.text,
        message.status
    )
}
