//! Tessera room watcher.
//!
//! Joins a room, logs connection status, sync state, tree changes and
//! presence, and leaves cleanly on Ctrl-C.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tessera_collab::{AwarenessEvent, Provider, ProviderConfig, SessionConfig};
use tessera_core::DocumentStore;

/// Watch a Tessera collaboration room.
#[derive(Parser, Debug)]
#[command(name = "tessera-watch")]
#[command(about = "Join a Tessera room and log what happens in it")]
struct Args {
    /// Relay base URL
    #[arg(long, env = "TESSERA_URL", default_value = "ws://127.0.0.1:8000")]
    url: String,

    /// Room to join
    #[arg(short, long, env = "TESSERA_ROOM")]
    room: String,

    /// Optional project id sent alongside the token
    #[arg(short, long, env = "TESSERA_PROJECT")]
    project: Option<String>,

    /// Auth token
    #[arg(short, long, env = "TESSERA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User id for presence (random when omitted)
    #[arg(short, long, env = "TESSERA_USER")]
    user: Option<String>,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long, default_value_t = 3000, value_name = "MS")]
    reconnect_delay_ms: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let mut session = SessionConfig::new(&args.url, &args.room)
        .with_reconnect_delay(Duration::from_millis(args.reconnect_delay_ms));
    if let Some(project) = &args.project {
        session = session.with_project_id(project);
    }
    let user_id = args
        .user
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    log::info!("Watching room {} as {user_id}", args.room);

    let token = args.token.clone();
    if token.is_none() {
        log::warn!("No token given; the relay will refuse the connection");
    }
    let tokens = Arc::new(move || {
        let token = token.clone();
        async move { token }
    });

    let store = Arc::new(DocumentStore::new());
    let provider = Provider::with_websocket(ProviderConfig::new(session, user_id), Arc::clone(&store), tokens);

    let _status = provider.subscribe_status(|status| log::info!("Status: {status}"));
    let _synced = provider.subscribe_synced(|synced| log::info!("Synced: {synced}"));
    let _presence = provider.awareness().subscribe(|event| match event {
        AwarenessEvent::CursorsChanged(users) => log::debug!("Cursors moved: {users:?}"),
        AwarenessEvent::SelectionsChanged(users) => log::info!("Selections changed: {users:?}"),
        AwarenessEvent::UsersChanged(users) => log::info!("Users joined or updated: {users:?}"),
        AwarenessEvent::UserLeft(user) => log::info!("User left: {user}"),
    });

    // Remote trees land in the store silently, so watch the replica instead
    let _tree = provider.replica().observe(|change| match change.elements() {
        Ok(tree) => log::info!(
            "Tree replaced by {}: {} nodes",
            change.origin,
            tessera_core::element::count(&tree)
        ),
        Err(e) => log::warn!("Unreadable tree from {}: {e}", change.origin),
    });

    provider.connect();
    tokio::signal::ctrl_c().await?;

    log::info!("Leaving room {}", args.room);
    provider.destroy();
    provider.session().closed().await;
    Ok(())
}
