use clap::Parser;
use client::pool::ConnectionPool;
use client::render::Renderer;
use client::session::ReplicationSession;
use client::store::EntityStore;
use client::transport::TcpTransport;
use log::{debug, info, warn};
use shared::{EntityId, ServerEndpoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Zone server address (from the out-of-band play lookup)
    #[arg(short = 's', long, default_value = "127.0.0.1")]
    address: String,

    /// Advertised zone server port (the game socket adds the fixed offset)
    #[arg(short = 'p', long, default_value = "1")]
    port: u16,

    /// Auth token from the play lookup, required for the first connect
    #[arg(short = 't', long)]
    token: Option<String>,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let endpoint = ServerEndpoint::new(args.address.clone(), args.port);

    info!("Starting zone client...");
    info!("Connecting to: {}", endpoint.canonical_url());
    info!("Controls: arrows to move/turn, W/S to select action, click to act");

    // Identity survives reconnects so the cluster keeps treating us as the
    // same player
    let mut local_id: Option<EntityId> = None;

    loop {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        // Stand-in for the presentation bridge: a real UI collaborator
        // consumes these to create/update/destroy its objects
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                debug!("world event: {:?}", event);
            }
        });

        let transport = Arc::new(TcpTransport);
        let store = EntityStore::new(events_tx.clone());
        let pool = ConnectionPool::new(transport);
        let mut session = ReplicationSession::new(pool, store, events_tx, args.token.clone())
            .with_renderer(Renderer::new(args.width, args.height));
        if let Some(id) = local_id.take() {
            session.set_local_id(id);
        }

        match session.connect(&endpoint) {
            Ok(()) => {
                let reason = session.run().await;
                warn!("Session ended: {:?}", reason);
            }
            Err(e) => warn!("Failed to bind to {}: {}", endpoint.canonical_url(), e),
        }
        local_id = session.local_id().cloned();

        info!("Trying to reconnect in 5s...");
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
