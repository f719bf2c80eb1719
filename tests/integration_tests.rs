//! Integration tests for the replication/handoff client.
//!
//! These tests drive a real session over real TCP sockets against scripted
//! stub zone servers, validating the end-to-end protocol: bootstrap
//! announcement, replication, on-deck reconciliation and server handoff.

use assert_approx_eq::assert_approx_eq;
use client::pool::ConnectionPool;
use client::session::{ExitReason, ReplicationSession};
use client::store::{EntityStore, WorldEvent};
use client::transport::{read_frame, TcpTransport};
use shared::{
    encode_frame, ClientEvent, EntityUpdate, PlayerUpdate, ServerEndpoint, ServerEvent,
    GAME_PORT_OFFSET,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// One accepted client connection on a stub server.
struct StubConnection {
    /// Intents the client sent, in arrival order. Closed on disconnect.
    from_client: mpsc::UnboundedReceiver<ClientEvent>,
    /// Events to push to the client.
    to_client: mpsc::UnboundedSender<ServerEvent>,
}

impl StubConnection {
    async fn recv(&mut self) -> ClientEvent {
        timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("client connection closed")
    }

    async fn closed(&mut self) {
        loop {
            match timeout(WAIT, self.from_client.recv())
                .await
                .expect("timed out waiting for connection close")
            {
                Some(_) => continue,
                None => return,
            }
        }
    }

    fn push(&self, event: ServerEvent) {
        self.to_client.send(event).expect("stub connection closed");
    }
}

/// A scripted zone server listening on a real socket.
struct StubZoneServer {
    endpoint: ServerEndpoint,
    connections: mpsc::UnboundedReceiver<StubConnection>,
}

impl StubZoneServer {
    async fn spawn() -> Self {
        // The client derives the game port by adding the fixed offset to
        // the advertised port, so the listener must sit above the offset.
        // Ephemeral ports on any modern system do.
        let listener = loop {
            let candidate = TcpListener::bind("127.0.0.1:0").await.unwrap();
            if candidate.local_addr().unwrap().port() > GAME_PORT_OFFSET {
                break candidate;
            }
        };
        let advertised = listener.local_addr().unwrap().port() - GAME_PORT_OFFSET;
        let endpoint = ServerEndpoint::new("127.0.0.1", advertised);

        let (conn_tx, connections) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (mut reader, mut writer) = stream.into_split();
                let (in_tx, in_rx) = mpsc::unbounded_channel();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerEvent>();

                tokio::spawn(async move {
                    while let Ok(Some(event)) = read_frame::<ClientEvent, _>(&mut reader).await {
                        if in_tx.send(event).is_err() {
                            break;
                        }
                    }
                });
                tokio::spawn(async move {
                    while let Some(event) = out_rx.recv().await {
                        let frame = encode_frame(&event).unwrap();
                        if writer.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    let _ = writer.shutdown().await;
                });

                if conn_tx
                    .send(StubConnection {
                        from_client: in_rx,
                        to_client: out_tx,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        Self {
            endpoint,
            connections,
        }
    }

    async fn accept(&mut self) -> StubConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for client connection")
            .expect("stub server stopped")
    }

    fn no_new_connection(&mut self) -> bool {
        self.connections.try_recv().is_err()
    }
}

struct TestClient {
    session: ReplicationSession,
    world_rx: mpsc::UnboundedReceiver<WorldEvent>,
}

impl TestClient {
    fn new(token: Option<&str>) -> Self {
        let (events_tx, world_rx) = mpsc::unbounded_channel();
        let store = EntityStore::new(events_tx.clone());
        let pool = ConnectionPool::new(Arc::new(TcpTransport));
        let session =
            ReplicationSession::new(pool, store, events_tx, token.map(|s| s.to_string()));
        Self { session, world_rx }
    }

    /// Steps the session through exactly one channel event.
    async fn step(&mut self) -> Option<ExitReason> {
        timeout(WAIT, self.session.process_next_event())
            .await
            .expect("timed out waiting for channel event")
    }

    fn drain_world(&mut self) -> Vec<WorldEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.world_rx.try_recv() {
            events.push(event);
        }
        events
    }
}

mod handoff_tests {
    use super::*;

    /// The full end-to-end scenario: bootstrap, replication, then a handoff
    /// to a server with no on-deck entry.
    #[tokio::test]
    async fn end_to_end_fresh_handoff() {
        let mut server_a = StubZoneServer::spawn().await;
        let mut server_b = StubZoneServer::spawn().await;

        let mut client = TestClient::new(Some("login-token"));
        client.session.connect(&server_a.endpoint).unwrap();
        let mut conn_a = server_a.accept().await;

        // Connected → first announcement requests a new player with the token
        assert!(client.step().await.is_none());
        match conn_a.recv().await {
            ClientEvent::NewPlayer { id, auth_token } => {
                assert!(id.is_none());
                assert_eq!(auth_token.as_deref(), Some("login-token"));
            }
            other => panic!("unexpected first event: {:?}", other),
        }

        // Server seeds the local player
        conn_a.push(ServerEvent::PlayerUpdated(PlayerUpdate {
            x: Some(100.0),
            y: Some(100.0),
            ..PlayerUpdate::new("p1")
        }));
        client.step().await;
        assert_eq!(client.session.store().len(), 1);
        assert_eq!(client.session.local_id().map(String::as_str), Some("p1"));
        assert!(client
            .drain_world()
            .iter()
            .any(|e| matches!(e, WorldEvent::LocalPlayerReady(_))));

        // A remote entity appears
        conn_a.push(ServerEvent::EntityUpdated(EntityUpdate {
            x: Some(50.0),
            y: Some(50.0),
            ..EntityUpdate::new("e9")
        }));
        client.step().await;
        assert_eq!(client.session.store().len(), 2);

        // Handoff with no on-deck entry: a fresh connection is opened
        conn_a.push(ServerEvent::ServerHandoff {
            address: server_b.endpoint.address.clone(),
            port: server_b.endpoint.port,
        });
        client.step().await;
        let mut conn_b = server_b.accept().await;

        // The first outbound event on the new channel re-announces the id
        assert!(client.step().await.is_none());
        match conn_b.recv().await {
            ClientEvent::NewPlayer { id, auth_token } => {
                assert_eq!(id.as_deref(), Some("p1"));
                assert!(auth_token.is_none());
            }
            other => panic!("unexpected first event on new channel: {:?}", other),
        }

        // The old connection was torn down; replicated state survived
        conn_a.closed().await;
        assert_eq!(client.session.store().len(), 2);
        assert_eq!(
            client.session.pool().active_url(),
            Some(server_b.endpoint.canonical_url().as_str())
        );
    }

    /// On-deck reconciliation and promotion: {A, B} then {B, C} closes A,
    /// keeps B's channel identity, opens C; handing off to B reuses the
    /// pre-warmed connection instead of reconnecting.
    #[tokio::test]
    async fn on_deck_reconciliation_and_promotion() {
        let mut active = StubZoneServer::spawn().await;
        let mut server_a = StubZoneServer::spawn().await;
        let mut server_b = StubZoneServer::spawn().await;
        let mut server_c = StubZoneServer::spawn().await;

        let mut client = TestClient::new(Some("tok"));
        client.session.connect(&active.endpoint).unwrap();
        let mut conn = active.accept().await;
        client.step().await;
        conn.recv().await; // announcement

        conn.push(ServerEvent::PlayerUpdated(PlayerUpdate {
            x: Some(0.0),
            y: Some(0.0),
            ..PlayerUpdate::new("p1")
        }));
        client.step().await;

        conn.push(ServerEvent::OnDeckUpdated {
            servers: vec![server_a.endpoint.clone(), server_b.endpoint.clone()],
        });
        client.step().await;
        let mut deck_a = server_a.accept().await;
        let mut deck_b = server_b.accept().await;

        conn.push(ServerEvent::OnDeckUpdated {
            servers: vec![server_b.endpoint.clone(), server_c.endpoint.clone()],
        });
        client.step().await;
        let _deck_c = server_c.accept().await;

        // A was pruned and closed; B kept its connection, no reconnect
        deck_a.closed().await;
        assert!(server_b.no_new_connection());

        conn.push(ServerEvent::ServerHandoff {
            address: server_b.endpoint.address.clone(),
            port: server_b.endpoint.port,
        });
        client.step().await;

        // Promotion reuses the pre-warmed channel: still no new connection
        assert!(server_b.no_new_connection());

        // The queued Connected event drives the re-announcement
        assert!(client.step().await.is_none());
        match deck_b.recv().await {
            ClientEvent::NewPlayer { id, .. } => assert_eq!(id.as_deref(), Some("p1")),
            other => panic!("unexpected first event on promoted channel: {:?}", other),
        }
    }

    /// Movement intents flow on the active channel and respect the idle
    /// gate.
    #[tokio::test]
    async fn movement_intents_respect_idle_gate() {
        let mut server = StubZoneServer::spawn().await;
        let mut client = TestClient::new(Some("tok"));
        client.session.connect(&server.endpoint).unwrap();
        let mut conn = server.accept().await;
        client.step().await;
        conn.recv().await; // announcement

        conn.push(ServerEvent::PlayerUpdated(PlayerUpdate {
            x: Some(100.0),
            y: Some(100.0),
            ..PlayerUpdate::new("p1")
        }));
        client.step().await;

        // Idle tick: nothing emitted
        client.session.tick_movement(16.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.from_client.try_recv().is_err());

        // A key press produces exactly one move intent per changed tick
        client.session.input_mut().set_key_state(client::input::KeyState {
            up: true,
            ..Default::default()
        });
        client.session.tick_movement(16.0);
        match conn.recv().await {
            ClientEvent::MovePlayer { x, y, heading } => {
                // Default move speed over one 16ms tick, straight along -x
                assert_approx_eq!(x, 100.0 - 32.0, 1e-3);
                assert_eq!(y, 100.0);
                assert_eq!(heading, Some(0.0));
            }
            other => panic!("unexpected intent: {:?}", other),
        }
    }

    /// A server-side disconnect invalidates the world view: the store is
    /// cleared and the collaborator is told, but the identity survives for
    /// the reconnect.
    #[tokio::test]
    async fn disconnect_clears_world_view() {
        let mut server = StubZoneServer::spawn().await;
        let mut client = TestClient::new(Some("tok"));
        client.session.connect(&server.endpoint).unwrap();
        let conn = server.accept().await;
        client.step().await;

        conn.push(ServerEvent::PlayerUpdated(PlayerUpdate {
            x: Some(1.0),
            y: Some(1.0),
            ..PlayerUpdate::new("p1")
        }));
        conn.push(ServerEvent::EntityUpdated(EntityUpdate {
            x: Some(2.0),
            y: Some(2.0),
            ..EntityUpdate::new("e1")
        }));
        client.step().await;
        client.step().await;
        assert_eq!(client.session.store().len(), 2);

        drop(conn);
        let reason = client.step().await;

        assert_eq!(reason, Some(ExitReason::Disconnected));
        assert!(client.session.store().is_empty());
        assert_eq!(client.session.local_id().map(String::as_str), Some("p1"));
        assert!(client
            .drain_world()
            .iter()
            .any(|e| matches!(e, WorldEvent::Disconnected)));
    }
}

mod protocol_tests {
    use super::*;

    /// Frame codec round-trip over a real socket.
    #[tokio::test]
    async fn frames_survive_the_wire() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let events = vec![
            ServerEvent::PlayerUpdated(PlayerUpdate {
                x: Some(100.0),
                move_amount: Some(2.5),
                ..PlayerUpdate::new("p1")
            }),
            ServerEvent::EntityRemoved {
                id: "e1".to_string(),
            },
            ServerEvent::OnDeckUpdated {
                servers: vec![ServerEndpoint::new("10.0.0.2", 1)],
            },
        ];

        let pushed = events.clone();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for event in &pushed {
                let frame = encode_frame(event).unwrap();
                stream.write_all(&frame).await.unwrap();
            }
            stream.shutdown().await.unwrap();
        });

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let mut received = Vec::new();
        while let Some(event) = read_frame::<ServerEvent, _>(&mut stream).await.unwrap() {
            received.push(event);
        }
        assert_eq!(received, events);
    }
}
