//! WebSocket Game Server
//!
//! Async WebSocket front end for the arbiter.
//! Handles authentication, matchmaking requests, and routes match intents.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock, broadcast};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn, error, debug, instrument};

use crate::game::state::Player;
use crate::network::arbiter::{Arbiter, ArbiterConfig, ArbiterError, MatchRequest};
use crate::network::auth::{self, AuthConfig, AuthError};
use crate::network::protocol::{
    AnswerSubmission, AuthRequest, AuthResult, ClientMessage, ErrorCode, FindMatchRequest,
    MatchmakingResponse, MatchmakingStatus, ServerError, ServerMessage,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Connections silent for longer than this are dropped.
    pub idle_timeout: Duration,
    /// Question content; the bundled set when absent.
    pub questions_path: Option<PathBuf>,
    /// JSON-lines results file; results are only logged when absent.
    pub results_path: Option<PathBuf>,
    /// Match hosting timings.
    pub arbiter: ArbiterConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            questions_path: None,
            results_path: None,
            arbiter: ArbiterConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `TRIVIA_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, "TRIVIA_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(max) = parse_var(&lookup, "TRIVIA_MAX_CONNECTIONS") {
            config.max_connections = max;
        }
        if let Some(secs) = parse_var(&lookup, "TRIVIA_QUEUE_TIMEOUT_SECS") {
            config.arbiter.queue_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "TRIVIA_INTERMISSION_SECS") {
            config.arbiter.intermission = Duration::from_secs(secs);
        }
        config.questions_path = lookup("TRIVIA_QUESTIONS_PATH").map(PathBuf::from);
        config.results_path = lookup("TRIVIA_RESULTS_PATH").map(PathBuf::from);

        config
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Participant (after auth).
    player: Option<Player>,
    /// Outbound channel of this connection.
    sender: mpsc::Sender<ServerMessage>,
    /// Connection time.
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// What every connection task shares.
#[derive(Clone)]
struct Shared {
    config: ServerConfig,
    auth: Arc<AuthConfig>,
    arbiter: Arc<Arbiter>,
    clients: Clients,
}

/// The game server.
pub struct GameServer {
    shared: Shared,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server in front of `arbiter`.
    pub fn new(config: ServerConfig, auth: AuthConfig, arbiter: Arc<Arbiter>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shared: Shared {
                config,
                auth: Arc::new(auth),
                arbiter,
                clients: Arc::new(RwLock::new(BTreeMap::new())),
            },
            shutdown_tx,
        }
    }

    /// Run the server.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.shared.config.bind_addr).await?;
        info!("Game server listening on {}", self.shared.config.bind_addr);
        if !self.shared.auth.is_configured() {
            warn!("Authentication not configured; trusting client-supplied player ids");
        }

        // Spawn matchmaking sweep
        let matchmaking_arbiter = Arc::clone(&self.shared.arbiter);
        let matchmaking_handle = tokio::spawn(async move {
            Self::run_matchmaking_loop(matchmaking_arbiter).await;
        });

        // Spawn cleanup task
        let cleanup_shared = self.shared.clone();
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_shared).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.shared.clients.read().await.len();
                            if clients_count >= self.shared.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        matchmaking_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let shared = self.shared.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);

            // Register client
            {
                let mut clients = shared.clients.write().await;
                clients.insert(addr, ConnectedClient {
                    player: None,
                    sender: msg_tx.clone(),
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                });
            }

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        let client_msg = match msg {
                            Some(Ok(Message::Text(text))) => match ClientMessage::from_json(&text) {
                                Ok(m) => m,
                                Err(e) => {
                                    debug!("Invalid message from {}: {}", addr, e);
                                    let _ = msg_tx.send(ServerMessage::error(
                                        ErrorCode::InvalidInput,
                                        "Invalid message format",
                                    )).await;
                                    continue;
                                }
                            },
                            // Binary frames carry answer submissions only
                            Some(Ok(Message::Binary(data))) => match AnswerSubmission::from_bytes(&data) {
                                Ok(submission) => ClientMessage::SubmitAnswer(submission),
                                Err(e) => {
                                    debug!("Invalid binary frame from {}: {}", addr, e);
                                    continue;
                                }
                            },
                            Some(Ok(Message::Ping(_))) => {
                                let _ = msg_tx.send(ServerMessage::Pong {
                                    timestamp: 0,
                                    server_time: server_time_ms(),
                                }).await;
                                continue;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => continue,
                        };

                        #[cfg(feature = "debug-tracing")]
                        tracing::trace!("{} -> {:?}", addr, client_msg);

                        // Update activity
                        {
                            let mut clients = shared.clients.write().await;
                            if let Some(client) = clients.get_mut(&addr) {
                                client.last_activity = Instant::now();
                            }
                        }

                        Self::handle_client_message(addr, client_msg, &shared, &msg_tx).await;
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            // Cleanup
            sender_task.abort();

            // A disconnect abandons any match in progress
            let client = shared.clients.write().await.remove(&addr);
            if let Some(player) = client.and_then(|c| c.player) {
                Self::release_player(&shared.arbiter, &player, &msg_tx).await;
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        shared: &Shared,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let msg = match msg {
            ClientMessage::Auth(auth) => {
                Self::handle_auth(addr, auth, shared, sender).await;
                return;
            }
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: server_time_ms(),
                }).await;
                return;
            }
            other => other,
        };

        let player = {
            let clients = shared.clients.read().await;
            clients.get(&addr).and_then(|c| c.player.clone())
        };
        let Some(player) = player else {
            let _ = sender.send(ServerMessage::error(ErrorCode::NotAuthenticated, "Must authenticate first")).await;
            return;
        };

        let result = match msg {
            ClientMessage::FindMatch(req) => Self::handle_find_match(player.clone(), req, shared, sender).await,
            ClientMessage::CancelMatch => {
                let was_queued = shared.arbiter.cancel_match(&player.id).await;
                debug!("Player {} cancelled matchmaking (queued: {})", player.id.short(), was_queued);
                let _ = sender.send(ServerMessage::Matchmaking(MatchmakingResponse {
                    status: MatchmakingStatus::Cancelled,
                    match_type: None,
                    position: None,
                })).await;
                Ok(())
            }
            ClientMessage::ChooseCategory { category_id } => {
                match shared.arbiter.session_of(&player.id).await {
                    Some(session_id) => shared.arbiter
                        .choose_category(&session_id, player.id, category_id).await
                        .map(|_| ()),
                    None => Err(ArbiterError::NotInMatch),
                }
            }
            ClientMessage::SubmitAnswer(submission) => {
                match shared.arbiter.session_of(&player.id).await {
                    Some(session_id) => shared.arbiter
                        .submit_answer(&session_id, player.id, submission.key(), submission.choice).await
                        .map(|_| ()),
                    None => Err(ArbiterError::NotInMatch),
                }
            }
            ClientMessage::Snapshot => {
                match shared.arbiter.session_of(&player.id).await {
                    Some(session_id) => match shared.arbiter.get_session_snapshot(&session_id).await {
                        Ok(snapshot) => {
                            let _ = sender.send(ServerMessage::Snapshot(snapshot)).await;
                            Ok(())
                        }
                        Err(e) => Err(e),
                    },
                    None => Err(ArbiterError::NotInMatch),
                }
            }
            ClientMessage::Leave => {
                shared.arbiter.leave(player.id).await;
                Ok(())
            }
            ClientMessage::Auth(_) | ClientMessage::Ping { .. } => Ok(()),
        };

        if let Err(e) = result {
            debug!("Rejected request from {}: {}", player.id.short(), e);
            let _ = sender.send(ServerMessage::Error(ServerError::from(&e))).await;
        }
    }

    /// Handle authentication.
    async fn handle_auth(
        addr: SocketAddr,
        req: AuthRequest,
        shared: &Shared,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        let already = {
            let clients = shared.clients.read().await;
            clients.get(&addr).and_then(|c| c.player.as_ref().map(|p| p.id))
        };
        if let Some(player_id) = already {
            let _ = sender.send(ServerMessage::error(
                ErrorCode::InvalidInput,
                format!("Already authenticated as {}", player_id),
            )).await;
            return;
        }

        let player = match auth::authenticate(&req.token, &req.player_id, req.display_name.as_deref(), &shared.auth) {
            Ok(player) => player,
            Err(e) => {
                debug!("Client {} failed authentication: {}", addr, e);
                let _ = sender.send(ServerMessage::AuthResult(AuthResult {
                    success: false,
                    player_id: None,
                    display_name: None,
                    error: Some(e.to_string()),
                    server_version: shared.config.version.clone(),
                })).await;
                let _ = sender.send(ServerMessage::error(auth_error_code(&e), e.to_string())).await;
                return;
            }
        };

        {
            let mut clients = shared.clients.write().await;
            if let Some(client) = clients.get_mut(&addr) {
                client.player = Some(player.clone());
            }
        }
        shared.arbiter.register_connection(player.id, sender.clone()).await;

        let _ = sender.send(ServerMessage::AuthResult(AuthResult {
            success: true,
            player_id: Some(player.id),
            display_name: Some(player.display_name.clone()),
            error: None,
            server_version: shared.config.version.clone(),
        })).await;

        debug!("Client {} authenticated as {}", addr, player.id.short());
    }

    /// Handle matchmaking request.
    async fn handle_find_match(
        player: Player,
        req: FindMatchRequest,
        shared: &Shared,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), ArbiterError> {
        let player_id = player.id;
        match shared.arbiter.request_match(player, req.match_type).await? {
            MatchRequest::Queued { position } => {
                let _ = sender.send(ServerMessage::Matchmaking(MatchmakingResponse {
                    status: MatchmakingStatus::Searching,
                    match_type: Some(req.match_type),
                    position: Some(position),
                })).await;
                debug!("Player {} queued for {}", player_id.short(), req.match_type.as_str());
            }
            // Both participants hear about it from the session
            MatchRequest::Paired(_) => {}
        }
        Ok(())
    }

    /// Drop a participant from the queue and any live match, unless they
    /// have since reconnected on another socket.
    async fn release_player(arbiter: &Arbiter, player: &Player, sender: &mpsc::Sender<ServerMessage>) {
        if !arbiter.unregister_connection(&player.id, sender).await {
            debug!("Player {} closed a superseded connection", player.id.short());
            return;
        }
        if let Some(outcome) = arbiter.leave(player.id).await {
            info!("Player {} left a live match ({})", player.id.short(), outcome.label());
        }
    }

    /// Expire stale matchmaking entries.
    async fn run_matchmaking_loop(arbiter: Arc<Arbiter>) {
        let mut interval = interval(Duration::from_secs(1));

        loop {
            interval.tick().await;
            let expired = arbiter.sweep_queue().await;
            if expired > 0 {
                debug!("Expired {} matchmaking entries", expired);
            }
        }
    }

    /// Run cleanup loop.
    async fn run_cleanup_loop(shared: Shared) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;

            // Cleanup idle connections
            let now = Instant::now();
            let idle_timeout = shared.config.idle_timeout;

            let idle: Vec<_> = {
                let mut clients = shared.clients.write().await;
                let addrs: Vec<_> = clients.iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(addr, _)| *addr)
                    .collect();
                addrs.into_iter()
                    .filter_map(|addr| clients.remove(&addr).map(|c| (addr, c)))
                    .collect()
            };

            for (addr, client) in idle {
                if let Some(player) = &client.player {
                    Self::release_player(&shared.arbiter, player, &client.sender).await;
                }
                info!(
                    "Removed idle client {} (connected {}s)",
                    addr,
                    now.duration_since(client.connected_at).as_secs()
                );
            }

            // Cleanup finished sessions the archive task missed
            let removed = shared.arbiter.sessions().cleanup(shared.config.arbiter.archive_grace).await;
            if removed > 0 {
                debug!("Removed {} finished sessions", removed);
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.shared.clients.read().await.len()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.shared.arbiter.sessions().session_count().await
    }

    /// Get matchmaking queue size.
    pub async fn queue_size(&self) -> usize {
        self.shared.arbiter.queue_size().await
    }
}

fn auth_error_code(err: &AuthError) -> ErrorCode {
    match err {
        AuthError::Expired => ErrorCode::TokenExpired,
        AuthError::InvalidPlayerId => ErrorCode::InvalidInput,
        AuthError::NotConfigured => ErrorCode::AuthFailed,
        _ => ErrorCode::InvalidToken,
    }
}

fn server_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::question::TriviaContent;
    use crate::network::results::LogSink;

    fn server(config: ServerConfig) -> GameServer {
        let content = TriviaContent::bundled(7).unwrap();
        let arbiter = Arbiter::new(content, Arc::new(LogSink), config.arbiter.clone());
        GameServer::new(config, AuthConfig::default(), arbiter)
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.arbiter.queue_timeout, Duration::from_secs(120));
        assert!(config.questions_path.is_none());
    }

    #[test]
    fn test_server_config_from_lookup() {
        let vars: BTreeMap<&str, &str> = [
            ("TRIVIA_BIND_ADDR", "127.0.0.1:9001"),
            ("TRIVIA_MAX_CONNECTIONS", "not-a-number"),
            ("TRIVIA_QUEUE_TIMEOUT_SECS", "30"),
            ("TRIVIA_INTERMISSION_SECS", "2"),
            ("TRIVIA_RESULTS_PATH", "/tmp/results.jsonl"),
        ].into_iter().collect();

        let config = ServerConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.bind_addr, "127.0.0.1:9001".parse().unwrap());
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.arbiter.queue_timeout, Duration::from_secs(30));
        assert_eq!(config.arbiter.intermission, Duration::from_secs(2));
        assert_eq!(config.results_path, Some(PathBuf::from("/tmp/results.jsonl")));
        assert!(config.questions_path.is_none());
    }

    #[test]
    fn test_auth_error_codes() {
        assert_eq!(auth_error_code(&AuthError::Expired), ErrorCode::TokenExpired);
        assert_eq!(auth_error_code(&AuthError::InvalidSignature), ErrorCode::InvalidToken);
        assert_eq!(auth_error_code(&AuthError::InvalidPlayerId), ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = server(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        });

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.session_count().await, 0);
        assert_eq!(server.queue_size().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = server(ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        });
        server.shutdown();
        // Should not panic
    }

    type Client = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>;

    const ALICE: &str = "00000000-0000-0000-0000-000000000001";
    const BOB: &str = "00000000-0000-0000-0000-000000000002";

    async fn start_server() -> (Arc<GameServer>, SocketAddr, tokio::task::JoinHandle<Result<(), GameServerError>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = Arc::new(server(ServerConfig {
            bind_addr: addr,
            ..Default::default()
        }));
        let runner = Arc::clone(&server);
        let handle = tokio::spawn(async move { runner.run().await });
        (server, addr, handle)
    }

    /// Connect and authenticate, retrying while the listener binds.
    async fn connect_as(addr: SocketAddr, id: &str, name: &str) -> Client {
        let mut attempt = 0;
        let (mut ws, _) = loop {
            match tokio_tungstenite::connect_async(format!("ws://{}", addr)).await {
                Ok(conn) => break conn,
                Err(_) if attempt < 50 => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(e) => panic!("connect failed: {}", e),
            }
        };
        let auth = format!(r#"{{"type":"auth","player_id":"{}","display_name":"{}"}}"#, id, name);
        ws.send(Message::Text(auth)).await.unwrap();
        assert!(matches!(next_message(&mut ws).await, ServerMessage::AuthResult(AuthResult { success: true, .. })));
        ws
    }

    async fn next_message(ws: &mut Client) -> ServerMessage {
        loop {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    async fn pair(clients: &mut [Client; 2]) {
        let find = r#"{"type":"find_match","match_type":"quick"}"#;
        clients[0].send(Message::Text(find.to_string())).await.unwrap();
        assert!(matches!(next_message(&mut clients[0]).await, ServerMessage::Matchmaking(_)));
        clients[1].send(Message::Text(find.to_string())).await.unwrap();

        for ws in clients.iter_mut() {
            assert!(matches!(next_message(ws).await, ServerMessage::MatchFound(_)));
            assert!(matches!(next_message(ws).await, ServerMessage::CategoriesOffered { round: 1, .. }));
        }
    }

    #[tokio::test]
    async fn test_websocket_duel_flow() {
        let (server, addr, handle) = start_server().await;
        let mut clients = [connect_as(addr, ALICE, "alice").await, connect_as(addr, BOB, "bob").await];
        pair(&mut clients).await;

        // Second client leaves; the first is told the match is over
        clients[1].send(Message::Text(r#"{"type":"leave"}"#.to_string())).await.unwrap();
        match next_message(&mut clients[0]).await {
            ServerMessage::GameOver { outcome, .. } => assert_eq!(outcome.label(), "abandoned"),
            other => panic!("expected game over, got {:?}", other),
        }

        server.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_closing_old_socket_after_reconnect_keeps_match() {
        let (server, addr, handle) = start_server().await;
        let mut clients = [connect_as(addr, ALICE, "alice").await, connect_as(addr, BOB, "bob").await];
        pair(&mut clients).await;
        let [mut old, mut bob] = clients;

        let mut alice = connect_as(addr, ALICE, "alice").await;
        old.close(None).await.unwrap();

        // Wait for the server to drop the old socket
        let mut attempt = 0;
        while server.connection_count().await > 2 {
            assert!(attempt < 100, "old connection never cleaned up");
            attempt += 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Still seated: the reconnected socket sees the match end by Bob leaving
        bob.send(Message::Text(r#"{"type":"leave"}"#.to_string())).await.unwrap();
        match next_message(&mut alice).await {
            ServerMessage::GameOver { outcome, .. } => {
                assert_eq!(outcome.label(), "abandoned");
                assert_eq!(outcome.winner().map(|w| w.to_string()), Some(ALICE.to_string()));
            }
            other => panic!("expected game over, got {:?}", other),
        }

        server.shutdown();
        let _ = handle.await;
    }
}
