use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use pairlink_core::collaborators::{Collaborators, EmailDispatcher};
use pairlink_core::{RelayEngine, SessionRegistry};
use pairlink_store::ConnectionRepo;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::client::{self, ClientRegistry};
use crate::handlers;
use crate::relay::{self, RelayMessage};

/// Upload size accepted by `/api/send-email`.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
    pub relay_queue: usize,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            max_send_queue: 256,
            relay_queue: 1024,
            static_dir: None,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub clients: Arc<ClientRegistry>,
    pub relay_tx: mpsc::Sender<RelayMessage>,
    pub connections: Option<ConnectionRepo>,
    pub email: Option<Arc<dyn EmailDispatcher>>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, static_dir: Option<&PathBuf>) -> Router {
    let mut router = Router::new()
        .route("/socket", get(ws_handler))
        .route("/health", get(handlers::health))
        .route("/api/connections", get(handlers::list_connections))
        .route(
            "/api/send-email",
            post(handlers::send_email).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        );

    if let Some(dir) = static_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps it running.
///
/// `connections` backs `/api/connections`; status writes from the relay go
/// through `collaborators.status`.
pub async fn start(
    config: ServerConfig,
    collaborators: Collaborators,
    connections: Option<ConnectionRepo>,
) -> Result<ServerHandle, std::io::Error> {
    let clients = Arc::new(ClientRegistry::new(config.max_send_queue));
    let (relay_tx, relay_rx) = mpsc::channel::<RelayMessage>(config.relay_queue);

    let app_state = AppState {
        clients: Arc::clone(&clients),
        relay_tx,
        connections,
        email: collaborators.email.clone(),
    };

    let engine = RelayEngine::new(SessionRegistry::new(), clients, collaborators);
    let relay_handle = tokio::spawn(relay::run_relay(relay_rx, engine));

    let static_dir = config.static_dir.as_ref().filter(|dir| {
        let exists = dir.is_dir();
        if !exists {
            tracing::warn!(dir = %dir.display(), "static directory not found, not serving files");
        }
        exists
    });
    let router = build_router(app_state, static_dir);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(addr = %local_addr, "pairlink server started");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        port: local_addr.port(),
        server: server_handle,
        _relay: relay_handle,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    server: tokio::task::JoinHandle<()>,
    _relay: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections. The relay drains once every socket closes.
    pub fn shutdown(&self) {
        self.server.abort();
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (conn_id, rx) = state.clients.register();
    tracing::info!(conn_id = %conn_id, "WebSocket client connected");

    client::handle_ws_connection(socket, conn_id, rx, state.clients, state.relay_tx).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::{SinkExt, StreamExt};
    use pairlink_core::collaborators::{ConnectionStatus, EmailRequest, StatusRecorder};
    use pairlink_core::{CollaboratorError, Role, SessionToken};
    use pairlink_store::Database;
    use serde_json::{json, Value};
    use tokio_tungstenite::tungstenite::Message;

    use super::*;

    type Socket =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        }
    }

    async fn connect(handle: &ServerHandle) -> Socket {
        let url = format!("ws://127.0.0.1:{}/socket", handle.port);
        let (socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        socket
    }

    async fn send(socket: &mut Socket, event: &str, data: Value) {
        let frame = json!({"event": event, "data": data}).to_string();
        socket.send(Message::Text(frame.into())).await.unwrap();
    }

    async fn recv(socket: &mut Socket) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("timed out waiting for frame")
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn assert_silent(socket: &mut Socket) {
        let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }

    struct ChannelEmail(mpsc::UnboundedSender<EmailRequest>);

    #[async_trait]
    impl EmailDispatcher for ChannelEmail {
        async fn send_email(&self, request: &EmailRequest) -> Result<(), CollaboratorError> {
            let _ = self.0.send(request.clone());
            Ok(())
        }
    }

    struct RejectingEmail;

    #[async_trait]
    impl EmailDispatcher for RejectingEmail {
        async fn send_email(&self, _request: &EmailRequest) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::from_status(422, "bad recipient".into()))
        }
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let handle = start(test_config(), Collaborators::default(), None)
            .await
            .unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
    }

    #[tokio::test]
    async fn pairing_and_relay_over_websocket() {
        let handle = start(test_config(), Collaborators::default(), None)
            .await
            .unwrap();

        let mut device = connect(&handle).await;
        let mut phone = connect(&handle).await;

        send(&mut device, "register", json!({"authToken": "abc123", "deviceType": "esp"})).await;
        assert_silent(&mut device).await;
        send(&mut phone, "register", json!({"authToken": "abc123", "deviceType": "phone"})).await;

        for socket in [&mut device, &mut phone] {
            let frame = recv(socket).await;
            assert_eq!(frame["event"], "status");
            assert_eq!(frame["data"]["message"], "Both devices connected");
        }

        send(&mut device, "sensor_data", json!({"authToken": "abc123", "sensorState": "ON"})).await;
        let frame = recv(&mut phone).await;
        assert_eq!(frame, json!({"event": "sensor_data", "data": {"sensorState": "ON"}}));

        send(
            &mut device,
            "sensor_data",
            json!({"authToken": "abc123", "type": "sms", "number": "+15550100", "message": "hi"}),
        )
        .await;
        let frame = recv(&mut phone).await;
        assert_eq!(frame["event"], "sms");
        assert_eq!(frame["data"]["number"], "+15550100");
        assert_eq!(frame["data"]["message"], "hi");

        // phone leaves, device readings now bounce
        phone.close(None).await.unwrap();
        drop(phone);
        tokio::time::sleep(Duration::from_millis(100)).await;

        send(&mut device, "sensor_data", json!({"authToken": "abc123", "sensorState": "OFF"})).await;
        let frame = recv(&mut device).await;
        assert_eq!(frame["event"], "error");
        assert_eq!(frame["data"]["message"], "Phone not connected");
    }

    #[tokio::test]
    async fn errors_reach_only_the_sender() {
        let handle = start(test_config(), Collaborators::default(), None)
            .await
            .unwrap();
        let mut socket = connect(&handle).await;

        socket.send(Message::Text("definitely not json".into())).await.unwrap();
        let frame = recv(&mut socket).await;
        assert_eq!(frame["data"]["message"], "Malformed event");

        send(&mut socket, "register", json!({"authToken": "", "deviceType": "esp"})).await;
        let frame = recv(&mut socket).await;
        assert_eq!(frame["data"]["message"], "Invalid registration data");

        send(&mut socket, "sensor_data", json!({"authToken": "nobody", "sensorState": 1})).await;
        let frame = recv(&mut socket).await;
        assert_eq!(frame["data"]["message"], "Invalid authToken or device not registered");
    }

    #[tokio::test]
    async fn health_counts_open_sockets() {
        let handle = start(test_config(), Collaborators::default(), None)
            .await
            .unwrap();
        let _a = connect(&handle).await;
        let _b = connect(&handle).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["connections"], 2);
    }

    #[tokio::test]
    async fn connections_endpoint_requires_persistence() {
        let handle = start(test_config(), Collaborators::default(), None)
            .await
            .unwrap();
        let url = format!("http://127.0.0.1:{}/api/connections", handle.port);
        assert_eq!(reqwest::get(&url).await.unwrap().status(), 503);
    }

    #[tokio::test]
    async fn connections_endpoint_lists_recorded_status() {
        let repo = ConnectionRepo::new(Database::in_memory().unwrap());
        let recorder: Arc<dyn StatusRecorder> = Arc::new(repo.clone());
        let collaborators = Collaborators::default().with_status(recorder);
        let handle = start(test_config(), collaborators, Some(repo.clone()))
            .await
            .unwrap();

        let mut device = connect(&handle).await;
        send(&mut device, "register", json!({"authToken": "abc123", "deviceType": "esp"})).await;

        let token = SessionToken::parse(Some("abc123")).unwrap();
        let mut recorded = false;
        for _ in 0..50 {
            if repo.get(&token, Role::Device).is_ok() {
                recorded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(recorded, "status row never written");
        assert_eq!(
            repo.get(&token, Role::Device).unwrap().status,
            ConnectionStatus::Connected
        );

        let url = format!("http://127.0.0.1:{}/api/connections", handle.port);
        let rows: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(rows[0]["authToken"], "abc123");
        assert_eq!(rows[0]["deviceType"], "esp");
        assert_eq!(rows[0]["status"], "connected");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closing_socket_records_disconnected() {
        let repo = ConnectionRepo::new(Database::in_memory().unwrap());
        let recorder: Arc<dyn StatusRecorder> = Arc::new(repo.clone());
        let collaborators = Collaborators::default().with_status(recorder);
        let handle = start(test_config(), collaborators, Some(repo.clone()))
            .await
            .unwrap();

        let mut device = connect(&handle).await;
        send(&mut device, "register", json!({"authToken": "abc123", "deviceType": "esp"})).await;
        device.close(None).await.unwrap();

        let url = format!("http://127.0.0.1:{}/api/connections", handle.port);
        let mut last = Value::Null;
        for _ in 0..100 {
            last = reqwest::get(&url).await.unwrap().json().await.unwrap();
            if last[0]["status"] == "disconnected" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(last[0]["authToken"], "abc123");
        assert_eq!(last[0]["deviceType"], "esp");
        assert_eq!(last[0]["status"], "disconnected", "rows: {last}");
        assert_eq!(last.as_array().map(Vec::len), Some(1));

        // the socket is gone from the open count as well
        let health: Value = reqwest::get(format!("http://127.0.0.1:{}/health", handle.port))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["connections"], 0);
    }

    fn email_form(with_image: bool) -> reqwest::multipart::Form {
        let form = reqwest::multipart::Form::new()
            .text("title", "Motion")
            .text("body", "Front door")
            .text("toaddr", "owner@example.com");
        if with_image {
            let part = reqwest::multipart::Part::bytes(b"jpegdata".to_vec())
                .file_name("snap.jpg")
                .mime_str("image/jpeg")
                .unwrap();
            form.part("image", part)
        } else {
            form
        }
    }

    #[tokio::test]
    async fn send_email_endpoint_delivers_with_attachment() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collaborators = Collaborators::default().with_email(Arc::new(ChannelEmail(tx)));
        let handle = start(test_config(), collaborators, None).await.unwrap();

        let url = format!("http://127.0.0.1:{}/api/send-email", handle.port);
        let resp = reqwest::Client::new()
            .post(&url)
            .multipart(email_form(true))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "Email sent successfully.");

        let request = rx.try_recv().unwrap();
        assert_eq!(request.title, "Motion");
        assert_eq!(request.recipient, "owner@example.com");
        let attachment = request.attachment.unwrap();
        assert_eq!(attachment.filename, "snap.jpg");
        assert_eq!(attachment.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(attachment.content, b"jpegdata");
    }

    #[tokio::test]
    async fn send_email_endpoint_status_codes() {
        let handle = start(test_config(), Collaborators::default(), None)
            .await
            .unwrap();
        let url = format!("http://127.0.0.1:{}/api/send-email", handle.port);
        let client = reqwest::Client::new();

        let missing = reqwest::multipart::Form::new().text("title", "only title");
        let resp = client.post(&url).multipart(missing).send().await.unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client.post(&url).multipart(email_form(false)).send().await.unwrap();
        assert_eq!(resp.status(), 503);

        let collaborators = Collaborators::default().with_email(Arc::new(RejectingEmail));
        let failing = start(test_config(), collaborators, None).await.unwrap();
        let url = format!("http://127.0.0.1:{}/api/send-email", failing.port);
        let resp = client.post(&url).multipart(email_form(false)).send().await.unwrap();
        assert_eq!(resp.status(), 500);
        assert_eq!(resp.text().await.unwrap(), "Error sending email.");
    }

    #[tokio::test]
    async fn static_files_served_as_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>pairlink</h1>").unwrap();

        let config = ServerConfig {
            static_dir: Some(dir.path().to_path_buf()),
            ..test_config()
        };
        let handle = start(config, Collaborators::default(), None).await.unwrap();

        let url = format!("http://127.0.0.1:{}/index.html", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "<h1>pairlink</h1>");
    }
}
