use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use mattermost_api::{
    LoginRequest, MattermostApiClient, MattermostApiError, MattermostConfig, PostsQuery,
};
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

fn allow_local_integration() -> bool {
    std::env::var("MATTERMOST_API_ALLOW_LOCAL_INTEGRATION")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    },
    Reset,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    request_lines: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let request_lines = Arc::new(Mutex::new(Vec::new()));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);
            let request_lines = Arc::clone(&request_lines);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    let request_lines = Arc::clone(&request_lines);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count, request_lines).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            request_lines,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn request_lines(&self) -> Vec<String> {
        self.request_lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    fn client(&self) -> MattermostApiClient {
        let config = MattermostConfig::new(&self.base_url).with_token("tok");
        MattermostApiClient::new(config).expect("client")
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        headers: Vec::new(),
        body: body.to_owned(),
    }
}

#[tokio::test]
async fn posts_request_carries_cursor_and_parses_page() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        200,
        r#"{"order":["p2"],"posts":{"p2":{"id":"p2","channel_id":"c1","create_at":20,"message":"hi"}},"next_post_id":"","prev_post_id":"p1"}"#,
    )])
    .await;
    let client = server.client();

    let page = client
        .get_posts_for_channel("c1", &PostsQuery::latest(30).before("p3"), None)
        .await
        .expect("posts should load");

    assert_eq!(page.order, vec!["p2"]);
    assert_eq!(page.prev_post_id, "p1");
    let lines = server.request_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("GET /api/v4/channels/c1/posts?before=p3&per_page=30 "));

    server.shutdown();
}

#[tokio::test]
async fn login_reads_session_token_header() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        headers: vec![("Token", "session-123".to_owned())],
        body: r#"{"id":"u1","username":"ann"}"#.to_owned(),
    }])
    .await;
    let client = MattermostApiClient::new(MattermostConfig::new(&server.base_url))
        .expect("client");

    let session = client
        .login(&LoginRequest::new("ann", "pw"), None)
        .await
        .expect("login should succeed");

    assert_eq!(session.token, "session-123");
    assert_eq!(session.user.username, "ann");
    assert!(server.request_lines()[0].starts_with("POST /api/v4/users/login "));

    server.shutdown();
}

#[tokio::test]
async fn login_without_token_header_fails() {
    if !allow_local_integration() {
        return;
    }

    let server =
        ScriptedServer::new(vec![response_json(200, r#"{"id":"u1","username":"ann"}"#)]).await;
    let client = MattermostApiClient::new(MattermostConfig::new(&server.base_url))
        .expect("client");

    let error = client
        .login(&LoginRequest::new("ann", "pw"), None)
        .await
        .expect_err("missing token header should fail");

    assert!(matches!(error, MattermostApiError::MissingSessionToken));

    server.shutdown();
}

#[tokio::test]
async fn unavailable_server_is_retried_once() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(503, r#"{"message":"maintenance"}"#),
        response_json(200, r#"{"id":"u1","username":"ann"}"#),
    ])
    .await;
    let client = server.client();

    let user = timeout(Duration::from_secs(10), client.get_user("me", None))
        .await
        .expect("retry path should resolve")
        .expect("second attempt should succeed");

    assert_eq!(user.id, "u1");
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn persistent_unavailability_surfaces_last_status() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(503, r#"{"message":"maintenance"}"#),
        response_json(503, r#"{"message":"still maintenance"}"#),
    ])
    .await;
    let client = server.client();

    let error = client
        .get_user_teams("me", None)
        .await
        .expect_err("both attempts fail");

    assert_eq!(error.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert!(error.to_string().contains("still maintenance"));
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn not_found_is_not_retried() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        404,
        r#"{"id":"app.user.missing_account.const","message":"Unable to find the user."}"#,
    )])
    .await;
    let client = server.client();

    let error = client
        .get_user("u404", None)
        .await
        .expect_err("missing user should fail");

    assert!(matches!(
        &error,
        MattermostApiError::Status(StatusCode::NOT_FOUND, message) if message == "Unable to find the user."
    ));
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn connection_reset_is_retried_then_exhausted() {
    if !allow_local_integration() {
        return;
    }

    let server =
        ScriptedServer::new(vec![ScriptedResponse::Reset, ScriptedResponse::Reset]).await;
    let client = server.client();

    let error = timeout(
        Duration::from_secs(10),
        client.get_channels_for_user("me", "t1", None),
    )
    .await
    .expect("retry path should resolve")
    .expect_err("connection reset should surface as failure");

    assert!(matches!(
        error,
        MattermostApiError::RetryExhausted { status: None, .. }
    ));
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
    request_lines: Arc<Mutex<Vec<String>>>,
) {
    let Ok(request) = read_request_headers(&mut socket).await else {
        return;
    };
    if let (Some(line), Ok(mut lines)) = (request.lines().next(), request_lines.lock()) {
        lines.push(line.to_owned());
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r#"{"message":"unexpected request"}"#));

    match response {
        ScriptedResponse::Reset => {}
        ScriptedResponse::Respond {
            status,
            headers,
            body,
        } => {
            let mut head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                status_reason(status),
                body.len(),
            );
            for (name, value) in headers {
                head.push_str(&format!("{name}: {value}\r\n"));
            }
            head.push_str("\r\n");

            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.write_all(body.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&request).into_owned())
}
