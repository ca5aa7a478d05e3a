/// Local HTTP listener for the OAuth redirect
use crate::error::{AuthError, Result};
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::{form_urlencoded, Host, Url};

/// How long `stop` lets open connections drain before aborting them
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query parameters the provider sent back to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackOutcome {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackOutcome {
    fn from_query(query: &str) -> Self {
        let mut outcome = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut outcome.code,
                "state" => &mut outcome.state,
                "error" => &mut outcome.error,
                "error_description" => &mut outcome.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        outcome
    }

    /// Whether the redirect carries anything the login flow can act on
    fn is_actionable(&self) -> bool {
        self.code.is_some() || self.error.is_some()
    }
}

/// State shared between the listener handle and its request handler
struct Shared {
    path: String,
    captured: Arc<Mutex<Option<CallbackOutcome>>>,
    signal: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    completion: Option<oneshot::Receiver<CallbackOutcome>>,
}

#[derive(Default)]
struct Inner {
    running: tokio::sync::Mutex<Option<Running>>,
    captured: Arc<Mutex<Option<CallbackOutcome>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel();
        }
    }
}

/// Single-route HTTP server bound to the redirect URI's host and port
///
/// Clones share the same server, so one task can wait for the redirect
/// while another stops the listener.
#[derive(Clone, Default)]
pub struct CallbackListener {
    inner: Arc<Inner>,
}

impl CallbackListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the redirect URI's host and port and start accepting
    ///
    /// Calling this while already running does nothing. A failed bind is
    /// returned as [`AuthError::Bind`].
    pub async fn start(&self, redirect_uri: &str) -> Result<()> {
        let mut running = self.inner.running.lock().await;
        if running.is_some() {
            debug!("Callback listener already running");
            return Ok(());
        }

        let redirect = Url::parse(redirect_uri).map_err(|e| {
            AuthError::InvalidConfig(format!("redirect_uri {:?}: {}", redirect_uri, e))
        })?;
        let (host, port) = bind_target(&redirect)?;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|source| AuthError::Bind {
                addr: format!("{}:{}", host, port),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| AuthError::Bind {
            addr: format!("{}:{}", host, port),
            source,
        })?;

        *self.inner.captured.lock() = None;
        let (signal, completion) = oneshot::channel();
        let shared = Arc::new(Shared {
            path: redirect.path().to_string(),
            captured: self.inner.captured.clone(),
            signal: Mutex::new(Some(signal)),
        });

        let app = Router::new().fallback(handle_request).with_state(shared);
        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();

        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
                .await
            {
                error!("Callback listener error: {}", err);
            }
        });

        info!(addr = %local_addr, path = redirect.path(), "Callback listener started");

        *running = Some(Running {
            local_addr,
            shutdown,
            handle,
            completion: Some(completion),
        });
        Ok(())
    }

    /// Wait for the first actionable redirect
    ///
    /// Ends with [`AuthError::AuthTimeout`] once `timeout` elapses and with
    /// [`AuthError::Cancelled`] if `cancel` fires, the listener is stopped,
    /// or the redirect was already consumed by an earlier wait.
    pub async fn wait(&self, timeout: Duration, cancel: &CancellationToken) -> Result<CallbackOutcome> {
        let completion = {
            let mut running = self.inner.running.lock().await;
            running.as_mut().and_then(|r| r.completion.take())
        };
        let completion = completion.ok_or(AuthError::Cancelled)?;

        tokio::select! {
            outcome = completion => outcome.map_err(|_| AuthError::Cancelled),
            _ = tokio::time::sleep(timeout) => Err(AuthError::AuthTimeout(timeout.as_secs())),
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        }
    }

    /// Stop accepting and return once the socket is closed
    ///
    /// A response already being written is allowed to finish. Safe to call
    /// from any task, and a no-op when not running.
    pub async fn stop(&self) {
        let running = self.inner.running.lock().await.take();
        let Some(running) = running else {
            return;
        };

        running.shutdown.cancel();
        let mut handle = running.handle;
        match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("Callback listener task failed: {}", err),
            Err(_) => {
                warn!("Callback listener connections did not drain, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        info!(addr = %running.local_addr, "Callback listener stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.running.lock().await.is_some()
    }

    /// Address actually bound, useful when the redirect URI asked for port 0
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// The redirect that signalled completion, if any
    pub fn captured(&self) -> Option<CallbackOutcome> {
        self.inner.captured.lock().clone()
    }
}

/// `localhost` binds the IPv4 loopback, which every browser can reach
fn bind_target(redirect: &Url) -> Result<(String, u16)> {
    let host = match redirect.host() {
        Some(Host::Domain("localhost")) => "127.0.0.1".to_string(),
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => {
            return Err(AuthError::InvalidConfig(
                "redirect_uri has no host".into(),
            ))
        }
    };
    let port = redirect
        .port_or_known_default()
        .ok_or_else(|| AuthError::InvalidConfig("redirect_uri has no port".into()))?;
    Ok((host, port))
}

async fn handle_request(State(shared): State<Arc<Shared>>, uri: Uri) -> Response {
    if uri.path() != shared.path {
        debug!(path = uri.path(), "Ignoring request outside the callback path");
        return page(StatusCode::NOT_FOUND, "Not Found", "Nothing to see here.", false);
    }

    let outcome = CallbackOutcome::from_query(uri.query().unwrap_or(""));
    if !outcome.is_actionable() {
        return page(
            StatusCode::BAD_REQUEST,
            "Authorization Failed",
            "The redirect carried no authorization code.",
            false,
        );
    }

    let response = match &outcome.error {
        Some(error) => {
            let reason = outcome.error_description.as_deref().unwrap_or(error);
            page(
                StatusCode::BAD_REQUEST,
                "Authorization Failed",
                &format!("Authorization failed: {}", reason),
                false,
            )
        }
        None => page(
            StatusCode::OK,
            "Authorization Successful",
            "You can close this window and return to the application.",
            true,
        ),
    };

    // The waiter reads `captured` after the signal, so store it first.
    let signal = shared.signal.lock().take();
    match signal {
        Some(signal) => {
            *shared.captured.lock() = Some(outcome.clone());
            if signal.send(outcome).is_err() {
                debug!("Redirect arrived after the waiter gave up");
            }
        }
        None => debug!("Repeated redirect ignored"),
    }

    response
}

fn page(status: StatusCode, title: &str, message: &str, success: bool) -> Response {
    let (mark, accent) = if success {
        ("&#10003;", "#48bb78")
    } else {
        ("&#10007;", "#f56565")
    };

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: -apple-system, "Segoe UI", Roboto, Arial, sans-serif; display: flex; justify-content: center; align-items: center; height: 100vh; margin: 0; background: #f7fafc; }}
        .container {{ background: white; padding: 3rem; border-radius: 1rem; box-shadow: 0 10px 30px rgba(0,0,0,0.15); text-align: center; max-width: 420px; }}
        .mark {{ font-size: 4rem; color: {accent}; }}
        h1 {{ color: #2d3748; }}
        p {{ color: #4a5568; line-height: 1.6; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="mark">{mark}</div>
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>"#,
        title = escape_html(title),
        message = escape_html(message),
        mark = mark,
        accent = accent,
    );

    (status, [(header::CONNECTION, "close")], Html(html)).into_response()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
