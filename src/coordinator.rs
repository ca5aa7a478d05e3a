/// Token lifecycle orchestration
///
/// Decides whether a held token can be used as is, needs a refresh, or
/// needs a full interactive login, and re-discovers tenants after every
/// token acquisition.
use crate::browser::{BrowserLauncher, SystemBrowser};
use crate::callback::CallbackListener;
use crate::config::OAuthConfig;
use crate::error::{AuthError, Result};
use crate::oauth::{http_client, TokenClient};
use crate::session::PendingAuthorization;
use crate::tenants::{Tenant, TenantClient};
use crate::token::{classify, AuthState, TokenSet};
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Kind of status transition reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    LoginStarted,
    Refreshed,
    Success,
    Failed,
    Timeout,
}

/// Status transition with a human readable message and the token at that point
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub message: String,
    pub token: Option<TokenSet>,
}

/// Receives every status transition, synchronously, on the calling task
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, event: &StatusEvent);
}

impl<F> StatusObserver for F
where
    F: Fn(&StatusEvent) + Send + Sync,
{
    fn on_status(&self, event: &StatusEvent) {
        self(event)
    }
}

/// Owns one token set and every way of (re)acquiring it
///
/// All acquisition paths run behind a single async gate, so refreshes
/// never race on a rotating refresh token and at most one interactive
/// login holds the loopback port. Readers of the held token never wait on
/// network I/O.
///
/// # Example
///
/// ```no_run
/// use xero_pkce::prelude::*;
///
/// # async fn run() -> std::result::Result<(), AuthError> {
/// let config = OAuthConfig::xero(
///     "your-client-id",
///     "http://localhost:8888/callback",
///     "openid profile email accounting.transactions offline_access",
/// )
/// .with_random_state();
///
/// let coordinator = TokenCoordinator::new(config)?
///     .with_observer(|event: &StatusEvent| println!("{:?}: {}", event.kind, event.message));
///
/// let token = coordinator.initialize(None).await?;
/// println!("{} tenants connected", token.tenants.len());
/// # Ok(())
/// # }
/// ```
pub struct TokenCoordinator {
    config: OAuthConfig,
    tokens: TokenClient,
    tenants: TenantClient,
    browser: Arc<dyn BrowserLauncher>,
    observer: Option<Arc<dyn StatusObserver>>,
    update_gate: tokio::sync::Mutex<()>,
    current: RwLock<Option<TokenSet>>,
    state: RwLock<AuthState>,
    selected_tenant: RwLock<Option<Uuid>>,
    attempt: Mutex<Option<CancellationToken>>,
}

impl TokenCoordinator {
    /// Validate `config` and build a coordinator using the system browser
    pub fn new(config: OAuthConfig) -> Result<Self> {
        config.validate()?;
        let http = http_client(&config)?;

        Ok(Self {
            tokens: TokenClient::new(http.clone(), &config),
            tenants: TenantClient::new(http, config.connections_endpoint.clone()),
            config,
            browser: Arc::new(SystemBrowser),
            observer: None,
            update_gate: tokio::sync::Mutex::new(()),
            current: RwLock::new(None),
            state: RwLock::new(AuthState::NoToken),
            selected_tenant: RwLock::new(None),
            attempt: Mutex::new(None),
        })
    }

    /// Replace the HTTP client used for the token and connections endpoints
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.tokens = TokenClient::new(http.clone(), &self.config);
        self.tenants = TenantClient::new(http, self.config.connections_endpoint.clone());
        self
    }

    pub fn with_browser(mut self, browser: impl BrowserLauncher + 'static) -> Self {
        self.browser = Arc::new(browser);
        self
    }

    pub fn with_observer(mut self, observer: impl StatusObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn state(&self) -> AuthState {
        *self.state.read()
    }

    /// Snapshot of the held token set
    pub fn token(&self) -> Option<TokenSet> {
        self.current.read().clone()
    }

    /// Access token of the held set, without checking its expiry
    pub fn current_access_token(&self) -> Result<String> {
        self.current
            .read()
            .as_ref()
            .map(|token| token.access_token.clone())
            .ok_or(AuthError::NoToken)
    }

    /// Tenant id to send with API calls
    pub fn selected_tenant_id(&self) -> Option<Uuid> {
        *self.selected_tenant.read()
    }

    pub fn tenants(&self) -> Vec<Tenant> {
        self.current
            .read()
            .as_ref()
            .map(|token| token.tenants.clone())
            .unwrap_or_default()
    }

    /// Choose which connected tenant API calls should target
    pub fn select_tenant(&self, tenant_id: Uuid) -> Result<()> {
        if !self.tenants().iter().any(|t| t.tenant_id == tenant_id) {
            return Err(AuthError::UnknownTenant(tenant_id));
        }
        *self.selected_tenant.write() = Some(tenant_id);
        Ok(())
    }

    /// Adopt `existing` (typically loaded by the caller from disk) and bring
    /// it to a usable state
    ///
    /// A valid token is returned without any network call. A token inside
    /// the refresh window, or expired but younger than the refresh token
    /// lifetime, is refreshed. Anything else triggers an interactive login.
    pub async fn initialize(&self, existing: Option<TokenSet>) -> Result<TokenSet> {
        let _gate = self.update_gate.lock().await;
        *self.current.write() = existing;
        self.run_lifecycle().await
    }

    /// Run the lifecycle on the held token and return a usable access token
    pub async fn valid_access_token(&self) -> Result<String> {
        let _gate = self.update_gate.lock().await;
        self.run_lifecycle().await.map(|token| token.access_token)
    }

    /// Refresh the held token regardless of its expiry
    pub async fn refresh(&self) -> Result<TokenSet> {
        let _gate = self.update_gate.lock().await;
        let held = self.token().ok_or(AuthError::NoToken)?;
        self.refresh_held(held).await
    }

    /// Run a full interactive login, discarding nothing until it succeeds
    pub async fn authenticate(&self) -> Result<TokenSet> {
        let _gate = self.update_gate.lock().await;
        self.login_interactive().await
    }

    /// Re-run tenant discovery alone with the held access token
    pub async fn discover_tenants(&self) -> Result<Vec<Tenant>> {
        let _gate = self.update_gate.lock().await;
        let mut token = self.token().ok_or(AuthError::NoToken)?;
        self.populate_tenants(&mut token).await?;
        Ok(token.tenants)
    }

    /// Disconnect one tenant and drop it from the held set
    pub async fn disconnect_tenant(&self, connection_id: Uuid) -> Result<()> {
        let _gate = self.update_gate.lock().await;
        let mut token = self.token().ok_or(AuthError::NoToken)?;

        self.tenants
            .disconnect(&token.access_token, connection_id)
            .await?;

        token.tenants.retain(|tenant| tenant.id != connection_id);
        self.reconcile_selection(&token.tenants);
        *self.current.write() = Some(token);
        Ok(())
    }

    /// Revoke the refresh token at the provider and forget the held set
    pub async fn revoke(&self) -> Result<()> {
        let _gate = self.update_gate.lock().await;
        let token = self.token().ok_or(AuthError::NoToken)?;

        self.tokens.revoke_token(&token.refresh_token).await?;

        *self.current.write() = None;
        *self.selected_tenant.write() = None;
        self.set_state(AuthState::NoToken);
        Ok(())
    }

    /// Abort the interactive login currently waiting for a redirect
    ///
    /// Returns whether an attempt was waiting.
    pub fn cancel_login(&self) -> bool {
        match self.attempt.lock().as_ref() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    async fn run_lifecycle(&self) -> Result<TokenSet> {
        let held = self.token();
        let state = classify(held.as_ref(), Utc::now(), &self.config.expiry_policy()?);
        self.set_state(state);

        match (state, held) {
            (AuthState::TokenValid, Some(token)) => {
                debug!(expires_at = %token.expires_at_utc, "Held token still valid");
                Ok(token)
            }
            (AuthState::TokenExpiringSoon, Some(token)) => self.refresh_held(token).await,
            _ => {
                debug!(?state, "No refreshable token, starting interactive login");
                self.login_interactive().await
            }
        }
    }

    async fn refresh_held(&self, previous: TokenSet) -> Result<TokenSet> {
        let mut refreshed = match self.tokens.refresh_token(&previous.refresh_token).await {
            Ok(token) => token,
            Err(err) => return Err(self.fail(err)),
        };

        if refreshed.id_token.is_empty() {
            refreshed.id_token = previous.id_token;
        }
        refreshed.tenants = previous.tenants;

        // The previous refresh token is dead from here on.
        *self.current.write() = Some(refreshed.clone());
        self.set_state(AuthState::TokenValid);
        self.notify(StatusKind::Refreshed, "Access token refreshed", Some(&refreshed));

        self.finish_acquisition(refreshed).await
    }

    async fn login_interactive(&self) -> Result<TokenSet> {
        self.set_state(AuthState::AwaitingInteractiveAuth);

        let token = match self.authorize_in_browser().await {
            Ok(token) => token,
            Err(err) => return Err(self.fail(err)),
        };

        *self.current.write() = Some(token.clone());
        self.set_state(AuthState::TokenValid);
        self.finish_acquisition(token).await
    }

    async fn authorize_in_browser(&self) -> Result<TokenSet> {
        let mut pending = PendingAuthorization::new(&self.config);
        let listener = CallbackListener::new();
        listener.start(&self.config.redirect_uri).await?;

        let url = pending.authorization_url(&self.config.authorization_endpoint);
        self.notify(
            StatusKind::LoginStarted,
            &format!("Sign in at {}", url),
            None,
        );
        if let Err(err) = self.browser.open(&url) {
            warn!(error = %err, "Could not launch a browser, the authorization URL must be opened manually");
        }

        let cancel = CancellationToken::new();
        let waited = {
            let _attempt = AttemptGuard::register(&self.attempt, cancel.clone());
            listener.wait(self.config.timeout(), &cancel).await
        };
        listener.stop().await;

        let code = pending.accept(waited?)?;
        self.tokens
            .exchange_code(&code, &pending.callback_uri, pending.code_verifier())
            .await
    }

    async fn finish_acquisition(&self, mut token: TokenSet) -> Result<TokenSet> {
        self.populate_tenants(&mut token).await?;
        self.notify(
            StatusKind::Success,
            &format!("Authorized for {} tenant(s)", token.tenants.len()),
            Some(&token),
        );
        Ok(token)
    }

    /// Replace the tenants of `token` and store it
    ///
    /// On failure the token itself stays held; only discovery needs a retry.
    async fn populate_tenants(&self, token: &mut TokenSet) -> Result<()> {
        match self.tenants.list_tenants(&token.access_token).await {
            Ok(tenants) => {
                token.tenants = tenants;
                self.reconcile_selection(&token.tenants);
                *self.current.write() = Some(token.clone());
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Tenant discovery failed");
                self.notify(StatusKind::Failed, &err.to_string(), Some(&*token));
                Err(err)
            }
        }
    }

    fn reconcile_selection(&self, tenants: &[Tenant]) {
        let mut selected = self.selected_tenant.write();
        let still_connected =
            selected.map_or(false, |id| tenants.iter().any(|t| t.tenant_id == id));
        if !still_connected {
            *selected = tenants.first().map(|t| t.tenant_id);
        }
    }

    fn fail(&self, err: AuthError) -> AuthError {
        self.set_state(AuthState::Failed);
        let kind = match err {
            AuthError::AuthTimeout(_) => StatusKind::Timeout,
            _ => StatusKind::Failed,
        };
        let held = self.token();
        self.notify(kind, &err.to_string(), held.as_ref());
        err
    }

    fn set_state(&self, state: AuthState) {
        let mut current = self.state.write();
        if *current != state {
            debug!(from = ?*current, to = ?state, "Auth state changed");
            *current = state;
        }
    }

    fn notify(&self, kind: StatusKind, message: &str, token: Option<&TokenSet>) {
        info!(?kind, "{}", message);
        if let Some(observer) = &self.observer {
            observer.on_status(&StatusEvent {
                kind,
                message: message.to_string(),
                token: token.cloned(),
            });
        }
    }
}

/// Publishes the waiting attempt to `cancel_login` until dropped
///
/// Dropping the login future mid-wait also clears it. The listener shuts
/// itself down when its last handle goes away.
struct AttemptGuard<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl<'a> AttemptGuard<'a> {
    fn register(slot: &'a Mutex<Option<CancellationToken>>, cancel: CancellationToken) -> Self {
        *slot.lock() = Some(cancel);
        Self { slot }
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}
