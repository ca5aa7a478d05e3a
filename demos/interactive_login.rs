/// Example: Xero login with the token lifecycle coordinator
///
/// Opens the system browser for consent, receives the redirect on a local
/// listener, then lists the connected organisations.
///
/// Setup:
/// 1. Create an app at https://developer.xero.com/app/manage with the
///    "Auth code with PKCE" grant
/// 2. Add http://localhost:8888/callback as a redirect URI
/// 3. export XERO_CLIENT_ID="your_client_id"
///
/// Run:
/// RUST_LOG=xero_pkce=debug cargo run --example interactive_login
use std::env;
use tracing_subscriber::EnvFilter;
use xero_pkce::prelude::*;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("xero_pkce=info")),
        )
        .init();

    let client_id = env::var("XERO_CLIENT_ID").expect(
        "XERO_CLIENT_ID environment variable not set. \
         Create an app at https://developer.xero.com/app/manage",
    );

    let config = OAuthConfig::xero(
        &client_id,
        "http://localhost:8888/callback",
        "openid profile email accounting.transactions offline_access",
    )
    .with_random_state()
    .with_timeout(120);

    let coordinator = TokenCoordinator::new(config)
        .expect("Invalid configuration")
        .with_observer(|event: &StatusEvent| println!("[{:?}] {}", event.kind, event.message));

    match coordinator.initialize(None).await {
        Ok(token) => {
            println!("\n✓ Authorized, access token valid until {}", token.expires_at_utc);
            for tenant in &token.tenants {
                println!("  {} ({}) {}", tenant.tenant_name, tenant.tenant_type, tenant.tenant_id);
            }
            if let Some(selected) = coordinator.selected_tenant_id() {
                println!("\nAPI calls will use tenant {}", selected);
            }

            // Persist this however the application stores secrets
            let saved = serde_json::to_string_pretty(&token).expect("Token serializes");
            println!("\nToken set is {} bytes of JSON", saved.len());
        }
        Err(AuthError::AuthTimeout(seconds)) => {
            eprintln!("\n✗ No redirect within {} seconds", seconds);
        }
        Err(e) => {
            eprintln!("\n✗ Authorization failed: {}", e);
            if e.requires_interactive_login() {
                eprintln!("  Run the example again to sign in");
            }
        }
    }
}
