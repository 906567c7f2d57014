//! Password login, refresh-token exchange, logout

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::FutureExt;
use reqwest::Method;
use serde_json::{json, Value};
use url::Url;

use super::{RefreshCallback, RefreshedTokens, LOGIN_ENDPOINT, REFRESH_ENDPOINT};
use crate::api::client::join_endpoint;
use crate::api::{ApiClient, HttpRequest, Transport};
use crate::models::{Envelope, TokenGrant, UserProfile};

/// Tokens and profile from a login or refresh response.
struct Grant {
    access_token: String,
    refresh_token: String,
    user: Option<UserProfile>,
}

/// POST to a token endpoint (no bearer header) and decode the envelope.
///
/// `failure` is reported when the server rejects the request without a
/// message of its own.
async fn token_request(
    transport: &dyn Transport,
    url: Url,
    body: Value,
    failure: &str,
) -> Result<Grant> {
    let request = HttpRequest::new(Method::POST, url.as_str()).json(body);
    let resp = transport
        .execute(&request)
        .await
        .with_context(|| format!("Could not connect to {}", url))?;

    let envelope: Option<Envelope<TokenGrant>> = resp.json().ok();
    let message = envelope.as_ref().and_then(|e| e.message.clone());

    let data = match envelope {
        Some(env) if resp.is_success() && env.success => env.data,
        _ => bail!(
            "{}",
            message.unwrap_or_else(|| match resp.is_success() {
                true => format!("{}.", failure),
                false => format!("{} (HTTP {})", failure, resp.status),
            })
        ),
    };

    let data = data.context("response missing 'data'")?;
    let access_token = data
        .access_token
        .filter(|t| !t.is_empty())
        .context("response missing 'accessToken'")?;
    let refresh_token = data
        .refresh_token
        .filter(|t| !t.is_empty())
        .context("response missing 'refreshToken'")?;

    Ok(Grant {
        access_token,
        refresh_token,
        user: data.user,
    })
}

/// Refresh callback that exchanges the refresh token at `auth/refresh-token`.
///
/// Goes straight to the transport: routing it through `ApiClient` would
/// re-enter the refresh path on a 401 from the token endpoint itself.
pub fn refresh_callback(transport: Arc<dyn Transport>, base_url: Url) -> RefreshCallback {
    Arc::new(move |refresh_token: String| {
        let transport = Arc::clone(&transport);
        let base_url = base_url.clone();
        async move {
            let url = join_endpoint(&base_url, REFRESH_ENDPOINT)?;
            let grant = token_request(
                transport.as_ref(),
                url,
                json!({ "refreshToken": refresh_token }),
                "Refresh rejected",
            )
            .await
            .context("Refresh-token exchange failed")?;
            Ok(RefreshedTokens {
                access_token: grant.access_token,
                refresh_token: grant.refresh_token,
                user: grant.user,
            })
        }
        .boxed()
    })
}

/// Authenticate with email and password and store the resulting credentials.
pub async fn password_login(client: &ApiClient, email: &str, password: &str) -> Result<UserProfile> {
    if email.trim().is_empty() || password.is_empty() {
        bail!("Please enter both email and password.");
    }

    client.auth().clear_credentials();

    let url = client.endpoint_url(LOGIN_ENDPOINT)?;
    let grant = token_request(
        client.transport().as_ref(),
        url,
        json!({ "email": email.trim(), "password": password }),
        "Login failed",
    )
    .await?;

    let user = grant.user.unwrap_or_default();
    client
        .auth()
        .set_credentials(grant.access_token, grant.refresh_token, user.clone());
    tracing::info!(user_id = %user.id(), "Logged in");
    Ok(user)
}

/// Interactive login: prompts for missing email and for the password.
pub async fn login(client: &ApiClient, email: Option<String>, force: bool) -> Result<()> {
    if !force {
        if let Some(user) = client.auth().user() {
            println!(
                "Already logged in as {}. Use --force to re-authenticate.",
                display_name(&user)
            );
            return Ok(());
        }
    }

    let email = match email {
        Some(e) => e,
        None => {
            print!("Email: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin()
                .read_line(&mut line)
                .context("Failed to read email")?;
            line.trim().to_string()
        }
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let user = password_login(client, &email, &password).await?;
    println!("Login successful! Welcome, {}!", display_name(&user));
    Ok(())
}

/// Clear stored credentials.
pub fn logout(client: &ApiClient) {
    client.auth().clear_credentials();
    println!("You have been logged out successfully.");
}

/// Print current authentication status.
pub fn status(client: &ApiClient) {
    match client.auth().user() {
        Some(user) => {
            println!("Logged in:  yes");
            println!("Name:       {}", user.first_name().unwrap_or("(none)"));
            println!("Email:      {}", user.email().unwrap_or("N/A"));
            println!("User ID:    {}", user.id());
            println!("API:        {}", client.base_url());
        }
        None => {
            println!("Logged in:  no (run 'worklog login')");
            println!("API:        {}", client.base_url());
        }
    }
}

/// First name, falling back to email, then "User".
pub fn display_name(user: &UserProfile) -> String {
    user.first_name()
        .or_else(|| user.email())
        .unwrap_or("User")
        .to_string()
}
