//! OAuth token maintenance.

use std::time::Duration;

use secrecy::ExposeSecret;

use x8000_api::{OAuthClient, TransportConfig, auth::DEFAULT_TOKEN_URL};
use x8000_config::SecretKind;

use crate::cli::{GlobalOpts, TokenArgs, TokenCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

pub async fn handle(session: &Session, args: TokenArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        TokenCommand::Exchange { code, redirect_uri } => {
            exchange(session, &code, &redirect_uri, global).await
        }
        TokenCommand::Refresh => refresh(session, global).await,
    }
}

/// Trade a consent code for the first refresh token and keep it in the keyring.
async fn exchange(
    session: &Session,
    code: &str,
    redirect_uri: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let profile = session.profile();
    let name = &session.profile_name;

    let raw_url = profile.token_url.as_deref().unwrap_or(DEFAULT_TOKEN_URL);
    let token_url = raw_url.parse::<url::Url>().map_err(|_| CliError::Validation {
        field: "token_url".into(),
        reason: format!("invalid URL: {raw_url}"),
    })?;
    let transport = TransportConfig {
        timeout: Duration::from_secs(profile.timeout.unwrap_or(session.config.defaults.timeout)),
        ..TransportConfig::default()
    };
    let secret = x8000_config::resolve_secret(profile, name, SecretKind::ClientSecret)?;
    let oauth = OAuthClient::new(transport.build_client()?, token_url, &profile.client_id, secret);

    let grant = oauth.exchange_code(code, redirect_uri).await?;
    let Some(refresh_token) = grant.refresh_token else {
        return Err(CliError::AuthFailed {
            message: "the token endpoint returned no refresh token".into(),
        });
    };
    x8000_config::store_secret(name, SecretKind::RefreshToken, refresh_token.expose_secret())?;

    output::print_output(
        &format!(
            "Refresh token stored for profile '{name}' (access token valid for {})",
            humantime::format_duration(grant.expires_in)
        ),
        global.quiet,
    );
    Ok(())
}

async fn refresh(session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    let coordinator = session.coordinator(x8000_core::Fleet::default())?;
    let token = coordinator.force_token_refresh().await?;
    session.persist_refresh_token(&coordinator);

    output::print_output(
        &format!(
            "Token generation {} valid until {}",
            token.generation,
            token.expires_at_utc.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        global.quiet,
    );
    Ok(())
}
