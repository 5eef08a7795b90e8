//! Long-running mode: background polling, push listener, event log.

use chrono::Utc;
use tokio::sync::{broadcast, oneshot};
use tracing::{info, warn};

use x8000_core::{Coordinator, CoreError, NotificationKind};

use crate::cli::{GlobalOpts, RunArgs};
use crate::config::{self, Session};
use crate::error::CliError;
use crate::webhook;

use super::util;

pub async fn handle(mut session: Session, args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let fleet = session.fleet()?;
    let plants = fleet.plants();

    // A stable id is needed before anything is registered with the cloud.
    if !args.no_webhook && session.profile().webhook.webhook_id.is_none() {
        session.profile_mut().webhook.webhook_id = Some(uuid::Uuid::new_v4().simple().to_string());
        config::save(global, &session.config)?;
        info!("generated a webhook id");
    }

    let coordinator = session.coordinator(fleet)?;
    spawn_token_persistence(&session, &coordinator);
    spawn_event_log(&coordinator, global.quiet)?;

    let webhook = session.profile().webhook.clone();
    let endpoint = if args.no_webhook {
        None
    } else {
        webhook.endpoint_url()
    };

    let server = match (args.no_webhook, webhook.webhook_id.as_deref()) {
        (false, Some(id)) => {
            let addr = args.listen.unwrap_or(webhook.listen);
            let app = webhook::router(id, coordinator.push_receiver());
            let (stop, stopped) = oneshot::channel::<()>();
            let handle = tokio::spawn(webhook::serve(addr, app, async move {
                let _ = stopped.await;
            }));
            Some((stop, handle))
        }
        _ => None,
    };

    // Register before the first poll so a cooldown cannot block it.
    if let Some(url) = endpoint {
        let pending = coordinator.keep_push_registered(plants.clone(), url).await;
        if !pending.is_empty() {
            warn!(plants = pending.len(), "push registration incomplete; retrying in the background");
        }
    } else if !args.no_webhook {
        warn!("webhook.external_url is not set; relying on polling only");
    }

    coordinator.start().await?;

    info!(devices = coordinator.fleet().len(), "running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if !args.keep_subscriptions {
        if let Some(ref external) = webhook.external_url {
            for plant in &plants {
                match coordinator.remove_push_endpoints(plant, external).await {
                    Ok(removed) => info!(%plant, removed, "push subscriptions removed"),
                    Err(CoreError::CoolingDown { remaining_secs }) => warn!(
                        %plant,
                        remaining_secs,
                        "cooling down; stale subscriptions are cleared on the next registration"
                    ),
                    Err(e) => warn!(%plant, error = %e, "could not remove push subscription"),
                }
            }
        }
    }

    if let Some((stop, handle)) = server {
        let _ = stop.send(());
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "webhook listener failed"),
            Err(e) => warn!(error = %e, "webhook listener panicked"),
        }
    }

    coordinator.shutdown().await;
    session.persist_refresh_token(&coordinator);
    Ok(())
}

/// Store every rotated refresh token as soon as it is issued.
fn spawn_token_persistence(session: &Session, coordinator: &Coordinator) {
    let profile_name = session.profile_name.clone();
    let mut tokens = coordinator.credentials().subscribe();
    tokio::spawn(async move {
        while tokens.changed().await.is_ok() {
            let Some(token) = tokens.borrow_and_update().clone() else {
                continue;
            };
            if let Err(e) = x8000_config::store_refresh_token(&profile_name, &token.refresh_token) {
                warn!(error = %e, "could not store the rotated refresh token");
            }
        }
    });
}

/// Print device changes and account notifications as they happen.
fn spawn_event_log(coordinator: &Coordinator, quiet: bool) -> Result<(), CliError> {
    if !quiet {
        for id in coordinator.fleet().ids() {
            coordinator.observe(id, |snap: &x8000_core::DeviceSnapshot| {
                println!("{}", util::summarize(snap, Utc::now()));
            })?;
        }
    }

    let mut events = coordinator.notifications();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(n) => {
                    match n.kind {
                        NotificationKind::CooldownCleared => {
                            info!("cooldown cleared, normal polling resumed");
                        }
                        kind => warn!(
                            %kind,
                            source = %n.source_id,
                            cooldown_minutes = n.cooldown_minutes,
                            "{}",
                            n.error_message
                        ),
                    }
                    if !quiet {
                        eprintln!("[{}] {}: {}", n.emitted_at.format("%H:%M:%S"), n.kind, n.source_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification log fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Ok(())
}
