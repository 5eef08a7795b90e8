//! Manage C2C push registrations on the account.

use tabled::Tabled;

use x8000_api::models::Subscription;
use x8000_core::Fleet;

use crate::cli::{GlobalOpts, SubscriptionsArgs, SubscriptionsCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct SubscriptionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Plant")]
    plant: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
}

fn row(sub: &Subscription) -> SubscriptionRow {
    SubscriptionRow {
        id: sub.subscription_id.clone(),
        plant: sub.plant_id.clone(),
        endpoint: sub.endpoint_url.clone(),
    }
}

fn not_configured(field: &str) -> CliError {
    CliError::Validation {
        field: field.into(),
        reason: "set webhook.external_url and run `x8000 run` once to generate webhook.webhook_id"
            .into(),
    }
}

pub async fn handle(
    session: Session,
    args: SubscriptionsArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // Subscriptions are account-level; no thermostat has to be configured.
    let coordinator = session.coordinator(Fleet::default())?;
    let webhook = &session.profile().webhook;

    let result: Result<(), CliError> = match args.command {
        SubscriptionsCommand::List => match coordinator.list_push_endpoints().await {
            Ok(subs) => {
                let rendered =
                    output::render_list(&global.output, &subs, row, |s| s.subscription_id.clone())?;
                output::print_output(&rendered, global.quiet);
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        SubscriptionsCommand::Add { plant } => {
            let url = webhook
                .endpoint_url()
                .ok_or_else(|| not_configured("webhook.webhook_id"))?;
            let mut outcome = Ok(());
            for plant in util::target_plants(&session, plant)? {
                match coordinator.register_push_endpoint(&plant, &url).await {
                    Ok(id) => output::print_output(&format!("{plant}: {id}"), global.quiet),
                    Err(e) => {
                        outcome = Err(e.into());
                        break;
                    }
                }
            }
            outcome
        }
        SubscriptionsCommand::Remove { plant } => {
            let external = webhook
                .external_url
                .as_deref()
                .ok_or_else(|| not_configured("webhook.external_url"))?;
            let mut outcome = Ok(());
            for plant in util::target_plants(&session, plant)? {
                match coordinator.remove_push_endpoints(&plant, external).await {
                    Ok(removed) => {
                        output::print_output(&format!("{plant}: removed {removed}"), global.quiet);
                    }
                    Err(e) => {
                        outcome = Err(e.into());
                        break;
                    }
                }
            }
            outcome
        }
    };

    session.persist_refresh_token(&coordinator);
    result
}
