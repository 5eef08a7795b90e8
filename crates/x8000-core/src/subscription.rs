// ── C2C push registration ──
//
// Subscribing a plant twice yields 409 Conflict. Stale registrations
// pointing at our webhook path are removed and the subscribe is retried
// once. Registrations owned by other integrations are left alone.

use tracing::{debug, info, warn};

use x8000_api::models::Subscription;
use x8000_api::{AccessToken, Error};

use crate::api::ThermostatApi;
use crate::model::PlantId;

/// Path segment identifying endpoints served by this installation.
pub const WEBHOOK_PATH: &str = "/api/webhook/";

/// Whether `sub` belongs to `plant` and points at our webhook path,
/// optionally restricted to one external base URL.
pub fn is_ours(sub: &Subscription, plant: &PlantId, external_url: Option<&str>) -> bool {
    sub.plant_id == plant.as_str()
        && sub.endpoint_url.contains(WEBHOOK_PATH)
        && external_url.is_none_or(|base| sub.endpoint_url.contains(base))
}

/// Subscribe `endpoint_url`, clearing our stale registrations on conflict.
pub(crate) async fn register(
    api: &dyn ThermostatApi,
    token: &AccessToken,
    plant: &PlantId,
    endpoint_url: &str,
) -> Result<String, Error> {
    match api.subscribe(plant, endpoint_url, token).await {
        Ok(id) => {
            info!(plant = %plant, subscription = %id, "push endpoint registered");
            return Ok(id);
        }
        Err(e) if e.is_conflict() => {
            warn!(plant = %plant, "push registration conflict, clearing stale subscriptions");
        }
        Err(e) => return Err(e),
    }

    let stale: Vec<Subscription> = api
        .list_subscriptions(token)
        .await?
        .into_iter()
        .filter(|sub| is_ours(sub, plant, None))
        .collect();
    if stale.is_empty() {
        warn!(plant = %plant, "conflict is not from one of our subscriptions");
    }
    delete_each(api, token, plant, &stale).await?;

    let id = api.subscribe(plant, endpoint_url, token).await?;
    info!(plant = %plant, subscription = %id, "push endpoint registered after cleanup");
    Ok(id)
}

/// Remove every registration of `plant` pointing at `external_url`.
/// Returns how many were deleted.
pub(crate) async fn remove_all(
    api: &dyn ThermostatApi,
    token: &AccessToken,
    plant: &PlantId,
    external_url: &str,
) -> Result<usize, Error> {
    let ours: Vec<Subscription> = api
        .list_subscriptions(token)
        .await?
        .into_iter()
        .filter(|sub| is_ours(sub, plant, Some(external_url)))
        .collect();
    delete_each(api, token, plant, &ours).await
}

/// Delete `subs`, skipping individual failures unless they concern the
/// whole account.
async fn delete_each(
    api: &dyn ThermostatApi,
    token: &AccessToken,
    plant: &PlantId,
    subs: &[Subscription],
) -> Result<usize, Error> {
    let mut deleted = 0;
    for sub in subs {
        debug!(subscription = %sub.subscription_id, endpoint = %sub.endpoint_url, "deleting subscription");
        match api.unsubscribe(plant, &sub.subscription_id, token).await {
            Ok(()) => deleted += 1,
            Err(e) if e.is_account_wide() => return Err(e),
            Err(e) => {
                warn!(subscription = %sub.subscription_id, error = %e, "failed to delete subscription");
            }
        }
    }
    Ok(deleted)
}
