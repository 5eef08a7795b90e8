// ── Seams to the cloud service ──
//
// The coordinator and credential manager talk to the network only
// through these two traits, so tests can drive them with scripted
// implementations under paused time.

use async_trait::async_trait;
use secrecy::SecretString;

use x8000_api::models::{
    Chronothermostat, Plant, Program, StatusUpdate, Subscription, TopologyPlant,
};
use x8000_api::{AccessToken, ApiClient, Error, MetricsSnapshot, OAuthClient, TokenGrant};

use crate::model::{DeviceId, PlantId};

/// Device-facing operations of the Smarther v2 API.
#[async_trait]
pub trait ThermostatApi: Send + Sync {
    async fn plants(&self, token: &AccessToken) -> Result<Vec<Plant>, Error>;

    async fn topology(&self, plant: &PlantId, token: &AccessToken) -> Result<TopologyPlant, Error>;

    async fn program_list(
        &self,
        plant: &PlantId,
        device: &DeviceId,
        token: &AccessToken,
    ) -> Result<Vec<Program>, Error>;

    async fn chronothermostat_status(
        &self,
        plant: &PlantId,
        device: &DeviceId,
        token: &AccessToken,
    ) -> Result<Chronothermostat, Error>;

    async fn set_chronothermostat_status(
        &self,
        plant: &PlantId,
        device: &DeviceId,
        update: &StatusUpdate,
        token: &AccessToken,
    ) -> Result<(), Error>;

    async fn list_subscriptions(&self, token: &AccessToken) -> Result<Vec<Subscription>, Error>;

    async fn subscribe(
        &self,
        plant: &PlantId,
        endpoint_url: &str,
        token: &AccessToken,
    ) -> Result<String, Error>;

    async fn unsubscribe(
        &self,
        plant: &PlantId,
        subscription_id: &str,
        token: &AccessToken,
    ) -> Result<(), Error>;

    /// Request counters, when the implementation keeps them.
    fn metrics(&self) -> Option<MetricsSnapshot> {
        None
    }
}

/// Issues access tokens from a refresh token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, Error>;
}

#[async_trait]
impl ThermostatApi for ApiClient {
    async fn plants(&self, token: &AccessToken) -> Result<Vec<Plant>, Error> {
        ApiClient::plants(self, token).await
    }

    async fn topology(&self, plant: &PlantId, token: &AccessToken) -> Result<TopologyPlant, Error> {
        ApiClient::topology(self, plant.as_str(), token).await
    }

    async fn program_list(
        &self,
        plant: &PlantId,
        device: &DeviceId,
        token: &AccessToken,
    ) -> Result<Vec<Program>, Error> {
        ApiClient::program_list(self, plant.as_str(), device.as_str(), token).await
    }

    async fn chronothermostat_status(
        &self,
        plant: &PlantId,
        device: &DeviceId,
        token: &AccessToken,
    ) -> Result<Chronothermostat, Error> {
        ApiClient::chronothermostat_status(self, plant.as_str(), device.as_str(), token).await
    }

    async fn set_chronothermostat_status(
        &self,
        plant: &PlantId,
        device: &DeviceId,
        update: &StatusUpdate,
        token: &AccessToken,
    ) -> Result<(), Error> {
        ApiClient::set_chronothermostat_status(
            self,
            plant.as_str(),
            device.as_str(),
            update,
            token,
        )
        .await
    }

    async fn list_subscriptions(&self, token: &AccessToken) -> Result<Vec<Subscription>, Error> {
        ApiClient::subscriptions(self, token).await
    }

    async fn subscribe(
        &self,
        plant: &PlantId,
        endpoint_url: &str,
        token: &AccessToken,
    ) -> Result<String, Error> {
        ApiClient::subscribe(self, plant.as_str(), endpoint_url, token).await
    }

    async fn unsubscribe(
        &self,
        plant: &PlantId,
        subscription_id: &str,
        token: &AccessToken,
    ) -> Result<(), Error> {
        ApiClient::unsubscribe(self, plant.as_str(), subscription_id, token).await
    }

    fn metrics(&self) -> Option<MetricsSnapshot> {
        Some(ApiClient::metrics(self))
    }
}

#[async_trait]
impl TokenSource for OAuthClient {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, Error> {
        OAuthClient::refresh(self, refresh_token).await
    }
}
