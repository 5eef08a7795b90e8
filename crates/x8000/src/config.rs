//! CLI configuration: thin wrapper around `x8000_config`.
//!
//! Adds `GlobalOpts`-aware profile selection and the assembly of a
//! `Coordinator` from the active profile.

use std::path::PathBuf;

use tracing::{debug, warn};

use x8000_core::{Coordinator, Fleet};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use x8000_config::{Config, Profile, config_path};

/// Config file in effect: `--config` / `X8000_CONFIG`, else the platform default.
pub fn effective_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = effective_path(global);
    debug!(path = %path.display(), "loading config");
    Ok(x8000_config::load_config_from(&path)?)
}

pub fn save(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    Ok(x8000_config::save_config_to(&effective_path(global), cfg)?)
}

/// The loaded config plus the profile selected for this invocation.
pub struct Session {
    pub config: Config,
    pub profile_name: String,
}

impl Session {
    pub fn open(global: &GlobalOpts) -> Result<Self, CliError> {
        let config = load(global)?;
        let profile_name = config
            .profile(global.profile.as_deref())
            .map(|(name, _)| name.to_owned())
            .map_err(|_| profile_not_found(global, &config))?;
        Ok(Self {
            config,
            profile_name,
        })
    }

    pub fn profile(&self) -> &Profile {
        // `open` verified the profile exists.
        &self.config.profiles[&self.profile_name]
    }

    pub fn profile_mut(&mut self) -> &mut Profile {
        self.config
            .profiles
            .entry(self.profile_name.clone())
            .or_default()
    }

    /// The profile's fleet, rejecting an empty one.
    pub fn fleet(&self) -> Result<Fleet, CliError> {
        let fleet = x8000_config::profile_fleet(self.profile())?;
        if fleet.is_empty() {
            return Err(CliError::EmptyFleet {
                profile: self.profile_name.clone(),
            });
        }
        Ok(fleet)
    }

    /// Build a coordinator for the active profile. Nothing is started
    /// and no request is made.
    pub fn coordinator(&self, fleet: Fleet) -> Result<Coordinator, CliError> {
        let profile = self.profile();
        let defaults = &self.config.defaults;
        let account = x8000_config::profile_to_account(profile, &self.profile_name, defaults)?;
        let timing = x8000_config::profile_to_coordinator_config(profile, defaults)?;
        Ok(Coordinator::from_account(&account, timing, fleet)?)
    }

    /// Write the coordinator's current refresh token to the keyring.
    ///
    /// Every grant rotates the refresh token, so this must run after any
    /// command that obtained an access token.
    pub fn persist_refresh_token(&self, coordinator: &Coordinator) {
        let Some(token) = coordinator.credentials().current() else {
            return;
        };
        match x8000_config::store_refresh_token(&self.profile_name, &token.refresh_token) {
            Ok(()) => debug!(generation = token.generation, "refresh token stored"),
            Err(e) => warn!(error = %e, "could not store the rotated refresh token"),
        }
    }
}

fn profile_not_found(global: &GlobalOpts, config: &Config) -> CliError {
    let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
    available.sort_unstable();
    CliError::ProfileNotFound {
        name: global
            .profile
            .clone()
            .or_else(|| config.default_profile.clone())
            .unwrap_or_else(|| "default".into()),
        available: if available.is_empty() {
            "(none)".into()
        } else {
            available.join(", ")
        },
        path: effective_path(global).display().to_string(),
    }
}
