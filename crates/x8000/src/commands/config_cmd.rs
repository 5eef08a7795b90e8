//! Config subcommand handlers. These run without opening a profile.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

const MASK: &str = "********";

/// Mask every plaintext secret in place.
fn redact(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        for secret in [
            &mut profile.client_secret,
            &mut profile.subscription_key,
            &mut profile.refresh_token,
        ] {
            if secret.is_some() {
                *secret = Some(MASK.into());
            }
        }
    }
}

fn as_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# could not render config: {e}"))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::effective_path(global).display().to_string(), false);
            Ok(())
        }
        ConfigCommand::Show => {
            let mut cfg = config::load(global)?;
            redact(&mut cfg);
            let out = output::render_single(&global.output, &cfg, as_toml, |_| "config".into())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use x8000_config::Profile;

    #[test]
    fn secrets_are_masked_and_env_names_kept() {
        let mut cfg = Config::default();
        cfg.profiles.insert(
            "home".into(),
            Profile {
                client_id: "abc".into(),
                client_secret: Some("s3cret".into()),
                subscription_key_env: Some("MY_KEY".into()),
                ..Profile::default()
            },
        );
        redact(&mut cfg);

        let text = as_toml(&cfg);
        assert!(!text.contains("s3cret"));
        assert!(text.contains(MASK));
        assert!(text.contains("MY_KEY"));
    }
}
