//! Account discovery: plants, chronothermostats and their programs.

use tabled::Tabled;

use x8000_config::profile_fleet;
use x8000_core::FleetEntry;

use crate::cli::{DiscoverArgs, GlobalOpts};
use crate::config::{self, Session};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct DiscoveredRow {
    #[tabled(rename = "Plant")]
    plant: String,
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Programs")]
    programs: String,
}

fn row(entry: &FleetEntry) -> DiscoveredRow {
    DiscoveredRow {
        plant: entry.plant_id.to_string(),
        module: entry.id.to_string(),
        name: entry.name.clone(),
        programs: entry
            .programs
            .iter()
            .map(|p| format!("{} {}", p.number, p.name))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

/// Fold `found` into the profile's thermostats. Existing entries keep
/// their display name; programs are refreshed. Returns how many were new.
fn merge(thermostats: &mut Vec<x8000_config::Thermostat>, found: &[FleetEntry]) -> usize {
    let mut added = 0;
    for entry in found {
        let existing = thermostats.iter_mut().find(|t| {
            t.module_id == entry.id.as_str() && t.plant_id == entry.plant_id.as_str()
        });
        match existing {
            Some(t) => t.programs.clone_from(&entry.programs),
            None => {
                thermostats.push(entry.into());
                added += 1;
            }
        }
    }
    added
}

pub async fn handle(mut session: Session, args: DiscoverArgs, global: &GlobalOpts) -> Result<(), CliError> {
    // Discovery also works before any thermostat is configured.
    let fleet = profile_fleet(session.profile())?;
    let coordinator = session.coordinator(fleet)?;

    let result = coordinator.discover().await;
    session.persist_refresh_token(&coordinator);
    let found = result?;

    let rendered = output::render_list(&global.output, &found, row, |e| e.id.to_string())?;
    output::print_output(&rendered, global.quiet);

    if args.save {
        let added = merge(&mut session.profile_mut().thermostats, &found);
        config::save(global, &session.config)?;
        if !global.quiet {
            eprintln!(
                "Saved {} thermostat(s) to profile '{}' ({added} new)",
                found.len(),
                session.profile_name
            );
        }
    }
    Ok(())
}
