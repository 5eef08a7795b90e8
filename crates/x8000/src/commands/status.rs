//! One-shot poll of the configured fleet.

use std::sync::Arc;

use chrono::Utc;
use tabled::Tabled;

use x8000_core::{
    Coordinator, CycleOutcome, DeviceId, DeviceSnapshot, Diagnostics, NotificationKind,
};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config::Session;
use crate::error::CliError;
use crate::output::{self, or_dash};

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ThermostatRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Humidity")]
    humidity: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Program")]
    program: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "Online")]
    available: String,
}

fn row(snap: &Arc<DeviceSnapshot>, color: bool) -> ThermostatRow {
    ThermostatRow {
        id: snap.id.to_string(),
        name: snap.name.clone(),
        temperature: or_dash(snap.current_temperature.map(|t| format!("{t:.1}°C"))),
        humidity: or_dash(snap.current_humidity.map(|h| format!("{h:.0}%"))),
        target: or_dash(snap.target_temperature.map(|t| format!("{t:.1}°C"))),
        mode: or_dash(snap.mode),
        program: or_dash(snap.program.as_ref().map(|p| match p.name {
            Some(ref name) => format!("{} ({name})", p.number),
            None => p.number.to_string(),
        })),
        load: or_dash(snap.load_state),
        available: output::availability(snap.available, color),
    }
}

fn detail(snap: &Arc<DeviceSnapshot>) -> String {
    let now = Utc::now();
    let lines = [
        format!("ID:          {}", snap.id),
        format!("Plant:       {}", snap.plant_id),
        format!("Name:        {}", snap.name),
        format!("Available:   {}", snap.available),
        format!("Temperature: {}", or_dash(snap.current_temperature)),
        format!("Humidity:    {}", or_dash(snap.current_humidity)),
        format!("Target:      {}", or_dash(snap.target_temperature)),
        format!("Function:    {}", or_dash(snap.function)),
        format!("Mode:        {}", or_dash(snap.mode)),
        format!(
            "Boost left:  {}",
            or_dash(snap.boost_remaining(now).map(|d| format!("{} min", d.as_secs() / 60)))
        ),
        format!("Program:     {}", or_dash(snap.program.as_ref().map(|p| p.number))),
        format!("Load:        {}", or_dash(snap.load_state)),
        format!("Updated:     {}", or_dash(snap.last_updated)),
    ];
    lines.join("\n")
}

fn diagnostics_detail(d: &Diagnostics) -> String {
    let mut lines = vec![
        format!("Mode:              {}", d.mode),
        format!("Failures in a row: {}", d.consecutive_failures),
        format!("Cycles:            {}", d.cycles),
        format!("Devices online:    {}/{}", d.available, d.devices),
        format!("Token generation:  {}", or_dash(d.token_generation)),
        format!("Token expires:     {}", or_dash(d.token_expires_at)),
        format!("Refresh attempts:  {}", d.refresh_attempts),
        format!("Last poll:         {}", or_dash(d.last_poll)),
    ];
    if let Some(ref m) = d.requests {
        lines.push(format!(
            "Requests:          {} ({} ok, {} rate limited, {} auth, {} other)",
            m.requests, m.successes, m.rate_limited, m.auth_failures, m.other_failures
        ));
    }
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    session: &Session,
    args: StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let coordinator = session.coordinator(session.fleet()?)?;
    let device = args.device.map(DeviceId::new);
    if let Some(ref id) = device {
        // Fail before spending any call on an unknown id.
        coordinator.snapshot(id)?;
    }

    poll_once(&coordinator).await?;
    session.persist_refresh_token(&coordinator);

    let rendered = if args.diagnostics {
        output::render_single(
            &global.output,
            &coordinator.diagnostics(),
            diagnostics_detail,
            |d| d.mode.to_string(),
        )?
    } else if let Some(id) = device {
        output::render_single(&global.output, &coordinator.snapshot(&id)?, detail, |s| {
            s.id.to_string()
        })?
    } else {
        let color = output::should_color(&global.color);
        let snaps = coordinator.snapshots();
        output::render_list(&global.output, &snaps, |s| row(s, color), |s| s.id.to_string())?
    };
    output::print_output(&rendered, global.quiet);
    Ok(())
}

/// Run one poll cycle, turning an aborted cycle into an error.
async fn poll_once(coordinator: &Coordinator) -> Result<(), CliError> {
    let mut events = coordinator.notifications();
    match coordinator.poll_cycle().await {
        CycleOutcome::Completed { .. } => Ok(()),
        CycleOutcome::Aborted { source_id, kind } => {
            let message = events
                .try_recv()
                .map(|n| n.error_message)
                .unwrap_or_else(|_| format!("while polling {source_id}"));
            Err(match kind {
                NotificationKind::RateLimitExceeded => CliError::RateLimited { source_id },
                _ => CliError::AuthFailed { message },
            })
        }
    }
}
