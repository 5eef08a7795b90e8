//! Thermostat write commands. Each one is a single status write.

use x8000_core::{BoostDuration, ClimateMode, Command as CoreCommand, DeviceId, Hold};

use crate::cli::{GlobalOpts, ModeArg, SetArgs, SetCommand};
use crate::config::Session;
use crate::error::CliError;
use crate::output;

use super::util;

fn to_core(command: SetCommand) -> Result<CoreCommand, CliError> {
    Ok(match command {
        SetCommand::Temperature {
            device,
            target,
            hold,
        } => CoreCommand::SetTemperature {
            device: DeviceId::new(device),
            target,
            hold: util::parse_hold(&hold)?,
        },
        SetCommand::Boost { device, minutes } => {
            let minutes: u32 = minutes.parse().map_err(|_| CliError::Validation {
                field: "--minutes".into(),
                reason: format!("not a number: {minutes}"),
            })?;
            CoreCommand::SetBoost {
                device: DeviceId::new(device),
                duration: BoostDuration::try_from(minutes)?,
            }
        }
        SetCommand::CancelBoost { device } => CoreCommand::CancelBoost {
            device: DeviceId::new(device),
        },
        SetCommand::Program { device, number } => CoreCommand::SetProgram {
            device: DeviceId::new(device),
            program: number,
        },
        SetCommand::Off { device, hold } => CoreCommand::TurnOff {
            device: DeviceId::new(device),
            hold: util::parse_hold(&hold)?,
        },
        SetCommand::Mode { device, mode } => CoreCommand::SetMode {
            device: DeviceId::new(device),
            mode: match mode {
                ModeArg::Auto => ClimateMode::Auto,
                ModeArg::Heat => ClimateMode::Heat,
                ModeArg::Cool => ClimateMode::Cool,
                ModeArg::Off => ClimateMode::Off,
            },
        },
    })
}

fn describe(command: &CoreCommand) -> String {
    match command {
        CoreCommand::SetTemperature { target, hold, .. } => match hold {
            Hold::Indefinitely => format!("target {target:.1}°C"),
            Hold::For(d) => format!(
                "target {target:.1}°C for {}",
                humantime::format_duration(*d)
            ),
            Hold::Until(end) => format!("target {target:.1}°C until {}", end.format("%Y-%m-%d %H:%M")),
        },
        CoreCommand::SetBoost { duration, .. } => format!("boost for {duration}"),
        CoreCommand::CancelBoost { .. } => "boost cancelled".into(),
        CoreCommand::SetProgram { program, .. } => format!("program {program}"),
        CoreCommand::TurnOff { .. } => "off".into(),
        CoreCommand::SetMode { mode, .. } => format!("mode {mode}"),
    }
}

pub async fn handle(session: &Session, args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let command = to_core(args.command)?;
    let coordinator = session.coordinator(session.fleet()?)?;
    let device = command.device().clone();
    let summary = describe(&command);

    let result = coordinator.execute(command).await;
    session.persist_refresh_token(&coordinator);
    result?;

    output::print_output(&format!("{device}: {summary}"), global.quiet);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cli::HoldArgs;

    #[test]
    fn boost_minutes_are_checked() {
        let ok = to_core(SetCommand::Boost {
            device: "sala".into(),
            minutes: "60".into(),
        })
        .unwrap();
        assert_eq!(
            ok,
            CoreCommand::SetBoost {
                device: DeviceId::new("sala"),
                duration: BoostDuration::Minutes60,
            }
        );
        assert!(
            to_core(SetCommand::Boost {
                device: "sala".into(),
                minutes: "45".into(),
            })
            .is_err()
        );
    }

    #[test]
    fn temperature_with_hold_describes_itself() {
        let command = to_core(SetCommand::Temperature {
            device: "sala".into(),
            target: 21.5,
            hold: HoldArgs {
                hold_for: Some("2h".into()),
                until: None,
            },
        })
        .unwrap();
        assert_eq!(describe(&command), "target 21.5°C for 2h");
    }
}
