// avrctl test application -- CLI tool for exercising the controller
// against a real Denon/Marantz receiver.
//
// Usage:
//   avrctl-test-app --host 192.168.1.40 status
//   avrctl-test-app --host 192.168.1.40 --zone zone2 power on
//   avrctl-test-app --host 192.168.1.40 volume 45.5
//   avrctl-test-app --host 192.168.1.40 --zone zone2 input CD
//   avrctl-test-app --host 192.168.1.40 inputs
//   avrctl-test-app --host 192.168.1.40 watch --seconds 60
//
// Set RUST_LOG=avrctl=debug to watch the wire traffic.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use avrctl::{AvrBuilder, AvrEvent, Zone, INPUTS};

/// avrctl test application -- exercises the controller from the command line.
#[derive(Parser)]
#[command(name = "avrctl-test-app", version, about)]
struct Cli {
    /// Receiver hostname or IP (control port 23 implied).
    #[arg(long)]
    host: String,

    /// Zone to address: main, zone2, zone3, zone4.
    #[arg(long, default_value = "main")]
    zone: String,

    /// Seconds to wait for the initial refresh answers before reading
    /// state.
    #[arg(long, default_value_t = 2)]
    settle: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the zone's power, mute, volume, and source.
    Status,
    /// Switch the zone's power.
    Power {
        /// "on" or "off".
        state: String,
    },
    /// Switch the zone's mute.
    Mute {
        /// "on" or "off".
        state: String,
    },
    /// Set the zone's volume (0.5 steps).
    Volume { level: f64 },
    /// Select the zone's input source by catalog id.
    Input { id: String },
    /// List the known source inputs.
    Inputs,
    /// Subscribe to receiver events and print them as they arrive.
    Watch {
        /// How long to watch before exiting.
        #[arg(long, default_value_t = 30)]
        seconds: u64,
    },
}

fn parse_on_off(state: &str) -> Result<bool> {
    match state {
        "on" => Ok(true),
        "off" => Ok(false),
        other => bail!("expected \"on\" or \"off\", got {other:?}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avrctl=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let zone: Zone = cli
        .zone
        .parse()
        .with_context(|| format!("invalid --zone {:?}", cli.zone))?;

    // Inputs needs no connection.
    if let Command::Inputs = cli.command {
        for input in INPUTS {
            println!("{:10} {}", input.id, input.label);
        }
        return Ok(());
    }

    let controller = AvrBuilder::new(&cli.host)
        .build()
        .await
        .with_context(|| format!("connecting to {}", cli.host))?;

    match cli.command {
        Command::Inputs => unreachable!("handled above"),
        Command::Status => {
            // Answers to the connect-time refresh arrive asynchronously.
            tokio::time::sleep(Duration::from_secs(cli.settle)).await;

            println!("zone:   {zone}");
            println!("power:  {}", on_off(controller.get_power_state(zone).await));
            println!("mute:   {}", on_off(controller.get_mute_state(zone).await));
            match controller.get_volume(zone).await {
                Some(level) => println!("volume: {level} (max {})", controller.max_volume().await),
                None => println!("volume: -"),
            }
            match controller.get_input_source(zone).await {
                Some(input) => println!("source: {input}"),
                None => println!("source: -"),
            }
        }
        Command::Power { state } => {
            controller.set_power_state(zone, parse_on_off(&state)?).await?;
            println!("power {state} sent to {zone}");
        }
        Command::Mute { state } => {
            controller.set_mute_state(zone, parse_on_off(&state)?).await?;
            println!("mute {state} sent to {zone}");
        }
        Command::Volume { level } => {
            controller.set_volume(zone, level).await?;
            println!("volume {level} sent to {zone}");
        }
        Command::Input { id } => {
            controller.set_input_source(zone, &id).await?;
            println!("input {id} sent to {zone}");
        }
        Command::Watch { seconds } => {
            let mut events = controller.subscribe();
            let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
            println!("watching for {seconds}s (ctrl-c to stop)...");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => break,
                    event = events.recv() => match event {
                        Ok(AvrEvent::PowerChanged { zone, on }) => {
                            println!("power   {zone}: {}", on_off(on));
                        }
                        Ok(AvrEvent::MuteChanged { zone, on }) => {
                            println!("mute    {zone}: {}", on_off(on));
                        }
                        Ok(AvrEvent::VolumeChanged { zone, level }) => {
                            println!("volume  {zone}: {level}");
                        }
                        Ok(AvrEvent::MaxVolumeChanged { level }) => {
                            println!("max volume: {level}");
                        }
                        Ok(AvrEvent::InputChanged { zone, input }) => {
                            println!("source  {zone}: {input}");
                        }
                        Ok(AvrEvent::Connected) => println!("connected"),
                        Ok(AvrEvent::Disconnected) => {
                            println!("disconnected");
                            break;
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    }

    controller.disconnect().await?;
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
