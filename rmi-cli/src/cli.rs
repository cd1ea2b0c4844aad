use std::{ops::ControlFlow, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inquire::CustomType;
use log::info;
use rmi_core::{Config, Driver, Fetcher, LoopPacket, RmiService, WeatherService, config::ConfigNumber};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "rmi", version, about = "RMI (Belgium) weather fetcher")]
pub struct Cli {
    /// Config file; defaults to config.toml in the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll RMI every `poll_interval` seconds and print each packet as a JSON line.
    Poll {
        /// Stop after this many packets.
        #[arg(long)]
        count: Option<usize>,
    },

    /// Fetch once and print the packet.
    Once,

    /// Print the effective output -> source field map.
    FieldMap,

    /// Interactively set the location and poll interval.
    Configure,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::Poll { count } => {
                let driver = build_driver(&config)?;
                info!("starting {} driver", driver.hardware_name());

                let mut emitted = 0usize;
                let mut print_err = None;
                driver
                    .run(|packet| {
                        if let Err(e) = print_packet(&packet) {
                            print_err = Some(e);
                            return ControlFlow::Break(());
                        }
                        emitted += 1;
                        match count {
                            Some(n) if emitted >= n => ControlFlow::Break(()),
                            _ => ControlFlow::Continue(()),
                        }
                    })
                    .await;

                if let Some(e) = print_err {
                    return Err(e);
                }
            }
            Command::Once => {
                let driver = build_driver(&config)?;
                print_packet(&driver.next_packet().await)?;
            }
            Command::FieldMap => {
                for (output, source) in config.fetcher_config().effective_field_map().iter() {
                    println!("{output} = {source}");
                }
            }
            Command::Configure => {
                configure(config, &config_path)?;
            }
        }

        Ok(())
    }
}

fn build_driver(config: &Config) -> Result<Driver> {
    let rmi = config.fetcher_config();
    let service: Arc<dyn WeatherService> = Arc::new(RmiService::new(rmi.user_agent()));
    let fetcher = Fetcher::new(&rmi, service).context(
        "Invalid [rmi] configuration.\n\
         Hint: run `rmi configure` to set latitude and longitude.",
    )?;
    Ok(Driver::new(fetcher))
}

fn print_packet(packet: &LoopPacket) -> Result<()> {
    let line = serde_json::to_string(packet).context("Failed to serialize packet")?;
    println!("{line}");
    Ok(())
}

fn configure(mut config: Config, path: &std::path::Path) -> Result<()> {
    let current = |n: &Option<ConfigNumber>, option: &'static str| n.as_ref().and_then(|v| v.to_f64(option).ok());

    let latitude = prompt_number("Latitude:", current(&config.rmi.latitude, "latitude"))?;
    let longitude = prompt_number("Longitude:", current(&config.rmi.longitude, "longitude"))?;
    let poll_interval =
        prompt_number("Poll interval (seconds):", current(&config.rmi.poll_interval, "poll_interval").or(Some(60.0)))?;

    config.rmi.latitude = Some(latitude.into());
    config.rmi.longitude = Some(longitude.into());
    config.rmi.poll_interval = Some(poll_interval.into());
    config.rmi.poll_interval()?;

    config.save_to(path)?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn prompt_number(message: &str, default: Option<f64>) -> Result<f64> {
    let mut prompt = CustomType::<f64>::new(message).with_error_message("Please enter a number");
    if let Some(value) = default {
        prompt = prompt.with_default(value);
    }
    prompt.prompt().with_context(|| format!("Failed to read {message}"))
}
