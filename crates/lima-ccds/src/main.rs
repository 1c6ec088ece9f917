//! CLI entry point for the LimaCCDs device server.
//!
//! Starts a server from a configuration file, initialises the `LimaCCDs`
//! device and runs one request against it, or a line-oriented console so
//! writes persist across requests.
//!
//! ```bash
//! lima-ccds --config lima.toml read acq_mode
//! lima-ccds --config lima.toml write acq_mode accumulation
//! lima-ccds --config lima.toml cmd setDebugFlags 0x00FF1234
//! lima-ccds --config lima.toml console
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lima_ccds::attributes::{attribute_info, command_info, AttrValue, DataType};
use lima_ccds::{LimaCcds, LimaServer, ServerConfig, ATTRIBUTES, COMMANDS};
use std::io::BufRead;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lima-ccds")]
#[command(about = "Camera acquisition control device server", long_about = None)]
struct Cli {
    /// Server configuration file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Print values as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List attributes and commands
    Attributes,
    /// Show device state and status
    State,
    /// Show loaded plugins and registered device classes
    Plugins,
    /// Read an attribute
    Read {
        /// Attribute name
        name: String,
    },
    /// Write an attribute
    Write {
        /// Attribute name
        name: String,
        /// New value
        value: String,
    },
    /// Run a command
    Cmd {
        /// Command name
        name: String,
        /// Input argument, if the command takes one
        arg: Option<String>,
    },
    /// Read requests from stdin, one per line
    Console,
}

fn print_value(value: &AttrValue, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(value)?);
    } else if *value != AttrValue::Void {
        println!("{value}");
    }
    Ok(())
}

fn write(device: &LimaCcds, name: &str, text: &str) -> Result<()> {
    let info = attribute_info(name).with_context(|| format!("unknown attribute '{name}'"))?;
    device.write_attribute(name, AttrValue::parse(name, info.data_type, text)?)?;
    Ok(())
}

fn command(device: &LimaCcds, name: &str, arg: Option<&str>) -> Result<AttrValue> {
    let info = command_info(name).with_context(|| format!("unknown command '{name}'"))?;
    let arg = match (info.arg_in, arg) {
        (DataType::Void, _) => AttrValue::Void,
        (data_type, Some(text)) => AttrValue::parse(name, data_type, text)?,
        (_, None) => bail!("command '{name}' needs an argument"),
    };
    Ok(device.command_inout(name, arg)?)
}

fn print_state(device: &LimaCcds, json: bool) -> Result<()> {
    if json {
        let state = serde_json::json!({ "state": device.state(), "status": device.status() });
        println!("{state}");
    } else {
        println!("{}: {}", device.state(), device.status());
    }
    Ok(())
}

fn console(device: &LimaCcds, json: bool) -> Result<()> {
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        let outcome = match words.as_slice() {
            [] => continue,
            ["quit" | "exit"] => break,
            ["state"] => print_state(device, json),
            ["read", name] => device
                .read_attribute(name)
                .map_err(Into::into)
                .and_then(|v| print_value(&v, json)),
            ["write", name, value] => write(device, name, value),
            ["cmd", name] => command(device, name, None).and_then(|v| print_value(&v, json)),
            ["cmd", name, arg] => {
                command(device, name, Some(*arg)).and_then(|v| print_value(&v, json))
            }
            _ => Err(anyhow::anyhow!(
                "expected: read <attr> | write <attr> <value> | cmd <name> [arg] | state | quit"
            )),
        };
        if let Err(e) = outcome {
            eprintln!("error: {e:#}");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref())?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let server = LimaServer::start(config);

    match cli.command {
        Commands::Attributes => {
            if cli.json {
                let surface = serde_json::json!({ "attributes": ATTRIBUTES, "commands": COMMANDS });
                println!("{}", serde_json::to_string_pretty(&surface)?);
            } else {
                for attr in ATTRIBUTES {
                    println!(
                        "{:<20} {:?} {:?} {:?}",
                        attr.name, attr.data_type, attr.format, attr.access
                    );
                }
                for cmd in COMMANDS {
                    println!("{:<24} {:?} -> {:?}", cmd.name, cmd.arg_in, cmd.arg_out);
                }
            }
        }
        Commands::Plugins => {
            let registry = server.registry();
            println!("camera plugins: {:?}", registry.camera_names());
            println!("common plugins: {:?}", registry.common_names());
            println!("device classes: {:?}", server.classes().device_types());
            for failure in &server.report().failures {
                println!("failed: {failure}");
            }
        }
        Commands::State => print_state(&server.facade()?, cli.json)?,
        Commands::Read { name } => {
            let device = server.facade()?;
            print_value(&device.read_attribute(&name)?, cli.json)?;
        }
        Commands::Write { name, value } => write(&server.facade()?, &name, &value)?,
        Commands::Cmd { name, arg } => {
            let device = server.facade()?;
            print_value(&command(&device, &name, arg.as_deref())?, cli.json)?;
        }
        Commands::Console => console(&server.facade()?, cli.json)?,
    }

    Ok(())
}
