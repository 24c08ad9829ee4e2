use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;

use ibmvpc_core::provider::Provider;
use ibmvpc_core::resource::{Resource, ResourceId, State, Value};
use ibmvpc_core::wait::{Observation, StateChangeConf};
use ibmvpc_provider::convert::{json_to_value, value_to_json};
use ibmvpc_provider::{IbmVpcProvider, ProviderConfig};

#[derive(Parser)]
#[command(name = "ibmvpc")]
#[command(about = "Manage IBM Cloud VPC resources and wait for their lifecycle states", long_about = None)]
struct Cli {
    /// Region to operate in (overrides IC_REGION)
    #[arg(long, global = true, env = "IBMVPC_REGION")]
    region: Option<String>,

    /// VPC API endpoint (overrides the regional default)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported resource and data source types
    Types {
        /// Also print each type's attributes
        #[arg(long)]
        attributes: bool,
    },
    /// Read the current state of a resource
    Read {
        resource_type: String,
        /// Provider identifier, e.g. "<server>/<nic>"
        identifier: String,
    },
    /// Create a resource
    Create {
        resource_type: String,
        /// Attribute as key=value; values are parsed as JSON when possible
        #[arg(short, long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Update a resource in place
    Update {
        resource_type: String,
        identifier: String,
        #[arg(short, long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Delete a resource
    Delete {
        resource_type: String,
        identifier: String,
        #[arg(short, long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Read a data source
    List {
        data_source: String,
        #[arg(short, long = "attr", value_name = "KEY=VALUE")]
        attrs: Vec<String>,
    },
    /// Poll a resource until its status reaches one of the target labels
    Wait {
        resource_type: String,
        identifier: String,
        /// Target status label; repeatable. "deleted" matches a removed resource
        #[arg(short, long = "status", required = true)]
        statuses: Vec<String>,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
        /// Seconds between two reads
        #[arg(long, default_value_t = 10)]
        interval: u64,
    },
}

/// Local name given to resources addressed from the command line
const CLI_RESOURCE_NAME: &str = "cli";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Types { attributes } => run_types(attributes),
        command => match build_provider(cli.region, cli.endpoint) {
            Ok(provider) => run_command(&provider, command).await,
            Err(e) => Err(e),
        },
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn build_provider(
    region: Option<String>,
    endpoint: Option<String>,
) -> Result<IbmVpcProvider, String> {
    let mut config = ProviderConfig::from_env();
    if let Some(region) = region {
        config = config.with_region(region);
    }
    if let Some(endpoint) = endpoint {
        config = config.with_endpoint(endpoint);
    }
    announce_provider(&mut std::io::stderr(), &config);
    IbmVpcProvider::new(&config).map_err(|e| e.to_string())
}

/// Status lines go to stderr; stdout carries only JSON
fn announce_provider(out: &mut impl Write, config: &ProviderConfig) {
    let _ = writeln!(
        out,
        "{}",
        format!("Using IBM Cloud VPC provider (region: {})", config.region).cyan()
    );
}

async fn run_command(provider: &IbmVpcProvider, command: Commands) -> Result<(), String> {
    match command {
        Commands::Types { attributes } => run_types(attributes),
        Commands::Read {
            resource_type,
            identifier,
        } => {
            let id = ResourceId::new(resource_type, CLI_RESOURCE_NAME);
            let state = provider
                .read(&id, &identifier)
                .await
                .map_err(|e| e.to_string())?;
            if !state.exists {
                eprintln!("{}", format!("{} ({}) not found", id, identifier).yellow());
                return Ok(());
            }
            print_state(&state)
        }
        Commands::Create {
            resource_type,
            attrs,
        } => {
            let resource = build_resource(&resource_type, &attrs)?;
            eprintln!("{}", format!("Creating {}...", resource.id).cyan());
            let state = provider
                .create(&resource)
                .await
                .map_err(|e| e.to_string())?;
            eprintln!("  {} {}", "✓".green(), resource.id);
            print_state(&state)
        }
        Commands::Update {
            resource_type,
            identifier,
            attrs,
        } => {
            let resource = build_resource(&resource_type, &attrs)?;
            let current = provider
                .read(&resource.id, &identifier)
                .await
                .map_err(|e| e.to_string())?;
            if !current.exists {
                return Err(format!("{} ({}) does not exist", resource.id, identifier));
            }
            eprintln!("{}", format!("Updating {}...", resource.id).cyan());
            let state = provider
                .update(&resource.id, &identifier, &current, &resource)
                .await
                .map_err(|e| e.to_string())?;
            eprintln!("  {} {}", "✓".green(), resource.id);
            print_state(&state)
        }
        Commands::Delete {
            resource_type,
            identifier,
            attrs,
        } => {
            let resource = build_resource(&resource_type, &attrs)?;
            eprintln!("{}", format!("Deleting {}...", resource.id).red().bold());
            provider
                .delete(&resource.id, &identifier, &resource)
                .await
                .map_err(|e| e.to_string())?;
            eprintln!("  {} {}", "✓".green(), resource.id);
            Ok(())
        }
        Commands::List { data_source, attrs } => {
            let resource = build_resource(&data_source, &attrs)?.with_read_only(true);
            let state = provider
                .read_data_source(&resource)
                .await
                .map_err(|e| e.to_string())?;
            print_state(&state)
        }
        Commands::Wait {
            resource_type,
            identifier,
            statuses,
            timeout,
            interval,
        } => {
            let id = ResourceId::new(resource_type, CLI_RESOURCE_NAME);
            let state = wait_for_status(
                provider,
                &id,
                &identifier,
                &statuses,
                Duration::from_secs(timeout),
                Duration::from_secs(interval),
            )
            .await?;
            match state {
                Some(state) => print_state(&state),
                None => {
                    eprintln!("{}", format!("{} ({}) is gone", id, identifier).green());
                    Ok(())
                }
            }
        }
    }
}

fn run_types(attributes: bool) -> Result<(), String> {
    for resource_type in ibmvpc_provider::resources::resource_types() {
        let kind = if resource_type.is_data_source() {
            "data source".yellow()
        } else {
            "resource".green()
        };
        println!("{} ({})", resource_type.name().cyan().bold(), kind);
        if !attributes {
            continue;
        }

        let schema = resource_type.schema();
        let mut names: Vec<&String> = schema.attributes.keys().collect();
        names.sort();
        for name in names {
            let attr = &schema.attributes[name];
            let mut flags = Vec::new();
            if attr.required {
                flags.push("required");
            }
            if attr.computed {
                flags.push("computed");
            }
            if attr.force_new {
                flags.push("force new");
            }
            println!("  • {} {}", name.bold(), flags.join(", ").dimmed());
        }
    }
    Ok(())
}

/// Poll `read` until the resource's status is one of `targets`
///
/// The label is the resource's `status` attribute, or `provisioning_status`
/// for types that report one. A resource that no longer exists reads as
/// `deleted`.
async fn wait_for_status(
    provider: &IbmVpcProvider,
    id: &ResourceId,
    identifier: &str,
    targets: &[String],
    timeout: Duration,
    interval: Duration,
) -> Result<Option<State>, String> {
    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
    let conf = StateChangeConf::new(&[], &targets, timeout)
        .with_delay(Duration::ZERO)
        .with_poll_interval(interval);

    conf.wait_for_state(|| async move {
        let state = provider.read(id, identifier).await?;
        Ok::<_, ibmvpc_core::provider::ProviderError>(status_observation(state))
    })
    .await
    .map_err(|e| e.to_string())
}

fn status_observation(state: State) -> Observation<State> {
    if !state.exists {
        return Observation::gone("deleted");
    }
    let status = ["status", "provisioning_status"]
        .iter()
        .find_map(|key| state.attributes.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    Observation::new(state, status)
}

fn build_resource(resource_type: &str, attrs: &[String]) -> Result<Resource, String> {
    let mut resource = Resource::new(resource_type, CLI_RESOURCE_NAME);
    for (key, value) in parse_attributes(attrs)? {
        resource = resource.with_attribute(key, value);
    }
    Ok(resource)
}

/// Parse `key=value` pairs
///
/// Values that parse as JSON keep their type (`true`, `30`, `["a","b"]`,
/// `{"address":"10.0.0.5"}`); anything else is a string.
fn parse_attributes(attrs: &[String]) -> Result<HashMap<String, Value>, String> {
    let mut attributes = HashMap::new();
    for attr in attrs {
        let Some((key, raw)) = attr.split_once('=') else {
            return Err(format!("Invalid attribute '{}': expected KEY=VALUE", attr));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Invalid attribute '{}': empty key", attr));
        }
        let value = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .and_then(|json| json_to_value(&json))
            .unwrap_or_else(|| Value::String(raw.to_string()));
        attributes.insert(key.to_string(), value);
    }
    Ok(attributes)
}

fn print_state(state: &State) -> Result<(), String> {
    let attributes: serde_json::Map<String, serde_json::Value> = state
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    let output = serde_json::json!({
        "identifier": state.identifier,
        "attributes": attributes,
    });
    let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}
