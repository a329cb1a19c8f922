//! Command line front end.
//!
//! Every command except `serve` loads the settings file, applies one change
//! through the rotator and saves synchronously.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

use crate::config::{Config, ConfigStore};
use crate::probe;
use crate::proxy::{HttpTransport, ProxyServer, ServerError, TimeoutConfig};
use crate::rotation::{
    redact_key, Endpoint, EndpointDraft, EndpointId, EndpointIntent, IntentOutcome, RotationMode,
    RotationState, Rotator, SwitchPolicy,
};
use crate::settings::{DebouncedSaver, JsonFileStore, SettingsStore};
use crate::transfer::ExportDocument;

#[derive(Parser, Debug)]
#[command(name = "api-rotator")]
#[command(
    version,
    about = "Rotate requests across OpenAI-compatible API endpoints with failover"
)]
#[command(after_help = r#"EXAMPLES:
    # Register two endpoints and start the proxy
    api-rotator add primary https://api.example.com/v1 --key sk-...
    api-rotator add backup https://backup.example.com --model gpt-4o-mini
    api-rotator serve

    # Stay on one endpoint until it fails
    api-rotator policy sticky

ENVIRONMENT VARIABLES:
    API_ROTATOR_LOG    Write logs to this path (suffixed with timestamp and pid)
    RUST_LOG           Log filter (default: info)
"#)]
pub struct Cli {
    /// Config file (default: <config_dir>/api-rotator/config.toml)
    #[arg(long, global = true, env = "API_ROTATOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Settings file holding the endpoint list
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the local rotating proxy
    Serve,

    /// Show endpoints and rotation settings
    List,

    /// Add an endpoint
    Add {
        name: String,
        /// Base URL, with or without a trailing /v1
        url: String,
        /// Bearer API key
        #[arg(long)]
        key: Option<String>,
        /// Model forced into every request body
        #[arg(long)]
        model: Option<String>,
        /// Add without enabling it
        #[arg(long)]
        disabled: bool,
    },

    /// Delete an endpoint
    Remove { target: String },

    /// Include an endpoint in rotation
    Enable { target: String },

    /// Exclude an endpoint from rotation
    Disable { target: String },

    /// Flip an endpoint's enabled flag
    Toggle { target: String },

    /// Put the rotation cursor on an endpoint
    Use { target: String },

    /// Move an endpoint one place up or down
    Move { target: String, direction: Direction },

    /// Rename an endpoint
    Rename { target: String, name: String },

    /// Set the selection mode
    Mode { mode: ModeArg },

    /// Set when the cursor moves
    Policy { policy: PolicyArg },

    /// Turn rotation on or off
    Rotation { state: Switch },

    /// Append endpoints from an export file
    Import { file: PathBuf },

    /// Write the endpoint list to a file, or stdout
    Export { file: Option<PathBuf> },

    /// List the models an endpoint offers
    Models { target: String },

    /// Check that an endpoint (or a bare URL) answers
    Test {
        target: String,
        /// Key to use instead of the endpoint's own
        #[arg(long)]
        key: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Sequential,
    Random,
}

impl From<ModeArg> for RotationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => RotationMode::Sequential,
            ModeArg::Random => RotationMode::Random,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    PerRequest,
    Sticky,
}

impl From<PolicyArg> for SwitchPolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::PerRequest => SwitchPolicy::PerRequest,
            PolicyArg::Sticky => SwitchPolicy::StickyUntilError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Switch {
    On,
    Off,
}

#[derive(Debug, Error, PartialEq)]
pub enum TargetError {
    #[error("No endpoint matches '{0}'")]
    Unknown(String),

    #[error("'{target}' matches several endpoints: {}", .matches.join(", "))]
    Ambiguous { target: String, matches: Vec<String> },
}

/// Resolve a user-supplied endpoint reference.
///
/// Tried in order: 1-based list position, full id, exact name, unique id
/// prefix.
pub fn resolve_target(state: &RotationState, target: &str) -> Result<EndpointId, TargetError> {
    let target = target.trim();

    if let Ok(position) = target.parse::<usize>() {
        if let Some(endpoint) = position.checked_sub(1).and_then(|i| state.endpoints.get(i)) {
            return Ok(endpoint.id);
        }
    }

    if let Ok(id) = target.parse::<EndpointId>() {
        if state.find(&id).is_some() {
            return Ok(id);
        }
    }

    let by_name: Vec<_> = state.endpoints.iter().filter(|e| e.name == target).collect();
    match by_name.as_slice() {
        [one] => return Ok(one.id),
        [] => {}
        many => {
            return Err(TargetError::Ambiguous {
                target: target.to_string(),
                matches: many.iter().map(|e| e.id.to_string()).collect(),
            })
        }
    }

    let by_prefix: Vec<_> = state
        .endpoints
        .iter()
        .filter(|e| !target.is_empty() && e.id.to_string().starts_with(target))
        .collect();
    match by_prefix.as_slice() {
        [one] => Ok(one.id),
        [] => Err(TargetError::Unknown(target.to_string())),
        many => Err(TargetError::Ambiguous {
            target: target.to_string(),
            matches: many.iter().map(|e| e.name.clone()).collect(),
        }),
    }
}

/// Human-readable endpoint table.
pub fn render_list(state: &RotationState) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Rotation: {}  mode: {}  policy: {}",
        if state.enabled { "on" } else { "off" },
        state.mode,
        state.switch_policy
    );

    if state.endpoints.is_empty() {
        out.push_str("No endpoints configured.\n");
        return out;
    }

    let current = state.current_endpoint().map(|e| e.id);
    for (index, endpoint) in state.endpoints.iter().enumerate() {
        let marker = if Some(endpoint.id) == current { "*" } else { " " };
        let id = endpoint.id.to_string();
        let _ = writeln!(
            out,
            "{} {:>2}. {:<20} {:<40} key={:<12} model={:<16} {} [{}]",
            marker,
            index + 1,
            endpoint.name,
            endpoint.base_url,
            endpoint.api_key.as_deref().map(redact_key).unwrap_or_else(|| "-".to_string()),
            endpoint.model.as_deref().unwrap_or("-"),
            if endpoint.enabled { "enabled" } else { "disabled" },
            &id[..8.min(id.len())],
        );
    }
    out
}

pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(Config::config_path);
    let config = Config::load_from(&config_path)?;
    let settings_path = cli.settings.clone().unwrap_or_else(|| config.settings_path());
    let store = Arc::new(JsonFileStore::new(settings_path, config.settings.key.clone()));

    match cli.command {
        Command::Serve => serve(config, config_path, store).await,
        command => run_command(command, &config, store.as_ref()).await,
    }
}

async fn serve(config: Config, config_path: PathBuf, store: Arc<JsonFileStore>) -> Result<()> {
    let state = store.load()?;
    tracing::info!(
        endpoints = state.endpoints.len(),
        enabled = state.enabled_count(),
        settings = %store.path().display(),
        "Loaded rotation settings"
    );

    let saver = Arc::new(DebouncedSaver::spawn(
        store.clone(),
        Duration::from_millis(config.settings.save_debounce_ms),
    ));
    let rotator = Rotator::new(state, saver.clone());
    let config_store = ConfigStore::new(config, config_path);

    #[cfg(unix)]
    config_store
        .spawn_reload_on_hangup()
        .context("Failed to install SIGHUP handler")?;

    let mut server = ProxyServer::new(config_store.clone(), rotator)?;
    let addr = server.try_bind(&config_store).await?;
    println!("api-rotator listening on http://{}", addr);

    let mut notices = server.events().subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(event) if event.is_warning() => tracing::warn!(notice = %event, "Rotation notice"),
                Ok(event) => tracing::info!(notice = %event, "Rotation notice"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Dropped rotation notices");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    finish_serving(server.run().await, &saver)
}

/// Persist the last debounce window, then report how serving ended. The
/// flush runs even when the server failed.
fn finish_serving(served: Result<(), ServerError>, saver: &DebouncedSaver) -> Result<()> {
    let flushed = saver
        .flush()
        .context("Failed to save rotation settings on shutdown");
    served?;
    flushed
}

async fn run_command(command: Command, config: &Config, store: &JsonFileStore) -> Result<()> {
    let rotator = Rotator::in_memory(store.load()?);
    let state = rotator.snapshot();
    let target_id = |target: &str| resolve_target(&state, target);

    let intent = match command {
        Command::Serve => bail!("serve cannot run as a one-shot command"),
        Command::List => {
            print!("{}", render_list(&state));
            return Ok(());
        }
        Command::Add {
            name,
            url,
            key,
            model,
            disabled,
        } => {
            let mut draft = EndpointDraft::new(name, url);
            draft.api_key = key;
            draft.model = model;
            draft.enabled = Some(!disabled);
            EndpointIntent::Add { draft }
        }
        Command::Remove { target } => EndpointIntent::Delete {
            id: target_id(&target)?,
        },
        Command::Enable { target } => EndpointIntent::SetEnabled {
            id: target_id(&target)?,
            enabled: true,
        },
        Command::Disable { target } => EndpointIntent::SetEnabled {
            id: target_id(&target)?,
            enabled: false,
        },
        Command::Toggle { target } => EndpointIntent::Toggle {
            id: target_id(&target)?,
        },
        Command::Use { target } => EndpointIntent::Select {
            id: target_id(&target)?,
        },
        Command::Move { target, direction } => {
            let id = target_id(&target)?;
            match direction {
                Direction::Up => EndpointIntent::MoveUp { id },
                Direction::Down => EndpointIntent::MoveDown { id },
            }
        }
        Command::Rename { target, name } => EndpointIntent::Rename {
            id: target_id(&target)?,
            name,
        },
        Command::Mode { mode } => EndpointIntent::SetMode { mode: mode.into() },
        Command::Policy { policy } => EndpointIntent::SetSwitchPolicy {
            policy: policy.into(),
        },
        Command::Rotation { state } => EndpointIntent::SetRotationEnabled {
            enabled: state == Switch::On,
        },
        Command::Import { file } => {
            let document = ExportDocument::read_from(&file)?;
            let summary = rotator.import(&document);
            store.save(&rotator.snapshot())?;
            println!(
                "Imported {} endpoint(s), skipped {} duplicate(s)",
                summary.added, summary.skipped
            );
            return Ok(());
        }
        Command::Export { file } => {
            let document = rotator.export();
            match file {
                Some(path) => {
                    document.write_to(&path)?;
                    println!(
                        "Exported {} endpoint(s) to {}",
                        document.api_list.len(),
                        path.display()
                    );
                }
                None => println!("{}", document.to_json()?),
            }
            return Ok(());
        }
        Command::Models { target } => {
            let id = target_id(&target)?;
            let Some(endpoint) = state.find(&id) else {
                bail!(TargetError::Unknown(target));
            };
            let transport = HttpTransport::new(TimeoutConfig::from(&config.defaults))?;
            let probe =
                probe::list_models(transport.client(), &endpoint.base_url, endpoint.bearer_key())
                    .await;
            if let Some(error) = &probe.error {
                println!("{}: {}", endpoint.name, error);
            }
            if probe.models.is_empty() {
                println!("No models found");
            }
            for model in &probe.models {
                println!("{}", model);
            }
            return Ok(());
        }
        Command::Test { target, key } => {
            let endpoint = match target_id(&target) {
                Ok(id) => state.find(&id).cloned(),
                Err(_) if target.starts_with("http://") || target.starts_with("https://") => None,
                Err(e) => return Err(e.into()),
            };
            let mut endpoint = match endpoint {
                Some(endpoint) => endpoint,
                None => Endpoint::from_draft(EndpointDraft::new(
                    target.clone(),
                    target.clone(),
                ))?,
            };
            if key.is_some() {
                endpoint.api_key = key;
            }

            let transport = HttpTransport::new(TimeoutConfig::from(&config.defaults))?;
            let report = probe::test_connection(transport.client(), &endpoint).await;
            if report.reachable {
                println!(
                    "{}: OK ({} model(s), {} ms)",
                    report.name,
                    report.model_count,
                    report.latency.as_millis()
                );
                return Ok(());
            }
            bail!(
                "{}: unreachable ({})",
                report.name,
                report.error.unwrap_or_else(|| "no response".to_string())
            );
        }
    };

    let outcome = rotator.apply(intent)?;
    store.save(&rotator.snapshot())?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

fn describe_outcome(outcome: &IntentOutcome) -> String {
    match outcome {
        IntentOutcome::Added(e) => format!("Added '{}' ({})", e.name, e.base_url),
        IntentOutcome::Updated(e) => format!(
            "Updated '{}' ({})",
            e.name,
            if e.enabled { "enabled" } else { "disabled" }
        ),
        IntentOutcome::Removed(e) => format!("Removed '{}'", e.name),
        IntentOutcome::Selected(e) => format!("Now using '{}'", e.name),
        IntentOutcome::Unchanged => "Nothing to change".to_string(),
        IntentOutcome::Settings => "Settings updated".to_string(),
    }
}
