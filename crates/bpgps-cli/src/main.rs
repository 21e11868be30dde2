use std::path::{Path, PathBuf};

use bpgps_dispatch::{
    address::{format_address, navigation_uri},
    boot_action, BootAction, CommandLauncher, Decision, DispatchMessage, DispatchRouter,
    HistoryEntry, HistoryLog, NavigationLauncher, Preferences, ServiceConfig, StatusStore,
    StoragePaths,
};
use bpgps_util::now_millis;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

#[derive(Parser)]
#[command(name = "bpgps", version, about = "Dispatch navigation state and tools")]
struct Cli {
    /// Directory holding config, prefs, status and history (default: $BPGPS_DATA_DIR/state)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Signed-in officer (RCN)
    Officer {
        #[command(subcommand)]
        cmd: OfficerCmd,
    },
    /// Print the last status the service reported
    Status,
    /// Dispatch history
    History {
        #[command(subcommand)]
        cmd: HistoryCmd,
    },
    /// Address helpers
    Address {
        #[command(subcommand)]
        cmd: AddressCmd,
    },
    /// Route one dispatch through the router against the stored state
    Simulate {
        #[arg(long)]
        address: String,
        #[arg(long)]
        police_id: Option<String>,
        /// Actually open the navigation app for a matching dispatch
        #[arg(long)]
        launch: bool,
    },
    /// Show what a fresh boot would do
    Boot,
    /// Effective configuration
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print defaults merged with config.json and BPGPS_* env vars
    Show,
    /// Write the effective configuration to config.json
    Save,
}

#[derive(Subcommand)]
enum OfficerCmd {
    Show,
    Set { id: String },
    Clear,
}

#[derive(Subcommand)]
enum HistoryCmd {
    /// List entries, newest first
    List {
        #[command(flatten)]
        scope: OfficerScope,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Delete one entry
    Delete {
        #[arg(long)]
        address: String,
        #[arg(long)]
        timestamp: i64,
    },
    /// Clear all entries, or one officer's
    Clear {
        #[command(flatten)]
        scope: OfficerScope,
    },
}

#[derive(Args)]
struct OfficerScope {
    /// Only entries for the signed-in officer
    #[arg(long, conflicts_with = "officer")]
    mine: bool,
    /// Only entries for this officer
    #[arg(long)]
    officer: Option<String>,
}

#[derive(Subcommand)]
enum AddressCmd {
    /// Apply the dispatch address cleanup rules
    Format { raw: Vec<String> },
    /// Print the navigation URI for an address
    Uri { raw: Vec<String> },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bpgps_util::init_tracing()?;
    let cli = Cli::parse();

    let paths = storage_paths(cli.state_dir.as_deref());
    let config = ServiceConfig::load_from(&paths.config);
    let prefs = Preferences::new(&paths.prefs);
    let history = HistoryLog::with_cap(&paths.history, config.history_cap);

    match cli.cmd {
        Cmd::Officer { cmd } => match cmd {
            OfficerCmd::Show => {
                let officer = prefs.officer_id();
                if officer.is_unset() {
                    println!("officer=<none>");
                } else {
                    println!("officer={officer}");
                }
            }
            OfficerCmd::Set { id } => {
                let officer = prefs.set_officer_id(&id)?;
                println!("officer={officer}");
            }
            OfficerCmd::Clear => {
                prefs.clear_officer_id()?;
                println!("officer=<none>");
            }
        },

        Cmd::Status => match StatusStore::new(&paths.status).load() {
            Some(last) => {
                let label = last.code().map(|code| code.label()).unwrap_or("Unknown");
                println!("status={}\t{label}", last.status);
                println!("detail={}", last.detail);
                println!("updated_at={}", last.updated_at_unix_millis);
            }
            None => println!("status=<none>"),
        },

        Cmd::History { cmd } => match cmd {
            HistoryCmd::List { scope, limit, json } => {
                let mut entries = match scoped_officer(&scope, &prefs)? {
                    Some(officer) => history.load_for_officer(&officer),
                    None => history.load_all(),
                };
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                print_history(&entries, json)?;
            }
            HistoryCmd::Delete { address, timestamp } => {
                let removed = history.remove(&address, timestamp)?;
                println!("removed={removed}");
            }
            HistoryCmd::Clear { scope } => match scoped_officer(&scope, &prefs)? {
                Some(officer) => {
                    let removed = history.clear_officer(&officer)?;
                    println!("removed={removed}\tofficer={officer}");
                }
                None => {
                    history.clear()?;
                    println!("cleared=all");
                }
            },
        },

        Cmd::Address { cmd } => match cmd {
            AddressCmd::Format { raw } => {
                println!("{}", format_address(&raw.join(" "), &config.default_city_state));
            }
            AddressCmd::Uri { raw } => {
                let address = format_address(&raw.join(" "), &config.default_city_state);
                println!("{}", navigation_uri(&address));
            }
        },

        Cmd::Simulate {
            address,
            police_id,
            launch,
        } => {
            let officer = prefs.officer_id();
            let mut router = DispatchRouter::new(&config, history);
            let message = DispatchMessage::new(address, police_id.as_deref());
            match router.route(&message, &officer, now_millis()) {
                Decision::Ignored => println!("decision=ignored"),
                Decision::Debounced { address } => println!("decision=debounced\t{address}"),
                Decision::Navigate(routed) => {
                    println!("decision=navigate\t{}", routed.entry.address);
                    println!("uri={}", navigation_uri(&routed.entry.address));
                    if launch {
                        let launcher = CommandLauncher::new(&config.nav_command);
                        if let Err(err) = launcher.launch(&routed.entry.address).await {
                            warn!("{err}");
                            println!("launch=failed");
                        }
                    }
                }
                Decision::OtherOfficer(routed) => {
                    println!(
                        "decision=other_officer\t{}\tofficer={}",
                        routed.entry.address, routed.entry.officer_id
                    );
                }
            }
        }

        Cmd::Boot => match boot_action(&prefs.officer_id()) {
            BootAction::StartService(officer) => println!("boot=start_service\tofficer={officer}"),
            BootAction::PromptForOfficer => println!("boot=prompt_for_officer"),
        },

        Cmd::Config { cmd } => match cmd {
            ConfigCmd::Show => println!("{}", serde_json::to_string_pretty(&config)?),
            ConfigCmd::Save => {
                config.save_to(&paths.config)?;
                println!("saved={}", paths.config.display());
            }
        },
    }

    Ok(())
}

fn storage_paths(state_dir: Option<&Path>) -> StoragePaths {
    match state_dir {
        Some(dir) => StoragePaths::in_dir(dir),
        None => StoragePaths::default_location(),
    }
}

fn scoped_officer(
    scope: &OfficerScope,
    prefs: &Preferences,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    if let Some(officer) = scope.officer.as_deref() {
        return Ok(Some(officer.to_string()));
    }
    if scope.mine {
        let officer = prefs.officer_id();
        if officer.is_unset() {
            return Err("no officer is signed in".into());
        }
        return Ok(Some(officer.to_string()));
    }
    Ok(None)
}

fn print_history(entries: &[HistoryEntry], json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("(no dispatches)");
    }
    for entry in entries {
        let officer = if entry.officer_id.is_empty() {
            "-"
        } else {
            entry.officer_id.as_str()
        };
        println!("{}\t{}\t{}", entry.timestamp_millis, officer, entry.address);
    }
    Ok(())
}
