mod settings;

use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn};
use pvflags_core::options::{self, CoreOptionStore};
use pvflags_core::overrides::TomlOverrideStore;
use pvflags_core::remote::DocumentLocation;
use pvflags_core::{FeatureFlagService, FlagStatus, KnownFeature};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pvflags", about = "Inspect and override frontend feature flags")]
struct Args {
    /// Settings file (defaults to the platform config directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Flag document path or URL
    #[arg(long)]
    config: Option<String>,

    /// Install channel (standard, lite, standard.appstore, lite.appstore)
    #[arg(long)]
    channel: Option<String>,

    /// Build number of the running app
    #[arg(long)]
    build: Option<String>,

    /// Marketing version of the running app
    #[arg(long = "app-version")]
    app_version: Option<String>,

    /// Debug override file
    #[arg(long)]
    overrides: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show every flag with its effective state
    List,
    /// Print the effective state of one flag
    Check { key: String },
    /// Force a flag on or off
    Set {
        key: String,
        #[arg(action = ArgAction::Set)]
        value: bool,
    },
    /// Remove the override for one flag
    Clear { key: String },
    /// Remove every override
    ClearAll,
    /// Show or edit a core's options
    Options {
        /// JSON file with the core's option definitions
        definitions: PathBuf,
        /// Core identifier, used to name the value file
        core: String,
        /// Store a value (key=value)
        #[arg(long = "set")]
        set: Vec<String>,
        /// Drop a stored value
        #[arg(long)]
        reset: Vec<String>,
    },
    /// Write the effective settings to the settings file
    Init,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(settings::default_settings_path);
    let mut cfg = settings::load_from_file(&settings_path);
    apply_cli_overrides(&mut cfg, &args);

    let result = match args.command {
        Command::Init => settings::save_to_file(&settings_path, &cfg)
            .map(|()| println!("Wrote {}", settings_path.display()))
            .map_err(|e| format!("Failed to write {}: {e}", settings_path.display())),
        Command::Options {
            definitions,
            core,
            set,
            reset,
        } => run_options(&cfg, &definitions, &core, &set, &reset),
        command => run_flags(&cfg, command),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn apply_cli_overrides(cfg: &mut settings::Settings, args: &Args) {
    if let Some(config) = &args.config {
        cfg.config_location = Some(config.clone());
    }
    if let Some(channel) = &args.channel {
        cfg.channel = Some(channel.clone());
    }
    if let Some(build) = &args.build {
        cfg.build_number = Some(build.clone());
    }
    if let Some(version) = &args.app_version {
        cfg.version = Some(version.clone());
    }
    if let Some(path) = &args.overrides {
        cfg.overrides_path = Some(path.clone());
    }
}

fn run_flags(cfg: &settings::Settings, command: Command) -> Result<(), String> {
    let env = cfg.environment();
    info!(
        "Environment: channel={} build={:?} version={}",
        env.channel, env.build_number, env.version
    );
    let store = TomlOverrideStore::new(cfg.overrides_path());
    let service = Arc::new(FeatureFlagService::new(env, Box::new(store)));

    match command {
        Command::List => {
            load_flags(&service, cfg)?;
            let all = service.all_flags();
            if all.is_empty() {
                println!("No flags loaded");
            }
            for status in &all {
                println!("{}", format_status(status));
            }
            for feature in KnownFeature::ALL {
                if !all.iter().any(|s| s.key == feature.key()) {
                    let state = on_off(service.is_feature_enabled(feature));
                    println!("{:<28} {state} [not in document]", feature.key());
                }
            }
        }
        Command::Check { key } => {
            load_flags(&service, cfg)?;
            println!("{key}: {}", on_off(service.is_enabled(&key)));
            for restriction in service.restrictions(&key) {
                println!("  {restriction}");
            }
        }
        Command::Set { key, value } => {
            service
                .set_override(&key, value)
                .map_err(|e| e.to_string())?;
            println!("{key}: forced {}", on_off(value));
        }
        Command::Clear { key } => {
            service.clear_override(&key).map_err(|e| e.to_string())?;
            println!("{key}: override cleared");
        }
        Command::ClearAll => {
            service.clear_all_overrides().map_err(|e| e.to_string())?;
            println!("All overrides cleared");
        }
        Command::Options { .. } | Command::Init => {}
    }
    Ok(())
}

/// Without a configured document only overrides apply. A configured
/// document that fails to load is an error.
fn load_flags(service: &Arc<FeatureFlagService>, cfg: &settings::Settings) -> Result<(), String> {
    let Some(location) = &cfg.config_location else {
        warn!("No flag document configured; only overrides apply");
        return Ok(());
    };

    let Ok(location) = location.parse::<DocumentLocation>();
    service
        .load_configuration(location)
        .wait()
        .map(|_| ())
        .map_err(|e| format!("Failed to load flags: {e}"))
}

fn format_status(status: &FlagStatus) -> String {
    let mut line = format!("{:<28} {}", status.key, on_off(status.effective));
    if let Some(forced) = status.override_value {
        line.push_str(&format!(" (override: {})", on_off(forced)));
    }
    if !status.restrictions.is_empty() {
        let reasons: Vec<String> = status.restrictions.iter().map(|r| r.to_string()).collect();
        line.push_str(&format!(" [{}]", reasons.join("; ")));
    }
    if let Some(description) = &status.flag.description {
        line.push_str(&format!(" - {description}"));
    }
    line
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn run_options(
    cfg: &settings::Settings,
    definitions: &Path,
    core: &str,
    set: &[String],
    reset: &[String],
) -> Result<(), String> {
    let bytes = std::fs::read(definitions)
        .map_err(|e| format!("Failed to read {}: {e}", definitions.display()))?;
    let defs = options::parse_definitions(&bytes)
        .map_err(|e| format!("Invalid option definitions {}: {e}", definitions.display()))?;

    let path = CoreOptionStore::path_for(&cfg.options_dir(), core);
    let mut store = CoreOptionStore::open(core, defs, path).map_err(|e| e.to_string())?;

    for key in reset {
        store.reset(key).map_err(|e| e.to_string())?;
    }
    for assignment in set {
        let Some((key, value)) = assignment.split_once('=') else {
            return Err(format!("Expected key=value, got '{assignment}'"));
        };
        store
            .set_from_str(key.trim(), value)
            .map_err(|e| e.to_string())?;
    }

    for group in options::group_options(store.options()) {
        println!("[{}]", group.title);
        for opt in group.options {
            let Some(key) = opt.key() else {
                continue;
            };
            let value = store
                .value(key)
                .map(|v| v.to_string())
                .unwrap_or_else(|e| e.to_string());
            let marker = if store.is_stored(key) { "*" } else { " " };
            println!("{marker} {key:<24} {value:<12} {}", opt.display().title);
        }
    }
    Ok(())
}
