//! AOSP Builder CLI
//!
//! Entry point for the `aosp-builder` command-line tool.

use aosp_builder::config::EffectiveConfig;
use aosp_builder::host::transport;
use aosp_builder::pipeline::{run_action, Action};
use aosp_builder::report::USAGE;
use clap::Parser;
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "aosp-builder")]
#[command(about = "Remote AOSP build with local component overlays", version)]
struct Cli {
    /// One of status, fullbuild, download
    #[arg(long, default_value = "status")]
    action: String,

    /// Directory the component paths are relative to (default: current dir)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Device configuration directory
    #[arg(long)]
    device_config: Option<PathBuf>,

    /// System service directory
    #[arg(long)]
    system_service: Option<PathBuf>,

    /// SDK directory
    #[arg(long)]
    sdk: Option<PathBuf>,

    /// AIDL interface directory
    #[arg(long)]
    aidl: Option<PathBuf>,

    /// Patch directory
    #[arg(long)]
    patches: Option<PathBuf>,

    /// Product/variant to build
    #[arg(long)]
    target: Option<String>,

    /// Project config file (default: <base-dir>/.aosp-builder.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Cli {
    /// Flags that override configuration, as the top merge layer.
    fn overrides(&self) -> Option<Value> {
        let mut paths = Map::new();
        for (key, value) in [
            ("device_config", &self.device_config),
            ("system_service", &self.system_service),
            ("sdk", &self.sdk),
            ("aidl", &self.aidl),
            ("patches", &self.patches),
        ] {
            if let Some(p) = value {
                paths.insert(key.to_string(), json!(p.to_string_lossy()));
            }
        }

        let mut layer = Map::new();
        if !paths.is_empty() {
            layer.insert("paths".to_string(), Value::Object(paths));
        }
        if let Some(ref target) = self.target {
            layer.insert("target".to_string(), json!(target));
        }

        (!layer.is_empty()).then_some(Value::Object(layer))
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(action) = Action::parse(&cli.action) else {
        println!("{}", USAGE);
        return;
    };

    let base_dir = match cli.base_dir.clone() {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error: cannot determine current directory: {}", e);
                process::exit(1);
            }
        },
    };

    let host_path = EffectiveConfig::default_host_path();
    let project_path = cli
        .config
        .clone()
        .unwrap_or_else(|| EffectiveConfig::project_path(&base_dir));

    let effective = match EffectiveConfig::build(
        host_path.as_deref(),
        Some(project_path.as_path()),
        cli.overrides(),
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    for source in &effective.sources {
        tracing::debug!(origin = ?source.origin, path = ?source.path, "config source");
    }

    let settings = match effective.settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let transport = match transport::from_settings(&settings.transport) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = run_action(action, &settings, &base_dir, transport, &mut stdout) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
