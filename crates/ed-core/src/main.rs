//! Emergency diagnostics CLI.
//!
//! `emergency trigger` snapshots the machine into a timestamped incident
//! bundle, optionally backs up user directories and hands the bundle to an
//! analysis tool. The run summary goes to stdout, logs to stderr.

use clap::{Args, Parser, Subcommand};
use ed_bundle::{BundleManager, MANIFEST_SCHEMA_VERSION};
use ed_core::capture::{catalog, TargetOs};
use ed_core::config::{load_settings, ConfigOptions, LoadedSettings};
use ed_core::exit_codes::ExitCode;
use ed_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use ed_core::trigger::{run_trigger, TriggerOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info_span};

/// Emergency diagnostics - capture a self-contained incident bundle
#[derive(Parser)]
#[command(name = "emergency")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Log every action without touching the filesystem or running commands
    #[arg(long, global = true)]
    dry_run: bool,

    /// Config file (overrides EMERGENCY_CONFIG and the XDG default)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Disable colored log output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture diagnostics into a new incident bundle
    Trigger(TriggerArgs),

    /// Print the capture module catalog
    Catalog(CatalogArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct TriggerArgs {
    /// Directory to create the bundle under (default: current directory)
    #[arg(long, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    /// Kill any capture command running longer than this (0 = no limit)
    #[arg(long, value_name = "SECS")]
    command_timeout: Option<u64>,

    /// Directory to back up alongside the bundle (repeatable)
    #[arg(long = "backup", value_name = "SRC")]
    backup: Vec<PathBuf>,

    /// Where backups are written (default: the bundle's base directory)
    #[arg(long, value_name = "DIR")]
    backup_dest: Option<PathBuf>,

    /// Hand the finished bundle to an analysis tool found on PATH
    #[arg(long)]
    handoff: bool,

    /// Analysis tool to probe for (repeatable; replaces the configured list)
    #[arg(long = "handoff-tool", value_name = "NAME", requires = "handoff")]
    handoff_tools: Vec<String>,

    /// Run the catalog for this OS instead of the detected one
    #[arg(long, value_name = "OS")]
    os: Option<TargetOs>,
}

#[derive(Args, Debug)]
struct CatalogArgs {
    /// OS variant to show (default: detected)
    #[arg(long, value_name = "OS")]
    os: Option<TargetOs>,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    )
    .with_color(!cli.global.no_color);
    init_logging(&log_config);

    let run_id = generate_run_id();
    let span = info_span!("emergency", run_id = %run_id);
    let _guard = span.enter();

    let exit_code = match &cli.command {
        Commands::Trigger(args) => run_trigger_command(&cli.global, args),
        Commands::Catalog(args) => print_catalog(args),
        Commands::Version => {
            print_version();
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

fn run_trigger_command(global: &GlobalOpts, args: &TriggerArgs) -> ExitCode {
    let LoadedSettings { settings, .. } = match load_settings(&ConfigOptions {
        config_path: global.config.clone(),
    }) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!(error = %e, "failed to load config");
            eprintln!("emergency: {}", e);
            return ExitCode::ConfigError;
        }
    };

    let mut options = TriggerOptions::from_settings(&settings, global.dry_run);
    if let Some(dir) = &args.base_dir {
        options.base_dir = dir.clone();
    }
    if let Some(secs) = args.command_timeout {
        options.capture.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if !args.backup.is_empty() {
        options.backup_sources = args.backup.clone();
    }
    if let Some(dest) = &args.backup_dest {
        options.backup_dest = Some(dest.clone());
    }
    if args.handoff {
        options.handoff_tools = Some(if args.handoff_tools.is_empty() {
            settings.handoff.tools.clone()
        } else {
            args.handoff_tools.clone()
        });
    }
    if let Some(os) = args.os {
        options.os = os;
    }

    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let manager = BundleManager::new(env!("CARGO_PKG_VERSION"), raw_args.join(" "));

    match run_trigger(&manager, &options) {
        Ok(report) => {
            print!("{}", report.render());
            ExitCode::Clean
        }
        Err(e) => {
            error!(error = %e, "emergency capture failed");
            eprintln!("emergency: {}", e);
            ExitCode::from(&e)
        }
    }
}

fn print_catalog(args: &CatalogArgs) -> ExitCode {
    let os = args.os.unwrap_or_else(TargetOs::detect);
    let modules = catalog(os);

    if args.json {
        let doc = serde_json::json!({ "os": os, "modules": modules });
        match serde_json::to_string_pretty(&doc) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("emergency: {}", e);
                return ExitCode::InternalError;
            }
        }
        return ExitCode::Clean;
    }

    println!("Capture modules for {}:", os);
    for module in &modules {
        println!("{} ({})", module.name, module.display_name);
        if module.commands.is_empty() {
            println!("  (no commands on this platform)");
        }
        for command in &module.commands {
            println!("  {}", command);
        }
    }
    ExitCode::Clean
}

fn print_version() {
    println!("emergency {}", env!("CARGO_PKG_VERSION"));
    println!("manifest schema: {}", MANIFEST_SCHEMA_VERSION);
}
