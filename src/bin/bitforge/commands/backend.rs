//! `bitforge backend` command
//!
//! List and check backends.

use anyhow::{bail, Context, Result};

use crate::cli::{BackendArgs, BackendCheckArgs, BackendCommands, BackendListArgs};
use crate::commands::{load_project, GlobalArgs};
use bitforge::builder::backend::{PluginRegistry, PluginState};
use bitforge::core::ConfigError;
use bitforge::ops::compat::{compatibility_report, format_report};
use bitforge::ops::plugins::{base_env, registry_for};

pub fn execute(args: BackendArgs, global: &GlobalArgs) -> Result<()> {
    let registry = registry(global)?;
    match args.command {
        BackendCommands::List(list_args) => list_backends(&registry, list_args),
        BackendCommands::Check(check_args) => check_backends(&registry, check_args, global),
    }
}

/// Project registry when inside a project, otherwise one built from the
/// user's tool settings alone.
fn registry(global: &GlobalArgs) -> Result<PluginRegistry> {
    match load_project(global) {
        Ok(config) => Ok(registry_for(&config)),
        Err(e) if global.config.is_some() => Err(e),
        Err(e) if !matches!(e.downcast_ref::<ConfigError>(), Some(ConfigError::NotFound { .. })) => {
            Err(e)
        }
        Err(_) => {
            let cwd = std::env::current_dir().context("failed to get current directory")?;
            Ok(PluginRegistry::with_builtin(base_env(&cwd)))
        }
    }
}

fn list_backends(registry: &PluginRegistry, args: BackendListArgs) -> Result<()> {
    let summaries = registry.summaries();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    println!("Backends:");
    println!();

    for info in summaries {
        println!("  {} - {}", info.name, info.description);
        println!("    Kind:       {}", info.kind);
        println!("    Version:    {}", info.version);
        if let Some(vendor) = &info.vendor {
            println!("    Vendor:     {}", vendor);
        }
        println!(
            "    Tool:       {}",
            info.tool.as_deref().unwrap_or("not installed")
        );
        let state = match info.state {
            PluginState::Ready => "ready",
            PluginState::Degraded => "degraded",
        };
        println!("    State:      {}", state);
        println!();
    }

    Ok(())
}

fn check_backends(
    registry: &PluginRegistry,
    args: BackendCheckArgs,
    global: &GlobalArgs,
) -> Result<()> {
    let report = compatibility_report(registry, args.backend.as_deref())?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", format_report(&report, global.verbose));
    }

    if args.backend.is_some() && !report.all_compatible() {
        bail!("backend is not usable on this machine");
    }
    Ok(())
}
