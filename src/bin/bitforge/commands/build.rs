//! `bitforge build` command

use std::time::Duration;

use anyhow::{bail, Result};

use crate::cli::BuildArgs;
use crate::commands::{load_project, parse_clean_level, parse_stages, GlobalArgs};
use bitforge::core::HookMode;
use bitforge::ops::pipeline::{format_report, run_pipeline, PipelineOptions};
use bitforge::ops::{registry_for, scan, select_backend};

pub fn execute(args: BuildArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_project(global)?;

    let hook_mode = match args.hook_mode.as_deref() {
        None => None,
        Some("script") => Some(HookMode::Script),
        Some("host") => Some(HookMode::Host),
        Some(other) => bail!("unknown hook mode `{}` (expected script or host)", other),
    };
    let options = PipelineOptions {
        stages: parse_stages(&args.stages)?,
        clean_level: parse_clean_level(&args.clean)?,
        hook_mode,
        continue_on_hook_failure: global.yes,
        timeout: args.timeout.map(Duration::from_secs),
    };

    let registry = registry_for(&config);
    let backend = select_backend(&registry, &config, args.backend.as_deref())?;
    let discovery = scan(&config);

    eprintln!(
        "   Building {} ({}) with {}",
        config.name(),
        config.fpga.part,
        backend.name()
    );

    let report = run_pipeline(backend, &config, &discovery, &options);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        eprint!("{}", format_report(&report));
        if global.verbose {
            for warning in report.warnings() {
                eprintln!("warning: {}", warning);
            }
        }
    }

    if !report.success {
        let reason = report
            .failed_step()
            .and_then(|step| step.result().first_error().map(str::to_string))
            .unwrap_or_else(|| "pipeline failed".to_string());
        bail!("{}", reason);
    }
    Ok(())
}
