//! `bitforge clean` command

use anyhow::{bail, Result};

use crate::cli::CleanArgs;
use crate::commands::{load_project, parse_clean_level, GlobalArgs};
use bitforge::builder::StageRequest;
use bitforge::ops::{registry_for, scan, select_backend, stage_timeout};

pub fn execute(args: CleanArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_project(global)?;
    let level = parse_clean_level(&args.level)?;

    let registry = registry_for(&config);
    let backend = select_backend(&registry, &config, args.backend.as_deref())?;
    let discovery = scan(&config);
    let request = StageRequest::new(&config, &discovery)
        .with_clean_level(level)
        .with_timeout(Some(stage_timeout(&config, None)));

    let result = backend.clean(&request);
    if !result.success {
        bail!("{}", result.first_error().unwrap_or("clean failed"));
    }

    eprintln!("    Cleaned {} ({})", config.name(), level);
    Ok(())
}
