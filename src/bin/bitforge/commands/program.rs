//! `bitforge program` command

use anyhow::{bail, Result};

use crate::cli::ProgramArgs;
use crate::commands::{load_project, GlobalArgs};
use bitforge::builder::StageRequest;
use bitforge::ops::{registry_for, scan, select_backend, stage_timeout};

pub fn execute(args: ProgramArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_project(global)?;
    let registry = registry_for(&config);
    let backend = select_backend(&registry, &config, args.backend.as_deref())?;
    let discovery = scan(&config);

    let request = StageRequest::new(&config, &discovery).with_timeout(Some(stage_timeout(&config, None)));
    let result = backend.program_device(&request, args.image.as_deref());
    if !result.success {
        bail!("{}", result.first_error().unwrap_or("programming failed"));
    }

    eprintln!("  Programmed device with {}", backend.name());
    Ok(())
}
