//! `bitforge gui` command

use anyhow::{bail, Result};

use crate::cli::GuiArgs;
use crate::commands::{load_project, GlobalArgs};
use bitforge::builder::StageRequest;
use bitforge::ops::{registry_for, scan, select_backend};

pub fn execute(args: GuiArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_project(global)?;
    let registry = registry_for(&config);
    let backend = select_backend(&registry, &config, args.backend.as_deref())?;
    let discovery = scan(&config);

    let result = backend.open_gui(&StageRequest::new(&config, &discovery));
    if !result.success {
        bail!("{}", result.first_error().unwrap_or("failed to open the GUI"));
    }

    match result.artifacts.get("pid") {
        Some(pid) => eprintln!("    Started {} (pid {})", backend.name(), pid),
        None => eprintln!("    Started {}", backend.name()),
    }
    Ok(())
}
