//! `bitforge script` command
//!
//! Prints the script a backend would run, without running it.

use std::fs;

use anyhow::{bail, Context, Result};

use crate::cli::ScriptArgs;
use crate::commands::{load_project, parse_clean_level, parse_stages, GlobalArgs};
use bitforge::builder::StageRequest;
use bitforge::core::PipelineStage;
use bitforge::ops::{registry_for, scan, select_backend};

pub fn execute(args: ScriptArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_project(global)?;
    let mut stages = parse_stages(&args.stages)?;
    if stages.is_empty() {
        stages = PipelineStage::BUILD.to_vec();
    }

    let registry = registry_for(&config);
    let backend = select_backend(&registry, &config, args.backend.as_deref())?;
    let discovery = scan(&config);
    let request = StageRequest::new(&config, &discovery)
        .with_hooks(!args.no_hooks)
        .with_clean_level(parse_clean_level(&args.clean)?);

    let Some(script) = backend.script(&stages, &request) else {
        bail!("backend `{}` does not generate scripts", backend.name());
    };
    let text = script.render();

    match args.output {
        Some(path) => {
            fs::write(&path, &text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("      Wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}
