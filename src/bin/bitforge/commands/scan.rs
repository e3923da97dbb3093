//! `bitforge scan` command

use anyhow::Result;

use crate::cli::ScanArgs;
use crate::commands::{load_project, GlobalArgs};
use bitforge::ops::{format_scan, scan};

pub fn execute(args: ScanArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_project(global)?;
    let result = scan(&config);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", format_scan(&result));
    }
    Ok(())
}
