//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// bitforge - vendor-abstracted build pipelines for FPGA toolchains
#[derive(Parser)]
#[command(name = "bitforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Continue when a hook command fails instead of aborting
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Path to bitforge.toml (defaults to searching upward from the current directory)
    #[arg(long, global = true, env = "BITFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the build pipeline, or selected stages of it
    Build(BuildArgs),

    /// Remove run results or generated project files
    Clean(CleanArgs),

    /// List discovered sources in compile order
    Scan(ScanArgs),

    /// Print the generated tool script without running it
    Script(ScriptArgs),

    /// Open the project in the vendor tool's GUI
    Gui(GuiArgs),

    /// Program a connected device with the generated image
    Program(ProgramArgs),

    /// List and check backends
    Backend(BackendArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Stages to run (create, import, recover, synth, impl, bitstream, clean)
    #[arg(short, long = "stage")]
    pub stages: Vec<String>,

    /// Clean level used when the clean stage runs (soft, hard, all)
    #[arg(long, default_value = "soft")]
    pub clean: String,

    /// Backend to use (defaults to the one handling fpga.vendor)
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Where hooks run: script or host (defaults to build.hooks.mode)
    #[arg(long)]
    pub hook_mode: Option<String>,

    /// Limit for each tool run, in seconds [default: build.timeout, else 6 hours]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Print the pipeline report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CleanArgs {
    /// soft (reset runs, drop logs), hard (project dir) or all (plus outputs)
    #[arg(long, default_value = "soft")]
    pub level: String,

    /// Backend to use
    #[arg(short, long)]
    pub backend: Option<String>,
}

#[derive(Args)]
pub struct ScanArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ScriptArgs {
    /// Stages to include (defaults to the full build)
    #[arg(short, long = "stage")]
    pub stages: Vec<String>,

    /// Clean level used for the clean stage
    #[arg(long, default_value = "soft")]
    pub clean: String,

    /// Leave hook commands out of the script
    #[arg(long)]
    pub no_hooks: bool,

    /// Backend to use
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Write the script to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct GuiArgs {
    /// Backend to use
    #[arg(short, long)]
    pub backend: Option<String>,
}

#[derive(Args)]
pub struct ProgramArgs {
    /// Image to program (defaults to the newest in the bitstream directory)
    pub image: Option<PathBuf>,

    /// Backend to use
    #[arg(short, long)]
    pub backend: Option<String>,
}

#[derive(Args)]
pub struct BackendArgs {
    #[command(subcommand)]
    pub command: BackendCommands,
}

#[derive(Subcommand)]
pub enum BackendCommands {
    /// List registered backends
    List(BackendListArgs),

    /// Check tool availability and version compatibility
    Check(BackendCheckArgs),
}

#[derive(Args)]
pub struct BackendListArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct BackendCheckArgs {
    /// Backend name or vendor (defaults to all)
    pub backend: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
