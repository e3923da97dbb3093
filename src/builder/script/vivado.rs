//! Vivado Tcl stage templates.

use std::path::Path;

use tracing::warn;

use crate::builder::script::{AssemblyContext, StageTemplates};
use crate::core::artifact::{ArtifactRole, Language, SourceArtifact};
use crate::core::config::{option_bool, tcl_value, BlockDesignConfig, OptionMap};
use crate::core::stage::{CleanLevel, PipelineStage};
use crate::util::fs::tcl_path;

const SYNTH_RUN: &str = "synth_1";
const IMPL_RUN: &str = "impl_1";
const DEFAULT_SYNTH_STRATEGY: &str = "Vivado Synthesis Defaults";
const DEFAULT_BITSTREAM_DIR: &str = "build/bitstreams";
const SYNTH_ARGS_PREFIX: &str = "STEPS.SYNTH_DESIGN.ARGS";

/// Bitstream options with a dedicated run property.
const BITSTREAM_FLAGS: &[(&str, &str)] = &[
    ("bin_file", "STEPS.WRITE_BITSTREAM.ARGS.BIN_FILE"),
    ("mask_file", "STEPS.WRITE_BITSTREAM.ARGS.MASK_FILE"),
];

/// Templates for Xilinx Vivado batch and GUI scripts.
#[derive(Debug, Clone, Copy, Default)]
pub struct VivadoTemplates;

impl StageTemplates for VivadoTemplates {
    fn tool(&self) -> &str {
        "vivado"
    }

    fn load_script(&self, path: &Path) -> String {
        format!("source {{{}}}", tcl_path(path))
    }

    fn open_project(&self, ctx: &AssemblyContext<'_>) -> Vec<String> {
        vec![
            "# Reopen the existing project".to_string(),
            format!("open_project \"{}\"", project_file(ctx)),
        ]
    }

    fn stage_body(&self, stage: PipelineStage, ctx: &AssemblyContext<'_>) -> Vec<String> {
        match stage {
            PipelineStage::CreateProject => create_project(ctx),
            PipelineStage::ImportFiles => import_files(ctx),
            PipelineStage::RecoverStructure => recover_structure(ctx),
            PipelineStage::Synthesize => synthesize(ctx),
            PipelineStage::Implement => implement(ctx),
            PipelineStage::GenerateBitstream => generate_bitstream(ctx),
            PipelineStage::Clean => clean(ctx),
        }
    }

    fn stage_epilogue(&self, stage: PipelineStage, ctx: &AssemblyContext<'_>) -> Vec<String> {
        if stage != PipelineStage::GenerateBitstream {
            return Vec::new();
        }

        let mut lines = Vec::new();
        if let Some(script) = &ctx.config.hooks().bin_merge_script {
            let path = ctx.resolve(script);
            lines.push("# Binary merge".to_string());
            if path.is_file() {
                lines.push(self.load_script(&path));
            } else {
                warn!("bin merge script not found: {}", path.display());
                lines.push(format!("# bin merge script not found: {}", tcl_path(&path)));
            }
            lines.push(String::new());
        }
        lines.push("puts \"build flow complete\"".to_string());
        lines
    }

    fn gui(&self, ctx: &AssemblyContext<'_>) -> Vec<String> {
        vec![
            "# Open the project interactively".to_string(),
            format!("open_project \"{}\"", project_file(ctx)),
            "start_gui".to_string(),
            "catch {open_bd_design [get_files *.bd]}".to_string(),
        ]
    }
}

impl VivadoTemplates {
    /// JTAG programming script for the first device on the local hardware server.
    ///
    /// Without an explicit image the first `.bit` in the bitstream output
    /// directory is used.
    pub fn program_device(&self, bitfile: Option<&Path>, ctx: &AssemblyContext<'_>) -> Vec<String> {
        let mut lines = vec![
            "# Program device".to_string(),
            "open_hw_manager".to_string(),
            "connect_hw_server".to_string(),
            "open_hw_target".to_string(),
            "set device [lindex [get_hw_devices] 0]".to_string(),
            "current_hw_device $device".to_string(),
        ];
        match bitfile {
            Some(path) => lines.push(format!("set bitfile \"{}\"", tcl_path(&ctx.resolve(path)))),
            None => {
                let dir = tcl_path(&bitstream_dir(ctx));
                lines.extend([
                    format!("set bitfile [lindex [glob -nocomplain -directory \"{}\" *.bit] 0]", dir),
                    "if {$bitfile eq \"\"} {".to_string(),
                    format!("    error \"no bitstream found in {}\"", dir),
                    "}".to_string(),
                ]);
            }
        }
        lines.extend([
            "set_property PROGRAM.FILE $bitfile $device".to_string(),
            "program_hw_devices $device".to_string(),
            "close_hw_target".to_string(),
            "puts \"programmed $bitfile\"".to_string(),
        ]);
        lines
    }
}

fn bitstream_dir(ctx: &AssemblyContext<'_>) -> std::path::PathBuf {
    ctx.resolve(
        ctx.config
            .build
            .bitstream
            .output_dir
            .as_deref()
            .unwrap_or(DEFAULT_BITSTREAM_DIR),
    )
}

fn project_file(ctx: &AssemblyContext<'_>) -> String {
    format!(
        "{}/{}.xpr",
        tcl_path(&ctx.config.project_dir()),
        ctx.config.name()
    )
}

fn create_project(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let config = ctx.config;
    let language = if config.fpga.target_language.eq_ignore_ascii_case("vhdl") {
        "VHDL"
    } else {
        "Verilog"
    };

    vec![
        format!("# Project: {}", config.name()),
        format!("# Part: {}", config.fpga.part),
        format!(
            "create_project {} \"{}\" -part {} -force",
            config.name(),
            tcl_path(&config.project_dir()),
            config.fpga.part
        ),
        "set_property default_lib work [current_project]".to_string(),
        format!("set_property target_language {} [current_project]", language),
        String::new(),
    ]
}

fn import_files(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let discovery = ctx.discovery;
    let mut lines = Vec::new();

    if discovery.is_empty() {
        lines.push("# No source files discovered".to_string());
        lines.push(String::new());
        return lines;
    }

    section(&mut lines, "HDL sources", discovery.hdl.iter().flat_map(import_hdl));
    section(
        &mut lines,
        "Constraints",
        discovery
            .constraints
            .iter()
            .map(|c| format!("add_files -fileset constrs_1 -norecurse {{{}}}", path_of(c))),
    );
    section(&mut lines, "IP cores", discovery.ip_cores.iter().flat_map(import_ip));
    section(
        &mut lines,
        "Block designs",
        discovery
            .block_designs
            .iter()
            .filter(|bd| bd.language() == Language::BlockDesign)
            .map(|bd| format!("add_files -norecurse {{{}}}", path_of(bd))),
    );
    lines
}

fn section(lines: &mut Vec<String>, title: &str, commands: impl Iterator<Item = String>) {
    let mut commands = commands.peekable();
    if commands.peek().is_none() {
        return;
    }
    lines.push(format!("# {}", title));
    lines.extend(commands);
    lines.push(String::new());
}

fn path_of(artifact: &SourceArtifact) -> String {
    tcl_path(artifact.absolute_path())
}

fn import_hdl(artifact: &SourceArtifact) -> Vec<String> {
    let path = path_of(artifact);
    let mut lines = vec![match artifact.role() {
        ArtifactRole::Test => format!("add_files -fileset sim_1 -norecurse {{{}}}", path),
        _ => format!("add_files -norecurse {{{}}}", path),
    }];

    let file_type = match artifact.language() {
        Language::SystemVerilog => Some("SystemVerilog"),
        Language::Vhdl => Some("VHDL"),
        _ => None,
    };
    if let Some(file_type) = file_type {
        lines.push(format!(
            "set_property FILE_TYPE {{{}}} [get_files {{{}}}]",
            file_type, path
        ));
    }
    if artifact.role() == ArtifactRole::Include {
        lines.push(format!(
            "set_property is_global_include true [get_files {{{}}}]",
            path
        ));
    }
    lines
}

fn import_ip(artifact: &SourceArtifact) -> Vec<String> {
    let path = path_of(artifact);
    if artifact.is_dir() || artifact.file_name() == "component.xml" {
        return vec![format!("add_files -norecurse {{{}}}", path)];
    }
    match artifact.extension().as_str() {
        "xci" => vec![format!("read_ip {{{}}}", path)],
        "xco" => vec![
            format!("add_files {{{}}}", path),
            format!("upgrade_ip [get_ips {{{}}}]", artifact.stem()),
        ],
        _ => vec![format!("add_files {{{}}}", path)],
    }
}

fn recover_structure(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    let block_design = ctx.config.source.block_design.as_ref();

    if let Some(bd) = block_design {
        lines.extend(recover_block_design(bd, ctx));
    }

    lines.push("# Top module".to_string());
    if block_design.is_some_and(|bd| bd.is_top) {
        lines.push("# block design is the top module".to_string());
    } else if let Some(top) = &ctx.config.fpga.top_module {
        lines.push(format!("set_property top {} [current_fileset]", top));
    } else {
        lines.push("# no top module configured, tool default applies".to_string());
    }
    lines.push(String::new());
    lines
}

fn recover_block_design(bd: &BlockDesignConfig, ctx: &AssemblyContext<'_>) -> Vec<String> {
    let mut lines = vec!["# Block design".to_string()];

    if let Some(script) = &bd.tcl_script {
        lines.push(format!("source {{{}}}", tcl_path(&ctx.resolve(script))));
    } else if let Some(bd_file) = &bd.bd_file {
        lines.push(format!(
            "open_bd_design [get_files {{{}}}]",
            tcl_path(&ctx.resolve(bd_file))
        ));
    } else {
        lines.push("error \"block design needs bd_file or tcl_script\"".to_string());
        lines.push(String::new());
        return lines;
    }

    if bd.generate_wrapper {
        let wrapper = bd
            .wrapper_name
            .clone()
            .unwrap_or_else(|| format!("{}_wrapper", ctx.config.name()));

        if bd.auto_wrapper {
            lines.extend([
                "set wrapper_files [make_wrapper -files [get_files [current_bd_design].bd] -top]"
                    .to_string(),
                "if {[llength $wrapper_files] > 0} {".to_string(),
                "    add_files -norecurse $wrapper_files".to_string(),
                "    set_property top [file rootname [file tail [lindex $wrapper_files 0]]] [current_fileset]"
                    .to_string(),
                "} else {".to_string(),
                format!("    set_property top {} [current_fileset]", wrapper),
                "}".to_string(),
            ]);
        } else {
            lines.push(format!("set_property top {} [current_fileset]", wrapper));
        }
    }

    if bd.is_top {
        lines.push("set_property top [current_bd_design] [current_fileset]".to_string());
    }
    lines.push(String::new());
    lines
}

fn synthesize(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let synthesis = &ctx.config.build.synthesis;
    let strategy = synthesis
        .strategy
        .as_deref()
        .unwrap_or(DEFAULT_SYNTH_STRATEGY);

    let mut lines = vec![
        "# Synthesis".to_string(),
        format!("set_property strategy \"{}\" [get_runs {}]", strategy, SYNTH_RUN),
    ];
    lines.extend(run_properties(&synthesis.options, SYNTH_RUN, Some(SYNTH_ARGS_PREFIX)));
    lines.extend(launch_and_check(SYNTH_RUN, &[], "synthesis failed"));
    lines
}

fn implement(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let mut lines = vec!["# Implementation".to_string()];
    lines.extend(run_properties(
        &ctx.config.build.implementation.options,
        IMPL_RUN,
        None,
    ));
    lines.extend(launch_and_check(IMPL_RUN, &[], "implementation failed"));
    lines
}

/// `set_property` lines for a run; bare keys get `prefix` when one is given.
fn run_properties(options: &OptionMap, run: &str, prefix: Option<&str>) -> Vec<String> {
    options
        .iter()
        .map(|(key, value)| {
            let property = match prefix {
                Some(prefix) if !key.contains('.') && key != "strategy" => {
                    format!("{}.{}", prefix, key.to_uppercase())
                }
                _ => key.clone(),
            };
            format!("set_property {} {{{}}} [get_runs {}]", property, tcl_value(value), run)
        })
        .collect()
}

fn launch_and_check(run: &str, launch_args: &[&str], failure: &str) -> Vec<String> {
    let mut launch = format!("launch_runs {}", run);
    for arg in launch_args {
        launch.push(' ');
        launch.push_str(arg);
    }
    vec![
        launch,
        format!("wait_on_run {}", run),
        format!(
            "if {{[get_property PROGRESS [get_runs {}]] != \"100%\"}} {{",
            run
        ),
        format!("    error \"{}\"", failure),
        "}".to_string(),
        String::new(),
    ]
}

fn generate_bitstream(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let bitstream = &ctx.config.build.bitstream;
    let output_dir = tcl_path(&bitstream_dir(ctx));

    let mut lines = vec![
        "# Bitstream".to_string(),
        "set_property SEVERITY {Warning} [get_drc_checks UCIO-1]".to_string(),
        format!("file mkdir \"{}\"", output_dir),
        format!("set bitstream_dir [file normalize \"{}\"]", output_dir),
    ];

    for (key, value) in &bitstream.options {
        match BITSTREAM_FLAGS.iter().find(|(name, _)| *name == key.as_str()) {
            Some((_, property)) => {
                let enabled = option_bool(&bitstream.options, key).unwrap_or(false);
                lines.push(format!(
                    "set_property {} {} [get_runs {}]",
                    property, enabled, IMPL_RUN
                ));
            }
            None => lines.push(format!(
                "set_property {} {{{}}} [get_runs {}]",
                key,
                tcl_value(value),
                IMPL_RUN
            )),
        }
    }

    lines.push(format!("catch {{reset_run {} -from_step route_design}}", IMPL_RUN));
    lines.extend(launch_and_check(
        IMPL_RUN,
        &["-to_step", "write_bitstream"],
        "bitstream generation failed",
    ));

    lines.extend([
        format!("set run_dir [get_property DIRECTORY [get_runs {}]]", IMPL_RUN),
        "set images [glob -nocomplain -directory $run_dir *.bit *.bin *.ltx]".to_string(),
        "if {[llength $images] == 0} {".to_string(),
        "    error \"no bitstream produced in $run_dir\"".to_string(),
        "}".to_string(),
        "foreach image $images {".to_string(),
        "    file copy -force $image [file join $bitstream_dir [file tail $image]]".to_string(),
        "}".to_string(),
        "puts \"copied [llength $images] file(s) to $bitstream_dir\"".to_string(),
        String::new(),
    ]);
    lines
}

fn clean(ctx: &AssemblyContext<'_>) -> Vec<String> {
    let project_dir = tcl_path(&ctx.config.project_dir());
    let mut lines = vec![format!("# Clean ({})", ctx.clean_level)];

    match ctx.clean_level {
        CleanLevel::Soft => {
            lines.extend([
                "if {[catch {current_project}]} {".to_string(),
                format!("    if {{[file exists \"{}\"]}} {{", project_file(ctx)),
                format!("        open_project \"{}\"", project_file(ctx)),
                "    }".to_string(),
                "}".to_string(),
                "if {![catch {current_project}]} {".to_string(),
                format!("    reset_runs {}", SYNTH_RUN),
                format!("    reset_runs {}", IMPL_RUN),
                "}".to_string(),
                "foreach file [glob -nocomplain -type f *.log */*.log */*/*.log *.jou */*.jou */*/*.jou *.str] {"
                    .to_string(),
                "    file delete -force $file".to_string(),
                "}".to_string(),
            ]);
        }
        CleanLevel::Hard | CleanLevel::All => {
            lines.extend([
                "catch {close_project}".to_string(),
                format!("if {{[file exists \"{}\"]}} {{", project_dir),
                format!("    file delete -force \"{}\"", project_dir),
                "}".to_string(),
            ]);
            if ctx.clean_level == CleanLevel::All {
                let output_dir = tcl_path(&bitstream_dir(ctx));
                lines.extend([
                    format!("file delete -force \"{}\"", output_dir),
                    "foreach file [glob -nocomplain -type f *.log *.jou *.str *.bit *.bin *.mcs *.prm] {"
                        .to_string(),
                    "    file delete -force $file".to_string(),
                    "}".to_string(),
                ]);
            }
        }
    }

    lines.push("puts \"clean complete\"".to_string());
    lines.push(String::new());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::DiscoveryResult;
    use crate::core::config::ProjectConfig;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(extra: &str) -> ProjectConfig {
        let text = format!(
            "[project]\nname = \"blinky\"\n[fpga]\nvendor = \"xilinx\"\npart = \"xc7a35tcpg236-1\"\n{}",
            extra
        );
        ProjectConfig::parse(&text, Path::new("/work/blinky/bitforge.toml")).unwrap()
    }

    fn ctx<'a>(config: &'a ProjectConfig, discovery: &'a DiscoveryResult) -> AssemblyContext<'a> {
        AssemblyContext {
            config,
            discovery,
            clean_level: CleanLevel::Soft,
        }
    }

    fn artifact(path: &str, language: Language, role: ArtifactRole, is_dir: bool) -> SourceArtifact {
        SourceArtifact::new(
            PathBuf::from(path),
            PathBuf::from(path.trim_start_matches("/work/blinky/")),
            language,
            role,
            0,
            is_dir,
        )
    }

    fn body(stage: PipelineStage, config: &ProjectConfig, discovery: &DiscoveryResult) -> Vec<String> {
        VivadoTemplates.stage_body(stage, &ctx(config, discovery))
    }

    #[test]
    fn test_create_project() {
        let config = config("");
        let lines = body(PipelineStage::CreateProject, &config, &DiscoveryResult::default());
        assert!(lines.contains(
            &"create_project blinky \"/work/blinky/build\" -part xc7a35tcpg236-1 -force".to_string()
        ));
        assert!(lines.contains(&"set_property target_language Verilog [current_project]".to_string()));
    }

    #[test]
    fn test_import_commands_per_artifact() {
        let config = config("");
        let discovery = DiscoveryResult {
            hdl: vec![
                artifact("/work/blinky/src/top.v", Language::Verilog, ArtifactRole::Source, false),
                artifact("/work/blinky/src/pkg.sv", Language::SystemVerilog, ArtifactRole::Source, false),
                artifact("/work/blinky/tb/tb.v", Language::Verilog, ArtifactRole::Test, false),
            ],
            constraints: vec![artifact(
                "/work/blinky/pins.xdc",
                Language::Constraint,
                ArtifactRole::Constraint,
                false,
            )],
            ip_cores: vec![
                artifact("/work/blinky/ip/clk.xci", Language::IpCore, ArtifactRole::Source, false),
                artifact("/work/blinky/ip/old.xco", Language::IpCore, ArtifactRole::Source, false),
                artifact("/work/blinky/ip/fifo", Language::IpCore, ArtifactRole::Source, true),
            ],
            block_designs: vec![
                artifact("/work/blinky/bd/system.bd", Language::BlockDesign, ArtifactRole::Source, false),
                artifact("/work/blinky/bd/system.tcl", Language::Tcl, ArtifactRole::Source, false),
            ],
        };
        let lines = body(PipelineStage::ImportFiles, &config, &discovery);

        let expected = [
            "add_files -norecurse {/work/blinky/src/top.v}",
            "add_files -norecurse {/work/blinky/src/pkg.sv}",
            "set_property FILE_TYPE {SystemVerilog} [get_files {/work/blinky/src/pkg.sv}]",
            "add_files -fileset sim_1 -norecurse {/work/blinky/tb/tb.v}",
            "add_files -fileset constrs_1 -norecurse {/work/blinky/pins.xdc}",
            "read_ip {/work/blinky/ip/clk.xci}",
            "add_files {/work/blinky/ip/old.xco}",
            "upgrade_ip [get_ips {old}]",
            "add_files -norecurse {/work/blinky/ip/fifo}",
            "add_files -norecurse {/work/blinky/bd/system.bd}",
        ];
        for line in expected {
            assert!(lines.iter().any(|l| l == line), "missing `{}`", line);
        }
        assert!(!lines.iter().any(|l| l.contains("system.tcl")));

        let top = lines.iter().position(|l| l.contains("top.v")).unwrap();
        let pkg = lines.iter().position(|l| l.contains("pkg.sv")).unwrap();
        assert!(top < pkg);
    }

    #[test]
    fn test_empty_import() {
        let config = config("");
        let lines = body(PipelineStage::ImportFiles, &config, &DiscoveryResult::default());
        assert_eq!(lines[0], "# No source files discovered");
    }

    #[test]
    fn test_top_module_precedence() {
        let explicit = config("top_module = \"top\"\n");
        let lines = body(PipelineStage::RecoverStructure, &explicit, &DiscoveryResult::default());
        assert!(lines.contains(&"set_property top top [current_fileset]".to_string()));

        let bd_top = ProjectConfig::parse(
            "[project]\nname = \"blinky\"\n[fpga]\nvendor = \"xilinx\"\npart = \"p\"\ntop_module = \"top\"\n[source.block_design]\ntcl_script = \"bd/system.tcl\"\nis_top = true\n",
            Path::new("/work/blinky/bitforge.toml"),
        )
        .unwrap();
        let lines = body(PipelineStage::RecoverStructure, &bd_top, &DiscoveryResult::default());
        assert!(lines.contains(&"source {/work/blinky/bd/system.tcl}".to_string()));
        assert!(lines.contains(&"set_property top [current_bd_design] [current_fileset]".to_string()));
        assert!(!lines.contains(&"set_property top top [current_fileset]".to_string()));

        let default = config("");
        let lines = body(PipelineStage::RecoverStructure, &default, &DiscoveryResult::default());
        assert!(!lines.iter().any(|l| l.starts_with("set_property top")));
    }

    #[test]
    fn test_block_design_manual_wrapper() {
        let config = config(
            "[source.block_design]\nbd_file = \"bd/system.bd\"\nauto_wrapper = false\nwrapper_name = \"system_wrapper\"\n",
        );
        let lines = body(PipelineStage::RecoverStructure, &config, &DiscoveryResult::default());
        assert!(lines.contains(&"open_bd_design [get_files {/work/blinky/bd/system.bd}]".to_string()));
        assert!(lines.contains(&"set_property top system_wrapper [current_fileset]".to_string()));
        assert!(!lines.iter().any(|l| l.contains("make_wrapper")));
    }

    #[test]
    fn test_block_design_without_source_errors() {
        let config = config("[source.block_design]\nis_top = true\n");
        let lines = body(PipelineStage::RecoverStructure, &config, &DiscoveryResult::default());
        assert!(lines.iter().any(|l| l.starts_with("error ")));
    }

    #[test]
    fn test_synthesis_strategy_and_check() {
        let default = config("");
        let lines = body(PipelineStage::Synthesize, &default, &DiscoveryResult::default());
        assert!(lines.contains(
            &"set_property strategy \"Vivado Synthesis Defaults\" [get_runs synth_1]".to_string()
        ));
        assert!(lines.contains(&"launch_runs synth_1".to_string()));
        assert!(lines.contains(&"wait_on_run synth_1".to_string()));
        assert!(lines
            .iter()
            .any(|l| l.contains("PROGRESS [get_runs synth_1]") && l.contains("100%")));

        let tuned = config(
            "[build.synthesis]\nstrategy = \"Flow_PerfOptimized_high\"\n[build.synthesis.options]\nflatten_hierarchy = \"rebuilt\"\n",
        );
        let lines = body(PipelineStage::Synthesize, &tuned, &DiscoveryResult::default());
        assert!(lines.contains(
            &"set_property strategy \"Flow_PerfOptimized_high\" [get_runs synth_1]".to_string()
        ));
        assert!(lines.contains(
            &"set_property STEPS.SYNTH_DESIGN.ARGS.FLATTEN_HIERARCHY {rebuilt} [get_runs synth_1]"
                .to_string()
        ));
    }

    #[test]
    fn test_bitstream_options_and_output() {
        let config = config(
            "[build.bitstream]\noutput_dir = \"out/bit\"\n[build.bitstream.options]\nbin_file = true\nmask_file = \"false\"\n",
        );
        let lines = body(PipelineStage::GenerateBitstream, &config, &DiscoveryResult::default());

        assert!(lines.contains(&"file mkdir \"/work/blinky/out/bit\"".to_string()));
        assert!(lines.contains(
            &"set_property STEPS.WRITE_BITSTREAM.ARGS.BIN_FILE true [get_runs impl_1]".to_string()
        ));
        assert!(lines.contains(
            &"set_property STEPS.WRITE_BITSTREAM.ARGS.MASK_FILE false [get_runs impl_1]".to_string()
        ));
        assert!(lines.contains(&"catch {reset_run impl_1 -from_step route_design}".to_string()));
        assert!(lines.contains(&"launch_runs impl_1 -to_step write_bitstream".to_string()));
        assert!(lines.iter().any(|l| l.contains("no bitstream produced")));
    }

    #[test]
    fn test_bin_merge_script() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("merge.tcl"), "puts merge").unwrap();
        let with_script = ProjectConfig::parse(
            "[project]\nname = \"b\"\n[fpga]\nvendor = \"xilinx\"\npart = \"p\"\n[build.hooks]\nbin_merge_script = \"merge.tcl\"\n",
            &tmp.path().join("bitforge.toml"),
        )
        .unwrap();
        let discovery = DiscoveryResult::default();
        let lines = VivadoTemplates.stage_epilogue(
            PipelineStage::GenerateBitstream,
            &ctx(&with_script, &discovery),
        );
        assert!(lines.contains(&format!(
            "source {{{}}}",
            tcl_path(&tmp.path().join("merge.tcl"))
        )));

        let missing = config("[build.hooks]\nbin_merge_script = \"nope.tcl\"\n");
        let lines = VivadoTemplates.stage_epilogue(
            PipelineStage::GenerateBitstream,
            &ctx(&missing, &discovery),
        );
        assert!(lines.iter().any(|l| l.starts_with("# bin merge script not found")));
        assert!(!lines.iter().any(|l| l.starts_with("source")));

        assert!(VivadoTemplates
            .stage_epilogue(PipelineStage::Synthesize, &ctx(&missing, &discovery))
            .is_empty());
    }

    #[test]
    fn test_clean_levels() {
        let config = config("");
        let discovery = DiscoveryResult::default();
        let render = |level: CleanLevel| {
            let ctx = AssemblyContext {
                config: &config,
                discovery: &discovery,
                clean_level: level,
            };
            VivadoTemplates.stage_body(PipelineStage::Clean, &ctx).join("\n")
        };

        let soft = render(CleanLevel::Soft);
        assert!(soft.contains("reset_runs synth_1"));
        assert!(soft.contains("*.jou"));
        assert!(!soft.contains("file delete -force \"/work/blinky/build\""));

        let hard = render(CleanLevel::Hard);
        assert!(hard.contains("file delete -force \"/work/blinky/build\""));
        assert!(!hard.contains("*.bit"));

        let all = render(CleanLevel::All);
        assert!(all.contains("file delete -force \"/work/blinky/build\""));
        assert!(all.contains("*.bit *.bin *.mcs *.prm"));
    }

    #[test]
    fn test_gui_script() {
        let config = config("");
        let discovery = DiscoveryResult::default();
        let lines = VivadoTemplates.gui(&ctx(&config, &discovery));
        assert!(lines.contains(&"open_project \"/work/blinky/build/blinky.xpr\"".to_string()));
        assert!(lines.contains(&"start_gui".to_string()));
    }

    #[test]
    fn test_program_device_script() {
        let config = config("");
        let discovery = DiscoveryResult::default();
        let ctx = ctx(&config, &discovery);

        let explicit = VivadoTemplates.program_device(Some(Path::new("out/top.bit")), &ctx);
        assert!(explicit.contains(&"set bitfile \"/work/blinky/out/top.bit\"".to_string()));
        assert!(explicit.contains(&"program_hw_devices $device".to_string()));

        let latest = VivadoTemplates.program_device(None, &ctx).join("\n");
        assert!(latest.contains("glob -nocomplain -directory \"/work/blinky/build/bitstreams\" *.bit"));
        assert!(latest.contains("error \"no bitstream found"));
    }
}
