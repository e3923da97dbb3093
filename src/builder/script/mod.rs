//! Script assembly.
//!
//! A build script is an ordered list of fragments, one per pipeline stage,
//! optionally led by a preamble that reopens a project created by an earlier
//! run. Stage bodies come from a [`StageTemplates`] implementation for the
//! target tool. The assembler only decides which stages go in, in which
//! order, and where hook commands are injected.
//!
//! Every stage fragment is rendered the same way whether it is part of a full
//! pipeline or assembled on its own, so a set of single-stage scripts covers
//! exactly the commands of the full script plus their preambles.

mod vivado;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::artifact::DiscoveryResult;
use crate::core::config::ProjectConfig;
use crate::core::hook::HookCommand;
use crate::core::stage::{CleanLevel, HookPoint, PipelineStage};

pub use vivado::VivadoTemplates;

/// A block of script text, either a stage body or the reopen preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFragment {
    stage: Option<PipelineStage>,
    lines: Vec<String>,
}

impl ScriptFragment {
    pub fn preamble() -> Self {
        ScriptFragment {
            stage: None,
            lines: Vec::new(),
        }
    }

    pub fn for_stage(stage: PipelineStage) -> Self {
        ScriptFragment {
            stage: Some(stage),
            lines: Vec::new(),
        }
    }

    /// The stage this fragment implements, `None` for the preamble.
    pub fn stage(&self) -> Option<PipelineStage> {
        self.stage
    }

    pub fn is_preamble(&self) -> bool {
        self.stage.is_none()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn extend<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines that are neither blank nor comments.
    pub fn commands(&self) -> Vec<&str> {
        self.lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .collect()
    }

    pub fn render(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// An assembled script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    fragments: Vec<ScriptFragment>,
}

impl Script {
    pub fn fragments(&self) -> &[ScriptFragment] {
        &self.fragments
    }

    /// Stage fragments, without the preamble.
    pub fn body(&self) -> impl Iterator<Item = &ScriptFragment> {
        self.fragments.iter().filter(|f| !f.is_preamble())
    }

    pub fn fragment(&self, stage: PipelineStage) -> Option<&ScriptFragment> {
        self.fragments.iter().find(|f| f.stage == Some(stage))
    }

    pub fn has_preamble(&self) -> bool {
        self.fragments.first().is_some_and(ScriptFragment::is_preamble)
    }

    /// Stages present, in script order.
    pub fn stages(&self) -> Vec<PipelineStage> {
        self.fragments.iter().filter_map(|f| f.stage).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn render(&self) -> String {
        self.fragments
            .iter()
            .map(ScriptFragment::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<ScriptFragment> for Script {
    fn from(fragment: ScriptFragment) -> Self {
        Script {
            fragments: vec![fragment],
        }
    }
}

/// Everything a stage template may look at.
pub struct AssemblyContext<'a> {
    pub config: &'a ProjectConfig,
    pub discovery: &'a DiscoveryResult,
    pub clean_level: CleanLevel,
}

impl AssemblyContext<'_> {
    /// Directory the configuration was loaded from.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Resolve a configured path against the project root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config.root.join(path)
        }
    }
}

/// Stage templates for one external tool's scripting language.
pub trait StageTemplates {
    /// Tool the scripts are written for.
    fn tool(&self) -> &str;

    fn comment(&self, text: &str) -> String {
        format!("# {}", text)
    }

    /// Command that loads (sources) a script file.
    fn load_script(&self, path: &Path) -> String;

    /// Commands that reopen an existing project.
    fn open_project(&self, ctx: &AssemblyContext<'_>) -> Vec<String>;

    /// Body of one stage, including its completion checks.
    fn stage_body(&self, stage: PipelineStage, ctx: &AssemblyContext<'_>) -> Vec<String>;

    /// Commands that follow the post-stage hooks.
    fn stage_epilogue(&self, _stage: PipelineStage, _ctx: &AssemblyContext<'_>) -> Vec<String> {
        Vec::new()
    }

    /// Script for interactive use.
    fn gui(&self, ctx: &AssemblyContext<'_>) -> Vec<String>;
}

/// Turns a project configuration and discovered sources into a [`Script`].
pub struct ScriptAssembler<'t> {
    templates: &'t dyn StageTemplates,
    embed_hooks: bool,
    clean_level: CleanLevel,
}

impl<'t> ScriptAssembler<'t> {
    pub fn new(templates: &'t dyn StageTemplates) -> Self {
        ScriptAssembler {
            templates,
            embed_hooks: true,
            clean_level: CleanLevel::default(),
        }
    }

    /// Whether hook commands are written into the script.
    ///
    /// Turned off when the driver runs hooks on the host instead.
    pub fn with_hooks(mut self, embed: bool) -> Self {
        self.embed_hooks = embed;
        self
    }

    pub fn with_clean_level(mut self, level: CleanLevel) -> Self {
        self.clean_level = level;
        self
    }

    /// Assemble the requested stages in canonical pipeline order.
    ///
    /// Duplicates are dropped. HDL sources are imported in the order given
    /// by `discovery`. When the project is not created by this script but a
    /// requested stage needs it, the reopen preamble comes first.
    pub fn assemble(
        &self,
        config: &ProjectConfig,
        discovery: &DiscoveryResult,
        stages: &[PipelineStage],
    ) -> Script {
        let stages: BTreeSet<PipelineStage> = stages.iter().copied().collect();
        let ctx = AssemblyContext {
            config,
            discovery,
            clean_level: self.clean_level,
        };

        let mut fragments = Vec::with_capacity(stages.len() + 1);
        if needs_preamble(&stages) {
            let mut preamble = ScriptFragment::preamble();
            preamble.extend(self.templates.open_project(&ctx));
            fragments.push(preamble);
        }

        for stage in stages {
            fragments.push(self.stage_fragment(stage, &ctx));
        }

        debug!(
            "assembled {} script: {} fragment(s)",
            self.templates.tool(),
            fragments.len()
        );
        Script { fragments }
    }

    /// Every build stage, create through bitstream.
    pub fn full(&self, config: &ProjectConfig, discovery: &DiscoveryResult) -> Script {
        self.assemble(config, discovery, &PipelineStage::BUILD)
    }

    /// One stage on its own.
    pub fn single(
        &self,
        config: &ProjectConfig,
        discovery: &DiscoveryResult,
        stage: PipelineStage,
    ) -> Script {
        self.assemble(config, discovery, &[stage])
    }

    /// Script that opens the project interactively.
    pub fn gui(&self, config: &ProjectConfig, discovery: &DiscoveryResult) -> Script {
        let ctx = AssemblyContext {
            config,
            discovery,
            clean_level: self.clean_level,
        };
        let mut fragment = ScriptFragment::preamble();
        fragment.extend(self.templates.gui(&ctx));
        Script::from(fragment)
    }

    fn stage_fragment(&self, stage: PipelineStage, ctx: &AssemblyContext<'_>) -> ScriptFragment {
        let mut fragment = ScriptFragment::for_stage(stage);
        for &point in stage.pre_hooks() {
            fragment.extend(self.hook_block(point, ctx));
        }
        fragment.extend(self.templates.stage_body(stage, ctx));
        for &point in stage.post_hooks() {
            fragment.extend(self.hook_block(point, ctx));
        }
        fragment.extend(self.templates.stage_epilogue(stage, ctx));
        fragment
    }

    fn hook_block(&self, point: HookPoint, ctx: &AssemblyContext<'_>) -> Vec<String> {
        if !self.embed_hooks {
            return Vec::new();
        }
        let commands = ctx.config.hooks().resolve(point, ctx.root());
        if commands.is_empty() {
            return Vec::new();
        }

        let mut lines = Vec::with_capacity(commands.len() + 2);
        lines.push(self.templates.comment(&format!("{} hook", point)));
        for command in commands {
            lines.push(match command {
                HookCommand::Script(path) => self.templates.load_script(&path),
                HookCommand::Command(cmd) => cmd,
            });
        }
        lines.push(String::new());
        lines
    }
}

fn needs_preamble(stages: &BTreeSet<PipelineStage>) -> bool {
    !stages.contains(&PipelineStage::CreateProject)
        && stages.iter().any(PipelineStage::requires_project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(root: &Path, extra: &str) -> ProjectConfig {
        let text = format!(
            "[project]\nname = \"blinky\"\n[fpga]\nvendor = \"xilinx\"\npart = \"xc7a35t\"\ntop_module = \"top\"\n{}",
            extra
        );
        ProjectConfig::parse(&text, &root.join("bitforge.toml")).unwrap()
    }

    fn commands(script: &Script) -> Vec<String> {
        script
            .body()
            .flat_map(|f| f.commands())
            .map(str::to_string)
            .collect()
    }

    fn position(lines: &[&str], needle: &str) -> usize {
        lines
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("`{}` not found", needle))
    }

    const HOOKS: &str = r#"
[build.hooks]
pre_build = "puts pre_build"
pre_synth = "puts pre_synth"
post_synth = "puts post_synth"
pre_impl = "puts pre_impl"
post_impl = "puts post_impl"
post_bitstream = ["puts a", "puts b"]
"#;

    #[test]
    fn test_full_pipeline_stage_order() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "");
        let templates = VivadoTemplates;
        let script = ScriptAssembler::new(&templates).full(&config, &DiscoveryResult::default());

        assert!(!script.has_preamble());
        assert_eq!(script.stages(), PipelineStage::BUILD.to_vec());
    }

    #[test]
    fn test_requested_stages_are_sorted_and_deduplicated() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "");
        let templates = VivadoTemplates;
        let script = ScriptAssembler::new(&templates).assemble(
            &config,
            &DiscoveryResult::default(),
            &[
                PipelineStage::Implement,
                PipelineStage::Synthesize,
                PipelineStage::Implement,
            ],
        );

        assert!(script.has_preamble());
        assert_eq!(
            script.stages(),
            vec![PipelineStage::Synthesize, PipelineStage::Implement]
        );
    }

    #[test]
    fn test_single_stage_reopens_project() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "");
        let templates = VivadoTemplates;
        let assembler = ScriptAssembler::new(&templates);

        let script = assembler.single(&config, &DiscoveryResult::default(), PipelineStage::Implement);
        assert!(script.has_preamble());
        assert!(script.fragments()[0].render().contains("open_project"));
        assert!(script.fragments()[0].render().contains("blinky.xpr"));

        let create = assembler.single(
            &config,
            &DiscoveryResult::default(),
            PipelineStage::CreateProject,
        );
        assert!(!create.has_preamble());
    }

    #[test]
    fn test_single_stages_partition_full_pipeline() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), HOOKS);
        let discovery = DiscoveryResult::default();
        let templates = VivadoTemplates;
        let assembler = ScriptAssembler::new(&templates);

        let full = commands(&assembler.full(&config, &discovery));

        let mut pieces = commands(&assembler.assemble(
            &config,
            &discovery,
            &[
                PipelineStage::CreateProject,
                PipelineStage::ImportFiles,
                PipelineStage::RecoverStructure,
            ],
        ));
        for stage in [
            PipelineStage::Synthesize,
            PipelineStage::Implement,
            PipelineStage::GenerateBitstream,
        ] {
            let single = assembler.single(&config, &discovery, stage);
            assert!(single.has_preamble());
            pieces.extend(commands(&single));
        }

        assert_eq!(full, pieces);
    }

    #[test]
    fn test_hooks_injected_at_stage_boundaries() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), HOOKS);
        let templates = VivadoTemplates;
        let script = ScriptAssembler::new(&templates).full(&config, &DiscoveryResult::default());
        let text = script.render();
        let lines: Vec<&str> = text.lines().collect();

        let pre_build = position(&lines, "puts pre_build");
        let pre_synth = position(&lines, "puts pre_synth");
        let launch_synth = position(&lines, "launch_runs synth_1");
        let post_synth = position(&lines, "puts post_synth");
        let pre_impl = position(&lines, "puts pre_impl");
        let launch_impl = position(&lines, "launch_runs impl_1");
        let post_impl = position(&lines, "puts post_impl");
        let write_bit = position(&lines, "-to_step write_bitstream");
        let post_a = position(&lines, "puts a");
        let post_b = position(&lines, "puts b");

        assert!(pre_build < pre_synth);
        assert!(pre_synth < launch_synth);
        assert!(launch_synth < post_synth);
        assert!(post_synth < pre_impl);
        assert!(pre_impl < launch_impl);
        assert!(launch_impl < post_impl);
        assert!(post_impl < write_bit);
        assert!(write_bit < post_a);
        assert!(post_a < post_b);
    }

    #[test]
    fn test_hook_script_is_sourced() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("scripts")).unwrap();
        fs::write(tmp.path().join("scripts/report.tcl"), "report_utilization").unwrap();
        let config = config(
            tmp.path(),
            "[build.hooks]\npost_synth = [\"scripts/report.tcl\", \"puts done\"]\n",
        );
        let templates = VivadoTemplates;
        let script = ScriptAssembler::new(&templates).single(
            &config,
            &DiscoveryResult::default(),
            PipelineStage::Synthesize,
        );
        let synth = script.fragment(PipelineStage::Synthesize).unwrap().commands();

        let expected = format!(
            "source {{{}}}",
            crate::util::fs::tcl_path(&tmp.path().join("scripts/report.tcl"))
        );
        let sourced = synth.iter().position(|c| *c == expected).unwrap();
        assert_eq!(synth[sourced + 1], "puts done");
    }

    #[test]
    fn test_host_hooks_are_not_embedded() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), HOOKS);
        let templates = VivadoTemplates;
        let script = ScriptAssembler::new(&templates)
            .with_hooks(false)
            .full(&config, &DiscoveryResult::default());

        assert!(!script.render().contains("puts pre_synth"));
        assert!(script.render().contains("launch_runs synth_1"));
    }

    #[test]
    fn test_clean_level_reaches_template() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "");
        let templates = VivadoTemplates;
        let script = ScriptAssembler::new(&templates)
            .with_clean_level(CleanLevel::Hard)
            .single(&config, &DiscoveryResult::default(), PipelineStage::Clean);

        assert!(!script.has_preamble());
        assert!(script.render().contains("file delete -force"));
        assert!(!script.render().contains("reset_runs"));
    }

    #[test]
    fn test_fragment_commands_skip_comments() {
        let mut fragment = ScriptFragment::for_stage(PipelineStage::Synthesize);
        fragment.extend(["# heading", "", "  launch_runs synth_1", "wait_on_run synth_1"]);
        assert_eq!(
            fragment.commands(),
            vec!["launch_runs synth_1", "wait_on_run synth_1"]
        );
        assert_eq!(fragment.stage(), Some(PipelineStage::Synthesize));
    }
}
