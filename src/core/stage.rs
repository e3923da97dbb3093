//! Pipeline stages and the hook points around them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A step of the FPGA build pipeline.
///
/// The declaration order is the canonical full-pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    CreateProject,
    ImportFiles,
    RecoverStructure,
    Synthesize,
    Implement,
    GenerateBitstream,
    Clean,
}

impl PipelineStage {
    /// Stages making up a full build, in order. `Clean` is never part of it.
    pub const BUILD: [PipelineStage; 6] = [
        PipelineStage::CreateProject,
        PipelineStage::ImportFiles,
        PipelineStage::RecoverStructure,
        PipelineStage::Synthesize,
        PipelineStage::Implement,
        PipelineStage::GenerateBitstream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::CreateProject => "create_project",
            PipelineStage::ImportFiles => "import_files",
            PipelineStage::RecoverStructure => "recover_structure",
            PipelineStage::Synthesize => "synthesize",
            PipelineStage::Implement => "implement",
            PipelineStage::GenerateBitstream => "generate_bitstream",
            PipelineStage::Clean => "clean",
        }
    }

    /// Hook points fired before this stage runs.
    pub fn pre_hooks(&self) -> &'static [HookPoint] {
        match self {
            PipelineStage::Synthesize => &[HookPoint::PreBuild, HookPoint::PreSynth],
            PipelineStage::Implement => &[HookPoint::PreImpl],
            _ => &[],
        }
    }

    /// Hook points fired after this stage succeeds.
    pub fn post_hooks(&self) -> &'static [HookPoint] {
        match self {
            PipelineStage::Synthesize => &[HookPoint::PostSynth],
            PipelineStage::Implement => &[HookPoint::PostImpl],
            PipelineStage::GenerateBitstream => &[HookPoint::PostBitstream],
            _ => &[],
        }
    }

    /// Stages that operate on an already-created project.
    ///
    /// Assembled on their own, these need the project reopened first.
    /// `Clean` decides for itself per level.
    pub fn requires_project(&self) -> bool {
        !matches!(self, PipelineStage::CreateProject | PipelineStage::Clean)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "create_project" | "create" => Ok(PipelineStage::CreateProject),
            "import_files" | "import" => Ok(PipelineStage::ImportFiles),
            "recover_structure" | "recover" => Ok(PipelineStage::RecoverStructure),
            "synthesize" | "synth" => Ok(PipelineStage::Synthesize),
            "implement" | "impl" => Ok(PipelineStage::Implement),
            "generate_bitstream" | "bitstream" => Ok(PipelineStage::GenerateBitstream),
            "clean" => Ok(PipelineStage::Clean),
            _ => Err(format!("unknown pipeline stage: {}", s)),
        }
    }
}

/// Named point in the pipeline where user hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    PreBuild,
    PreSynth,
    PostSynth,
    PreImpl,
    PostImpl,
    PostBitstream,
}

impl HookPoint {
    pub const ALL: [HookPoint; 6] = [
        HookPoint::PreBuild,
        HookPoint::PreSynth,
        HookPoint::PostSynth,
        HookPoint::PreImpl,
        HookPoint::PostImpl,
        HookPoint::PostBitstream,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::PreBuild => "pre_build",
            HookPoint::PreSynth => "pre_synth",
            HookPoint::PostSynth => "post_synth",
            HookPoint::PreImpl => "pre_impl",
            HookPoint::PostImpl => "post_impl",
            HookPoint::PostBitstream => "post_bitstream",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much `Clean` removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanLevel {
    /// Reset runs, drop logs and journals.
    #[default]
    Soft,
    /// Delete the project directory.
    Hard,
    /// Delete the project directory and every generated output.
    All,
}

impl CleanLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanLevel::Soft => "soft",
            CleanLevel::Hard => "hard",
            CleanLevel::All => "all",
        }
    }
}

impl fmt::Display for CleanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "soft" => Ok(CleanLevel::Soft),
            "hard" => Ok(CleanLevel::Hard),
            "all" => Ok(CleanLevel::All),
            _ => Err(format!("unknown clean level: {} (expected soft, hard or all)", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip_names() {
        for stage in PipelineStage::BUILD {
            assert_eq!(stage.as_str().parse::<PipelineStage>().unwrap(), stage);
        }
        assert_eq!("clean".parse::<PipelineStage>().unwrap(), PipelineStage::Clean);
        assert_eq!("synth".parse::<PipelineStage>().unwrap(), PipelineStage::Synthesize);
        assert_eq!(
            "generate-bitstream".parse::<PipelineStage>().unwrap(),
            PipelineStage::GenerateBitstream
        );
        assert!("place".parse::<PipelineStage>().is_err());
    }

    #[test]
    fn test_build_order_excludes_clean() {
        assert!(!PipelineStage::BUILD.contains(&PipelineStage::Clean));
        assert!(PipelineStage::BUILD.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_hook_points_per_stage() {
        assert_eq!(
            PipelineStage::Synthesize.pre_hooks(),
            &[HookPoint::PreBuild, HookPoint::PreSynth]
        );
        assert_eq!(PipelineStage::Implement.post_hooks(), &[HookPoint::PostImpl]);
        assert!(PipelineStage::CreateProject.pre_hooks().is_empty());
        assert_eq!(
            PipelineStage::GenerateBitstream.post_hooks(),
            &[HookPoint::PostBitstream]
        );
    }

    #[test]
    fn test_requires_project() {
        assert!(!PipelineStage::CreateProject.requires_project());
        assert!(!PipelineStage::Clean.requires_project());
        assert!(PipelineStage::Synthesize.requires_project());
        assert!(PipelineStage::GenerateBitstream.requires_project());
    }

    #[test]
    fn test_clean_level_parse() {
        assert_eq!("HARD".parse::<CleanLevel>().unwrap(), CleanLevel::Hard);
        assert_eq!(CleanLevel::default(), CleanLevel::Soft);
        assert!("nuke".parse::<CleanLevel>().is_err());
    }
}
