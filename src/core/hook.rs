//! User hooks attached to pipeline stage boundaries.
//!
//! A hook value in configuration may be a single command, a multi-line string
//! (one command per line) or a list. All three normalise through
//! [`HookValue::commands`], which both the script templates and the hook
//! executor use.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::stage::HookPoint;

/// Hook value as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "RawHook", into = "RawHook")]
pub enum HookValue {
    /// A single command line.
    Command(String),
    /// Newline-separated commands.
    Lines(String),
    /// Ordered commands or script paths.
    List(Vec<String>),
}

#[derive(Deserialize, Serialize)]
#[serde(untagged)]
enum RawHook {
    Text(String),
    List(Vec<String>),
}

impl From<RawHook> for HookValue {
    fn from(raw: RawHook) -> Self {
        match raw {
            RawHook::Text(s) if s.contains('\n') => HookValue::Lines(s),
            RawHook::Text(s) => HookValue::Command(s),
            RawHook::List(items) => HookValue::List(items),
        }
    }
}

impl From<HookValue> for RawHook {
    fn from(value: HookValue) -> Self {
        match value {
            HookValue::Command(s) | HookValue::Lines(s) => RawHook::Text(s),
            HookValue::List(items) => RawHook::List(items),
        }
    }
}

impl From<&str> for HookValue {
    fn from(s: &str) -> Self {
        RawHook::Text(s.to_string()).into()
    }
}

impl From<Vec<String>> for HookValue {
    fn from(items: Vec<String>) -> Self {
        HookValue::List(items)
    }
}

impl HookValue {
    /// Flatten into an ordered list of non-empty commands.
    pub fn commands(&self) -> Vec<String> {
        match self {
            HookValue::Command(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Vec::new()
                } else {
                    vec![s.to_string()]
                }
            }
            HookValue::Lines(s) => s
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            HookValue::List(items) => items
                .iter()
                .filter(|item| !item.trim().is_empty())
                .cloned()
                .collect(),
        }
    }

    /// Normalise and classify each entry against the filesystem.
    ///
    /// Relative entries are looked up under `base`.
    pub fn resolve(&self, base: &Path) -> Vec<HookCommand> {
        self.commands()
            .into_iter()
            .map(|cmd| HookCommand::classify(cmd, base))
            .collect()
    }
}

/// One resolved hook entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCommand {
    /// An existing script file.
    Script(PathBuf),
    /// A literal command line.
    Command(String),
}

impl HookCommand {
    fn classify(cmd: String, base: &Path) -> Self {
        let candidate = Path::new(&cmd);
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            base.join(candidate)
        };

        if candidate.is_file() {
            HookCommand::Script(candidate)
        } else {
            HookCommand::Command(cmd)
        }
    }

    /// Human-readable form for logs.
    pub fn display(&self) -> String {
        match self {
            HookCommand::Script(path) => path.display().to_string(),
            HookCommand::Command(cmd) => cmd.clone(),
        }
    }
}

/// Where hooks run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookMode {
    /// Injected into the generated tool script.
    #[default]
    Script,
    /// Run on the host around each stage by the pipeline driver.
    Host,
}

/// The `[build.hooks]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub mode: HookMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_build: Option<HookValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_synth: Option<HookValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_synth: Option<HookValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_impl: Option<HookValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_impl: Option<HookValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_bitstream: Option<HookValue>,

    /// Script sourced after bitstream generation to merge/convert images
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin_merge_script: Option<PathBuf>,
}

impl HooksConfig {
    pub fn get(&self, point: HookPoint) -> Option<&HookValue> {
        match point {
            HookPoint::PreBuild => self.pre_build.as_ref(),
            HookPoint::PreSynth => self.pre_synth.as_ref(),
            HookPoint::PostSynth => self.post_synth.as_ref(),
            HookPoint::PreImpl => self.pre_impl.as_ref(),
            HookPoint::PostImpl => self.post_impl.as_ref(),
            HookPoint::PostBitstream => self.post_bitstream.as_ref(),
        }
    }

    /// Resolved commands for a hook point; empty when unset.
    pub fn resolve(&self, point: HookPoint, base: &Path) -> Vec<HookCommand> {
        self.get(point)
            .map(|hook| hook.resolve(base))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_single_command() {
        let hook = HookValue::from("echo hello");
        assert_eq!(hook, HookValue::Command("echo hello".into()));
        assert_eq!(hook.commands(), vec!["echo hello"]);
    }

    #[test]
    fn test_multiline_splits_and_drops_blanks() {
        let hook = HookValue::from("echo a\n\n   \n  echo b  \n");
        assert!(matches!(hook, HookValue::Lines(_)));
        assert_eq!(hook.commands(), vec!["echo a", "echo b"]);
    }

    #[test]
    fn test_list_preserves_order() {
        let hook = HookValue::from(vec![
            "echo b".to_string(),
            "".to_string(),
            "echo a".to_string(),
        ]);
        assert_eq!(hook.commands(), vec!["echo b", "echo a"]);
    }

    #[test]
    fn test_blank_command_is_empty() {
        assert!(HookValue::from("   ").commands().is_empty());
    }

    #[test]
    fn test_deserialize_forms() {
        #[derive(Deserialize)]
        struct Wrapper {
            a: HookValue,
            b: HookValue,
            c: HookValue,
        }

        let w: Wrapper = toml::from_str(
            r#"
a = "echo one"
b = """
echo two
echo three
"""
c = ["echo four", "echo five"]
"#,
        )
        .unwrap();

        assert_eq!(w.a.commands(), vec!["echo one"]);
        assert_eq!(w.b.commands(), vec!["echo two", "echo three"]);
        assert_eq!(w.c.commands(), vec!["echo four", "echo five"]);
    }

    #[test]
    fn test_resolve_detects_scripts() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("scripts")).unwrap();
        fs::write(tmp.path().join("scripts/pre.tcl"), "puts hi").unwrap();

        let hook = HookValue::from(vec![
            "scripts/pre.tcl".to_string(),
            "puts inline".to_string(),
        ]);
        let resolved = hook.resolve(tmp.path());

        assert_eq!(
            resolved,
            vec![
                HookCommand::Script(tmp.path().join("scripts/pre.tcl")),
                HookCommand::Command("puts inline".into()),
            ]
        );
    }

    #[test]
    fn test_hooks_config_lookup() {
        let hooks: HooksConfig = toml::from_str(
            r#"
post_bitstream = ["echo a", "echo b"]
bin_merge_script = "scripts/merge.tcl"
"#,
        )
        .unwrap();

        let tmp = TempDir::new().unwrap();
        assert_eq!(hooks.resolve(HookPoint::PostBitstream, tmp.path()).len(), 2);
        assert!(hooks.resolve(HookPoint::PreSynth, tmp.path()).is_empty());
        assert_eq!(
            hooks.bin_merge_script.as_deref(),
            Some(Path::new("scripts/merge.tcl"))
        );
        assert_eq!(hooks.mode, HookMode::Script);

        let host: HooksConfig = toml::from_str("mode = \"host\"").unwrap();
        assert_eq!(host.mode, HookMode::Host);
    }
}
