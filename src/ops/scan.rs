//! Source scanning: discovery followed by dependency ordering.

use crate::builder::deps;
use crate::builder::discovery::FileDiscovery;
use crate::core::artifact::{DiscoveryResult, SourceArtifact};
use crate::core::config::ProjectConfig;

/// Discover the project's sources, with HDL files in dependency order.
pub fn scan(config: &ProjectConfig) -> DiscoveryResult {
    let mut result = FileDiscovery::new(&config.root).scan(config);
    result.hdl = deps::order(&result.hdl);
    result
}

/// Human-readable listing of a scan.
pub fn format_scan(result: &DiscoveryResult) -> String {
    let mut output = String::new();
    let groups: [(&str, &[SourceArtifact]); 4] = [
        ("HDL (compile order)", &result.hdl),
        ("Constraints", &result.constraints),
        ("IP cores", &result.ip_cores),
        ("Block designs", &result.block_designs),
    ];

    for (title, artifacts) in groups {
        if artifacts.is_empty() {
            continue;
        }
        output.push_str(&format!("{} ({}):\n", title, artifacts.len()));
        for artifact in artifacts {
            output.push_str(&format!(
                "  {:<14} {}\n",
                artifact.language().as_str(),
                artifact.relative_path().display()
            ));
        }
        output.push('\n');
    }

    if result.is_empty() {
        output.push_str("No source files found.\n");
    } else {
        output.push_str(&format!("Total: {} file(s)\n", result.total()));
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn project(root: &Path) -> ProjectConfig {
        fs::create_dir_all(root.join("rtl/sub")).unwrap();
        fs::write(
            root.join("rtl/top.v"),
            "module top(input clk);\n  sub u_sub (.clk(clk));\nendmodule\n",
        )
        .unwrap();
        fs::write(root.join("rtl/sub/sub.v"), "module sub(input clk);\nendmodule\n").unwrap();
        fs::write(root.join("top.xdc"), "set_property PACKAGE_PIN E3 [get_ports clk]\n").unwrap();

        let text = "[project]\nname = \"b\"\n[fpga]\nvendor = \"xilinx\"\npart = \"p\"\n\
                    [[source.hdl]]\npattern = \"**/*.v\"\n\
                    [[source.constraints]]\npath = \"top.xdc\"\n";
        ProjectConfig::parse(text, &root.join("bitforge.toml")).unwrap()
    }

    #[test]
    fn test_scan_orders_hdl() {
        let tmp = TempDir::new().unwrap();
        let config = project(tmp.path());
        let result = scan(&config);

        let names: Vec<String> = result.hdl.iter().map(|a| a.file_name()).collect();
        assert_eq!(names, vec!["sub.v", "top.v"]);
        assert_eq!(result.constraints.len(), 1);
    }

    #[test]
    fn test_format_scan() {
        let tmp = TempDir::new().unwrap();
        let config = project(tmp.path());
        let text = format_scan(&scan(&config));

        assert!(text.contains("HDL (compile order) (2):"));
        assert!(text.contains("Constraints (1):"));
        assert!(text.contains("Total: 3 file(s)"));
        assert!(!text.contains("IP cores"));

        assert!(format_scan(&DiscoveryResult::default()).contains("No source files found."));
    }
}
