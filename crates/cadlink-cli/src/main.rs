//! cadlink CLI - export CAD assemblies as URDF
//!
//! Reads an assembly description (parts, mates, relations) as JSON, builds the
//! kinematic tree and writes a URDF file plus a mesh download manifest.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use cadlink_graph::{build_rooted_tree, RootPolicy, TreeBuild};
use cadlink_ir::AssemblyInput;
use cadlink_kinematics::{synthesize_blocking, SynthesisConfig};
use cadlink_urdf::{write_urdf, UrdfOptions};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cadlink")]
#[command(about = "Turn CAD assemblies into URDF robot descriptions", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write <name>.urdf and assets.json for an assembly
    Export {
        /// Assembly JSON file
        input: PathBuf,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Robot name (default: assembly name)
        #[arg(short, long)]
        name: Option<String>,
        /// Synthesis settings (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Occurrence to use as the root body
        #[arg(long)]
        root: Option<String>,
        /// Mesh directory referenced from the URDF
        #[arg(long, default_value = "meshes")]
        mesh_dir: String,
    },
    /// Show the kinematic tree of an assembly
    Inspect {
        /// Assembly JSON file
        input: PathBuf,
        /// Occurrence to use as the root body
        #[arg(long)]
        root: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Export {
            input,
            output,
            name,
            config,
            root,
            mesh_dir,
        } => export(&input, &output, name, config.as_deref(), root, mesh_dir),
        Commands::Inspect { input, root } => inspect(&input, root),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_assembly(path: &Path) -> Result<AssemblyInput> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let input = AssemblyInput::from_json(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    input
        .validate()
        .with_context(|| format!("Invalid assembly {}", path.display()))?;
    Ok(input)
}

fn load_config(path: Option<&Path>) -> Result<SynthesisConfig> {
    let Some(path) = path else {
        return Ok(SynthesisConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    SynthesisConfig::from_toml_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))
}

fn root_policy(root: Option<String>) -> RootPolicy {
    root.map(RootPolicy::Explicit).unwrap_or_default()
}

fn build_tree(input: &AssemblyInput, root: Option<String>) -> Result<TreeBuild> {
    build_rooted_tree(&input.parts, &input.mates, &root_policy(root))
        .context("Failed to build kinematic tree")
}

/// Robot name from the flag, the assembly, or the input file stem.
fn robot_name(flag: Option<String>, input: &AssemblyInput, path: &Path) -> String {
    flag.filter(|n| !n.trim().is_empty())
        .or_else(|| Some(input.name.clone()).filter(|n| !n.trim().is_empty()))
        .unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("robot")
                .to_string()
        })
}

fn export(
    input_path: &Path,
    output: &Path,
    name: Option<String>,
    config: Option<&Path>,
    root: Option<String>,
    mesh_dir: String,
) -> Result<()> {
    let input = load_assembly(input_path)?;
    let config = load_config(config)?;
    let build = build_tree(&input, root)?;

    let model = synthesize_blocking(&input, &build.tree, &config)
        .context("Kinematic synthesis failed")?;
    for warning in &model.warnings {
        tracing::warn!("{}", warning);
    }

    let name = robot_name(name, &input, input_path);
    let urdf = write_urdf(&name, &model, &UrdfOptions { mesh_dir, ..Default::default() })
        .context("Failed to write URDF")?;
    let manifest = serde_json::to_string_pretty(&model.assets)?;

    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    let urdf_path = output.join(format!("{name}.urdf"));
    fs::write(&urdf_path, urdf)
        .with_context(|| format!("Failed to write {}", urdf_path.display()))?;
    let manifest_path = output.join("assets.json");
    fs::write(&manifest_path, manifest)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    println!("Exported {} to {}", name, urdf_path.display());
    println!("  Bodies: {}", model.bodies.len());
    println!("  Joints: {}", model.joints.len());
    println!("  Meshes: {} (see {})", model.assets.len(), manifest_path.display());
    println!(
        "  Warnings: {}",
        model.warnings.len() + build.loop_mates.len() + build.unreachable.len()
    );
    Ok(())
}

fn inspect(input_path: &Path, root: Option<String>) -> Result<()> {
    let input = load_assembly(input_path)?;
    let build = build_tree(&input, root)?;
    let mates = input.mate_table();
    let tree = &build.tree;

    println!("Assembly: {}", input.name);
    println!("  Parts: {}", input.parts.len());
    println!("  Mates: {}", input.mates.len());
    println!("  Relations: {}", input.relations.len());
    println!("\nRoot: {}", tree.root());

    if !tree.edges().is_empty() {
        println!("\nEdges:");
        for edge in tree.edges() {
            let key = edge.key();
            let mate = mates.get(&key).or_else(|| mates.get(&key.reversed()));
            let depth = tree.depth(&edge.child).unwrap_or(0);
            match mate {
                Some(mate) => println!(
                    "  {}{} -> {} ({:?} '{}')",
                    "  ".repeat(depth.saturating_sub(1)),
                    edge.parent,
                    edge.child,
                    mate.mate_type,
                    mate.name
                ),
                None => println!("  {} -> {} (no mate)", edge.parent, edge.child),
            }
        }
    }

    if !build.loop_mates.is_empty() {
        println!("\nLoop-closing mates:");
        for key in &build.loop_mates {
            println!("  {}", key);
        }
    }
    if !build.unreachable.is_empty() {
        println!("\nUnreachable parts:");
        for part in &build.unreachable {
            println!("  {}", part);
        }
    }
    if !build.ignored_mates.is_empty() {
        println!("\nIgnored mates (unknown occurrences):");
        for key in &build.ignored_mates {
            println!("  {}", key);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_export() {
        let cli = Cli::parse_from([
            "cadlink", "-v", "export", "arm.json", "-o", "out", "--root", "base",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Export {
                input,
                output,
                root,
                mesh_dir,
                ..
            } => {
                assert_eq!(input, PathBuf::from("arm.json"));
                assert_eq!(output, PathBuf::from("out"));
                assert_eq!(root.as_deref(), Some("base"));
                assert_eq!(mesh_dir, "meshes");
            }
            Commands::Inspect { .. } => panic!("expected export"),
        }
    }

    #[test]
    fn test_root_policy_from_flag() {
        assert_eq!(root_policy(None), RootPolicy::Auto);
        assert_eq!(
            root_policy(Some("base".to_string())),
            RootPolicy::Explicit("base".to_string())
        );
    }

    #[test]
    fn test_robot_name_fallbacks() {
        let mut input = AssemblyInput {
            name: String::new(),
            document: cadlink_ir::DocumentRef {
                document_id: "d".to_string(),
                workspace_id: "w".to_string(),
            },
            parts: Default::default(),
            mates: Vec::new(),
            relations: Vec::new(),
        };
        let path = Path::new("/tmp/gripper.json");
        assert_eq!(robot_name(None, &input, path), "gripper");
        input.name = "Gripper".to_string();
        assert_eq!(robot_name(None, &input, path), "Gripper");
        assert_eq!(robot_name(Some("g2".to_string()), &input, path), "g2");
        assert_eq!(robot_name(Some(" ".to_string()), &input, path), "Gripper");
    }

    #[test]
    fn test_missing_config_gives_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config.max_concurrency, SynthesisConfig::default().max_concurrency);
    }
}
