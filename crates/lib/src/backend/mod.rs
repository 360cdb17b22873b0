//! Backend generation.
//!
//! Turns a [`BuildPlan`] into concrete [`BuildStep`]s: one compile step per
//! translation unit and one link or archive step per target. The resulting
//! [`GeneratedBuild`] can be executed directly, previewed, or rendered into a
//! static build file by a [`BackendFormat`].

pub mod flags;
pub mod make;
pub mod ninja;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{BuildGraph, NodeId, NodeUnit, compile_capability, link_capability};
use crate::plan::BuildPlan;
use crate::platform::Platform;
use crate::platform::os::Os;
use crate::project::{ExternalLibrary, Project, Target, TargetKind};
use crate::toolchain::{Capability, ToolFamily, ToolchainDescriptor};
use crate::util::hash::path_digest;

use flags::{CompileInputs, LinkInputs};
pub use types::{BuildStep, GeneratedBuild, StepId, StepKind, StepTier};

#[derive(Debug, Error)]
pub enum GenerateError {
  #[error("output {} is produced by both {first} and {second}", .path.display())]
  OutputCollision { path: PathBuf, first: StepId, second: StepId },

  #[error("no toolchain resolved for {capability} on node {node}")]
  MissingToolchain { node: String, capability: String },
}

/// Where and for what the steps are generated.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
  /// Root of all generated outputs; also each step's working directory.
  pub build_dir: PathBuf,
  /// Base for relative source and include paths.
  pub source_dir: PathBuf,
  /// Platform whose naming conventions apply to artifacts.
  pub platform: Platform,
}

/// Static build file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFormat {
  Ninja,
  Makefile,
}

impl BackendFormat {
  pub fn render(&self, build: &GeneratedBuild) -> String {
    match self {
      Self::Ninja => ninja::render(build),
      Self::Makefile => make::render(build),
    }
  }

  /// Conventional file name for the rendered artifact.
  pub fn file_name(&self) -> &'static str {
    match self {
      Self::Ninja => "build.ninja",
      Self::Makefile => "Makefile",
    }
  }
}

impl fmt::Display for BackendFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Ninja => "ninja",
      Self::Makefile => "makefile",
    })
  }
}

/// Final artifact of `target` relative to the build directory.
pub fn artifact_path(target: &Target, os: Os) -> PathBuf {
  let name = &target.name;
  match target.kind {
    TargetKind::Executable => Path::new("bin").join(format!("{}{}", name, os.exe_suffix())),
    TargetKind::SharedLibrary => {
      let (prefix, suffix) = os.shared_lib_affixes();
      let dir = if os == Os::Windows { "bin" } else { "lib" };
      Path::new(dir).join(format!("{}{}{}", prefix, name, suffix))
    }
    TargetKind::StaticLibrary => {
      let (prefix, suffix) = os.static_lib_affixes();
      Path::new("lib").join(format!("{}{}{}", prefix, name, suffix))
    }
  }
}

/// Object file for `source` of `target`: `obj/<target>/<stem>-<digest>.o`.
///
/// The digest covers the whole source path so sources sharing a stem, or
/// shared between targets, never map to the same object.
pub fn object_path(target: &Target, source: &Path, family: ToolFamily) -> PathBuf {
  let stem = source.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
  let ext = if family.is_msvc() { "obj" } else { "o" };
  Path::new("obj")
    .join(&target.name)
    .join(format!("{}-{}.{}", stem, path_digest(source), ext))
}

/// What a linked target pulls in from its dependencies.
#[derive(Debug, Default)]
struct LinkClosure<'p> {
  /// In-project artifacts, dependents before dependencies.
  libraries: Vec<&'p Target>,
  externals: Vec<&'p ExternalLibrary>,
  include_dirs: Vec<PathBuf>,
}

/// Walk dependencies of `target`. Static libraries do not carry their own
/// dependencies, so the walk continues through them; shared libraries were
/// already linked against theirs.
fn link_closure<'p>(project: &'p Project, target: &'p Target) -> LinkClosure<'p> {
  fn walk<'p>(project: &'p Project, target: &'p Target, seen: &mut HashSet<&'p str>, closure: &mut LinkClosure<'p>) {
    for dep in &target.dependencies {
      if let Some(dep_target) = project.target(dep) {
        if !seen.insert(dep_target.name.as_str()) {
          continue;
        }
        closure.libraries.push(dep_target);
        for dir in &dep_target.include_dirs {
          if !closure.include_dirs.contains(dir) {
            closure.include_dirs.push(dir.clone());
          }
        }
        if dep_target.kind == TargetKind::StaticLibrary {
          walk(project, dep_target, seen, closure);
        }
      } else if let Some(lib) = project.external_library(dep)
        && !closure.externals.iter().any(|e| e.name == lib.name)
      {
        closure.externals.push(lib);
      }
    }
  }

  let mut closure = LinkClosure::default();
  let mut seen = HashSet::new();
  seen.insert(target.name.as_str());
  walk(project, target, &mut seen, &mut closure);
  closure
}

struct Generator<'a, 'p> {
  graph: &'a BuildGraph<'p>,
  plan: &'a BuildPlan,
  config: &'a GenerateConfig,
  /// Last step of each node, the one successors wait on.
  final_steps: HashMap<NodeId, StepId>,
  /// Object files produced per target, in source order.
  objects: HashMap<&'p str, Vec<(PathBuf, StepId)>>,
  next_index: usize,
}

impl<'a, 'p> Generator<'a, 'p> {
  fn toolchain(&self, node: NodeId, capability: &Capability) -> Result<Arc<ToolchainDescriptor>, GenerateError> {
    self
      .plan
      .toolchain(node, capability)
      .cloned()
      .ok_or_else(|| GenerateError::MissingToolchain {
        node: self.graph.node(node).label(),
        capability: capability.key(),
      })
  }

  fn source_path(&self, source: &Path) -> PathBuf {
    self.config.source_dir.join(source)
  }

  fn predecessor_steps(&self, node: NodeId) -> Vec<StepId> {
    self
      .graph
      .predecessors(node)
      .into_iter()
      .filter_map(|p| self.final_steps.get(&p).cloned())
      .collect()
  }

  fn next_index(&mut self) -> usize {
    let index = self.next_index;
    self.next_index += 1;
    index
  }

  fn compile_step(&mut self, node: NodeId, tier: usize, source: &'p Path) -> Result<BuildStep, GenerateError> {
    let target = self.graph.node(node).target;
    let project = self.graph.project();
    let capability = compile_capability(target, source, &project.options);
    let tool = self.toolchain(node, &capability)?;

    let object = self.config.build_dir.join(object_path(target, source, tool.family));
    let source_path = self.source_path(source);
    let options = target.effective_options(&project.options);
    let standard = match &capability {
      Capability::Compiler { standard, .. } => standard.as_deref(),
      Capability::Archiver => None,
    };

    let mut include_dirs: Vec<PathBuf> = target.include_dirs.iter().map(|d| self.source_path(d)).collect();
    for dir in link_closure(project, target).include_dirs {
      let dir = self.source_path(&dir);
      if !include_dirs.contains(&dir) {
        include_dirs.push(dir);
      }
    }

    let args = flags::compile_args(
      tool.family,
      &CompileInputs {
        source: &source_path,
        object: &object,
        include_dirs: &include_dirs,
        defines: &target.defines,
        options: &options,
        standard,
        pic: target.kind == TargetKind::SharedLibrary && self.config.platform.os.needs_pic(),
      },
    );

    let id = StepId(format!("{}:compile:{}", target.name, source.display()));
    self
      .objects
      .entry(target.name.as_str())
      .or_default()
      .push((object.clone(), id.clone()));

    Ok(BuildStep {
      id,
      index: self.next_index(),
      tier,
      target: target.name.clone(),
      kind: StepKind::Compile {
        source: source.to_path_buf(),
      },
      program: tool.path.clone(),
      args,
      cwd: self.config.build_dir.clone(),
      inputs: vec![source_path],
      outputs: vec![object],
      depends_on: self.predecessor_steps(node),
      response_file: false,
    })
  }

  fn final_step(&mut self, node: NodeId, tier: usize) -> Result<BuildStep, GenerateError> {
    let build_node = self.graph.node(node);
    let target = build_node.target;
    let project = self.graph.project();
    let capability = link_capability(project, target);
    let tool = self.toolchain(node, &capability)?;
    let os = self.config.platform.os;
    let output = self.config.build_dir.join(artifact_path(target, os));

    let (objects, object_steps): (Vec<PathBuf>, Vec<StepId>) = self
      .objects
      .get(target.name.as_str())
      .map(|objs| objs.iter().cloned().unzip())
      .unwrap_or_default();

    let mut depends_on = self.predecessor_steps(node);
    for step in object_steps {
      if !depends_on.contains(&step) {
        depends_on.push(step);
      }
    }

    let (kind, args, inputs, outputs) = match target.kind {
      TargetKind::StaticLibrary => {
        let args = flags::archive_args(tool.family, &output, &objects);
        (StepKind::Archive, args, objects, vec![output])
      }
      TargetKind::Executable | TargetKind::SharedLibrary => {
        let closure = link_closure(project, target);
        let libraries: Vec<PathBuf> = closure
          .libraries
          .iter()
          .map(|lib| self.config.build_dir.join(link_input_path(lib, os, tool.family)))
          .collect();

        let mut externals: Vec<&ExternalLibrary> = build_node.external_libs.clone();
        for lib in closure.externals {
          if !externals.iter().any(|e| e.name == lib.name) {
            externals.push(lib);
          }
        }
        let external_names: Vec<String> = externals.iter().map(|e| e.name.clone()).collect();
        let search_dirs: Vec<PathBuf> = externals
          .iter()
          .filter_map(|e| e.search_dir.as_ref())
          .map(|d| self.source_path(d))
          .collect();

        let shared = target.kind == TargetKind::SharedLibrary;
        let args = flags::link_args(
          tool.family,
          &LinkInputs {
            output: &output,
            objects: &objects,
            libraries: &libraries,
            external_names: &external_names,
            search_dirs: &search_dirs,
            shared,
          },
        );

        let mut outputs = vec![output];
        if shared && tool.family.is_msvc() {
          outputs.push(self.config.build_dir.join(link_input_path(target, os, tool.family)));
        }
        let mut inputs = objects;
        inputs.extend(libraries);
        (StepKind::Link { kind: target.kind }, args, inputs, outputs)
      }
    };

    let verb = match kind {
      StepKind::Archive => "archive",
      _ => "link",
    };
    Ok(BuildStep {
      id: StepId(format!("{}:{}", target.name, verb)),
      index: self.next_index(),
      tier,
      target: target.name.clone(),
      kind,
      program: tool.path.clone(),
      args,
      cwd: self.config.build_dir.clone(),
      inputs,
      outputs,
      depends_on,
      response_file: true,
    })
  }
}

/// File passed to the linker to link against `target`. MSVC links DLLs
/// through their import library, written next to the DLL.
fn link_input_path(target: &Target, os: Os, family: ToolFamily) -> PathBuf {
  let artifact = artifact_path(target, os);
  if target.kind == TargetKind::SharedLibrary && family.is_msvc() {
    artifact.with_extension("lib")
  } else {
    artifact
  }
}

/// Generate the steps for `plan`.
///
/// # Errors
///
/// `OutputCollision` when two steps declare the same output.
pub fn generate(graph: &BuildGraph<'_>, plan: &BuildPlan, config: &GenerateConfig) -> Result<GeneratedBuild, GenerateError> {
  let mut generator = Generator {
    graph,
    plan,
    config,
    final_steps: HashMap::new(),
    objects: HashMap::new(),
    next_index: 0,
  };

  let mut tiers = Vec::with_capacity(plan.tiers.len());
  for (tier_index, tier) in plan.tiers.iter().enumerate() {
    let mut steps = Vec::new();
    for &node in tier {
      let build_node = graph.node(node);
      let last = match build_node.unit {
        NodeUnit::Compile { source } => generator.compile_step(node, tier_index, source)?,
        NodeUnit::Target => {
          for source in &build_node.target.sources {
            steps.push(generator.compile_step(node, tier_index, source)?);
          }
          generator.final_step(node, tier_index)?
        }
        NodeUnit::Link => generator.final_step(node, tier_index)?,
      };
      generator.final_steps.insert(node, last.id.clone());
      steps.push(last);
    }
    debug!(tier = tier_index, steps = steps.len(), "generated tier");
    tiers.push(StepTier {
      index: tier_index,
      steps,
    });
  }

  let build = GeneratedBuild {
    project: graph.project().name.clone(),
    tiers,
  };
  check_disjoint_outputs(&build)?;
  info!(steps = build.len(), tiers = build.tiers.len(), "generated build steps");
  Ok(build)
}

fn check_disjoint_outputs(build: &GeneratedBuild) -> Result<(), GenerateError> {
  let mut owners: HashMap<&Path, &StepId> = HashMap::new();
  for step in build.steps() {
    for output in &step.outputs {
      if let Some(first) = owners.insert(output.as_path(), &step.id) {
        return Err(GenerateError::OutputCollision {
          path: output.clone(),
          first: first.clone(),
          second: step.id.clone(),
        });
      }
    }
  }
  Ok(())
}
