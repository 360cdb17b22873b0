//! Dependency graph construction.
//!
//! Converts a [`Project`] into a directed graph of [`BuildNode`]s. Edges point
//! from a node to the nodes that must wait for it. Nodes borrow their targets
//! from the project, so the graph cannot outlive the model it was built from.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::project::{BuildOptions, ExternalLibrary, Language, Project, Target, TargetKind};
use crate::toolchain::Capability;

pub type NodeId = NodeIndex;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
  #[error("target '{target}' depends on '{dependency}', which is neither a target nor an external library")]
  UnresolvedDependency { target: String, dependency: String },

  #[error("dependency cycle: {}", .path.join(" -> "))]
  DependencyCycle { path: Vec<String> },
}

/// How finely targets are split into nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
  /// One node per target, compiling and linking it.
  #[default]
  Target,
  /// One node per translation unit plus one link node per target.
  Unit,
}

impl Granularity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Target => "target",
      Self::Unit => "unit",
    }
  }
}

impl fmt::Display for Granularity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Which part of a target a node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeUnit<'p> {
  /// The whole target.
  Target,
  Compile { source: &'p Path },
  Link,
}

#[derive(Debug, Clone)]
pub struct BuildNode<'p> {
  pub target: &'p Target,
  pub unit: NodeUnit<'p>,
  /// Tools this node needs, deduplicated, in first-use order.
  pub requirements: Vec<Capability>,
  /// Declared external libraries this node links against.
  pub external_libs: Vec<&'p ExternalLibrary>,
}

impl BuildNode<'_> {
  /// Stable label used for ordering and display.
  pub fn label(&self) -> String {
    match self.unit {
      NodeUnit::Target => self.target.name.clone(),
      NodeUnit::Compile { source } => format!("{}#compile:{}", self.target.name, source.display()),
      NodeUnit::Link => format!("{}#link", self.target.name),
    }
  }

  /// Whether this node produces the target's final artifact.
  pub fn is_final(&self) -> bool {
    !matches!(self.unit, NodeUnit::Compile { .. })
  }
}

/// Capability needed to compile `source` of `target`.
///
/// C sources inside a C++ target are compiled as C; the standard is only
/// requested when it belongs to the source's language.
pub fn compile_capability(target: &Target, source: &Path, defaults: &BuildOptions) -> Capability {
  let language = Language::of_source(source).unwrap_or_else(|| target.language());
  let options = target.effective_options(defaults);
  let standard = options.standard.as_deref().filter(|s| language.accepts_standard(s));
  Capability::compiler(language, standard)
}

/// Capability needed to produce the final artifact of `target`.
///
/// Executables and shared libraries link with the driver of
/// [`Project::link_language`].
pub fn link_capability(project: &Project, target: &Target) -> Capability {
  match target.kind {
    TargetKind::StaticLibrary => Capability::Archiver,
    TargetKind::Executable | TargetKind::SharedLibrary => {
      let language = project.link_language(target);
      let options = target.effective_options(&project.options);
      let standard = options.standard.as_deref().filter(|s| language.accepts_standard(s));
      Capability::compiler(language, standard)
    }
  }
}

fn push_unique(requirements: &mut Vec<Capability>, capability: Capability) {
  if !requirements.contains(&capability) {
    requirements.push(capability);
  }
}

pub struct BuildGraph<'p> {
  project: &'p Project,
  granularity: Granularity,
  graph: DiGraph<BuildNode<'p>, ()>,
  /// Node producing each target's final artifact.
  final_nodes: HashMap<&'p str, NodeId>,
}

impl<'p> BuildGraph<'p> {
  /// Build the graph for `project`.
  ///
  /// # Errors
  ///
  /// `UnresolvedDependency` when a dependency names neither a target nor a
  /// declared external library; `DependencyCycle` when in-project
  /// dependencies form a cycle.
  pub fn build(project: &'p Project, granularity: Granularity) -> Result<Self, GraphError> {
    let mut externals: HashMap<&str, Vec<&'p ExternalLibrary>> = HashMap::new();
    for target in &project.targets {
      let entry = externals.entry(target.name.as_str()).or_default();
      for dep in &target.dependencies {
        if project.target(dep).is_some() {
          continue;
        }
        match project.external_library(dep) {
          Some(lib) => entry.push(lib),
          None => {
            return Err(GraphError::UnresolvedDependency {
              target: target.name.clone(),
              dependency: dep.clone(),
            });
          }
        }
      }
    }

    if let Some(path) = find_cycle(project) {
      return Err(GraphError::DependencyCycle { path });
    }

    let mut graph = DiGraph::new();
    let mut final_nodes = HashMap::new();
    let defaults = &project.options;

    for target in &project.targets {
      let external_libs = externals.remove(target.name.as_str()).unwrap_or_default();
      match granularity {
        Granularity::Target => {
          let mut requirements = Vec::new();
          for source in &target.sources {
            push_unique(&mut requirements, compile_capability(target, source, defaults));
          }
          push_unique(&mut requirements, link_capability(project, target));
          let idx = graph.add_node(BuildNode {
            target,
            unit: NodeUnit::Target,
            requirements,
            external_libs,
          });
          final_nodes.insert(target.name.as_str(), idx);
        }
        Granularity::Unit => {
          let link = graph.add_node(BuildNode {
            target,
            unit: NodeUnit::Link,
            requirements: vec![link_capability(project, target)],
            external_libs,
          });
          for source in &target.sources {
            let compile = graph.add_node(BuildNode {
              target,
              unit: NodeUnit::Compile { source },
              requirements: vec![compile_capability(target, source, defaults)],
              external_libs: vec![],
            });
            graph.add_edge(compile, link, ());
          }
          final_nodes.insert(target.name.as_str(), link);
        }
      }
    }

    // Dependency's final node precedes the dependent's final node.
    for target in &project.targets {
      let dependent = final_nodes[target.name.as_str()];
      for dep in &target.dependencies {
        if let Some(&dependency) = final_nodes.get(dep.as_str()) {
          graph.add_edge(dependency, dependent, ());
        }
      }
    }

    debug!(
      nodes = graph.node_count(),
      edges = graph.edge_count(),
      granularity = %granularity,
      "built dependency graph"
    );

    Ok(Self {
      project,
      granularity,
      graph,
      final_nodes,
    })
  }

  pub fn project(&self) -> &'p Project {
    self.project
  }

  pub fn granularity(&self) -> Granularity {
    self.granularity
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn node(&self, id: NodeId) -> &BuildNode<'p> {
    &self.graph[id]
  }

  pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
    self.graph.node_indices()
  }

  /// Nodes that must complete before `id`.
  pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
    let mut preds: Vec<_> = self.graph.neighbors_directed(id, Direction::Incoming).collect();
    preds.sort();
    preds.dedup();
    preds
  }

  /// Nodes waiting on `id`.
  pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
    let mut succs: Vec<_> = self.graph.neighbors_directed(id, Direction::Outgoing).collect();
    succs.sort();
    succs.dedup();
    succs
  }

  /// The node producing the final artifact of `target`.
  pub fn final_node(&self, target: &str) -> Option<NodeId> {
    self.final_nodes.get(target).copied()
  }

  /// Every edge as `(before, after)`.
  pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
    self.graph.raw_edges().iter().map(|e| (e.source(), e.target()))
  }
}

/// Depth-first search over in-project "depends on" edges.
///
/// Returns the first cycle found as target names with the first name
/// repeated at the end. Targets are visited in declaration order.
fn find_cycle(project: &Project) -> Option<Vec<String>> {
  fn visit<'a>(
    project: &'a Project,
    name: &'a str,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    done: &mut HashSet<&'a str>,
  ) -> Option<Vec<String>> {
    stack.push(name);
    on_stack.insert(name);

    if let Some(target) = project.target(name) {
      for dep in &target.dependencies {
        let Some(dep_target) = project.target(dep) else {
          continue;
        };
        let dep = dep_target.name.as_str();
        if on_stack.contains(dep) {
          let start = stack.iter().position(|n| *n == dep).unwrap_or(0);
          let mut path: Vec<String> = stack[start..].iter().map(|n| n.to_string()).collect();
          path.push(dep.to_string());
          return Some(path);
        }
        if !done.contains(dep)
          && let Some(path) = visit(project, dep, stack, on_stack, done)
        {
          return Some(path);
        }
      }
    }

    stack.pop();
    on_stack.remove(name);
    done.insert(name);
    None
  }

  let mut done = HashSet::new();
  for target in &project.targets {
    if done.contains(target.name.as_str()) {
      continue;
    }
    let mut stack = Vec::new();
    let mut on_stack = HashSet::new();
    if let Some(path) = visit(project, &target.name, &mut stack, &mut on_stack, &mut done) {
      return Some(path);
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::project::ExternalLibrary;
  use crate::util::testutil::{project, target};
  use proptest::prelude::*;

  fn labels(graph: &BuildGraph<'_>, ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|&id| graph.node(id).label()).collect()
  }

  #[test]
  fn library_precedes_executable() {
    let p = project(vec![
      target("a", TargetKind::StaticLibrary, &["a.c"], &[]),
      target("b", TargetKind::Executable, &["main.c"], &["a"]),
    ]);
    let graph = BuildGraph::build(&p, Granularity::Target).unwrap();

    let b = graph.final_node("b").unwrap();
    assert_eq!(labels(&graph, &graph.predecessors(b)), vec!["a"]);
    assert_eq!(graph.node(graph.final_node("a").unwrap()).requirements.last(), Some(&Capability::Archiver));
  }

  #[test]
  fn two_target_cycle_reports_full_path() {
    let p = project(vec![
      target("X", TargetKind::StaticLibrary, &["x.c"], &["Y"]),
      target("Y", TargetKind::StaticLibrary, &["y.c"], &["X"]),
    ]);
    let err = BuildGraph::build(&p, Granularity::Target).err().unwrap();
    assert_eq!(
      err,
      GraphError::DependencyCycle {
        path: vec!["X".to_string(), "Y".to_string(), "X".to_string()]
      }
    );
    assert_eq!(err.to_string(), "dependency cycle: X -> Y -> X");
  }

  #[test]
  fn unknown_dependency_is_unresolved() {
    let p = project(vec![target("app", TargetKind::Executable, &["main.c"], &["zlib"])]);
    let err = BuildGraph::build(&p, Granularity::Target).err().unwrap();
    assert_eq!(
      err,
      GraphError::UnresolvedDependency {
        target: "app".to_string(),
        dependency: "zlib".to_string()
      }
    );
  }

  #[test]
  fn external_library_becomes_link_input_without_edge() {
    let mut p = project(vec![target("app", TargetKind::Executable, &["main.c"], &["z"])]);
    p.external_libraries.push(ExternalLibrary {
      name: "z".to_string(),
      search_dir: None,
    });
    let graph = BuildGraph::build(&p, Granularity::Target).unwrap();

    let app = graph.final_node("app").unwrap();
    assert!(graph.predecessors(app).is_empty());
    assert_eq!(graph.node(app).external_libs[0].name, "z");
    assert_eq!(graph.edges().count(), 0);
  }

  #[test]
  fn unit_granularity_splits_translation_units() {
    let p = project(vec![
      target("core", TargetKind::StaticLibrary, &["a.c", "b.c"], &[]),
      target("app", TargetKind::Executable, &["main.cpp"], &["core"]),
    ]);
    let graph = BuildGraph::build(&p, Granularity::Unit).unwrap();

    assert_eq!(graph.len(), 5);
    let app_link = graph.final_node("app").unwrap();
    assert_eq!(
      labels(&graph, &graph.predecessors(app_link)),
      vec!["core#link", "app#compile:main.cpp"]
    );
    let core_link = graph.final_node("core").unwrap();
    assert_eq!(graph.predecessors(core_link).len(), 2);
  }

  #[test]
  fn c_sources_in_cxx_target_use_c_compiler() {
    let mut t = target("mixed", TargetKind::Executable, &["util.c", "main.cpp"], &[]);
    t.options.standard = Some("c++17".to_string());
    let p = project(vec![t]);
    let graph = BuildGraph::build(&p, Granularity::Target).unwrap();

    let node = graph.node(graph.final_node("mixed").unwrap());
    assert_eq!(
      node.requirements,
      vec![
        Capability::compiler(Language::C, None),
        Capability::compiler(Language::Cxx, Some("c++17")),
      ]
    );
  }

  #[test]
  fn c_executable_links_as_cxx_over_cxx_archive() {
    let mut p = project(vec![
      target("core", TargetKind::StaticLibrary, &["impl.cpp"], &[]),
      target("app", TargetKind::Executable, &["main.c"], &["core"]),
    ]);
    p.options.standard = Some("c11".to_string());
    let graph = BuildGraph::build(&p, Granularity::Target).unwrap();

    let app = graph.node(graph.final_node("app").unwrap());
    assert_eq!(
      app.requirements,
      vec![
        Capability::compiler(Language::C, Some("c11")),
        Capability::compiler(Language::Cxx, None),
      ]
    );
  }

  /// Arbitrary dependency lists over `n` static libraries named `t0..tn`.
  fn arbitrary_deps() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..8)
      .prop_flat_map(|n| proptest::collection::vec(proptest::collection::vec(0..n, 0..3), n))
      .prop_map(|lists| {
        lists
          .into_iter()
          .map(|mut deps| {
            deps.sort_unstable();
            deps.dedup();
            deps
          })
          .collect()
      })
  }

  fn project_from(deps: &[Vec<usize>]) -> Project {
    let targets = deps
      .iter()
      .enumerate()
      .map(|(i, ds)| {
        let names: Vec<String> = ds.iter().map(|d| format!("t{}", d)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        target(&format!("t{}", i), TargetKind::StaticLibrary, &["lib.c"], &refs)
      })
      .collect();
    project(targets)
  }

  proptest! {
    #[test]
    fn reported_cycle_follows_real_edges(deps in arbitrary_deps()) {
      let p = project_from(&deps);
      if let Err(GraphError::DependencyCycle { path }) = BuildGraph::build(&p, Granularity::Target) {
        prop_assert!(path.len() >= 2);
        prop_assert_eq!(path.first(), path.last());
        for pair in path.windows(2) {
          let from = p.target(&pair[0]).unwrap();
          prop_assert!(from.dependencies.contains(&pair[1]), "{} does not depend on {}", pair[0], pair[1]);
        }
      }
    }
  }
}
