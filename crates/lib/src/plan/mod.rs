//! Build planning.
//!
//! Orders graph nodes into tiers of maximal parallelism and resolves every
//! tool the plan needs before anything runs.

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::graph::{BuildGraph, NodeId};
use crate::toolchain::{Capability, Prober, ToolchainDescriptor, ToolchainError, ToolchainResolver};

#[derive(Debug, Error)]
pub enum PlanError {
  #[error(transparent)]
  Toolchain(#[from] ToolchainError),

  #[error("nodes could not be ordered: {}", .remaining.join(", "))]
  Unschedulable { remaining: Vec<String> },
}

/// Tiers of node ids plus the tools resolved for each node.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPlan {
  pub tiers: Vec<Vec<NodeId>>,
  toolchains: HashMap<NodeId, Vec<(Capability, Arc<ToolchainDescriptor>)>>,
}

impl BuildPlan {
  pub fn node_count(&self) -> usize {
    self.tiers.iter().map(Vec::len).sum()
  }

  /// Tool resolved for `capability` on `node`.
  pub fn toolchain(&self, node: NodeId, capability: &Capability) -> Option<&Arc<ToolchainDescriptor>> {
    self
      .toolchains
      .get(&node)?
      .iter()
      .find(|(c, _)| c == capability)
      .map(|(_, d)| d)
  }

  /// Serializable view of the plan for display.
  pub fn summary(&self, graph: &BuildGraph<'_>) -> PlanSummary {
    let tiers = self
      .tiers
      .iter()
      .map(|tier| {
        tier
          .iter()
          .map(|&id| {
            let node = graph.node(id);
            PlannedNode {
              label: node.label(),
              target: node.target.name.clone(),
              kind: node.target.kind.to_string(),
              tools: self
                .toolchains
                .get(&id)
                .map(|tools| {
                  tools
                    .iter()
                    .map(|(cap, d)| PlannedTool {
                      capability: cap.key(),
                      family: d.family.to_string(),
                      version: d.version.clone(),
                      path: d.path.display().to_string(),
                    })
                    .collect()
                })
                .unwrap_or_default(),
            }
          })
          .collect()
      })
      .collect();
    PlanSummary {
      project: graph.project().name.clone(),
      granularity: graph.granularity().to_string(),
      tiers,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
  pub project: String,
  pub granularity: String,
  pub tiers: Vec<Vec<PlannedNode>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedNode {
  pub label: String,
  pub target: String,
  pub kind: String,
  pub tools: Vec<PlannedTool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedTool {
  pub capability: String,
  pub family: String,
  pub version: String,
  pub path: String,
}

/// Order the graph and resolve its tools.
///
/// Resolution is serial and memoized by the resolver, so a missing tool is
/// reported here, before any step exists.
pub async fn plan<P: Prober>(graph: &BuildGraph<'_>, resolver: &ToolchainResolver<P>) -> Result<BuildPlan, PlanError> {
  let tiers = compute_tiers(graph)?;

  let mut toolchains = HashMap::new();
  for &id in tiers.iter().flatten() {
    let node = graph.node(id);
    let mut resolved = Vec::with_capacity(node.requirements.len());
    for capability in &node.requirements {
      let descriptor = resolver.resolve(capability).await?;
      resolved.push((capability.clone(), descriptor));
    }
    toolchains.insert(id, resolved);
  }

  info!(
    tiers = tiers.len(),
    nodes = graph.len(),
    probes = resolver.probe_sequences(),
    "build plan ready"
  );
  Ok(BuildPlan { tiers, toolchains })
}

/// Kahn's algorithm, one tier per round.
///
/// Every zero in-degree node goes into the current tier; ties are broken by
/// node label so the result is deterministic.
pub fn compute_tiers(graph: &BuildGraph<'_>) -> Result<Vec<Vec<NodeId>>, PlanError> {
  let mut in_degree: HashMap<NodeIndex, usize> = graph
    .node_ids()
    .map(|id| (id, graph.predecessors(id).len()))
    .collect();

  let mut tiers = Vec::new();
  let mut ready: Vec<NodeId> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(id, _)| *id).collect();

  while !ready.is_empty() {
    let mut tier: Vec<(String, NodeId)> = ready.drain(..).map(|id| (graph.node(id).label(), id)).collect();
    tier.sort();

    for (_, id) in &tier {
      in_degree.remove(id);
      for succ in graph.successors(*id) {
        if let Some(degree) = in_degree.get_mut(&succ) {
          *degree = degree.saturating_sub(1);
          if *degree == 0 {
            ready.push(succ);
          }
        }
      }
    }

    debug!(tier = tiers.len(), nodes = tier.len(), "computed tier");
    tiers.push(tier.into_iter().map(|(_, id)| id).collect());
  }

  if !in_degree.is_empty() {
    let mut remaining: Vec<String> = in_degree.keys().map(|&id| graph.node(id).label()).collect();
    remaining.sort();
    return Err(PlanError::Unschedulable { remaining });
  }

  Ok(tiers)
}
