//! Toolchain discovery.
//!
//! The resolver maps an abstract [`Capability`] to a concrete tool on the
//! host. Each capability is resolved at most once per resolver: the first
//! request probes the candidate list, later requests get the cached
//! descriptor. A resolver lives exactly as long as its build session.

pub mod candidates;
pub mod probe;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::consts::DEFAULT_PROBE_TIMEOUT;
use crate::platform::arch::Arch;
use crate::platform::os::Os;

pub use candidates::ToolOverrides;
pub use probe::{ProbeOutcome, Prober, ProcessProber};
pub use types::{Capability, ToolFamily, ToolKind, ToolchainDescriptor};

#[derive(Debug, Error)]
pub enum ToolchainError {
  #[error("no tool provides {capability} (tried: {})", .candidates.join(", "))]
  NotFound { capability: String, candidates: Vec<String> },
}

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
  /// Upper bound on each individual probe.
  pub probe_timeout: Duration,
  pub overrides: ToolOverrides,
  /// OS whose candidate names are used.
  pub os: Os,
  /// Architecture assumed when a tool does not report its target.
  pub host_arch: Option<Arch>,
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      probe_timeout: DEFAULT_PROBE_TIMEOUT,
      overrides: ToolOverrides::default(),
      os: Os::current().unwrap_or(Os::Linux),
      host_arch: Arch::current(),
    }
  }
}

/// Session-scoped, memoizing toolchain resolver.
pub struct ToolchainResolver<P: Prober = ProcessProber> {
  prober: P,
  config: ResolverConfig,
  cache: Mutex<HashMap<String, Arc<ToolchainDescriptor>>>,
  probe_sequences: AtomicUsize,
}

impl ToolchainResolver<ProcessProber> {
  pub fn new(config: ResolverConfig) -> Self {
    Self::with_prober(ProcessProber, config)
  }
}

impl<P: Prober> ToolchainResolver<P> {
  pub fn with_prober(prober: P, config: ResolverConfig) -> Self {
    Self {
      prober,
      config,
      cache: Mutex::new(HashMap::new()),
      probe_sequences: AtomicUsize::new(0),
    }
  }

  pub fn config(&self) -> &ResolverConfig {
    &self.config
  }

  /// Number of times a candidate list was actually probed.
  pub fn probe_sequences(&self) -> usize {
    self.probe_sequences.load(Ordering::SeqCst)
  }

  /// Resolve `capability`, probing only on the first request for its key.
  ///
  /// The cache lock is held for the whole probe sequence so concurrent
  /// requests for the same capability never probe twice.
  pub async fn resolve(&self, capability: &Capability) -> Result<Arc<ToolchainDescriptor>, ToolchainError> {
    let key = capability.key();
    let mut cache = self.cache.lock().await;
    if let Some(found) = cache.get(&key) {
      debug!(capability = %key, path = %found.path.display(), "toolchain cache hit");
      return Ok(Arc::clone(found));
    }

    self.probe_sequences.fetch_add(1, Ordering::SeqCst);
    let descriptor = Arc::new(self.probe_candidates(capability).await?);
    info!(
      capability = %key,
      family = %descriptor.family,
      version = %descriptor.version,
      path = %descriptor.path.display(),
      "resolved toolchain"
    );
    cache.insert(key, Arc::clone(&descriptor));
    Ok(descriptor)
  }

  /// Every descriptor resolved so far, keyed by capability.
  pub async fn resolved(&self) -> Vec<(String, Arc<ToolchainDescriptor>)> {
    let cache = self.cache.lock().await;
    let mut entries: Vec<_> = cache.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
  }

  async fn probe_candidates(&self, capability: &Capability) -> Result<ToolchainDescriptor, ToolchainError> {
    let candidates = candidates::candidates_for(capability, self.config.os, &self.config.overrides);

    for candidate in &candidates {
      let outcome = self
        .prober
        .probe(&candidate.program, &candidate.version_args, self.config.probe_timeout)
        .await;

      let banner = match &outcome {
        ProbeOutcome::Exited { success, .. } => match outcome.banner() {
          Some(banner) if *success || candidate.version_args.is_empty() => banner,
          _ => {
            debug!(program = %candidate.program, "candidate did not answer version query");
            continue;
          }
        },
        ProbeOutcome::TimedOut => {
          warn!(program = %candidate.program, timeout = ?self.config.probe_timeout, "candidate probe timed out, skipping");
          continue;
        }
        ProbeOutcome::SpawnFailed(reason) => {
          debug!(program = %candidate.program, reason = %reason, "candidate not runnable");
          continue;
        }
      };

      match candidates::describe(candidate, capability, &banner, self.config.host_arch) {
        Some(descriptor) if descriptor.satisfies(capability) => return Ok(descriptor),
        Some(descriptor) => {
          debug!(
            program = %candidate.program,
            family = %descriptor.family,
            version = %descriptor.version,
            capability = %capability,
            "candidate does not satisfy capability"
          );
        }
        None => debug!(program = %candidate.program, "unrecognized tool banner"),
      }
    }

    Err(ToolchainError::NotFound {
      capability: capability.key(),
      candidates: candidates.into_iter().map(|c| c.program).collect(),
    })
  }
}
