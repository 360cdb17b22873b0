//! kiln-lib: build orchestration for C and C++ projects.
//!
//! The pipeline, leaves first:
//! - `project`: validated in-memory project model
//! - `toolchain`: discovers compilers and archivers on the host
//! - `graph`: targets (or translation units) as a dependency graph
//! - `plan`: tiers of maximal parallelism plus pre-resolved tools
//! - `backend`: concrete build steps, Ninja and Makefile rendering
//! - `execute`: bounded parallel execution with skip propagation
//! - `session`: one build session from project to report

pub mod backend;
pub mod consts;
pub mod execute;
pub mod graph;
pub mod plan;
pub mod platform;
pub mod process;
pub mod project;
pub mod session;
pub mod toolchain;
pub mod util;
