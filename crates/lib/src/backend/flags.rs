//! Command-line assembly per tool family.

use std::path::{Path, PathBuf};

use crate::project::{BuildOptions, OptLevel};
use crate::toolchain::ToolFamily;

/// Everything a compile invocation needs besides the tool itself.
pub struct CompileInputs<'a> {
  pub source: &'a Path,
  pub object: &'a Path,
  pub include_dirs: &'a [PathBuf],
  pub defines: &'a [String],
  pub options: &'a BuildOptions,
  /// Standard requested for this source's language, if any.
  pub standard: Option<&'a str>,
  pub pic: bool,
}

pub struct LinkInputs<'a> {
  pub output: &'a Path,
  pub objects: &'a [PathBuf],
  /// In-project artifacts, in link order.
  pub libraries: &'a [PathBuf],
  pub external_names: &'a [String],
  pub search_dirs: &'a [PathBuf],
  pub shared: bool,
}

fn path_arg(path: &Path) -> String {
  path.display().to_string()
}

pub fn compile_args(family: ToolFamily, inputs: &CompileInputs<'_>) -> Vec<String> {
  let mut args = Vec::new();
  if family.is_msvc() {
    args.push("/nologo".to_string());
    if let Some(standard) = inputs.standard {
      args.push(format!("/std:{}", standard));
    }
    args.push(
      match inputs.options.optimization {
        OptLevel::O0 => "/Od",
        OptLevel::O1 | OptLevel::Os => "/O1",
        OptLevel::O2 | OptLevel::O3 => "/O2",
      }
      .to_string(),
    );
    if inputs.options.debug {
      args.push("/Zi".to_string());
    }
    args.extend(inputs.defines.iter().map(|d| format!("/D{}", d)));
    args.extend(inputs.include_dirs.iter().map(|d| format!("/I{}", d.display())));
    args.push("/c".to_string());
    args.push(path_arg(inputs.source));
    args.push(format!("/Fo{}", inputs.object.display()));
  } else {
    if let Some(standard) = inputs.standard {
      args.push(format!("-std={}", standard));
    }
    args.push(
      match inputs.options.optimization {
        OptLevel::O0 => "-O0",
        OptLevel::O1 => "-O1",
        OptLevel::O2 => "-O2",
        OptLevel::O3 => "-O3",
        OptLevel::Os => "-Os",
      }
      .to_string(),
    );
    if inputs.options.debug {
      args.push("-g".to_string());
    }
    if inputs.pic {
      args.push("-fPIC".to_string());
    }
    args.extend(inputs.defines.iter().map(|d| format!("-D{}", d)));
    args.extend(inputs.include_dirs.iter().map(|d| format!("-I{}", d.display())));
    args.push("-c".to_string());
    args.push(path_arg(inputs.source));
    args.push("-o".to_string());
    args.push(path_arg(inputs.object));
  }
  args
}

/// Link an executable or shared library through the compiler driver.
pub fn link_args(family: ToolFamily, inputs: &LinkInputs<'_>) -> Vec<String> {
  let mut args = Vec::new();
  if family.is_msvc() {
    args.push("/nologo".to_string());
    if inputs.shared {
      args.push("/LD".to_string());
    }
    args.extend(inputs.objects.iter().map(|p| path_arg(p)));
    args.extend(inputs.libraries.iter().map(|p| path_arg(p)));
    args.extend(inputs.external_names.iter().map(|n| format!("{}.lib", n)));
    args.push(format!("/Fe{}", inputs.output.display()));
    if !inputs.search_dirs.is_empty() {
      args.push("/link".to_string());
      args.extend(inputs.search_dirs.iter().map(|d| format!("/LIBPATH:{}", d.display())));
    }
  } else {
    if inputs.shared {
      args.push("-shared".to_string());
    }
    args.push("-o".to_string());
    args.push(path_arg(inputs.output));
    args.extend(inputs.objects.iter().map(|p| path_arg(p)));
    args.extend(inputs.libraries.iter().map(|p| path_arg(p)));
    args.extend(inputs.search_dirs.iter().map(|d| format!("-L{}", d.display())));
    args.extend(inputs.external_names.iter().map(|n| format!("-l{}", n)));
  }
  args
}

pub fn archive_args(family: ToolFamily, output: &Path, objects: &[PathBuf]) -> Vec<String> {
  let mut args = match family {
    ToolFamily::MsvcLib => vec!["/nologo".to_string(), format!("/OUT:{}", output.display())],
    _ => vec!["rcs".to_string(), path_arg(output)],
  };
  args.extend(objects.iter().map(|p| path_arg(p)));
  args
}
