//! Static build file generation against the fake toolchain.

use kiln_lib::backend::{BackendFormat, StepId};
use kiln_lib::graph::Granularity;
use kiln_lib::session::{SessionConfig, SessionState};

use super::common::{TestEnv, library_and_app};

#[tokio::test]
async fn ninja_file_orders_tiers() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let session = env.session();

  let build = session.generate(&project).await.unwrap();
  let ninja = BackendFormat::Ninja.render(&build);

  let cc = env.tools.cc.as_deref().unwrap();
  let ar = env.tools.ar.as_deref().unwrap();
  assert!(ninja.contains(cc));
  assert!(ninja.contains(ar));
  assert!(ninja.contains("build tier_0: phony"));
  assert!(ninja.contains("|| tier_0"));
  assert!(ninja.contains("default tier_1"));
  assert_eq!(session.state(), SessionState::Planning);
}

#[tokio::test]
async fn executable_links_the_library_artifact() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let session = env.session();

  let build = session.generate(&project).await.unwrap();

  let archive = build.step(&StepId("core:archive".to_string())).unwrap();
  let link = build.step(&StepId("app:link".to_string())).unwrap();
  let library = env.artifact(&project.targets[0]);
  assert_eq!(archive.outputs, vec![library.clone()]);
  assert!(link.inputs.contains(&library));
  assert!(link.args.contains(&library.display().to_string()));
  assert!(link.depends_on.contains(&archive.id));
}

#[tokio::test]
async fn makefile_lists_every_output() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let session = env.session();

  let build = session.generate(&project).await.unwrap();
  let make = BackendFormat::Makefile.render(&build);

  assert!(make.contains("all: tier_1"));
  for step in build.steps() {
    for output in &step.outputs {
      assert!(make.contains(&output.display().to_string()), "{} missing", output.display());
    }
  }
}

#[tokio::test]
async fn generation_does_not_touch_the_build_dir() {
  let env = TestEnv::new();
  let project = library_and_app(&env);
  let config = SessionConfig {
    granularity: Granularity::Unit,
    ..env.config()
  };
  let session = env.session_with(config);

  let build = session.generate(&project).await.unwrap();

  assert_eq!(build.len(), 4);
  assert!(!env.build_root().exists());
}
