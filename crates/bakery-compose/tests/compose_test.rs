//! Integration tests for Compose to bake translation.
//!
//! These tests drive the public pipeline end to end:
//! 1. Resolve the environment (process variables and `.env`)
//! 2. Load and merge Compose files
//! 3. Translate services into targets and the default group
//! 4. Serialize the resulting configuration

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs;

use bakery_common::error::BakeError;
use bakery_common::types::Config;
use bakery_compose::env::{Environment, environ_to_map, load_dot_env};
use bakery_compose::{ConfigDetails, ConfigFile, parse_compose, parse_compose_files};

fn translate(files: &[(&str, &str)], environment: Environment) -> Result<Config, BakeError> {
    parse_compose(&ConfigDetails {
        working_dir: None,
        files: files
            .iter()
            .map(|(name, content)| ConfigFile::new(*name, *content))
            .collect(),
        environment,
    })
}

fn translate_one(yaml: &str) -> Result<Config, BakeError> {
    translate(&[("compose.yml", yaml)], Environment::new())
}

// ── Scenarios ────────────────────────────────────────────────────────

#[test]
fn minimal_build_context() {
    let config = translate_one("services:\n  web:\n    build: .\n").expect("should translate");

    assert_eq!(config.targets.len(), 1);
    let web = config.target("web").expect("web target");
    assert_eq!(web.context.as_deref(), Some("."));
    assert!(web.tags.is_empty());

    let default = config.group("default").expect("default group");
    assert_eq!(default.targets, ["web"]);
}

#[test]
fn image_becomes_tag_when_no_tags() {
    let config = translate_one("services:\n  api:\n    image: myorg/api:1.2\n    build: ./api\n")
        .expect("should translate");
    let api = config.target("api").expect("api target");
    assert_eq!(api.tags, ["myorg/api:1.2"]);
    assert_eq!(api.context.as_deref(), Some("./api"));
}

#[test]
fn explicit_tags_win_over_image() {
    let config = translate_one(
        "services:\n  api:\n    image: myorg/api:1.2\n    build:\n      context: .\n      tags: [myorg/api:edge]\n",
    )
    .expect("should translate");
    assert_eq!(config.target("api").expect("api").tags, ["myorg/api:edge"]);
}

#[test]
fn x_bake_overlay_dedups_and_sorts() {
    let yaml = r#"
services:
  app:
    build:
      context: .
      tags: [a, b]
      x-bake:
        tags: "b c"
        ssh: [b, a]
"#;
    let config = translate_one(yaml).expect("should translate");
    let app = config.target("app").expect("app target");
    assert_eq!(app.tags, ["a", "b", "c"]);
    assert_eq!(app.ssh, ["a", "b"]);
}

#[test]
fn external_secret_is_rejected() {
    let yaml = "secrets:\n  token: { external: true }\nservices:\n  s:\n    build: .\n    secrets: [token]\n";
    let yaml_build_secret = "secrets:\n  token: { external: true }\nservices:\n  s:\n    build:\n      context: .\n      secrets: [token]\n";

    for yaml in [yaml, yaml_build_secret] {
        let err = translate_one(yaml).expect_err("external secret must fail");
        assert!(
            err.to_string().contains("unsupported external secret token"),
            "got: {err}"
        );
    }
}

#[test]
fn build_secrets_render_as_csv() {
    let yaml = r"
secrets:
  token:
    file: ./token.txt
  api_key:
    environment: API_KEY
services:
  s:
    build:
      context: .
      secrets:
        - token
        - source: api_key
          target: key
";
    let config = translate_one(yaml).expect("should translate");
    assert_eq!(
        config.target("s").expect("s").secrets,
        ["id=token,src=./token.txt", "id=api_key,env=API_KEY"]
    );
}

#[test]
fn process_env_wins_over_dotenv() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join(".env"), "FOO=fromfile\nBAR=fromfile\n").expect("write .env");

    let environment =
        load_dot_env(environ_to_map(["FOO=fromproc"]), dir.path()).expect("resolve env");
    let yaml = "services:\n  app:\n    build:\n      context: .\n      args: [FOO, BAR]\n";
    let config = translate(&[("compose.yml", yaml)], environment).expect("should translate");

    let args = &config.target("app").expect("app").args;
    assert_eq!(args["FOO"].as_deref(), Some("fromproc"));
    assert_eq!(args["BAR"].as_deref(), Some("fromfile"));
}

#[test]
fn invalid_service_name_aborts() {
    let err = translate_one("services:\n  1bad:\n    build: .\n").expect_err("must fail");
    assert!(
        err.to_string().starts_with("invalid service name \"1bad\""),
        "got: {err}"
    );
}

// ── Properties ───────────────────────────────────────────────────────

#[test]
fn translation_is_deterministic() {
    let yaml = r"
services:
  zeta:
    build:
      context: ./z
      args: {B: '2', A: '1'}
      labels: [b=2, a=1]
  alpha:
    image: alpha
    build: ./a
  db:
    image: postgres
";
    let first = serde_json::to_string(&translate_one(yaml).expect("first")).expect("json");
    let second = serde_json::to_string(&translate_one(yaml).expect("second")).expect("json");
    assert_eq!(first, second);
}

#[test]
fn services_without_build_are_excluded() {
    let config = translate_one("services:\n  db:\n    image: postgres\n  web:\n    build: .\n")
        .expect("should translate");
    assert_eq!(config.targets.len(), 1);
    assert!(config.target("db").is_none());
    assert_eq!(config.group("default").expect("group").targets, ["web"]);
}

#[test]
fn group_mirrors_service_order() {
    let config = translate_one("services:\n  c:\n    build: .\n  a:\n    build: .\n  b:\n    build: .\n")
        .expect("should translate");
    assert_eq!(config.group("default").expect("group").targets, ["c", "a", "b"]);
    let names: Vec<_> = config.targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["c", "a", "b"]);
}

#[test]
fn empty_project_has_no_groups() {
    let config = translate_one("services: {}\n").expect("should translate");
    assert!(config.groups.is_empty());
    assert!(config.targets.is_empty());
}

#[test]
fn string_and_sequence_x_bake_forms_match() {
    let as_string = r#"
services:
  app:
    build:
      context: .
      x-bake:
        platforms: "linux/amd64 linux/arm64"
        cache-to: "type=inline"
        output: "type=docker"
"#;
    let as_sequence = r"
services:
  app:
    build:
      context: .
      x-bake:
        platforms: [linux/amd64, linux/arm64]
        cache-to: [type=inline]
        output: [type=docker]
";
    assert_eq!(
        translate_one(as_string).expect("string form"),
        translate_one(as_sequence).expect("sequence form")
    );
}

#[test]
fn later_files_override_earlier_ones() {
    let config = translate(
        &[
            ("compose.yml", "services:\n  web:\n    build:\n      context: .\n      target: dev\n"),
            ("compose.prod.yml", "services:\n  web:\n    build:\n      target: prod\n    image: web:prod\n"),
        ],
        Environment::new(),
    )
    .expect("should translate");
    let web = config.target("web").expect("web");
    assert_eq!(web.target.as_deref(), Some("prod"));
    assert_eq!(web.context.as_deref(), Some("."));
    assert_eq!(web.tags, ["web:prod"]);
}

#[test]
fn interpolation_feeds_targets() {
    let mut environment = Environment::new();
    let _ = environment.insert("TAG".into(), "1.0".into());
    let config = translate(
        &[("compose.yml", "services:\n  web:\n    image: web:${TAG}\n    build: ${CONTEXT:-./web}\n")],
        environment,
    )
    .expect("should translate");
    let web = config.target("web").expect("web");
    assert_eq!(web.tags, ["web:1.0"]);
    assert_eq!(web.context.as_deref(), Some("./web"));
}

#[test]
fn includes_are_read_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("base.yml"),
        "services:\n  base:\n    build: ./base\n",
    )
    .expect("write base");
    let main = "include:\n  - base.yml\nservices:\n  web:\n    build: .\n";

    let config = parse_compose_files(vec![ConfigFile::new("compose.yml", main)], Some(dir.path()))
        .expect("should translate");
    let names: Vec<_> = config.targets.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["base", "web"]);
}

#[test]
fn config_serializes_to_bake_json() {
    let config = translate_one(
        "services:\n  web:\n    build:\n      context: .\n      shm_size: 1g\n      x-bake:\n        no-cache: true\n",
    )
    .expect("should translate");
    let json = serde_json::to_value(&config).expect("json");
    assert_eq!(json["group"]["default"]["targets"][0], "web");
    assert_eq!(json["target"]["web"]["context"], ".");
    assert_eq!(json["target"]["web"]["shm-size"], "1GiB");
    assert_eq!(json["target"]["web"]["no-cache"], true);
    assert!(json["target"]["web"].get("pull").is_none());
}
