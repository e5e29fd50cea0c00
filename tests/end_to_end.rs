use anyhow::Result;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tfexpand::frontend::parse_config;
use tfexpand::secrets::{EncryptedFileSource, PlaintextDecryptor, SecretRouter};
use tfexpand::{
    load_config, Engine, EvalError, Evaluation, FsLoader, InstanceKey, MapLoader,
    RedeclarationPolicy, Value,
};

fn engine() -> Engine {
    Engine::new().with_env(HashMap::new())
}

fn eval(src: &str) -> Result<Evaluation, EvalError> {
    engine().evaluate(&parse_config(src, RedeclarationPolicy::LastWins).expect("parse"))
}

fn strings(items: &[&str]) -> Value {
    Value::from(items.to_vec())
}

#[test]
fn list_comprehension_filters_and_transforms() {
    let ev = eval(
        r#"
variable "names" {
  type    = list(string)
  default = ["neo", "trinity", "morpheus"]
}

output "short_upper_names" {
  value = [for name in var.names : upper(name) if length(name) < 5]
}

output "same" {
  value = [for name in var.names : name]
}
"#,
    )
    .unwrap();
    assert_eq!(ev.output("short_upper_names"), Some(&strings(&["NEO"])));
    assert_eq!(
        ev.output("same"),
        Some(&strings(&["neo", "trinity", "morpheus"]))
    );
}

#[test]
fn map_comprehension_upper_cases_keys_and_values() {
    let ev = eval(
        r#"
variable "hero_thousand_faces" {
  type = map(string)
  default = {
    neo      = "hero"
    trinity  = "love interest"
    morpheus = "mentor"
  }
}

output "upper_roles" {
  value = {for name, role in var.hero_thousand_faces : upper(name) => upper(role)}
}

output "identity" {
  value = {for name, role in var.hero_thousand_faces : name => role}
}
"#,
    )
    .unwrap();
    let upper = ev.output("upper_roles").unwrap().as_map().unwrap();
    assert_eq!(upper["NEO"], Value::from("HERO"));
    assert_eq!(upper["TRINITY"], Value::from("LOVE INTEREST"));
    assert_eq!(upper["MORPHEUS"], Value::from("MENTOR"));
    assert_eq!(ev.output("identity"), ev.get("var.hero_thousand_faces"));
}

#[test]
fn duplicate_comprehension_keys_are_fatal() {
    let err = eval(
        r#"
locals {
  by_len = {for n in ["neo", "bob"] : length(n) => n}
}
"#,
    )
    .unwrap_err();
    assert!(matches!(err.root(), EvalError::DuplicateKey(k) if k == "3"), "{err}");

    let grouped = eval(
        r#"
output "by_len" {
  value = {for n in ["neo", "bob", "trinity"] : length(n) => n...}
}
"#,
    )
    .unwrap();
    assert_eq!(
        grouped.output("by_len").unwrap().as_map().unwrap()["3"],
        strings(&["neo", "bob"])
    );
}

#[test]
fn count_zero_yields_no_instances_and_empty_splat() {
    let ev = eval(
        r#"
resource "aws_iam_user" "example" {
  count = 0
  name  = "never"
}

output "names" {
  value = aws_iam_user.example[*].name
}
"#,
    )
    .unwrap();
    assert_eq!(ev.instances_of("aws_iam_user.example").count(), 0);
    assert_eq!(ev.output("names"), Some(&Value::List(vec![])));
}

#[test]
fn count_indexes_instances_from_zero() {
    let ev = eval(
        r#"
variable "user_names" {
  default = ["neo", "trinity", "morpheus"]
}

resource "aws_iam_user" "example" {
  count = length(var.user_names)
  name  = var.user_names[count.index]
}

output "first_arn" {
  value = "arn:aws:iam::123456789012:user/${aws_iam_user.example[0].name}"
}
"#,
    )
    .unwrap();
    let keys: Vec<_> = ev
        .instances_of("aws_iam_user.example")
        .map(|i| i.key.clone())
        .collect();
    assert_eq!(
        keys,
        vec![
            InstanceKey::Index(0),
            InstanceKey::Index(1),
            InstanceKey::Index(2)
        ]
    );
    assert_eq!(
        ev.output("first_arn"),
        Some(&Value::from("arn:aws:iam::123456789012:user/neo"))
    );
}

#[test]
fn for_each_over_toset_keys_instances_by_name() {
    let ev = eval(
        r#"
resource "aws_iam_user" "the_matrix" {
  for_each = toset(["neo", "trinity", "morpheus"])
  name     = each.value
}

output "trinity" {
  value = aws_iam_user.the_matrix["trinity"].name
}

output "all" {
  value = values(aws_iam_user.the_matrix)[*].name
}
"#,
    )
    .unwrap();
    let mut keys: Vec<_> = ev
        .instances_of("aws_iam_user.the_matrix")
        .map(|i| i.key.clone())
        .collect();
    keys.sort();
    assert_eq!(
        keys,
        ["morpheus", "neo", "trinity"]
            .iter()
            .map(|k| InstanceKey::Key(k.to_string()))
            .collect::<Vec<_>>()
    );
    assert_eq!(ev.output("trinity"), Some(&Value::from("trinity")));
    assert_eq!(
        ev.output("all"),
        Some(&strings(&["morpheus", "neo", "trinity"]))
    );
}

#[test]
fn redeclared_resource_uses_the_later_declaration() {
    let ev = eval(
        r#"
resource "aws_iam_user" "example" {
  count = 3
  name  = "user-${count.index}"
}

resource "aws_iam_user" "example" {
  for_each = toset(["neo"])
  name     = each.value
}
"#,
    )
    .unwrap();
    let instances: Vec<_> = ev.instances_of("aws_iam_user.example").collect();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].key, InstanceKey::Key("neo".into()));
}

#[test]
fn conditional_count_gates_a_resource() {
    let src = r#"
variable "enable_autoscaling" {
  type    = bool
  default = false
}

resource "aws_autoscaling_schedule" "scale_out" {
  count       = var.enable_autoscaling ? 1 : 0
  action_name = "scale-out-during-business-hours"
}
"#;
    let cfg = parse_config(src, RedeclarationPolicy::LastWins).unwrap();

    let off = engine().evaluate(&cfg).unwrap();
    assert_eq!(off.instances.len(), 0);

    let on = engine()
        .with_input("enable_autoscaling", true)
        .evaluate(&cfg)
        .unwrap();
    assert_eq!(on.instances.len(), 1);

    let from_string = engine()
        .with_input("enable_autoscaling", "true")
        .evaluate(&cfg)
        .unwrap();
    assert_eq!(from_string.instances.len(), 1);
}

#[test]
fn conditionals_only_evaluate_the_chosen_branch() {
    let ev = eval(
        r#"
variable "items" {
  default = []
}

output "first" {
  value = length(var.items) > 0 ? var.items[0] : "none"
}
"#,
    )
    .unwrap();
    assert_eq!(ev.output("first"), Some(&Value::from("none")));
}

#[test]
fn cycles_are_reported_with_their_blocks() {
    let err = eval(
        r#"
locals {
  a = local.b
  b = local.c
  c = local.a
  d = 1
}
"#,
    )
    .unwrap_err();
    match err.root() {
        EvalError::CyclicDependency(blocks) => {
            assert_eq!(blocks, &vec!["local.a", "local.b", "local.c"])
        }
        other => panic!("expected a cycle, got {other}"),
    }
}

#[test]
fn dynamic_blocks_generate_tags() {
    let ev = eval(
        r#"
variable "custom_tags" {
  type = map(string)
  default = {
    Owner = "team-foo"
    Env   = "prod"
  }
}

resource "aws_autoscaling_group" "example" {
  name = "web"

  dynamic "tag" {
    for_each = var.custom_tags
    content {
      key                 = tag.key
      value               = upper(tag.value)
      propagate_at_launch = true
    }
  }
}
"#,
    )
    .unwrap();
    let asg = ev.instances_of("aws_autoscaling_group.example").next().unwrap();
    let tags: Vec<(Value, Value)> = asg.attributes["tag"]
        .as_list()
        .unwrap()
        .iter()
        .map(|t| {
            let t = t.as_map().unwrap();
            (t["key"].clone(), t["value"].clone())
        })
        .collect();
    assert_eq!(
        tags,
        vec![
            (Value::from("Env"), Value::from("PROD")),
            (Value::from("Owner"), Value::from("TEAM-FOO")),
        ]
    );
}

#[test]
fn secrets_are_decrypted_then_decoded() {
    let loader = Arc::new(MapLoader::new().with_file(
        "db-creds.yml",
        "username: admin\npassword: password123\n",
    ));
    let router = SecretRouter::new().with_source(
        "file",
        Arc::new(EncryptedFileSource::new(loader, Arc::new(PlaintextDecryptor))),
    );
    let cfg = parse_config(
        r#"
locals {
  db_creds = yamldecode(secret("file:db-creds.yml"))
}

resource "aws_db_instance" "example" {
  engine   = "mysql"
  username = local.db_creds.username
  password = local.db_creds["password"]
}
"#,
        RedeclarationPolicy::LastWins,
    )
    .unwrap();
    let ev = engine()
        .with_secrets(Arc::new(router))
        .evaluate(&cfg)
        .unwrap();
    let db = &ev.instances[0];
    assert_eq!(db.attributes["username"], Value::from("admin"));
    assert_eq!(db.attributes["password"], Value::from("password123"));

    let missing = parse_config(
        "locals {\n  x = secret(\"file:nope.yml\")\n}\n",
        RedeclarationPolicy::LastWins,
    )
    .unwrap();
    let err = engine().evaluate(&missing).unwrap_err();
    assert!(
        matches!(err.root(), EvalError::Secret(_)),
        "unexpected error {err}"
    );
}

#[test]
fn environment_variables_feed_variables() {
    let cfg = parse_config(
        r#"
variable "db_username" {
  type = string
}

variable "replicas" {
  type    = number
  default = 1
}

output "user" {
  value = var.db_username
}

output "replicas" {
  value = var.replicas
}
"#,
        RedeclarationPolicy::LastWins,
    )
    .unwrap();
    let env = HashMap::from([
        ("TF_VAR_db_username".to_string(), "admin".to_string()),
        ("TF_VAR_replicas".to_string(), "3".to_string()),
    ]);
    let ev = engine().with_env(env.clone()).evaluate(&cfg).unwrap();
    assert_eq!(ev.output("user"), Some(&Value::from("admin")));
    assert_eq!(ev.output("replicas"), Some(&Value::from(3i64)));

    let custom = engine()
        .with_env(HashMap::from([("APP_db_username".to_string(), "ops".to_string())]))
        .with_env_prefix("APP_")
        .evaluate(&cfg)
        .unwrap();
    assert_eq!(custom.output("user"), Some(&Value::from("ops")));

    let err = engine().evaluate(&cfg).unwrap_err();
    assert!(matches!(err.root(), EvalError::Variable { name, .. } if name == "db_username"));
}

#[test]
fn variable_type_and_validation_failures() {
    let cfg = parse_config(
        r#"
variable "port" {
  type = number
  validation {
    condition     = var.port > 1024
    error_message = "port must be above 1024"
  }
}
"#,
        RedeclarationPolicy::LastWins,
    )
    .unwrap();
    assert!(engine().with_input("port", 8080i64).evaluate(&cfg).is_ok());

    let err = engine().with_input("port", 80i64).evaluate(&cfg).unwrap_err();
    assert_eq!(err.to_string(), "var.port: variable 'port': port must be above 1024");

    let err = engine()
        .with_input("port", "eighty")
        .evaluate(&cfg)
        .unwrap_err();
    assert!(matches!(err.root(), EvalError::Variable { .. }), "{err}");
}

#[test]
fn on_disk_configuration_with_files_and_var_files() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("users.txt"), "neo\ntrinity\n")?;
    std::fs::write(
        dir.path().join("main.tf"),
        r#"
variable "prefix" {}

locals {
  users = compact(split("\n", file("users.txt")))
}

resource "aws_iam_user" "from_file" {
  for_each = toset(local.users)
  name     = "${var.prefix}-${each.key}"
}
"#,
    )?;
    std::fs::write(
        dir.path().join("outputs.tf"),
        r#"
output "names" {
  value = [for u in aws_iam_user.from_file : u.name]
}

output "has_users_file" {
  value = fileexists("users.txt")
}
"#,
    )?;
    std::fs::write(dir.path().join("prod.tfvars"), "prefix = \"prod\"\n")?;

    let files: Vec<PathBuf> = vec![dir.path().join("main.tf"), dir.path().join("outputs.tf")];
    let cfg = load_config(&files, &FsLoader, RedeclarationPolicy::LastWins)?;
    let inputs = tfexpand::frontend::load_var_file(&dir.path().join("prod.tfvars"), &FsLoader)?;
    let ev = engine()
        .with_base_dir(dir.path())
        .with_inputs(inputs)
        .evaluate(&cfg)?;

    assert_eq!(
        ev.output("names"),
        Some(&strings(&["prod-neo", "prod-trinity"]))
    );
    assert_eq!(ev.output("has_users_file"), Some(&Value::from(true)));

    let json = tfexpand::generate_with_backend("json", &ev, false)?;
    assert!(json.contains("aws_iam_user.from_file[\\\"neo\\\"]"), "{json}");
    Ok(())
}
