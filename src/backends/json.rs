use anyhow::Result;

use super::{Backend, Report};
use crate::engine::Evaluation;

pub struct JsonBackend;

impl Backend for JsonBackend {
    fn name(&self) -> &'static str {
        "json"
    }
    fn file_extension(&self) -> &'static str {
        "json"
    }
    fn generate(&self, eval: &Evaluation, show_sensitive: bool) -> Result<String> {
        serde_json::to_string_pretty(&Report::new(eval, show_sensitive)).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedeclarationPolicy;
    use crate::engine::Engine;
    use crate::frontend::parse_config;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn renders_instances_and_outputs() {
        let cfg = parse_config(
            r#"
resource "aws_iam_user" "example" {
  for_each = toset(["neo"])
  name     = each.value
}

output "secret" {
  value     = "s3cr3t"
  sensitive = true
}
"#,
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        let eval = Engine::new().with_env(HashMap::new()).evaluate(&cfg).unwrap();

        let out: serde_json::Value =
            serde_json::from_str(&JsonBackend.generate(&eval, false).unwrap()).unwrap();
        assert_eq!(
            out,
            serde_json::json!({
                "resources": [{
                    "address": "aws_iam_user.example[\"neo\"]",
                    "mode": "managed",
                    "type": "aws_iam_user",
                    "name": "example",
                    "key": "neo",
                    "attributes": { "name": "neo" }
                }],
                "outputs": { "secret": "(sensitive)" }
            })
        );

        let shown: serde_json::Value =
            serde_json::from_str(&JsonBackend.generate(&eval, true).unwrap()).unwrap();
        assert_eq!(shown["outputs"]["secret"], "s3cr3t");
    }

    #[test]
    fn hides_attributes_of_sensitive_resources() {
        let cfg = parse_config(
            r#"
variable "password" {
  default   = "hunter2"
  sensitive = true
}

resource "aws_db_instance" "main" {
  engine   = "postgres"
  password = var.password
}
"#,
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        let eval = Engine::new().with_env(HashMap::new()).evaluate(&cfg).unwrap();
        assert!(eval.is_sensitive("aws_db_instance.main"));

        let hidden = JsonBackend.generate(&eval, false).unwrap();
        assert!(!hidden.contains("hunter2"), "{hidden}");
        let out: serde_json::Value = serde_json::from_str(&hidden).unwrap();
        assert_eq!(
            out["resources"][0]["attributes"],
            serde_json::json!({ "engine": "(sensitive)", "password": "(sensitive)" })
        );
        assert_eq!(out["resources"][0]["address"], "aws_db_instance.main");

        let shown: serde_json::Value =
            serde_json::from_str(&JsonBackend.generate(&eval, true).unwrap()).unwrap();
        assert_eq!(shown["resources"][0]["attributes"]["password"], "hunter2");
    }
}
