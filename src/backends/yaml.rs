use anyhow::Result;

use super::{Backend, Report};
use crate::engine::Evaluation;

pub struct YamlBackend;

impl Backend for YamlBackend {
    fn name(&self) -> &'static str {
        "yaml"
    }
    fn file_extension(&self) -> &'static str {
        "yaml"
    }
    fn generate(&self, eval: &Evaluation, show_sensitive: bool) -> Result<String> {
        serde_yaml::to_string(&Report::new(eval, show_sensitive)).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RedeclarationPolicy;
    use crate::engine::Engine;
    use crate::frontend::parse_config;
    use std::collections::HashMap;

    #[test]
    fn renders_count_instances_with_index_keys() {
        let cfg = parse_config(
            "resource \"a\" \"b\" {\n  count = 2\n  n = count.index\n}\n",
            RedeclarationPolicy::LastWins,
        )
        .unwrap();
        let eval = Engine::new().with_env(HashMap::new()).evaluate(&cfg).unwrap();
        let out = YamlBackend.generate(&eval, false).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        let resources = doc["resources"].as_sequence().unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1]["address"].as_str(), Some("a.b[1]"));
        assert_eq!(resources[1]["key"].as_u64(), Some(1));
        assert_eq!(resources[1]["attributes"]["n"].as_u64(), Some(1));
    }
}
