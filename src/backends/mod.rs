use anyhow::Result;
use serde::Serialize;
use std::borrow::Cow;

use crate::engine::{Evaluation, REDACTED};
use crate::expand::ResourceInstance;
use crate::value::{Map, Value};

pub mod json;
pub mod yaml;

pub trait Backend {
    fn name(&self) -> &'static str;
    fn file_extension(&self) -> &'static str;
    fn generate(&self, eval: &Evaluation, show_sensitive: bool) -> Result<String>;
}

pub fn get_backend(name: &str) -> Option<Box<dyn Backend>> {
    match name.to_lowercase().as_str() {
        "json" => Some(Box::new(json::JsonBackend)),
        "yaml" | "yml" => Some(Box::new(yaml::YamlBackend)),
        _ => None,
    }
}

/// The document every backend renders: expanded instances and outputs.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub resources: Vec<ReportInstance<'a>>,
    pub outputs: Map,
}

#[derive(Debug, Serialize)]
pub struct ReportInstance<'a> {
    pub address: String,
    #[serde(flatten)]
    pub instance: Cow<'a, ResourceInstance>,
}

impl<'a> Report<'a> {
    pub fn new(eval: &'a Evaluation, show_sensitive: bool) -> Self {
        Self {
            resources: eval
                .instances
                .iter()
                .map(|instance| ReportInstance {
                    address: instance.address(),
                    instance: if show_sensitive || !eval.is_sensitive(&instance.block_address()) {
                        Cow::Borrowed(instance)
                    } else {
                        Cow::Owned(redact_attributes(instance))
                    },
                })
                .collect(),
            outputs: if show_sensitive {
                eval.outputs.clone()
            } else {
                eval.redacted_outputs()
            },
        }
    }
}

/// Keep the attribute names of a sensitive instance but hide every value.
fn redact_attributes(instance: &ResourceInstance) -> ResourceInstance {
    let attributes = instance
        .attributes
        .keys()
        .map(|k| (k.clone(), Value::from(REDACTED)))
        .collect();
    ResourceInstance {
        attributes,
        ..instance.clone()
    }
}
