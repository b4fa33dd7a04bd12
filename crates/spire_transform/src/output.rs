//! The compile result and its deployment artifacts.

use crate::model_config::ModelConfig;
use crate::resolver::{Guard, ResolverPipeline};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use spire_auth::AccessControlMatrix;
use spire_core::{CompileError, CompileResult, Diagnostic, Hash};
use spire_stack::{Resource, ResourceGraph};
use std::collections::BTreeMap;

/// Everything a successful compile produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledSchema {
    /// Finished schema text
    pub schema: String,
    /// Materialized pipelines keyed by `Type.field`
    pub pipelines: BTreeMap<String, ResolverPipeline>,
    /// Resources partitioned into dependency-ordered groups
    pub resources: ResourceGraph,
    /// Access control matrices by type name
    pub access: IndexMap<String, AccessControlMatrix>,
    /// Model summaries by type name
    pub models: IndexMap<String, ModelConfig>,
    /// Non-fatal findings
    pub diagnostics: Vec<Diagnostic>,
    /// BLAKE3 over the canonical JSON of every other field
    pub fingerprint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Canonical<'a> {
    schema: &'a str,
    pipelines: &'a BTreeMap<String, ResolverPipeline>,
    resources: &'a ResourceGraph,
    access: &'a IndexMap<String, AccessControlMatrix>,
    models: &'a IndexMap<String, ModelConfig>,
    diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StackFile<'a> {
    name: &'a str,
    depends_on: &'a [String],
    resources: Vec<&'a Resource>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineSummary<'a> {
    group: &'a str,
    guard: Guard,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_source: Option<&'a str>,
    functions: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    fingerprint: &'a str,
    stacks: Vec<&'a str>,
    pipelines: BTreeMap<&'a str, PipelineSummary<'a>>,
    diagnostics: &'a [Diagnostic],
}

impl CompiledSchema {
    /// Assemble a result and compute its fingerprint
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if the result cannot be serialized
    pub fn assemble(
        schema: String,
        pipelines: BTreeMap<String, ResolverPipeline>,
        resources: ResourceGraph,
        access: IndexMap<String, AccessControlMatrix>,
        models: IndexMap<String, ModelConfig>,
        diagnostics: Vec<Diagnostic>,
    ) -> CompileResult<Self> {
        let canonical = Canonical {
            schema: &schema,
            pipelines: &pipelines,
            resources: &resources,
            access: &access,
            models: &models,
            diagnostics: &diagnostics,
        };
        let fingerprint = Hash::compute(&to_json(&canonical)?).to_hex();
        Ok(Self {
            schema,
            pipelines,
            resources,
            access,
            models,
            diagnostics,
            fingerprint,
        })
    }

    /// Look up a pipeline by type and field
    #[must_use]
    pub fn pipeline(&self, type_name: &str, field_name: &str) -> Option<&ResolverPipeline> {
        self.pipelines.get(&format!("{type_name}.{field_name}"))
    }

    /// Deployment files by relative path
    ///
    /// `schema.graphql`, one request and response template per pipeline
    /// function under `resolvers/`, one file per group under `stacks/`, and
    /// `manifest.json`, `access.json` and `models.json` summaries.
    ///
    /// # Errors
    ///
    /// Returns `InternalInvariantViolation` if a summary cannot be serialized
    pub fn artifacts(&self) -> CompileResult<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();
        files.insert("schema.graphql".to_string(), self.schema.clone());

        for pipeline in self.pipelines.values() {
            for (slot, position, function) in pipeline.functions() {
                let base = format!(
                    "resolvers/{}.{}.{slot}.{position}",
                    pipeline.type_name, pipeline.field_name
                );
                files.insert(format!("{base}.req.vtl"), function.request.clone());
                files.insert(format!("{base}.res.vtl"), function.response.clone());
            }
        }

        for group in &self.resources.groups {
            let stack = StackFile {
                name: &group.name,
                depends_on: &group.depends_on,
                resources: self.resources.resources_in(&group.name).collect(),
            };
            files.insert(format!("stacks/{}.json", group.name), to_pretty_json(&stack)?);
        }

        let manifest = Manifest {
            fingerprint: &self.fingerprint,
            stacks: self.resources.group_names(),
            pipelines: self
                .pipelines
                .iter()
                .map(|(key, p)| {
                    (
                        key.as_str(),
                        PipelineSummary {
                            group: &p.group,
                            guard: p.guard,
                            data_source: p.data_source.as_deref(),
                            functions: p.len(),
                        },
                    )
                })
                .collect(),
            diagnostics: &self.diagnostics,
        };
        files.insert("manifest.json".to_string(), to_pretty_json(&manifest)?);
        files.insert("access.json".to_string(), to_pretty_json(&self.access)?);
        files.insert("models.json".to_string(), to_pretty_json(&self.models)?);
        Ok(files)
    }
}

fn to_json<T: Serialize>(value: &T) -> CompileResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CompileError::internal(format!("serializing output: {e}")))
}

fn to_pretty_json<T: Serialize>(value: &T) -> CompileResult<String> {
    serde_json::to_string_pretty(value)
        .map(|mut s| {
            s.push('\n');
            s
        })
        .map_err(|e| CompileError::internal(format!("serializing output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spire_stack::{allocate, ResourceSet};

    fn empty(schema: &str) -> CompiledSchema {
        let graph = allocate(ResourceSet::new(), &IndexMap::new()).unwrap();
        CompiledSchema::assemble(
            schema.to_string(),
            BTreeMap::new(),
            graph,
            IndexMap::new(),
            IndexMap::new(),
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = empty("type Query { a: String }\n");
        let b = empty("type Query { a: String }\n");
        let c = empty("type Query { b: String }\n");
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_artifacts_always_carry_schema_and_manifest() {
        let files = empty("type Query { a: String }\n").artifacts().unwrap();
        assert_eq!(files["schema.graphql"], "type Query { a: String }\n");
        let manifest: serde_json::Value = serde_json::from_str(&files["manifest.json"]).unwrap();
        assert_eq!(manifest["fingerprint"].as_str().unwrap().len(), 64);
    }
}
