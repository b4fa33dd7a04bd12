//! Property tests over generated multi-model schemas.

use proptest::prelude::*;
use spire_core::naming::plural;
use spire_core::TransformConfig;
use std::collections::BTreeSet;
use spire_transform::{compile, Guard, Slot};

#[derive(Debug, Clone)]
struct Model {
    name: String,
    fields: Vec<(String, &'static str)>,
    public: bool,
}

const RESERVED: &[&str] = &["Query", "String", "Int", "Float", "Boolean"];

fn model() -> impl Strategy<Value = Model> {
    (
        "[A-Z][a-z]{2,6}".prop_filter("built-in type name", |n| !RESERVED.contains(&n.as_str())),
        prop::collection::vec(("x[a-z]{2,7}", prop::sample::select(vec!["String", "Int", "Boolean", "AWSDateTime"])), 0..4),
        any::<bool>(),
    )
        .prop_map(|(name, fields, public)| Model { name, fields, public })
}

fn schema() -> impl Strategy<Value = Vec<Model>> {
    prop::collection::vec(model(), 1..4).prop_map(|mut models| {
        models.sort_by(|a, b| a.name.cmp(&b.name));
        models.dedup_by(|a, b| a.name == b.name);
        let mut plurals = BTreeSet::new();
        models.retain(|m| plurals.insert(plural(&m.name)));
        for model in &mut models {
            model.fields.sort();
            model.fields.dedup_by(|a, b| a.0 == b.0);
        }
        models
    })
}

fn render(models: &[Model]) -> String {
    models
        .iter()
        .map(|m| {
            let auth = if m.public { " @auth(rules: [{allow: public}])" } else { "" };
            let fields: String = m.fields.iter().map(|(f, t)| format!(" {f}: {t}")).collect();
            format!("type {} @model{auth} {{ id: ID!{fields} }}\n", m.name)
        })
        .collect()
}

proptest::proptest! {
    #[test]
    fn prop_compile_is_deterministic(models in schema()) {
        let sdl = render(&models);
        let config = TransformConfig::new();
        let first = compile(&[sdl.as_str()], &config).unwrap();
        let second = compile(&[sdl.as_str()], &config).unwrap();
        prop_assert_eq!(&first.fingerprint, &second.fingerprint);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_pipelines_follow_slot_order_and_rules(models in schema()) {
        let sdl = render(&models);
        let out = compile(&[sdl.as_str()], &TransformConfig::new()).unwrap();
        for model in &models {
            let get = out.pipeline("Query", &format!("get{}", model.name)).unwrap();
            prop_assert_eq!(get.guard == Guard::Enforced, model.public);
            prop_assert_eq!(!get.slot(Slot::Auth).is_empty(), model.public);
            prop_assert!(out.resources.group(&model.name).is_some());
        }
        for pipeline in out.pipelines.values() {
            prop_assert_eq!(pipeline.slot_order(), Slot::ALL.to_vec());
        }
    }

    #[test]
    fn prop_fragment_split_does_not_matter(models in schema()) {
        let whole = render(&models);
        let parts: Vec<String> = models.iter().map(|m| render(std::slice::from_ref(m))).collect();
        let config = TransformConfig::new();
        let joined = compile(&[whole.as_str()], &config).unwrap();
        let split = compile(&parts, &config).unwrap();
        prop_assert_eq!(joined.fingerprint, split.fingerprint);
    }
}
