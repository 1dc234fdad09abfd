use std::path::Path;

use gminfer::model::{GenericType, Model, Multiplicity, TypeAlgebra, TypeId};
use gminfer::typeck::{ContextId, InferenceContexts, NoopObserver, RecordingObserver};
use proptest::prelude::*;

const CLASSES: [(TypeId, &str); 7] = [
    (TypeId::INTEGER, "Integer"),
    (TypeId::FLOAT, "Float"),
    (TypeId::DECIMAL, "Decimal"),
    (TypeId::NUMBER, "Number"),
    (TypeId::STRING, "String"),
    (TypeId::DATE, "Date"),
    (TypeId::BOOLEAN, "Boolean"),
];

fn class_strategy() -> impl Strategy<Value = (TypeId, &'static str)> {
    prop::sample::select(CLASSES.to_vec())
}

fn multiplicity_strategy() -> impl Strategy<Value = Multiplicity> {
    (0u32..4, prop::option::of(0u32..4)).prop_map(|(lower, extra)| Multiplicity::Range {
        lower,
        upper: extra.map(|e| lower + e),
    })
}

fn t() -> GenericType {
    GenericType::param("T")
}

fn register_all(contexts: &mut InferenceContexts, ctx: ContextId, values: &[GenericType]) {
    for value in values {
        contexts.register(ctx, &t(), value, ctx, &mut NoopObserver);
    }
}

// =============================================================================
// SECTION 1: MERGING - Repeated and reordered registrations
// =============================================================================

/// Property: Registering the same value twice changes nothing
///
/// A second registration merges the held value with itself, which must be
/// the held value again.
#[test]
fn prop_registration_is_idempotent() {
    let model = Model::new();
    proptest!(|((id, _) in class_strategy(), m in multiplicity_strategy())| {
        let mut contexts = InferenceContexts::new(&model);
        let once = contexts.new_context(None, None);
        let twice = contexts.new_context(None, None);
        let value = GenericType::class(id);
        let mul = Multiplicity::param("m");

        contexts.register(once, &t(), &value, once, &mut NoopObserver);
        contexts.register_mul(once, &mul, &m, once, &mut NoopObserver);
        for _ in 0..2 {
            contexts.register(twice, &t(), &value, twice, &mut NoopObserver);
            contexts.register_mul(twice, &mul, &m, twice, &mut NoopObserver);
        }

        prop_assert_eq!(contexts.type_parameter_map(once), contexts.type_parameter_map(twice));
        prop_assert_eq!(contexts.multiplicity_parameter_map(once), contexts.multiplicity_parameter_map(twice));
    });
}

/// Property: The merged type does not depend on registration order
///
/// Generator: 1-6 classes drawn from a single-inheritance hierarchy
#[test]
fn prop_merge_is_order_independent() {
    let model = Model::new();
    proptest!(|(classes in prop::collection::vec(class_strategy(), 1..6))| {
        let values: Vec<GenericType> = classes.iter().map(|(id, _)| GenericType::class(*id)).collect();
        let reversed: Vec<GenericType> = values.iter().rev().cloned().collect();

        let mut contexts = InferenceContexts::new(&model);
        let forward = contexts.new_context(None, None);
        let backward = contexts.new_context(None, None);
        register_all(&mut contexts, forward, &values);
        register_all(&mut contexts, backward, &reversed);

        let merged = contexts.resolve_type_parameter(forward, "T");
        prop_assert_eq!(&merged, &contexts.resolve_type_parameter(backward, "T"));
        prop_assert_eq!(merged, Some(model.best_common_type(&values, true)));
    });
}

/// Property: Merged multiplicities are the smallest range covering every input
#[test]
fn prop_multiplicity_merge_covers_inputs() {
    let model = Model::new();
    proptest!(|(muls in prop::collection::vec(multiplicity_strategy(), 1..6))| {
        let mut contexts = InferenceContexts::new(&model);
        let forward = contexts.new_context(None, None);
        let backward = contexts.new_context(None, None);
        let template = Multiplicity::param("m");
        for m in &muls {
            contexts.register_mul(forward, &template, m, forward, &mut NoopObserver);
        }
        for m in muls.iter().rev() {
            contexts.register_mul(backward, &template, m, backward, &mut NoopObserver);
        }

        let merged = contexts.resolve_multiplicity_parameter(forward, "m");
        prop_assert_eq!(&merged, &contexts.resolve_multiplicity_parameter(backward, "m"));

        let lower = muls.iter().filter_map(|m| match m {
            Multiplicity::Range { lower, .. } => Some(*lower),
            Multiplicity::Param(_) => None,
        }).min();
        let upper = muls.iter().map(|m| match m {
            Multiplicity::Range { upper, .. } => *upper,
            Multiplicity::Param(_) => None,
        }).try_fold(0u32, |acc, u| u.map(|u| acc.max(u)));
        prop_assert_eq!(merged, lower.map(|lower| Multiplicity::Range { lower, upper }));
    });
}

// =============================================================================
// SECTION 2: RESOLUTION - Forwarding chains
// =============================================================================

/// Property: Resolution follows a chain of indirections to the concrete value
///
/// Generator: chains of 1-12 contexts, each forwarding T to its parent
#[test]
fn prop_forwarding_is_transitive() {
    let model = Model::new();
    proptest!(|(depth in 1usize..12, (id, _) in class_strategy())| {
        let mut contexts = InferenceContexts::new(&model);
        let root = contexts.new_context(None, None);
        let mut chain = vec![root];
        for i in 0..depth {
            let ctx = contexts.new_context(Some(chain[i]), None);
            contexts.register(ctx, &t(), &t(), chain[i], &mut NoopObserver);
            chain.push(ctx);
        }
        let value = GenericType::class(id);
        contexts.register(root, &t(), &value, root, &mut NoopObserver);

        for ctx in chain {
            prop_assert_eq!(contexts.resolve_type_parameter(ctx, "T"), Some(value.clone()));
        }
    });
}

/// Property: Resolution terminates on arbitrary forwarding graphs
///
/// Cycles between contexts are allowed; resolving must still return, and
/// every context that holds T must yield some value.
#[test]
fn prop_resolution_terminates_on_cycles() {
    let model = Model::new();
    proptest!(|(edges in prop::collection::vec((0usize..6, 0usize..6), 1..20))| {
        let mut contexts = InferenceContexts::new(&model);
        let ids: Vec<ContextId> = (0..6).map(|_| contexts.new_context(None, None)).collect();
        for (from, to) in &edges {
            contexts.register(ids[*from], &t(), &t(), ids[*to], &mut NoopObserver);
        }
        for ctx in ids {
            let resolved = contexts.resolve_type_parameter(ctx, "T");
            prop_assert_eq!(resolved.is_some(), contexts.contains_type_parameter(ctx, "T"));
        }
    });
}

// =============================================================================
// SECTION 3: DRIVER - Whole scenarios
// =============================================================================

fn pick_scenario(names: &[&str]) -> String {
    let elements: Vec<String> = names.iter().map(|n| format!("{{ literal = \"{n}\" }}")).collect();
    format!(
        r#"
[[function]]
name = "pick"
type_params = ["T"]
params = [{{ name = "xs", type = "T", mul = "*" }}]
returns = {{ type = "T" }}

[[expression]]
call = "pick"
args = [{{ collection = [{}] }}]
"#,
        elements.join(", ")
    )
}

/// Property: Folding a collection argument yields the join of its elements
#[test]
fn prop_collection_fold_is_join() {
    let model = Model::new();
    proptest!(|(classes in prop::collection::vec(class_strategy(), 2..6))| {
        let names: Vec<&str> = classes.iter().map(|(_, n)| *n).collect();
        let report = gminfer::infer_scenario(&pick_scenario(&names)).unwrap();
        let types: Vec<GenericType> = classes.iter().map(|(id, _)| GenericType::class(*id)).collect();
        let expected = model.print_type(&model.best_common_type(&types, true));
        prop_assert_eq!(report.call("pick").unwrap().type_binding("T"), Some(expected.as_str()));
    });
}

/// Property: Observers never change inference results
#[test]
fn prop_observer_has_no_effect() {
    proptest!(|(classes in prop::collection::vec(class_strategy(), 0..6))| {
        let names: Vec<&str> = classes.iter().map(|(_, n)| *n).collect();
        let text = pick_scenario(&names);
        let quiet = gminfer::infer_scenario(&text).unwrap();

        let mut scenario = gminfer::scenario::parse(&text, Path::new("pick.toml")).unwrap();
        let printer = scenario.model.clone();
        let mut observer = RecordingObserver::new(&printer);
        let recorded = gminfer::run_scenario(&mut scenario, &mut observer).unwrap();

        prop_assert_eq!(quiet.call_sites, recorded.call_sites);
        prop_assert_eq!(quiet.contexts_created, recorded.contexts_created);
        prop_assert!(!observer.events.is_empty());
    });
}
