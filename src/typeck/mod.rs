//! Generic type and multiplicity inference.
//!
//! `context` holds the registration and resolution algorithm, `infer` the
//! per-call-site orchestration, and `check` a walker driving both over a
//! `Program`.

pub mod binding;
pub mod check;
pub mod context;
pub mod infer;
pub mod observer;
pub mod state;

pub use binding::{Binding, MultiplicityBinding, Target, TypeBinding};
pub use check::{check_program, CallSiteReport, CheckOptions, CheckReport, ProcessorState, ResolvedBinding};
pub use context::{ContextId, InferenceContexts};
pub use infer::{
    can_process_lambda, fold_collection_element_bindings, map_signature_to_call_args,
    process_lambda_param_types_from_template, store_inferred_parameters, LambdaHost, SubstitutionStack,
    UNTYPEABLE_LAMBDA,
};
pub use observer::{InferenceObserver, NoopObserver, RecordingObserver, TracingObserver};
pub use state::ScopeState;
