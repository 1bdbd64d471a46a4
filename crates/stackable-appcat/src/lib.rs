//! The configuration merge and resource synthesis engine behind the AppCat
//! composition function.
//!
//! Given the `spec` of a composite resource and a service configuration
//! (chart identity, default Helm values, a field mapping and a connection
//! secret template), the engine produces a Helm [`Release`][builder::release]
//! descriptor, a connection [`Secret`][k8s_openapi::api::core::v1::Secret]
//! descriptor and the connection details published back to the caller.
//!
//! The pipeline is:
//!
//! 1. [`config::ServiceConfig::from_input`] validates the function input.
//! 2. [`merge::ConfigMerger`] applies user overrides onto a copy of the defaults.
//! 3. [`synthesis::ResourceSynthesizer`] resolves the secret through
//!    [`secret::SecretLifecycle`], injects it, renders the connection templates
//!    and builds the descriptors.
//!
//! [`function::CompositionFunction`] chains these steps for a whole
//! [`request::FunctionRequest`].
//!
//! The engine is synchronous and holds no shared state. Every call receives its
//! complete input and returns a complete output.

pub mod builder;
pub mod config;
pub mod function;
pub mod labels;
pub mod merge;
pub mod path;
pub mod request;
pub mod secret;
pub mod synthesis;
pub mod template;
pub mod tree;

// External re-exports
pub use k8s_openapi;
pub use kube;
