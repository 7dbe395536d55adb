//! Mock definitions, their compiled form and the live registry.

mod core;
pub mod loader;
pub mod pattern;
mod registry;
mod types;

pub use self::core::{compile, CompileContext, CompiledMock, ResponseTemplate, ScriptCache};
pub use registry::{MockRegistry, MockSnapshot};
pub use types::{
    ActionSpec, BodyConstraint, BodyFormat, HelperDeclaration, HelperSourceSpec, LatencySpec,
    LoadError, MatchRule, MockDefinition, MockError, PatchError, RandomKind, RequestSpec,
    ResponseSpec, ValueConstraint, SEND_REQUEST,
};
