pub mod builtin;
mod catalog;
mod registry;
mod traits;
mod types;

pub use builtin::{register_builtin_techniques, ActiveIdentityTechnique, ACTIVE_IDENTITY_PATH};
pub use catalog::TechniqueCatalog;
pub use registry::{TechniqueHandle, TechniqueRegistry};
pub use traits::{Technique, TechniqueContext};
pub use types::{
    render_response, AttackSurface, InputField, InputKind, TechniqueDescriptor, TechniqueResult,
};
