//! Built-in gate stages.

pub mod grant;
pub mod policy;

pub use grant::GrantStage;
pub use policy::PolicyStage;
