//! Configuration resolution for Tributary.
//!
//! This crate handles:
//! - Layered resolution of component configuration (defaults, user, corrections)
//! - Workload balancer goal invariants
//! - Logging properties generation
//! - Operator-wide configuration (environment or KDL)

pub mod balancer;
pub mod component;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod system;

pub use component::{resolve_component, ComponentConfiguration, ConfigSection};
pub use error::{ConfigError, ConfigResult};
pub use resolver::{
    resolve, ConfigSource, ConfigurationPolicy, ConfigurationWarning, ResolvedConfiguration,
};
pub use system::{parse_operator_config, OperatorConfig};
