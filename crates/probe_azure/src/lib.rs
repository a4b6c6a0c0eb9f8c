//! # probe_azure
//!
//! Read-only access to live Azure storage state.
//!
//! - [`ResourceApi`]: the query seam the verifier depends on
//! - [`ArmClient`]: Azure Resource Manager implementation (service principal auth)
//! - [`MockResourceApi`]: scripted implementation with fault injection for tests
//! - [`CloudEnvironment`]: sovereign cloud endpoints and storage DNS suffixes

pub mod api;
pub mod arm;
pub mod environment;
pub mod error;
pub mod mock;

pub use api::{AccountRef, ResourceApi};
pub use arm::{ArmClient, ServicePrincipal};
pub use environment::CloudEnvironment;
pub use error::{ApiError, ApiResult};
pub use mock::{ApiOperation, MockResourceApi, ObservedState};
