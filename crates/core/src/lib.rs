pub mod attribution;
pub mod config;
pub mod domain;
pub mod errors;

pub use attribution::orchestrator::{
    AttributionOrchestrator, AttributionRepository, AttributionStore, DealSource,
    PartnerDirectory, TouchpointSource,
};
pub use attribution::{
    attribute, compare_models, summarize_by_partner, AttributionInput, ModelParameters,
    RoleWeights,
};
pub use domain::attribution::{AttributionModel, AttributionResult, PartnerAttributionSummary};
pub use domain::deal::{Deal, DealId};
pub use domain::partner::{Partner, PartnerId};
pub use domain::touchpoint::{Touchpoint, TouchpointId, TouchpointType};
pub use errors::{ApplicationError, DomainError, InterfaceError};
