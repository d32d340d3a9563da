pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod recipients;

pub use domain::quote::{
    ClientInfo, CompanyInfo, DepartmentSection, LineItem, QuoteMeta, QuoteRequest,
    QuoteSubmission,
};
pub use domain::reference::{suggest_reference, ReferenceSuggestion};
pub use errors::{ApplicationError, ValidationError};
pub use flows::{SubmissionEvent, SubmissionState, SubmissionTrail};
pub use recipients::{RecipientPlan, RecipientPolicy};
