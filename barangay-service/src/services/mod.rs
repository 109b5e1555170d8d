//! Services module for barangay-service.

pub mod activity;
pub mod certificates;
pub mod database;
pub mod email;
pub mod error;
pub mod metrics;
pub mod payments;
pub mod sequence;
pub(crate) mod store;

pub use activity::ActivityLog;
pub use certificates::{
    CertificateDetail, CertificateEngine, CertificateFilter, Completion, NewCertificateRequest,
};
pub use database::{CertificateTypeUpdate, Database, NewCertificateType, NewResident};
pub use email::{EmailMessage, EmailProvider, LoggingEmailProvider, Notifier, SmtpEmailProvider};
pub use error::WorkflowError;
pub use metrics::{get_metrics, init_metrics, record_workflow_operation};
pub use payments::{NewPayment, PaymentEngine, PaymentListFilter, PaymentUpdate};
