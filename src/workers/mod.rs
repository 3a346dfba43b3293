pub mod archiver;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod tenant_pool;
pub mod tenant_worker;
pub mod webhook_reconciler;

pub use archiver::Archiver;
pub use orchestrator::{Discoverer, Processor};
pub use recovery::Recovery;
pub use scheduler::Scheduler;
pub use tenant_pool::TenantWorkerPool;
pub use tenant_worker::TenantWorker;
pub use webhook_reconciler::WebhookReconciler;
