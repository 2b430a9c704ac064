mod context;
pub mod labels;
mod scheduler;
mod server;
mod service;
pub mod source;

pub use context::AppContext;
pub use scheduler::run_scheduler;
pub use server::{LatestView, router, serve};
pub use service::run_service;
pub use source::HttpSource;
