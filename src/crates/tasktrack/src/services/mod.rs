//! Services for business logic

pub mod task_cache;
pub mod task_service;

pub use task_cache::TaskCache;
pub use task_service::TaskService;
