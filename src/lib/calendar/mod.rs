pub mod aggregate;
pub mod matcher;
pub mod scheduler;
