pub mod book;
pub mod chunk;
pub mod job;
pub mod job_log;
pub mod job_state;
pub mod log_level;
