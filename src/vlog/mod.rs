mod vlog_manager;

pub use vlog_manager::VlogManager;
