pub mod comp_depends;
pub mod computations;
pub mod depends_notify;
pub mod groups;
pub mod proc_lock;
pub mod ts_ids;
