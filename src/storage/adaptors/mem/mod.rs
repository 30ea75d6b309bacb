mod mem_kv_backend;
pub use mem_kv_backend::*;
