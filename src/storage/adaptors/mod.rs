mod mem;
pub use mem::*;
