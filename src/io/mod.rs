pub mod atomic;
pub mod config_io;
pub mod fs;
pub mod manager;
pub mod pool;
pub mod record;
