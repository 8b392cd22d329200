pub mod error;
pub mod config;
pub mod session;
pub mod util;

pub use error::{Result, SessionError};
pub use session::{MemoryStore, Reaper, Session, Store};

#[cfg(feature = "file-backend")]
pub use session::FileStore;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
