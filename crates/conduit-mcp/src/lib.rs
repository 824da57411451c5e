pub mod client;
pub mod error;
pub mod types;

pub use client::McpClient;
pub use error::{McpError, Result};
pub use types::*;
