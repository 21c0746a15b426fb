pub mod config;
pub mod credentials;
pub mod error;
pub mod group;
pub mod io;
pub mod logging;
pub mod model;
pub mod naming;
pub mod resolve;
pub mod session;
pub mod split;

pub use error::{Result, ToolError};
