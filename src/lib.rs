pub mod core;
pub mod features;
pub mod scraping;

// --- Primary core exports ---
pub use self::core::config;
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::RunConfig;

pub use features::agent::{AgentController, AgentError, ControllerState, RunAborted};
pub use features::{antibot, lead_sink, operator, qualifier, session_store};
