pub mod agent;
pub mod antibot;
pub mod lead_sink;
pub mod operator;
pub mod qualifier;
pub mod session_store;
