// Public API for integration tests and potential library usage

pub mod api;
pub mod broadcast;
pub mod corpus;
pub mod llm;
pub mod protocol;
pub mod state;
pub mod types;
pub mod ws;
