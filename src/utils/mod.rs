pub mod user_agent;
pub mod xml;
