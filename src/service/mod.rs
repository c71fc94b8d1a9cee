pub mod bid_rules;
pub mod bid_service;
pub mod chat_service;
pub mod error;
