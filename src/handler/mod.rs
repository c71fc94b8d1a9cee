pub mod bid;
pub mod chat;
