pub mod biddb;
pub mod chatdb;
pub mod db;
pub mod projectdb;
pub mod userdb;

#[cfg(test)]
pub mod memory;
