pub mod bidmodel;
pub mod chatmodels;
pub mod usermodel;
