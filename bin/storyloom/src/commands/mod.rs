pub mod chat;
pub mod route;
