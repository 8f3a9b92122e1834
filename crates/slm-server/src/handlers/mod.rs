pub mod chat;
pub mod conversations;
pub mod health;
pub mod models;
pub mod style;
