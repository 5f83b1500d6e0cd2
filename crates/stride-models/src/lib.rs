pub mod gateway;
pub mod message;
pub mod notification;
pub mod thread;
pub mod user;
