pub mod notifications;
pub mod threads;
