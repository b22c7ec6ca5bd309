pub mod auth;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod profiles;
