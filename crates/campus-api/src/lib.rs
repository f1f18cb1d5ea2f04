pub mod analyze;
pub mod channels;
pub mod incidents;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod state;
