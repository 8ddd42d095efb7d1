pub mod messages;
pub mod realtime;
pub mod rest;

pub use realtime::RealtimeManager;
pub use rest::SupabaseClient;
