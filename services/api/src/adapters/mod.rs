pub mod db;
pub mod identity;
pub mod realtime;

pub use db::DbAdapter;
pub use identity::AnonIdentityAdapter;
pub use realtime::MemoryRealtimeAdapter;
