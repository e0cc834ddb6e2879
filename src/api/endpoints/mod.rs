pub mod auth;
pub mod chats;
pub mod scans;
pub mod users;
