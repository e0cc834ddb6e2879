pub mod chat;
pub mod enums;
pub mod scan;
pub mod user;

pub use chat::*;
pub use enums::*;
pub use scan::*;
pub use user::*;
