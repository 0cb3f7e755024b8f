pub mod capacity;
pub mod device;
pub mod pagination;
pub mod session;
pub mod user;
