pub mod availability;
pub mod booking;
pub mod clock;
pub mod feed;
pub mod first_visit;
pub mod lifecycle;
pub mod locks;
pub mod memory_store;
pub mod notification;
pub mod occupancy;
pub mod slots;
pub mod store;
