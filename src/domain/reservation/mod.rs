pub mod node_selector;
pub mod reservation;
pub mod reservation_flags;
pub mod reservation_request;
pub mod reservation_store;
pub mod resv_manager;
