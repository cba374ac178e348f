pub mod cluster_dto;
pub mod reservation_dto;
