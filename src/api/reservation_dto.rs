use serde::{Deserialize, Serialize};

use crate::domain::reservation::reservation_flags::{FlagUpdate, FlagsUpdate, ReservationFlags};
use crate::domain::reservation::reservation_request::{CreateReservationRequest, UpdateReservationRequest};

#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReservationActionDto {
    Create,
    Update,
    Delete,
}

/// One administrative request as it appears in a request file.
///
/// Times are absolute unix seconds, `duration` is in minutes.
/// `flags` holds names like `MAINT` or `NO_DAILY`.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequestDto {
    pub action: ReservationActionDto,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub partition: Option<String>,
    #[serde(default)]
    pub features: Option<String>,
    #[serde(default)]
    pub accounts: Option<String>,
    #[serde(default)]
    pub users: Option<String>,
    #[serde(default)]
    pub node_list: Option<String>,
    #[serde(default)]
    pub node_count: Option<u32>,
}

impl ReservationRequestDto {
    fn flags_update(&self) -> FlagsUpdate {
        let mut update = FlagsUpdate::default();
        for flag in &self.flags {
            match flag.to_ascii_uppercase().as_str() {
                "MAINT" => update.maint = FlagUpdate::Set,
                "NO_MAINT" => update.maint = FlagUpdate::Clear,
                "DAILY" => update.daily = FlagUpdate::Set,
                "NO_DAILY" => update.daily = FlagUpdate::Clear,
                "WEEKLY" => update.weekly = FlagUpdate::Set,
                "NO_WEEKLY" => update.weekly = FlagUpdate::Clear,
                other => log::warn!("Ignoring unknown reservation flag '{}' in request for {:?}", other, self.name),
            }
        }
        update
    }
}

impl From<&ReservationRequestDto> for CreateReservationRequest {
    fn from(dto: &ReservationRequestDto) -> Self {
        let mut flags = ReservationFlags::default();
        dto.flags_update().apply(&mut flags);

        CreateReservationRequest {
            name: dto.name.clone(),
            start_time: dto.start_time,
            end_time: dto.end_time,
            duration: dto.duration,
            flags,
            partition: dto.partition.clone(),
            features: dto.features.clone(),
            accounts: dto.accounts.clone(),
            users: dto.users.clone(),
            node_list: dto.node_list.clone(),
            node_count: dto.node_count,
        }
    }
}

impl From<&ReservationRequestDto> for UpdateReservationRequest {
    fn from(dto: &ReservationRequestDto) -> Self {
        UpdateReservationRequest {
            name: dto.name.clone().unwrap_or_default(),
            start_time: dto.start_time,
            end_time: dto.end_time,
            duration: dto.duration,
            flags: dto.flags_update(),
            partition: dto.partition.clone(),
            features: dto.features.clone(),
            accounts: dto.accounts.clone(),
            users: dto.users.clone(),
            node_list: dto.node_list.clone(),
            node_count: dto.node_count,
        }
    }
}
