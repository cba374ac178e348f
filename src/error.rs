use thiserror::Error;

/// Stable numeric codes handed to the calling layer (RPC replies, admin tools).
/// The discriminants are part of the external contract and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    InvalidTimeValue = 2001,
    InvalidPartitionName = 2002,
    InvalidNodeName = 2003,
    InvalidAccount = 2004,
    InvalidUser = 2005,
    TooManyRequestedNodes = 2006,
    ReservationInvalid = 2007,
    ReservationBusy = 2008,
    ReservationAccess = 2009,
    DefaultPartitionNotSet = 2010,
    StateRecovery = 2100,
    Io = 2101,
    Configuration = 2102,
    Accounting = 2103,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid time value: {0}")]
    InvalidTimeValue(String),

    #[error("Invalid partition name: {0}")]
    InvalidPartitionName(String),

    #[error("Invalid node name specification: {0}")]
    InvalidNodeName(String),

    #[error("Invalid account specification: {0}")]
    InvalidAccount(String),

    #[error("Invalid user specification: {0}")]
    InvalidUser(String),

    #[error("Requested node count {requested} exceeds the {available} nodes available")]
    TooManyRequestedNodes { requested: u32, available: u32 },

    #[error("Invalid reservation: {0}")]
    ReservationInvalid(String),

    #[error("Reservation {0} is in use by active jobs")]
    ReservationBusy(String),

    #[error("Access to reservation {reservation} denied for uid {uid}")]
    ReservationAccess { reservation: String, uid: u32 },

    #[error("No default partition is configured")]
    DefaultPartitionNotSet,

    #[error("Reservation state version {found:?} is incompatible with {expected:?}")]
    IncompatibleStateVersion { found: String, expected: String },

    #[error("Reservation state file is incomplete, recovered {recovered} records")]
    IncompleteState { recovered: usize },

    #[error("Accounting sink unavailable: {0}")]
    AccountingUnavailable(String),

    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Failed to encode or decode reservation state: {0}")]
    StateEncoding(#[from] bincode::Error),

    #[error("Failed to build controller model: {0}")]
    ModelConstructionError(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidTimeValue(_) => ErrorCode::InvalidTimeValue,
            Error::InvalidPartitionName(_) => ErrorCode::InvalidPartitionName,
            Error::InvalidNodeName(_) => ErrorCode::InvalidNodeName,
            Error::InvalidAccount(_) => ErrorCode::InvalidAccount,
            Error::InvalidUser(_) => ErrorCode::InvalidUser,
            Error::TooManyRequestedNodes { .. } => ErrorCode::TooManyRequestedNodes,
            Error::ReservationInvalid(_) => ErrorCode::ReservationInvalid,
            Error::ReservationBusy(_) => ErrorCode::ReservationBusy,
            Error::ReservationAccess { .. } => ErrorCode::ReservationAccess,
            Error::DefaultPartitionNotSet => ErrorCode::DefaultPartitionNotSet,
            Error::IncompatibleStateVersion { .. } | Error::IncompleteState { .. } | Error::StateEncoding(_) => ErrorCode::StateRecovery,
            Error::IoError(_) => ErrorCode::Io,
            Error::DeserializationError(_) | Error::ModelConstructionError(_) => ErrorCode::Configuration,
            Error::AccountingUnavailable(_) => ErrorCode::Accounting,
        }
    }
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

pub type Result<T> = std::result::Result<T, Error>;
