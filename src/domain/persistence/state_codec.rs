//! Binary layout of the reservation state file and of the `show` reply.
//!
//! Values are bincode encoded back to back with fixed width integers.
//! State file: version tag, save time, id counter, then one record per
//! reservation until the end of the buffer.

use bincode::Options;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::domain::reservation::reservation::ReservationInfo;
use crate::error::{Error, Result};

pub const RESV_STATE_VERSION: &str = "VER001";

/// Public fields followed by the fields only the controller needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResvStateRecord {
    pub info: ReservationInfo,
    pub cpu_count: u32,
    pub resv_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedState {
    pub saved_at: i64,
    pub top_suffix: u32,
    pub records: Vec<ResvStateRecord>,
    /// The buffer ended inside a record, `records` holds the complete ones.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowBuffer {
    pub snapshot_time: i64,
    pub reservations: Vec<ReservationInfo>,
}

fn write_options() -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes()
}

fn read_options(len: usize) -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().allow_trailing_bytes().with_limit(len as u64)
}

fn pack<T: Serialize + ?Sized>(buffer: &mut Vec<u8>, value: &T) -> Result<()> {
    write_options().serialize_into(buffer, value)?;
    Ok(())
}

fn unpack<T: for<'de> Deserialize<'de>>(cursor: &mut Cursor<&[u8]>) -> Result<T> {
    let len = cursor.get_ref().len();
    Ok(read_options(len).deserialize_from(cursor)?)
}

fn is_exhausted(cursor: &Cursor<&[u8]>) -> bool {
    cursor.position() as usize >= cursor.get_ref().len()
}

pub fn pack_state(saved_at: i64, top_suffix: u32, records: &[ResvStateRecord]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    pack(&mut buffer, RESV_STATE_VERSION)?;
    pack(&mut buffer, &saved_at)?;
    pack(&mut buffer, &top_suffix)?;
    for record in records {
        pack(&mut buffer, record)?;
    }
    Ok(buffer)
}

/// Decodes a state file.
///
/// A missing or different version tag is an error. A buffer that ends inside
/// the header or a record yields what was complete with `truncated` set.
pub fn unpack_state(bytes: &[u8]) -> Result<DecodedState> {
    let mut cursor = Cursor::new(bytes);

    let version: String = unpack(&mut cursor).map_err(|_| Error::IncompatibleStateVersion { found: String::new(), expected: RESV_STATE_VERSION.to_string() })?;
    if version != RESV_STATE_VERSION {
        return Err(Error::IncompatibleStateVersion { found: version, expected: RESV_STATE_VERSION.to_string() });
    }

    let mut state = DecodedState { saved_at: 0, top_suffix: 0, records: Vec::new(), truncated: false };

    let header: Result<(i64, u32)> = unpack(&mut cursor).and_then(|saved_at| Ok((saved_at, unpack(&mut cursor)?)));
    match header {
        Ok((saved_at, top_suffix)) => {
            state.saved_at = saved_at;
            state.top_suffix = top_suffix;
        }
        Err(_) => {
            state.truncated = true;
            return Ok(state);
        }
    }

    while !is_exhausted(&cursor) {
        match unpack::<ResvStateRecord>(&mut cursor) {
            Ok(record) => state.records.push(record),
            Err(e) => {
                log::debug!("Reservation state record {} unreadable: {}", state.records.len(), e);
                state.truncated = true;
                break;
            }
        }
    }

    Ok(state)
}

pub fn pack_show(snapshot_time: i64, reservations: &[ReservationInfo]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    pack(&mut buffer, &(reservations.len() as u32))?;
    pack(&mut buffer, &snapshot_time)?;
    for info in reservations {
        pack(&mut buffer, info)?;
    }
    Ok(buffer)
}

/// Client side decoding of a `show` reply.
pub fn decode_show_buffer(bytes: &[u8]) -> Result<ShowBuffer> {
    let mut cursor = Cursor::new(bytes);
    let count: u32 = unpack(&mut cursor)?;
    let snapshot_time: i64 = unpack(&mut cursor)?;

    let mut reservations = Vec::new();
    for _ in 0..count {
        reservations.push(unpack(&mut cursor)?);
    }
    Ok(ShowBuffer { snapshot_time, reservations })
}
