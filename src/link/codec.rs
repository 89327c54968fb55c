//! Attribute payload encoding.
//!
//! ```text
//! FORMAT_TAG '\0' TARGET [ '\0' [GID [' ' GID]...] [ '\0' IDENTITY ] ]
//! ```
//!
//! The tag and its terminating NUL are always present. Group ids are decimal,
//! space separated, without leading zeros. The identity field is written only
//! when the identity is non-empty; in that case the group field is present
//! even if empty. Payloads written without an identity field decode with an
//! empty identity.

use super::record::{GroupId, LinkRecord};
use crate::config::types::{Result, StaunchError, FORMAT_TAG, MAX_RECORD_GROUPS};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

const FIELD_SEPARATOR: u8 = 0;
const GROUP_SEPARATOR: u8 = b' ';

/// Serialize `record`, failing with `TooLong` if the payload would exceed `max_len`.
pub fn encode(record: &LinkRecord, max_len: usize) -> Result<Vec<u8>> {
    let target = record.target_path().as_os_str().as_bytes();
    let identity = record.identity().as_bytes();

    let mut buffer = Vec::with_capacity(FORMAT_TAG.len() + 1 + target.len());
    buffer.extend_from_slice(FORMAT_TAG.as_bytes());
    buffer.push(FIELD_SEPARATOR);
    buffer.extend_from_slice(target);

    if !record.groups().is_empty() || !identity.is_empty() {
        buffer.push(FIELD_SEPARATOR);
        for (index, gid) in record.groups().iter().enumerate() {
            if index > 0 {
                buffer.push(GROUP_SEPARATOR);
            }
            buffer.extend_from_slice(gid.to_string().as_bytes());
        }
    }

    if !identity.is_empty() {
        buffer.push(FIELD_SEPARATOR);
        buffer.extend_from_slice(identity);
    }

    if buffer.len() > max_len {
        return Err(StaunchError::TooLong {
            len: buffer.len(),
            max: max_len,
        });
    }
    Ok(buffer)
}

/// Parse a payload exactly as read from the attribute store.
///
/// Never looks past `payload.len()`; every field is bounded by the next
/// separator or the end of the slice.
pub fn decode(payload: &[u8]) -> Result<LinkRecord> {
    let tag_end = payload
        .iter()
        .position(|b| *b == FIELD_SEPARATOR)
        .ok_or_else(|| format_error("payload has no terminated format tag"))?;

    if &payload[..tag_end] != FORMAT_TAG.as_bytes() {
        return Err(format_error(format!(
            "payload isn't prefixed by '{}'",
            FORMAT_TAG
        )));
    }

    let mut fields = payload[tag_end + 1..].split(|b| *b == FIELD_SEPARATOR);
    let target = fields.next().unwrap_or_default();
    let groups = fields.next().unwrap_or_default();
    let identity = fields.next().unwrap_or_default();
    if fields.next().is_some() {
        return Err(format_error("unexpected trailing field"));
    }

    if target.is_empty() {
        return Err(format_error("target path is empty"));
    }
    let target_path = PathBuf::from(OsStr::from_bytes(target));

    let identity = std::str::from_utf8(identity)
        .map_err(|e| format_error(format!("identity is not UTF-8: {}", e)))?;

    let groups = decode_groups(groups)?;

    LinkRecord::new(identity, target_path, groups)
}

fn decode_groups(field: &[u8]) -> Result<Vec<GroupId>> {
    let mut groups: Vec<GroupId> = Vec::new();
    if field.is_empty() {
        return Ok(groups);
    }

    for token in field.split(|b| *b == GROUP_SEPARATOR) {
        let gid = decode_gid(token)?;
        if groups.contains(&gid) {
            continue;
        }
        if groups.len() == MAX_RECORD_GROUPS {
            return Err(format_error(format!(
                "more than {} groups",
                MAX_RECORD_GROUPS
            )));
        }
        groups.push(gid);
    }
    Ok(groups)
}

fn decode_gid(token: &[u8]) -> Result<GroupId> {
    if token.is_empty() {
        return Err(format_error("empty group id"));
    }

    let mut value: libc::gid_t = 0;
    for &digit in token {
        if !digit.is_ascii_digit() {
            return Err(format_error(format!(
                "group id {:?} contains a non-digit",
                String::from_utf8_lossy(token)
            )));
        }
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(libc::gid_t::from(digit - b'0')))
            .ok_or_else(|| {
                format_error(format!(
                    "group id {} overflows",
                    String::from_utf8_lossy(token)
                ))
            })?;
    }

    GroupId::new(value).ok_or_else(|| format_error(format!("group id {} is reserved", value)))
}

fn format_error(msg: impl Into<String>) -> StaunchError {
    StaunchError::Format(msg.into())
}
