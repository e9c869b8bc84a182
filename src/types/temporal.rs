//! Date, time and timestamp buffer layouts.
//!
//! The call-level interface exchanges temporal values as small C structs in
//! native byte order:
//! - DATE: `year: i16, month: u16, day: u16` (6 bytes)
//! - TIME: `hour: u16, minute: u16, second: u16` (6 bytes)
//! - TIMESTAMP: `year: i16, month..second: u16 x5, fraction: u32` (16 bytes),
//!   where `fraction` counts nanoseconds.

use crate::error::{Error, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

pub const DATE_STRUCT_LEN: usize = 6;
pub const TIME_STRUCT_LEN: usize = 6;
pub const TIMESTAMP_STRUCT_LEN: usize = 16;

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([data[offset], data[offset + 1]])
}

fn check_len(data: &[u8], needed: usize, what: &str) -> Result<()> {
    if data.len() < needed {
        return Err(Error::type_conversion(format!(
            "{} value needs {} bytes, got {}",
            what,
            needed,
            data.len()
        )));
    }
    Ok(())
}

fn year_to_i16(year: i32) -> Result<i16> {
    i16::try_from(year)
        .map_err(|_| Error::type_conversion(format!("Year {} does not fit the DATE struct", year)))
}

/// Decode a DATE struct.
pub fn decode_date(data: &[u8]) -> Result<NaiveDate> {
    check_len(data, DATE_STRUCT_LEN, "DATE")?;
    let year = i16::from_ne_bytes([data[0], data[1]]) as i32;
    let month = read_u16(data, 2) as u32;
    let day = read_u16(data, 4) as u32;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
        Error::type_conversion(format!(
            "Invalid DATE: year={}, month={}, day={}",
            year, month, day
        ))
    })
}

/// Encode a DATE struct into the first 6 bytes of `out`.
pub fn encode_date(date: &NaiveDate, out: &mut [u8]) -> Result<()> {
    check_len(out, DATE_STRUCT_LEN, "DATE")?;
    out[0..2].copy_from_slice(&year_to_i16(date.year())?.to_ne_bytes());
    out[2..4].copy_from_slice(&(date.month() as u16).to_ne_bytes());
    out[4..6].copy_from_slice(&(date.day() as u16).to_ne_bytes());
    Ok(())
}

/// Decode a TIME struct.
pub fn decode_time(data: &[u8]) -> Result<NaiveTime> {
    check_len(data, TIME_STRUCT_LEN, "TIME")?;
    let hour = read_u16(data, 0) as u32;
    let minute = read_u16(data, 2) as u32;
    let second = read_u16(data, 4) as u32;
    NaiveTime::from_hms_opt(hour, minute, second).ok_or_else(|| {
        Error::type_conversion(format!(
            "Invalid TIME: hour={}, minute={}, second={}",
            hour, minute, second
        ))
    })
}

/// Encode a TIME struct. Sub-second precision is dropped.
pub fn encode_time(time: &NaiveTime, out: &mut [u8]) -> Result<()> {
    check_len(out, TIME_STRUCT_LEN, "TIME")?;
    out[0..2].copy_from_slice(&(time.hour() as u16).to_ne_bytes());
    out[2..4].copy_from_slice(&(time.minute() as u16).to_ne_bytes());
    out[4..6].copy_from_slice(&(time.second() as u16).to_ne_bytes());
    Ok(())
}

/// Decode a TIMESTAMP struct.
pub fn decode_timestamp(data: &[u8]) -> Result<NaiveDateTime> {
    check_len(data, TIMESTAMP_STRUCT_LEN, "TIMESTAMP")?;
    let date = decode_date(&data[0..6])?;
    let hour = read_u16(data, 6) as u32;
    let minute = read_u16(data, 8) as u32;
    let second = read_u16(data, 10) as u32;
    let fraction = u32::from_ne_bytes([data[12], data[13], data[14], data[15]]);
    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, fraction).ok_or_else(|| {
        Error::type_conversion(format!(
            "Invalid TIMESTAMP time: hour={}, minute={}, second={}, fraction={}",
            hour, minute, second, fraction
        ))
    })?;
    Ok(NaiveDateTime::new(date, time))
}

/// Encode a TIMESTAMP struct.
pub fn encode_timestamp(ts: &NaiveDateTime, out: &mut [u8]) -> Result<()> {
    check_len(out, TIMESTAMP_STRUCT_LEN, "TIMESTAMP")?;
    encode_date(&ts.date(), &mut out[0..6])?;
    out[6..8].copy_from_slice(&(ts.hour() as u16).to_ne_bytes());
    out[8..10].copy_from_slice(&(ts.minute() as u16).to_ne_bytes());
    out[10..12].copy_from_slice(&(ts.second() as u16).to_ne_bytes());
    out[12..16].copy_from_slice(&ts.nanosecond().to_ne_bytes());
    Ok(())
}

/// Number of fractional second digits needed to represent `nanos` exactly.
pub fn fraction_precision(nanos: u32) -> i16 {
    if nanos == 0 {
        0
    } else if nanos % 1_000_000 == 0 {
        3
    } else if nanos % 1_000 == 0 {
        6
    } else {
        9
    }
}
