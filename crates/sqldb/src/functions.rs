use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Result};
use std::net::IpAddr;

/// Install the cache's SQL functions on a connection. Installing more
/// than once is harmless.
///
/// `extract_barred_value(s, i)` returns the i-th (0-based) `|`-separated
/// token of `s`, or '' when out of range. Indexed array fields store
/// their elements bar-joined, and queries select or sort by element
/// through this function.
///
/// `inet_aton(s)` maps an IPv4 or IPv6 textual address to a 16-octet
/// big-endian integer (IPv4 addresses are mapped into IPv6), encoded as
/// a BLOB so that addresses order numerically. Unparseable input maps
/// to the integer 0, which SQLite orders before every BLOB, so non-IP
/// strings sort ahead of all addresses.
pub fn install_functions(db: &Connection) -> Result<()> {
    // See: https://github.com/rusqlite/rusqlite/blob/master/src/functions.rs
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    db.create_scalar_function("extract_barred_value", 2, flags, |ctx| {
        assert_eq!(ctx.len(), 2, "called with unexpected number of arguments");
        let joined = match ctx.get_raw(0) {
            ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
            _ => return Ok(String::new()),
        };
        let index = ctx.get::<i64>(1)?;
        if index < 0 {
            return Ok(String::new());
        }
        Ok(joined
            .split('|')
            .nth(index as usize)
            .unwrap_or_default()
            .to_string())
    })?;

    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    db.create_scalar_function("inet_aton", 1, flags, |ctx| {
        assert_eq!(ctx.len(), 1, "called with unexpected number of arguments");
        let addr = match ctx.get_raw(0) {
            ValueRef::Text(t) => std::str::from_utf8(t).ok().and_then(|s| s.parse::<IpAddr>().ok()),
            _ => None,
        };
        Ok(match addr {
            Some(IpAddr::V4(v4)) => Value::Blob(v4.to_ipv6_mapped().octets().to_vec()),
            Some(IpAddr::V6(v6)) => Value::Blob(v6.octets().to_vec()),
            None => Value::Integer(0),
        })
    })
}
