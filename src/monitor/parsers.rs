//! Decoders for the kernel session table (`/proc/net/tcp` layout).

use crate::error::MonitorError;
use crate::logger::{Event, Logger};
use crate::monitor::types::{Connection, Endpoint, Snapshot};
use std::io::{BufRead, BufReader, Read};
use std::net::Ipv4Addr;

/// `AABBCCDD:PPPP`
const ENDPOINT_TOKEN_LEN: usize = 13;

/// Decodes one `address:port` token from the session table.
///
/// The address is four bytes in host (little-endian) order, so `1201C00A`
/// reads as `10.192.1.18`. The port is plain big-endian hex.
pub fn parse_endpoint(token: &str) -> Result<Endpoint, MonitorError> {
    if token.len() != ENDPOINT_TOKEN_LEN {
        return Err(MonitorError::format(
            token,
            format!("expected {} characters, got {}", ENDPOINT_TOKEN_LEN, token.len()),
        ));
    }

    let parts: Vec<&str> = token.split(':').collect();
    let [addr_hex, port_hex] = parts[..] else {
        return Err(MonitorError::format(
            token,
            format!("expected 2 colon-separated parts, got {}", parts.len()),
        ));
    };

    Ok(Endpoint {
        addr: parse_ipv4(token, addr_hex)?,
        port: parse_port(token, port_hex)?,
    })
}

fn parse_ipv4(token: &str, hex_str: &str) -> Result<Ipv4Addr, MonitorError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| MonitorError::format(token, format!("address: {}", e)))?;
    let [a, b, c, d] = bytes[..] else {
        return Err(MonitorError::format(
            token,
            format!("address decoded to {} bytes, expected 4", bytes.len()),
        ));
    };
    Ok(Ipv4Addr::new(d, c, b, a))
}

fn parse_port(token: &str, hex_str: &str) -> Result<u16, MonitorError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| MonitorError::format(token, format!("port: {}", e)))?;
    let [hi, lo] = bytes[..] else {
        return Err(MonitorError::format(
            token,
            format!("port decoded to {} bytes, expected 2", bytes.len()),
        ));
    };
    Ok(u16::from_be_bytes([hi, lo]))
}

/// Builds a [`Snapshot`] from one sample of the session table.
///
/// The first line is the column header. On every other line the second and
/// third whitespace-separated fields are the local and remote endpoint
/// tokens. Lines are read as raw bytes; one that is not UTF-8 or does not
/// decode is logged and left out.
///
/// Returns [`MonitorError::EmptyInput`] when there was no line after the
/// header. An unreadable table and a table with no connections look the same
/// from here, and both are reported as empty.
pub fn read_connections<R: Read>(source: R, logger: &Logger) -> Result<Snapshot, MonitorError> {
    let mut lines = BufReader::new(source).split(b'\n');

    // header
    if lines.next().transpose()?.is_none() {
        return Err(MonitorError::EmptyInput);
    }

    let mut snapshot = Snapshot::new();
    let mut data_lines = 0usize;

    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        data_lines += 1;

        match decode_line(&line).and_then(parse_record) {
            Ok(conn) => {
                snapshot.insert(conn.key(), conn);
            }
            Err(e) => {
                logger.log(&Event::SkippedRecord {
                    line:   idx + 2,
                    reason: &e.to_string(),
                });
            }
        }
    }

    if data_lines == 0 {
        return Err(MonitorError::EmptyInput);
    }

    Ok(snapshot)
}

fn decode_line(bytes: &[u8]) -> Result<&str, MonitorError> {
    std::str::from_utf8(bytes).map_err(|e| {
        MonitorError::format(String::from_utf8_lossy(bytes).trim(), format!("line is not UTF-8: {}", e))
    })
}

fn parse_record(line: &str) -> Result<Connection, MonitorError> {
    let mut fields = line.split_whitespace().skip(1);
    let (Some(local), Some(remote)) = (fields.next(), fields.next()) else {
        return Err(MonitorError::format(line.trim(), "record has fewer than 3 fields"));
    };

    Ok(Connection {
        local:  parse_endpoint(local)?,
        remote: parse_endpoint(remote)?,
    })
}
