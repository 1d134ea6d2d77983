use anyhow::{bail, Result};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::{RouteEntry, RouteError};

/// DHCP option code for classless static routes (RFC 3442)
pub const OPTION_CLASSLESS_STATIC_ROUTES: u8 = 121;

const GATEWAY_LEN: usize = 4;
const DUMP_BYTES_PER_LINE: usize = 16;

fn malformed(offset: usize, reason: impl Into<String>) -> RouteError {
    RouteError::MalformedOption {
        offset,
        reason: reason.into(),
    }
}

/// Decode an RFC 3442 option payload into routes, in encoding order.
///
/// Each entry is a width byte (0-32), the `ceil(width / 8)` significant
/// octets of the destination and a 4-byte gateway. A payload that ends
/// inside an entry is rejected as a whole; no partial list is returned.
pub fn decode_option_121(data: &[u8]) -> std::result::Result<Vec<RouteEntry>, RouteError> {
    let mut routes = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let entry_start = pos;
        let width = data[pos];
        if width > 32 {
            return Err(malformed(
                entry_start,
                format!("prefix length {} exceeds 32", width),
            ));
        }
        pos += 1;

        let significant = usize::from(width).div_ceil(8);
        let dest = data.get(pos..pos + significant).ok_or_else(|| {
            malformed(
                entry_start,
                format!(
                    "destination needs {} bytes, {} left",
                    significant,
                    data.len() - pos
                ),
            )
        })?;
        pos += significant;

        let gateway = data.get(pos..pos + GATEWAY_LEN).ok_or_else(|| {
            malformed(
                entry_start,
                format!(
                    "gateway needs {} bytes, {} left",
                    GATEWAY_LEN,
                    data.len() - pos
                ),
            )
        })?;
        pos += GATEWAY_LEN;

        let mut octets = [0u8; 4];
        octets[..significant].copy_from_slice(dest);
        let destination = Ipv4Net::new(Ipv4Addr::from(octets), width)
            .map_err(|e| malformed(entry_start, e.to_string()))?;
        let gateway = Ipv4Addr::new(gateway[0], gateway[1], gateway[2], gateway[3]);

        routes.push(RouteEntry::new(destination, gateway));
    }

    Ok(routes)
}

/// Parse hex text such as `18:0a:00:01`, `18 0a 00 01` or `0x180a0001`.
pub fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    for token in text.split(|c: char| c.is_whitespace() || c == ':' || c == ',') {
        let token = token
            .strip_prefix("0x")
            .or_else(|| token.strip_prefix("0X"))
            .unwrap_or(token);
        if token.is_empty() {
            continue;
        }
        if token.len() == 1 {
            bytes.push(parse_hex_byte(token)?);
            continue;
        }
        if token.len() % 2 != 0 {
            bail!("Odd number of hex digits in '{}'", token);
        }
        for i in (0..token.len()).step_by(2) {
            let pair = token
                .get(i..i + 2)
                .ok_or_else(|| anyhow::anyhow!("Invalid hex text '{}'", token))?;
            bytes.push(parse_hex_byte(pair)?);
        }
    }

    Ok(bytes)
}

fn parse_hex_byte(text: &str) -> Result<u8> {
    u8::from_str_radix(text, 16).map_err(|_| anyhow::anyhow!("Invalid hex byte '{}'", text))
}

fn is_hex_pair(token: &str) -> bool {
    token.len() == 2 && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Extract the raw bytes of an option from an `ipconfig getpacket` dump.
///
/// The dump renders opaque options as `option_121 (opaque):` followed by
/// lines of `offset  xx xx ...  ascii`, terminated by a blank line.
pub fn parse_packet_dump_option(dump: &str, code: u8) -> Result<Option<Vec<u8>>> {
    let header = format!("option_{}", code);
    let mut lines = dump.lines();

    let found = lines.by_ref().any(|line| {
        line.split_whitespace()
            .next()
            .is_some_and(|first| first == header)
    });
    if !found {
        return Ok(None);
    }

    let mut bytes = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        let mut tokens = line.split_whitespace();
        let Some(offset) = tokens.next() else {
            break;
        };
        if usize::from_str_radix(offset, 16).is_err() {
            break;
        }

        let tokens: Vec<&str> = tokens.collect();
        let mut count = tokens
            .iter()
            .take(DUMP_BYTES_PER_LINE)
            .take_while(|t| is_hex_pair(t))
            .count();
        // The ASCII column can itself look like a hex pair on short lines
        if count == tokens.len() && count > 1 && tokens[count - 1].len() == count - 1 {
            count -= 1;
        }

        for token in &tokens[..count] {
            bytes.push(parse_hex_byte(token)?);
        }
    }

    Ok(Some(bytes))
}
