//! Provides functions to expand target specifications into IPv4 addresses.

use std::net::Ipv4Addr;
use std::str::FromStr;

use cidr_utils::cidr::Ipv4Cidr;

use crate::error::{Result, ScanError};

/// Marker that substitutes hosts discovered by a previous liveness or
/// analysis pass into the target specification.
pub const DISCOVERED_MARKER: &str = "$IP";

/// Expands a target specification into the full, ordered list of addresses
/// to scan.
///
/// The specification is a comma-separated list of segments, each of which is
/// a single address, an inclusive `start-end` range, a CIDR block, or the
/// [`DISCOVERED_MARKER`]. Segment order is preserved and addresses are not
/// deduplicated across segments, so the caller can size progress accounting
/// directly from the returned length.
///
/// An empty specification expands to an empty list; only malformed segments
/// produce an error.
///
/// ```rust
/// # use superscan::address::expand_targets;
/// let ips = expand_targets("127.0.0.1,192.168.0.0/30", &[]).unwrap();
/// assert_eq!(ips.len(), 5);
/// ```
pub fn expand_targets(spec: &str, discovered: &[Ipv4Addr]) -> Result<Vec<Ipv4Addr>> {
    let mut targets = Vec::new();

    for segment in spec.split(',') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment == DISCOVERED_MARKER {
            targets.extend_from_slice(discovered);
            continue;
        }
        expand_segment(segment, &mut targets)?;
    }

    Ok(targets)
}

fn expand_segment(segment: &str, targets: &mut Vec<Ipv4Addr>) -> Result<()> {
    if segment.contains('/') {
        let cidr = Ipv4Cidr::from_str(segment)
            .map_err(|e| ScanError::Parse(format!("invalid CIDR block {segment:?}: {e}")))?;
        targets.extend(cidr.iter().map(|c| c.address()));
        return Ok(());
    }

    if let Some((start, end)) = segment.split_once('-') {
        let start = parse_quad(start.trim(), segment)?;
        let end = parse_quad(end.trim(), segment)?;
        let (start, end) = (u32::from(start), u32::from(end));
        if end < start {
            return Err(ScanError::Parse(format!(
                "range {segment:?} ends before it starts"
            )));
        }
        // Walking the u32 form carries the range across octet boundaries,
        // so 10.0.0.250-10.0.1.5 covers the .250-.255 tail and the .0-.5
        // head of the next subnet.
        targets.extend((start..=end).map(Ipv4Addr::from));
        return Ok(());
    }

    targets.push(parse_quad(segment, segment)?);
    Ok(())
}

fn parse_quad(text: &str, context: &str) -> Result<Ipv4Addr> {
    Ipv4Addr::from_str(text)
        .map_err(|_| ScanError::Parse(format!("invalid IPv4 address {text:?} in {context:?}")))
}
