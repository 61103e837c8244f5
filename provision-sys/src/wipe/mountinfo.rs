// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{ProvisionError, Result, WithTarget};

/// Device nodes backing a live mount, read from a mountinfo file.
pub fn read_mount_sources(path: &Path) -> Result<BTreeSet<String>> {
    let mount_info = fs::read_to_string(path)
        .map_err(ProvisionError::from)
        .with_target(|| format!("reading {}", path.display()))?;
    Ok(parse_mount_sources(&mount_info))
}

/// Mount sources under `/dev/`, one per mounted block device.
///
/// Lines without the ` - ` separator are skipped.
pub fn parse_mount_sources(input: &str) -> BTreeSet<String> {
    let mut sources = BTreeSet::new();

    for line in input.lines().filter(|line| !line.trim().is_empty()) {
        let Some((_, right)) = line.split_once(" - ") else {
            debug!("skipping malformed mountinfo line: {line}");
            continue;
        };

        let mut right_fields = right.split_whitespace();
        let _fs_type = right_fields.next();
        let Some(source) = right_fields.next() else {
            continue;
        };

        let source = unescape_mount_field(source);
        if source.starts_with("/dev/") {
            sources.insert(source);
        }
    }

    sources
}

/// Undo the kernel's `\ooo` escaping of whitespace and backslashes.
///
/// Decoded bytes are reassembled before UTF-8 conversion, so multi-byte
/// names survive intact.
fn unescape_mount_field(value: &str) -> String {
    let raw = value.as_bytes();
    let mut decoded = Vec::with_capacity(raw.len());
    let mut rest = raw;

    while let Some((&byte, tail)) = rest.split_first() {
        let escaped = if byte == b'\\' {
            tail.get(..3).and_then(octal_byte)
        } else {
            None
        };
        match escaped {
            Some(unescaped) => {
                decoded.push(unescaped);
                rest = &tail[3..];
            }
            None => {
                decoded.push(byte);
                rest = tail;
            }
        }
    }

    String::from_utf8_lossy(&decoded).into_owned()
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    if !digits.iter().all(|digit| (b'0'..=b'7').contains(digit)) {
        return None;
    }
    let value = digits
        .iter()
        .fold(0u16, |acc, digit| acc * 8 + u16::from(digit - b'0'));
    u8::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_block_device_sources_only() {
        let sample = "36 25 8:2 / / rw,relatime - ext4 /dev/nvme0n1p2 rw\n\
                      37 25 0:5 / /proc rw,nosuid - proc proc rw\n\
                      38 25 0:57 / /mnt/nfs rw,relatime - nfs server:/x rw\n\
                      39 25 253:0 / /var rw - ext4 /dev/mapper/vg0-var rw\n\
                      garbage line\n";

        let sources = parse_mount_sources(sample);
        assert_eq!(
            sources.into_iter().collect::<Vec<_>>(),
            vec!["/dev/mapper/vg0-var", "/dev/nvme0n1p2"]
        );
    }

    #[test]
    fn unescapes_octal_sequences() {
        assert_eq!(unescape_mount_field("/dev/disk\\040a"), "/dev/disk a");
        assert_eq!(unescape_mount_field("back\\134slash"), "back\\slash");
        assert_eq!(unescape_mount_field("odd\\777"), "odd\\777");
    }

    #[test]
    fn keeps_multibyte_names_intact() {
        assert_eq!(unescape_mount_field("/dev/disk/by-label/café"), "/dev/disk/by-label/café");
        assert_eq!(
            unescape_mount_field("/dev/disk/by-label/r\\303\\251sum\\303\\251"),
            "/dev/disk/by-label/résumé"
        );

        let sample = "40 25 8:17 / /data rw - ext4 /dev/disk/by-label/donn\\303\\251es rw\n";
        assert!(parse_mount_sources(sample).contains("/dev/disk/by-label/données"));
    }
}
