// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Text ⇄ bytes codec for primitive node kinds.
//!
//! All multi-byte values are little-endian. Hex kinds render their bytes in
//! memory order (`"EF BE AD DE"`) and accept the same form back, so a
//! displayed value can be edited and committed unchanged.

use thiserror::Error;

use crate::node::NodeKind;

/// Failure to turn user text into bytes for a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// No text was given.
    #[error("empty value")]
    Empty,
    /// The kind has no single editable value (Struct, Array, Padding).
    #[error("{0} has no editable value")]
    NotAValue(NodeKind),
    /// Text is not a number in the expected base.
    #[error("not a number: {0:?}")]
    BadNumber(String),
    /// Number does not fit the kind's width.
    #[error("{text:?} is out of range for {kind}")]
    OutOfRange {
        /// Offending text.
        text: String,
        /// Target kind.
        kind: NodeKind,
    },
    /// Boolean text other than true/false/1/0.
    #[error("not a boolean: {0:?}")]
    BadBool(String),
    /// Hex byte list with a bad digit or the wrong byte count.
    #[error("expected {expected} hex bytes, got {text:?}")]
    BadHex {
        /// Text as given.
        text: String,
        /// Required byte count.
        expected: usize,
    },
    /// Vector/matrix component count mismatch.
    #[error("expected {expected} components, got {got}")]
    ComponentCount {
        /// Required component count.
        expected: usize,
        /// Components supplied.
        got: usize,
    },
}

/// Renders `bytes` as display text for `kind`.
///
/// Short input is zero-extended, so a failed read formats as zero.
pub fn format_value(kind: NodeKind, bytes: &[u8]) -> String {
    match kind {
        NodeKind::Hex8 | NodeKind::Hex16 | NodeKind::Hex32 | NodeKind::Hex64 => {
            hex_bytes(&fixed(bytes, width(kind)))
        }
        NodeKind::Int8 => i8::from_le_bytes(arr(bytes)).to_string(),
        NodeKind::Int16 => i16::from_le_bytes(arr(bytes)).to_string(),
        NodeKind::Int32 => i32::from_le_bytes(arr(bytes)).to_string(),
        NodeKind::Int64 => i64::from_le_bytes(arr(bytes)).to_string(),
        NodeKind::UInt8 => format!("0x{:02X}", le_u64(bytes, 1)),
        NodeKind::UInt16 | NodeKind::UInt32 | NodeKind::UInt64 => {
            le_u64(bytes, width(kind)).to_string()
        }
        NodeKind::Float => f32_at(bytes, 0).to_string(),
        NodeKind::Double => f64::from_le_bytes(arr(bytes)).to_string(),
        NodeKind::Bool => (le_u64(bytes, 1) != 0).to_string(),
        NodeKind::Pointer32 => format!("0x{:08X}", le_u64(bytes, 4)),
        NodeKind::Pointer64 => format!("0x{:016X}", le_u64(bytes, 8)),
        NodeKind::Vec2 | NodeKind::Vec3 | NodeKind::Vec4 => {
            let n = width(kind) / 4;
            components(bytes, 0, n)
        }
        NodeKind::Mat4x4 => (0..4)
            .map(|row| components(bytes, row * 4, 4))
            .collect::<Vec<_>>()
            .join("; "),
        NodeKind::UTF8 => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        NodeKind::UTF16 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
        NodeKind::Padding | NodeKind::Array | NodeKind::Struct => String::new(),
    }
}

/// Parses user `text` into exactly the bytes a `kind` node of `size`
/// bytes occupies.
///
/// `size` only matters for strings (truncate or zero-pad); fixed kinds use
/// their own width.
pub fn parse_value(kind: NodeKind, text: &str, size: usize) -> Result<Vec<u8>, ValueError> {
    let t = text.trim();
    if t.is_empty() && !kind.is_string() {
        return Err(ValueError::Empty);
    }
    match kind {
        NodeKind::Hex8 | NodeKind::Hex16 | NodeKind::Hex32 | NodeKind::Hex64 => {
            let w = width(kind);
            if has_hex_prefix(t) {
                let v = parse_unsigned(t, kind)?;
                Ok(v.to_le_bytes()[..w].to_vec())
            } else {
                parse_hex_bytes(t, w)
            }
        }
        NodeKind::Int8 | NodeKind::Int16 | NodeKind::Int32 | NodeKind::Int64 => {
            let w = width(kind);
            let v = parse_signed(t, kind)?;
            Ok(v.to_le_bytes()[..w].to_vec())
        }
        NodeKind::UInt8 | NodeKind::UInt16 | NodeKind::UInt32 | NodeKind::UInt64 => {
            let w = width(kind);
            let v = parse_unsigned(t, kind)?;
            Ok(v.to_le_bytes()[..w].to_vec())
        }
        NodeKind::Pointer32 | NodeKind::Pointer64 => {
            let w = width(kind);
            let digits = strip_hex_prefix(t);
            let v = u64::from_str_radix(digits, 16)
                .map_err(|_| ValueError::BadNumber(t.to_owned()))?;
            check_width(v, w, t, kind)?;
            Ok(v.to_le_bytes()[..w].to_vec())
        }
        NodeKind::Float => Ok(parse_f32(t)?.to_le_bytes().to_vec()),
        NodeKind::Double => t
            .parse::<f64>()
            .map(|v| v.to_le_bytes().to_vec())
            .map_err(|_| ValueError::BadNumber(t.to_owned())),
        NodeKind::Bool => match t.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(vec![1]),
            "false" | "0" => Ok(vec![0]),
            _ => Err(ValueError::BadBool(t.to_owned())),
        },
        NodeKind::Vec2 | NodeKind::Vec3 | NodeKind::Vec4 | NodeKind::Mat4x4 => {
            let expected = width(kind) / 4;
            let parts: Vec<&str> = t
                .split([',', ';'])
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() != expected {
                return Err(ValueError::ComponentCount {
                    expected,
                    got: parts.len(),
                });
            }
            let mut out = Vec::with_capacity(expected * 4);
            for p in parts {
                out.extend_from_slice(&parse_f32(p)?.to_le_bytes());
            }
            Ok(out)
        }
        NodeKind::UTF8 => {
            let mut out = text.as_bytes().to_vec();
            out.resize(size, 0);
            Ok(out)
        }
        NodeKind::UTF16 => {
            let mut out: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
            out.resize(size, 0);
            Ok(out)
        }
        NodeKind::Padding | NodeKind::Array | NodeKind::Struct => Err(ValueError::NotAValue(kind)),
    }
}

fn width(kind: NodeKind) -> usize {
    kind.fixed_size().map_or(0, |w| usize::try_from(w).unwrap_or(0))
}

fn fixed(bytes: &[u8], n: usize) -> Vec<u8> {
    let mut out = bytes.get(..n).unwrap_or(bytes).to_vec();
    out.resize(n, 0);
    out
}

fn arr<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = bytes.len().min(N);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn le_u64(bytes: &[u8], n: usize) -> u64 {
    let mut buf = [0u8; 8];
    let n = n.min(8).min(bytes.len());
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

fn f32_at(bytes: &[u8], component: usize) -> f32 {
    let start = component * 4;
    f32::from_le_bytes(arr(bytes.get(start..).unwrap_or(&[])))
}

fn components(bytes: &[u8], first: usize, n: usize) -> String {
    (first..first + n)
        .map(|i| f32_at(bytes, i).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_hex_prefix(t: &str) -> bool {
    t.starts_with("0x") || t.starts_with("0X")
}

fn strip_hex_prefix(t: &str) -> &str {
    t.strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t)
}

fn parse_hex_bytes(t: &str, expected: usize) -> Result<Vec<u8>, ValueError> {
    let digits: String = t.chars().filter(|c| !c.is_whitespace()).collect();
    let bad = || ValueError::BadHex {
        text: t.to_owned(),
        expected,
    };
    if digits.len() != expected * 2 || !digits.is_ascii() {
        return Err(bad());
    }
    (0..expected)
        .map(|i| u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| bad()))
        .collect()
}

fn check_width(v: u64, w: usize, t: &str, kind: NodeKind) -> Result<(), ValueError> {
    if w < 8 && v >> (w * 8) != 0 {
        return Err(ValueError::OutOfRange {
            text: t.to_owned(),
            kind,
        });
    }
    Ok(())
}

fn parse_unsigned(t: &str, kind: NodeKind) -> Result<u64, ValueError> {
    let v = if has_hex_prefix(t) {
        u64::from_str_radix(strip_hex_prefix(t), 16)
    } else {
        t.parse::<u64>()
    }
    .map_err(|_| {
        if t.starts_with('-') {
            ValueError::OutOfRange {
                text: t.to_owned(),
                kind,
            }
        } else {
            ValueError::BadNumber(t.to_owned())
        }
    })?;
    check_width(v, width(kind), t, kind)?;
    Ok(v)
}

/// Decimal values are range-checked as signed; `0x` values are taken as the
/// raw bit pattern of the kind's width.
fn parse_signed(t: &str, kind: NodeKind) -> Result<u64, ValueError> {
    if has_hex_prefix(t) {
        return parse_unsigned(t, kind);
    }
    let v: i64 = t
        .parse()
        .map_err(|_| ValueError::BadNumber(t.to_owned()))?;
    let bits = width(kind) * 8;
    if bits < 64 {
        let min = -(1i64 << (bits - 1));
        let max = (1i64 << (bits - 1)) - 1;
        if v < min || v > max {
            return Err(ValueError::OutOfRange {
                text: t.to_owned(),
                kind,
            });
        }
    }
    Ok(u64::from_le_bytes(v.to_le_bytes()))
}

fn parse_f32(t: &str) -> Result<f32, ValueError> {
    t.trim()
        .parse::<f32>()
        .map_err(|_| ValueError::BadNumber(t.to_owned()))
}
