//! Minimal `.npy` codec for little-endian `f64` arrays.
//!
//! Only the subset rank payloads need: dtype `<f8`, C order, format
//! versions 1.0 through 3.0 on read, 1.0 on write.

use std::io;

const MAGIC: &[u8] = b"\x93NUMPY";
const ALIGN: usize = 64;

/// Dense `f64` array with its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    /// Dimensions, row-major.
    pub shape: Vec<usize>,
    /// Flattened values.
    pub data: Vec<f64>,
}

impl NpyArray {
    /// One-dimensional array.
    #[must_use]
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Encode `array` in `.npy` 1.0 layout.
///
/// # Errors
///
/// Fails when the shape does not match the data length or the header does
/// not fit the 1.0 format.
pub fn encode(array: &NpyArray) -> io::Result<Vec<u8>> {
    if array.shape.iter().product::<usize>() != array.data.len() {
        return Err(invalid("shape does not match data length"));
    }

    let shape = match array.shape.as_slice() {
        [n] => format!("({n},)"),
        dims => format!(
            "({})",
            dims.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!("{{'descr': '<f8', 'fortran_order': False, 'shape': {shape}, }}");

    // magic + version + u16 length, then header padded so data starts aligned
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    header.push_str(&" ".repeat((ALIGN - unpadded % ALIGN) % ALIGN));
    header.push('\n');

    let header_len = u16::try_from(header.len()).map_err(|_| invalid("header too long"))?;

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + array.data.len() * 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for v in &array.data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header.find(&format!("'{key}'"))? + key.len() + 2;
    let rest = header[start..].trim_start().strip_prefix(':')?.trim_start();
    if rest.starts_with('(') {
        rest.find(')').map(|end| &rest[..=end])
    } else {
        rest.find(',').map(|end| rest[..end].trim())
    }
}

/// Decode a `.npy` buffer holding `<f8` data.
///
/// # Errors
///
/// Fails on a bad magic string, unsupported version or dtype, Fortran order,
/// or truncated data.
pub fn decode(bytes: &[u8]) -> io::Result<NpyArray> {
    let rest = bytes.strip_prefix(MAGIC).ok_or_else(|| invalid("not an npy file"))?;
    let (header_len, rest) = match rest {
        [1, _, a, b, rest @ ..] => (usize::from(u16::from_le_bytes([*a, *b])), rest),
        [2 | 3, _, a, b, c, d, rest @ ..] => {
            let len = u32::from_le_bytes([*a, *b, *c, *d]);
            (usize::try_from(len).map_err(|_| invalid("header too long"))?, rest)
        }
        _ => return Err(invalid("unsupported npy version")),
    };

    if rest.len() < header_len {
        return Err(invalid("truncated header"));
    }
    let header = std::str::from_utf8(&rest[..header_len]).map_err(|_| invalid("header is not utf-8"))?;
    let body = &rest[header_len..];

    match header_value(header, "descr") {
        Some("'<f8'") => {}
        other => return Err(invalid(format!("unsupported dtype {other:?}"))),
    }
    if header_value(header, "fortran_order") == Some("True") {
        return Err(invalid("fortran order not supported"));
    }

    let shape_text = header_value(header, "shape").ok_or_else(|| invalid("missing shape"))?;
    let shape = shape_text
        .trim_matches(|c| c == '(' || c == ')')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|_| invalid(format!("bad dimension `{s}`"))))
        .collect::<io::Result<Vec<_>>>()?;

    let count: usize = shape.iter().product();
    if body.len() < count * 8 {
        return Err(invalid("truncated data"));
    }

    let data = body
        .chunks_exact(8)
        .take(count)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();

    Ok(NpyArray { shape, data })
}
