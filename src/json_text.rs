//! JSON text layout shared by the normalizer, the sink and the filter pass.
//!
//! Output uses `", "` between items and `": "` between keys and values (keys keep source
//! order). Embedded `*_json` strings additionally escape every non-ASCII character as
//! `\uXXXX`, while whole output lines keep UTF-8 text as-is. Numbers are written with the
//! text they were decoded from.

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;
use std::io::{self, Write};

/// Compact formatter with spaced separators and optional ASCII-only strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpacedFormatter {
    ascii_only: bool,
}

impl SpacedFormatter {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }
}

impl Formatter for SpacedFormatter {
    #[inline]
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    #[inline]
    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    #[inline]
    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + Write,
    {
        if !self.ascii_only || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units).iter() {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize `value` into `writer` using the spaced layout.
pub fn write_spaced<W, T>(writer: W, value: &T, ascii_only: bool) -> serde_json::Result<()>
where
    W: Write,
    T: ?Sized + Serialize,
{
    let mut ser = Serializer::with_formatter(writer, SpacedFormatter::new(ascii_only));
    value.serialize(&mut ser)
}

/// Render a JSON value with the spaced layout.
pub fn value_to_spaced_string(value: &Value, ascii_only: bool) -> serde_json::Result<String> {
    let mut buf = Vec::with_capacity(128);
    write_spaced(&mut buf, value, ascii_only)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
