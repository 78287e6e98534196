use std::fmt;
use std::io::{self, Read, Write};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Trait bound for scalar types usable in tensors.
/// Supports `f32` and `f64`.
pub trait Float:
    Copy
    + Clone
    + Default
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + 'static
{
    const ZERO: Self;
    const ONE: Self;
    /// Most negative finite value. Used as the padding fill for max pooling
    /// so padded cells never win a comparison.
    const MIN: Self;

    fn from_f64(v: f64) -> Self;
    fn to_f64(self) -> f64;

    fn abs(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;

    /// Fill `buf` from a little-endian byte stream.
    fn read_le<R: Read + ?Sized>(reader: &mut R, buf: &mut [Self]) -> io::Result<()>;
    /// Write `buf` to a little-endian byte stream.
    fn write_le<W: Write + ?Sized>(writer: &mut W, buf: &[Self]) -> io::Result<()>;
}

impl Float for f32 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const MIN: Self = f32::MIN;

    #[inline] fn from_f64(v: f64) -> Self { v as f32 }
    #[inline] fn to_f64(self) -> f64 { self as f64 }
    #[inline] fn abs(self) -> Self { f32::abs(self) }
    #[inline] fn max(self, other: Self) -> Self { f32::max(self, other) }
    #[inline] fn min(self, other: Self) -> Self { f32::min(self, other) }

    fn read_le<R: Read + ?Sized>(reader: &mut R, buf: &mut [Self]) -> io::Result<()> {
        reader.read_f32_into::<LittleEndian>(buf)
    }

    fn write_le<W: Write + ?Sized>(writer: &mut W, buf: &[Self]) -> io::Result<()> {
        for &v in buf {
            writer.write_f32::<LittleEndian>(v)?;
        }
        Ok(())
    }
}

impl Float for f64 {
    const ZERO: Self = 0.0;
    const ONE: Self = 1.0;
    const MIN: Self = f64::MIN;

    #[inline] fn from_f64(v: f64) -> Self { v }
    #[inline] fn to_f64(self) -> f64 { self }
    #[inline] fn abs(self) -> Self { f64::abs(self) }
    #[inline] fn max(self, other: Self) -> Self { f64::max(self, other) }
    #[inline] fn min(self, other: Self) -> Self { f64::min(self, other) }

    fn read_le<R: Read + ?Sized>(reader: &mut R, buf: &mut [Self]) -> io::Result<()> {
        reader.read_f64_into::<LittleEndian>(buf)
    }

    fn write_le<W: Write + ?Sized>(writer: &mut W, buf: &[Self]) -> io::Result<()> {
        for &v in buf {
            writer.write_f64::<LittleEndian>(v)?;
        }
        Ok(())
    }
}
