use crate::error::Error;
use std::str::FromStr;

/// Element types found in the tile-data binary payload. Both are 4 bytes, little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int32,
    Float32,
}

impl FromStr for ElementType {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "int32" => Ok(ElementType::Int32),
            "float32" => Ok(ElementType::Float32),
            other => Err(Error::UnsupportedType(other.to_string())),
        }
    }
}

/// A decoded array.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Int32(Vec<u32>),
    Float32(Vec<f32>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Int32(v) => v.len(),
            Values::Float32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_u32(self) -> Option<Vec<u32>> {
        match self {
            Values::Int32(v) => Some(v),
            Values::Float32(_) => None,
        }
    }

    pub fn into_f32(self) -> Option<Vec<f32>> {
        match self {
            Values::Float32(v) => Some(v),
            Values::Int32(_) => None,
        }
    }
}

/// Decode `count` elements of `el_type` from the start of `buf`.
///
/// Returns the values and the number of bytes consumed (`count * 4`).
/// Bytes past that point are left alone; a buffer that cannot hold `count`
/// whole elements is rejected.
pub fn unpack(buf: &[u8], count: usize, el_type: ElementType) -> Result<(Values, usize), Error> {
    match el_type {
        ElementType::Int32 => unpack_u32(buf, count).map(|(v, n)| (Values::Int32(v), n)),
        ElementType::Float32 => unpack_f32(buf, count).map(|(v, n)| (Values::Float32(v), n)),
    }
}

pub fn unpack_u32(buf: &[u8], count: usize) -> Result<(Vec<u32>, usize), Error> {
    let (words, consumed) = words(buf, count)?;
    Ok((words.map(u32::from_le_bytes).collect(), consumed))
}

pub fn unpack_f32(buf: &[u8], count: usize) -> Result<(Vec<f32>, usize), Error> {
    let (words, consumed) = words(buf, count)?;
    Ok((words.map(f32::from_le_bytes).collect(), consumed))
}

const ELEMENT_SIZE: usize = 4;

fn words(buf: &[u8], count: usize) -> Result<(impl Iterator<Item = [u8; 4]> + '_, usize), Error> {
    let consumed = count * ELEMENT_SIZE;
    if buf.len() < consumed {
        return Err(Error::LengthMismatch {
            expected: consumed,
            actual: buf.len(),
        });
    }
    let iter = buf[..consumed]
        .chunks_exact(ELEMENT_SIZE)
        .map(|c| [c[0], c[1], c[2], c[3]]);
    Ok((iter, consumed))
}

/// Same as [`unpack`] but takes the element type as its wire tag (`"int32"`, `"float32"`).
pub fn unpack_tagged(buf: &[u8], count: usize, tag: &str) -> Result<(Values, usize), Error> {
    unpack(buf, count, tag.parse()?)
}
