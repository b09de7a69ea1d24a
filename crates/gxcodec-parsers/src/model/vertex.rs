//! Vertex buffers and their quantized storage formats

use serde::{Deserialize, Serialize};

use super::NumericFamily;
use crate::binary::{Reader, Writer};
use crate::gx::BufferSlot;
use crate::traits::{ParseError, ParseResult};

/// What a buffer holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferKind {
    Position,
    Normal,
    Color,
    TexCoord,
}

impl BufferKind {
    /// Kind of buffer a mesh slot binds
    pub fn for_slot(slot: BufferSlot) -> Self {
        match slot {
            BufferSlot::Position => BufferKind::Position,
            BufferSlot::Normal => BufferKind::Normal,
            BufferSlot::Color(_) => BufferKind::Color,
            BufferSlot::TexCoord(_) => BufferKind::TexCoord,
        }
    }
}

/// Scalar storage of generic attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ComponentType {
    U8 = 0,
    S8 = 1,
    U16 = 2,
    S16 = 3,
    F32 = 4,
}

impl ComponentType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::U8),
            1 => Some(Self::S8),
            2 => Some(Self::U16),
            3 => Some(Self::S16),
            4 => Some(Self::F32),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::F32 => 4,
        }
    }

    fn range(self) -> (f64, f64) {
        match self {
            Self::U8 => (0.0, u8::MAX as f64),
            Self::S8 => (i8::MIN as f64, i8::MAX as f64),
            Self::U16 => (0.0, u16::MAX as f64),
            Self::S16 => (i16::MIN as f64, i16::MAX as f64),
            Self::F32 => (f64::MIN, f64::MAX),
        }
    }
}

/// Packed color layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColorFormat {
    Rgb565 = 0,
    Rgb8 = 1,
    Rgbx8 = 2,
    Rgba4 = 3,
    Rgba6 = 4,
    Rgba8 = 5,
}

impl ColorFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Rgb565),
            1 => Some(Self::Rgb8),
            2 => Some(Self::Rgbx8),
            3 => Some(Self::Rgba4),
            4 => Some(Self::Rgba6),
            5 => Some(Self::Rgba8),
            _ => None,
        }
    }

    pub fn size(self) -> usize {
        match self {
            Self::Rgb565 | Self::Rgba4 => 2,
            Self::Rgb8 | Self::Rgba6 => 3,
            Self::Rgbx8 | Self::Rgba8 => 4,
        }
    }
}

/// On-disk encoding of a vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexFormat {
    /// `count` is the raw GX component-count enum for the buffer kind
    Generic { count: u32, ty: ComponentType, shift: u8 },
    Color { count: u32, format: ColorFormat },
}

impl VertexFormat {
    pub fn float(count: u32) -> Self {
        VertexFormat::Generic { count, ty: ComponentType::F32, shift: 0 }
    }

    /// Raw `(count, type, shift)` triple as stored in format tables
    pub fn to_raw(self) -> (u32, u32, u8) {
        match self {
            VertexFormat::Generic { count, ty, shift } => (count, ty as u32, shift),
            VertexFormat::Color { count, format } => (count, format as u32, 0),
        }
    }

    pub fn from_raw(kind: BufferKind, count: u32, ty: u32, shift: u8) -> ParseResult<Self> {
        let bad = || ParseError::invalid(format!("vertex format {ty} is not valid for {kind:?} data"));
        if kind == BufferKind::Color {
            let format = ColorFormat::from_u32(ty).ok_or_else(bad)?;
            Ok(VertexFormat::Color { count, format })
        } else {
            let ty = ComponentType::from_u32(ty).ok_or_else(bad)?;
            Ok(VertexFormat::Generic { count, ty, shift })
        }
    }

    /// Components stored per element
    pub fn components(self, kind: BufferKind) -> ParseResult<usize> {
        let count = match self {
            VertexFormat::Generic { count, .. } | VertexFormat::Color { count, .. } => count,
        };
        match (kind, count) {
            (BufferKind::Position, 0) => Ok(2),
            (BufferKind::Position, 1) => Ok(3),
            (BufferKind::Normal, 0) => Ok(3),
            (BufferKind::TexCoord, 0) => Ok(1),
            (BufferKind::TexCoord, 1) => Ok(2),
            (BufferKind::Color, 0) => Ok(3),
            (BufferKind::Color, 1) => Ok(4),
            _ => Err(ParseError::invalid(format!(
                "component count {count} is not supported for {kind:?} data"
            ))),
        }
    }

    /// Bytes per element
    pub fn stride(self, kind: BufferKind) -> ParseResult<usize> {
        match self {
            VertexFormat::Generic { ty, .. } => Ok(self.components(kind)? * ty.size()),
            VertexFormat::Color { format, .. } => Ok(format.size()),
        }
    }
}

/// Decoded element data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VertexArray {
    Positions(Vec<[f32; 3]>),
    Normals(Vec<[f32; 3]>),
    Colors(Vec<[u8; 4]>),
    TexCoords(Vec<[f32; 2]>),
}

impl VertexArray {
    pub fn empty(kind: BufferKind) -> Self {
        match kind {
            BufferKind::Position => VertexArray::Positions(Vec::new()),
            BufferKind::Normal => VertexArray::Normals(Vec::new()),
            BufferKind::Color => VertexArray::Colors(Vec::new()),
            BufferKind::TexCoord => VertexArray::TexCoords(Vec::new()),
        }
    }

    pub fn kind(&self) -> BufferKind {
        match self {
            VertexArray::Positions(_) => BufferKind::Position,
            VertexArray::Normals(_) => BufferKind::Normal,
            VertexArray::Colors(_) => BufferKind::Color,
            VertexArray::TexCoords(_) => BufferKind::TexCoord,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            VertexArray::Positions(v) | VertexArray::Normals(v) => v.len(),
            VertexArray::Colors(v) => v.len(),
            VertexArray::TexCoords(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn truncate(&mut self, len: usize) {
        match self {
            VertexArray::Positions(v) | VertexArray::Normals(v) => v.truncate(len),
            VertexArray::Colors(v) => v.truncate(len),
            VertexArray::TexCoords(v) => v.truncate(len),
        }
    }

    fn largest_magnitude(&self) -> f32 {
        let fold = |acc: f32, c: &f32| acc.max(c.abs());
        match self {
            VertexArray::Positions(v) | VertexArray::Normals(v) => v.iter().flatten().fold(0.0, fold),
            VertexArray::TexCoords(v) => v.iter().flatten().fold(0.0, fold),
            VertexArray::Colors(_) => 0.0,
        }
    }
}

/// Named vertex buffer owned by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexBuffer {
    pub name: String,
    pub format: VertexFormat,
    pub data: VertexArray,
}

impl VertexBuffer {
    pub fn new(name: impl Into<String>, format: VertexFormat, data: VertexArray) -> Self {
        Self {
            name: name.into(),
            format,
            data,
        }
    }

    pub fn kind(&self) -> BufferKind {
        self.data.kind()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn stride(&self) -> ParseResult<usize> {
        self.format.stride(self.kind())
    }

    pub fn is_float(&self) -> bool {
        matches!(self.format, VertexFormat::Generic { ty: ComponentType::F32, .. })
    }

    /// Re-encode for `family` and snap the data to what the new format can
    /// represent. Colors are unaffected.
    pub fn requantize(&mut self, family: NumericFamily) -> ParseResult<()> {
        let VertexFormat::Generic { count, .. } = self.format else {
            return Ok(());
        };
        self.format = match family {
            NumericFamily::Float => VertexFormat::Generic { count, ty: ComponentType::F32, shift: 0 },
            NumericFamily::Fixed => {
                let magnitude = self.data.largest_magnitude().max(f32::MIN_POSITIVE);
                let mut shift = 0u8;
                while shift < 15 && magnitude * ((1u32 << (shift + 1)) as f32) <= i16::MAX as f32 {
                    shift += 1;
                }
                VertexFormat::Generic { count, ty: ComponentType::S16, shift }
            }
        };

        let mut writer = Writer::new(crate::binary::Endian::Big);
        write_vertex_array(&mut writer, self)?;
        let bytes = writer.finish()?;
        let mut reader = Reader::new(&bytes, crate::binary::Endian::Big);
        self.data = read_vertex_array(&mut reader, self.kind(), self.format, self.len())?;
        Ok(())
    }
}

fn read_scalar(reader: &mut Reader<'_>, ty: ComponentType, scale: f32) -> ParseResult<f32> {
    Ok(match ty {
        ComponentType::U8 => reader.read_u8()? as f32 / scale,
        ComponentType::S8 => reader.read_i8()? as f32 / scale,
        ComponentType::U16 => reader.read_u16()? as f32 / scale,
        ComponentType::S16 => reader.read_i16()? as f32 / scale,
        ComponentType::F32 => reader.read_f32()?,
    })
}

fn write_scalar(writer: &mut Writer, ty: ComponentType, scale: f32, value: f32) {
    let (lo, hi) = ty.range();
    let fixed = ((value as f64) * scale as f64).round().clamp(lo, hi);
    match ty {
        ComponentType::U8 => writer.write_u8(fixed as u8),
        ComponentType::S8 => writer.write_i8(fixed as i8),
        ComponentType::U16 => writer.write_u16(fixed as u16),
        ComponentType::S16 => writer.write_i16(fixed as i16),
        ComponentType::F32 => writer.write_f32(value),
    }
}

fn expand(value: u32, bits: u32) -> u8 {
    let v = value << (8 - bits);
    (v | (v >> bits)) as u8
}

fn read_color(reader: &mut Reader<'_>, format: ColorFormat) -> ParseResult<[u8; 4]> {
    Ok(match format {
        ColorFormat::Rgb565 => {
            let v = reader.read_u16()? as u32;
            [expand(v >> 11, 5), expand((v >> 5) & 0x3F, 6), expand(v & 0x1F, 5), 0xFF]
        }
        ColorFormat::Rgb8 => {
            let [r, g, b] = reader.read_array::<3>()?;
            [r, g, b, 0xFF]
        }
        ColorFormat::Rgbx8 => {
            let [r, g, b, _] = reader.read_array::<4>()?;
            [r, g, b, 0xFF]
        }
        ColorFormat::Rgba4 => {
            let v = reader.read_u16()? as u32;
            [
                expand(v >> 12, 4),
                expand((v >> 8) & 0xF, 4),
                expand((v >> 4) & 0xF, 4),
                expand(v & 0xF, 4),
            ]
        }
        ColorFormat::Rgba6 => {
            let [a, b, c] = reader.read_array::<3>()?;
            let v = (a as u32) << 16 | (b as u32) << 8 | c as u32;
            [
                expand(v >> 18, 6),
                expand((v >> 12) & 0x3F, 6),
                expand((v >> 6) & 0x3F, 6),
                expand(v & 0x3F, 6),
            ]
        }
        ColorFormat::Rgba8 => reader.read_array::<4>()?,
    })
}

fn write_color(writer: &mut Writer, format: ColorFormat, c: [u8; 4]) {
    let q = |v: u8, bits: u32| (v as u32) >> (8 - bits);
    match format {
        ColorFormat::Rgb565 => {
            writer.write_u16((q(c[0], 5) << 11 | q(c[1], 6) << 5 | q(c[2], 5)) as u16);
        }
        ColorFormat::Rgb8 => writer.write_bytes(&c[..3]),
        ColorFormat::Rgbx8 => writer.write_bytes(&[c[0], c[1], c[2], 0xFF]),
        ColorFormat::Rgba4 => {
            writer.write_u16((q(c[0], 4) << 12 | q(c[1], 4) << 8 | q(c[2], 4) << 4 | q(c[3], 4)) as u16);
        }
        ColorFormat::Rgba6 => {
            let v = q(c[0], 6) << 18 | q(c[1], 6) << 12 | q(c[2], 6) << 6 | q(c[3], 6);
            writer.write_bytes(&[(v >> 16) as u8, (v >> 8) as u8, v as u8]);
        }
        ColorFormat::Rgba8 => writer.write_bytes(&c),
    }
}

/// Decode `count` elements at the cursor
pub fn read_vertex_array(
    reader: &mut Reader<'_>,
    kind: BufferKind,
    format: VertexFormat,
    count: usize,
) -> ParseResult<VertexArray> {
    let components = format.components(kind)?;
    let mut data = VertexArray::empty(kind);

    match format {
        VertexFormat::Color { format, .. } => {
            let VertexArray::Colors(out) = &mut data else {
                return Err(ParseError::invalid(format!("{kind:?} buffer cannot use a color format")));
            };
            out.reserve(count);
            for _ in 0..count {
                out.push(read_color(reader, format)?);
            }
        }
        VertexFormat::Generic { ty, shift, .. } => {
            let scale = (1u32 << shift.min(31)) as f32;
            for _ in 0..count {
                let mut element = [0f32; 3];
                for c in element.iter_mut().take(components) {
                    *c = read_scalar(reader, ty, scale)?;
                }
                match &mut data {
                    VertexArray::Positions(v) | VertexArray::Normals(v) => v.push(element),
                    VertexArray::TexCoords(v) => v.push([element[0], element[1]]),
                    VertexArray::Colors(_) => {
                        return Err(ParseError::invalid("color buffer needs a color format"));
                    }
                }
            }
        }
    }

    Ok(data)
}

/// Encode every element of `buffer` at the cursor
pub fn write_vertex_array(writer: &mut Writer, buffer: &VertexBuffer) -> ParseResult<()> {
    let kind = buffer.kind();
    let components = buffer.format.components(kind)?;

    match (buffer.format, &buffer.data) {
        (VertexFormat::Color { format, .. }, VertexArray::Colors(colors)) => {
            for c in colors {
                write_color(writer, format, *c);
            }
        }
        (VertexFormat::Generic { ty, shift, .. }, VertexArray::Positions(v) | VertexArray::Normals(v)) => {
            let scale = (1u32 << shift.min(31)) as f32;
            for element in v {
                for &c in element.iter().take(components) {
                    write_scalar(writer, ty, scale, c);
                }
            }
        }
        (VertexFormat::Generic { ty, shift, .. }, VertexArray::TexCoords(v)) => {
            let scale = (1u32 << shift.min(31)) as f32;
            for element in v {
                for &c in element.iter().take(components) {
                    write_scalar(writer, ty, scale, c);
                }
            }
        }
        _ => {
            return Err(ParseError::invalid(format!(
                "buffer `{}` has a format that does not match its {:?} data",
                buffer.name, kind
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    fn encode(buffer: &VertexBuffer) -> Vec<u8> {
        let mut writer = Writer::new(Endian::Big);
        write_vertex_array(&mut writer, buffer).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_fixed_point_positions() {
        let buffer = VertexBuffer::new(
            "pos",
            VertexFormat::Generic { count: 1, ty: ComponentType::S16, shift: 8 },
            VertexArray::Positions(vec![[1.5, -2.0, 0.25]]),
        );
        let bytes = encode(&buffer);
        assert_eq!(bytes, vec![0x01, 0x80, 0xFE, 0x00, 0x00, 0x40]);

        let mut reader = Reader::new(&bytes, Endian::Big);
        let data = read_vertex_array(&mut reader, BufferKind::Position, buffer.format, 1).unwrap();
        assert_eq!(data, buffer.data);
    }

    #[test]
    fn test_two_component_positions_pad_z() {
        let format = VertexFormat::Generic { count: 0, ty: ComponentType::F32, shift: 0 };
        assert_eq!(format.stride(BufferKind::Position).unwrap(), 8);
        let bytes = [0x3F, 0x80, 0, 0, 0x40, 0, 0, 0];
        let mut reader = Reader::new(&bytes, Endian::Big);
        let data = read_vertex_array(&mut reader, BufferKind::Position, format, 1).unwrap();
        assert_eq!(data, VertexArray::Positions(vec![[1.0, 2.0, 0.0]]));
    }

    #[test]
    fn test_color_formats_are_stable() {
        let colors = vec![[0x12, 0x9A, 0xF0, 0x33], [0xFF, 0x00, 0x80, 0xFF]];
        for format in [
            ColorFormat::Rgb565,
            ColorFormat::Rgb8,
            ColorFormat::Rgbx8,
            ColorFormat::Rgba4,
            ColorFormat::Rgba6,
            ColorFormat::Rgba8,
        ] {
            let buffer = VertexBuffer::new(
                "clr",
                VertexFormat::Color { count: 1, format },
                VertexArray::Colors(colors.clone()),
            );
            let first = encode(&buffer);
            assert_eq!(first.len(), format.size() * colors.len());

            let mut reader = Reader::new(&first, Endian::Big);
            let decoded = read_vertex_array(&mut reader, BufferKind::Color, buffer.format, 2).unwrap();
            let again = encode(&VertexBuffer { data: decoded, ..buffer.clone() });
            assert_eq!(first, again, "{format:?}");
        }
    }

    #[test]
    fn test_requantize_to_fixed() {
        let mut buffer = VertexBuffer::new(
            "pos",
            VertexFormat::float(1),
            VertexArray::Positions(vec![[100.3, -50.0, 0.0]]),
        );
        buffer.requantize(NumericFamily::Fixed).unwrap();

        let VertexFormat::Generic { ty, shift, .. } = buffer.format else {
            panic!("expected generic format");
        };
        assert_eq!(ty, ComponentType::S16);
        assert_eq!(shift, 8);
        let VertexArray::Positions(v) = &buffer.data else { panic!() };
        assert!((v[0][0] - 100.3).abs() < 1.0 / 256.0);

        let snapshot = buffer.clone();
        buffer.requantize(NumericFamily::Fixed).unwrap();
        assert_eq!(buffer, snapshot);
    }
}
