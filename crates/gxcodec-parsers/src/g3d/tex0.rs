//! TEX0 sub-files
//!
//! ```text
//! 0x00 common sub-file header
//! 0x10 s32 data offset   s32 name offset   u32 flags
//! 0x1C u16 width  u16 height  u32 format  u32 image count
//! 0x28 f32 min LOD  f32 max LOD
//! 0x40 image data
//! ```

use super::{open_subfile, read_subfile};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::names::{read_name, NameTable};
use crate::texture::{Texture, TextureFormat};
use crate::traits::{ParseError, ParseResult};

pub const TEX0_MAGIC: [u8; 4] = *b"TEX0";
pub const REVISION: u32 = 3;
const DATA_OFFSET: usize = 0x40;
const FLAG_PALETTED: u32 = 1;

pub(crate) fn read(reader: &mut Reader<'_>, at: usize, tx: &mut Transaction) -> ParseResult<Texture> {
    let header = read_subfile(reader, at, &TEX0_MAGIC)?;
    if header.revision != REVISION {
        tx.warn("TEX0", format!("revision {} read as revision {REVISION}", header.revision));
    }
    let data_offset = reader.read_i32()?;
    let name = read_name(reader, at)?;
    let flags = reader.read_u32()?;
    let width = reader.read_u16()?;
    let height = reader.read_u16()?;
    let raw_format = reader.read_u32()?;
    let format = TextureFormat::from_u32(raw_format)
        .ok_or_else(|| ParseError::invalid(format!("texture `{name}` uses unknown format {raw_format}")))?;
    let image_count = u8::try_from(reader.read_u32()?)
        .map_err(|_| ParseError::invalid(format!("texture `{name}` has too many images")))?;
    let min_lod = reader.read_f32()?;
    let max_lod = reader.read_f32()?;

    if flags & FLAG_PALETTED != 0 {
        tx.warn("TEX0", format!("palette of texture `{name}` is not carried"));
    }

    let data_at = usize::try_from(at as i64 + i64::from(data_offset))
        .map_err(|_| ParseError::invalid(format!("texture `{name}` data points before the file")))?;
    reader.seek(data_at)?;
    let data = reader.read_bytes(format.encoded_size(width, height, image_count))?.to_vec();

    let mut texture = Texture::new(name, format, width, height, image_count, data)?;
    texture.min_lod = min_lod;
    texture.max_lod = max_lod;
    Ok(texture)
}

pub(crate) fn write(writer: &mut Writer, texture: &Texture, index: usize, names: &mut NameTable) -> ParseResult<()> {
    let mut sub = open_subfile(writer, &TEX0_MAGIC, REVISION);
    let base = sub.start();
    let data_label = format!("TEX0.{index}.data");

    sub.write_offset(base, data_label.as_str(), LinkWidth::I32);
    names.reference(&mut sub, &texture.name, base);
    sub.write_u32(if texture.format.is_paletted() { FLAG_PALETTED } else { 0 });
    sub.write_u16(texture.width);
    sub.write_u16(texture.height);
    sub.write_u32(texture.format as u32);
    sub.write_u32(u32::from(texture.image_count));
    sub.write_f32(texture.min_lod);
    sub.write_f32(texture.max_lod);
    let header_end = sub.position() - base;
    sub.write_zeros(DATA_OFFSET - header_end);

    sub.label(data_label);
    sub.write_bytes(&texture.data);
    sub.align(32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    #[test]
    fn test_tex0_roundtrip() {
        let mut texture = Texture::new("wood", TextureFormat::CMPR, 8, 8, 1, vec![0xAB; 32]).unwrap();
        texture.max_lod = 0.0;

        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        write(&mut writer, &texture, 0, &mut names).unwrap();
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();

        assert_eq!(&bytes[0..4], b"TEX0");
        assert_eq!(u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]), REVISION);
        assert_eq!(&bytes[DATA_OFFSET..DATA_OFFSET + 32], &[0xAB; 32][..]);

        let mut tx = Transaction::new("tex0");
        let mut reader = Reader::new(&bytes, Endian::Big);
        assert_eq!(read(&mut reader, 0, &mut tx).unwrap(), texture);
        assert!(tx.diagnostics().is_empty());
    }
}
