//! TEX1: texture headers and image data

use tracing::debug;

use super::{SectionHeader, PADDING};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::model::{Model, Sampler};
use crate::names::{read_j3d_names, write_j3d_names};
use crate::texture::{Texture, TextureFormat};
use crate::traits::{ParseError, ParseResult};

const HEADER_SIZE: usize = 0x20;

fn read_texture(reader: &mut Reader<'_>, header_at: usize, name: String, tx: &mut Transaction) -> ParseResult<Texture> {
    reader.seek(header_at)?;
    let raw_format = reader.read_u8()?;
    let format = TextureFormat::from_u32(u32::from(raw_format))
        .ok_or_else(|| ParseError::invalid(format!("texture `{name}` uses unknown format {raw_format}")))?;
    reader.skip(1)?;
    let width = reader.read_u16()?;
    let height = reader.read_u16()?;
    reader.skip(4)?;
    let palette_entries = reader.read_u16()?;
    reader.skip(4)?;
    if palette_entries != 0 {
        tx.warn("TEX1", format!("palette of texture `{name}` is not carried"));
    }
    reader.skip(6)?;
    let min_lod = f32::from(reader.read_i8()?) / 8.0;
    let max_lod = f32::from(reader.read_i8()?) / 8.0;
    let image_count = reader.read_u8()?;
    reader.skip(3)?;
    let data_offset = reader.read_u32()? as usize;

    reader.seek(header_at + data_offset)?;
    let data = reader.read_bytes(format.encoded_size(width, height, image_count))?.to_vec();
    let mut texture = Texture::new(name, format, width, height, image_count, data)?;
    texture.min_lod = min_lod;
    texture.max_lod = max_lod;
    Ok(texture)
}

pub(crate) fn read(reader: &mut Reader<'_>, section: &SectionHeader, tx: &mut Transaction) -> ParseResult<Vec<Texture>> {
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;
    let headers_offset = reader.read_u32()?;
    let names_offset = reader.read_u32()?;

    let names = if names_offset != 0 {
        reader.seek(section.at(names_offset))?;
        read_j3d_names(reader, tx)?
    } else {
        Vec::new()
    };

    let mut textures = Vec::with_capacity(count);
    for i in 0..count {
        let name = names.get(i).cloned().unwrap_or_else(|| format!("texture{i}"));
        let header_at = section.at(headers_offset) + i * HEADER_SIZE;
        match read_texture(reader, header_at, name, tx) {
            Ok(texture) => {
                debug!(texture = %texture.name, format = ?texture.format, "Read texture");
                textures.push(texture);
            }
            Err(e @ ParseError::InvalidStructure(_)) => tx.error("TEX1", e.to_string()),
            Err(e) => return Err(e),
        }
    }
    Ok(textures)
}

/// Sampler state stored in the texture header comes from the first
/// material that samples it
fn first_sampler<'m>(model: &'m Model, texture: &str) -> Option<&'m Sampler> {
    model
        .materials
        .iter()
        .flat_map(|m| &m.samplers)
        .find(|s| s.texture == texture)
}

pub(crate) fn write(writer: &mut Writer, model: &Model) -> ParseResult<()> {
    let mut section = writer.open_section(b"TEX1");
    let base = section.start();

    section.write_u16(model.textures.len() as u16);
    section.write_u16(0xFFFF);
    section.write_offset(base, "TEX1.headers", LinkWidth::I32);
    section.write_offset(base, "TEX1.names", LinkWidth::I32);

    section.align(32);
    section.label("TEX1.headers");
    for (i, texture) in model.textures.iter().enumerate() {
        let header_at = section.position();
        let sampler = first_sampler(model, &texture.name);
        section.write_u8(texture.format as u8);
        section.write_u8(0);
        section.write_u16(texture.width);
        section.write_u16(texture.height);
        section.write_u8(sampler.map_or(0, |s| s.wrap_u as u8));
        section.write_u8(sampler.map_or(0, |s| s.wrap_v as u8));
        section.write_u8(0);
        section.write_u8(0);
        section.write_u16(0);
        section.write_u32(0);
        section.write_u8(u8::from(texture.image_count > 1));
        section.write_u8(0);
        section.write_u8(0);
        section.write_u8(0);
        section.write_u8(sampler.map_or(1, |s| s.min_filter));
        section.write_u8(sampler.map_or(1, |s| s.mag_filter));
        section.write_i8((texture.min_lod * 8.0).round() as i8);
        section.write_i8((texture.max_lod * 8.0).round() as i8);
        section.write_u8(texture.image_count);
        section.write_u8(0xFF);
        section.write_i16(sampler.map_or(0, |s| (s.lod_bias * 100.0).round() as i16));
        section.write_offset(header_at, format!("TEX1.data{i}"), LinkWidth::I32);
    }

    section.label("TEX1.names");
    let names: Vec<&str> = model.textures.iter().map(|t| t.name.as_str()).collect();
    write_j3d_names(&mut section, &names);

    for (i, texture) in model.textures.iter().enumerate() {
        section.align(32);
        section.label(format!("TEX1.data{i}"));
        section.write_bytes(&texture.data);
    }
    section.align_with(32, PADDING);
    Ok(())
}
