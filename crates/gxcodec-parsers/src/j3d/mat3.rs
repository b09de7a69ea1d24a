//! MAT3: materials
//!
//! Entries are fixed-size: a flag byte, the sampler count, the
//! [`GpuState`] block and eight sampler slots.

use super::{read_remap, write_identity_remap, SectionHeader, PADDING};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::{GpuState, GPU_STATE_SIZE};
use crate::model::{Material, Model, Sampler, WrapMode};
use crate::names::{read_j3d_names, write_j3d_names};
use crate::texture::Texture;
use crate::traits::{ParseError, ParseResult};

pub const MAX_SAMPLERS: usize = 8;
const SAMPLER_SIZE: usize = 12;
pub const MATERIAL_SIZE: usize = 4 + GPU_STATE_SIZE + MAX_SAMPLERS * SAMPLER_SIZE;

const FLAG_OPAQUE: u8 = 1;
const FLAG_TRANSLUCENT: u8 = 4;
const NO_TEXTURE: u16 = 0xFFFF;

pub(crate) fn read(
    reader: &mut Reader<'_>,
    section: &SectionHeader,
    textures: &[Texture],
    tx: &mut Transaction,
) -> ParseResult<Vec<Material>> {
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;
    let entries_offset = reader.read_u32()?;
    let remap_offset = reader.read_u32()?;
    let names_offset = reader.read_u32()?;

    reader.seek(section.at(remap_offset))?;
    let (remap, identity) = read_remap(reader, count)?;
    if !identity {
        tx.warn("MAT3", "material table is remapped");
    }
    let names = if names_offset != 0 {
        reader.seek(section.at(names_offset))?;
        read_j3d_names(reader, tx)?
    } else {
        Vec::new()
    };

    let mut materials = Vec::with_capacity(count);
    for (i, &entry) in remap.iter().enumerate() {
        reader.seek(section.at(entries_offset) + entry as usize * MATERIAL_SIZE)?;
        let mut material = Material::new(names.get(i).cloned().unwrap_or_else(|| format!("material{i}")));
        material.translucent = reader.read_u8()? == FLAG_TRANSLUCENT;
        let sampler_count = reader.read_u8()? as usize;
        reader.skip(2)?;
        material.state = GpuState::read(reader)?;

        for slot in 0..MAX_SAMPLERS {
            let texture = reader.read_u16()?;
            let wrap_u = WrapMode::from_u8(reader.read_u8()?);
            let wrap_v = WrapMode::from_u8(reader.read_u8()?);
            let min_filter = reader.read_u8()?;
            let mag_filter = reader.read_u8()?;
            reader.skip(2)?;
            let lod_bias = reader.read_f32()?;
            if slot >= sampler_count || texture == NO_TEXTURE {
                continue;
            }
            let Some(target) = textures.get(texture as usize) else {
                tx.warn(
                    "MAT3",
                    format!("material `{}` samples missing texture {texture}; sampler dropped", material.name),
                );
                continue;
            };
            material.samplers.push(Sampler {
                texture: target.name.clone(),
                wrap_u,
                wrap_v,
                min_filter,
                mag_filter,
                lod_bias,
            });
        }
        materials.push(material);
    }
    Ok(materials)
}

pub(crate) fn write(writer: &mut Writer, model: &Model) -> ParseResult<()> {
    let mut section = writer.open_section(b"MAT3");
    let base = section.start();

    section.write_u16(model.materials.len() as u16);
    section.write_u16(0xFFFF);
    section.write_offset(base, "MAT3.entries", LinkWidth::I32);
    section.write_offset(base, "MAT3.remap", LinkWidth::I32);
    section.write_offset(base, "MAT3.names", LinkWidth::I32);

    section.align(4);
    section.label("MAT3.entries");
    for material in &model.materials {
        if material.samplers.len() > MAX_SAMPLERS {
            return Err(ParseError::invalid(format!(
                "material `{}` has {} samplers, at most {MAX_SAMPLERS} fit",
                material.name,
                material.samplers.len()
            )));
        }
        section.write_u8(if material.translucent { FLAG_TRANSLUCENT } else { FLAG_OPAQUE });
        section.write_u8(material.samplers.len() as u8);
        section.write_u16(0xFFFF);
        material.state.write(&mut section)?;

        for slot in 0..MAX_SAMPLERS {
            match material.samplers.get(slot) {
                Some(sampler) => {
                    let texture = model.find_texture(&sampler.texture).map_or(NO_TEXTURE, |i| i as u16);
                    section.write_u16(texture);
                    section.write_u8(sampler.wrap_u as u8);
                    section.write_u8(sampler.wrap_v as u8);
                    section.write_u8(sampler.min_filter);
                    section.write_u8(sampler.mag_filter);
                    section.write_u16(0xFFFF);
                    section.write_f32(sampler.lod_bias);
                }
                None => {
                    section.write_u16(NO_TEXTURE);
                    section.write_zeros(4);
                    section.write_u16(0xFFFF);
                    section.write_f32(0.0);
                }
            }
        }
    }

    section.label("MAT3.remap");
    write_identity_remap(&mut section, model.materials.len());
    section.align(4);
    section.label("MAT3.names");
    let names: Vec<&str> = model.materials.iter().map(|m| m.name.as_str()).collect();
    write_j3d_names(&mut section, &names);
    section.align_with(32, PADDING);
    Ok(())
}
