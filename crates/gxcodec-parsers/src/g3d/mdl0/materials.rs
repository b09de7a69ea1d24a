//! Material records
//!
//! ```text
//! 0x00 u32 size        0x0C u32 id
//! 0x04 s32 MDL0        0x10 u32 flags
//! 0x08 s32 name        0x14 u32 sampler count
//! 0x18 GPU state
//!      samplers, 16 bytes each:
//!        s32 texture name, u8 wrap s, u8 wrap t, u8 min, u8 mag, f32 LOD bias, u32 0
//! ```

use super::{order_by_id, write_record_prefix, Dictionary, Section};
use crate::binary::{Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::{GpuState, GPU_STATE_SIZE};
use crate::model::{Material, Model, Sampler, WrapMode};
use crate::names::{read_name, NameTable};
use crate::traits::{ParseError, ParseResult};

const HEADER_SIZE: usize = 0x18;
const SAMPLER_SIZE: usize = 0x10;
const FLAG_TRANSLUCENT: u32 = 1;

fn record_size(material: &Material) -> usize {
    HEADER_SIZE + GPU_STATE_SIZE + SAMPLER_SIZE * material.samplers.len()
}

fn read_material(reader: &mut Reader<'_>, record: usize) -> ParseResult<(u32, Material)> {
    reader.seek(record)?;
    let size = reader.read_u32()? as usize;
    let _mdl0 = reader.read_i32()?;
    let mut material = Material::new(read_name(reader, record)?);
    let id = reader.read_u32()?;
    material.translucent = reader.read_u32()? & FLAG_TRANSLUCENT != 0;
    let samplers = reader.read_u32()? as usize;
    if HEADER_SIZE + GPU_STATE_SIZE + SAMPLER_SIZE * samplers > size {
        return Err(ParseError::invalid(format!(
            "material `{}` lists {samplers} samplers in a {size}-byte record",
            material.name
        )));
    }
    material.state = GpuState::read(reader)?;

    for _ in 0..samplers {
        let at = reader.position();
        let mut sampler = Sampler::new(read_name(reader, at)?);
        sampler.wrap_u = WrapMode::from_u8(reader.read_u8()?);
        sampler.wrap_v = WrapMode::from_u8(reader.read_u8()?);
        sampler.min_filter = reader.read_u8()?;
        sampler.mag_filter = reader.read_u8()?;
        sampler.lod_bias = reader.read_f32()?;
        reader.skip(4)?;
        material.samplers.push(sampler);
    }
    Ok((id, material))
}

pub(crate) fn read(reader: &mut Reader<'_>, dict: &Dictionary, tx: &mut Transaction) -> ParseResult<Vec<Material>> {
    let mut materials = Vec::with_capacity(dict.len());
    for node in dict.entries() {
        let entry = read_material(reader, node.data)
            .map_err(|e| e.with_context(format!("material `{}`", node.name)))?;
        materials.push(entry);
    }
    Ok(order_by_id(materials, "MDL0.materials", tx))
}

pub(crate) fn write(writer: &mut Writer, model: &Model, mdl0: usize, names: &mut NameTable) -> ParseResult<()> {
    writer.align(4);
    for (i, material) in model.materials.iter().enumerate() {
        let record = writer.position();
        writer.label(Section::Materials.entry_label(i));
        write_record_prefix(writer, record_size(material) as u32, mdl0);
        names.reference(writer, &material.name, record);
        writer.write_u32(i as u32);
        writer.write_u32(if material.translucent { FLAG_TRANSLUCENT } else { 0 });
        writer.write_u32(material.samplers.len() as u32);
        material
            .state
            .write(writer)
            .map_err(|e| e.with_context(format!("material `{}`", material.name)))?;
        for sampler in &material.samplers {
            names.reference_here(writer, &sampler.texture);
            writer.write_u8(sampler.wrap_u as u8);
            writer.write_u8(sampler.wrap_v as u8);
            writer.write_u8(sampler.min_filter);
            writer.write_u8(sampler.mag_filter);
            writer.write_f32(sampler.lod_bias);
            writer.write_u32(0);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    #[test]
    fn test_material_records() {
        let mut model = Model::new();
        let mut lit = Material::new("lit");
        let mut sampler = Sampler::new("bricks");
        sampler.wrap_u = WrapMode::Mirror;
        sampler.lod_bias = -0.5;
        lit.samplers.push(sampler);
        lit.samplers.push(Sampler::new(""));
        let mut glass = Material::new("glass");
        glass.translucent = true;
        model.materials = vec![lit, glass];

        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        write(&mut writer, &model, 0, &mut names).unwrap();
        let mut dict = Dictionary::new();
        for (i, material) in model.materials.iter().enumerate() {
            let at = writer.label_position(&Section::Materials.entry_label(i)).unwrap();
            dict.insert(&material.name, at).unwrap();
        }
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();
        assert_eq!(
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
            record_size(&model.materials[0])
        );

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("materials");
        let materials = read(&mut reader, &dict, &mut tx).unwrap();
        assert_eq!(materials, model.materials);
    }
}
