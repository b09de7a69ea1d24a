//! SHP1: shapes, vertex descriptors, matrix palettes and display lists
//!
//! ```text
//! shape entry (0x28)       matrix data (8)        primitive header (8)
//! 0x00 u8  mode            0x0 s16 current        0x0 u32 DL size
//! 0x02 u16 #primitives     0x2 u16 list length    0x4 u32 DL offset
//! 0x04 u16 VCD offset      0x4 u32 list start
//! 0x06 u16 first data
//! 0x08 u16 first header
//! 0x0C f32 radius
//! 0x10 bbox
//! ```

use gxcodec_core::{BoundingBox, Vec3};
use tracing::debug;

use super::{read_remap, slot_buffer_name, write_identity_remap, SectionHeader, PADDING};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::{
    decode_display_list, encode_display_list, MatrixPrimitive, VertexAttribute, VertexAttributeType,
    VertexDescriptor, VertexUsage,
};
use crate::model::{Mesh, Model, ShapeMode};
use crate::names::{read_j3d_names, write_j3d_names};
use crate::traits::{ParseError, ParseResult};

const SHAPE_SIZE: usize = 0x28;
const VCD_END: u32 = 0xFF;
/// Matrix list entry meaning "keep the previous primitive's matrix"
const MATRIX_UNCHANGED: u16 = 0xFFFF;

struct Offsets {
    shapes: u32,
    remap: u32,
    names: u32,
    vcd: u32,
    matrix_list: u32,
    dl: u32,
    matrix_data: u32,
    headers: u32,
}

fn read_descriptor(reader: &mut Reader<'_>) -> ParseResult<VertexDescriptor> {
    let mut descriptor = VertexDescriptor::new();
    loop {
        let attr = reader.read_u32()?;
        let ty = reader.read_u32()?;
        if attr == VCD_END {
            return Ok(descriptor);
        }
        let attribute = VertexAttribute::from_u32(attr)
            .ok_or_else(|| ParseError::invalid(format!("unknown vertex attribute {attr}")))?;
        let ty = VertexAttributeType::from_u32(ty)
            .ok_or_else(|| ParseError::invalid(format!("unknown storage type {ty} for {attribute}")))?;
        descriptor.set(attribute, ty);
    }
}

fn write_descriptor(writer: &mut Writer, descriptor: &VertexDescriptor) {
    for (attribute, ty) in descriptor.present() {
        writer.write_u32(attribute as u32);
        writer.write_u32(ty as u32);
    }
    writer.write_u32(VCD_END);
    writer.write_u32(0);
}

fn descriptor_size(descriptor: &VertexDescriptor) -> usize {
    (descriptor.present().count() + 1) * 8
}

pub(crate) fn read(
    reader: &mut Reader<'_>,
    section: &SectionHeader,
    usage: &mut VertexUsage,
    tx: &mut Transaction,
) -> ParseResult<Vec<Mesh>> {
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;
    let offsets = Offsets {
        shapes: reader.read_u32()?,
        remap: reader.read_u32()?,
        names: reader.read_u32()?,
        vcd: reader.read_u32()?,
        matrix_list: reader.read_u32()?,
        dl: reader.read_u32()?,
        matrix_data: reader.read_u32()?,
        headers: reader.read_u32()?,
    };

    reader.seek(section.at(offsets.remap))?;
    let (remap, identity) = read_remap(reader, count)?;
    if !identity {
        tx.warn("SHP1", "shape table is remapped");
    }

    let names = if offsets.names != 0 {
        reader.seek(section.at(offsets.names))?;
        read_j3d_names(reader, tx)?
    } else {
        Vec::new()
    };

    let mut meshes = Vec::with_capacity(count);
    for (i, &entry) in remap.iter().enumerate() {
        let name = names.get(i).cloned().unwrap_or_else(|| format!("shape{i}"));
        reader.seek(section.at(offsets.shapes) + entry as usize * SHAPE_SIZE)?;
        let mut mesh = Mesh::new(name);
        mesh.mode = ShapeMode::from_u8(reader.read_u8()?);
        reader.skip(1)?;
        let prim_count = reader.read_u16()? as usize;
        let vcd_offset = reader.read_u16()?;
        let first_data = reader.read_u16()? as usize;
        let first_header = reader.read_u16()? as usize;
        reader.skip(2)?;
        mesh.bounding_radius = reader.read_f32()?;
        let min = Vec3::from(reader.read_vec3()?);
        let max = Vec3::from(reader.read_vec3()?);
        mesh.bounds = BoundingBox::new(min, max);

        reader.seek(section.at(offsets.vcd) + vcd_offset as usize)?;
        mesh.descriptor = read_descriptor(reader)?;
        for slot in mesh.used_slots().collect::<Vec<_>>() {
            mesh.bind_buffer(slot, slot_buffer_name(slot));
        }

        let mut local = VertexUsage::new();
        match read_primitives(reader, section, &offsets, &mesh.descriptor, prim_count, first_data, first_header, &mut local) {
            Ok(prims) => {
                mesh.matrix_primitives = prims;
                for attribute in VertexAttribute::ALL {
                    if let Some(max) = local.max_index(attribute) {
                        usage.record(attribute, max);
                    }
                }
            }
            Err(e) if e.is_fatal_for_mesh() => {
                tx.error("SHP1", format!("shape `{}`: {e}", mesh.name));
            }
            Err(e) => return Err(e.with_context(format!("shape `{}`", mesh.name))),
        }
        debug!(mesh = %mesh.name, primitives = mesh.matrix_primitives.len(), "Read shape");
        meshes.push(mesh);
    }
    Ok(meshes)
}

#[allow(clippy::too_many_arguments)]
fn read_primitives(
    reader: &mut Reader<'_>,
    section: &SectionHeader,
    offsets: &Offsets,
    descriptor: &VertexDescriptor,
    count: usize,
    first_data: usize,
    first_header: usize,
    usage: &mut VertexUsage,
) -> ParseResult<Vec<MatrixPrimitive>> {
    let mut prims: Vec<MatrixPrimitive> = Vec::with_capacity(count);
    for p in 0..count {
        reader.seek(section.at(offsets.matrix_data) + (first_data + p) * 8)?;
        let current = reader.read_i16()?;
        let list_len = reader.read_u16()? as usize;
        let list_start = reader.read_u32()? as usize;

        let mut mp = MatrixPrimitive::new(current);
        reader.seek(section.at(offsets.matrix_list) + list_start * 2)?;
        for slot in 0..list_len {
            let mut value = reader.read_u16()?;
            if value == MATRIX_UNCHANGED {
                if let Some(previous) = prims.last().and_then(|prev| prev.draw_matrices.get(slot)) {
                    value = *previous;
                }
            }
            mp.draw_matrices.push(value);
        }

        reader.seek(section.at(offsets.headers) + (first_header + p) * 8)?;
        let dl_size = reader.read_u32()? as usize;
        let dl_offset = reader.read_u32()? as usize;
        let dl_start = section.at(offsets.dl) + dl_offset;
        if dl_start + dl_size > section.end() {
            return Err(ParseError::OutOfBounds {
                offset: dl_start,
                requested: dl_size,
                available: section.end().saturating_sub(dl_start),
            });
        }
        reader.seek(dl_start)?;
        decode_display_list(reader, dl_size, descriptor, &mut mp, Some(&mut *usage))?;
        prims.push(mp);
    }
    Ok(prims)
}

pub(crate) fn write(writer: &mut Writer, model: &Model) -> ParseResult<()> {
    let mut section = writer.open_section(b"SHP1");
    let base = section.start();

    let mut descriptors: Vec<VertexDescriptor> = Vec::new();
    let mut vcd_offsets = Vec::with_capacity(model.meshes.len());
    let mut vcd_size = 0;
    for mesh in &model.meshes {
        let offset = match descriptors.iter().position(|d| *d == mesh.descriptor) {
            Some(i) => descriptors[..i].iter().map(descriptor_size).sum(),
            None => {
                descriptors.push(mesh.descriptor);
                let at = vcd_size;
                vcd_size += descriptor_size(&mesh.descriptor);
                at
            }
        };
        vcd_offsets.push(u16::try_from(offset).map_err(|_| ParseError::invalid("descriptor table too large"))?);
    }

    section.write_u16(model.meshes.len() as u16);
    section.write_u16(0xFFFF);
    for label in [
        "SHP1.shapes",
        "SHP1.remap",
        "SHP1.names",
        "SHP1.vcd",
        "SHP1.matrix_list",
        "SHP1.dl",
        "SHP1.matrix_data",
        "SHP1.headers",
    ] {
        section.write_offset(base, label, LinkWidth::I32);
    }

    section.align(4);
    section.label("SHP1.shapes");
    let mut first = 0usize;
    for (mesh, vcd_offset) in model.meshes.iter().zip(&vcd_offsets) {
        let prims = mesh.matrix_primitives.len();
        section.write_u8(mesh.mode as u8);
        section.write_u8(0xFF);
        section.write_u16(prims as u16);
        section.write_u16(*vcd_offset);
        section.write_u16(first as u16);
        section.write_u16(first as u16);
        section.write_u16(0xFFFF);
        section.write_f32(mesh.bounding_radius);
        section.write_vec3(mesh.bounds.min.to_array());
        section.write_vec3(mesh.bounds.max.to_array());
        first += prims;
    }

    section.label("SHP1.remap");
    write_identity_remap(&mut section, model.meshes.len());
    section.align(4);
    section.label("SHP1.names");
    let names: Vec<&str> = model.meshes.iter().map(|m| m.name.as_str()).collect();
    write_j3d_names(&mut section, &names);

    section.align(32);
    section.label("SHP1.vcd");
    for descriptor in &descriptors {
        write_descriptor(&mut section, descriptor);
    }

    section.align(32);
    section.label("SHP1.matrix_list");
    for mp in model.meshes.iter().flat_map(|m| &m.matrix_primitives) {
        for &idx in &mp.draw_matrices {
            section.write_u16(idx);
        }
    }

    section.align(32);
    section.label("SHP1.dl");
    let dl_start = section.position();
    let mut headers = Vec::with_capacity(first);
    for mesh in &model.meshes {
        for mp in &mesh.matrix_primitives {
            let offset = section.position() - dl_start;
            let size = encode_display_list(&mut section, &mesh.descriptor, &mp.primitives)
                .map_err(|e| e.with_context(format!("shape `{}`", mesh.name)))?;
            headers.push((size as u32, offset as u32));
        }
    }

    section.label("SHP1.matrix_data");
    let mut list_start = 0u32;
    for mp in model.meshes.iter().flat_map(|m| &m.matrix_primitives) {
        section.write_i16(mp.current_matrix);
        section.write_u16(mp.draw_matrices.len() as u16);
        section.write_u32(list_start);
        list_start += mp.draw_matrices.len() as u32;
    }

    section.label("SHP1.headers");
    for (size, offset) in headers {
        section.write_u32(size);
        section.write_u32(offset);
    }
    section.align_with(32, PADDING);
    Ok(())
}
