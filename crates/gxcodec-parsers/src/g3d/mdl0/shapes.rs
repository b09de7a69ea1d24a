//! Shape records
//!
//! ```text
//! 0x00 u32 size            0x14 f32 radius
//! 0x04 s32 MDL0            0x18 bbox
//! 0x08 s32 name            0x30 12 x s16 buffer ids, -1 when unbound
//! 0x0C u32 id              0x48 u32 n, n x (u32 attribute, u32 type)
//! 0x10 u8 mode, u8 visible, u16 #primitives
//!      primitives: s16 current matrix, u16 n, u32 DL size, s32 DL offset,
//!                  n x u16 draw matrices, padded to 4
//!      display lists, 32-byte aligned
//! ```

use gxcodec_core::{BoundingBox, Vec3};
use tracing::debug;

use super::{buffer_id, kind_index, order_by_id, write_record_prefix, Dictionary, Section};
use crate::binary::{Anchor, LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::{
    decode_display_list, encode_display_list, BufferSlot, MatrixPrimitive, VertexAttribute, VertexAttributeType,
    VertexDescriptor,
};
use crate::model::{BufferKind, Mesh, Model, ShapeMode};
use crate::names::{read_name, NameTable};
use crate::traits::{ParseError, ParseResult};

fn read_descriptor(reader: &mut Reader<'_>) -> ParseResult<VertexDescriptor> {
    let count = reader.read_u32()?;
    if count as usize > VertexAttribute::COUNT {
        return Err(ParseError::invalid(format!("{count} vertex attributes")));
    }
    let mut descriptor = VertexDescriptor::new();
    for _ in 0..count {
        let attr = reader.read_u32()?;
        let ty = reader.read_u32()?;
        let attribute = VertexAttribute::from_u32(attr)
            .ok_or_else(|| ParseError::invalid(format!("unknown vertex attribute {attr}")))?;
        let ty = VertexAttributeType::from_u32(ty)
            .ok_or_else(|| ParseError::invalid(format!("unknown storage type {ty} for {attribute}")))?;
        descriptor.set(attribute, ty);
    }
    Ok(descriptor)
}

fn read_primitives(reader: &mut Reader<'_>, record: usize, mesh: &Mesh, count: usize) -> ParseResult<Vec<MatrixPrimitive>> {
    let mut prims = Vec::with_capacity(count);
    for _ in 0..count {
        let mut mp = MatrixPrimitive::new(reader.read_i16()?);
        let list_len = reader.read_u16()?;
        let dl_size = reader.read_u32()? as usize;
        let dl_offset = reader.read_i32()?;
        for _ in 0..list_len {
            mp.draw_matrices.push(reader.read_u16()?);
        }
        if list_len % 2 == 1 {
            reader.skip(2)?;
        }
        let resume = reader.position();
        let dl = reader.relative(record, dl_offset.into())?;
        reader.seek(dl)?;
        decode_display_list(reader, dl_size, &mesh.descriptor, &mut mp, None)?;
        reader.seek(resume)?;
        prims.push(mp);
    }
    Ok(prims)
}

fn read_shape(
    reader: &mut Reader<'_>,
    record: usize,
    buffers: &[Vec<Option<String>>; 4],
    tx: &mut Transaction,
) -> ParseResult<(u32, Mesh)> {
    reader.seek(record)?;
    let _size = reader.read_u32()?;
    let _mdl0 = reader.read_i32()?;
    let mut mesh = Mesh::new(read_name(reader, record)?);
    let id = reader.read_u32()?;
    mesh.mode = ShapeMode::from_u8(reader.read_u8()?);
    mesh.visible = reader.read_u8()? != 0;
    let prim_count = usize::from(reader.read_u16()?);
    mesh.bounding_radius = reader.read_f32()?;
    let min = Vec3::from(reader.read_vec3()?);
    let max = Vec3::from(reader.read_vec3()?);
    mesh.bounds = BoundingBox::new(min, max);

    for index in 0..BufferSlot::COUNT {
        let id = reader.read_i16()?;
        let (Some(slot), Ok(id)) = (BufferSlot::from_index(index), usize::try_from(id)) else {
            continue;
        };
        match buffers[kind_index(BufferKind::for_slot(slot))].get(id).cloned().flatten() {
            Some(name) => mesh.bind_buffer(slot, name),
            None => tx.warn("MDL0.shapes", format!("shape `{}` binds unknown buffer {id} to {slot:?}", mesh.name)),
        }
    }
    mesh.descriptor = read_descriptor(reader)?;

    match read_primitives(reader, record, &mesh, prim_count) {
        Ok(prims) => mesh.matrix_primitives = prims,
        Err(e) if e.is_fatal_for_mesh() => {
            tx.error("MDL0.shapes", format!("shape `{}`: {e}", mesh.name));
        }
        Err(e) => return Err(e),
    }
    debug!(mesh = %mesh.name, primitives = mesh.matrix_primitives.len(), "Read shape");
    Ok((id, mesh))
}

pub(crate) fn read(
    reader: &mut Reader<'_>,
    dict: &Dictionary,
    buffers: &[Vec<Option<String>>; 4],
    tx: &mut Transaction,
) -> ParseResult<Vec<Mesh>> {
    let mut meshes = Vec::with_capacity(dict.len());
    for node in dict.entries() {
        let entry =
            read_shape(reader, node.data, buffers, tx).map_err(|e| e.with_context(format!("shape `{}`", node.name)))?;
        meshes.push(entry);
    }
    Ok(order_by_id(meshes, "MDL0.shapes", tx))
}

fn buffer_ids(model: &Model, mesh: &Mesh) -> ParseResult<[i16; BufferSlot::COUNT]> {
    let mut ids = [-1i16; BufferSlot::COUNT];
    for (slot, id) in ids.iter_mut().enumerate() {
        let Some(name) = mesh.buffers[slot].as_deref() else {
            continue;
        };
        let found = buffer_id(model, name)
            .ok_or_else(|| ParseError::invalid(format!("mesh `{}` binds missing buffer `{name}`", mesh.name)))?;
        *id = i16::try_from(found).map_err(|_| ParseError::invalid(format!("buffer id {found} is out of range")))?;
    }
    if let Some(slot) = mesh.used_slots().find(|s| ids[s.index()] < 0) {
        return Err(ParseError::invalid(format!("mesh `{}` has nothing bound to {slot:?}", mesh.name)));
    }
    Ok(ids)
}

fn write_shape(writer: &mut Writer, model: &Model, index: usize, mdl0: usize, names: &mut NameTable) -> ParseResult<()> {
    let mesh = &model.meshes[index];
    let entry = Section::Shapes.entry_label(index);
    let ids = buffer_ids(model, mesh)?;
    let prim_count = u16::try_from(mesh.matrix_primitives.len())
        .map_err(|_| ParseError::invalid(format!("mesh `{}` has too many primitives", mesh.name)))?;

    writer.align(32);
    writer.label(&entry);
    let mut record = writer.open_region(0);
    let base = record.start();
    write_record_prefix(&mut record, 0, mdl0);
    names.reference(&mut record, &mesh.name, base);
    record.write_u32(index as u32);
    record.write_u8(mesh.mode as u8);
    record.write_u8(u8::from(mesh.visible));
    record.write_u16(prim_count);
    record.write_f32(mesh.bounding_radius);
    record.write_vec3(mesh.bounds.min.to_array());
    record.write_vec3(mesh.bounds.max.to_array());
    for id in ids {
        record.write_i16(id);
    }
    record.write_u32(mesh.descriptor.present().count() as u32);
    for (attribute, ty) in mesh.descriptor.present() {
        record.write_u32(attribute as u32);
        record.write_u32(ty as u32);
    }

    for (j, mp) in mesh.matrix_primitives.iter().enumerate() {
        let dl = format!("{entry}.dl{j}");
        let list_len = u16::try_from(mp.draw_matrices.len())
            .map_err(|_| ParseError::invalid(format!("mesh `{}` has an oversized matrix list", mesh.name)))?;
        record.write_i16(mp.current_matrix);
        record.write_u16(list_len);
        record.write_link(Anchor::label(dl.clone()), Anchor::label(format!("{dl}.end")), LinkWidth::U32);
        record.write_offset(base, dl, LinkWidth::I32);
        for &matrix in &mp.draw_matrices {
            record.write_u16(matrix);
        }
        record.align(4);
    }

    for (j, mp) in mesh.matrix_primitives.iter().enumerate() {
        record.align(32);
        record.label(format!("{entry}.dl{j}"));
        encode_display_list(&mut record, &mesh.descriptor, &mp.primitives)
            .map_err(|e| e.with_context(format!("mesh `{}`", mesh.name)))?;
        record.label(format!("{entry}.dl{j}.end"));
    }
    Ok(())
}

pub(crate) fn write(writer: &mut Writer, model: &Model, mdl0: usize, names: &mut NameTable) -> ParseResult<()> {
    for index in 0..model.meshes.len() {
        write_shape(writer, model, index, mdl0, names)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;
    use crate::gx::{IndexedPrimitive, IndexedVertex, PrimitiveType};
    use crate::model::{VertexArray, VertexBuffer, VertexFormat};

    fn model() -> Model {
        let mut model = Model::new();
        model.vertex_buffers.push(VertexBuffer::new(
            "pos",
            VertexFormat::float(1),
            VertexArray::Positions(vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
        ));
        let mut mesh = Mesh::new("tri");
        mesh.descriptor = VertexDescriptor::new()
            .with(VertexAttribute::PositionNormalMatrixIndex, VertexAttributeType::Direct)
            .with(VertexAttribute::Position, VertexAttributeType::Short);
        mesh.bind_buffer(BufferSlot::Position, "pos");
        let mut mp = MatrixPrimitive::new(-1);
        mp.draw_matrices.push(0);
        let mut prim = IndexedPrimitive::new(PrimitiveType::Triangles);
        for i in 0..3 {
            prim.vertices.push(IndexedVertex::new().with(VertexAttribute::Position, i));
        }
        mp.primitives.push(prim);
        mesh.matrix_primitives.push(mp);
        model.meshes.push(mesh);
        model
    }

    /// Encoded shapes, their dictionary and the first display list position
    fn encode(model: &Model) -> (Vec<u8>, Dictionary, usize) {
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        write(&mut writer, model, 0, &mut names).unwrap();
        let mut dict = Dictionary::new();
        dict.insert("tri", writer.label_position("MDL0.shapes.0").unwrap()).unwrap();
        let dl = writer.label_position("MDL0.shapes.0.dl0").unwrap();
        names.commit(&mut writer);
        (writer.finish().unwrap(), dict, dl)
    }

    #[test]
    fn test_shape_roundtrip() {
        let source = model();
        let (bytes, dict, _) = encode(&source);
        let buffers: [Vec<Option<String>>; 4] = [vec![Some("pos".into())], vec![], vec![], vec![]];

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("shapes");
        let meshes = read(&mut reader, &dict, &buffers, &mut tx).unwrap();
        assert!(tx.is_complete(), "{:?}", tx.diagnostics());
        assert_eq!(meshes, source.meshes);
    }

    #[test]
    fn test_corrupt_display_list_empties_only_that_mesh() {
        let source = model();
        let (mut bytes, dict, dl) = encode(&source);
        assert_eq!(dl % 32, 0);
        assert_eq!(bytes[dl], PrimitiveType::Triangles.tag());
        bytes[dl] = 0x7F;

        let buffers: [Vec<Option<String>>; 4] = [vec![Some("pos".into())], vec![], vec![], vec![]];
        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("shapes");
        let meshes = read(&mut reader, &dict, &buffers, &mut tx).unwrap();
        assert!(tx.has_errors());
        assert_eq!(meshes.len(), 1);
        assert!(meshes[0].matrix_primitives.is_empty());
    }

    #[test]
    fn test_unbound_used_slot_is_rejected() {
        let mut source = model();
        source.meshes[0].buffers = Default::default();
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        assert!(write(&mut writer, &source, 0, &mut names).is_err());
    }
}
