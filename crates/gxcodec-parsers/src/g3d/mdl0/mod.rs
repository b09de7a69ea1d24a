//! MDL0 sub-files (revision 11)
//!
//! ```text
//! 0x00 common sub-file header
//! 0x10 14 x s32 section dictionary offsets
//!      bytecode, bones, positions, normals, colors, texcoords, fur vectors,
//!      fur layers, materials, TEV, shapes, texture links, palette links,
//!      user data
//! 0x48 s32 name offset
//! 0x4C model info block (0x40), then the matrix-to-bone table
//! ```
//!
//! Section dictionaries follow, then bytecode, bone, material, shape and
//! buffer records. Every record starts with its size and a signed offset
//! back to the MDL0 header.

mod bones;
mod buffers;
mod bytecode;
mod materials;
mod shapes;

use super::{open_subfile, read_subfile, Dictionary};
use crate::binary::{Anchor, LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::model::{BufferKind, DrawMatrix, Model, ScalingRule};
use crate::names::{read_name, NameTable};
use crate::traits::{ParseError, ParseResult};

pub const MDL0_MAGIC: [u8; 4] = *b"MDL0";
pub const REVISION: u32 = 11;
const SECTION_COUNT: usize = 14;
const INFO_SIZE: u32 = 0x40;

/// Section dictionaries this codec reads and writes, by header slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Bytecode = 0,
    Bones = 1,
    Positions = 2,
    Normals = 3,
    Colors = 4,
    TexCoords = 5,
    Materials = 8,
    Shapes = 10,
}

impl Section {
    const ALL: [Section; 8] = [
        Section::Bytecode,
        Section::Bones,
        Section::Positions,
        Section::Normals,
        Section::Colors,
        Section::TexCoords,
        Section::Materials,
        Section::Shapes,
    ];

    fn label(self) -> &'static str {
        match self {
            Section::Bytecode => "MDL0.bytecode",
            Section::Bones => "MDL0.bones",
            Section::Positions => "MDL0.positions",
            Section::Normals => "MDL0.normals",
            Section::Colors => "MDL0.colors",
            Section::TexCoords => "MDL0.texcoords",
            Section::Materials => "MDL0.materials",
            Section::Shapes => "MDL0.shapes",
        }
    }

    /// Label of the record behind dictionary entry `i`
    pub(crate) fn entry_label(self, i: usize) -> String {
        format!("{}.{i}", self.label())
    }

    fn buffer_kind(self) -> Option<BufferKind> {
        match self {
            Section::Positions => Some(BufferKind::Position),
            Section::Normals => Some(BufferKind::Normal),
            Section::Colors => Some(BufferKind::Color),
            Section::TexCoords => Some(BufferKind::TexCoord),
            _ => None,
        }
    }

    pub(crate) fn for_kind(kind: BufferKind) -> Self {
        match kind {
            BufferKind::Position => Section::Positions,
            BufferKind::Normal => Section::Normals,
            BufferKind::Color => Section::Colors,
            BufferKind::TexCoord => Section::TexCoords,
        }
    }
}

pub(crate) fn kind_index(kind: BufferKind) -> usize {
    match kind {
        BufferKind::Position => 0,
        BufferKind::Normal => 1,
        BufferKind::Color => 2,
        BufferKind::TexCoord => 3,
    }
}

/// Id of the buffer named `name`: its position among buffers of its kind
pub(crate) fn buffer_id(model: &Model, name: &str) -> Option<usize> {
    let index = model.vertex_buffers.iter().position(|b| b.name == name)?;
    let kind = model.vertex_buffers[index].kind();
    Some(model.vertex_buffers[..index].iter().filter(|b| b.kind() == kind).count())
}

/// Write the `(size, offset to MDL0)` prefix every record starts with.
/// Variable-size records pass 0 and backfill through a region guard.
pub(crate) fn write_record_prefix(writer: &mut Writer, size: u32, mdl0: usize) {
    let start = writer.position();
    writer.write_u32(size);
    writer.write_link(Anchor::At(start), Anchor::At(mdl0), LinkWidth::I32);
}

/// Sort records by their stored id, reporting gaps
pub(crate) fn order_by_id<T>(mut items: Vec<(u32, T)>, domain: &str, tx: &mut Transaction) -> Vec<T> {
    items.sort_by_key(|(id, _)| *id);
    if items.iter().enumerate().any(|(i, (id, _))| *id as usize != i) {
        tx.warn(domain, "record ids are not contiguous");
    }
    items.into_iter().map(|(_, item)| item).collect()
}

fn read_part<T>(
    tx: &mut Transaction,
    domain: &str,
    f: impl FnOnce(&mut Transaction) -> ParseResult<T>,
) -> Option<T> {
    match f(tx) {
        Ok(value) => Some(value),
        Err(e) => {
            tx.fail(domain, &e);
            None
        }
    }
}

fn read_info(reader: &mut Reader<'_>, model: &mut Model, tx: &mut Transaction) -> ParseResult<()> {
    let info = reader.position();
    let _size = reader.read_u32()?;
    let _mdl0 = reader.read_i32()?;
    let scaling = reader.read_u32()?;
    model.info.scaling_rule = ScalingRule::from_u32(scaling).unwrap_or_else(|| {
        tx.warn("MDL0", format!("unknown scaling rule {scaling}"));
        ScalingRule::Basic
    });
    model.info.texture_matrix_mode = reader.read_u32()?;
    let _vertex_count = reader.read_u32()?;
    let _triangle_count = reader.read_u32()?;
    reader.skip(4)?;
    let matrix_count = reader.read_u32()? as usize;
    reader.skip(4)?;
    let table_offset = reader.read_i32()?;

    let table = reader.relative(info, table_offset.into())?;
    reader.seek(table)?;
    let count = reader.read_u32()? as usize;
    if count != matrix_count {
        tx.warn("MDL0", format!("info block counts {matrix_count} matrices, table holds {count}"));
    }
    model.draw_matrices.clear();
    for _ in 0..count {
        let bone = reader.read_i32()?;
        let matrix = match u16::try_from(bone) {
            Ok(bone) => DrawMatrix::rigid(bone),
            // Envelopes are filled in by the NodeMix stream.
            Err(_) => DrawMatrix::default(),
        };
        model.draw_matrices.push(matrix);
    }
    Ok(())
}

fn write_info(writer: &mut Writer, model: &Model, mdl0: usize) {
    let info = writer.position();
    let bounds = model.bounds();
    writer.write_u32(INFO_SIZE);
    writer.write_link(Anchor::At(info), Anchor::At(mdl0), LinkWidth::I32);
    writer.write_u32(model.info.scaling_rule as u32);
    writer.write_u32(model.info.texture_matrix_mode);
    writer.write_u32(model.vertex_count() as u32);
    writer.write_u32(model.triangle_count() as u32);
    writer.write_u32(0);
    writer.write_u32(model.draw_matrices.len() as u32);
    writer.write_u8(0);
    writer.write_u8(0);
    writer.write_u8(1);
    writer.write_u8(u8::from(model.draw_matrices.iter().any(DrawMatrix::is_envelope)));
    writer.write_offset(info, "MDL0.matrix_table", LinkWidth::I32);
    writer.write_vec3(bounds.min.to_array());
    writer.write_vec3(bounds.max.to_array());
    debug_assert_eq!(writer.position() - info, INFO_SIZE as usize);

    writer.label("MDL0.matrix_table");
    writer.write_u32(model.draw_matrices.len() as u32);
    for matrix in &model.draw_matrices {
        writer.write_i32(matrix.rigid_bone().map_or(-1, i32::from));
    }
}

pub(crate) fn read(reader: &mut Reader<'_>, at: usize, tx: &mut Transaction) -> ParseResult<Model> {
    let header = read_subfile(reader, at, &MDL0_MAGIC)?;
    if header.revision != REVISION {
        return Err(ParseError::UnsupportedVersion { version: header.revision });
    }
    let mut offsets = [0i32; SECTION_COUNT];
    for offset in &mut offsets {
        *offset = reader.read_i32()?;
    }
    let mut model = Model::new();
    model.info.name = read_name(reader, at)?;
    read_info(reader, &mut model, tx)?;

    let mut dicts: Vec<(Section, Dictionary)> = Vec::new();
    for section in Section::ALL {
        let offset = offsets[section as usize];
        if offset <= 0 {
            continue;
        }
        let dict = read_part(tx, section.label(), |_| {
            reader.seek(at + offset as usize)?;
            Dictionary::read(reader)
        });
        if let Some(dict) = dict {
            dicts.push((section, dict));
        }
    }
    let empty = Dictionary::new();
    let dict_for = |section: Section| {
        dicts
            .iter()
            .find(|(s, _)| *s == section)
            .map_or(&empty, |(_, d)| d)
    };

    // Buffer names by kind, indexed by id, for resolving shape bindings
    let mut buffer_names: [Vec<Option<String>>; 4] = Default::default();
    for section in Section::ALL {
        let Some(kind) = section.buffer_kind() else {
            continue;
        };
        let dict = dict_for(section);
        let mut found = Vec::new();
        for node in dict.entries() {
            let part = read_part(tx, section.label(), |_| {
                let (id, buffer) = buffers::read(reader, node.data, kind)?;
                if id as usize >= dict.len() {
                    return Err(ParseError::invalid(format!(
                        "buffer `{}` has id {id}, the section holds {}",
                        buffer.name,
                        dict.len()
                    )));
                }
                Ok((id, buffer))
            });
            if let Some(part) = part {
                found.push(part);
            }
        }
        let names = &mut buffer_names[kind_index(kind)];
        for (id, buffer) in &found {
            let id = *id as usize;
            if names.len() <= id {
                names.resize(id + 1, None);
            }
            names[id] = Some(buffer.name.clone());
        }
        model.vertex_buffers.extend(order_by_id(found, section.label(), tx));
    }

    model.bones = read_part(tx, Section::Bones.label(), |tx| bones::read(reader, dict_for(Section::Bones), tx))
        .unwrap_or_default();
    model.rebuild_children();

    model.materials = read_part(tx, Section::Materials.label(), |tx| {
        materials::read(reader, dict_for(Section::Materials), tx)
    })
    .unwrap_or_default();

    model.meshes = read_part(tx, Section::Shapes.label(), |tx| {
        shapes::read(reader, dict_for(Section::Shapes), &buffer_names, tx)
    })
    .unwrap_or_default();

    let code = dict_for(Section::Bytecode);
    read_part(tx, Section::Bytecode.label(), |tx| bytecode::read(reader, code, &mut model, tx));

    Ok(model)
}

pub(crate) fn write(writer: &mut Writer, model: &Model, name: &str, names: &mut NameTable) -> ParseResult<()> {
    let streams = bytecode::stream_names(model);
    let by_kind = |kind: BufferKind| model.vertex_buffers.iter().filter(move |b| b.kind() == kind);

    let mut dicts: Vec<(Section, Dictionary)> = Vec::new();
    for section in Section::ALL {
        let dict = match section {
            Section::Bytecode => Dictionary::build(&streams)?,
            Section::Bones => Dictionary::build(model.bones.iter().map(|b| b.name.as_str()))?,
            Section::Materials => Dictionary::build(model.materials.iter().map(|m| m.name.as_str()))?,
            Section::Shapes => Dictionary::build(model.meshes.iter().map(|m| m.name.as_str()))?,
            other => match other.buffer_kind() {
                Some(kind) => Dictionary::build(by_kind(kind).map(|b| b.name.as_str()))?,
                None => continue,
            },
        };
        if !dict.is_empty() {
            dicts.push((section, dict));
        }
    }

    let mut sub = open_subfile(writer, &MDL0_MAGIC, REVISION);
    let base = sub.start();
    for slot in 0..SECTION_COUNT {
        match dicts.iter().find(|(s, _)| *s as usize == slot) {
            Some((section, _)) => sub.write_offset(base, section.label(), LinkWidth::I32),
            None => sub.write_i32(0),
        }
    }
    names.reference(&mut sub, name, base);
    write_info(&mut sub, model, base);

    for (section, dict) in &dicts {
        sub.align(4);
        sub.label(section.label());
        let section = *section;
        dict.write(&mut sub, names, |i| section.entry_label(i));
    }

    bytecode::write(&mut sub, model, &streams);
    bones::write(&mut sub, model, base, names);
    materials::write(&mut sub, model, base, names)?;
    shapes::write(&mut sub, model, base, names)?;
    buffers::write(&mut sub, model, base, names)?;
    sub.align(32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;
    use crate::model::{VertexArray, VertexBuffer, VertexFormat};

    fn buffer(name: &str, data: VertexArray) -> VertexBuffer {
        VertexBuffer::new(name, VertexFormat::float(1), data)
    }

    #[test]
    fn test_buffer_ids_count_per_kind() {
        let mut model = Model::new();
        model.vertex_buffers = vec![
            buffer("p0", VertexArray::Positions(vec![])),
            buffer("uv0", VertexArray::TexCoords(vec![])),
            buffer("p1", VertexArray::Positions(vec![])),
        ];
        assert_eq!(buffer_id(&model, "p0"), Some(0));
        assert_eq!(buffer_id(&model, "uv0"), Some(0));
        assert_eq!(buffer_id(&model, "p1"), Some(1));
        assert_eq!(buffer_id(&model, "nope"), None);
    }

    #[test]
    fn test_order_by_id_reports_gaps() {
        let mut tx = Transaction::new("ids");
        let ordered = order_by_id(vec![(2, 'c'), (0, 'a')], "MDL0.test", &mut tx);
        assert_eq!(ordered, vec!['a', 'c']);
        assert_eq!(tx.in_domain("MDL0.test").count(), 1);
    }

    #[test]
    fn test_section_slots() {
        assert_eq!(Section::Materials as usize, 8);
        assert_eq!(Section::Shapes as usize, 10);
        assert_eq!(Section::for_kind(BufferKind::Color), Section::Colors);
    }

    #[test]
    fn test_out_of_range_buffer_id_drops_buffer() {
        let mut model = Model::new();
        model.vertex_buffers.push(buffer("pos", VertexArray::Positions(vec![[0.0, 1.0, 2.0]])));

        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        write(&mut writer, &model, "ids", &mut names).unwrap();
        let record = writer.label_position(&Section::Positions.entry_label(0)).unwrap();
        names.commit(&mut writer);
        let mut bytes = writer.finish().unwrap();
        assert_eq!(bytes[record + 0x10..record + 0x14], [0, 0, 0, 0]);
        bytes[record + 0x10..record + 0x14].copy_from_slice(&u32::MAX.to_be_bytes());

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("ids");
        let read_back = read(&mut reader, 0, &mut tx).unwrap();
        assert!(tx.in_domain(Section::Positions.label()).count() >= 1);
        assert!(tx.has_errors());
        assert!(read_back.vertex_buffers.is_empty());
    }
}
