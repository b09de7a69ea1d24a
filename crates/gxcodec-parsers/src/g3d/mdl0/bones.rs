//! Bone records (0xD0 bytes each)
//!
//! Hierarchy links point at sibling records: parent, first child, next and
//! previous sibling. Root bones are siblings of each other.

use gxcodec_core::{BoundingBox, Mat34, Vec3};

use super::{order_by_id, write_record_prefix, Dictionary, Section};
use crate::binary::{Anchor, LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::model::{Billboard, Bone, Model};
use crate::names::{read_name, NameTable};
use crate::traits::ParseResult;

const RECORD_SIZE: u32 = 0xD0;

const FLAG_IDENTITY: u32 = 0x1;
const FLAG_SCALE_COMPENSATE: u32 = 0x20;
const FLAG_HIDDEN: u32 = 0x80;
const FLAG_HAS_GEOMETRY: u32 = 0x100;

/// Offset of the stored id inside a record
const ID_OFFSET: usize = 0x0C;

fn read_matrix(reader: &mut Reader<'_>) -> ParseResult<Mat34> {
    let mut m = [0f32; 12];
    for v in &mut m {
        *v = reader.read_f32()?;
    }
    Ok(Mat34::from_flat(m))
}

fn write_matrix(writer: &mut Writer, matrix: &Mat34) {
    for v in matrix.m {
        writer.write_f32(v);
    }
}

fn flags(bone: &Bone) -> u32 {
    let mut flags = 0;
    if bone.has_identity_transform() {
        flags |= FLAG_IDENTITY;
    }
    if bone.segment_scale_compensate {
        flags |= FLAG_SCALE_COMPENSATE;
    }
    if !bone.visible {
        flags |= FLAG_HIDDEN;
    }
    if !bone.displays.is_empty() {
        flags |= FLAG_HAS_GEOMETRY;
    }
    flags
}

/// Id of the record a hierarchy link points at, if any
fn read_link_id(reader: &mut Reader<'_>, record: usize) -> ParseResult<Option<u32>> {
    let offset = reader.read_i32()?;
    if offset == 0 {
        return Ok(None);
    }
    let target = reader.relative(record, offset.into())?;
    let mut guard = reader.scoped_seek(target + ID_OFFSET)?;
    Ok(Some(guard.read_u32()?))
}

fn read_bone(reader: &mut Reader<'_>, record: usize, tx: &mut Transaction) -> ParseResult<(u32, Bone)> {
    reader.seek(record)?;
    let _size = reader.read_u32()?;
    let _mdl0 = reader.read_i32()?;
    let mut bone = Bone::new(read_name(reader, record)?);
    let id = reader.read_u32()?;
    bone.matrix_id = reader.read_u32()?;
    let flags = reader.read_u32()?;
    bone.segment_scale_compensate = flags & FLAG_SCALE_COMPENSATE != 0;
    bone.visible = flags & FLAG_HIDDEN == 0;
    let billboard = reader.read_u32()?;
    bone.billboard = Billboard::from_u32(billboard).unwrap_or_else(|| {
        tx.warn("MDL0.bones", format!("bone `{}` has unknown billboard mode {billboard}", bone.name));
        Billboard::None
    });
    let _billboard_parent = reader.read_u32()?;
    bone.scale = Vec3::from(reader.read_vec3()?);
    bone.rotation = Vec3::from(reader.read_vec3()?);
    bone.translation = Vec3::from(reader.read_vec3()?);
    let min = Vec3::from(reader.read_vec3()?);
    let max = Vec3::from(reader.read_vec3()?);
    bone.bounds = BoundingBox::new(min, max);
    bone.bounding_radius = bone.bounds.radius();

    bone.parent = read_link_id(reader, record)?.map(|id| id as usize);
    // child and sibling links are rebuilt from the parents
    reader.skip(12)?;
    let _user_data = reader.read_u32()?;
    bone.model_matrix = read_matrix(reader)?;
    bone.inverse_model_matrix = read_matrix(reader)?;
    Ok((id, bone))
}

pub(crate) fn read(reader: &mut Reader<'_>, dict: &Dictionary, tx: &mut Transaction) -> ParseResult<Vec<Bone>> {
    let mut bones = Vec::with_capacity(dict.len());
    for node in dict.entries() {
        let entry = read_bone(reader, node.data, tx).map_err(|e| e.with_context(format!("bone `{}`", node.name)))?;
        bones.push(entry);
    }
    let bones = order_by_id(bones, "MDL0.bones", tx);
    for bone in &bones {
        if bone.parent.is_some_and(|p| p >= bones.len()) {
            tx.warn("MDL0.bones", format!("bone `{}` has a parent outside the table", bone.name));
        }
    }
    Ok(bones)
}

fn write_bone_link(writer: &mut Writer, record: usize, target: Option<usize>) {
    match target {
        Some(j) => writer.write_link(
            Anchor::At(record),
            Anchor::Label(Section::Bones.entry_label(j)),
            LinkWidth::I32,
        ),
        None => writer.write_i32(0),
    }
}

pub(crate) fn write(writer: &mut Writer, model: &Model, mdl0: usize, names: &mut NameTable) {
    let roots = model.root_bones();
    writer.align(4);
    for (i, bone) in model.bones.iter().enumerate() {
        let record = writer.position();
        writer.label(Section::Bones.entry_label(i));
        write_record_prefix(writer, RECORD_SIZE, mdl0);
        names.reference(writer, &bone.name, record);
        writer.write_u32(i as u32);
        writer.write_u32(bone.matrix_id);
        writer.write_u32(flags(bone));
        writer.write_u32(bone.billboard as u32);
        writer.write_u32(0);
        writer.write_vec3(bone.scale.to_array());
        writer.write_vec3(bone.rotation.to_array());
        writer.write_vec3(bone.translation.to_array());
        writer.write_vec3(bone.bounds.min.to_array());
        writer.write_vec3(bone.bounds.max.to_array());

        let siblings = match bone.parent.and_then(|p| model.bones.get(p)) {
            Some(parent) => parent.children.as_slice(),
            None => roots.as_slice(),
        };
        let at = siblings.iter().position(|&s| s == i);
        let parent = bone.parent.filter(|&p| p < model.bones.len());
        write_bone_link(writer, record, parent);
        write_bone_link(writer, record, bone.children.first().copied());
        write_bone_link(writer, record, at.and_then(|k| siblings.get(k + 1)).copied());
        write_bone_link(writer, record, at.and_then(|k| k.checked_sub(1)).map(|k| siblings[k]));
        writer.write_u32(0);
        write_matrix(writer, &bone.model_matrix);
        write_matrix(writer, &bone.inverse_model_matrix);
        debug_assert_eq!(writer.position() - record, RECORD_SIZE as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    #[test]
    fn test_flags() {
        let mut bone = Bone::new("b");
        assert_eq!(flags(&bone), FLAG_IDENTITY);
        bone.visible = false;
        bone.translation = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(flags(&bone), FLAG_HIDDEN);
    }

    #[test]
    fn test_records_keep_hierarchy() {
        let mut model = Model::new();
        model.add_bone(Bone::new("root"));
        for name in ["left", "right"] {
            let mut bone = Bone::new(name);
            bone.parent = Some(0);
            bone.rotation = Vec3::new(0.0, 90.0, 0.0);
            model.add_bone(bone);
        }
        model.bones[2].billboard = Billboard::Y;

        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        write(&mut writer, &model, 0, &mut names);
        let mut dict = Dictionary::new();
        for (i, bone) in model.bones.iter().enumerate() {
            let at = writer.label_position(&Section::Bones.entry_label(i)).unwrap();
            dict.insert(&bone.name, at).unwrap();
        }
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len() % 4, 0);

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("bones");
        let bones = read(&mut reader, &dict, &mut tx).unwrap();
        assert!(tx.is_complete(), "{:?}", tx.diagnostics());
        assert_eq!(bones.len(), 3);
        assert_eq!(bones[1].name, "left");
        assert_eq!(bones[1].parent, Some(0));
        assert_eq!(bones[2].parent, Some(0));
        assert_eq!(bones[2].billboard, Billboard::Y);
        assert_eq!(bones[2].rotation, Vec3::new(0.0, 90.0, 0.0));
        assert_eq!(bones[0].parent, None);
    }
}
