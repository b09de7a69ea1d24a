//! JNT1: joints

use gxcodec_core::{BoundingBox, Vec3};
use tracing::trace;

use super::{read_remap, write_identity_remap, SectionHeader, PADDING};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::model::{Billboard, Bone, Model};
use crate::names::{read_j3d_names, write_j3d_names};
use crate::traits::{ParseError, ParseResult};

const JOINT_SIZE: usize = 0x40;

/// Rotation angles are stored as signed 16-bit fractions of a half turn
pub fn angle_from_s16(value: i16) -> f32 {
    (f64::from(value) * 180.0 / 32767.0) as f32
}

pub fn angle_to_s16(degrees: f32) -> i16 {
    (f64::from(degrees) * 32767.0 / 180.0)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

fn billboard_from_j3d(value: u16) -> Billboard {
    match value {
        1 => Billboard::Standard,
        2 => Billboard::Y,
        _ => Billboard::None,
    }
}

fn billboard_to_j3d(billboard: Billboard) -> u16 {
    match billboard {
        Billboard::None => 0,
        Billboard::Y | Billboard::YPerspective => 2,
        _ => 1,
    }
}

fn read_joint(reader: &mut Reader<'_>, name: String) -> ParseResult<Bone> {
    let mut bone = Bone::new(name);
    let flags = reader.read_u16()?;
    bone.billboard = billboard_from_j3d((flags >> 4) & 0xF);
    bone.segment_scale_compensate = reader.read_u8()? == 1;
    reader.skip(1)?;
    bone.scale = Vec3::from(reader.read_vec3()?);
    let rx = reader.read_i16()?;
    let ry = reader.read_i16()?;
    let rz = reader.read_i16()?;
    bone.rotation = Vec3::new(angle_from_s16(rx), angle_from_s16(ry), angle_from_s16(rz));
    reader.skip(2)?;
    bone.translation = Vec3::from(reader.read_vec3()?);
    bone.bounding_radius = reader.read_f32()?;
    let min = Vec3::from(reader.read_vec3()?);
    let max = Vec3::from(reader.read_vec3()?);
    bone.bounds = BoundingBox::new(min, max);
    Ok(bone)
}

fn write_joint(writer: &mut Writer, bone: &Bone) {
    writer.write_u16(billboard_to_j3d(bone.billboard) << 4);
    writer.write_u8(u8::from(bone.segment_scale_compensate));
    writer.write_u8(0xFF);
    writer.write_vec3(bone.scale.to_array());
    writer.write_i16(angle_to_s16(bone.rotation.x));
    writer.write_i16(angle_to_s16(bone.rotation.y));
    writer.write_i16(angle_to_s16(bone.rotation.z));
    writer.write_u16(0xFFFF);
    writer.write_vec3(bone.translation.to_array());
    writer.write_f32(bone.bounding_radius);
    writer.write_vec3(bone.bounds.min.to_array());
    writer.write_vec3(bone.bounds.max.to_array());
}

pub(crate) fn read(reader: &mut Reader<'_>, section: &SectionHeader, tx: &mut Transaction) -> ParseResult<Vec<Bone>> {
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;
    let data_offset = reader.read_u32()?;
    let remap_offset = reader.read_u32()?;
    let names_offset = reader.read_u32()?;

    reader.seek(section.at(remap_offset))?;
    let (remap, identity) = read_remap(reader, count)?;
    if !identity {
        tx.warn("JNT1", "joint compression: several joints share one entry");
    }

    let names = if names_offset != 0 {
        reader.seek(section.at(names_offset))?;
        read_j3d_names(reader, tx)?
    } else {
        Vec::new()
    };
    if names.len() != count {
        tx.warn("JNT1", format!("{} names for {count} joints", names.len()));
    }

    let mut bones = Vec::with_capacity(count);
    for (i, &entry) in remap.iter().enumerate() {
        let name = names.get(i).cloned().unwrap_or_else(|| format!("joint{i}"));
        let at = section.at(data_offset) + entry as usize * JOINT_SIZE;
        if at + JOINT_SIZE > section.end() {
            return Err(ParseError::invalid(format!("joint {i} entry {entry} lies past the section")));
        }
        reader.seek(at)?;
        let bone = read_joint(reader, name)?;
        trace!(bone = %bone.name, "Read joint");
        bones.push(bone);
    }
    Ok(bones)
}

pub(crate) fn write(writer: &mut Writer, model: &Model) -> ParseResult<()> {
    let mut section = writer.open_section(b"JNT1");
    let base = section.start();

    section.write_u16(model.bones.len() as u16);
    section.write_u16(0xFFFF);
    section.write_offset(base, "JNT1.data", LinkWidth::I32);
    section.write_offset(base, "JNT1.remap", LinkWidth::I32);
    section.write_offset(base, "JNT1.names", LinkWidth::I32);

    section.align(4);
    section.label("JNT1.data");
    for bone in &model.bones {
        write_joint(&mut section, bone);
    }
    section.label("JNT1.remap");
    write_identity_remap(&mut section, model.bones.len());
    section.align(4);
    section.label("JNT1.names");
    let names: Vec<&str> = model.bones.iter().map(|b| b.name.as_str()).collect();
    write_j3d_names(&mut section, &names);
    section.align_with(32, PADDING);
    Ok(())
}
