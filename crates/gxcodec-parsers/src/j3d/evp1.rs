//! EVP1 (weighted envelopes) and DRW1 (draw matrix table)

use gxcodec_core::Mat34;

use super::{SectionHeader, PADDING};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::model::{DrawMatrix, Influence, Model};
use crate::traits::ParseResult;

const DRW_RIGID: u8 = 0;
const DRW_WEIGHTED: u8 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelopes {
    pub weighted: Vec<DrawMatrix>,
    /// Indexed by bone
    pub inverse_binds: Vec<Mat34>,
}

fn read_mat34(reader: &mut Reader<'_>) -> ParseResult<Mat34> {
    let mut m = [0f32; 12];
    for v in &mut m {
        *v = reader.read_f32()?;
    }
    Ok(Mat34::from_flat(m))
}

fn write_mat34(writer: &mut Writer, matrix: &Mat34) {
    for &v in &matrix.m {
        writer.write_f32(v);
    }
}

pub(crate) fn read_envelopes(
    reader: &mut Reader<'_>,
    section: &SectionHeader,
    _tx: &mut Transaction,
) -> ParseResult<Envelopes> {
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;
    let counts_offset = reader.read_u32()?;
    let indices_offset = reader.read_u32()?;
    let weights_offset = reader.read_u32()?;
    let matrices_offset = reader.read_u32()?;
    if count == 0 {
        return Ok(Envelopes::default());
    }

    reader.seek(section.at(counts_offset))?;
    let mut counts = Vec::with_capacity(count);
    for _ in 0..count {
        counts.push(reader.read_u8()? as usize);
    }
    let total: usize = counts.iter().sum();

    reader.seek(section.at(indices_offset))?;
    let mut bones = Vec::with_capacity(total);
    for _ in 0..total {
        bones.push(reader.read_u16()?);
    }

    reader.seek(section.at(weights_offset))?;
    let mut weights = Vec::with_capacity(total);
    for _ in 0..total {
        weights.push(reader.read_f32()?);
    }

    let mut weighted = Vec::with_capacity(count);
    let mut cursor = 0;
    for n in counts {
        let influences = (cursor..cursor + n)
            .map(|i| Influence { bone: bones[i], weight: weights[i] })
            .collect();
        weighted.push(DrawMatrix { influences });
        cursor += n;
    }

    let matrix_count = bones.iter().max().map_or(0, |&m| m as usize + 1);
    let mut inverse_binds = Vec::with_capacity(matrix_count);
    if matrices_offset != 0 {
        reader.seek(section.at(matrices_offset))?;
        for _ in 0..matrix_count {
            inverse_binds.push(read_mat34(reader)?);
        }
    }

    Ok(Envelopes { weighted, inverse_binds })
}

pub(crate) fn read_draw_matrices(
    reader: &mut Reader<'_>,
    section: &SectionHeader,
    envelopes: &Envelopes,
    tx: &mut Transaction,
) -> ParseResult<Vec<DrawMatrix>> {
    let count = reader.read_u16()? as usize;
    reader.skip(2)?;
    let flags_offset = reader.read_u32()?;
    let data_offset = reader.read_u32()?;

    reader.seek(section.at(flags_offset))?;
    let mut flags = Vec::with_capacity(count);
    for _ in 0..count {
        flags.push(reader.read_u8()?);
    }

    reader.seek(section.at(data_offset))?;
    let mut matrices = Vec::with_capacity(count);
    for (i, flag) in flags.into_iter().enumerate() {
        let data = reader.read_u16()?;
        let matrix = match flag {
            DRW_RIGID => DrawMatrix::rigid(data),
            _ => envelopes.weighted.get(data as usize).cloned().unwrap_or_else(|| {
                tx.warn("DRW1", format!("draw matrix {i} points at missing envelope {data}"));
                DrawMatrix::default()
            }),
        };
        matrices.push(matrix);
    }
    Ok(matrices)
}

/// Copy inverse binds onto bones and derive each bone's matrix id
pub(crate) fn apply_to_bones(model: &mut Model, envelopes: &Envelopes) {
    for (bone, matrix) in model.bones.iter_mut().zip(&envelopes.inverse_binds) {
        bone.inverse_model_matrix = *matrix;
    }
    for (idx, bone) in model.bones.iter_mut().enumerate() {
        bone.matrix_id = model
            .draw_matrices
            .iter()
            .position(|m| m.rigid_bone() == Some(idx as u16))
            .unwrap_or(idx) as u32;
    }
}

/// Weighted draw matrices, deduplicated in first-use order
pub fn collect_envelopes(model: &Model) -> Vec<DrawMatrix> {
    let mut out: Vec<DrawMatrix> = Vec::new();
    for matrix in model.draw_matrices.iter().filter(|m| m.is_envelope()) {
        if !out.contains(matrix) {
            out.push(matrix.clone());
        }
    }
    out
}

pub(crate) fn write_envelopes(writer: &mut Writer, model: &Model) -> ParseResult<Vec<DrawMatrix>> {
    let envelopes = collect_envelopes(model);
    let mut section = writer.open_section(b"EVP1");
    let base = section.start();

    section.write_u16(envelopes.len() as u16);
    section.write_u16(0xFFFF);
    if envelopes.is_empty() {
        section.write_zeros(16);
        section.align_with(32, PADDING);
        return Ok(envelopes);
    }
    for label in ["EVP1.counts", "EVP1.indices", "EVP1.weights", "EVP1.matrices"] {
        section.write_offset(base, label, LinkWidth::I32);
    }

    section.label("EVP1.counts");
    for envelope in &envelopes {
        section.write_u8(envelope.influences.len() as u8);
    }
    section.align(2);
    section.label("EVP1.indices");
    for influence in envelopes.iter().flat_map(|e| &e.influences) {
        section.write_u16(influence.bone);
    }
    section.align(4);
    section.label("EVP1.weights");
    for influence in envelopes.iter().flat_map(|e| &e.influences) {
        section.write_f32(influence.weight);
    }

    let matrix_count = envelopes
        .iter()
        .flat_map(|e| &e.influences)
        .map(|i| i.bone as usize + 1)
        .max()
        .unwrap_or(0);
    section.label("EVP1.matrices");
    for idx in 0..matrix_count {
        let matrix = model.bones.get(idx).map_or(Mat34::IDENTITY, |b| b.inverse_model_matrix);
        write_mat34(&mut section, &matrix);
    }
    section.align_with(32, PADDING);
    Ok(envelopes)
}

pub(crate) fn write_draw_matrices(writer: &mut Writer, model: &Model, envelopes: &[DrawMatrix]) -> ParseResult<()> {
    let mut section = writer.open_section(b"DRW1");
    let base = section.start();

    section.write_u16(model.draw_matrices.len() as u16);
    section.write_u16(0xFFFF);
    section.write_offset(base, "DRW1.flags", LinkWidth::I32);
    section.write_offset(base, "DRW1.data", LinkWidth::I32);

    section.label("DRW1.flags");
    for matrix in &model.draw_matrices {
        section.write_u8(if matrix.is_envelope() { DRW_WEIGHTED } else { DRW_RIGID });
    }
    section.align(2);
    section.label("DRW1.data");
    for matrix in &model.draw_matrices {
        let data = match matrix.rigid_bone() {
            Some(bone) => bone,
            None => envelopes.iter().position(|e| e == matrix).unwrap_or(0) as u16,
        };
        section.write_u16(data);
    }
    section.align_with(32, PADDING);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blend(a: u16, b: u16) -> DrawMatrix {
        DrawMatrix {
            influences: vec![Influence { bone: a, weight: 0.5 }, Influence { bone: b, weight: 0.5 }],
        }
    }

    #[test]
    fn test_collect_envelopes_dedupes_in_order() {
        let mut model = Model::new();
        model.draw_matrices = vec![DrawMatrix::rigid(0), blend(0, 1), blend(1, 2), blend(0, 1)];
        let envelopes = collect_envelopes(&model);
        assert_eq!(envelopes, vec![blend(0, 1), blend(1, 2)]);
    }

    #[test]
    fn test_matrix_id_prefers_first_rigid_entry() {
        let mut model = Model::new();
        model.add_bone(crate::model::Bone::new("a"));
        model.add_bone(crate::model::Bone::new("b"));
        model.draw_matrices = vec![blend(0, 1), DrawMatrix::rigid(1)];

        apply_to_bones(&mut model, &Envelopes::default());
        assert_eq!(model.bones[0].matrix_id, 0);
        assert_eq!(model.bones[1].matrix_id, 1);
    }
}
