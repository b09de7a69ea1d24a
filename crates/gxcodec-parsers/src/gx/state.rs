//! Fixed-function pixel pipeline state shared by both container formats
//!
//! The codec treats this as an opaque value: it is copied in and out of a
//! fixed-size block without interpreting the hardware enums it carries.
//!
//! ```text
//! 0x000  cull, z compare, z function, z update
//! 0x004  blend mode, source, dest, logic op
//! 0x008  alpha compare: comp0, ref0, op, comp1, ref1, pad[3]
//! 0x010  tex gen count, TEV stage count, indirect stage count, pad
//! 0x014  8 x tex gen    (4 bytes each)
//! 0x034  16 x TEV stage (16 bytes each)
//! 0x134  4 x indirect   (4 bytes each)
//! 0x144  4 x TEV color  (4 x i16 each)
//! 0x164  end
//! ```

use serde::{Deserialize, Serialize};

use crate::binary::{Reader, Writer};
use crate::traits::{ParseError, ParseResult};

pub const MAX_TEX_GENS: usize = 8;
pub const MAX_TEV_STAGES: usize = 16;
pub const MAX_INDIRECT_STAGES: usize = 4;

/// Encoded size of a [`GpuState`]
pub const GPU_STATE_SIZE: usize = 0x164;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CullMode {
    None = 0,
    Front = 1,
    #[default]
    Back = 2,
    All = 3,
}

impl CullMode {
    pub fn from_u8(value: u8) -> Self {
        match value & 3 {
            0 => Self::None,
            1 => Self::Front,
            2 => Self::Back,
            _ => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZMode {
    pub compare: bool,
    pub function: u8,
    pub update: bool,
}

impl Default for ZMode {
    fn default() -> Self {
        // GX_LEQUAL with both test and write enabled
        Self {
            compare: true,
            function: 3,
            update: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlendMode {
    pub mode: u8,
    pub source: u8,
    pub dest: u8,
    pub logic_op: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AlphaCompare {
    pub comp0: u8,
    pub ref0: u8,
    pub op: u8,
    pub comp1: u8,
    pub ref1: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TexGen {
    pub kind: u8,
    pub source: u8,
    pub matrix: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TevStage {
    pub color_inputs: [u8; 4],
    pub color_op: u8,
    pub alpha_inputs: [u8; 4],
    pub alpha_op: u8,
    pub tex_map: u8,
    pub tex_coord: u8,
    pub ras_channel: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndirectStage {
    pub tex_coord: u8,
    pub tex_map: u8,
    pub scale_u: u8,
    pub scale_v: u8,
}

/// Snapshot of the pixel pipeline configuration of one material
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GpuState {
    pub cull_mode: CullMode,
    pub z_mode: ZMode,
    pub blend: BlendMode,
    pub alpha_compare: AlphaCompare,
    pub tex_gens: Vec<TexGen>,
    pub tev_stages: Vec<TevStage>,
    pub indirect_stages: Vec<IndirectStage>,
    pub tev_colors: [[i16; 4]; 4],
}

impl GpuState {
    fn check_limits(&self) -> ParseResult<()> {
        let over = |what: &str, n: usize, max: usize| {
            ParseError::invalid(format!("{n} {what} exceed the hardware limit of {max}"))
        };
        if self.tex_gens.len() > MAX_TEX_GENS {
            return Err(over("tex gens", self.tex_gens.len(), MAX_TEX_GENS));
        }
        if self.tev_stages.len() > MAX_TEV_STAGES {
            return Err(over("TEV stages", self.tev_stages.len(), MAX_TEV_STAGES));
        }
        if self.indirect_stages.len() > MAX_INDIRECT_STAGES {
            return Err(over("indirect stages", self.indirect_stages.len(), MAX_INDIRECT_STAGES));
        }
        Ok(())
    }

    pub fn write(&self, writer: &mut Writer) -> ParseResult<()> {
        self.check_limits()?;
        let start = writer.position();

        writer.write_u8(self.cull_mode as u8);
        writer.write_u8(self.z_mode.compare as u8);
        writer.write_u8(self.z_mode.function);
        writer.write_u8(self.z_mode.update as u8);

        writer.write_bytes(&[self.blend.mode, self.blend.source, self.blend.dest, self.blend.logic_op]);

        let ac = &self.alpha_compare;
        writer.write_bytes(&[ac.comp0, ac.ref0, ac.op, ac.comp1, ac.ref1, 0, 0, 0]);

        writer.write_u8(self.tex_gens.len() as u8);
        writer.write_u8(self.tev_stages.len() as u8);
        writer.write_u8(self.indirect_stages.len() as u8);
        writer.write_u8(0);

        for i in 0..MAX_TEX_GENS {
            let g = self.tex_gens.get(i).copied().unwrap_or_default();
            writer.write_bytes(&[g.kind, g.source, g.matrix, 0]);
        }
        for i in 0..MAX_TEV_STAGES {
            let s = self.tev_stages.get(i).copied().unwrap_or_default();
            writer.write_bytes(&s.color_inputs);
            writer.write_u8(s.color_op);
            writer.write_bytes(&s.alpha_inputs);
            writer.write_u8(s.alpha_op);
            writer.write_bytes(&[s.tex_map, s.tex_coord, s.ras_channel, 0, 0, 0]);
        }
        for i in 0..MAX_INDIRECT_STAGES {
            let s = self.indirect_stages.get(i).copied().unwrap_or_default();
            writer.write_bytes(&[s.tex_coord, s.tex_map, s.scale_u, s.scale_v]);
        }
        for color in &self.tev_colors {
            for c in color {
                writer.write_i16(*c);
            }
        }

        debug_assert_eq!(writer.position() - start, GPU_STATE_SIZE);
        Ok(())
    }

    pub fn read(reader: &mut Reader<'_>) -> ParseResult<Self> {
        let cull_mode = CullMode::from_u8(reader.read_u8()?);
        let z_mode = ZMode {
            compare: reader.read_u8()? != 0,
            function: reader.read_u8()?,
            update: reader.read_u8()? != 0,
        };
        let [mode, source, dest, logic_op] = reader.read_array::<4>()?;
        let blend = BlendMode { mode, source, dest, logic_op };
        let ac = reader.read_array::<8>()?;
        let alpha_compare = AlphaCompare {
            comp0: ac[0],
            ref0: ac[1],
            op: ac[2],
            comp1: ac[3],
            ref1: ac[4],
        };

        let [n_gens, n_tev, n_ind, _] = reader.read_array::<4>()?;
        let (n_gens, n_tev, n_ind) = (n_gens as usize, n_tev as usize, n_ind as usize);
        if n_gens > MAX_TEX_GENS || n_tev > MAX_TEV_STAGES || n_ind > MAX_INDIRECT_STAGES {
            return Err(ParseError::invalid(format!(
                "GPU state counts out of range: {n_gens} tex gens, {n_tev} TEV stages, {n_ind} indirect stages"
            )));
        }

        let mut tex_gens = Vec::with_capacity(n_gens);
        for i in 0..MAX_TEX_GENS {
            let [kind, source, matrix, _] = reader.read_array::<4>()?;
            if i < n_gens {
                tex_gens.push(TexGen { kind, source, matrix });
            }
        }

        let mut tev_stages = Vec::with_capacity(n_tev);
        for i in 0..MAX_TEV_STAGES {
            let raw = reader.read_array::<16>()?;
            if i < n_tev {
                tev_stages.push(TevStage {
                    color_inputs: [raw[0], raw[1], raw[2], raw[3]],
                    color_op: raw[4],
                    alpha_inputs: [raw[5], raw[6], raw[7], raw[8]],
                    alpha_op: raw[9],
                    tex_map: raw[10],
                    tex_coord: raw[11],
                    ras_channel: raw[12],
                });
            }
        }

        let mut indirect_stages = Vec::with_capacity(n_ind);
        for i in 0..MAX_INDIRECT_STAGES {
            let [tex_coord, tex_map, scale_u, scale_v] = reader.read_array::<4>()?;
            if i < n_ind {
                indirect_stages.push(IndirectStage { tex_coord, tex_map, scale_u, scale_v });
            }
        }

        let mut tev_colors = [[0i16; 4]; 4];
        for color in &mut tev_colors {
            for c in color.iter_mut() {
                *c = reader.read_i16()?;
            }
        }

        Ok(Self {
            cull_mode,
            z_mode,
            blend,
            alpha_compare,
            tex_gens,
            tev_stages,
            indirect_stages,
            tev_colors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    fn sample_state() -> GpuState {
        GpuState {
            cull_mode: CullMode::None,
            blend: BlendMode { mode: 1, source: 4, dest: 5, logic_op: 3 },
            tex_gens: vec![TexGen { kind: 1, source: 4, matrix: 60 }],
            tev_stages: vec![
                TevStage {
                    color_inputs: [15, 8, 10, 15],
                    alpha_inputs: [7, 4, 5, 7],
                    ..TevStage::default()
                },
                TevStage::default(),
            ],
            tev_colors: [[255, 0, 0, 255], [0; 4], [0; 4], [-32, 0, 0, 0]],
            ..GpuState::default()
        }
    }

    #[test]
    fn test_block_is_fixed_size() {
        let mut writer = Writer::new(Endian::Big);
        sample_state().write(&mut writer).unwrap();
        GpuState::default().write(&mut writer).unwrap();
        assert_eq!(writer.position(), GPU_STATE_SIZE * 2);
    }

    #[test]
    fn test_state_survives_block() {
        let state = sample_state();
        let mut writer = Writer::new(Endian::Big);
        state.write(&mut writer).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(&bytes, Endian::Big);
        assert_eq!(GpuState::read(&mut reader).unwrap(), state);
    }

    #[test]
    fn test_too_many_stages_rejected() {
        let state = GpuState {
            tev_stages: vec![TevStage::default(); MAX_TEV_STAGES + 1],
            ..GpuState::default()
        };
        let mut writer = Writer::new(Endian::Big);
        assert!(matches!(state.write(&mut writer), Err(ParseError::InvalidStructure(_))));
    }
}
