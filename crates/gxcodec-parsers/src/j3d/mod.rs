//! J3D model containers (BMD / BDL)
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ 'J3D2' 'bmd3'|'bdl4'  file size  #sections    │ 0x00
//! │ 'SVR3' FF x 12                               │ 0x10
//! ├──────────────────────────────────────────────┤
//! │ INF1  scene graph bytecode                   │
//! │ VTX1  vertex formats + arrays                │
//! │ EVP1  weighted envelopes, inverse binds      │
//! │ DRW1  draw matrix table                      │
//! │ JNT1  joints                                 │
//! │ SHP1  shapes, descriptors, display lists     │
//! │ MAT3  materials                              │
//! │ MDL3  precompiled GPU commands (BDL only)    │
//! │ TEX1  textures                               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Every section starts with a tag and a size and is padded to 32 bytes.
//! Offsets inside a section are relative to the section start. A
//! byte-swapped `2D3J` magic marks a little-endian container.

pub mod evp1;
pub mod inf1;
pub mod jnt1;
pub mod mat3;
pub mod shp1;
pub mod tex1;
pub mod vtx1;

use tracing::debug;

use crate::binary::{Endian, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::{BufferSlot, VertexUsage};
use crate::logging::instrument_parse;
use crate::model::Model;
use crate::traits::{ModelCodec, ParseError, ParseResult, ReadOptions, WriteOptions};

pub const J3D_MAGIC: [u8; 4] = *b"J3D2";
pub const BMD_MAGIC: [u8; 4] = *b"bmd3";
pub const BDL_MAGIC: [u8; 4] = *b"bdl4";
const SVR_MAGIC: [u8; 4] = *b"SVR3";
const HEADER_SIZE: usize = 0x20;

/// Filler conventionally used between J3D sections
pub(crate) const PADDING: &[u8] = b"This is padding data to align";

/// Which J3D flavour to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum J3dVariant {
    #[default]
    Bmd,
    Bdl,
}

impl J3dVariant {
    pub fn magic(self) -> [u8; 4] {
        match self {
            J3dVariant::Bmd => BMD_MAGIC,
            J3dVariant::Bdl => BDL_MAGIC,
        }
    }

    fn section_count(self) -> u32 {
        match self {
            J3dVariant::Bmd => 8,
            J3dVariant::Bdl => 9,
        }
    }
}

/// Location of one section in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SectionHeader {
    pub tag: [u8; 4],
    pub start: usize,
    pub size: usize,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        String::from_utf8_lossy(&self.tag).into_owned()
    }

    /// Absolute position of a section-relative offset
    pub fn at(&self, offset: u32) -> usize {
        self.start + offset as usize
    }

    pub fn end(&self) -> usize {
        self.start + self.size
    }
}

/// Name the reader gives to the buffer in each VTX1 slot
pub(crate) fn slot_buffer_name(slot: BufferSlot) -> String {
    match slot {
        BufferSlot::Position => "Position".to_string(),
        BufferSlot::Normal => "Normal".to_string(),
        BufferSlot::Color(i) => format!("Color{i}"),
        BufferSlot::TexCoord(i) => format!("TexCoord{i}"),
    }
}

/// Read a `u16` remap table and report whether it is the identity
pub(crate) fn read_remap(reader: &mut Reader<'_>, count: usize) -> ParseResult<(Vec<u16>, bool)> {
    let mut remap = Vec::with_capacity(count);
    for _ in 0..count {
        remap.push(reader.read_u16()?);
    }
    let identity = remap.iter().enumerate().all(|(i, &r)| r as usize == i);
    Ok((remap, identity))
}

pub(crate) fn write_identity_remap(writer: &mut Writer, count: usize) {
    for i in 0..count {
        writer.write_u16(i as u16);
    }
}

/// Reader and writer for J3D containers
#[derive(Debug, Clone, Copy, Default)]
pub struct J3dCodec {
    variant: J3dVariant,
}

impl J3dCodec {
    pub fn new(variant: J3dVariant) -> Self {
        Self { variant }
    }

    pub fn bmd() -> Self {
        Self::new(J3dVariant::Bmd)
    }

    pub fn bdl() -> Self {
        Self::new(J3dVariant::Bdl)
    }

    pub fn variant(&self) -> J3dVariant {
        self.variant
    }

    /// Byte order announced by the magic, if this is a J3D container
    pub fn detect_endian(bytes: &[u8]) -> Option<Endian> {
        let magic = bytes.get(..4)?;
        if magic == J3D_MAGIC {
            Some(Endian::Big)
        } else if magic == *b"2D3J" {
            Some(Endian::Little)
        } else {
            None
        }
    }

    /// Variant announced by the second tag
    pub fn detect_variant(bytes: &[u8]) -> Option<J3dVariant> {
        let endian = Self::detect_endian(bytes)?;
        let mut reader = Reader::new(bytes, endian);
        reader.skip(4).ok()?;
        match reader.read_tag().ok()? {
            BMD_MAGIC => Some(J3dVariant::Bmd),
            BDL_MAGIC => Some(J3dVariant::Bdl),
            _ => None,
        }
    }

    fn index_sections(reader: &mut Reader<'_>, count: u32, tx: &mut Transaction) -> Vec<SectionHeader> {
        let mut sections = Vec::with_capacity(count as usize);
        let mut pos = HEADER_SIZE;

        for _ in 0..count {
            let header = reader.seek(pos).and_then(|_| Ok((reader.read_tag()?, reader.read_u32()?)));
            let (tag, size) = match header {
                Ok(h) => h,
                Err(e) => {
                    tx.fail("J3D", &e.with_context("section table"));
                    break;
                }
            };
            let size = size as usize;
            if size < 8 || pos + size > reader.len() {
                tx.error(
                    "J3D",
                    format!(
                        "section {} at 0x{pos:X} declares {size} bytes, {} available",
                        String::from_utf8_lossy(&tag),
                        reader.len() - pos
                    ),
                );
                break;
            }
            debug!(tag = %String::from_utf8_lossy(&tag), offset = pos, size, "Found section");
            sections.push(SectionHeader { tag, start: pos, size });
            pos += size;
        }
        sections
    }

    /// Run one section reader, turning failures into diagnostics and
    /// checking the consumed length against the declared size
    fn read_section<T>(
        reader: &mut Reader<'_>,
        sections: &[SectionHeader],
        tag: &[u8; 4],
        options: &ReadOptions,
        tx: &mut Transaction,
        f: impl FnOnce(&mut Reader<'_>, &SectionHeader, &mut Transaction) -> ParseResult<T>,
    ) -> Option<T> {
        let domain = String::from_utf8_lossy(tag).into_owned();
        let Some(section) = sections.iter().find(|s| &s.tag == tag) else {
            tx.warn(domain, "section is missing");
            return None;
        };

        let body = section.start + 8;
        if let Err(e) = reader.seek(body) {
            tx.fail(domain, &e);
            return None;
        }
        reader.reset_high_water(body);

        match f(reader, section, tx) {
            Ok(value) => {
                let consumed = reader.high_water().saturating_sub(section.start);
                if consumed > section.size {
                    tx.warn(
                        domain,
                        format!("read {consumed} bytes from a section declaring {}", section.size),
                    );
                } else if section.size - consumed > options.section_size_tolerance as usize {
                    tx.warn(
                        domain,
                        format!("{} of {} bytes left unread", section.size - consumed, section.size),
                    );
                }
                Some(value)
            }
            Err(e) => {
                tx.fail(domain, &e);
                None
            }
        }
    }

    fn read_container(&self, bytes: &[u8], options: &ReadOptions, tx: &mut Transaction) -> ParseResult<Model> {
        let endian = Self::detect_endian(bytes).ok_or_else(|| ParseError::InvalidMagic {
            expected: J3D_MAGIC.to_vec(),
            found: bytes.iter().take(4).copied().collect(),
        })?;
        let mut reader = Reader::new(bytes, endian);
        reader.skip(4)?;

        let kind = reader.read_tag()?;
        let variant = match kind {
            BMD_MAGIC => J3dVariant::Bmd,
            BDL_MAGIC => J3dVariant::Bdl,
            other => {
                return Err(ParseError::InvalidMagic {
                    expected: BMD_MAGIC.to_vec(),
                    found: other.to_vec(),
                })
            }
        };
        let file_size = reader.read_u32()? as usize;
        if file_size != bytes.len() {
            tx.warn("J3D", format!("header declares {file_size} bytes, buffer holds {}", bytes.len()));
        }
        let count = reader.read_u32()?;
        let sections = Self::index_sections(&mut reader, count, tx);

        let mut model = Model::new();
        model.info.profile.endian = endian;

        let graph = Self::read_section(&mut reader, &sections, b"INF1", options, tx, inf1::read);
        if let Some(info) = &graph {
            model.info.scaling_rule = info.scaling_rule;
        }

        let mut slots = [None; BufferSlot::COUNT];
        if let Some(buffers) = Self::read_section(&mut reader, &sections, b"VTX1", options, tx, vtx1::read) {
            for (slot, buffer) in buffers {
                slots[slot.index()] = Some(model.vertex_buffers.len());
                model.vertex_buffers.push(buffer);
            }
        }

        let envelopes = Self::read_section(&mut reader, &sections, b"EVP1", options, tx, evp1::read_envelopes)
            .unwrap_or_default();
        model.draw_matrices = Self::read_section(&mut reader, &sections, b"DRW1", options, tx, |r, s, tx| {
            evp1::read_draw_matrices(r, s, &envelopes, tx)
        })
        .unwrap_or_default();

        model.bones = Self::read_section(&mut reader, &sections, b"JNT1", options, tx, jnt1::read)
            .unwrap_or_default();
        evp1::apply_to_bones(&mut model, &envelopes);

        let mut usage = VertexUsage::new();
        model.meshes = Self::read_section(&mut reader, &sections, b"SHP1", options, tx, |r, s, tx| {
            shp1::read(r, s, &mut usage, tx)
        })
        .unwrap_or_default();
        if options.trim_vertex_buffers {
            vtx1::trim(&mut model, &slots, &usage, tx);
        }

        model.textures = Self::read_section(&mut reader, &sections, b"TEX1", options, tx, tex1::read)
            .unwrap_or_default();
        let textures = &model.textures;
        model.materials = Self::read_section(&mut reader, &sections, b"MAT3", options, tx, |r, s, tx| {
            mat3::read(r, s, textures, tx)
        })
        .unwrap_or_default();

        if let Some(info) = &graph {
            inf1::apply_graph(&info.graph, &mut model, tx);
        }

        if variant == J3dVariant::Bdl {
            let body = Self::read_section(&mut reader, &sections, b"MDL3", options, tx, |r, s, _| {
                Ok(r.read_bytes(s.size - 8)?.to_vec())
            });
            if let Some(body) = body {
                model.info.opaque_sections.push((*b"MDL3", body));
            }
        }

        model.info.profile.family = model.detect_family();

        tx.absorb(model.validate(), options.strict_validation);
        Ok(model)
    }

    fn write_container(&self, model: &Model, options: &WriteOptions) -> ParseResult<Vec<u8>> {
        let model = options.prepare(model)?;
        let model = model.as_ref();
        let slots = vtx1::assign_slots(model)?;
        let mut writer = Writer::new(model.info.profile.endian);
        {
            let mut file = writer.open_region(8);
            file.write_tag(&J3D_MAGIC);
            file.write_tag(&self.variant.magic());
            file.write_u32(0);
            file.write_u32(self.variant.section_count());
            file.write_tag(&SVR_MAGIC);
            file.write_bytes(&[0xFF; 12]);

            inf1::write(&mut file, model, &slots)?;
            vtx1::write(&mut file, model, &slots)?;
            let envelopes = evp1::write_envelopes(&mut file, model)?;
            evp1::write_draw_matrices(&mut file, model, &envelopes)?;
            jnt1::write(&mut file, model)?;
            shp1::write(&mut file, model)?;
            mat3::write(&mut file, model)?;
            if self.variant == J3dVariant::Bdl {
                let body = model
                    .info
                    .opaque_sections
                    .iter()
                    .find(|(tag, _)| tag == b"MDL3")
                    .map(|(_, body)| body.as_slice())
                    .unwrap_or(&[]);
                let mut section = file.open_section(b"MDL3");
                section.write_bytes(body);
                section.align_with(32, PADDING);
            }
            tex1::write(&mut file, model)?;
        }
        writer.finish()
    }
}

impl ModelCodec for J3dCodec {
    fn name(&self) -> &str {
        match self.variant {
            J3dVariant::Bmd => "J3D (BMD)",
            J3dVariant::Bdl => "J3D (BDL)",
        }
    }

    fn extensions(&self) -> &[&str] {
        match self.variant {
            J3dVariant::Bmd => &["bmd"],
            J3dVariant::Bdl => &["bdl"],
        }
    }

    fn can_read(&self, bytes: &[u8]) -> bool {
        Self::detect_variant(bytes).is_some()
    }

    fn read_with_options(&self, bytes: &[u8], options: &ReadOptions, tx: &mut Transaction) -> ParseResult<Model> {
        crate::log_parse_start!(self.name(), bytes.len());
        let start = std::time::Instant::now();
        let result = instrument_parse(self.name(), || self.read_container(bytes, options, tx));
        match &result {
            Ok(model) => crate::log_parse_complete!(self.name(), start.elapsed(), model.bones.len() + model.meshes.len()),
            Err(e) => crate::log_parse_error!(self.name(), e),
        }
        result
    }

    fn write_with_options(&self, model: &Model, options: &WriteOptions) -> ParseResult<Vec<u8>> {
        instrument_parse(self.name(), || self.write_container(model, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_endian_and_variant() {
        let mut big = b"J3D2bdl4".to_vec();
        big.extend_from_slice(&[0; 24]);
        assert_eq!(J3dCodec::detect_endian(&big), Some(Endian::Big));
        assert_eq!(J3dCodec::detect_variant(&big), Some(J3dVariant::Bdl));

        let little = b"2D3J3dmb".to_vec();
        assert_eq!(J3dCodec::detect_endian(&little), Some(Endian::Little));
        assert_eq!(J3dCodec::detect_variant(&little), Some(J3dVariant::Bmd));

        assert!(!J3dCodec::bmd().can_read(b"bres"));
        assert!(!J3dCodec::bmd().can_read(b""));
    }

    #[test]
    fn test_invalid_magic_returns_no_model() {
        let mut tx = Transaction::new("junk.bmd");
        let result = J3dCodec::bmd().read(b"RARC\0\0\0\0", &mut tx);
        assert!(matches!(result, Err(ParseError::InvalidMagic { .. })));
    }

    #[test]
    fn test_empty_model_layout() {
        let bytes = J3dCodec::bmd().write(&Model::new()).unwrap();

        assert_eq!(&bytes[0..8], b"J3D2bmd3");
        assert_eq!(u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, bytes.len());
        assert_eq!(&bytes[16..20], b"SVR3");
        assert_eq!(&bytes[0x20..0x24], b"INF1");
        assert_eq!(bytes.len() % 32, 0);

        let mut tx = Transaction::new("empty.bmd");
        let model = J3dCodec::bmd().read(&bytes, &mut tx).unwrap();
        assert!(tx.is_complete(), "{:?}", tx.diagnostics());
        assert!(model.bones.is_empty());
    }
}
