//! G3D archives (BRRES)
//!
//! ```text
//! 0x00  'bres'  u16 BOM  u16 pad  u32 file size  u16 root offset  u16 blocks
//! 0x10  'root'  u32 size  root dictionary
//!         "3DModels(NW4R)" -> folder dictionary -> MDL0 sub-files
//!         "Textures(NW4R)" -> folder dictionary -> TEX0 sub-files
//!       sub-files, each 32-byte aligned
//!       name pool
//! ```
//!
//! Every sub-file begins with its tag, size, revision and a signed offset
//! back to the archive start. Names anywhere in the archive are offsets
//! into the shared pool at the end of the file.

pub mod dict;
pub mod mdl0;
pub mod tex0;

use tracing::debug;

use crate::binary::{Anchor, Endian, LinkWidth, Reader, SectionGuard, Writer};
use crate::diagnostics::Transaction;
use crate::logging::instrument_parse;
use crate::model::Model;
use crate::names::NameTable;
use crate::traits::{ModelCodec, ParseError, ParseResult, ReadOptions, WriteOptions};

pub use dict::{DictNode, Dictionary};

pub const BRES_MAGIC: [u8; 4] = *b"bres";
const ROOT_MAGIC: [u8; 4] = *b"root";
const BYTE_ORDER_MARK: u16 = 0xFEFF;
const ROOT_OFFSET: u16 = 0x10;

pub const MODELS_FOLDER: &str = "3DModels(NW4R)";
pub const TEXTURES_FOLDER: &str = "Textures(NW4R)";

/// Header shared by MDL0, TEX0 and the other sub-file kinds
#[derive(Debug, Clone, Copy)]
pub(crate) struct SubFile {
    pub start: usize,
    pub size: usize,
    pub revision: u32,
}

pub(crate) fn read_subfile(reader: &mut Reader<'_>, start: usize, tag: &[u8; 4]) -> ParseResult<SubFile> {
    reader.seek(start)?;
    let found = reader.read_magic()?;
    if &found != tag {
        return Err(ParseError::invalid(format!(
            "expected {} at 0x{start:X}, found {:?}",
            String::from_utf8_lossy(tag),
            String::from_utf8_lossy(&found)
        )));
    }
    let size = reader.read_u32()? as usize;
    if start + size > reader.len() {
        return Err(ParseError::OutOfBounds {
            offset: start,
            requested: size,
            available: reader.len() - start,
        });
    }
    let revision = reader.read_u32()?;
    let _archive = reader.read_i32()?;
    Ok(SubFile { start, size, revision })
}

/// Start a sub-file at the cursor; its size is backfilled when the guard drops
pub(crate) fn open_subfile<'w>(writer: &'w mut Writer, tag: &[u8; 4], revision: u32) -> SectionGuard<'w> {
    let mut sub = writer.open_region(4);
    let start = sub.start();
    sub.write_bytes(tag);
    sub.write_u32(0);
    sub.write_u32(revision);
    sub.write_link(Anchor::At(start), Anchor::At(0), LinkWidth::I32);
    sub
}

/// Reader and writer for BRRES archives holding one model
#[derive(Debug, Clone, Copy, Default)]
pub struct G3dCodec;

impl G3dCodec {
    pub fn new() -> Self {
        Self
    }

    /// Byte order announced by the byte-order mark
    pub fn detect_endian(bytes: &[u8]) -> Option<Endian> {
        if bytes.get(..4)? != BRES_MAGIC {
            return None;
        }
        match bytes.get(4..6)? {
            [0xFE, 0xFF] => Some(Endian::Big),
            [0xFF, 0xFE] => Some(Endian::Little),
            _ => None,
        }
    }

    fn read_archive(&self, bytes: &[u8], options: &ReadOptions, tx: &mut Transaction) -> ParseResult<Model> {
        let endian = Self::detect_endian(bytes).ok_or_else(|| ParseError::InvalidMagic {
            expected: BRES_MAGIC.to_vec(),
            found: bytes.iter().take(4).copied().collect(),
        })?;
        let mut reader = Reader::new(bytes, endian);
        reader.seek(8)?;
        let file_size = reader.read_u32()? as usize;
        if file_size != bytes.len() {
            tx.warn("G3D", format!("header declares {file_size} bytes, buffer holds {}", bytes.len()));
        }
        let root_offset = reader.read_u16()?;
        let blocks = reader.read_u16()?;
        debug!(blocks, "Reading archive");

        reader.seek(usize::from(root_offset))?;
        reader.expect_magic(&ROOT_MAGIC)?;
        let _root_size = reader.read_u32()?;
        let root = Dictionary::read(&mut reader)?;

        let folder = root
            .find(MODELS_FOLDER)
            .ok_or_else(|| ParseError::invalid("archive has no model folder"))?;
        reader.seek(folder.data)?;
        let models = Dictionary::read(&mut reader)?;
        let first = models
            .entries()
            .next()
            .ok_or_else(|| ParseError::invalid("model folder is empty"))?;
        if models.len() > 1 {
            tx.warn("G3D", format!("archive holds {} models, only `{}` is read", models.len(), first.name));
        }

        let mut model = mdl0::read(&mut reader, first.data, tx)?;
        model.info.profile.endian = endian;

        if let Some(folder) = root.find(TEXTURES_FOLDER) {
            let textures = reader.seek(folder.data).and_then(|_| Dictionary::read(&mut reader));
            match textures {
                Ok(textures) => {
                    for node in textures.entries() {
                        match tex0::read(&mut reader, node.data, tx) {
                            Ok(texture) => model.textures.push(texture),
                            Err(e) => tx.fail("TEX0", &e.with_context(format!("texture `{}`", node.name))),
                        }
                    }
                }
                Err(e) => tx.fail("G3D", &e.with_context("texture folder")),
            }
        }

        model.info.profile.family = model.detect_family();
        tx.absorb(model.validate(), options.strict_validation);
        Ok(model)
    }

    fn write_archive(&self, model: &Model, options: &WriteOptions) -> ParseResult<Vec<u8>> {
        let model = options.prepare(model)?;
        let model = model.as_ref();
        let model_name = if model.info.name.is_empty() { "model" } else { model.info.name.as_str() };

        let mut folders = vec![MODELS_FOLDER];
        if !model.textures.is_empty() {
            folders.push(TEXTURES_FOLDER);
        }
        let root_dict = Dictionary::build(&folders)?;
        let model_dict = Dictionary::build([model_name])?;
        let texture_dict = Dictionary::build(model.textures.iter().map(|t| t.name.as_str()))?;

        let mut writer = Writer::new(model.info.profile.endian);
        let mut names = NameTable::new();
        {
            let mut file = writer.open_region(8);
            file.write_bytes(&BRES_MAGIC);
            file.write_u16(BYTE_ORDER_MARK);
            file.write_u16(0);
            file.write_u32(0);
            file.write_u16(ROOT_OFFSET);
            file.write_u16((2 + model.textures.len()) as u16);

            {
                let mut root = file.open_region(4);
                root.write_bytes(&ROOT_MAGIC);
                root.write_u32(0);
                root_dict.write(&mut root, &mut names, |i| format!("G3D.folder{i}"));
                root.label("G3D.folder0");
                model_dict.write(&mut root, &mut names, |_| "G3D.mdl0".to_string());
                if !texture_dict.is_empty() {
                    root.label("G3D.folder1");
                    texture_dict.write(&mut root, &mut names, |i| format!("G3D.tex{i}"));
                }
                root.align(32);
            }

            file.label("G3D.mdl0");
            mdl0::write(&mut file, model, model_name, &mut names)?;
            for (i, texture) in model.textures.iter().enumerate() {
                file.align(32);
                file.label(format!("G3D.tex{i}"));
                tex0::write(&mut file, texture, i, &mut names)?;
            }

            debug!(strings = names.len(), sites = names.site_count(), "Committing name pool");
            names.commit(&mut file);
            file.align(32);
        }
        writer.finish()
    }
}

impl ModelCodec for G3dCodec {
    fn name(&self) -> &str {
        "G3D (BRRES)"
    }

    fn extensions(&self) -> &[&str] {
        &["brres"]
    }

    fn can_read(&self, bytes: &[u8]) -> bool {
        Self::detect_endian(bytes).is_some()
    }

    fn read_with_options(&self, bytes: &[u8], options: &ReadOptions, tx: &mut Transaction) -> ParseResult<Model> {
        crate::log_parse_start!(self.name(), bytes.len());
        let start = std::time::Instant::now();
        let result = instrument_parse(self.name(), || self.read_archive(bytes, options, tx));
        match &result {
            Ok(model) => crate::log_parse_complete!(self.name(), start.elapsed(), model.bones.len() + model.meshes.len()),
            Err(e) => crate::log_parse_error!(self.name(), e),
        }
        result
    }

    fn write_with_options(&self, model: &Model, options: &WriteOptions) -> ParseResult<Vec<u8>> {
        instrument_parse(self.name(), || self.write_archive(model, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_endian_from_bom() {
        assert_eq!(G3dCodec::detect_endian(b"bres\xFE\xFF\0\0"), Some(Endian::Big));
        assert_eq!(G3dCodec::detect_endian(b"bres\xFF\xFE\0\0"), Some(Endian::Little));
        assert_eq!(G3dCodec::detect_endian(b"bres\0\0"), None);
        assert_eq!(G3dCodec::detect_endian(b"J3D2bmd3"), None);
    }

    #[test]
    fn test_empty_model_archive_layout() {
        let bytes = G3dCodec.write(&Model::new()).unwrap();
        assert_eq!(&bytes[0..4], b"bres");
        assert_eq!(&bytes[4..6], &[0xFE, 0xFF]);
        assert_eq!(u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, bytes.len());
        assert_eq!(&bytes[0x10..0x14], b"root");

        let mut tx = Transaction::new("empty.brres");
        let model = G3dCodec.read(&bytes, &mut tx).unwrap();
        assert!(tx.is_complete(), "{:?}", tx.diagnostics());
        assert_eq!(model.info.name, "model");
    }

    #[test]
    fn test_truncated_archive_fails() {
        let bytes = G3dCodec.write(&Model::new()).unwrap();
        let mut tx = Transaction::new("cut.brres");
        assert!(G3dCodec.read(&bytes[..0x20], &mut tx).is_err());
    }
}
