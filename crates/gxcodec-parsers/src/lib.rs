//! gxcodec-parsers
//!
//! Readers and writers for the model containers used by GameCube and Wii
//! titles, decoding into one format-neutral [`Model`].
//!
//! # Supported Formats
//!
//! | Format | Extension | Description |
//! |--------|-----------|-------------|
//! | BMD    | `.bmd`    | J3D model, 8 sections |
//! | BDL    | `.bdl`    | J3D model with a precompiled material section |
//! | BRRES  | `.brres`  | G3D archive holding an MDL0 model and TEX0 textures |
//!
//! # Example
//!
//! ```rust,ignore
//! use gxcodec_parsers::{detect_codec, Transaction};
//!
//! let bytes = std::fs::read("link.bmd")?;
//! let codec = detect_codec(&bytes).ok_or("unknown container")?;
//! let mut tx = Transaction::new("link.bmd");
//! let model = codec.read(&bytes, &mut tx)?;
//!
//! println!("{} bones, {}", model.bones.len(), tx.is_complete());
//! ```

pub mod binary;
pub mod diagnostics;
pub mod g3d;
pub mod gx;
pub mod j3d;
pub mod logging;
pub mod model;
pub mod names;
pub mod summary;
pub mod texture;
pub mod traits;

// Re-export main types
pub use traits::{HumanReadable, ModelCodec, ParseError, ParseResult, ReadOptions, WriteOptions};

pub use binary::{Endian, Reader, Writer};
pub use diagnostics::{Diagnostic, Severity, Transaction, TransactionState};
pub use g3d::G3dCodec;
pub use j3d::{J3dCodec, J3dVariant};
pub use model::{Bone, Material, Mesh, Model, NumericFamily, QuantizationProfile, VertexBuffer};
pub use texture::{Texture, TextureFormat};

/// Pick the codec whose magic tag matches `bytes`
pub fn detect_codec(bytes: &[u8]) -> Option<Box<dyn ModelCodec>> {
    if let Some(variant) = J3dCodec::detect_variant(bytes) {
        return Some(Box::new(J3dCodec::new(variant)));
    }
    if G3dCodec::detect_endian(bytes).is_some() {
        return Some(Box::new(G3dCodec::new()));
    }
    None
}

/// Codec writing files with extension `ext` (`bmd`, `bdl` or `brres`)
pub fn codec_for_extension(ext: &str) -> Option<Box<dyn ModelCodec>> {
    let codecs: [Box<dyn ModelCodec>; 3] = [
        Box::new(J3dCodec::bmd()),
        Box::new(J3dCodec::bdl()),
        Box::new(G3dCodec::new()),
    ];
    codecs
        .into_iter()
        .find(|c| c.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
