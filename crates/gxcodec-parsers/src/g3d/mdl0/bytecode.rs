//! Render bytecode: the command streams that wire bones, envelopes and
//! draw calls together
//!
//! | op | name     | operands                                        |
//! |----|----------|-------------------------------------------------|
//! | 00 | nop      |                                                 |
//! | 01 | end      |                                                 |
//! | 02 | node     | u16 bone, u16 parent matrix                     |
//! | 03 | mix      | u16 matrix, u8 n, n x (u16 bone, f32 weight)    |
//! | 04 | draw     | u16 material, u16 shape, u16 bone, u8 priority  |

use tracing::trace;

use super::{Dictionary, Section};
use crate::binary::{Reader, Writer};
use crate::diagnostics::Transaction;
use crate::model::{Display, Influence, Model};
use crate::traits::{ParseError, ParseResult};

const OP_NOP: u8 = 0x00;
const OP_END: u8 = 0x01;
const OP_NODE: u8 = 0x02;
const OP_MIX: u8 = 0x03;
const OP_DRAW: u8 = 0x04;

pub(crate) const NODE_TREE: &str = "NodeTree";
pub(crate) const NODE_MIX: &str = "NodeMix";
pub(crate) const DRAW_OPAQUE: &str = "DrawOpa";
pub(crate) const DRAW_TRANSLUCENT: &str = "DrawXlu";

fn is_translucent(model: &Model, display: &Display) -> bool {
    model.materials.get(display.material).is_some_and(|m| m.translucent)
}

fn draws(model: &Model, translucent: bool) -> impl Iterator<Item = (usize, &Display)> + '_ {
    model.bones.iter().enumerate().flat_map(move |(bone, b)| {
        b.displays
            .iter()
            .filter(move |d| is_translucent(model, d) == translucent)
            .map(move |d| (bone, d))
    })
}

/// Streams `model` needs, in emission order
pub(crate) fn stream_names(model: &Model) -> Vec<&'static str> {
    let mut names = Vec::new();
    if !model.bones.is_empty() {
        names.push(NODE_TREE);
    }
    if model.draw_matrices.iter().any(|m| m.is_envelope()) {
        names.push(NODE_MIX);
    }
    if draws(model, false).next().is_some() {
        names.push(DRAW_OPAQUE);
    }
    if draws(model, true).next().is_some() {
        names.push(DRAW_TRANSLUCENT);
    }
    names
}

fn parent_matrix(model: &Model, bone: usize) -> u32 {
    let b = &model.bones[bone];
    b.parent
        .and_then(|p| model.bones.get(p))
        .map_or(b.matrix_id, |p| p.matrix_id)
}

fn write_stream(writer: &mut Writer, model: &Model, stream: &str) {
    match stream {
        NODE_TREE => {
            for bone in 0..model.bones.len() {
                writer.write_u8(OP_NODE);
                writer.write_u16(bone as u16);
                writer.write_u16(parent_matrix(model, bone) as u16);
            }
        }
        NODE_MIX => {
            for (i, matrix) in model.draw_matrices.iter().enumerate() {
                if !matrix.is_envelope() {
                    continue;
                }
                writer.write_u8(OP_MIX);
                writer.write_u16(i as u16);
                writer.write_u8(matrix.influences.len() as u8);
                for influence in &matrix.influences {
                    writer.write_u16(influence.bone);
                    writer.write_f32(influence.weight);
                }
            }
        }
        _ => {
            for (bone, display) in draws(model, stream == DRAW_TRANSLUCENT) {
                writer.write_u8(OP_DRAW);
                writer.write_u16(display.material as u16);
                writer.write_u16(display.mesh as u16);
                writer.write_u16(bone as u16);
                writer.write_u8(display.priority);
            }
        }
    }
    writer.write_u8(OP_END);
}

pub(crate) fn write(writer: &mut Writer, model: &Model, streams: &[&str]) {
    for (i, stream) in streams.iter().enumerate() {
        writer.label(Section::Bytecode.entry_label(i));
        write_stream(writer, model, stream);
    }
}

fn run(reader: &mut Reader<'_>, stream: &str, model: &mut Model, tx: &mut Transaction) -> ParseResult<()> {
    loop {
        let at = reader.position();
        match reader.read_u8()? {
            OP_NOP => {}
            OP_END => return Ok(()),
            OP_NODE => {
                let bone = usize::from(reader.read_u16()?);
                let parent = u32::from(reader.read_u16()?);
                if bone >= model.bones.len() {
                    tx.warn(stream, format!("node command names bone {bone} of {}", model.bones.len()));
                } else if parent_matrix(model, bone) != parent {
                    tx.warn(
                        stream,
                        format!("bone `{}` is parented to matrix {parent} in the node tree", model.bones[bone].name),
                    );
                }
            }
            OP_MIX => {
                let index = usize::from(reader.read_u16()?);
                let count = reader.read_u8()?;
                let mut influences = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let bone = reader.read_u16()?;
                    let weight = reader.read_f32()?;
                    influences.push(Influence { bone, weight });
                }
                match model.draw_matrices.get_mut(index) {
                    Some(matrix) => matrix.influences = influences,
                    None => tx.warn(stream, format!("mix command targets matrix {index}")),
                }
            }
            OP_DRAW => {
                let material = usize::from(reader.read_u16()?);
                let mesh = usize::from(reader.read_u16()?);
                let bone = usize::from(reader.read_u16()?);
                let priority = reader.read_u8()?;
                match model.bones.get_mut(bone) {
                    Some(b) => b.displays.push(Display { material, mesh, priority }),
                    None => tx.warn(stream, format!("draw command names bone {bone}")),
                }
            }
            op => {
                return Err(ParseError::invalid(format!("unknown bytecode op 0x{op:02X} at 0x{at:X}")));
            }
        }
    }
}

/// Run every stream in `code` against the bones and draw matrices
/// already read into `model`
pub(crate) fn read(reader: &mut Reader<'_>, code: &Dictionary, model: &mut Model, tx: &mut Transaction) -> ParseResult<()> {
    for node in code.entries() {
        trace!(stream = %node.name, "Running bytecode");
        reader.seek(node.data)?;
        run(reader, &node.name, model, tx).map_err(|e| e.with_context(format!("bytecode `{}`", node.name)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;
    use crate::model::{Bone, DrawMatrix, Material};

    fn model() -> Model {
        let mut model = Model::new();
        model.add_bone(Bone::new("root"));
        let mut child = Bone::new("child");
        child.parent = Some(0);
        child.matrix_id = 1;
        model.add_bone(child);
        model.rebuild_children();

        let mut glass = Material::new("glass");
        glass.translucent = true;
        model.materials = vec![Material::new("solid"), glass];
        model.bones[1].displays.push(Display { material: 1, mesh: 0, priority: 2 });
        model.bones[0].displays.push(Display { material: 0, mesh: 1, priority: 0 });

        model.draw_matrices = vec![
            DrawMatrix::rigid(0),
            DrawMatrix::rigid(1),
            DrawMatrix {
                influences: vec![Influence { bone: 0, weight: 0.25 }, Influence { bone: 1, weight: 0.75 }],
            },
        ];
        model
    }

    #[test]
    fn test_stream_selection() {
        assert_eq!(stream_names(&model()), vec![NODE_TREE, NODE_MIX, DRAW_OPAQUE, DRAW_TRANSLUCENT]);
        assert!(stream_names(&Model::new()).is_empty());
    }

    #[test]
    fn test_streams_rebuild_displays_and_envelopes() {
        let source = model();
        let streams = stream_names(&source);
        let mut writer = Writer::new(Endian::Big);
        write(&mut writer, &source, &streams);
        let mut code = Dictionary::new();
        for (i, name) in streams.iter().enumerate() {
            let at = writer.label_position(&Section::Bytecode.entry_label(i)).unwrap();
            code.insert(name, at).unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut target = source.clone();
        for bone in &mut target.bones {
            bone.displays.clear();
        }
        target.draw_matrices[2] = DrawMatrix::default();

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("bytecode");
        read(&mut reader, &code, &mut target, &mut tx).unwrap();
        assert!(tx.is_complete(), "{:?}", tx.diagnostics());
        assert_eq!(target.bones[0].displays, source.bones[0].displays);
        assert_eq!(target.bones[1].displays, source.bones[1].displays);
        assert_eq!(target.draw_matrices, source.draw_matrices);
    }

    #[test]
    fn test_unknown_op_is_an_error() {
        let bytes = [0x00, 0x09];
        let mut code = Dictionary::new();
        code.insert(DRAW_OPAQUE, 0).unwrap();
        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("bytecode");
        assert!(read(&mut reader, &code, &mut Model::new(), &mut tx).is_err());
    }
}
