//! INF1: container info and the scene graph bytecode
//!
//! The graph is a flat list of `(op, index)` pairs. `Open`/`Close`
//! bracket the children of the node emitted just before them.

use tracing::trace;

use super::{SectionHeader, PADDING};
use crate::binary::{Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::BufferSlot;
use crate::model::{Display, Model, ScalingRule};
use crate::traits::{ParseError, ParseResult};

const OP_TERMINATE: u16 = 0x00;
const OP_OPEN: u16 = 0x01;
const OP_CLOSE: u16 = 0x02;
const OP_JOINT: u16 = 0x10;
const OP_MATERIAL: u16 = 0x11;
const OP_SHAPE: u16 = 0x12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOp {
    Open,
    Close,
    Joint(u16),
    Material(u16),
    Shape(u16),
}

#[derive(Debug, Clone, Default)]
pub struct Inf1 {
    pub scaling_rule: ScalingRule,
    pub packet_count: u32,
    pub vertex_count: u32,
    pub graph: Vec<GraphOp>,
}

pub(crate) fn read(reader: &mut Reader<'_>, section: &SectionHeader, tx: &mut Transaction) -> ParseResult<Inf1> {
    let flags = reader.read_u16()?;
    reader.skip(2)?;
    let packet_count = reader.read_u32()?;
    let vertex_count = reader.read_u32()?;
    let graph_offset = reader.read_u32()?;

    let scaling_rule = ScalingRule::from_u32(u32::from(flags & 0xF)).unwrap_or_else(|| {
        tx.warn("INF1", format!("unknown scaling rule {}", flags & 0xF));
        ScalingRule::Basic
    });

    reader.seek(section.at(graph_offset))?;
    let mut graph = Vec::new();
    loop {
        let op = reader.read_u16()?;
        let index = reader.read_u16()?;
        let node = match op {
            OP_TERMINATE => break,
            OP_OPEN => GraphOp::Open,
            OP_CLOSE => GraphOp::Close,
            OP_JOINT => GraphOp::Joint(index),
            OP_MATERIAL => GraphOp::Material(index),
            OP_SHAPE => GraphOp::Shape(index),
            other => {
                return Err(ParseError::invalid(format!(
                    "unknown scene graph op 0x{other:02X} at 0x{:X}",
                    reader.position() - 4
                )))
            }
        };
        graph.push(node);
    }
    trace!(ops = graph.len(), "Read scene graph");

    Ok(Inf1 {
        scaling_rule,
        packet_count,
        vertex_count,
        graph,
    })
}

/// Rebuild bone parents and display lists from the graph bytecode
pub(crate) fn apply_graph(graph: &[GraphOp], model: &mut Model, tx: &mut Transaction) {
    let mut stack: Vec<GraphOp> = Vec::new();
    let mut last: Option<GraphOp> = None;

    for bone in &mut model.bones {
        bone.parent = None;
        bone.displays.clear();
    }

    for &op in graph {
        match op {
            GraphOp::Open => {
                if let Some(node) = last {
                    stack.push(node);
                } else {
                    tx.warn("INF1", "open without a preceding node");
                }
            }
            GraphOp::Close => {
                if stack.pop().is_none() {
                    tx.warn("INF1", "unbalanced close");
                }
                last = None;
            }
            GraphOp::Joint(idx) => {
                let idx = usize::from(idx);
                if idx >= model.bones.len() {
                    tx.warn("INF1", format!("joint {idx} is out of range"));
                } else {
                    model.bones[idx].parent = innermost_joint(&stack);
                }
                last = Some(op);
            }
            GraphOp::Material(_) => last = Some(op),
            GraphOp::Shape(mesh) => {
                let mesh = usize::from(mesh);
                let material = stack.iter().rev().find_map(|n| match n {
                    GraphOp::Material(m) => Some(usize::from(*m)),
                    _ => None,
                });
                match (innermost_joint(&stack), material) {
                    (Some(bone), Some(material)) if bone < model.bones.len() => {
                        model.bones[bone].displays.push(Display {
                            material,
                            mesh,
                            priority: 0,
                        });
                    }
                    _ => tx.warn("INF1", format!("shape {mesh} is not under a joint and material")),
                }
                last = Some(op);
            }
        }
    }

    if !stack.is_empty() {
        tx.warn("INF1", format!("{} nodes left open", stack.len()));
    }
    model.rebuild_children();
}

fn innermost_joint(stack: &[GraphOp]) -> Option<usize> {
    stack.iter().rev().find_map(|n| match n {
        GraphOp::Joint(j) => Some(usize::from(*j)),
        _ => None,
    })
}

/// Flatten bone hierarchy and displays back into bytecode
pub fn build_graph(model: &Model) -> Vec<GraphOp> {
    let mut ops = Vec::new();
    let mut visited = vec![false; model.bones.len()];

    for root in model.root_bones() {
        emit_bone(model, root, &mut visited, &mut ops);
    }
    // Bones unreachable from a root (broken parent links) still need a node.
    for idx in 0..model.bones.len() {
        if !visited[idx] {
            emit_bone(model, idx, &mut visited, &mut ops);
        }
    }
    ops
}

/// Depth-first walk from `root`, kept on an explicit stack of open joints
fn emit_bone(model: &Model, root: usize, visited: &mut [bool], ops: &mut Vec<GraphOp>) {
    if visited[root] {
        return;
    }
    open_joint(model, root, visited, ops);

    // (bone, next child to visit) for every joint still open
    let mut stack = vec![(root, 0usize)];
    while let Some(frame) = stack.last_mut() {
        let (idx, next) = *frame;
        frame.1 += 1;
        match model.bones[idx].children.get(next) {
            Some(&child) => {
                if child < visited.len() && !visited[child] {
                    open_joint(model, child, visited, ops);
                    stack.push((child, 0));
                }
            }
            None => {
                ops.push(GraphOp::Close);
                stack.pop();
            }
        }
    }
}

fn open_joint(model: &Model, idx: usize, visited: &mut [bool], ops: &mut Vec<GraphOp>) {
    visited[idx] = true;
    ops.push(GraphOp::Joint(idx as u16));
    ops.push(GraphOp::Open);
    for display in &model.bones[idx].displays {
        ops.extend_from_slice(&[
            GraphOp::Material(display.material as u16),
            GraphOp::Open,
            GraphOp::Shape(display.mesh as u16),
            GraphOp::Open,
            GraphOp::Close,
            GraphOp::Close,
        ]);
    }
}

pub(crate) fn write(writer: &mut Writer, model: &Model, slots: &[Option<usize>; BufferSlot::COUNT]) -> ParseResult<()> {
    let mut section = writer.open_section(b"INF1");
    let packet_count: usize = model.meshes.iter().map(|m| m.matrix_primitives.len()).sum();
    let vertex_count = slots[BufferSlot::Position.index()]
        .and_then(|i| model.vertex_buffers.get(i))
        .map_or(0, |b| b.len());

    section.write_u16(model.info.scaling_rule as u16);
    section.write_u16(0xFFFF);
    section.write_u32(packet_count as u32);
    section.write_u32(vertex_count as u32);
    section.write_u32(0x18);

    for op in build_graph(model) {
        let (code, index) = match op {
            GraphOp::Open => (OP_OPEN, 0),
            GraphOp::Close => (OP_CLOSE, 0),
            GraphOp::Joint(i) => (OP_JOINT, i),
            GraphOp::Material(i) => (OP_MATERIAL, i),
            GraphOp::Shape(i) => (OP_SHAPE, i),
        };
        section.write_u16(code);
        section.write_u16(index);
    }
    section.write_u16(OP_TERMINATE);
    section.write_u16(0);
    section.align_with(32, PADDING);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bone, Material, Mesh};

    fn two_bone_model() -> Model {
        let mut model = Model::new();
        let mut root = Bone::new("root");
        root.displays.push(Display { material: 0, mesh: 0, priority: 0 });
        model.add_bone(root);
        let mut arm = Bone::new("arm");
        arm.parent = Some(0);
        model.add_bone(arm);
        model.rebuild_children();
        model.materials.push(Material::new("mat"));
        model.meshes.push(Mesh::new("shape0"));
        model
    }

    #[test]
    fn test_build_graph_nests_children_and_displays() {
        let ops = build_graph(&two_bone_model());
        assert_eq!(
            ops,
            vec![
                GraphOp::Joint(0),
                GraphOp::Open,
                GraphOp::Material(0),
                GraphOp::Open,
                GraphOp::Shape(0),
                GraphOp::Open,
                GraphOp::Close,
                GraphOp::Close,
                GraphOp::Joint(1),
                GraphOp::Open,
                GraphOp::Close,
                GraphOp::Close,
            ]
        );
    }

    #[test]
    fn test_apply_graph_restores_hierarchy() {
        let source = two_bone_model();
        let ops = build_graph(&source);

        let mut model = source.clone();
        for bone in &mut model.bones {
            bone.parent = None;
            bone.children.clear();
            bone.displays.clear();
        }
        let mut tx = Transaction::new("graph");
        apply_graph(&ops, &mut model, &mut tx);

        assert!(tx.diagnostics().is_empty());
        assert_eq!(model.bones[1].parent, Some(0));
        assert_eq!(model.bones[0].children, vec![1]);
        assert_eq!(model.bones[0].displays, source.bones[0].displays);
    }

    #[test]
    fn test_apply_graph_reports_out_of_range_joint() {
        let mut model = Model::new();
        let mut tx = Transaction::new("graph");
        apply_graph(&[GraphOp::Joint(3), GraphOp::Open, GraphOp::Close], &mut model, &mut tx);
        assert_eq!(tx.in_domain("INF1").count(), 1);
    }

    #[test]
    fn test_deep_bone_chain_round_trips() {
        const DEPTH: usize = 10_000;
        let mut source = Model::new();
        for i in 0..DEPTH {
            let mut bone = Bone::new(format!("j{i}"));
            bone.parent = i.checked_sub(1);
            source.add_bone(bone);
        }
        source.rebuild_children();

        let ops = build_graph(&source);
        assert_eq!(ops.len(), DEPTH * 3);
        assert_eq!(ops[2 * DEPTH - 2], GraphOp::Joint((DEPTH - 1) as u16));
        assert!(ops[2 * DEPTH..].iter().all(|op| *op == GraphOp::Close));

        let mut model = source.clone();
        for bone in &mut model.bones {
            bone.parent = None;
            bone.children.clear();
        }
        let mut tx = Transaction::new("graph");
        apply_graph(&ops, &mut model, &mut tx);
        assert!(tx.diagnostics().is_empty());
        assert_eq!(model.bones, source.bones);
    }
}
