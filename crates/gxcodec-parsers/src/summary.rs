//! Human-readable reports for models and transactions

use std::fmt::Write;

use serde_json::json;

use crate::diagnostics::Transaction;
use crate::model::Model;
use crate::traits::HumanReadable;

impl HumanReadable for Model {
    fn to_readable_string(&self) -> String {
        let mut out = String::new();
        let bounds = self.bounds();
        let name = if self.info.name.is_empty() { "<unnamed>" } else { self.info.name.as_str() };
        let _ = writeln!(out, "Model: {name}");
        let _ = writeln!(
            out,
            "  Profile: {:?} / {:?}, scaling {:?}",
            self.info.profile.endian, self.info.profile.family, self.info.scaling_rule
        );
        let _ = writeln!(out, "  Vertices: {}  Triangles: {}", self.vertex_count(), self.triangle_count());
        let _ = writeln!(
            out,
            "  Bounds: ({:.3}, {:.3}, {:.3}) .. ({:.3}, {:.3}, {:.3})",
            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
        );

        let _ = writeln!(out, "  Bones ({}):", self.bones.len());
        for root in self.root_bones() {
            write_bone_tree(&mut out, self, root, 2);
        }

        let _ = writeln!(out, "  Meshes ({}):", self.meshes.len());
        for mesh in &self.meshes {
            let _ = writeln!(
                out,
                "    {} ({:?}, {} matrix primitives, {} vertices)",
                mesh.name,
                mesh.mode,
                mesh.matrix_primitives.len(),
                mesh.vertex_count()
            );
        }

        let _ = writeln!(out, "  Materials ({}):", self.materials.len());
        for material in &self.materials {
            let pass = if material.translucent { "translucent" } else { "opaque" };
            let _ = writeln!(out, "    {} ({pass}, {} samplers)", material.name, material.samplers.len());
        }

        let _ = writeln!(out, "  Vertex buffers ({}):", self.vertex_buffers.len());
        for buffer in &self.vertex_buffers {
            let _ = writeln!(out, "    {} ({:?} x{}, {:?})", buffer.name, buffer.kind(), buffer.len(), buffer.format);
        }

        let _ = writeln!(out, "  Textures ({}):", self.textures.len());
        for texture in &self.textures {
            let _ = writeln!(
                out,
                "    {} ({:?} {}x{}, {} images)",
                texture.name, texture.format, texture.width, texture.height, texture.image_count
            );
        }
        let envelopes = self.draw_matrices.iter().filter(|m| m.is_envelope()).count();
        let _ = writeln!(out, "  Draw matrices: {} ({envelopes} envelopes)", self.draw_matrices.len());
        out
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "name": self.info.name,
            "endian": format!("{:?}", self.info.profile.endian),
            "family": format!("{:?}", self.info.profile.family),
            "scaling_rule": format!("{:?}", self.info.scaling_rule),
            "vertex_count": self.vertex_count(),
            "triangle_count": self.triangle_count(),
            "bones": self.bones.iter().map(|b| json!({
                "name": b.name,
                "parent": b.parent.and_then(|p| self.bones.get(p)).map(|p| p.name.as_str()),
                "matrix_id": b.matrix_id,
                "displays": b.displays.len(),
            })).collect::<Vec<_>>(),
            "meshes": self.meshes.iter().map(|m| json!({
                "name": m.name,
                "primitives": m.matrix_primitives.len(),
                "vertices": m.vertex_count(),
                "triangles": m.triangle_count(),
            })).collect::<Vec<_>>(),
            "materials": self.materials.iter().map(|m| json!({
                "name": m.name,
                "translucent": m.translucent,
                "textures": m.samplers.iter().map(|s| s.texture.as_str()).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
            "vertex_buffers": self.vertex_buffers.iter().map(|b| json!({
                "name": b.name,
                "kind": format!("{:?}", b.kind()),
                "elements": b.len(),
            })).collect::<Vec<_>>(),
            "textures": serde_json::to_value(&self.textures).unwrap_or_default(),
            "draw_matrices": self.draw_matrices.len(),
        })
    }
}

fn write_bone_tree(out: &mut String, model: &Model, bone: usize, depth: usize) {
    let b = &model.bones[bone];
    let _ = writeln!(out, "{:indent$}{} (matrix {})", "", b.name, b.matrix_id, indent = depth * 2);
    for &child in &b.children {
        write_bone_tree(out, model, child, depth + 1);
    }
}

impl HumanReadable for Transaction {
    fn to_readable_string(&self) -> String {
        let mut out = format!("{}: {:?}\n", self.path(), self.state());
        for diagnostic in self.diagnostics() {
            let _ = writeln!(out, "  {diagnostic}");
        }
        out
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bone;

    #[test]
    fn test_model_summary() {
        let mut model = Model::new();
        model.info.name = "stage".into();
        model.add_bone(Bone::new("root"));
        let mut child = Bone::new("arm");
        child.parent = Some(0);
        model.add_bone(child);

        let text = model.to_readable_string();
        assert!(text.starts_with("Model: stage"));
        assert!(text.contains("      arm (matrix 0)"));

        let json = model.to_json();
        assert_eq!(json["bones"][1]["parent"], "root");
        assert!(model.to_yaml().contains("name: stage"));
    }

    #[test]
    fn test_transaction_summary() {
        let mut tx = Transaction::new("a.bmd");
        tx.warn("JNT1", "joint compression");
        let text = tx.to_readable_string();
        assert!(text.starts_with("a.bmd: Complete"));
        assert!(text.contains("JNT1"));
    }
}
