//! Model fixtures shared by the container tests

#![allow(dead_code)]

use gxcodec_core::Vec3;
use gxcodec_parsers::gx::{
    BufferSlot, IndexedPrimitive, IndexedVertex, MatrixPrimitive, PrimitiveType, VertexAttribute,
    VertexAttributeType, VertexDescriptor,
};
use gxcodec_parsers::model::{
    Bone, Display, DrawMatrix, Influence, Material, Mesh, Model, Sampler, VertexArray, VertexBuffer, VertexFormat,
};
use gxcodec_parsers::{Texture, TextureFormat};

fn triangle(attributes: &[VertexAttribute]) -> IndexedPrimitive {
    let mut prim = IndexedPrimitive::new(PrimitiveType::Triangles);
    for i in 0..3 {
        let mut vertex = IndexedVertex::new();
        for &attribute in attributes {
            vertex.set(attribute, i);
        }
        prim.vertices.push(vertex);
    }
    prim
}

/// One bone drawing one triangle with one material
pub fn triangle_model() -> Model {
    let mut model = Model::new();
    model.info.name = "tri".into();
    let mut bone = Bone::new("root");
    bone.displays.push(Display { material: 0, mesh: 0, priority: 0 });
    model.add_bone(bone);
    model.materials.push(Material::new("mat"));
    model.draw_matrices.push(DrawMatrix::rigid(0));
    model.vertex_buffers.push(VertexBuffer::new(
        "positions",
        VertexFormat::float(1),
        VertexArray::Positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
    ));

    let mut mesh = Mesh::new("triangle");
    mesh.descriptor = VertexDescriptor::new().with(VertexAttribute::Position, VertexAttributeType::Short);
    mesh.bind_buffer(BufferSlot::Position, "positions");
    let mut mp = MatrixPrimitive::new(0);
    mp.draw_matrices.push(0);
    mp.primitives.push(triangle(&[VertexAttribute::Position]));
    mesh.matrix_primitives.push(mp);
    model.meshes.push(mesh);
    model
}

/// Two bones, an envelope, a translucent material and a sampled texture
pub fn skinned_model() -> Model {
    let mut model = Model::new();
    model.info.name = "body".into();

    let mut root = Bone::new("body");
    root.displays.push(Display { material: 0, mesh: 0, priority: 0 });
    model.add_bone(root);
    let mut arm = Bone::new("arm");
    arm.parent = Some(0);
    arm.matrix_id = 1;
    arm.translation = Vec3::new(0.0, 2.0, 0.0);
    arm.rotation = Vec3::new(0.0, 0.0, 45.0);
    arm.displays.push(Display { material: 1, mesh: 0, priority: 1 });
    model.add_bone(arm);

    model.draw_matrices = vec![
        DrawMatrix::rigid(0),
        DrawMatrix::rigid(1),
        DrawMatrix {
            influences: vec![Influence { bone: 0, weight: 0.5 }, Influence { bone: 1, weight: 0.5 }],
        },
    ];

    let mut skin = Material::new("body");
    skin.samplers.push(Sampler::new("checker"));
    let mut glass = Material::new("glass");
    glass.translucent = true;
    model.materials = vec![skin, glass];

    model.textures.push(
        Texture::new("checker", TextureFormat::I8, 8, 4, 1, (0..32).collect()).expect("fixture texture"),
    );

    model.vertex_buffers = vec![
        VertexBuffer::new(
            "positions",
            VertexFormat::float(1),
            VertexArray::Positions(vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]]),
        ),
        VertexBuffer::new(
            "normals",
            VertexFormat::float(0),
            VertexArray::Normals(vec![[0.0, 0.0, 1.0]; 4]),
        ),
        VertexBuffer::new(
            "uvs",
            VertexFormat::float(1),
            VertexArray::TexCoords(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]]),
        ),
    ];

    let attributes = [VertexAttribute::Position, VertexAttribute::Normal, VertexAttribute::TexCoord0];
    let mut mesh = Mesh::new("body");
    mesh.descriptor = VertexDescriptor::new()
        .with(VertexAttribute::PositionNormalMatrixIndex, VertexAttributeType::Direct)
        .with(VertexAttribute::Position, VertexAttributeType::Short)
        .with(VertexAttribute::Normal, VertexAttributeType::Byte)
        .with(VertexAttribute::TexCoord0, VertexAttributeType::Byte);
    mesh.bind_buffer(BufferSlot::Position, "positions");
    mesh.bind_buffer(BufferSlot::Normal, "normals");
    mesh.bind_buffer(BufferSlot::TexCoord(0), "uvs");

    let mut mp = MatrixPrimitive::new(-1);
    mp.draw_matrices.extend([0, 1, 2]);
    let mut strip = IndexedPrimitive::new(PrimitiveType::TriangleStrip);
    for i in 0..4u16 {
        let mut vertex = IndexedVertex::new().with(VertexAttribute::PositionNormalMatrixIndex, (i % 3) * 3);
        for attribute in attributes {
            vertex.set(attribute, i);
        }
        strip.vertices.push(vertex);
    }
    mp.primitives.push(strip);
    mp.primitives.push(triangle(&attributes));
    mesh.matrix_primitives.push(mp);
    model.meshes.push(mesh);
    model
}

pub fn be_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}
