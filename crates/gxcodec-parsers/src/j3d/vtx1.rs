//! VTX1: vertex formats and arrays

use tracing::{debug, warn};

use super::{slot_buffer_name, SectionHeader, PADDING};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::gx::{BufferSlot, VertexAttribute, VertexUsage};
use crate::model::{read_vertex_array, write_vertex_array, BufferKind, Model, VertexBuffer, VertexFormat};
use crate::traits::{ParseError, ParseResult};

/// Array offsets stored in the header: pos, nrm, nbt, clr0-1, tex0-7
const ARRAY_COUNT: usize = 13;
const FORMAT_LIST_OFFSET: u32 = 0x40;
const FORMAT_END: u32 = 0xFF;

fn array_index(slot: BufferSlot) -> usize {
    match slot {
        BufferSlot::Position => 0,
        BufferSlot::Normal => 1,
        BufferSlot::Color(i) => 3 + i as usize,
        BufferSlot::TexCoord(i) => 5 + i as usize,
    }
}

pub(crate) fn read(
    reader: &mut Reader<'_>,
    section: &SectionHeader,
    tx: &mut Transaction,
) -> ParseResult<Vec<(BufferSlot, VertexBuffer)>> {
    let format_offset = reader.read_u32()?;
    let mut offsets = [0u32; ARRAY_COUNT];
    for offset in &mut offsets {
        *offset = reader.read_u32()?;
    }

    reader.seek(section.at(format_offset))?;
    let mut formats = Vec::new();
    loop {
        let attr = reader.read_u32()?;
        let count = reader.read_u32()?;
        let ty = reader.read_u32()?;
        let shift = reader.read_u8()?;
        reader.skip(3)?;
        if attr == FORMAT_END {
            break;
        }
        formats.push((attr, count, ty, shift));
    }

    let mut buffers = Vec::new();
    for (attr, count, ty, shift) in formats {
        let Some(slot) = VertexAttribute::from_u32(attr).and_then(VertexAttribute::buffer_slot) else {
            tx.warn("VTX1", format!("skipping arrays for unsupported attribute {attr}"));
            continue;
        };
        let kind = BufferKind::for_slot(slot);
        let start = offsets[array_index(slot)];
        if start == 0 {
            tx.warn("VTX1", format!("{slot:?} has a format but no array"));
            continue;
        }

        // The element count is implied by the distance to the next array.
        let end = offsets
            .iter()
            .copied()
            .filter(|&o| o > start)
            .min()
            .map_or(section.size, |o| o as usize);

        let parsed = VertexFormat::from_raw(kind, count, ty, shift).and_then(|format| {
            let stride = format.stride(kind)?;
            let elements = end.saturating_sub(start as usize) / stride;
            reader.seek(section.at(start))?;
            let data = read_vertex_array(reader, kind, format, elements)?;
            Ok(VertexBuffer::new(slot_buffer_name(slot), format, data))
        });
        match parsed {
            Ok(buffer) => {
                debug!(slot = ?slot, elements = buffer.len(), "Read vertex array");
                buffers.push((slot, buffer));
            }
            Err(e) => tx.error("VTX1", format!("{slot:?}: {e}")),
        }
    }

    // Arrays are read greedily; account for the whole section.
    reader.seek(section.end())?;
    Ok(buffers)
}

/// Shrink each buffer to the highest index the display lists reference
pub(crate) fn trim(model: &mut Model, slots: &[Option<usize>; BufferSlot::COUNT], usage: &VertexUsage, tx: &mut Transaction) {
    for (slot_index, buffer_index) in slots.iter().enumerate() {
        let (Some(slot), Some(buffer_index)) = (BufferSlot::from_index(slot_index), *buffer_index) else {
            continue;
        };
        let Some(buffer) = model.vertex_buffers.get_mut(buffer_index) else {
            continue;
        };
        match usage.max_index(slot.attribute()) {
            Some(max) if usize::from(max) < buffer.len() => buffer.data.truncate(usize::from(max) + 1),
            Some(max) => tx.warn(
                "VTX1",
                format!("index {max} is past the {} elements of `{}`", buffer.len(), buffer.name),
            ),
            None => {}
        }
    }
}

/// Map every buffer slot to the model buffer stored there
///
/// Slots come from mesh bindings first. Buffers no mesh binds take the
/// first free slot of their kind.
pub fn assign_slots(model: &Model) -> ParseResult<[Option<usize>; BufferSlot::COUNT]> {
    let mut slots: [Option<usize>; BufferSlot::COUNT] = [None; BufferSlot::COUNT];

    for mesh in &model.meshes {
        for slot in mesh.used_slots() {
            let Some(name) = mesh.buffer(slot) else {
                return Err(ParseError::invalid(format!("mesh `{}` has no buffer for {slot:?}", mesh.name)));
            };
            let index = model
                .vertex_buffers
                .iter()
                .position(|b| b.name == name)
                .ok_or_else(|| ParseError::invalid(format!("mesh `{}` references missing buffer `{name}`", mesh.name)))?;
            match slots[slot.index()] {
                Some(existing) if existing != index => {
                    return Err(ParseError::invalid(format!(
                        "buffers `{}` and `{name}` both need the {slot:?} slot",
                        model.vertex_buffers[existing].name
                    )));
                }
                _ => slots[slot.index()] = Some(index),
            }
        }
    }

    for (index, buffer) in model.vertex_buffers.iter().enumerate() {
        if slots.contains(&Some(index)) {
            continue;
        }
        let free = (0..BufferSlot::COUNT)
            .filter_map(BufferSlot::from_index)
            .find(|&slot| BufferKind::for_slot(slot) == buffer.kind() && slots[slot.index()].is_none());
        match free {
            Some(slot) => slots[slot.index()] = Some(index),
            None => warn!(buffer = %buffer.name, "No free slot, buffer dropped"),
        }
    }
    Ok(slots)
}

pub(crate) fn write(writer: &mut Writer, model: &Model, slots: &[Option<usize>; BufferSlot::COUNT]) -> ParseResult<()> {
    let mut section = writer.open_section(b"VTX1");
    let base = section.start();

    let mut stored: Vec<(BufferSlot, &VertexBuffer)> = Vec::new();
    for (slot_index, buffer_index) in slots.iter().enumerate() {
        if let (Some(slot), Some(buffer)) = (
            BufferSlot::from_index(slot_index),
            buffer_index.and_then(|i| model.vertex_buffers.get(i)),
        ) {
            stored.push((slot, buffer));
        }
    }

    section.write_u32(FORMAT_LIST_OFFSET);
    for array in 0..ARRAY_COUNT {
        if stored.iter().any(|(slot, _)| array_index(*slot) == array) {
            section.write_offset(base, format!("VTX1.array{array}"), LinkWidth::I32);
        } else {
            section.write_u32(0);
        }
    }

    debug_assert_eq!(section.position() - base, FORMAT_LIST_OFFSET as usize);
    for (slot, buffer) in &stored {
        let (count, ty, shift) = buffer.format.to_raw();
        section.write_u32(slot.attribute() as u32);
        section.write_u32(count);
        section.write_u32(ty);
        section.write_u8(shift);
        section.write_bytes(&[0xFF; 3]);
    }
    section.write_u32(FORMAT_END);
    section.write_u32(0);
    section.write_u32(0);
    section.write_u8(0);
    section.write_bytes(&[0xFF; 3]);

    for (slot, buffer) in &stored {
        section.align(32);
        section.label(format!("VTX1.array{}", array_index(*slot)));
        write_vertex_array(&mut section, buffer)?;
    }
    section.align_with(32, PADDING);
    Ok(())
}
