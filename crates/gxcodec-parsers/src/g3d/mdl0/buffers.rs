//! Vertex buffer records: a 0x20-byte header followed by 32-byte aligned data

use super::{kind_index, write_record_prefix, Section};
use crate::binary::{LinkWidth, Reader, Writer};
use crate::model::{read_vertex_array, write_vertex_array, BufferKind, Model, VertexBuffer, VertexFormat};
use crate::names::{read_name, NameTable};
use crate::traits::{ParseError, ParseResult};

pub(crate) fn read(reader: &mut Reader<'_>, record: usize, kind: BufferKind) -> ParseResult<(u32, VertexBuffer)> {
    reader.seek(record)?;
    let _size = reader.read_u32()?;
    let _mdl0 = reader.read_i32()?;
    let data = reader.read_i32()?;
    let name = read_name(reader, record)?;
    let id = reader.read_u32()?;
    let count = reader.read_u32()?;
    let ty = reader.read_u32()?;
    let shift = reader.read_u8()?;
    let stride = usize::from(reader.read_u8()?);
    let elements = usize::from(reader.read_u16()?);

    let format = VertexFormat::from_raw(kind, count, ty, shift)?;
    let expected = format.stride(kind)?;
    if stride != expected {
        return Err(ParseError::invalid(format!(
            "buffer `{name}` declares stride {stride}, its format needs {expected}"
        )));
    }
    let data_at = reader.relative(record, data.into())?;
    reader.seek(data_at)?;
    let data = read_vertex_array(reader, kind, format, elements)?;
    Ok((id, VertexBuffer::new(name, format, data)))
}

pub(crate) fn write(writer: &mut Writer, model: &Model, mdl0: usize, names: &mut NameTable) -> ParseResult<()> {
    let mut next_id = [0usize; 4];
    for buffer in &model.vertex_buffers {
        let kind = buffer.kind();
        let id = &mut next_id[kind_index(kind)];
        let entry = Section::for_kind(kind).entry_label(*id);
        let elements = u16::try_from(buffer.len())
            .map_err(|_| ParseError::invalid(format!("buffer `{}` holds {} elements", buffer.name, buffer.len())))?;
        let stride = u8::try_from(buffer.stride()?)
            .map_err(|_| ParseError::invalid(format!("buffer `{}` has an oversized stride", buffer.name)))?;
        let (count, ty, shift) = buffer.format.to_raw();

        writer.align(32);
        writer.label(&entry);
        let mut record = writer.open_region(0);
        let base = record.start();
        write_record_prefix(&mut record, 0, mdl0);
        record.write_offset(base, format!("{entry}.data"), LinkWidth::I32);
        names.reference(&mut record, &buffer.name, base);
        record.write_u32(*id as u32);
        record.write_u32(count);
        record.write_u32(ty);
        record.write_u8(shift);
        record.write_u8(stride);
        record.write_u16(elements);
        record.align(32);
        record.label(format!("{entry}.data"));
        write_vertex_array(&mut record, buffer)?;
        record.align(32);
        *id += 1;
    }
    Ok(())
}
