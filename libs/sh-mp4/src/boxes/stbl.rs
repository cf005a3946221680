use four_cc::FourCC;

use bytes::BytesMut;

use crate::{read_body, BoxHeader, BoxIter, Mp4Box, Mp4BoxError, Mp4BoxRead, SampleTable};

use super::{ChunkLargeOffsetBox, ChunkOffsetBox, SampleDescriptionBox};

/// `stco` or `co64`, whichever the offsets need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOffsets {
    Stco(ChunkOffsetBox),
    Co64(ChunkLargeOffsetBox),
}

impl Default for ChunkOffsets {
    fn default() -> Self {
        ChunkOffsets::Stco(ChunkOffsetBox::default())
    }
}

impl ChunkOffsets {
    pub fn from_offsets(offsets: Vec<u64>) -> Self {
        if offsets.iter().any(|&offset| offset > u32::MAX as u64) {
            ChunkOffsets::Co64(ChunkLargeOffsetBox {
                chunk_offsets: offsets,
            })
        } else {
            ChunkOffsets::Stco(ChunkOffsetBox {
                chunk_offsets: offsets.into_iter().map(|offset| offset as u32).collect(),
            })
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ChunkOffsets::Stco(stco) => stco.chunk_offsets.len(),
            ChunkOffsets::Co64(co64) => co64.chunk_offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<u64> {
        match self {
            ChunkOffsets::Stco(stco) => stco.chunk_offsets.get(index).map(|&o| o as u64),
            ChunkOffsets::Co64(co64) => co64.chunk_offsets.get(index).copied(),
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            ChunkOffsets::Stco(stco) => stco.size(),
            ChunkOffsets::Co64(co64) => co64.size(),
        }
    }

    pub fn write(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        match self {
            ChunkOffsets::Stco(stco) => stco.write(writer),
            ChunkOffsets::Co64(co64) => co64.write(writer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleTableBox {
    pub stsd: SampleDescriptionBox,
    pub table: SampleTable,
}

impl Mp4Box for SampleTableBox {
    const NAME: FourCC = FourCC(*b"stbl");

    fn content_size(&self) -> u64 {
        let table = &self.table;

        let mut size = self.stsd.size() + table.stts.size();

        if let Some(ctts) = &table.ctts {
            size += ctts.size();
        }

        size += table.stsc.size() + table.stsz.size() + table.chunk_offsets.size();

        if let Some(stss) = &table.stss {
            size += stss.size();
        }

        size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let table = &self.table;

        self.stsd.write(writer)?;
        table.stts.write(writer)?;

        if let Some(ctts) = &table.ctts {
            ctts.write(writer)?;
        }

        table.stsc.write(writer)?;
        table.stsz.write(writer)?;
        table.chunk_offsets.write(writer)?;

        if let Some(stss) = &table.stss {
            stss.write(writer)?;
        }

        Ok(())
    }
}

impl Mp4BoxRead for SampleTableBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let mut stsd = None;
        let mut table = SampleTable::default();

        for child in BoxIter::new(*data) {
            let (header, body) = child?;

            match &header.name.0 {
                b"stsd" => stsd = Some(read_body(&header, body)?),
                b"stts" => table.stts = read_body(&header, body)?,
                b"ctts" => table.ctts = Some(read_body(&header, body)?),
                b"stsc" => table.stsc = read_body(&header, body)?,
                b"stsz" => table.stsz = read_body(&header, body)?,
                b"stco" => table.chunk_offsets = ChunkOffsets::Stco(read_body(&header, body)?),
                b"co64" => table.chunk_offsets = ChunkOffsets::Co64(read_body(&header, body)?),
                b"stss" => table.stss = Some(read_body(&header, body)?),
                _ => {}
            }
        }
        *data = &[];

        let stsd = stsd.ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing stsd"))?;

        Ok(SampleTableBox { stsd, table })
    }
}
