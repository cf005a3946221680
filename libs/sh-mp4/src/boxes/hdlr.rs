use byteorder::{BigEndian, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use crate::{read_four_cc, skip_bytes, BoxHeader, FullBoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

use std::io::Write;
use std::mem::size_of;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerBox {
    pub handler_type: FourCC,
    pub name: String,
}

impl Mp4Box for HandlerBox {
    const NAME: FourCC = FourCC(*b"hdlr");

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        Some(FullBoxHeader::new(0, 0))
    }

    fn content_size(&self) -> u64 {
        size_of::<u32>() as u64 + // pre_defined
        size_of::<u32>() as u64 + // handler_type
        size_of::<u32>() as u64 * 3 + // reserved
        self.name.as_bytes().len() as u64 + // name
        1
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        v.write_u32::<BigEndian>(0)?;
        Write::write_all(&mut v, &self.handler_type.0)?;
        v.write_u32::<BigEndian>(0)?;
        v.write_u32::<BigEndian>(0)?;
        v.write_u32::<BigEndian>(0)?;
        v.extend(self.name.as_bytes());
        v.push(0);

        assert_eq!(v.len() as u64, self.content_size());

        writer.put_slice(&v);

        Ok(())
    }
}

impl Mp4BoxRead for HandlerBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let _ = FullBoxHeader::read(data)?;

        skip_bytes(data, 4)?;
        let handler_type = read_four_cc(data)?;
        skip_bytes(data, 12)?;

        // QuickTime writers store a counted string without the terminator
        let name = data.split(|&b| b == 0).next().unwrap_or_default();
        let name = String::from_utf8_lossy(name).into_owned();
        *data = &[];

        Ok(HandlerBox { handler_type, name })
    }
}
