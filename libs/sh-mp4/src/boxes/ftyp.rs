use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use four_cc::FourCC;

use bytes::{BufMut, BytesMut};

use std::io::Write;
use std::mem::size_of;

use crate::{read_four_cc, BoxHeader, Mp4Box, Mp4BoxError, Mp4BoxRead};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTypeBox {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl FileTypeBox {
    pub fn new(major_brand: FourCC, minor_version: u32, compatible_brands: Vec<FourCC>) -> Self {
        FileTypeBox {
            major_brand,
            minor_version,
            compatible_brands,
        }
    }

    pub(crate) fn read_brands(data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        let major_brand = read_four_cc(data)?;
        let minor_version = data.read_u32::<BigEndian>()?;

        let mut compatible_brands = Vec::with_capacity(data.len() / 4);
        while data.len() >= 4 {
            compatible_brands.push(read_four_cc(data)?);
        }

        Ok(FileTypeBox::new(major_brand, minor_version, compatible_brands))
    }

    pub(crate) fn write_brands(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        let mut v = Vec::new();

        Write::write_all(&mut v, &self.major_brand.0)?;
        v.write_u32::<BigEndian>(self.minor_version)?;

        for brand in &self.compatible_brands {
            Write::write_all(&mut v, &brand.0)?;
        }

        writer.put_slice(&v);

        Ok(())
    }

    pub(crate) fn brands_size(&self) -> u64 {
        size_of::<u32>() as u64 + // major_brand
        size_of::<u32>() as u64 + // minor_version
        size_of::<u32>() as u64 * self.compatible_brands.len() as u64 // compatible_brands
    }
}

impl Mp4Box for FileTypeBox {
    const NAME: FourCC = FourCC(*b"ftyp");

    fn content_size(&self) -> u64 {
        self.brands_size()
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<(), Mp4BoxError> {
        self.write_brands(writer)
    }
}

impl Mp4BoxRead for FileTypeBox {
    fn read_box_contents(_header: &BoxHeader, data: &mut &[u8]) -> Result<Self, Mp4BoxError> {
        FileTypeBox::read_brands(data)
    }
}
