use std::io::{self, Read};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use bytes::{BufMut, BytesMut};
pub use four_cc::FourCC;

mod boxes;
mod codec;
mod demux;
mod error;
mod fragment;
mod mux;
mod sample_table;
mod track;

pub use boxes::*;
pub use codec::*;
pub use demux::*;
pub use error::*;
pub use fragment::{
    Fragment, FragmentInfo, FragmentTrackInfo, SAMPLE_FLAGS_DEPENDS_NO, SAMPLE_FLAGS_DEPENDS_YES,
    SAMPLE_FLAGS_IS_NON_SYNC,
};
pub use mux::*;
pub use sample_table::*;
pub use track::*;

/// Leaf boxes larger than this are treated as corrupt instead of being
/// buffered in memory.
pub(crate) const MAX_BUFFERED_BOX_SIZE: u64 = 256 * 1024 * 1024;

const UUID: FourCC = FourCC(*b"uuid");

/// The basic length-prefixed header that starts every box.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BoxHeader {
    pub name: FourCC,
    /// Total box size including this header. Zero means the box extends to
    /// the end of the stream.
    pub size: u64,
    /// Number of bytes the header occupies on the wire.
    pub header_size: u64,
    pub user_type: Option<[u8; 16]>,
}

impl BoxHeader {
    pub const SIZE: u64 = 8;
    pub const LARGE_SIZE: u64 = 16;

    /// Creates a header for a box with `content_size` bytes following the
    /// header, switching to the 64-bit form when the total does not fit 32 bits.
    pub fn new(name: FourCC, content_size: u64) -> Self {
        Self::with_user_type(name, None, content_size)
    }

    pub fn with_user_type(name: FourCC, user_type: Option<[u8; 16]>, content_size: u64) -> Self {
        let extended = if user_type.is_some() { 16 } else { 0 };

        let mut header_size = Self::SIZE + extended;
        if content_size + header_size > u32::MAX as u64 {
            header_size = Self::LARGE_SIZE + extended;
        }

        BoxHeader {
            name,
            size: content_size + header_size,
            header_size,
            user_type,
        }
    }

    pub fn is_large(&self) -> bool {
        let extended = if self.user_type.is_some() { 16 } else { 0 };

        self.header_size - extended == Self::LARGE_SIZE
    }

    pub fn content_size(&self) -> u64 {
        self.size.saturating_sub(self.header_size)
    }

    /// Reads a box header. Returns `None` when the stream ends exactly at a
    /// box boundary.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Option<BoxHeader>> {
        let mut header = [0u8; 8];
        if !read_or_eof(reader, &mut header)? {
            return Ok(None);
        }

        let name = FourCC([header[4], header[5], header[6], header[7]]);
        let mut size = BigEndian::read_u32(&header[..]) as u64;
        let mut header_size = Self::SIZE;

        if size == 1 {
            size = reader.read_u64::<BigEndian>()?;
            header_size = Self::LARGE_SIZE;
        }

        let user_type = if name == UUID {
            let mut user_type = [0u8; 16];
            reader.read_exact(&mut user_type)?;
            header_size += 16;

            Some(user_type)
        } else {
            None
        };

        if size != 0 && size < header_size {
            return Err(Mp4BoxError::corrupt(
                name,
                format!("size {} is smaller than its {} byte header", size, header_size),
            ));
        }

        Ok(Some(BoxHeader {
            name,
            size,
            header_size,
            user_type,
        }))
    }

    pub fn write(&self, writer: &mut BytesMut) {
        if self.is_large() {
            writer.put_u32(1);
            writer.put_slice(&self.name.0);
            writer.put_u64(self.size);
        } else {
            writer.put_u32(self.size as u32);
            writer.put_slice(&self.name.0);
        }

        if let Some(user_type) = &self.user_type {
            writer.put_slice(user_type);
        }
    }
}

/// Fills `buf` completely, or returns `false` if the reader was already at
/// its end. A partially filled buffer is an I/O error.
fn read_or_eof<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(true)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32,
}

impl FullBoxHeader {
    pub const SIZE: u64 = 4;

    pub fn new(version: u8, flags: u32) -> Self {
        FullBoxHeader { version, flags }
    }

    pub fn read(data: &mut &[u8]) -> Result<Self> {
        let word = data.read_u32::<BigEndian>()?;

        Ok(FullBoxHeader {
            version: (word >> 24) as u8,
            flags: word & 0x00ff_ffff,
        })
    }

    fn write(&self, writer: &mut BytesMut) {
        writer.put_u8(self.version);
        writer.put_uint(self.flags as u64, 3);
    }
}

/// A trait interface for a MP4 box.
pub trait Mp4Box {
    const NAME: FourCC;

    /// The type written in the box header. Only differs from `NAME` for
    /// boxes that share a layout across several types, like sample entries.
    fn box_type(&self) -> FourCC {
        Self::NAME
    }

    fn user_type(&self) -> Option<[u8; 16]> {
        None
    }

    fn get_full_box_header(&self) -> Option<FullBoxHeader> {
        None
    }

    fn flags(&self) -> Option<u32> {
        self.get_full_box_header().map(|h| h.flags)
    }

    /// The size of the contents of the box.
    fn content_size(&self) -> u64;

    fn header(&self) -> BoxHeader {
        let mut size = self.content_size();
        if self.get_full_box_header().is_some() {
            size += FullBoxHeader::SIZE;
        }

        BoxHeader::with_user_type(self.box_type(), self.user_type(), size)
    }

    fn size(&self) -> u64 {
        self.header().size
    }

    fn write_box_contents(&self, writer: &mut BytesMut) -> Result<()>;

    fn write(&self, writer: &mut BytesMut) -> Result<()> {
        self.header().write(writer);

        if let Some(full_box_header) = self.get_full_box_header() {
            full_box_header.write(writer);
        }

        let start = writer.len();
        self.write_box_contents(writer)?;

        debug_assert_eq!(
            (writer.len() - start) as u64,
            self.content_size(),
            "{:?} wrote a different size than it computed",
            self.box_type()
        );

        Ok(())
    }

    fn to_bytes(&self) -> Result<BytesMut> {
        let mut writer = BytesMut::with_capacity(self.size() as usize);
        self.write(&mut writer)?;

        Ok(writer)
    }
}

/// Decoding side of a box codec.
pub trait Mp4BoxRead: Mp4Box + Sized {
    /// Decodes the box body. `data` starts right after the basic header, so
    /// full boxes read their own version and flags.
    fn read_box_contents(header: &BoxHeader, data: &mut &[u8]) -> Result<Self>;

    /// Decodes a complete box, header included.
    fn read(data: &[u8]) -> Result<Self> {
        let mut cursor = data;
        let header = BoxHeader::read(&mut cursor)?
            .ok_or_else(|| Mp4BoxError::corrupt(Self::NAME, "missing box header"))?;

        let body = box_body(&header, cursor)?;

        read_body(&header, body)
    }
}

pub(crate) fn read_body<B: Mp4BoxRead>(header: &BoxHeader, mut body: &[u8]) -> Result<B> {
    B::read_box_contents(header, &mut body).map_err(|e| e.in_box(header.name))
}

/// Slices the body of a box out of `data`, which starts right after the
/// header.
pub(crate) fn box_body<'a>(header: &BoxHeader, data: &'a [u8]) -> Result<&'a [u8]> {
    if header.size == 0 {
        return Ok(data);
    }

    let len = header.content_size();
    if len > data.len() as u64 {
        return Err(Mp4BoxError::corrupt(
            header.name,
            format!("declares {} content bytes but only {} remain", len, data.len()),
        ));
    }

    Ok(&data[..len as usize])
}

pub(crate) fn read_bytes(data: &mut &[u8], len: usize) -> Result<Vec<u8>> {
    if data.len() < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    let (head, tail) = data.split_at(len);
    *data = tail;

    Ok(head.to_vec())
}

pub(crate) fn read_array<const N: usize>(data: &mut &[u8]) -> Result<[u8; N]> {
    let mut array = [0u8; N];
    data.read_exact(&mut array)?;

    Ok(array)
}

pub(crate) fn read_four_cc(data: &mut &[u8]) -> Result<FourCC> {
    Ok(FourCC(read_array::<4>(data)?))
}

pub(crate) fn skip_bytes(data: &mut &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }

    *data = &data[len..];

    Ok(())
}

/// Iterates the child boxes packed into an in-memory box body.
pub(crate) struct BoxIter<'a> {
    data: &'a [u8],
}

impl<'a> BoxIter<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        BoxIter { data }
    }
}

impl<'a> Iterator for BoxIter<'a> {
    type Item = Result<(BoxHeader, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }

        let mut cursor = self.data;
        let header = match BoxHeader::read(&mut cursor) {
            Ok(Some(header)) => header,
            Ok(None) => return None,
            Err(e) => {
                self.data = &[];
                return Some(Err(e));
            }
        };

        match box_body(&header, cursor) {
            Ok(body) => {
                self.data = &cursor[body.len()..];
                Some(Ok((header, body)))
            }
            Err(e) => {
                self.data = &[];
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_header_round_trip() {
        let header = BoxHeader::new(FourCC(*b"free"), 4);
        assert_eq!(header.size, 12);
        assert_eq!(header.header_size, 8);

        let mut bytes = BytesMut::new();
        header.write(&mut bytes);
        assert_eq!(&bytes[..], &[0, 0, 0, 12, b'f', b'r', b'e', b'e']);

        let decoded = BoxHeader::read(&mut &bytes[..]).unwrap().unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn large_header_is_chosen_above_32_bits() {
        let header = BoxHeader::new(FourCC(*b"mdat"), u32::MAX as u64);
        assert!(header.is_large());
        assert_eq!(header.header_size, 16);
        assert_eq!(header.size, u32::MAX as u64 + 16);

        let mut bytes = BytesMut::new();
        header.write(&mut bytes);
        assert_eq!(bytes.len(), 16);
        assert_eq!(BigEndian::read_u32(&bytes[..]), 1);
        assert_eq!(BigEndian::read_u64(&bytes[8..]), u32::MAX as u64 + 16);

        let decoded = BoxHeader::read(&mut &bytes[..]).unwrap().unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.content_size(), u32::MAX as u64);
    }

    #[test]
    fn uuid_header_carries_user_type() {
        let user_type = *b"0123456789abcdef";
        let header = BoxHeader::with_user_type(UUID, Some(user_type), 3);
        assert_eq!(header.size, 27);

        let mut bytes = BytesMut::new();
        header.write(&mut bytes);
        assert_eq!(bytes.len(), 24);

        let decoded = BoxHeader::read(&mut &bytes[..]).unwrap().unwrap();
        assert_eq!(decoded.user_type, Some(user_type));
        assert_eq!(decoded.header_size, 24);
        assert_eq!(decoded.content_size(), 3);
    }

    #[test]
    fn undersized_box_is_corrupt() {
        let bytes = [0, 0, 0, 4, b'f', b'r', b'e', b'e'];
        let err = BoxHeader::read(&mut &bytes[..]).unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn short_header_is_io_error() {
        let bytes = [0, 0, 0];
        let err = BoxHeader::read(&mut &bytes[..]).unwrap_err();
        assert!(matches!(err, Mp4BoxError::IoError(_)));
    }

    #[test]
    fn empty_stream_has_no_header() {
        let bytes: [u8; 0] = [];
        assert!(BoxHeader::read(&mut &bytes[..]).unwrap().is_none());
    }

    #[test]
    fn iterates_child_boxes() {
        let bytes = [
            0, 0, 0, 9, b'a', b'b', b'c', b'd', 7, 0, 0, 0, 8, b'e', b'f', b'g', b'h',
        ];

        let children = BoxIter::new(&bytes)
            .collect::<Result<Vec<_>>>()
            .unwrap();

        assert_eq!(children.len(), 2);
        assert_eq!(children[0].0.name, FourCC(*b"abcd"));
        assert_eq!(children[0].1, &[7]);
        assert_eq!(children[1].0.name, FourCC(*b"efgh"));
        assert!(children[1].1.is_empty());
    }
}
