use std::cell::RefCell;

use h264_reader::{
    annexb::AnnexBReader,
    nal::{NalHandler, NalHeader, NalSwitch, UnitType},
    Context,
};

use super::BitstreamFraming;
use bytes::{Buf, BufMut, Bytes, BytesMut};

const FOUR_BYTE_STARTCODE: [u8; 4] = [0, 0, 0, 1];

/// Splits a length prefixed bitstream. A prefix that runs past the end
/// ends the scan.
fn parse_bitstream_length_field<F: Fn(&mut Bytes) -> usize>(
    mut bitstream: Bytes,
    length_size: usize,
    read: F,
) -> Vec<Bytes> {
    let mut nal_units = Vec::new();

    while bitstream.remaining() > length_size {
        let nal_unit_len = read(&mut bitstream);
        if nal_unit_len > bitstream.remaining() {
            break;
        }

        nal_units.push(bitstream.split_to(nal_unit_len));
    }

    nal_units
}

#[derive(Default)]
struct NalCollector {
    nal_units: Vec<Bytes>,
    current: BytesMut,
}

/// NAL unit types kept when splitting Annex B streams.
const KEPT_UNIT_TYPES: [UnitType; 5] = [
    UnitType::SliceLayerWithoutPartitioningNonIdr,
    UnitType::SliceLayerWithoutPartitioningIdr,
    UnitType::SEI,
    UnitType::SeqParameterSet,
    UnitType::PicParameterSet,
];

/// Hands every NAL unit it sees to the collector.
struct AnyNalHandler;

impl NalHandler for AnyNalHandler {
    type Ctx = NalCollector;

    fn start(&mut self, ctx: &mut Context<Self::Ctx>, _header: NalHeader) {
        ctx.user_context.current.clear();
    }

    fn push(&mut self, ctx: &mut Context<Self::Ctx>, buf: &[u8]) {
        ctx.user_context.current.extend_from_slice(buf);
    }

    fn end(&mut self, ctx: &mut Context<Self::Ctx>) {
        let nal_unit = ctx.user_context.current.split().freeze();
        ctx.user_context.nal_units.push(nal_unit);
    }
}

/// Parses an Annex B bitstream (start codes) into NAL units. Access unit
/// delimiters and other unit types are dropped.
fn parse_bitstream_start_codes(bitstream: Bytes) -> Vec<Bytes> {
    let mut switch = NalSwitch::default();
    for unit_type in KEPT_UNIT_TYPES {
        switch.put_handler(unit_type, Box::new(RefCell::new(AnyNalHandler)));
    }

    let mut ctx = Context::new(NalCollector::default());
    let mut reader = AnnexBReader::new(switch);

    reader.start(&mut ctx);
    reader.push(&mut ctx, &bitstream);
    reader.end_units(&mut ctx);

    ctx.user_context.nal_units
}

/// Parses a H.26x bitstream in a given [BitstreamFraming] into NAL units.
pub fn parse_bitstream(bitstream: Bytes, source: BitstreamFraming) -> Vec<Bytes> {
    match source {
        BitstreamFraming::TwoByteLength => {
            parse_bitstream_length_field(bitstream, 2, |b| b.get_u16() as usize)
        }
        BitstreamFraming::FourByteLength => {
            parse_bitstream_length_field(bitstream, 4, |b| b.get_u32() as usize)
        }
        BitstreamFraming::FourByteStartCode => parse_bitstream_start_codes(bitstream),
    }
}

/// Frame NAL units with the specified [BitstreamFraming].
pub fn frame_nal_units<T: AsRef<[u8]>>(nal_units: &[T], target: BitstreamFraming) -> BytesMut {
    let payload: usize = nal_units.iter().map(|n| n.as_ref().len() + 4).sum();
    let mut bitstream = BytesMut::with_capacity(payload);

    for nut in nal_units {
        let slice = nut.as_ref();

        match target {
            BitstreamFraming::TwoByteLength => bitstream.put_u16(slice.len() as u16),
            BitstreamFraming::FourByteLength => bitstream.put_u32(slice.len() as u32),
            BitstreamFraming::FourByteStartCode => bitstream.put_slice(&FOUR_BYTE_STARTCODE),
        }

        bitstream.put_slice(slice);
    }

    bitstream
}

/// Converts a H.26x bitstream from a source [BitstreamFraming] to a
/// target [BitstreamFraming].
pub fn convert_bitstream(
    bitstream: Bytes,
    source: BitstreamFraming,
    target: BitstreamFraming,
) -> Bytes {
    if source == target {
        return bitstream;
    }

    let nal_units = parse_bitstream(bitstream, source);
    frame_nal_units(&nal_units[..], target).freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_prefixed_units_are_split() {
        let data = Bytes::from_static(&[0, 0, 0, 2, 0x65, 0xaa, 0, 0, 0, 1, 0x41]);
        let units = parse_bitstream(data, BitstreamFraming::FourByteLength);

        assert_eq!(units, vec![Bytes::from_static(&[0x65, 0xaa]), Bytes::from_static(&[0x41])]);
    }

    #[test]
    fn overlong_prefix_stops_parsing() {
        let data = Bytes::from_static(&[0, 2, 0x65, 0xaa, 0, 9, 0x41]);
        let units = parse_bitstream(data, BitstreamFraming::TwoByteLength);

        assert_eq!(units, vec![Bytes::from_static(&[0x65, 0xaa])]);
    }

    #[test]
    fn same_framing_is_untouched() {
        let data = Bytes::from_static(&[0, 0, 0, 1, 0x65]);
        let converted = convert_bitstream(
            data.clone(),
            BitstreamFraming::FourByteLength,
            BitstreamFraming::FourByteLength,
        );

        assert_eq!(converted, data);
    }

    #[test]
    fn two_byte_to_four_byte_lengths() {
        let data = Bytes::from_static(&[0, 1, 0x09, 0, 2, 0x65, 0x88]);
        let converted = convert_bitstream(
            data,
            BitstreamFraming::TwoByteLength,
            BitstreamFraming::FourByteLength,
        );

        assert_eq!(&converted[..], &[0, 0, 0, 1, 0x09, 0, 0, 0, 2, 0x65, 0x88]);
    }
}
