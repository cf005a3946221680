use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{BufReader, BufWriter, Read, Seek, Write},
    path::Path,
};

use sh_mp4::{Demuxer, Muxer, MuxerConfig};
use tracing::*;

fn open(input: &Path) -> anyhow::Result<Demuxer<BufReader<File>>> {
    let mut demuxer = Demuxer::new(BufReader::new(File::open(input)?));
    demuxer.demux()?;

    Ok(demuxer)
}

/// Copies every sample of `demuxer` into `muxer`. Samples go in file order
/// when `by_offset` is set, otherwise in decode order.
fn copy_samples<R: Read + Seek, W: Write>(
    demuxer: &mut Demuxer<R>,
    muxer: &mut Muxer<W>,
    by_offset: bool,
) -> anyhow::Result<()> {
    let mut tracks = HashMap::new();
    for track in demuxer.tracks() {
        match muxer.add_track(track.config()) {
            Ok(id) => {
                tracks.insert(track.id, id);
            }
            Err(e) => warn!("Dropping track {}: {}", track.id, e),
        }
    }

    let mut copied = 0u64;
    loop {
        let next = if by_offset {
            demuxer.next_sample_by_offset()
        } else {
            demuxer.next_sample()
        };

        let (track, sample) = match next {
            Some(next) => next,
            None => break,
        };

        let id = match tracks.get(&track) {
            Some(&id) => id,
            None => continue,
        };

        if sample.size == 0 {
            trace!("Skipping empty sample of track {}", track);
            continue;
        }

        let data = demuxer.read_sample_data(&sample)?;
        muxer.write_sample(id, &data, sample.dts, sample.pts, sample.keyframe)?;
        copied += 1;
    }

    debug!("Copied {} samples", copied);

    Ok(())
}

/// Progressive remux with `moov` ahead of the media data.
pub fn faststart(input: &Path, output: &Path) -> anyhow::Result<()> {
    let mut demuxer = open(input)?;

    let mut part = output.as_os_str().to_os_string();
    part.push(".part");

    let scratch = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part)?;

    let mut muxer = Muxer::new(scratch, MuxerConfig::progressive())?;
    copy_samples(&mut demuxer, &mut muxer, true)?;

    let mut dest = BufWriter::new(File::create(output)?);
    muxer.rewrite_with_moov(&mut dest)?;
    dest.flush()?;

    drop(muxer);
    fs::remove_file(&part)?;

    info!("Wrote {}", output.display());

    Ok(())
}

/// Fragmented remux with a fragment per video keyframe and a closing `mfra`.
pub fn fragment(input: &Path, output: &Path) -> anyhow::Result<()> {
    let mut demuxer = open(input)?;

    let mut muxer = Muxer::new(BufWriter::new(File::create(output)?), MuxerConfig::fragmented())?;
    muxer.on_fragment(|info| {
        trace!("Fragment {} at {}", info.sequence_number, info.offset);
    });

    copy_samples(&mut demuxer, &mut muxer, false)?;
    muxer.finish()?;

    let fragments = muxer.tracks().map(|t| t.fragments.len()).max().unwrap_or(0);
    info!("Wrote {} with {} fragments", output.display(), fragments);

    Ok(())
}

/// DASH remux: an init segment and one file of `styp`/`sidx`/`moof`/`mdat`
/// segments.
pub fn dash(input: &Path, init: &Path, segments: &Path) -> anyhow::Result<()> {
    let mut demuxer = open(input)?;

    let mut muxer = Muxer::new(BufWriter::new(File::create(segments)?), MuxerConfig::dash())?;

    copy_samples(&mut demuxer, &mut muxer, false)?;

    let mut init_file = BufWriter::new(File::create(init)?);
    muxer.write_init_segment(&mut init_file)?;
    init_file.flush()?;

    muxer.finish()?;

    info!("Wrote {} and {}", init.display(), segments.display());

    Ok(())
}
