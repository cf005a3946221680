use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use sh_fmp4::{Mp4FileReadFilter, Mp4RecordFilter, RecordConfig};
use sh_media::FilterGraph;
use sh_mp4::Demuxer;
use tracing::*;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod remux;

const USAGE: &str = "usage:
    qw-mp4 probe <file>
    qw-mp4 faststart <in> <out>
    qw-mp4 fragment <in> <out>
    qw-mp4 dash <in> <init> <segments>
    qw-mp4 record-copy <in> <out>";

enum Command {
    Probe(PathBuf),
    Faststart(PathBuf, PathBuf),
    Fragment(PathBuf, PathBuf),
    Dash(PathBuf, PathBuf, PathBuf),
    RecordCopy(PathBuf, PathBuf),
}

impl Command {
    fn parse(args: &[String]) -> Option<Self> {
        let paths: Vec<PathBuf> = args.iter().skip(1).map(PathBuf::from).collect();

        let command = match (args.first()?.as_str(), paths.as_slice()) {
            ("probe", [file]) => Command::Probe(file.clone()),
            ("faststart", [input, output]) => Command::Faststart(input.clone(), output.clone()),
            ("fragment", [input, output]) => Command::Fragment(input.clone(), output.clone()),
            ("dash", [input, init, segments]) => {
                Command::Dash(input.clone(), init.clone(), segments.clone())
            }
            ("record-copy", [input, output]) => Command::RecordCopy(input.clone(), output.clone()),
            _ => return None,
        };

        Some(command)
    }
}

fn env(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.into())
}

/// Recorder settings for `record-copy`, from `RECORD_FRAGMENT_SECS` and
/// `RECORD_FASTSTART`.
fn record_config() -> anyhow::Result<RecordConfig> {
    let fragment = match env("RECORD_FRAGMENT_SECS", "").as_str() {
        "" => None,
        secs => Some(Duration::from_secs(secs.parse()?)),
    };

    let faststart = matches!(env("RECORD_FASTSTART", "false").as_str(), "1" | "true" | "yes");

    Ok(RecordConfig {
        fragment,
        faststart,
    })
}

fn probe(path: &Path) -> anyhow::Result<()> {
    let mut demuxer = Demuxer::new(BufReader::new(File::open(path)?));
    demuxer.demux()?;

    let info = demuxer.info();
    println!("{}", path.display());
    println!(
        "  brand {:?} ({}), compatible {:?}",
        info.major_brand, info.minor_version, info.compatible_brands
    );
    println!(
        "  timescale {}, duration {}, fragmented {}",
        info.timescale, info.duration, info.is_fragmented
    );

    for track in demuxer.tracks() {
        println!(
            "  track {}: {:?}, timescale {}, {} samples ({} sync), {} fragments",
            track.id,
            track.codec,
            track.timescale,
            track.samples.len(),
            track.sync_samples().count(),
            track.fragments.len()
        );

        if let (Some(start), Some(end)) = (track.start_dts_ms(), track.end_dts_ms()) {
            println!("    dts {}ms to {}ms", start, end);
        }

        if track.is_video() {
            println!("    {}x{}", track.width, track.height);
        } else {
            println!(
                "    {} channels at {}Hz",
                track.channel_count, track.sample_rate
            );
        }

        if let Some(tenc) = track.track_encryption() {
            println!("    encrypted, default KID {:02x?}", tenc.default_kid);
        }
    }

    if !demuxer.random_access().is_empty() {
        println!("  {} random access points", demuxer.random_access().len());
    }

    for pssh in demuxer.pssh() {
        println!("  pssh system {:02x?}", pssh.system_id);
    }

    Ok(())
}

async fn record_copy(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let config = record_config()?;
    debug!("Recording with {:?}", config);

    let mut graph = FilterGraph::new(
        Box::new(Mp4FileReadFilter::new(input)),
        Box::new(Mp4RecordFilter::new(output, config)),
    );

    graph.run().await
}

async fn start(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Probe(file) => tokio::task::spawn_blocking(move || probe(&file)).await?,
        Command::Faststart(input, output) => {
            tokio::task::spawn_blocking(move || remux::faststart(&input, &output)).await?
        }
        Command::Fragment(input, output) => {
            tokio::task::spawn_blocking(move || remux::fragment(&input, &output)).await?
        }
        Command::Dash(input, init, segments) => {
            tokio::task::spawn_blocking(move || remux::dash(&input, &init, &segments)).await?
        }
        Command::RecordCopy(input, output) => record_copy(input, output).await,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Some(command) => command,
        None => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start(command).await })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn commands_need_their_paths() {
        assert!(matches!(
            Command::parse(&args(&["dash", "a.mp4", "init.mp4", "seg.m4s"])),
            Some(Command::Dash(..))
        ));
        assert!(matches!(
            Command::parse(&args(&["probe", "a.mp4"])),
            Some(Command::Probe(_))
        ));
        assert!(Command::parse(&args(&["fragment", "a.mp4"])).is_none());
        assert!(Command::parse(&args(&["transcode", "a.mp4", "b.mp4"])).is_none());
        assert!(Command::parse(&[]).is_none());
    }
}
