use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::session::Session;

/// Streams `location` into `target`, resuming with `Range` after interruptions.
///
/// Bytes go to a `<target>.part` file that is truncated first, so only bytes written
/// by this call are ever resumed; the file is renamed to `target` once complete.
/// When `expected` is known the download is retried until the file reaches that size
/// (up to `maximum_tries`), and a short file is an [`Error::Download`].
pub(crate) fn download(
    session: &Session,
    location: &str,
    expected: Option<u64>,
    target: PathBuf,
) -> Result<PathBuf> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::io(format!("failed to create directory {}", parent.display()), e)
            })?;
        }
    }
    info!("Downloading {} to {}", location, target.display());

    let part = part_path(&target);
    let expected_len = expected.unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut range_from: Option<u64> = None;

    let pb = progress_bar(session.settings.progress, expected, downloaded);

    let max = session.settings.tries();
    let mut tries = 0usize;
    'download_attempt: while tries < max {
        let mut resp = session.get_stream(location, range_from)?;

        // Server ignored the range request: start over.
        if range_from.is_some() && resp.status() != StatusCode::PARTIAL_CONTENT {
            debug!("range not honoured, restarting download of {}", location);
            range_from = None;
            downloaded = 0;
            if let Some(pb) = &pb {
                pb.set_position(0);
            }
        }

        let append = range_from.is_some();
        let mut out = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&part)
            .map_err(|e| Error::io(format!("failed to open {}", part.display()), e))?;

        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tries += 1;
                    if tries >= max {
                        return Err(Error::io("download interrupted", e));
                    }
                    warn!("download interrupted ({}), resuming", e);
                    out.flush().ok();
                    downloaded = file_len(&part)?;
                    range_from = Some(downloaded);
                    if let Some(pb) = &pb {
                        pb.set_position(downloaded);
                    }
                    thread::sleep(session.settings.retry_sleep(None));
                    continue 'download_attempt;
                }
            };

            out.write_all(&buf[..n])
                .map_err(|e| Error::io(format!("failed to write {}", part.display()), e))?;
            downloaded += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }

        out.flush()
            .map_err(|e| Error::io(format!("failed to write {}", part.display()), e))?;
        drop(out);

        if downloaded >= expected_len {
            if let Some(pb) = &pb {
                pb.finish_and_clear();
            }
            std::fs::rename(&part, &target).map_err(|e| {
                Error::io(format!("failed to move download to {}", target.display()), e)
            })?;
            return Ok(target);
        }

        tries += 1;
        downloaded = file_len(&part)?;
        range_from = Some(downloaded);
        if let Some(pb) = &pb {
            pb.set_position(downloaded);
        }
        if tries < max {
            warn!(
                "incomplete download ({} of {} bytes), resuming",
                downloaded, expected_len
            );
            thread::sleep(session.settings.retry_sleep(None));
        }
    }

    Err(Error::Download {
        downloaded,
        expected: expected_len,
    })
}

/// `era5.grib` -> `era5.grib.part`, next to the target.
fn part_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");
    target.with_file_name(name)
}

fn file_len(path: &Path) -> Result<u64> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| Error::io(format!("failed to stat {}", path.display()), e))
}

fn progress_bar(enabled: bool, total: Option<u64>, position: u64) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let pb = match total {
        Some(len) => ProgressBar::new(len),
        None => ProgressBar::no_length(),
    };
    if let Ok(style) =
        ProgressStyle::with_template("{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}")
    {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_position(position);
    Some(pb)
}
