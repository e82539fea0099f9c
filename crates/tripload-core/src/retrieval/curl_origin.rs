//! Single-stream HTTP GET into a local file.
//!
//! The body is written to `{dest}.part` and renamed to `dest` only after a
//! 2xx response completed, so a crash mid-transfer never leaves a non-empty
//! file at the final path.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use super::Origin;
use crate::error::FetchError;

/// Path for the in-progress download: appends `.part` to the final path.
pub fn temp_path(final_path: &Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(".part");
    std::path::PathBuf::from(o)
}

/// Timeouts applied to every origin transfer.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    /// Abort when throughput stays under `low_speed_limit` bytes/s for `low_speed_time`.
    pub low_speed_limit: u32,
    pub low_speed_time: Duration,
}

impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
        }
    }
}

/// Plain HTTP(S) origin, no authentication.
#[derive(Debug, Clone, Default)]
pub struct CurlOrigin {
    opts: CurlOptions,
}

impl CurlOrigin {
    pub fn new(opts: CurlOptions) -> Self {
        Self { opts }
    }

    fn transfer(&self, url: &str, temp: &Path) -> Result<u64, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let io_err = |source| FetchError::Io {
            path: temp.to_path_buf(),
            source,
        };

        let file = File::create(temp).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        let mut write_failed: Option<std::io::Error> = None;

        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(transport)?;
        easy.follow_location(true).map_err(transport)?;
        easy.max_redirections(10).map_err(transport)?;
        easy.fail_on_error(false).map_err(transport)?;
        easy.connect_timeout(self.opts.connect_timeout).map_err(transport)?;
        easy.low_speed_limit(self.opts.low_speed_limit).map_err(transport)?;
        easy.low_speed_time(self.opts.low_speed_time).map_err(transport)?;
        easy.timeout(self.opts.timeout).map_err(transport)?;

        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|data| match writer.write_all(data) {
                    Ok(()) => {
                        written += data.len() as u64;
                        Ok(data.len())
                    }
                    Err(e) => {
                        write_failed = Some(e);
                        Ok(0) // abort transfer
                    }
                })
                .map_err(transport)?;
            transfer.perform()
        };

        if let Some(e) = write_failed {
            return Err(io_err(e));
        }
        performed.map_err(transport)?;

        let status = easy.response_code().map_err(transport)?;
        if !(200..300).contains(&status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        writer.flush().map_err(io_err)?;
        writer
            .into_inner()
            .map_err(|e| io_err(e.into_error()))?
            .sync_all()
            .map_err(io_err)?;
        Ok(written)
    }
}

impl Origin for CurlOrigin {
    fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let temp = temp_path(dest);
        match self.transfer(url, &temp) {
            Ok(written) => {
                fs::rename(&temp, dest).map_err(|source| FetchError::Io {
                    path: dest.to_path_buf(),
                    source,
                })?;
                Ok(written)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&temp) {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %temp.display(), "could not remove partial download: {}", rm);
                    }
                }
                Err(e)
            }
        }
    }
}
