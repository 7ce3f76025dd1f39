// ABOUTME: Pipes a source media stream through an ffmpeg subprocess for MP3 encoding
// ABOUTME: ffmpeg reads raw input on stdin and writes 192 kbps MP3 to stdout

use anyhow::{anyhow, Result};
use axum::body::Body;
use futures::StreamExt;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use crate::youtube::ByteStream;

const MP3_BITRATE: &str = "192000";

fn mp3_command() -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-i", "pipe:0", "-f", "mp3", "-ab", MP3_BITRATE, "-vn", "pipe:1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    cmd
}

/// Spawn ffmpeg and wire `source` into its stdin, returning its stdout as a
/// response body stream.
///
/// A launch failure (ffmpeg missing from PATH) surfaces as an error here,
/// before any response headers are sent. Failures after that point can only
/// be logged: the feed task drops stdin on source end or pipe error so
/// ffmpeg sees EOF, then reaps the child and logs a non-zero exit.
pub fn mp3_stream(source: ByteStream) -> Result<Body> {
    let mut child = mp3_command()
        .spawn()
        .map_err(|e| anyhow!("failed to start ffmpeg: {}", e))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("ffmpeg stdin was not captured"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("ffmpeg stdout was not captured"))?;

    tokio::spawn(async move {
        let mut source = source;
        while let Some(chunk) = source.next().await {
            match chunk {
                Ok(bytes) => {
                    if let Err(e) = stdin.write_all(&bytes).await {
                        warn!("ffmpeg stdin closed early: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    warn!("source stream failed during transcode: {}", e);
                    break;
                }
            }
        }
        drop(stdin);

        match child.wait().await {
            Ok(status) if !status.success() => error!("ffmpeg exited with {}", status),
            Err(e) => error!("failed to wait on ffmpeg: {}", e),
            _ => {}
        }
    });

    Ok(Body::from_stream(ReaderStream::new(stdout)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_command_arguments() {
        let cmd = mp3_command();
        let args: Vec<&str> = cmd
            .as_std()
            .get_args()
            .map(|arg| arg.to_str().unwrap())
            .collect();
        assert_eq!(
            args,
            ["-i", "pipe:0", "-f", "mp3", "-ab", "192000", "-vn", "pipe:1"]
        );
        assert_eq!(cmd.as_std().get_program().to_str().unwrap(), "ffmpeg");
    }
}
