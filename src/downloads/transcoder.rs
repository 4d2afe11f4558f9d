use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use log::{debug, warn};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

/// User agent ffmpeg presents to the stream host.
pub const FFMPEG_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Lines of ffmpeg stderr kept for the error message.
const STDERR_TAIL: usize = 20;

pub type TranscodeProgressFn = Box<dyn FnMut(f64) + Send>;

/// One remote stream to copy into a local MP4.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub url: String,
    pub output: PathBuf,
    pub hls: bool,
    /// Total length in seconds, when the page knows it.
    pub duration: Option<f64>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Runs `job` to completion, reporting percentages through `on_progress`.
    ///
    /// When `cancel` fires (or its sender is dropped) the process is killed and
    /// the call returns `Ok(())`.
    async fn transcode(
        &self,
        job: TranscodeJob,
        on_progress: TranscodeProgressFn,
        cancel: oneshot::Receiver<()>,
    ) -> Result<()>;
}

pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub(crate) fn args(job: &TranscodeJob) -> Vec<String> {
        let mut args = vec![
            "-user_agent".to_string(),
            FFMPEG_USER_AGENT.to_string(),
            "-i".to_string(),
            job.url.clone(),
            "-c".to_string(),
            "copy".to_string(),
        ];
        if job.hls {
            args.extend(["-bsf:a".to_string(), "aac_adtstoasc".to_string()]);
        }
        args.extend(
            ["-progress", "pipe:1", "-nostats", "-y"]
                .iter()
                .map(|s| s.to_string()),
        );
        args.push(job.output.display().to_string());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[tracing::instrument(skip(self, on_progress, cancel), fields(url = %job.url))]
    async fn transcode(
        &self,
        job: TranscodeJob,
        mut on_progress: TranscodeProgressFn,
        mut cancel: oneshot::Receiver<()>,
    ) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(Self::args(&job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program.display()))?;

        let stdout = child.stdout.take().context("ffmpeg stdout was not captured")?;
        let stderr = child.stderr.take().context("ffmpeg stderr was not captured")?;

        let stderr_tail = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = &mut cancel => {
                    debug!("Cancelling ffmpeg for {:?}", job.output);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill ffmpeg: {}", e);
                    }
                    return Ok(());
                }
                line = lines.next_line() => {
                    match line.context("Failed to read ffmpeg progress")? {
                        Some(line) => {
                            if let Some(percent) = parse_progress_line(&line, job.duration) {
                                on_progress(percent);
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        let status = child.wait().await.context("Failed to wait for ffmpeg")?;
        if !status.success() {
            let tail = stderr_tail.await.unwrap_or_default();
            bail!("ffmpeg exited with {}: {}", status, tail);
        }
        Ok(())
    }
}

/// Percentage from an `out_time=HH:MM:SS.micro` progress line, capped at 100.
pub fn parse_progress_line(line: &str, duration: Option<f64>) -> Option<f64> {
    let duration = duration.filter(|d| d.is_finite() && *d > 0.0)?;
    let timestamp = line.trim().strip_prefix("out_time=")?;
    let seconds = parse_timestamp(timestamp)?;
    Some((seconds / duration * 100.0).clamp(0.0, 100.0))
}

fn parse_timestamp(timestamp: &str) -> Option<f64> {
    let mut parts = timestamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}
