use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use crate::config::Container;
use crate::error::{Error, Result};

/// The external container muxer as a black-box capability, so orchestration
/// logic is testable without invoking a real binary.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Concatenate a local (key-rewritten) playlist into one container.
    async fn assemble(&self, playlist: &Path, output: &Path) -> Result<()>;

    /// Single-request streaming variant: the muxer reads the authenticated
    /// playlist URL itself.
    async fn assemble_remote(
        &self,
        playlist_url: &str,
        headers: &[(String, String)],
        output: &Path,
    ) -> Result<()>;

    /// Add a subtitle track to an assembled container. The argument shape
    /// depends on the target container.
    async fn attach_subtitle(
        &self,
        container: &Path,
        caption: &Path,
        kind: Container,
        output: &Path,
    ) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegMuxer {
    program: String,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
        }
    }
}

impl FfmpegMuxer {
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub async fn is_available(&self) -> bool {
        tokio::process::Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn run(&self, args: &[String], output: &Path) -> Result<()> {
        tracing::debug!("{} {}", self.program, args.join(" "));

        let out = tokio::process::Command::new(&self.program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::MuxFailure {
                output: output.to_path_buf(),
                detail: format!("failed to spawn {}: {e}", self.program),
            })?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(4).collect();
            return Err(Error::MuxFailure {
                output: output.to_path_buf(),
                detail: format!(
                    "{} ({})",
                    out.status,
                    tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
                ),
            });
        }

        Ok(())
    }
}

fn assemble_args(input: &str, output: &Path) -> Vec<String> {
    [
        "-y",
        "-allowed_extensions",
        "ALL",
        "-i",
        input,
        "-map",
        "0",
        "-c",
        "copy",
    ]
    .iter()
    .map(|s| s.to_string())
    .chain([output.to_string_lossy().into_owned()])
    .collect()
}

fn assemble_remote_args(url: &str, headers: &[(String, String)], output: &Path) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    if !headers.is_empty() {
        let header_block: String = headers
            .iter()
            .map(|(k, v)| format!("{k}: {v}\r\n"))
            .collect();
        args.push("-headers".to_string());
        args.push(header_block);
    }
    args.extend(
        ["-i", url, "-map", "0", "-c", "copy"]
            .iter()
            .map(|s| s.to_string()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

fn attach_subtitle_args(
    container: &Path,
    caption: &Path,
    kind: Container,
    output: &Path,
) -> Vec<String> {
    let input = container.to_string_lossy().into_owned();
    let caption = caption.to_string_lossy().into_owned();
    let output = output.to_string_lossy().into_owned();

    match kind {
        // Matroska copies arbitrary tracks; map both inputs verbatim.
        Container::Mkv => vec![
            "-y".into(),
            "-i".into(),
            input,
            "-i".into(),
            caption,
            "-map".into(),
            "0".into(),
            "-map".into(),
            "1".into(),
            "-c".into(),
            "copy".into(),
            output,
        ],
        // MP4 needs the text subtitle transcoded and language-tagged.
        Container::Mp4 => vec![
            "-y".into(),
            "-i".into(),
            input,
            "-i".into(),
            caption,
            "-c".into(),
            "copy".into(),
            "-c:s".into(),
            "mov_text".into(),
            "-metadata:s:s:0".into(),
            "language=eng".into(),
            output,
        ],
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn assemble(&self, playlist: &Path, output: &Path) -> Result<()> {
        let args = assemble_args(&playlist.to_string_lossy(), output);
        self.run(&args, output).await
    }

    async fn assemble_remote(
        &self,
        playlist_url: &str,
        headers: &[(String, String)],
        output: &Path,
    ) -> Result<()> {
        let args = assemble_remote_args(playlist_url, headers, output);
        self.run(&args, output).await
    }

    async fn attach_subtitle(
        &self,
        container: &Path,
        caption: &Path,
        kind: Container,
        output: &Path,
    ) -> Result<()> {
        let args = attach_subtitle_args(container, caption, kind, output);
        self.run(&args, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn assemble_reads_local_playlist_with_all_extensions() {
        let args = assemble_args("playlist.m3u8", &PathBuf::from("out.mp4"));
        assert_eq!(
            args,
            vec![
                "-y",
                "-allowed_extensions",
                "ALL",
                "-i",
                "playlist.m3u8",
                "-map",
                "0",
                "-c",
                "copy",
                "out.mp4"
            ]
        );
    }

    #[test]
    fn remote_assembly_injects_headers_before_input() {
        let headers = vec![("Cookie".to_string(), "a=b".to_string())];
        let args = assemble_remote_args("https://cdn/x.m3u8", &headers, &PathBuf::from("o.mp4"));
        let headers_pos = args.iter().position(|a| a == "-headers").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(headers_pos < input_pos);
        assert_eq!(args[headers_pos + 1], "Cookie: a=b\r\n");
    }

    #[test]
    fn remote_assembly_without_headers_omits_flag() {
        let args = assemble_remote_args("https://cdn/x.m3u8", &[], &PathBuf::from("o.mp4"));
        assert!(!args.iter().any(|a| a == "-headers"));
    }

    #[test]
    fn mkv_caption_attach_maps_both_inputs() {
        let args = attach_subtitle_args(
            &PathBuf::from("tmp.mkv"),
            &PathBuf::from("caption.vtt"),
            Container::Mkv,
            &PathBuf::from("out.mkv"),
        );
        assert_eq!(args.iter().filter(|a| *a == "-map").count(), 2);
        assert!(!args.iter().any(|a| a == "mov_text"));
    }

    #[test]
    fn mp4_caption_attach_transcodes_and_tags_language() {
        let args = attach_subtitle_args(
            &PathBuf::from("tmp.mp4"),
            &PathBuf::from("caption.vtt"),
            Container::Mp4,
            &PathBuf::from("out.mp4"),
        );
        let cs = args.iter().position(|a| a == "-c:s").unwrap();
        assert_eq!(args[cs + 1], "mov_text");
        assert!(args.contains(&"language=eng".to_string()));
    }
}
