//! In-memory fakes for the transport and muxer seams, shared by unit and
//! orchestration tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::Fetch;
use crate::config::Container;
use crate::error::{Error, Result};
use crate::mux::Muxer;

enum FakeResponse {
    Bytes(Vec<u8>),
    Status(u16),
}

/// URL-keyed canned responses plus a request log. Unknown URLs answer 404,
/// mirroring the real transport's non-retryable classification.
#[derive(Default)]
pub struct FakeFetch {
    responses: Mutex<HashMap<String, FakeResponse>>,
    log: Mutex<Vec<String>>,
}

impl FakeFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_text(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), FakeResponse::Bytes(body.as_bytes().to_vec()));
    }

    pub fn put_bytes(&self, url: &str, body: &[u8]) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), FakeResponse::Bytes(body.to_vec()));
    }

    pub fn put_status(&self, url: &str, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), FakeResponse::Status(status));
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    fn lookup(&self, url: &str) -> Result<Vec<u8>> {
        self.log.lock().unwrap().push(url.to_string());
        match self.responses.lock().unwrap().get(url) {
            Some(FakeResponse::Bytes(bytes)) => Ok(bytes.clone()),
            Some(FakeResponse::Status(status)) => Err(Error::TransferFailed {
                url: url.to_string(),
                last_status: Some(*status),
            }),
            None => Err(Error::TransferFailed {
                url: url.to_string(),
                last_status: Some(404),
            }),
        }
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.lookup(url)?;
        String::from_utf8(bytes).map_err(|_| Error::TransferFailed {
            url: url.to_string(),
            last_status: None,
        })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.lookup(url)
    }
}

/// Records muxer invocations and writes marker bytes to the output path,
/// so orchestration tests can assert on argument shape and final files
/// without a real ffmpeg.
#[derive(Default)]
pub struct FakeMuxer {
    pub calls: Mutex<Vec<String>>,
    fail_assemble: Mutex<bool>,
}

impl FakeMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_assemble(&self) {
        *self.fail_assemble.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Muxer for FakeMuxer {
    async fn assemble(&self, playlist: &Path, output: &Path) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("assemble {} -> {}", playlist.display(), output.display()));
        if std::mem::take(&mut *self.fail_assemble.lock().unwrap()) {
            return Err(Error::MuxFailure {
                output: output.to_path_buf(),
                detail: "exit status 1".into(),
            });
        }
        std::fs::write(output, b"container")?;
        Ok(())
    }

    async fn assemble_remote(
        &self,
        playlist_url: &str,
        _headers: &[(String, String)],
        output: &Path,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("assemble-remote {} -> {}", playlist_url, output.display()));
        std::fs::write(output, b"container")?;
        Ok(())
    }

    async fn attach_subtitle(
        &self,
        container: &Path,
        caption: &Path,
        kind: Container,
        output: &Path,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(format!(
            "attach[{kind}] {} + {} -> {}",
            container.display(),
            caption.display(),
            output.display()
        ));
        std::fs::write(output, b"container+subtitle")?;
        Ok(())
    }
}
