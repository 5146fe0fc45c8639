//! tests/audio_pipeline_tests.rs
//!
//! Exercises the decoder subprocess handling with small stand-in scripts:
//! full copy, spawn failure, nonzero exit, and the no-orphan guarantee
//! under cancellation.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use alertbot_common::Error;
use alertbot_core::audio::{AudioPipeline, AudioSink, AudioStreamer};

struct CollectingSink {
    data: Arc<Mutex<Vec<u8>>>,
}

#[async_trait]
impl AudioSink for CollectingSink {
    async fn write_all(&mut self, data: &[u8]) -> Result<(), Error> {
        self.data.lock().unwrap().extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("decoder.sh");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn sink() -> (CollectingSink, Arc<Mutex<Vec<u8>>>) {
    let data = Arc::new(Mutex::new(Vec::new()));
    (CollectingSink { data: data.clone() }, data)
}

#[tokio::test]
async fn copies_decoder_output_until_eof() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "#!/bin/sh\nprintf 'abcdefgh'\n");
    let pipeline = AudioPipeline::with_decoder(script.to_str().unwrap());
    let (mut sink, data) = sink();

    pipeline
        .stream("song.pcm", &mut sink, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(data.lock().unwrap().clone(), b"abcdefgh".to_vec());
}

#[tokio::test]
async fn missing_decoder_binary_is_an_audio_error() {
    let pipeline = AudioPipeline::with_decoder("/nonexistent/decoder-binary");
    let (mut sink, data) = sink();

    let err = pipeline
        .stream("song.pcm", &mut sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Audio(_)));
    assert!(data.lock().unwrap().is_empty());
}

#[tokio::test]
async fn nonzero_exit_errors_after_draining_output() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "#!/bin/sh\nprintf 'partial'\nexit 3\n");
    let pipeline = AudioPipeline::with_decoder(script.to_str().unwrap());
    let (mut sink, data) = sink();

    let err = pipeline
        .stream("song.pcm", &mut sink, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Audio(_)));
    // Output emitted before the crash still reached the sink.
    assert_eq!(data.lock().unwrap().clone(), b"partial".to_vec());
}

#[tokio::test]
async fn sink_failure_kills_the_decoder_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("decoder.pid");
    let script = write_script(
        dir.path(),
        &format!(
            "#!/bin/sh\necho $$ > {}\nprintf 'xx'\nexec sleep 30\n",
            pid_file.display()
        ),
    );
    let pipeline = AudioPipeline::with_decoder(script.to_str().unwrap());

    struct FailingSink;

    #[async_trait]
    impl AudioSink for FailingSink {
        async fn write_all(&mut self, _data: &[u8]) -> Result<(), Error> {
            Err(Error::Connection("voice transmit stream closed".to_string()))
        }

        async fn flush(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }

    let err = pipeline
        .stream("song.pcm", &mut FailingSink, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        !Path::new(&format!("/proc/{pid}")).exists(),
        "decoder process {pid} outlived stream()"
    );
}

#[tokio::test]
async fn cancellation_kills_the_decoder_process() {
    let dir = TempDir::new().unwrap();
    let pid_file = dir.path().join("decoder.pid");
    let script = write_script(
        dir.path(),
        &format!(
            "#!/bin/sh\necho $$ > {}\nprintf 'xx'\nexec sleep 30\n",
            pid_file.display()
        ),
    );
    let pipeline = AudioPipeline::with_decoder(script.to_str().unwrap());
    let (mut sink, _data) = sink();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    pipeline.stream("song.pcm", &mut sink, &cancel).await.unwrap();

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(
        !Path::new(&format!("/proc/{pid}")).exists(),
        "decoder process {pid} outlived stream()"
    );
}
