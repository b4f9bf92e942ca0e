//! Background PNG encoder.
//!
//! Pixel data read back from the GPU is handed to a worker thread that
//! encodes and writes it, so saving a frame never stalls the render loop.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};

use super::CaptureError;

/// A frame ready to be written to disk.
#[derive(Debug)]
pub struct SaveJob {
    /// Tightly packed RGBA8 rows, top row first
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub path: PathBuf,
}

/// Frames that may wait for the encoder before new ones are dropped
pub const SAVE_QUEUE_DEPTH: usize = 8;

/// Commands sent to the worker thread.
enum WorkerCommand {
    Save(SaveJob),
    Stop,
}

/// Owns the encoder thread and its channels.
pub struct SaveWorker {
    /// Command channel to worker
    command_tx: Sender<WorkerCommand>,
    /// Result channel from worker
    result_rx: Receiver<Result<PathBuf, CaptureError>>,
    /// Worker thread handle
    worker_handle: Option<JoinHandle<()>>,
    /// Jobs submitted but not yet reported back
    in_flight: usize,
}

impl SaveWorker {
    /// Spawn the worker thread.
    pub fn new() -> Result<Self, CaptureError> {
        let (command_tx, command_rx) = bounded::<WorkerCommand>(SAVE_QUEUE_DEPTH);
        let (result_tx, result_rx) = unbounded();

        let worker_handle = thread::Builder::new()
            .name("frame-capture".into())
            .spawn(move || Self::worker_loop(command_rx, result_tx))
            .map_err(CaptureError::Spawn)?;

        Ok(Self {
            command_tx,
            result_rx,
            worker_handle: Some(worker_handle),
            in_flight: 0,
        })
    }

    /// Worker thread main loop.
    fn worker_loop(command_rx: Receiver<WorkerCommand>, result_tx: Sender<Result<PathBuf, CaptureError>>) {
        while let Ok(command) = command_rx.recv() {
            match command {
                WorkerCommand::Save(job) => {
                    let result = encode_png(job);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                WorkerCommand::Stop => break,
            }
        }
        tracing::debug!("Frame capture worker stopped");
    }

    /// Queue a frame for encoding.
    ///
    /// Never blocks: when the encoder is behind by [`SAVE_QUEUE_DEPTH`]
    /// frames the job is dropped and `QueueFull` is returned.
    pub fn submit(&mut self, job: SaveJob) -> Result<(), CaptureError> {
        match self.command_tx.try_send(WorkerCommand::Save(job)) {
            Ok(()) => {
                self.in_flight += 1;
                Ok(())
            }
            Err(TrySendError::Full(WorkerCommand::Save(job))) => Err(CaptureError::QueueFull { path: job.path }),
            Err(TrySendError::Full(WorkerCommand::Stop)) => Err(CaptureError::WorkerGone),
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::WorkerGone),
        }
    }

    /// Collect finished jobs without blocking.
    pub fn poll(&mut self) -> Vec<Result<PathBuf, CaptureError>> {
        let mut results = Vec::new();
        loop {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    results.push(result);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.in_flight > 0 {
                        results.push(Err(CaptureError::WorkerGone));
                        self.in_flight = 0;
                    }
                    break;
                }
            }
        }
        results
    }

    /// Block until the next job finishes.
    pub fn wait(&mut self) -> Option<Result<PathBuf, CaptureError>> {
        if self.in_flight == 0 {
            return None;
        }
        let result = self.result_rx.recv().unwrap_or(Err(CaptureError::WorkerGone));
        self.in_flight -= 1;
        Some(result)
    }

    /// Jobs submitted but not yet reported.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for SaveWorker {
    fn drop(&mut self) {
        // Queued saves are finished before the thread exits
        let _ = self.command_tx.send(WorkerCommand::Stop);
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Frame capture worker panicked");
            }
        }
    }
}

/// Encode one frame as PNG.
pub fn encode_png(job: SaveJob) -> Result<PathBuf, CaptureError> {
    let SaveJob {
        pixels,
        width,
        height,
        path,
    } = job;

    let image = image::RgbaImage::from_raw(width, height, pixels).ok_or(CaptureError::BadDimensions { width, height })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| CaptureError::Io {
            path: path.clone(),
            source,
        })?;
    }

    image.save(&path).map_err(|source| CaptureError::Encode {
        path: path.clone(),
        source,
    })?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> Vec<u8> {
        (0..width * height)
            .flat_map(|i| if i % 2 == 0 { [255, 0, 0, 255] } else { [0, 0, 255, 255] })
            .collect()
    }

    #[test]
    fn test_worker_saves_png() {
        let path = std::env::temp_dir().join("omni_render_capture_test.png");
        let _ = std::fs::remove_file(&path);

        let mut worker = SaveWorker::new().unwrap();
        worker
            .submit(SaveJob {
                pixels: checker(4, 3),
                width: 4,
                height: 3,
                path: path.clone(),
            })
            .unwrap();
        assert_eq!(worker.in_flight(), 1);

        let result = worker.wait().unwrap();
        assert_eq!(result.unwrap(), path);
        assert_eq!(worker.in_flight(), 0);

        let saved = image::open(&path).unwrap().to_rgba8();
        assert_eq!(saved.dimensions(), (4, 3));
        assert_eq!(saved.get_pixel(1, 0).0, [0, 0, 255, 255]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_worker_reports_unwritable_path() {
        // A regular file cannot be used as a parent directory
        let blocker = std::env::temp_dir().join("omni_render_capture_blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("frame.png");

        let mut worker = SaveWorker::new().unwrap();
        worker
            .submit(SaveJob {
                pixels: checker(2, 2),
                width: 2,
                height: 2,
                path,
            })
            .unwrap();

        let result = worker.wait().unwrap();
        assert!(matches!(result, Err(CaptureError::Io { .. })));

        let _ = std::fs::remove_file(&blocker);
    }

    #[test]
    fn test_bad_dimensions() {
        let result = encode_png(SaveJob {
            pixels: vec![0; 8],
            width: 4,
            height: 4,
            path: std::env::temp_dir().join("omni_render_never_written.png"),
        });
        assert!(matches!(
            result,
            Err(CaptureError::BadDimensions { width: 4, height: 4 })
        ));
    }

    #[test]
    fn test_submit_full_queue_returns_immediately() {
        // Worker with no thread draining its queue
        let (command_tx, command_rx) = bounded::<WorkerCommand>(SAVE_QUEUE_DEPTH);
        let (_result_tx, result_rx) = unbounded();
        let mut worker = SaveWorker {
            command_tx,
            result_rx,
            worker_handle: None,
            in_flight: 0,
        };

        let job = |i: usize| SaveJob {
            pixels: checker(1, 1),
            width: 1,
            height: 1,
            path: std::env::temp_dir().join(format!("omni_render_queue_{}.png", i)),
        };

        for i in 0..SAVE_QUEUE_DEPTH {
            worker.submit(job(i)).unwrap();
        }
        assert_eq!(worker.in_flight(), SAVE_QUEUE_DEPTH);

        match worker.submit(job(SAVE_QUEUE_DEPTH)) {
            Err(CaptureError::QueueFull { path }) => {
                assert!(path.ends_with(format!("omni_render_queue_{}.png", SAVE_QUEUE_DEPTH)));
            }
            other => panic!("expected full queue, got {:?}", other),
        }
        assert_eq!(worker.in_flight(), SAVE_QUEUE_DEPTH);

        // Lets the stop command in Drop fail instead of waiting for room
        drop(command_rx);
    }

    #[test]
    fn test_drop_finishes_queued_jobs() {
        let path = std::env::temp_dir().join("omni_render_capture_drop.png");
        let _ = std::fs::remove_file(&path);

        {
            let mut worker = SaveWorker::new().unwrap();
            worker
                .submit(SaveJob {
                    pixels: checker(2, 2),
                    width: 2,
                    height: 2,
                    path: path.clone(),
                })
                .unwrap();
        }

        assert!(path.exists());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_poll_empty() {
        let mut worker = SaveWorker::new().unwrap();
        assert!(worker.poll().is_empty());
        assert!(worker.wait().is_none());
    }
}
