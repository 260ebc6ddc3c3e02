use realid_core::{FaceCapture, FaceError, FacePipeline};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const ENGINE_QUEUE_DEPTH: usize = 16;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Face(#[from] FaceError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Capture {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<FaceCapture, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode the image, detect the first face, and derive its descriptor.
    pub async fn capture(&self, image: Vec<u8>) -> Result<FaceCapture, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Capture {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Decoding, detection, and hashing are CPU-bound and run synchronously on
/// that thread, one request at a time, so async callers never block their
/// runtime. The thread exits when every handle is dropped.
pub fn spawn_engine(mut pipeline: FacePipeline) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("realid-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Capture { image, reply } => {
                        let result = pipeline.capture(&image).map_err(EngineError::from);
                        match &result {
                            Ok(capture) => tracing::debug!(
                                x = capture.bbox.x,
                                y = capture.bbox.y,
                                width = capture.bbox.width,
                                height = capture.bbox.height,
                                "face captured"
                            ),
                            Err(e) => tracing::debug!(error = %e, "capture failed"),
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use realid_core::detector::DetectorError;
    use realid_core::{BoundingBox, FaceDetector, GrayFrame};
    use std::io::Cursor;

    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _frame: &GrayFrame) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }
    }

    fn png(seed: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(64, 64, |x, y| Rgb([x as u8 ^ seed, y as u8, seed]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    #[tokio::test]
    async fn test_capture_roundtrip_through_thread() {
        let bbox = BoundingBox::new(8, 8, 32, 32);
        let engine = spawn_engine(FacePipeline::new(Box::new(FixedDetector(vec![bbox])))).unwrap();

        let capture = engine.capture(png(1)).await.unwrap();
        assert_eq!(capture.bbox, bbox);
        assert_eq!(capture.detector, "fixed");
        assert_eq!(capture.descriptor.len(), realid_core::DESCRIPTOR_LEN);
    }

    #[tokio::test]
    async fn test_capture_errors_are_forwarded() {
        let engine = spawn_engine(FacePipeline::new(Box::new(FixedDetector(vec![])))).unwrap();

        let err = engine.capture(png(2)).await.unwrap_err();
        assert!(matches!(err, EngineError::Face(FaceError::NoFaceDetected)));

        let err = engine.capture(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, EngineError::Face(FaceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_cloned_handles_share_engine() {
        let engine = spawn_engine(FacePipeline::new(Box::new(FixedDetector(vec![BoundingBox::new(0, 0, 16, 16)])))).unwrap();
        let other = engine.clone();

        let (a, b) = tokio::join!(engine.capture(png(3)), other.capture(png(3)));
        assert_eq!(a.unwrap().descriptor, b.unwrap().descriptor);
    }
}
