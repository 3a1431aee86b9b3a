//! Fetch-then-segment workflow with a stub segmentation backend

mod common;

use common::encoded_image;
use common::http_server::{Reply, TestServer};
use image::{DynamicImage, ImageFormat};
use sam_prep::{
    BatchSummary, ImageBatchDownloader, ImageFetchConfig, MaskGenerator, PointPrompt,
    Result, SegmentationBackend, SegmentationMask,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Marks the left half of the image up to the prompt column as foreground
#[derive(Default)]
struct HalfPlaneBackend {
    initialized: bool,
    init_calls: Arc<Mutex<usize>>,
}

impl SegmentationBackend for HalfPlaneBackend {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.initialized {
            return Ok(None);
        }
        *self.init_calls.lock().unwrap() += 1;
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn predict(&mut self, image: &DynamicImage, prompt: &PointPrompt) -> Result<SegmentationMask> {
        let (width, height) = (image.width(), image.height());
        let data = (0..height)
            .flat_map(|_| (0..width).map(|x| if x <= prompt.x { 255 } else { 0 }))
            .collect();
        SegmentationMask::new(width, height, data)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &str {
        "half-plane"
    }
}

async fn fetch_images(server: &TestServer, dir: &std::path::Path) -> BatchSummary {
    let urls = vec![
        server.url("/one.png"),
        server.url("/two.jpg"),
        server.url("/gone.png"),
    ];
    ImageBatchDownloader::new(&ImageFetchConfig::default())
        .unwrap()
        .batch_download(&urls, dir)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_fetched_images_get_masks() {
    let server = TestServer::start(vec![
        ("/one.png", vec![Reply::Body(encoded_image(16, 12, ImageFormat::Png))]),
        ("/two.jpg", vec![Reply::Body(encoded_image(9, 5, ImageFormat::Jpeg))]),
    ]);
    let temp_dir = TempDir::new().unwrap();
    let images = temp_dir.path().join("downloaded_images");

    let fetched = fetch_images(&server, &images).await;
    assert_eq!(fetched.succeeded, 2);

    let backend = HalfPlaneBackend::default();
    let init_calls = Arc::clone(&backend.init_calls);
    let mut generator = MaskGenerator::with_backend(Box::new(backend));
    let summary = generator.process_directory(&images).unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(*init_calls.lock().unwrap(), 1);

    let masks = images.join("masks");
    let mask = image::open(masks.join("image_1_mask.png")).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (16, 12));
    // Centre prompt at x = 8
    assert_eq!(mask.get_pixel(8, 6).0, [255]);
    assert_eq!(mask.get_pixel(9, 6).0, [0]);

    let mask = image::open(masks.join("image_2_mask.png")).unwrap().to_luma8();
    assert_eq!(mask.dimensions(), (9, 5));
    assert_eq!(mask.get_pixel(4, 0).0, [255]);
    assert_eq!(mask.get_pixel(5, 0).0, [0]);
}

#[tokio::test]
async fn test_custom_output_directory() {
    let server = TestServer::start(vec![
        ("/one.png", vec![Reply::Body(encoded_image(4, 4, ImageFormat::Png))]),
        ("/two.jpg", vec![Reply::Body(encoded_image(4, 4, ImageFormat::Jpeg))]),
    ]);
    let temp_dir = TempDir::new().unwrap();
    let images = temp_dir.path().join("in");
    let out = temp_dir.path().join("out");
    fetch_images(&server, &images).await;

    let mut generator = MaskGenerator::with_backend(Box::new(HalfPlaneBackend::default()))
        .with_output_dir(Some(out.clone()));
    let summary = generator.process_directory(&images).unwrap();

    assert_eq!(summary.output_dir, out);
    assert_eq!(
        summary.outputs,
        vec![out.join("image_1_mask.png"), out.join("image_2_mask.png")]
    );
    assert!(!images.join("masks").exists());
}
