//! Batch pipeline: photo set → photogrammetry engine → DEM → relief render.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::dem::read_dem;
use crate::engine::{build_options, AssetPattern, EngineClient, QualityPreset, ResultArchive};
use crate::imagery::{downscale_jpeg_in_place, summarize_gps, DownscaleOutcome};
use crate::job::{JobResult, JobStateStore};
use crate::relief::{render, ReliefStyle};
use crate::storage::AssetStoreFactory;
use crate::task::{resolve_location, BatchTask, GenerationMode, SourceLocation, TaskDescriptor};
use crate::BoxFuture;

use super::{
    blocking, delete_sources, download_inputs, publish, record_failure, record_result, track_job,
    JobOutcome, JobPipeline, PipelineError, PipelineSettings, ScratchSpace, BATCH_RESULT_PREFIX,
    ORTHOPHOTO_PREFIX,
};

/// Rendered heightmap on disk.
struct Heightmap {
    path: PathBuf,
    width: u32,
    height: u32,
}

/// Local files taken from the engine's results.
#[derive(Default)]
struct BatchAssets {
    heightmap: Option<Heightmap>,
    orthophoto: Option<PathBuf>,
}

/// Renders heightmaps from photo sets via the photogrammetry engine.
pub struct BatchPipeline {
    stores: Arc<dyn AssetStoreFactory>,
    jobs: Arc<dyn JobStateStore>,
    engine: Arc<EngineClient>,
    settings: PipelineSettings,
}

impl BatchPipeline {
    pub fn new(
        stores: Arc<dyn AssetStoreFactory>,
        jobs: Arc<dyn JobStateStore>,
        engine: Arc<EngineClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            stores,
            jobs,
            engine,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(job_id = %task.batch_job_id))]
    async fn run(
        &self,
        task: &BatchTask,
        abort: &CancellationToken,
    ) -> Result<JobOutcome, PipelineError> {
        let started = Instant::now();
        task.validate()?;
        info!(
            images = task.image_urls.len(),
            fast_mode = task.fast_mode,
            merge_method = %task.merge_method,
            generation_mode = task.generation_mode.as_str(),
            "Processing batch"
        );

        let store = self.stores.connect(task.credentials())?;
        let sources = task
            .image_urls
            .iter()
            .map(|url| resolve_location(url, &self.settings.known_buckets, &task.output_bucket))
            .collect::<Result<Vec<SourceLocation>, _>>()?;

        let scratch = ScratchSpace::create(&self.settings.scratch_root, &task.batch_job_id)?;
        let images = download_inputs(store.as_ref(), &sources, &scratch).await?;

        let images = if task.fast_mode {
            let max_side = self.settings.fast_mode_max_side;
            blocking(move || {
                downscale_all(&images, max_side);
                Ok(images)
            })
            .await?
        } else {
            images
        };

        let gps_paths = images.clone();
        let gps = blocking(move || Ok(summarize_gps(&gps_paths))).await?;
        if gps.none_tagged() {
            warn!(total = gps.total, "No input image carries GPS coordinates, continuing");
        } else if gps.all_tagged() {
            info!(total = gps.total, "All input images carry GPS coordinates");
        } else {
            warn!(with_gps = gps.with_gps, total = gps.total, "Some input images lack GPS coordinates");
        }

        let preset = QualityPreset::from_merge_method(&task.merge_method);
        let options = build_options(preset, task.fast_mode);
        let task_id = self.engine.submit(&images, &options).await?;
        self.engine.poll(&task_id, abort).await?;
        let archive = self.engine.download_results(&task_id, scratch.path()).await?;

        let mode = task.generation_mode;
        let dem_path = scratch.file("dem.tif");
        let png_path = scratch.file("heightmap.png");
        let ortho_path = scratch.file("orthophoto.tif");
        let assets = blocking(move || {
            extract_assets(archive, mode, dem_path, png_path, ortho_path)
        })
        .await?;

        let public_host = task.store.public_host();
        let mut bytes_uploaded = 0;

        let mut result_url = None;
        let mut dimensions = None;
        if let Some(heightmap) = &assets.heightmap {
            let key = format!("{}/{}_heightmap.png", BATCH_RESULT_PREFIX, task.batch_job_id);
            let (url, bytes) = publish(
                store.as_ref(),
                &heightmap.path,
                &task.output_bucket,
                &key,
                public_host,
            )
            .await?;
            bytes_uploaded += bytes;
            result_url = Some(url);
            dimensions = Some((heightmap.width, heightmap.height));
        }

        let mut orthophoto_url = None;
        if let Some(orthophoto) = &assets.orthophoto {
            let key = format!("{}/{}_orthophoto.tif", ORTHOPHOTO_PREFIX, task.batch_job_id);
            let (url, bytes) = publish(
                store.as_ref(),
                orthophoto,
                &self.settings.orthophoto_bucket,
                &key,
                public_host,
            )
            .await?;
            bytes_uploaded += bytes;
            orthophoto_url = Some(url);
        }

        let result = JobResult {
            result_url: result_url.clone(),
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            processing_time: started.elapsed(),
            orthophoto_url: orthophoto_url.clone(),
        };
        record_result(self.jobs.as_ref(), &task.batch_job_id, &result).await?;
        info!(
            task_id = %task_id,
            result_url = ?result_url,
            orthophoto_url = ?orthophoto_url,
            elapsed_secs = result.processing_time.as_secs(),
            "Batch completed"
        );

        delete_sources(store.as_ref(), &sources).await;

        Ok(JobOutcome {
            job_id: task.batch_job_id.clone(),
            result_url,
            orthophoto_url,
            dimensions,
            elapsed: result.processing_time,
            bytes_uploaded,
        })
    }
}

impl JobPipeline for BatchPipeline {
    type Task = BatchTask;

    fn name(&self) -> &'static str {
        "batch"
    }

    fn max_prefetch(&self) -> Option<u16> {
        Some(1)
    }

    fn process<'a>(
        &'a self,
        task: &'a BatchTask,
        abort: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<JobOutcome, PipelineError>> {
        Box::pin(track_job(
            self.jobs.as_ref(),
            &task.batch_job_id,
            self.run(task, abort),
        ))
    }

    fn mark_failed<'a>(&'a self, job_id: &'a str, message: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(record_failure(self.jobs.as_ref(), job_id, message))
    }
}

/// Downscales oversized images, keeping originals whose resize fails.
fn downscale_all(images: &[PathBuf], max_side: u32) {
    let mut resized = 0;
    let mut skipped = 0;
    for path in images {
        match downscale_jpeg_in_place(path, max_side) {
            Ok(DownscaleOutcome::Resized { .. }) => resized += 1,
            Ok(DownscaleOutcome::Unchanged { .. }) => {}
            Ok(DownscaleOutcome::NotJpeg) => skipped += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Downscale failed, keeping original"),
        }
    }
    info!(resized, skipped, total = images.len(), max_side, "Fast mode downscale done");
}

/// Pulls the requested assets out of the archive and renders the DEM.
///
/// The archive is consumed and removed before this returns.
fn extract_assets(
    archive: ResultArchive,
    mode: GenerationMode,
    dem_path: PathBuf,
    png_path: PathBuf,
    ortho_path: PathBuf,
) -> Result<BatchAssets, PipelineError> {
    let mut assets = BatchAssets::default();

    if mode.wants_heightmap() {
        archive.extract(&AssetPattern::dem(), &dem_path)?;
        let dem = read_dem(&dem_path)?;
        let rendered = render(&dem.raster, &ReliefStyle::dem())?;
        rendered.save_png(&png_path)?;
        assets.heightmap = Some(Heightmap {
            path: png_path,
            width: rendered.width(),
            height: rendered.height(),
        });
    }

    if mode.wants_orthophoto() {
        archive.extract(&AssetPattern::orthophoto(), &ortho_path)?;
        assets.orthophoto = Some(ortho_path);
    }

    Ok(assets)
}

#[cfg(test)]
mod tests {
    use tempfile::{NamedTempFile, TempDir};

    use super::*;
    use crate::dem::tests::write_dem;
    use crate::engine::{write_zip, EngineError};

    fn archive(dir: &TempDir, with_dem: bool) -> ResultArchive {
        let dem_file = dir.path().join("source-dsm.tif");
        let values: Vec<f32> = (0..64 * 48).map(|i| 10.0 + (i % 64) as f32 * 0.5).collect();
        write_dem(&dem_file, 64, 48, &values, Some("-9999"));
        let dem = std::fs::read(&dem_file).unwrap();

        let mut entries: Vec<(&str, &[u8])> = vec![
            ("odm_orthophoto/odm_orthophoto.tif", &b"ortho"[..]),
            ("odm_report/report.pdf", &b"pdf"[..]),
        ];
        if with_dem {
            entries.push(("odm_dem/dsm.tif", dem.as_slice()));
        }
        let file = NamedTempFile::new_in(dir.path()).unwrap();
        write_zip(file.path(), &entries);
        ResultArchive::new(file)
    }

    fn paths(dir: &TempDir) -> (PathBuf, PathBuf, PathBuf) {
        (
            dir.path().join("dem.tif"),
            dir.path().join("heightmap.png"),
            dir.path().join("orthophoto.tif"),
        )
    }

    #[test]
    fn test_both_products() {
        let dir = TempDir::new().unwrap();
        let (dem, png, ortho) = paths(&dir);
        let assets =
            extract_assets(archive(&dir, true), GenerationMode::Both, dem, png.clone(), ortho.clone())
                .unwrap();

        let heightmap = assets.heightmap.unwrap();
        assert_eq!((heightmap.width, heightmap.height), (64, 48));
        assert_eq!(heightmap.path, png);
        assert!(png.exists());
        assert_eq!(std::fs::read(assets.orthophoto.unwrap()).unwrap(), b"ortho");
    }

    #[test]
    fn test_orthophoto_only_skips_dem() {
        let dir = TempDir::new().unwrap();
        let (dem, png, ortho) = paths(&dir);
        let assets =
            extract_assets(archive(&dir, false), GenerationMode::Orthophoto, dem.clone(), png, ortho)
                .unwrap();
        assert!(assets.heightmap.is_none());
        assert!(assets.orthophoto.is_some());
        assert!(!dem.exists());
    }

    #[test]
    fn test_missing_dem_fails() {
        let dir = TempDir::new().unwrap();
        let (dem, png, ortho) = paths(&dir);
        let err = extract_assets(archive(&dir, false), GenerationMode::Heightmap, dem, png, ortho)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            PipelineError::Engine(EngineError::AssetNotFound { .. })
        ));
    }

    #[test]
    fn test_downscale_failure_keeps_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("input_0.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();
        downscale_all(&[path.clone()], 2000);
        assert_eq!(std::fs::read(&path).unwrap(), b"not a jpeg");
    }

    #[test]
    fn test_fast_mode_only_rewrites_jpeg_inputs() {
        let dir = TempDir::new().unwrap();
        let photo = image::RgbImage::from_pixel(300, 150, image::Rgb([40, 90, 140]));
        let png = dir.path().join("input_0.png");
        let jpg = dir.path().join("input_1.jpg");
        photo.save(&png).unwrap();
        photo.save(&jpg).unwrap();
        let png_bytes = std::fs::read(&png).unwrap();

        downscale_all(&[png.clone(), jpg.clone()], 100);

        assert_eq!(std::fs::read(&png).unwrap(), png_bytes);
        let resized = image::open(&jpg).unwrap();
        assert_eq!((resized.width(), resized.height()), (100, 50));
    }
}
