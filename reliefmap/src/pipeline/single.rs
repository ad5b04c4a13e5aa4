//! Single-image pipeline: photo → depth estimate → relief render.

use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::depth::{to_height_field, DepthEstimator};
use crate::imagery::{check_image_file, load_rgb, resize_to_fit};
use crate::job::{JobResult, JobStateStore};
use crate::relief::{render, RasterBuffer, ReliefStyle};
use crate::storage::AssetStoreFactory;
use crate::task::{resolve_location, SingleTask, TaskDescriptor};
use crate::BoxFuture;

use super::{
    blocking, delete_sources, download_inputs, publish, record_failure, record_result, track_job,
    JobOutcome, JobPipeline, PipelineError, PipelineSettings, ScratchSpace, SINGLE_RESULT_PREFIX,
};

/// Renders heightmaps from single photos via a depth estimator.
pub struct SinglePipeline {
    stores: Arc<dyn AssetStoreFactory>,
    jobs: Arc<dyn JobStateStore>,
    depth: Arc<dyn DepthEstimator>,
    settings: PipelineSettings,
}

impl SinglePipeline {
    pub fn new(
        stores: Arc<dyn AssetStoreFactory>,
        jobs: Arc<dyn JobStateStore>,
        depth: Arc<dyn DepthEstimator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            stores,
            jobs,
            depth,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(job_id = %task.job_id))]
    async fn run(&self, task: &SingleTask) -> Result<JobOutcome, PipelineError> {
        let started = Instant::now();
        task.validate()?;

        let store = self.stores.connect(task.credentials())?;
        let source = resolve_location(
            &task.image_url,
            &self.settings.known_buckets,
            &task.output_bucket,
        )?;
        let sources = [source];

        let scratch = ScratchSpace::create(&self.settings.scratch_root, &task.job_id)?;
        let input = download_inputs(store.as_ref(), &sources, &scratch)
            .await?
            .remove(0);

        let limits = self.settings.image_limits;
        let image: RgbImage = blocking(move || {
            check_image_file(&input)?;
            let image = load_rgb(&input)?;
            limits.validate(image.width(), image.height())?;
            Ok(resize_to_fit(image, limits.working_side))
        })
        .await?;

        info!(estimator = self.depth.name(), width = image.width(), height = image.height(), "Estimating depth");
        let depth = self.depth.estimate(&image).await?;
        drop(image);

        let output = scratch.file("heightmap.png");
        let png = output.clone();
        let (width, height) = blocking(move || {
            let field = to_height_field(&depth);
            let raster = RasterBuffer::from_gray(&field)?;
            let rendered = render(&raster, &ReliefStyle::single())?;
            rendered.save_png(&png)?;
            Ok((rendered.width(), rendered.height()))
        })
        .await?;

        let key = format!("{}/{}_heightmap.png", SINGLE_RESULT_PREFIX, task.job_id);
        let (url, bytes) = publish(
            store.as_ref(),
            &output,
            &task.output_bucket,
            &key,
            task.store.public_host(),
        )
        .await?;

        let result = JobResult {
            result_url: Some(url.clone()),
            width: Some(width),
            height: Some(height),
            processing_time: started.elapsed(),
            orthophoto_url: None,
        };
        record_result(self.jobs.as_ref(), &task.job_id, &result).await?;
        info!(url = %url, width, height, elapsed_ms = result.processing_time.as_millis() as u64, "Job completed");

        delete_sources(store.as_ref(), &sources).await;

        Ok(JobOutcome {
            job_id: task.job_id.clone(),
            result_url: Some(url),
            orthophoto_url: None,
            dimensions: Some((width, height)),
            elapsed: result.processing_time,
            bytes_uploaded: bytes,
        })
    }
}

impl JobPipeline for SinglePipeline {
    type Task = SingleTask;

    fn name(&self) -> &'static str {
        "single"
    }

    fn process<'a>(
        &'a self,
        task: &'a SingleTask,
        _abort: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<JobOutcome, PipelineError>> {
        Box::pin(track_job(self.jobs.as_ref(), &task.job_id, self.run(task)))
    }

    fn mark_failed<'a>(&'a self, job_id: &'a str, message: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(record_failure(self.jobs.as_ref(), job_id, message))
    }
}
