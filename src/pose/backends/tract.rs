#![cfg(feature = "pose-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::pose::backend::PoseBackend;
use crate::pose::result::{Keypoint, PersonPose, PoseEstimate, KEYPOINTS_PER_PERSON};

/// Tract-based backend running a local ONNX multi-person pose model.
///
/// The model is expected to take a `1x3xHxW` float tensor and emit grouped
/// keypoints shaped `(people, 17, 3)` as `(x, y, score)` rows, with
/// leading batch dimensions of size 1 tolerated. Keypoints scoring below
/// the threshold are dropped (zeroed) so that downstream counting treats
/// them as absent.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    score_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX pose model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
            score_threshold: 0.1,
        })
    }

    /// Override the default per-keypoint score threshold.
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            },
        );
        Ok(input.into_tensor())
    }

    fn extract_people(&self, outputs: TVec<TValue>) -> Result<Vec<PersonPose>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        // Squeeze leading batch dimensions down to (people, 17, 3).
        let mut view = view.view();
        while view.ndim() > 3 && view.shape()[0] == 1 {
            view = view.index_axis_move(tract_ndarray::Axis(0), 0);
        }
        if view.ndim() != 3 || view.shape()[1] != KEYPOINTS_PER_PERSON || view.shape()[2] < 2 {
            return Err(anyhow!(
                "unexpected pose output shape {:?}; expected (people, {}, 3)",
                view.shape(),
                KEYPOINTS_PER_PERSON
            ));
        }
        let has_score = view.shape()[2] >= 3;

        let mut people = Vec::with_capacity(view.shape()[0]);
        for person_view in view.outer_iter() {
            let mut pose = PersonPose::default();
            for (slot, row) in person_view.outer_iter().enumerate() {
                let score = if has_score { row[2] } else { 1.0 };
                if score < self.score_threshold {
                    continue;
                }
                pose.keypoints[slot] = Keypoint {
                    x: row[0],
                    y: row[1],
                    confidence: score,
                };
            }
            people.push(pose);
        }
        Ok(people)
    }
}

impl PoseBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn estimate(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<PoseEstimate> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX pose inference failed")?;
        let people = self.extract_people(outputs)?;
        Ok(PoseEstimate { people })
    }
}
