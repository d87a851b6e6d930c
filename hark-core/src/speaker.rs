//! Speaker embeddings.
//!
//! A session with a speaker model runs a separate feature extractor next to
//! the acoustic pipeline, recreated with every segment. At finalization the
//! frames that fall on speech are mean-normalised over a sliding window and
//! fed to the embedding network.

use std::collections::HashSet;

use ndarray::{Array2, Axis};

use crate::config::CmnConfig;
use crate::error::{HarkError, Result};
use crate::inference::{EmbeddingNetwork, FeatureExtractor, SpeakerFrontend};

/// Shared speaker front-end and embedding network.
pub struct SpeakerModel {
    frontend: Box<dyn SpeakerFrontend>,
    network: Box<dyn EmbeddingNetwork>,
}

impl SpeakerModel {
    pub fn new<F, N>(frontend: F, network: N) -> Self
    where
        F: SpeakerFrontend + 'static,
        N: EmbeddingNetwork + 'static,
    {
        Self {
            frontend: Box::new(frontend),
            network: Box::new(network),
        }
    }

    pub fn new_extractor(&self) -> Result<Box<dyn FeatureExtractor>> {
        self.frontend.new_extractor()
    }

    pub fn network(&self) -> &dyn EmbeddingNetwork {
        self.network.as_ref()
    }
}

impl std::fmt::Debug for SpeakerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeakerModel").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerEmbedding {
    pub vector: Vec<f32>,
    /// Speaker feature frames the embedding was computed from.
    pub frames: usize,
}

/// Subtract a sliding-window mean from every row.
///
/// The window ends at the current frame (or is centred on it when
/// `config.center`), is shifted rather than truncated at the edges, and
/// covers at least `config.min_window` frames when that many exist.
pub fn sliding_window_cmn(features: &Array2<f32>, config: &CmnConfig) -> Array2<f32> {
    let num_frames = features.nrows();
    let dim = features.ncols();
    let mut out = features.clone();
    if num_frames == 0 {
        return out;
    }

    // prefix[t] = sum of rows [0, t)
    let mut prefix = Array2::<f64>::zeros((num_frames + 1, dim));
    for t in 0..num_frames {
        for d in 0..dim {
            prefix[[t + 1, d]] = prefix[[t, d]] + f64::from(features[[t, d]]);
        }
    }

    let window = config.window as isize;
    let frames = num_frames as isize;
    for t in 0..frames {
        let (mut start, mut end) = if config.center {
            let start = t - window / 2;
            (start, start + window)
        } else {
            (t - window, t + 1)
        };
        if start < 0 {
            end -= start;
            start = 0;
        }
        if !config.center && end < config.min_window as isize {
            end = config.min_window as isize;
        }
        if end > frames {
            start = (start - (end - frames)).max(0);
            end = frames;
        }
        let count = (end - start) as f64;
        let (start, end) = (start as usize, end as usize);
        let mut row = out.row_mut(t as usize);
        for d in 0..dim {
            let mean = (prefix[[end, d]] - prefix[[start, d]]) / count;
            row[d] -= mean as f32;
        }
    }
    out
}

/// Compute an embedding from the speaker frames that fall on speech.
///
/// Speaker frame `i` is kept when decoder frame `i / subsampling` is listed
/// in `nonsilence`. Returns `Ok(None)` with fewer than `min_frames` kept.
///
/// # Errors
/// Network failures are passed through.
pub fn extract_embedding(
    extractor: &dyn FeatureExtractor,
    network: &dyn EmbeddingNetwork,
    nonsilence: &[usize],
    subsampling: usize,
    min_frames: usize,
    cmn: &CmnConfig,
) -> Result<Option<SpeakerEmbedding>> {
    let speech: HashSet<usize> = nonsilence.iter().copied().collect();
    let subsampling = subsampling.max(1);
    let dim = extractor.dim();

    let mut flat = Vec::new();
    let mut kept = 0usize;
    for i in 0..extractor.num_frames_ready() {
        if !speech.contains(&(i / subsampling)) {
            continue;
        }
        flat.extend(extractor.frame(i));
        kept += 1;
    }
    if kept < min_frames {
        return Ok(None);
    }

    let features = Array2::from_shape_vec((kept, dim), flat)
        .map_err(|e| HarkError::Speaker(format!("speaker feature matrix: {e}")))?;
    let normalized = sliding_window_cmn(&features, cmn);
    let vector = network.embed(normalized.view())?;
    Ok(Some(SpeakerEmbedding {
        vector: vector.to_vec(),
        frames: kept,
    }))
}

/// Column means, handy for pooling networks.
pub fn mean_pool(features: ndarray::ArrayView2<'_, f32>) -> ndarray::Array1<f32> {
    features
        .mean_axis(Axis(0))
        .unwrap_or_else(|| ndarray::Array1::zeros(features.ncols()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, ArrayView2};

    use super::*;

    #[test]
    fn short_input_uses_the_whole_matrix_mean() {
        let feats = array![[1.0_f32], [2.0], [3.0]];
        let out = sliding_window_cmn(&feats, &CmnConfig::default());
        assert_relative_eq!(out[[0, 0]], -1.0, epsilon = 1e-6);
        assert_relative_eq!(out[[1, 0]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(out[[2, 0]], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn trailing_window_without_min_window() {
        let config = CmnConfig {
            window: 1,
            min_window: 1,
            center: false,
        };
        let feats = array![[0.0_f32], [2.0], [4.0]];
        let out = sliding_window_cmn(&feats, &config);
        // t=0 → [0,2) mean 1 ; t=1 → [0,2) mean 1 ; t=2 → [1,3) mean 3
        assert_relative_eq!(out[[0, 0]], -1.0, epsilon = 1e-6);
        assert_relative_eq!(out[[1, 0]], 1.0, epsilon = 1e-6);
        assert_relative_eq!(out[[2, 0]], 1.0, epsilon = 1e-6);
    }

    struct Frames(Vec<Vec<f32>>);

    impl FeatureExtractor for Frames {
        fn accept_waveform(&mut self, _sample_rate: f32, _samples: &[f32]) {}
        fn num_frames_ready(&self) -> usize {
            self.0.len()
        }
        fn dim(&self) -> usize {
            2
        }
        fn frame(&self, index: usize) -> Vec<f32> {
            self.0[index].clone()
        }
    }

    struct RowCount;

    impl EmbeddingNetwork for RowCount {
        fn embed(&self, features: ArrayView2<'_, f32>) -> Result<Array1<f32>> {
            Ok(Array1::from_elem(1, features.nrows() as f32))
        }
    }

    #[test]
    fn silence_frames_are_excluded() {
        let frames = Frames((0..9).map(|i| vec![i as f32, 1.0]).collect());
        // decoder frames 0 and 2 are speech → speaker frames 0..3 and 6..9
        let emb = extract_embedding(&frames, &RowCount, &[0, 2], 3, 1, &CmnConfig::default())
            .expect("embed")
            .expect("enough frames");
        assert_eq!(emb.frames, 6);
        assert_eq!(emb.vector, vec![6.0]);
    }

    #[test]
    fn too_few_frames_yield_none() {
        let frames = Frames((0..9).map(|i| vec![i as f32, 1.0]).collect());
        let emb = extract_embedding(&frames, &RowCount, &[0], 3, 30, &CmnConfig::default())
            .expect("not an error");
        assert_eq!(emb, None);
    }

    #[test]
    fn mean_pool_averages_rows() {
        let feats = array![[1.0_f32, 4.0], [3.0, 0.0]];
        assert_eq!(mean_pool(feats.view()).to_vec(), vec![2.0, 2.0]);
    }
}
