use std::path::PathBuf;

use ndarray::Array2;

use crate::config::Context;
use crate::data::reader::{self, ImagePathPair};
use crate::error::{Error, Result};
use crate::image_io::{ImageHelper, ImageParts};
use crate::rgba::Rgba;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingPhase {
    Training,
    Validation,
}

impl TrainingPhase {
    pub fn name(&self) -> &'static str {
        match self {
            TrainingPhase::Training => "training",
            TrainingPhase::Validation => "validation",
        }
    }
}

/// Input and target of one image, split in the same number of parts.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub input: ImageParts,
    pub target: ImageParts,

    /// Where the target came from, `None` for in-memory samples
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct Entry {
    paths: Option<ImagePathPair>,
    cached: Option<TrainingSample>,
}

#[derive(Debug, Clone)]
struct LoadSettings {
    split: usize,
    padding: bool,
    bulk_loading: bool,
    random_loading: bool,
    reduce_factor: u32,
    input_size: (usize, usize),
    output_size: (usize, usize),
}

/// Serves training and validation samples with a cursor per phase.
#[derive(Debug, Clone)]
pub struct TrainingDataFactory {
    training: Vec<Entry>,
    validation: Vec<Entry>,
    training_cursor: usize,
    validation_cursor: usize,
    settings: LoadSettings,
    helper: ImageHelper,
}

impl TrainingDataFactory {
    /// Reads the dataset description of `ctx` and splits it.
    ///
    /// A CSV file takes precedence over a folder. An empty dataset, or one
    /// whose training share is empty, is a `TrainingData` error.
    pub fn load(ctx: &Context) -> Result<Self> {
        let app = &ctx.app_params;
        let mut pairs = match (&app.training_data_file, &app.training_data_folder) {
            (Some(file), _) => reader::read_pairs_csv(file)?,
            (None, Some(folder)) => reader::read_folder(folder)?,
            (None, None) => {
                return Err(Error::TrainingData(
                    "no training data file or folder configured".to_string(),
                ))
            }
        };
        if app.random_loading {
            fastrand::shuffle(&mut pairs);
        }

        let entries = pairs
            .into_iter()
            .map(|paths| Entry {
                paths: Some(paths),
                cached: None,
            })
            .collect();
        let net = &ctx.network_params;
        let settings = LoadSettings {
            split: app.image_split,
            padding: app.enable_padding,
            bulk_loading: app.bulk_loading,
            random_loading: app.random_loading,
            reduce_factor: app.training_reduce_factor,
            input_size: (net.input_size_x, net.input_size_y),
            output_size: (net.output_size_x, net.output_size_y),
        };
        let factory = Self::split(entries, app.training_split_ratio, settings)?;
        if app.verbose {
            log::info!(
                "dataset loaded: {} images for training, {} for validation",
                factory.training.len(),
                factory.validation.len()
            );
        }
        Ok(factory)
    }

    /// Builds a dataset from in-memory `(input, target)` grids.
    pub fn from_grids(samples: Vec<(Array2<Rgba>, Array2<Rgba>)>, split_ratio: f32) -> Result<Self> {
        let entries = samples
            .into_iter()
            .map(|(input, target)| Entry {
                paths: None,
                cached: Some(TrainingSample {
                    input: ImageParts::single(input),
                    target: ImageParts::single(target),
                    source: None,
                }),
            })
            .collect();
        let settings = LoadSettings {
            split: 1,
            padding: false,
            bulk_loading: true,
            random_loading: false,
            reduce_factor: 1,
            input_size: (0, 0),
            output_size: (0, 0),
        };
        Self::split(entries, split_ratio, settings)
    }

    fn split(mut entries: Vec<Entry>, ratio: f32, settings: LoadSettings) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::TrainingData("the dataset is empty".to_string()));
        }
        let split_index = (entries.len() as f32 * ratio) as usize;
        if split_index == 0 {
            return Err(Error::TrainingData(format!(
                "a split ratio of {ratio} leaves no training image out of {}",
                entries.len()
            )));
        }
        let validation = entries.split_off(split_index.min(entries.len()));
        Ok(TrainingDataFactory {
            training: entries,
            validation,
            training_cursor: 0,
            validation_cursor: 0,
            settings,
            helper: ImageHelper::default(),
        })
    }

    pub fn size(&self, phase: TrainingPhase) -> usize {
        match phase {
            TrainingPhase::Training => self.training.len(),
            TrainingPhase::Validation => self.validation.len(),
        }
    }

    pub fn reset_counters(&mut self) {
        self.training_cursor = 0;
        self.validation_cursor = 0;
    }

    /// Reshuffles the training list when random loading is on.
    pub fn shuffle(&mut self) {
        if self.settings.random_loading {
            fastrand::shuffle(&mut self.training);
        }
    }

    /// Next sample of `phase`, `None` once the phase is exhausted.
    pub fn next(&mut self, phase: TrainingPhase) -> Result<Option<TrainingSample>> {
        let (entries, cursor) = match phase {
            TrainingPhase::Training => (&mut self.training, &mut self.training_cursor),
            TrainingPhase::Validation => (&mut self.validation, &mut self.validation_cursor),
        };
        let Some(entry) = entries.get_mut(*cursor) else {
            return Ok(None);
        };
        *cursor += 1;

        if let Some(sample) = &entry.cached {
            return Ok(Some(sample.clone()));
        }
        let paths = entry.paths.as_ref().ok_or_else(|| {
            Error::TrainingData("dataset entry has neither paths nor images".to_string())
        })?;
        let sample = load_sample(&self.helper, &self.settings, paths)?;
        if self.settings.bulk_loading {
            entry.cached = Some(sample.clone());
        }
        Ok(Some(sample))
    }
}

fn load_sample(
    helper: &ImageHelper,
    settings: &LoadSettings,
    paths: &ImagePathPair,
) -> Result<TrainingSample> {
    let (out_x, out_y) = settings.output_size;
    let (in_x, in_y) = settings.input_size;
    let target = helper.load_image(&paths.target, settings.split, settings.padding, out_x, out_y)?;
    let input = match &paths.input {
        Some(input) => helper.load_image(input, settings.split, settings.padding, in_x, in_y)?,
        None => helper.generate_input_image(&target, settings.reduce_factor, in_x, in_y),
    };
    if input.len() != target.len() {
        return Err(Error::TrainingData(format!(
            "{} splits in {} parts but its input in {}",
            paths.target.display(),
            target.len(),
            input.len()
        )));
    }
    log::debug!("loaded {} ({} parts)", paths.target.display(), target.len());
    Ok(TrainingSample {
        input,
        target,
        source: Some(paths.target.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grids(n: usize) -> Vec<(Array2<Rgba>, Array2<Rgba>)> {
        (0..n)
            .map(|i| {
                let v = Rgba::splat(i as f32);
                (Array2::from_elem((2, 2), v), Array2::from_elem((3, 3), v))
            })
            .collect()
    }

    #[test]
    fn test_split_by_ratio() {
        let factory = TrainingDataFactory::from_grids(grids(10), 0.7).unwrap();
        assert_eq!(factory.size(TrainingPhase::Training), 7);
        assert_eq!(factory.size(TrainingPhase::Validation), 3);
    }

    #[test]
    fn test_cursors_reset_per_phase() {
        let mut factory = TrainingDataFactory::from_grids(grids(3), 1.0).unwrap();
        assert_eq!(factory.size(TrainingPhase::Validation), 0);

        let mut seen = 0;
        while let Some(sample) = factory.next(TrainingPhase::Training).unwrap() {
            assert_eq!(sample.input.parts[0][(0, 0)], Rgba::splat(seen as f32));
            seen += 1;
        }
        assert_eq!(seen, 3);
        assert!(factory.next(TrainingPhase::Validation).unwrap().is_none());

        factory.reset_counters();
        assert!(factory.next(TrainingPhase::Training).unwrap().is_some());
    }

    #[test]
    fn test_empty_training_share_is_an_error() {
        assert!(matches!(
            TrainingDataFactory::from_grids(grids(1), 0.7),
            Err(Error::TrainingData(_))
        ));
        assert!(matches!(
            TrainingDataFactory::from_grids(Vec::new(), 1.0),
            Err(Error::TrainingData(_))
        ));
    }
}
