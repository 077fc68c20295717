//! Epoch loop: dataset iteration, adaptive learning rate, early stopping,
//! checkpointing and two-stage cancellation.

use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::config::{Context, NO_MAX_EPOCHS};
use crate::data::{TrainingDataFactory, TrainingPhase, TrainingSample};
use crate::engine::{create_engine, PropagationEngine};
use crate::error::{Error, Result};
use crate::loss::Loss;
use crate::model::Network;
use crate::optimizer::Optimizer;
use crate::persistence;
use crate::utils::{hms, percent_delta};

/// Reported before each sample is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainingProgress {
    /// 1-based epoch number
    pub epoch: usize,
    pub phase: TrainingPhase,

    /// 1-based sample index within the phase
    pub index: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxEpochs,
    NoImprovement,

    /// Graceful stop, the last epoch completed and the network was saved
    Interrupted,

    /// Immediate stop, mid-epoch and without saving
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Fully completed epochs
    pub epochs: usize,
    pub training_loss: Option<f32>,
    pub validation_loss: Option<f32>,
    pub learning_rate: f32,

    /// Number of successful saves
    pub checkpoints: usize,
    pub stop_reason: StopReason,
}

type ProgressCallback = Box<dyn FnMut(&TrainingProgress)>;

pub struct Trainer {
    ctx: Context,
    network: Network,
    engine: Box<dyn PropagationEngine>,
    factory: TrainingDataFactory,
    token: CancellationToken,
    optimizer: Optimizer,
    loss: Loss,
    progress: Option<ProgressCallback>,

    /// Whether the network state of the last completed epoch is on disk
    saved: bool,
    checkpoints: usize,
}

impl Trainer {
    /// Creates a trainer with the engine selected by the context backend.
    pub fn new(
        ctx: Context,
        network: Network,
        factory: TrainingDataFactory,
        token: CancellationToken,
    ) -> Result<Self> {
        let engine = create_engine(ctx.app_params.backend, &network, ctx.app_params.enable_parallel)?;
        Ok(Self::with_engine(ctx, network, factory, token, engine))
    }

    pub fn with_engine(
        ctx: Context,
        network: Network,
        factory: TrainingDataFactory,
        token: CancellationToken,
        engine: Box<dyn PropagationEngine>,
    ) -> Self {
        let optimizer = Optimizer::from_params(&ctx.network_params, &ctx.app_params);
        Trainer {
            ctx,
            network,
            engine,
            factory,
            token,
            optimizer,
            loss: Loss::MeanSquaredError,
            progress: None,
            saved: false,
            checkpoints: 0,
        }
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&TrainingProgress) + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    /// Current hyperparameters, learning rate included.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    fn should_continue(&self, epoch: usize, epochs_without_improvement: usize) -> bool {
        let app = &self.ctx.app_params;
        let improving = epochs_without_improvement < app.max_epochs_without_improvement;
        let below_max = app.max_epochs == NO_MAX_EPOCHS || epoch < app.max_epochs;
        improving && below_max
    }

    /// Runs epochs until a stop condition is met and saves the result.
    ///
    /// A graceful stop finishes the running epoch and saves. An immediate
    /// stop returns at the next sample or part boundary without saving.
    pub fn run(&mut self) -> Result<TrainingReport> {
        if self.factory.size(TrainingPhase::Training) == 0 {
            return Err(Error::TrainingData("no training data found".to_string()));
        }
        log::info!(
            "starting training on {} engine, interrupt once to stop after the current epoch",
            self.engine.name()
        );
        let start = Instant::now();

        let mut previous_training: Option<f32> = None;
        let mut previous_validation: Option<f32> = None;
        let mut epoch = 0;
        let mut epochs_without_improvement = 0;
        self.saved = false;

        let stop_reason = loop {
            if self.token.is_stop_now_requested() {
                break StopReason::Aborted;
            }
            if self.token.is_stop_requested() {
                break StopReason::Interrupted;
            }
            if !self.should_continue(epoch, epochs_without_improvement) {
                break if epochs_without_improvement >= self.ctx.app_params.max_epochs_without_improvement {
                    StopReason::NoImprovement
                } else {
                    StopReason::MaxEpochs
                };
            }

            self.factory.shuffle();
            let Some(training_loss) = self.run_phase(epoch, TrainingPhase::Training)? else {
                break StopReason::Aborted;
            };
            let Some(validation_loss) = self.run_phase(epoch, TrainingPhase::Validation)? else {
                break StopReason::Aborted;
            };

            log::info!(
                "epoch {}: training loss {:.2}% ({:+.2}%), validation loss {:.2}% ({:+.2}%), learning rate {}",
                epoch + 1,
                training_loss * 100.0,
                percent_delta(previous_training, training_loss),
                validation_loss * 100.0,
                percent_delta(previous_validation, validation_loss),
                self.optimizer.learning_rate
            );

            self.saved = false;
            epoch += 1;

            if let Some(previous) = previous_validation {
                let rate = self.optimizer.adapt(validation_loss, previous);
                self.ctx.network_params.learning_rate = rate;
            }

            let improved = previous_validation.map_or(true, |p| validation_loss < p)
                || previous_training.map_or(true, |p| training_loss < p);
            if improved {
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
            }
            previous_training = Some(training_loss);
            previous_validation = Some(validation_loss);

            let autosave = self.ctx.app_params.epoch_autosave;
            if autosave > 0 && epoch % autosave == 0 {
                self.save();
            }
        };

        log::info!("exiting training: {stop_reason:?} after {epoch} epochs");
        if stop_reason != StopReason::Aborted {
            self.save();
        }
        let (h, m, s) = hms(start.elapsed());
        log::info!("elapsed time: {h}h {m}m {s}s");

        Ok(TrainingReport {
            epochs: epoch,
            training_loss: previous_training,
            validation_loss: previous_validation,
            learning_rate: self.optimizer.learning_rate,
            checkpoints: self.checkpoints,
            stop_reason,
        })
    }

    /// Saves unless already saved since the last epoch or saving is disabled.
    /// A failed save is logged and training goes on.
    fn save(&mut self) {
        if self.saved || self.ctx.app_params.no_save {
            return;
        }
        match persistence::export_network(&self.network, &self.ctx) {
            Ok(()) => {
                self.saved = true;
                self.checkpoints += 1;
            }
            Err(e) => log::error!("saving the network failed: {e}"),
        }
    }

    /// Average sampled loss of one phase, `None` when aborted.
    fn run_phase(&mut self, epoch: usize, phase: TrainingPhase) -> Result<Option<f32>> {
        self.factory.reset_counters();
        let count = self.factory.size(phase);
        let frequency = ((count as f64).sqrt() as usize).max(1);

        let mut loss = 0.0;
        let mut sampled = 0;
        let mut index = 0;
        while let Some(sample) = self.factory.next(phase)? {
            index += 1;
            if let Some(callback) = self.progress.as_mut() {
                callback(&TrainingProgress {
                    epoch: epoch + 1,
                    phase,
                    index,
                    count,
                });
            }
            if self.token.is_stop_now_requested() {
                return Ok(None);
            }
            if self.ctx.app_params.verbose {
                log::info!("epoch {}, {}: image {index}/{count}", epoch + 1, phase.name());
            }

            let with_loss = index % frequency == 0;
            let Some(sample_loss) = self.run_sample(&sample, phase, with_loss)? else {
                return Ok(None);
            };
            if with_loss {
                loss += sample_loss;
                sampled += 1;
            }
        }
        Ok(Some(if sampled == 0 { 0.0 } else { loss / sampled as f32 }))
    }

    /// Average loss over the parts of one image, `None` when aborted.
    fn run_sample(
        &mut self,
        sample: &TrainingSample,
        phase: TrainingPhase,
        with_loss: bool,
    ) -> Result<Option<f32>> {
        if sample.input.len() != sample.target.len() {
            return Err(Error::TrainingData(
                "input and target have different part counts".to_string(),
            ));
        }
        let params = &self.ctx.network_params;
        let (error_min, error_max) = (params.error_min, params.error_max);

        let mut loss = 0.0;
        for (i, (input, target)) in sample.input.parts.iter().zip(&sample.target.parts).enumerate() {
            if self.token.is_stop_now_requested() {
                return Ok(None);
            }
            let output = self.engine.forward(&mut self.network, input)?;
            if with_loss {
                loss += self.loss.calculate(&output, target)?;
            }
            if phase == TrainingPhase::Training {
                self.engine.backward(&mut self.network, target, error_min, error_max)?;
                self.engine
                    .update_weights(&mut self.network, self.optimizer.learning_rate)?;
            }
            log::debug!("{} part {}/{} done", phase.name(), i + 1, sample.input.len());
        }
        let parts = sample.input.len().max(1) as f32;
        Ok(Some(loss / parts))
    }
}
