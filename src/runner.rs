use crate::cancel::CancellationToken;
use crate::config::{Context, RunMode};
use crate::data::TrainingDataFactory;
use crate::enhancer;
use crate::error::Result;
use crate::persistence;
use crate::training::{Trainer, TrainingReport};

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Enhanced,
    Trained(TrainingReport),
}

/// Validates the context and runs the selected mode.
pub fn run(mut ctx: Context, token: CancellationToken) -> Result<RunOutcome> {
    ctx.validate()?;
    match ctx.app_params.run_mode {
        RunMode::Enhancer => {
            enhancer::run_enhancer(&mut ctx)?;
            Ok(RunOutcome::Enhanced)
        }
        RunMode::Training => {
            let network = persistence::create_or_import(&mut ctx)?;
            let factory = TrainingDataFactory::load(&ctx)?;
            let mut trainer = Trainer::new(ctx, network, factory, token)?;
            Ok(RunOutcome::Trained(trainer.run()?))
        }
    }
}
