use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use approx::assert_relative_eq;
use ndarray::Array2;
use pixgrid::{
    CancellationToken, Context, CpuEngine, NetworkBuilder, NetworkParams, Rgba, RunMode,
    StopReason, Trainer, TrainingDataFactory, TrainingPhase, TrainingProgress,
};
use tempfile::tempdir;

fn context(export: &Path) -> Context {
    let mut ctx = Context::default();
    ctx.app_params.run_mode = RunMode::Training;
    ctx.app_params.network_to_export = Some(export.to_path_buf());
    ctx.app_params.max_epochs = 3;
    ctx.app_params.max_epochs_without_improvement = 100;
    ctx.app_params.epoch_autosave = 100;
    ctx.app_params.enable_parallel = false;
    ctx.network_params = NetworkParams {
        input_size_x: 2,
        input_size_y: 2,
        hidden_size_x: 3,
        hidden_size_y: 2,
        output_size_x: 3,
        output_size_y: 3,
        hiddens_count: 1,
        learning_rate: 0.1,
        ..NetworkParams::default()
    };
    ctx
}

fn pair(level: f32) -> (Array2<Rgba>, Array2<Rgba>) {
    (
        Array2::from_elem((2, 2), Rgba::splat(level)),
        Array2::from_elem((3, 3), Rgba::splat(1.0 - level)),
    )
}

fn trainer(ctx: Context, samples: usize, split: f32, token: CancellationToken) -> Trainer {
    let network = NetworkBuilder::new(&ctx.network_params).seed(Some(13)).build().unwrap();
    let data = (0..samples).map(|i| pair(0.2 + 0.1 * i as f32)).collect();
    let factory = TrainingDataFactory::from_grids(data, split).unwrap();
    Trainer::with_engine(ctx, network, factory, token, Box::new(CpuEngine::new(false)))
}

#[test]
fn test_runs_until_max_epochs() {
    let dir = tempdir().unwrap();
    let export = dir.path().join("net.json");
    let mut trainer = trainer(context(&export), 1, 1.0, CancellationToken::new());
    let initial = trainer.network().output_layer().neurons[0].weights.clone();

    let report = trainer.run().unwrap();
    assert_eq!(report.stop_reason, StopReason::MaxEpochs);
    assert_eq!(report.epochs, 3);
    assert_eq!(report.checkpoints, 1);
    assert!(export.exists());

    let loss = report.training_loss.unwrap();
    assert!(loss.is_finite() && loss >= 0.0);
    assert_eq!(report.validation_loss, Some(0.0));
    assert_ne!(trainer.network().output_layer().neurons[0].weights, initial);
}

#[test]
fn test_autosave_does_not_duplicate_final_save() {
    let dir = tempdir().unwrap();
    let export = dir.path().join("net.json");
    let mut ctx = context(&export);
    ctx.app_params.epoch_autosave = 1;

    let report = trainer(ctx, 1, 1.0, CancellationToken::new()).run().unwrap();
    assert_eq!(report.epochs, 3);
    assert_eq!(report.checkpoints, 3);
}

#[test]
fn test_graceful_interrupt_finishes_epoch_and_saves_once() {
    let dir = tempdir().unwrap();
    let export = dir.path().join("net.json");
    let token = CancellationToken::new();
    let signal = token.clone();

    let mut trainer = trainer(context(&export), 2, 1.0, token).on_progress(move |progress| {
        if progress.epoch == 1 && progress.index == 1 {
            signal.interrupt();
        }
    });
    let report = trainer.run().unwrap();

    assert_eq!(report.stop_reason, StopReason::Interrupted);
    assert_eq!(report.epochs, 1);
    assert_eq!(report.checkpoints, 1);
    assert!(export.exists());
}

#[test]
fn test_second_interrupt_aborts_without_saving() {
    let dir = tempdir().unwrap();
    let export = dir.path().join("net.json");
    let token = CancellationToken::new();
    let signal = token.clone();

    let mut trainer = trainer(context(&export), 2, 1.0, token).on_progress(move |_| {
        signal.interrupt();
        signal.interrupt();
    });
    let report = trainer.run().unwrap();

    assert_eq!(report.stop_reason, StopReason::Aborted);
    assert_eq!(report.epochs, 0);
    assert_eq!(report.checkpoints, 0);
    assert!(report.training_loss.is_none());
    assert!(!export.exists());
}

#[test]
fn test_progress_reports_every_sample() {
    let dir = tempdir().unwrap();
    let mut ctx = context(&dir.path().join("net.json"));
    ctx.app_params.max_epochs = 1;
    ctx.app_params.no_save = true;

    let events: Rc<RefCell<Vec<TrainingProgress>>> = Rc::default();
    let recorded = Rc::clone(&events);
    let report = trainer(ctx, 4, 0.75, CancellationToken::new())
        .on_progress(move |p| recorded.borrow_mut().push(*p))
        .run()
        .unwrap();

    assert_eq!(report.checkpoints, 0);
    let events = events.borrow();
    let phases: Vec<(TrainingPhase, usize, usize)> =
        events.iter().map(|p| (p.phase, p.index, p.count)).collect();
    assert_eq!(
        phases,
        vec![
            (TrainingPhase::Training, 1, 3),
            (TrainingPhase::Training, 2, 3),
            (TrainingPhase::Training, 3, 3),
            (TrainingPhase::Validation, 1, 1),
        ]
    );
    assert!(events.iter().all(|p| p.epoch == 1));
}

#[test]
fn test_stops_without_improvement() {
    let dir = tempdir().unwrap();
    let mut ctx = context(&dir.path().join("net.json"));
    ctx.app_params.max_epochs = 10;
    ctx.app_params.max_epochs_without_improvement = 2;
    ctx.app_params.no_save = true;
    // nothing is learned, every epoch has the same loss
    ctx.network_params.learning_rate = 0.0;

    let report = trainer(ctx, 2, 0.5, CancellationToken::new()).run().unwrap();
    assert_eq!(report.stop_reason, StopReason::NoImprovement);
    assert_eq!(report.epochs, 3);
}

#[test]
fn test_adaptive_rate_decreases_on_flat_validation_loss() {
    let dir = tempdir().unwrap();
    let mut ctx = context(&dir.path().join("net.json"));
    ctx.app_params.no_save = true;
    ctx.network_params.adaptive_learning_rate = true;
    ctx.network_params.adaptive_learning_rate_factor = 0.5;

    // no validation images, so the validation loss stays at 0
    let mut trainer = trainer(ctx, 1, 1.0, CancellationToken::new());
    let report = trainer.run().unwrap();

    assert_eq!(report.epochs, 3);
    assert_relative_eq!(report.learning_rate, 0.025);
    assert_relative_eq!(trainer.context().network_params.learning_rate, 0.025);
}
