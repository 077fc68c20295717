use std::fs;

use image::{DynamicImage, GenericImageView, RgbImage};
use pixgrid::persistence;
use pixgrid::{run, CancellationToken, Context, Error, NetworkBuilder, RunMode, RunOutcome, StopReason};
use tempfile::tempdir;

fn write_image(path: &std::path::Path, width: u32, height: u32) {
    let image = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x * 20) as u8, (y * 20) as u8, 128])
    });
    DynamicImage::ImageRgb8(image).save(path).unwrap();
}

fn small(ctx: &mut Context) {
    let net = &mut ctx.network_params;
    net.input_size_x = 3;
    net.input_size_y = 3;
    net.hidden_size_x = 3;
    net.hidden_size_y = 3;
    net.output_size_x = 4;
    net.output_size_y = 4;
}

#[test]
fn test_enhancer_writes_scaled_image() {
    let dir = tempdir().unwrap();
    let model = dir.path().join("model.json");
    let input = dir.path().join("in.png");
    let output = dir.path().join("out.png");
    write_image(&input, 8, 6);

    let mut ctx = Context::default();
    small(&mut ctx);
    let network = NetworkBuilder::new(&ctx.network_params).seed(Some(5)).build().unwrap();
    persistence::save_network(&model, &network, &ctx.network_params).unwrap();

    ctx.app_params.run_mode = RunMode::Enhancer;
    ctx.app_params.network_to_import = Some(model);
    ctx.app_params.input_file = Some(input);
    ctx.app_params.output_file = Some(output.clone());
    ctx.app_params.output_scale = 2.0;
    ctx.app_params.image_split = 2;

    let outcome = run(ctx, CancellationToken::new()).unwrap();
    assert_eq!(outcome, RunOutcome::Enhanced);

    let enhanced = image::open(&output).unwrap();
    assert_eq!(enhanced.dimensions(), (16, 12));
    assert!(!enhanced.color().has_alpha());
}

#[test]
fn test_training_from_folder() {
    let dir = tempdir().unwrap();
    let images = dir.path().join("images");
    fs::create_dir(&images).unwrap();
    write_image(&images.join("a.png"), 8, 8);
    write_image(&images.join("b.png"), 12, 8);
    fs::write(images.join("notes.txt"), "not an image").unwrap();
    let model = dir.path().join("trained.json");

    let mut ctx = Context::default();
    small(&mut ctx);
    ctx.app_params.run_mode = RunMode::Training;
    ctx.app_params.training_data_folder = Some(images);
    ctx.app_params.network_to_export = Some(model.clone());
    ctx.app_params.training_split_ratio = 0.5;
    ctx.app_params.training_reduce_factor = 2;
    ctx.app_params.max_epochs = 2;
    ctx.app_params.seed = Some(3);

    let RunOutcome::Trained(report) = run(ctx, CancellationToken::new()).unwrap() else {
        panic!("expected a training report");
    };
    assert_eq!(report.epochs, 2);
    assert_eq!(report.stop_reason, StopReason::MaxEpochs);
    assert_eq!(report.checkpoints, 1);
    assert!(persistence::load_network(&model).is_ok());
}

#[test]
fn test_invalid_context_is_rejected_before_running() {
    let mut ctx = Context::default();
    ctx.app_params.run_mode = RunMode::Enhancer;
    assert!(matches!(
        run(ctx, CancellationToken::new()),
        Err(Error::Configuration(_))
    ));
}
