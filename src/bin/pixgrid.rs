//! Command-line front end: train a grid network or enhance an image with one.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use pixgrid::{run, Backend, CancellationToken, Context, RunMode, RunOutcome};

#[derive(Debug, Parser)]
#[command(name = "pixgrid", version, about = "RGBA grid neural network for image enhancement")]
struct Cli {
    /// TOML file with [app] and [network] tables
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run mode: enhancer or training
    #[arg(long, value_parser = parse_mode)]
    mode: Option<RunMode>,

    /// Propagation backend: cpu or gpu
    #[arg(long, value_parser = parse_backend)]
    backend: Option<Backend>,

    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Network metadata file to import
    #[arg(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// Network metadata file to export
    #[arg(long, value_name = "FILE")]
    export: Option<PathBuf>,

    /// CSV of input,target image paths
    #[arg(long, value_name = "FILE")]
    training_data_file: Option<PathBuf>,

    /// Folder of target images
    #[arg(long, value_name = "DIR")]
    training_data_folder: Option<PathBuf>,

    #[arg(long)]
    output_scale: Option<f32>,

    #[arg(long)]
    max_epochs: Option<usize>,

    #[arg(long)]
    image_split: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Do not save the trained network
    #[arg(long)]
    no_save: bool,

    /// Increase log verbosity, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_mode(value: &str) -> Result<RunMode, String> {
    match value.to_ascii_lowercase().as_str() {
        "enhancer" => Ok(RunMode::Enhancer),
        "training" => Ok(RunMode::Training),
        other => Err(format!("unknown run mode '{other}'")),
    }
}

fn parse_backend(value: &str) -> Result<Backend, String> {
    match value.to_ascii_lowercase().as_str() {
        "cpu" => Ok(Backend::Cpu),
        "gpu" => Ok(Backend::Gpu),
        other => Err(format!("unknown backend '{other}'")),
    }
}

impl Cli {
    fn context(&self) -> pixgrid::Result<Context> {
        let mut ctx = match &self.config {
            Some(path) => Context::load_from_file(path)?,
            None => Context::default(),
        };
        let app = &mut ctx.app_params;
        if let Some(mode) = self.mode {
            app.run_mode = mode;
        }
        if let Some(backend) = self.backend {
            app.backend = backend;
        }
        let paths = [
            (&self.input, &mut app.input_file),
            (&self.output, &mut app.output_file),
            (&self.import, &mut app.network_to_import),
            (&self.export, &mut app.network_to_export),
            (&self.training_data_file, &mut app.training_data_file),
            (&self.training_data_folder, &mut app.training_data_folder),
        ];
        for (arg, field) in paths {
            if arg.is_some() {
                field.clone_from(arg);
            }
        }
        if let Some(scale) = self.output_scale {
            app.output_scale = scale;
        }
        if let Some(max_epochs) = self.max_epochs {
            app.max_epochs = max_epochs;
        }
        if let Some(split) = self.image_split {
            app.image_split = split;
        }
        if self.seed.is_some() {
            app.seed = self.seed;
        }
        app.no_save |= self.no_save;
        app.verbose |= self.verbose > 0;
        Ok(ctx)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let token = CancellationToken::new();
    let handler = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.interrupt()) {
        log::warn!("cannot install the interrupt handler: {e}");
    }

    let result = cli.context().and_then(|ctx| run(ctx, token));
    match result {
        Ok(RunOutcome::Enhanced) => ExitCode::SUCCESS,
        Ok(RunOutcome::Trained(report)) => {
            log::info!(
                "training finished after {} epochs ({:?}), {} checkpoints written",
                report.epochs,
                report.stop_reason,
                report.checkpoints
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
