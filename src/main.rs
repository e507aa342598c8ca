use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use pictory::{
    AppConfig, PipelineEvent, RunFailure, StoryParameters, StoryPipeline, StoryRun,
    assets::{check_image_count, read_images, scan_folder},
    models::ImageAsset,
    util::{StoryWriter, format_local, now_local},
    web::{self, AppState},
};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::fmt::{format::Writer, time::FormatTime};

#[derive(Debug, Parser)]
#[command(name = "pictory", version, about = "Turn a handful of images into a short story")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a story from images given in story order
    Generate {
        #[arg(required = true)]
        images: Vec<PathBuf>,
        #[command(flatten)]
        story: StoryArgs,
    },
    /// Write a story from every image in a folder, in file-name order
    Folder {
        #[arg(long, default_value = "images")]
        dir: PathBuf,
        #[command(flatten)]
        story: StoryArgs,
    },
    /// Serve the upload form
    Serve,
}

#[derive(Debug, Args)]
struct StoryArgs {
    #[arg(long, default_value = "Warm & Wholesome")]
    tone: String,
    /// Kids, Teens, Adults or General
    #[arg(long, default_value = "Kids")]
    audience: String,
    /// short, medium or long
    #[arg(long, default_value = "short")]
    length: String,
    #[arg(short, long, default_value = "story.txt")]
    output: PathBuf,
    #[arg(long)]
    show_captions: bool,
    #[arg(long)]
    show_outline: bool,
}

impl StoryArgs {
    fn parameters(&self) -> pictory::Result<StoryParameters> {
        Ok(StoryParameters::new(
            self.tone.parse()?,
            self.audience.parse()?,
            self.length.parse()?,
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_tracing();

    let config = AppConfig::load()?;
    let pipeline = StoryPipeline::from_config(&config)?;

    match cli.command {
        Command::Generate { images, story } => {
            let assets = read_images(&images).await?;
            write_story(&config, &pipeline, assets, &story).await
        }
        Command::Folder { dir, story } => {
            let paths = scan_folder(&dir)
                .await
                .with_context(|| format!("failed to scan {}", dir.display()))?;
            if paths.is_empty() {
                anyhow::bail!("no images found in {}", dir.display());
            }
            info!(target: "cli", dir = %dir.display(), images = paths.len(), "folder scanned");
            let assets = read_images(&paths).await?;
            write_story(&config, &pipeline, assets, &story).await
        }
        Command::Serve => serve(&config, pipeline).await,
    }
}

async fn write_story(
    config: &AppConfig,
    pipeline: &StoryPipeline,
    assets: Vec<ImageAsset>,
    args: &StoryArgs,
) -> anyhow::Result<()> {
    check_image_count(assets.len(), config.pipeline.min_images, config.pipeline.max_images)?;
    let params = args.parameters()?;

    let result = run_with_progress(pipeline, &assets, &params, args).await;
    let run = match result {
        Ok(run) => run,
        Err(failure) => {
            report_partial(&failure);
            return Err(failure.into());
        }
    };

    if args.show_outline {
        println!("--- outline ---\n{}\n", run.outline.as_str());
    }
    println!("{}", run.story);

    let writer = StoryWriter::new(config.output_dir.clone()).await?;
    let saved = writer.export(&run, &args.output).await?;
    info!(target: "cli", path = %saved.display(), "story saved");
    eprintln!("saved to {}", saved.display());

    Ok(())
}

async fn run_with_progress(
    pipeline: &StoryPipeline,
    assets: &[ImageAsset],
    params: &StoryParameters,
    args: &StoryArgs,
) -> Result<StoryRun, RunFailure> {
    let total = assets.len();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let run = async {
        let tx = tx;
        let result = pipeline.run_with_progress(assets, params, Some(&tx)).await;
        drop(tx);
        result
    };

    let printer = async {
        let mut captioned = 0;
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::CaptionReady(caption) => {
                    captioned += 1;
                    eprintln!("captioned {captioned}/{total}");
                    if args.show_captions {
                        eprintln!("  {}. {}", caption.index, caption.text);
                    }
                }
                PipelineEvent::OutlineReady(_) => eprintln!("outline ready, writing story"),
                PipelineEvent::StoryReady => eprintln!("story ready"),
            }
        }
    };

    let (result, ()) = tokio::join!(run, printer);
    result
}

fn report_partial(failure: &RunFailure) {
    error!(target: "cli", error = %failure, "story generation failed");

    if failure.partial.captions.is_empty() {
        return;
    }
    eprintln!("captions so far (incomplete):");
    for caption in &failure.partial.captions {
        eprintln!("  {}. {}", caption.index, caption.text);
    }
    if let Some(outline) = &failure.partial.outline {
        eprintln!("outline (incomplete):\n{}", outline.as_str());
    }
}

async fn serve(config: &AppConfig, pipeline: StoryPipeline) -> anyhow::Result<()> {
    let state = AppState::new(
        Arc::new(pipeline),
        config.pipeline.min_images,
        config.pipeline.max_images,
        config.server.max_upload_bytes,
    );

    tokio::select! {
        result = web::run_server(config.server.bind_addr, state) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!(target: "web", "shutdown signal received");
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_timer(LocalTimer)
        .init();
}

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", format_local(&now_local(), "%Y-%m-%d %H:%M:%S%:z"))
    }
}
