//! iris - Main Entry Point

use clap::Parser;
use iris_mlops::cli::{
    cmd_demo, cmd_pipeline, cmd_prepare_data, cmd_serve, cmd_train, cmd_tune, Cli, Commands,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iris_mlops=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::PrepareData { output } => {
            cmd_prepare_data(&output)?;
        }
        Commands::Train {
            model,
            c,
            solver,
            kernel,
            max_iter,
            version,
            data,
            artifacts_dir,
            tracking_dir,
        } => {
            cmd_train(
                model,
                c,
                solver,
                kernel,
                max_iter,
                version.as_deref(),
                &data,
                &artifacts_dir,
                tracking_dir.as_deref(),
            )?;
        }
        Commands::Tune {
            n_trials,
            cv_folds,
            data,
            artifacts_dir,
            tracking_dir,
        } => {
            cmd_tune(n_trials, cv_folds, &data, &artifacts_dir, tracking_dir.as_deref())?;
        }
        Commands::Pipeline {
            model,
            c,
            data,
            model_path,
        } => {
            cmd_pipeline(model, c, &data, model_path.as_deref())?;
        }
        Commands::Serve {
            host,
            port,
            model_version,
            artifacts_dir,
        } => {
            cmd_serve(&host, port, &model_version, &artifacts_dir).await?;
        }
        Commands::Demo {
            host,
            port,
            model_path,
        } => {
            cmd_demo(&host, port, &model_path).await?;
        }
    }

    Ok(())
}
