use anyhow::{Context, Result};
use clap::Parser;
use search_agent::{
    export,
    settings::{Args, Command, Settings},
    SearchAgent, SearchOutcome,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,search_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    info!(
        provider = ?settings.llm.provider,
        model = %settings.llm.model,
        "Settings loaded"
    );

    match args.command {
        Command::Query { subjects, prompt } => {
            let agent = SearchAgent::from_settings(subjects, &settings)?;
            let outcome = agent.invoke(&prompt).await?;
            report_warnings(&outcome);
            println!("{}", serde_json::to_string_pretty(&outcome.table.to_json())?);
        }
        Command::Csv {
            input,
            column,
            output,
            prompt,
        } => {
            let subjects = export::read_subjects(&input, &column)?;
            info!(?subjects, "Subjects read from CSV");
            let agent = SearchAgent::from_settings(subjects, &settings)?;
            let outcome = agent.invoke(&prompt).await?;
            report_warnings(&outcome);
            export::augment_csv(&input, &column, &outcome.table, &output)?;
        }
    }

    Ok(())
}

fn report_warnings(outcome: &SearchOutcome) {
    if !outcome.state.warnings.is_empty() {
        warn!(
            count = outcome.state.warnings.len(),
            "Results may be incomplete"
        );
    }
}
