use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use planter_advisor::{
    derive_profile, encode_image, CareAdvisor, FallbackCareAdvisor, OpenAiCareAdvisor, PlantIdClient,
    PlantIdentifier, ProfileRequest, StaticIdentifier,
};
use planter_core::PlanterConfig;
use planter_policy::PolicyEvaluator;
use planter_store::{JsonLinesSensorSource, SensorSource};
use planter_types::{AlertMessages, Millis, PlantProfile, ProfileId, ProfileKind, Thresholds};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod replay;
use replay::{Entry, Replayer};

#[derive(Parser)]
#[command(name = "planter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run recorded readings through the actuation policy and print what it would do.
    Replay {
        #[arg(long)]
        readings: PathBuf,
        #[arg(long, default_value_t = 40, conflicts_with = "profile")]
        target_moisture: i32,
        #[arg(long, default_value_t = 30, conflicts_with = "profile")]
        max_temp: i32,
        /// YAML plant profile supplying thresholds and alert texts.
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Virtual time between consecutive readings.
        #[arg(long, default_value_t = 60_000)]
        step_ms: Millis,
    },
    Profile {
        #[command(subcommand)]
        action: ProfileCommand,
    },
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ProfileCommand {
    /// Derive a profile from a plant photo and save it.
    Create {
        #[arg(long)]
        image: PathBuf,
        /// Bind the profile to the physical planter.
        #[arg(long)]
        real: bool,
        #[arg(long)]
        replace: bool,
        /// Skip identification and use this plant name.
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "planter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = PlanterConfig::from_env()?;
    match cli.command {
        Command::Replay {
            readings,
            target_moisture,
            max_temp,
            profile,
            step_ms,
        } => {
            let (thresholds, messages) = match profile {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    let profile: PlantProfile = serde_yaml::from_str(&text)?;
                    (profile.thresholds(), profile.messages)
                }
                None => (Thresholds::new(target_moisture, max_temp), AlertMessages::default()),
            };
            replay(&cfg, readings, thresholds, &messages, step_ms).await?;
        }
        Command::Profile {
            action:
                ProfileCommand::Create {
                    image,
                    real,
                    replace,
                    name,
                },
        } => {
            create_profile(&cfg, image, real, replace, name).await?;
        }
        Command::Config {
            action: ConfigCommand::Show,
        } => {
            print!("{}", serde_yaml::to_string(&cfg.redacted())?);
        }
    }

    Ok(())
}

async fn replay(
    cfg: &PlanterConfig,
    readings: PathBuf,
    thresholds: Thresholds,
    messages: &AlertMessages,
    step_ms: Millis,
) -> anyhow::Result<()> {
    let mut replayer = Replayer::new(
        PolicyEvaluator::new(cfg.timings),
        thresholds,
        cfg.alert_cooldown_ms,
    );
    let mut stream = JsonLinesSensorSource::open(&readings).subscribe().await?;

    let mut now: Millis = 0;
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(reading) => {
                for (at, entry) in replayer.step(&reading, now) {
                    print_entry(at, &entry, messages);
                }
            }
            Err(e) => tracing::warn!(at = now, error = %e, "skipping frame"),
        }
        now += step_ms;
    }
    for (at, entry) in replayer.finish() {
        print_entry(at, &entry, messages);
    }
    Ok(())
}

fn print_entry(at: Millis, entry: &Entry, messages: &AlertMessages) {
    match entry {
        Entry::Command(command) => println!("{at:>10}ms  {command}"),
        Entry::Alert(kind) => println!("{at:>10}ms  alert {}: {}", kind.title(), messages.for_kind(*kind)),
    }
}

async fn create_profile(
    cfg: &PlanterConfig,
    image: PathBuf,
    real: bool,
    replace: bool,
    name: Option<String>,
) -> anyhow::Result<()> {
    let bytes = std::fs::read(&image).with_context(|| format!("reading {}", image.display()))?;

    let identifier: Box<dyn PlantIdentifier> = match (name, &cfg.plant_id.api_key) {
        (Some(name), _) => Box::new(StaticIdentifier(name)),
        (None, Some(key)) => Box::new(PlantIdClient::new(cfg.plant_id.url.clone(), key.clone())),
        (None, None) => bail!("PLANT_ID_API_KEY is not set; pass --name to skip identification"),
    };
    let advisor: Box<dyn CareAdvisor> = match &cfg.llm.api_key {
        Some(key) => Box::new(OpenAiCareAdvisor::new(
            cfg.llm.url.clone(),
            key.clone(),
            cfg.llm.model.clone(),
        )),
        None => {
            tracing::warn!("OPENAI_API_KEY is not set, using fallback care ranges");
            Box::new(FallbackCareAdvisor)
        }
    };

    let kind = if real { ProfileKind::Real } else { ProfileKind::Sim };
    let profile = derive_profile(
        &*identifier,
        &*advisor,
        ProfileRequest {
            image: encode_image(&bytes),
            kind,
            messages: AlertMessages::default(),
        },
    )
    .await?;

    if cfg.rtdb.is_some() || cfg.profiles_file.is_some() {
        let store = cfg.profile_store();
        if real && store.get(&ProfileId::real()).await?.is_some() && !replace {
            bail!("a hardware-backed planter already exists; pass --replace to overwrite it");
        }
        store.put(profile.clone()).await?;
        tracing::info!(profile = %profile.id, "profile saved");
    } else {
        tracing::warn!("no profile store configured, profile not saved");
    }

    let shown = PlantProfile {
        image: None,
        ..profile
    };
    println!("{}", serde_json::to_string_pretty(&shown)?);
    Ok(())
}
