use anyhow::Context;
use careflow_core::{
    clinical::register_clinical_types,
    constants::{ADMISSION_MODEL, PATIENT_MODEL, PLACEMENT_MODEL},
    ActivityEngine, ActivityId, ActivityQuery, ActivityState, CoreConfig, Fields, LocationId,
    LocationUsage, MemoryDirectory, MemoryStore, NewActivity, TypeRegistry,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "careflow")]
#[command(about = "Careflow activity engine CLI")]
struct Cli {
    /// Engine configuration file (YAML). Built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered activity data types
    Types,
    /// Show the transition table of a data type
    Transitions {
        /// Data model name, e.g. nh.clinical.patient.admission
        data_model: String,
    },
    /// Load the configuration file and print the resolved values
    CheckConfig,
    /// Admit and place a demo patient in memory, then print the resulting activities
    Demo,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<CoreConfig> {
    match path {
        Some(path) => CoreConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(CoreConfig::default()),
    }
}

fn registry(cfg: &CoreConfig) -> anyhow::Result<TypeRegistry> {
    let mut registry = TypeRegistry::new();
    register_clinical_types(&mut registry, cfg)?;
    Ok(registry)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;

    match cli.command {
        Some(Commands::Types) => {
            let registry = registry(&cfg)?;
            for data_type in registry.iter() {
                println!("{:<45} {}", data_type.name(), data_type.description());
            }
        }
        Some(Commands::Transitions { data_model }) => {
            let registry = registry(&cfg)?;
            let data_type = registry.get(&data_model)?;
            for state in ActivityState::ALL {
                let actions: Vec<&str> = data_type
                    .transitions()
                    .allowed(state)
                    .iter()
                    .map(|action| action.as_str())
                    .collect();
                println!("{:<10} {}", state, actions.join(", "));
            }
        }
        Some(Commands::CheckConfig) => {
            println!("superuser_id:          {}", cfg.superuser_id());
            println!(
                "schedule_offset:       {} minutes",
                cfg.schedule_offset().num_minutes()
            );
            println!("spell_model:           {}", cfg.spell_model());
            println!("ews_context:           {}", cfg.ews_context());
            println!("ews_frequency_minutes: {}", cfg.ews_frequency_minutes());
        }
        Some(Commands::Demo) => run_demo(cfg)?,
        None => {
            println!("Use 'careflow --help' for commands");
        }
    }

    Ok(())
}

/// Walks an admission through placement on a one-bed hospital and prints the activity tree.
fn run_demo(cfg: CoreConfig) -> anyhow::Result<()> {
    let location = |id: i64| LocationId::new(id);
    let (hospital, ward, bed) = (location(1)?, location(2)?, location(3)?);

    let registry = registry(&cfg)?;
    let mut directory = MemoryDirectory::new();
    directory
        .add_location(hospital, "Hospital", LocationUsage::Hospital, None)
        .add_location(ward, "Ward A", LocationUsage::Ward, Some(hospital))
        .add_location(bed, "Bed 1", LocationUsage::Bed, Some(ward))
        .add_context(bed, cfg.ews_context());

    let uid = cfg.superuser_id();
    let mut engine = ActivityEngine::new(
        Arc::new(cfg),
        Arc::new(registry),
        Arc::new(directory),
        Box::new(MemoryStore::new()),
    );

    let mut patient = Fields::new();
    patient.insert("other_identifier".into(), json!("DEMO0001"));
    let patient_id = engine.store_mut().create_record(PATIENT_MODEL, patient)?;

    let mut admission_data = Fields::new();
    admission_data.insert("patient_id".into(), json!(patient_id.get()));
    admission_data.insert("location_id".into(), json!(ward.get()));
    let admission =
        engine.create_activity(uid, ADMISSION_MODEL, NewActivity::default(), admission_data)?;
    engine.complete(uid, admission)?;

    let placement_query = ActivityQuery::new()
        .data_model(PLACEMENT_MODEL)
        .patient(patient_id)
        .open();
    let placement = engine
        .search(&placement_query)?
        .into_iter()
        .next()
        .context("admission did not schedule a placement")?;
    engine.submit(uid, placement, json!({ "location_id": bed.get() }))?;
    engine.complete(uid, placement)?;

    print_tree(&engine, admission)
}

fn print_tree(engine: &ActivityEngine, root: ActivityId) -> anyhow::Result<()> {
    for id in engine.get_recursive_created_ids(root)? {
        let activity = engine.activity(id)?;
        let depth = std::iter::successors(activity.creator_id, |creator| {
            engine.activity(*creator).ok().and_then(|a| a.creator_id)
        })
        .count();
        println!(
            "{}{} [{}] {} seq={}",
            "  ".repeat(depth),
            id,
            activity.state,
            activity.data_model,
            activity
                .sequence
                .map_or_else(|| "-".to_owned(), |seq| seq.to_string()),
        );
    }
    Ok(())
}
