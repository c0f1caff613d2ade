//! fpcore - enrollment, verification and identification against a simulated
//! fingerprint reader

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fprint_core::device::sim::{SimController, SimulatedReader};
use fprint_core::matcher::stub::PairCountMatcher;
use fprint_core::paths::AppPaths;
use fprint_core::{
    DeviceHandle, EngineConfig, EnrollStep, EnrollmentSession, Finger, Gallery,
    IdentificationEngine, Matcher, MatchOutcome, Template, TemplateCodec, VerificationEngine,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Exit status when a verification or identification finds no match
const EXIT_NO_MATCH: i32 = 2;

#[derive(Parser)]
#[command(name = "fpcore")]
#[command(version, about = "Fingerprint enrollment and matching engine", long_about = None)]
struct Cli {
    /// Config file (defaults to $FPCORE_CONFIG, then the OS config directory)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report placeholder scores instead of raw matcher scores
    #[arg(long, global = true)]
    boolean_only: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll, verify and identify one simulated subject end to end
    Demo,

    /// Enroll a simulated finger and write the encoded template
    Enroll {
        #[arg(long)]
        owner: String,

        /// Finger label, e.g. right-index
        #[arg(long, default_value = "right-index")]
        finger: String,

        /// Simulated finger placed on the reader
        #[arg(long)]
        seed: u64,

        /// Output file (defaults to <data dir>/exports/<owner>-<finger>.fpte)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },

    /// Verify a simulated finger against one or more templates
    Verify {
        #[arg(long)]
        seed: u64,

        #[arg(value_name = "TEMPLATE", required = true)]
        templates: Vec<PathBuf>,
    },

    /// Identify a simulated finger within a gallery of templates
    Identify {
        #[arg(long)]
        seed: u64,

        /// Template files; candidate ids are the file stems
        #[arg(value_name = "TEMPLATE", required = true)]
        gallery: Vec<PathBuf>,
    },

    /// Decode a template, or import a libfprint FP3 print with --fp3
    Inspect {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, requires = "owner")]
        fp3: bool,

        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value = "unknown")]
        finger: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TemplateSummary<'a> {
    #[serde(flatten)]
    template: &'a Template,
    format: String,
    minutiae_per_sample: Vec<usize>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let paths = AppPaths::new()?;
    paths
        .ensure_directories()
        .context("Failed to create application directories")?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| paths.resolve_config_file());
    let config = EngineConfig::load_or_create(&config_path)?;
    log::info!(
        "Configuration loaded (threshold={}, enrollment samples={})",
        config.matching.threshold,
        config.enrollment.samples
    );

    let matcher = if cli.boolean_only {
        PairCountMatcher::new().boolean_only()
    } else {
        PairCountMatcher::new()
    };

    match cli.command {
        Commands::Demo => demo(&config, &matcher),
        Commands::Enroll {
            owner,
            finger,
            seed,
            out,
        } => {
            let finger = parse_finger(&finger)?;
            let (device, ctl) = open_reader(&config)?;
            ctl.place_finger(seed);

            let template = enroll(&device, &config, &owner, finger)?;
            let out = out.unwrap_or_else(|| {
                paths
                    .exports_dir()
                    .join(format!("{}-{}.fpte", owner, finger.label()))
            });
            fs::write(&out, TemplateCodec::encode(&template))
                .with_context(|| format!("Failed to write template: {}", out.display()))?;
            println!("{}", out.display());
            Ok(0)
        }
        Commands::Verify { seed, templates } => {
            let bytes = templates
                .iter()
                .map(|p| read_file(p))
                .collect::<Result<Vec<_>>>()?;
            let (device, ctl) = open_reader(&config)?;
            ctl.place_finger(seed);

            let engine = VerificationEngine::new(&matcher, config.matching.clone())?;
            let outcome = if bytes.len() == 1 {
                engine.verify(&device, &bytes[0])?
            } else {
                engine.verify_any(&device, &bytes)?
            };
            report(&outcome)
        }
        Commands::Identify { seed, gallery } => {
            let mut entries = Gallery::new();
            for path in &gallery {
                let id = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .with_context(|| format!("No candidate id in: {}", path.display()))?;
                entries.push(id, read_file(path)?)?;
            }
            let (device, ctl) = open_reader(&config)?;
            ctl.place_finger(seed);

            let engine = IdentificationEngine::new(&matcher, config.matching.clone())?;
            let mut progress =
                |current: usize, total: usize| log::info!("Prepared {}/{} candidates", current, total);
            let hooks = fprint_core::IdentifyHooks {
                progress: Some(&mut progress),
                cancel: None,
            };
            let outcome = engine.identify_with(&device, &entries, hooks)?;
            report(&outcome)
        }
        Commands::Inspect {
            file,
            fp3,
            owner,
            finger,
        } => {
            let raw = read_file(&file)?;
            let template = match (fp3, owner) {
                (true, Some(owner)) => {
                    TemplateCodec::import_fp3(&owner, parse_finger(&finger)?, &raw)?
                }
                (true, None) => bail!("--fp3 requires --owner"),
                (false, _) => TemplateCodec::decode(&raw)
                    .with_context(|| format!("Failed to decode: {}", file.display()))?,
            };

            let sets = template.minutiae_sets()?;
            let summary = TemplateSummary {
                template: &template,
                format: format!("{:?}", template.format()),
                minutiae_per_sample: sets.iter().map(|s| s.len()).collect(),
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(0)
        }
    }
}

fn parse_finger(label: &str) -> Result<Finger> {
    Finger::from_label(label).with_context(|| format!("Unknown finger label: {}", label))
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read: {}", path.display()))
}

fn open_reader(config: &EngineConfig) -> Result<(DeviceHandle<SimulatedReader>, SimController)> {
    let reader = SimulatedReader::with_config("simulated-reader", config.simulator.clone());
    let ctl = reader.controller();
    let device = DeviceHandle::open(reader).context("Failed to open reader")?;
    Ok((device, ctl))
}

fn enroll(
    device: &DeviceHandle<SimulatedReader>,
    config: &EngineConfig,
    owner: &str,
    finger: Finger,
) -> Result<Template> {
    let mut session = EnrollmentSession::from_config(device, owner, finger, &config.enrollment)?
        .with_progress(|_, _, msg: &str| println!("  {}", msg));
    session.start()?;
    while session.add_sample()? == EnrollStep::NeedMore {}
    Ok(session.finish()?)
}

fn report(outcome: &MatchOutcome) -> Result<i32> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(if outcome.matched { 0 } else { EXIT_NO_MATCH })
}

fn demo(config: &EngineConfig, matcher: &dyn Matcher) -> Result<i32> {
    const SUBJECT: u64 = 7;
    const STRANGER: u64 = 4242;

    let (device, ctl) = open_reader(config)?;

    println!("Enrolling user7 / right-index ({} scans)", config.enrollment.samples);
    ctl.place_finger(SUBJECT);
    let template = enroll(&device, config, "user7", Finger::RightIndex)?;
    let stored = TemplateCodec::encode(&template);

    println!("Enrolling user9 / left-thumb");
    ctl.place_finger(STRANGER);
    let other = TemplateCodec::encode(&enroll(&device, config, "user9", Finger::LeftThumb)?);

    let verifier = VerificationEngine::new(matcher, config.matching.clone())?;

    println!("Verify: enrolled finger");
    ctl.place_finger(SUBJECT);
    let genuine = verifier.verify(&device, &stored)?;
    println!("{}", serde_json::to_string(&genuine)?);

    println!("Verify: different finger");
    ctl.place_finger(STRANGER);
    let impostor = verifier.verify(&device, &stored)?;
    println!("{}", serde_json::to_string(&impostor)?);

    println!("Identify: enrolled finger in gallery");
    let mut gallery = Gallery::new();
    gallery.push("user9", other)?;
    gallery.push("user7", stored)?;
    ctl.place_finger(SUBJECT);
    let identifier = IdentificationEngine::new(matcher, config.matching.clone())?;
    let found = identifier.identify(&device, &gallery)?;
    println!("{}", serde_json::to_string(&found)?);

    device.close()?;

    if genuine.matched && !impostor.matched && found.candidate_id.as_deref() == Some("user7") {
        println!("✓ Demo completed");
        Ok(0)
    } else {
        println!("✗ Demo produced unexpected outcomes");
        Ok(1)
    }
}
