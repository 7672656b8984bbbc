//! Cart Demo
//!
//! Loads a fixture set, builds the cart through the line merger with tier prices applied,
//! resolves the catalog record behind each line, and evaluates the set's discount rules.
//!
//! Use `-f` to load a fixture set by name
//! Use `-s` to load engine settings from a YAML file
//! Use `-p name=value` to add evaluation parameters
//!
//! Set `RUST_LOG=pricewright=debug` to see rule evaluation as it happens.

use std::{io, time::Instant};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pricewright::{
    conditions::cache::ConditionCache,
    engine::{DiscountEngine, Evaluation},
    fixtures::Fixture,
    settings::EngineSettings,
    utils::DemoArgs,
};

/// Cart Demo
#[expect(clippy::print_stdout, reason = "Example code")]
pub fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = DemoArgs::parse();

    let settings = match &args.settings {
        Some(path) => EngineSettings::load(path)?,
        None => EngineSettings::default(),
    };

    let fixture = Fixture::from_set_in(&args.fixtures_dir, &args.fixture)?;
    let cart = fixture.cart()?;

    let mut parameters = fixture.parameters()?;

    for (name, value) in args.parameters {
        parameters = parameters.with(name, value);
    }

    let records = fixture.records(&cart, &settings)?;

    let engine = DiscountEngine::with_builtins(settings)?;
    let evaluation = Evaluation::new(&cart)
        .with_parameters(&parameters)
        .with_records(&records);
    let mut cache = ConditionCache::new();

    let start = Instant::now();

    let report = engine.evaluate(fixture.rules(), &evaluation, fixture.conditions(), &mut cache);

    let elapsed = start.elapsed().as_secs_f32();

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    report.write_to(&mut handle, &cart)?;

    println!("\nEvaluated {} rules in {elapsed}s", fixture.rules().len());

    Ok(())
}
