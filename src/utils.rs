//! Utils

use std::path::PathBuf;

use clap::Parser;

/// Arguments for the cart demo
#[derive(Debug, Parser)]
pub struct DemoArgs {
    /// Fixture set to use for the rules, cart and tier tables
    #[clap(short, long, default_value = "wholesale")]
    pub fixture: String,

    /// Directory holding the fixture sets
    #[clap(long, default_value = "./fixtures")]
    pub fixtures_dir: PathBuf,

    /// Engine settings file; defaults are used when absent
    #[clap(short, long)]
    pub settings: Option<PathBuf>,

    /// Extra evaluation parameters as `name=value`, overriding the fixture's
    #[clap(short, long = "param", value_parser = parse_parameter)]
    pub parameters: Vec<(String, String)>,
}

fn parse_parameter(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got `{s}`"))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn parameters_parse_as_name_value_pairs() -> TestResult {
        let args = DemoArgs::try_parse_from(["cart", "-p", "channel=trade", "--param", "a = b"])?;

        assert_eq!(args.fixture, "wholesale");
        assert_eq!(
            args.parameters,
            vec![
                ("channel".to_string(), "trade".to_string()),
                ("a".to_string(), "b".to_string())
            ]
        );

        Ok(())
    }

    #[test]
    fn parameters_without_a_name_are_rejected() {
        assert!(DemoArgs::try_parse_from(["cart", "-p", "=trade"]).is_err());
        assert!(DemoArgs::try_parse_from(["cart", "-p", "trade"]).is_err());
    }
}
