//! Startup configuration parsed from CLI flags.
use anyhow::{bail, Result};

pub const DEFAULT_REGISTRY_ADDR: &str = "0.0.0.0:9090";

#[derive(Debug, Clone)]
pub struct Opts {
    /// Skip the interactive id prompt.
    pub id: Option<String>,
    pub registry: String,
    pub verbose: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            id: None,
            registry: DEFAULT_REGISTRY_ADDR.to_string(),
            verbose: false,
        }
    }
}

pub fn parse() -> Result<Opts> {
    use lexopt::prelude::*;

    let mut opts = Opts::default();
    let mut parser = lexopt::Parser::from_env();

    while let Some(arg) = parser.next()? {
        match arg {
            Long("id") => opts.id = Some(parser.value()?.string()?),
            Long("registry") => opts.registry = parser.value()?.string()?,
            Short('v') | Long("verbose") => opts.verbose = true,
            Long("help") => {
                print_help();
                std::process::exit(0);
            }
            _ => bail!(arg.unexpected()),
        }
    }

    Ok(opts)
}

fn print_help() {
    println!("ra-node [--id <name>] [--registry <host:port>] [-v|--verbose]");
}
