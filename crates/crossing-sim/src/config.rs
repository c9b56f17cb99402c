//! Simulation settings and command-line parsing.

use std::time::Duration;

use crossing::{CrossingError, Side};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

pub const USAGE: &str = "\
Usage: crossing-sim [options]

Options:
  --crossers <n>        Number of crossers to spawn [default: 19]
  --capacity <n>        Crossers allowed on the channel at once [default: 5]
  --arrival-ms <ms>     Delay between two arrivals [default: 500]
  --crossing-ms <ms>    Time spent on the channel [default: 5000]
  --seed <n>            Seed for the east/west coin
  --sides <pattern>     Explicit sides, cycled (e.g. EWWE)
  --runtime <kind>      threads or tasks [default: threads]
  --timeout-ms <ms>     Give up waiting after this long
  --json                Print the final report as JSON on stdout
";

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("")]
    Help,

    #[error("{0} requires a value")]
    MissingValue(String),

    #[error("invalid value '{value}' for {flag}")]
    InvalidValue { flag: String, value: String },

    #[error("unknown flag: {0}")]
    UnknownFlag(String),

    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error(transparent)]
    Side(#[from] CrossingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeKind {
    /// One OS thread per crosser, blocking arbiter.
    Threads,
    /// One tokio task per crosser, async arbiter.
    Tasks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimConfig {
    pub crossers: usize,
    pub capacity: usize,
    pub arrival: Duration,
    pub crossing: Duration,
    pub seed: Option<u64>,
    pub sides: Option<Vec<Side>>,
    pub runtime: RuntimeKind,
    pub timeout: Option<Duration>,
    pub json: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            crossers: 19,
            capacity: 5,
            arrival: Duration::from_millis(500),
            crossing: Duration::from_millis(5000),
            seed: None,
            sides: None,
            runtime: RuntimeKind::Threads,
            timeout: None,
            json: false,
        }
    }
}

impl SimConfig {
    /// Parse `args`, skipping the program name in `args[0]`.
    pub fn from_args(args: &[String]) -> Result<Self, ArgsError> {
        let mut config = SimConfig::default();

        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            match flag {
                "--crossers" => config.crossers = number(flag, value(args, &mut i)?)?,
                "--capacity" => config.capacity = number(flag, value(args, &mut i)?)?,
                "--arrival-ms" => config.arrival = millis(flag, value(args, &mut i)?)?,
                "--crossing-ms" => config.crossing = millis(flag, value(args, &mut i)?)?,
                "--timeout-ms" => config.timeout = Some(millis(flag, value(args, &mut i)?)?),
                "--seed" => config.seed = Some(number(flag, value(args, &mut i)?)?),
                "--sides" => config.sides = Some(parse_pattern(value(args, &mut i)?)?),
                "--runtime" => {
                    config.runtime = match value(args, &mut i)? {
                        "threads" => RuntimeKind::Threads,
                        "tasks" => RuntimeKind::Tasks,
                        other => {
                            return Err(ArgsError::InvalidValue {
                                flag: flag.to_string(),
                                value: other.to_string(),
                            });
                        }
                    }
                }
                "--json" => config.json = true,
                "--help" | "-h" => return Err(ArgsError::Help),
                arg if arg.starts_with('-') => return Err(ArgsError::UnknownFlag(arg.to_string())),
                arg => return Err(ArgsError::UnexpectedArgument(arg.to_string())),
            }
            i += 1;
        }

        if config.capacity == 0 {
            return Err(ArgsError::InvalidValue {
                flag: "--capacity".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(config)
    }

    /// Side source for this run: the explicit pattern if given, else a coin.
    pub fn side_picker(&self) -> SidePicker {
        match &self.sides {
            Some(pattern) => SidePicker::Pattern {
                sides: pattern.clone(),
                next: 0,
            },
            None => SidePicker::Coin(match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            }),
        }
    }
}

fn value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, ArgsError> {
    let flag = &args[*i];
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| ArgsError::MissingValue(flag.clone()))
}

fn number<T: std::str::FromStr>(flag: &str, raw: &str) -> Result<T, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidValue {
        flag: flag.to_string(),
        value: raw.to_string(),
    })
}

fn millis(flag: &str, raw: &str) -> Result<Duration, ArgsError> {
    number(flag, raw).map(Duration::from_millis)
}

/// `EWWE`, `e,w,w,e` and `east west` all parse to the same pattern.
fn parse_pattern(raw: &str) -> Result<Vec<Side>, ArgsError> {
    let tokens: Vec<String> = if raw.contains([',', ' ']) {
        raw.split([',', ' '])
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        raw.chars().map(String::from).collect()
    };

    let sides = tokens
        .iter()
        .map(|t| t.parse::<Side>())
        .collect::<Result<Vec<_>, _>>()?;
    if sides.is_empty() {
        return Err(ArgsError::InvalidValue {
            flag: "--sides".to_string(),
            value: raw.to_string(),
        });
    }
    Ok(sides)
}

/// Picks the origin side of each new crosser.
pub enum SidePicker {
    Pattern { sides: Vec<Side>, next: usize },
    Coin(StdRng),
}

impl SidePicker {
    pub fn next_side(&mut self) -> Side {
        match self {
            SidePicker::Pattern { sides, next } => {
                let side = sides[*next % sides.len()];
                *next += 1;
                side
            }
            SidePicker::Coin(rng) => {
                if rng.random_bool(0.5) {
                    Side::East
                } else {
                    Side::West
                }
            }
        }
    }
}
