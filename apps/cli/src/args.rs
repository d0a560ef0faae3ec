use anyhow::{anyhow, bail, Context, Result};
use destiny_core::AllocationPlan;
use std::path::PathBuf;

pub const USAGE: &str = "\
usage: destiny <command> [options]

commands:
  play     [--config F] [--name N] [--resume F]   interactive game
  autoplay --plan a,b,c,d,e --cards X,Y,Z [--seed N] [--name N] [--config F]
  admin count  --secret S [--config F]
  admin export --secret S [--out F] [--config F]
  rates    [--config F]                          show the rate table
  cards    [--config F]                          list event cards
  --version";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play {
        config: Option<PathBuf>,
        name: Option<String>,
        resume: Option<PathBuf>,
    },
    Autoplay {
        config: Option<PathBuf>,
        plan: AllocationPlan,
        cards: Vec<String>,
        seed: Option<u64>,
        name: String,
    },
    AdminCount {
        config: Option<PathBuf>,
        secret: String,
    },
    AdminExport {
        config: Option<PathBuf>,
        secret: String,
        out: Option<PathBuf>,
    },
    Rates {
        config: Option<PathBuf>,
    },
    Cards {
        config: Option<PathBuf>,
    },
    Version,
    Help,
}

/// Five comma or space separated percentages in asset order.
pub fn parse_plan(text: &str) -> Result<AllocationPlan> {
    let values = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().with_context(|| format!("not a number: {s:?}")))
        .collect::<Result<Vec<_>>>()?;
    let values: [f64; 5] = values
        .try_into()
        .map_err(|v: Vec<f64>| anyhow!("expected 5 percentages, got {}", v.len()))?;
    Ok(AllocationPlan::from_percentages(values))
}

#[derive(Default)]
struct Flags {
    config: Option<PathBuf>,
    name: Option<String>,
    resume: Option<PathBuf>,
    plan: Option<String>,
    cards: Option<String>,
    seed: Option<u64>,
    secret: Option<String>,
    out: Option<PathBuf>,
}

fn parse_flags(mut it: impl Iterator<Item = String>) -> Result<Flags> {
    let mut flags = Flags::default();
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| anyhow!("{arg} needs a value"));
        match arg.as_str() {
            "--config" => flags.config = Some(value()?.into()),
            "--name" => flags.name = Some(value()?),
            "--resume" => flags.resume = Some(value()?.into()),
            "--plan" => flags.plan = Some(value()?),
            "--cards" => flags.cards = Some(value()?),
            "--seed" => flags.seed = Some(value()?.parse().context("--seed must be an integer")?),
            "--secret" => flags.secret = Some(value()?),
            "--out" => flags.out = Some(value()?.into()),
            other => bail!("unknown option: {other}"),
        }
    }
    Ok(flags)
}

/// Parse arguments without the program name.
pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command> {
    let mut it = args.into_iter();
    let Some(cmd) = it.next() else {
        return Ok(Command::Help);
    };
    let cmd = match cmd.as_str() {
        "admin" => match it.next().as_deref() {
            Some("count") => "admin count",
            Some("export") => "admin export",
            _ => bail!("admin needs 'count' or 'export'"),
        },
        "--version" | "-V" => return Ok(Command::Version),
        "--help" | "-h" | "help" => return Ok(Command::Help),
        "play" => "play",
        "autoplay" => "autoplay",
        "rates" => "rates",
        "cards" => "cards",
        other => bail!("unknown command: {other}"),
    };
    let f = parse_flags(it)?;
    let secret = |s: Option<String>| s.ok_or_else(|| anyhow!("--secret is required"));
    Ok(match cmd {
        "play" => Command::Play {
            config: f.config,
            name: f.name,
            resume: f.resume,
        },
        "autoplay" => {
            let plan = parse_plan(f.plan.as_deref().ok_or_else(|| anyhow!("--plan is required"))?)?;
            let cards: Vec<String> = f
                .cards
                .as_deref()
                .ok_or_else(|| anyhow!("--cards is required"))?
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if cards.len() != 3 {
                bail!("--cards needs one code per decade (3), got {}", cards.len());
            }
            Command::Autoplay {
                config: f.config,
                plan,
                cards,
                seed: f.seed,
                name: f.name.unwrap_or_else(|| "autoplay".into()),
            }
        }
        "admin count" => Command::AdminCount {
            config: f.config,
            secret: secret(f.secret)?,
        },
        "admin export" => Command::AdminExport {
            config: f.config,
            secret: secret(f.secret)?,
            out: f.out,
        },
        "rates" => Command::Rates { config: f.config },
        _ => Command::Cards { config: f.config },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn plan_accepts_commas_and_spaces() {
        let p = parse_plan("10, 20 30,20 20").unwrap();
        assert_eq!(p, AllocationPlan::from_percentages([10.0, 20.0, 30.0, 20.0, 20.0]));
        assert!(parse_plan("10,20").is_err());
        assert!(parse_plan("a,b,c,d,e").is_err());
    }

    #[test]
    fn autoplay_needs_three_cards() {
        let cmd = parse_args(args("autoplay --plan 20,20,20,20,20 --cards 101,102,103 --seed 7")).unwrap();
        match cmd {
            Command::Autoplay { cards, seed, name, .. } => {
                assert_eq!(cards, ["101", "102", "103"]);
                assert_eq!(seed, Some(7));
                assert_eq!(name, "autoplay");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_args(args("autoplay --plan 20,20,20,20,20 --cards 101")).is_err());
    }

    #[test]
    fn admin_subcommands() {
        assert_eq!(
            parse_args(args("admin count --secret tsts")).unwrap(),
            Command::AdminCount {
                config: None,
                secret: "tsts".into()
            }
        );
        assert!(parse_args(args("admin export")).is_err());
        assert!(parse_args(args("admin wipe --secret x")).is_err());
    }

    #[test]
    fn play_and_misc() {
        assert_eq!(parse_args(Vec::new()).unwrap(), Command::Help);
        assert_eq!(parse_args(args("--version")).unwrap(), Command::Version);
        assert!(matches!(
            parse_args(args("play --name Ava")).unwrap(),
            Command::Play { name: Some(n), .. } if n == "Ava"
        ));
        assert!(parse_args(args("play --bogus")).is_err());
        assert!(parse_args(args("fly")).is_err());
    }
}
