//! Minimal CLI parsing for the subcommands.

use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the parsed release as JSON
    Parse {
        title: String,
        subtitle: Option<String>,
    },
    /// Parse, then print the resolved catalog record as JSON
    Resolve {
        title: String,
        year: Option<String>,
        strict: bool,
    },
    /// One scan over the plan file
    Scan,
    /// Scheduled scans until interrupted
    Watch,
}

pub const USAGE: &str = "usage: librarian-match <command>

commands:
  parse <title> [--subtitle <text>]
  resolve <title> [--year <year>] [--strict]
  scan
  watch";

impl Command {
    pub fn from_args() -> Result<Self> {
        Self::parse_args(std::env::args().skip(1))
    }

    pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let Some(command) = args.next() else {
            bail!("missing command\n\n{USAGE}");
        };

        let mut positional = Vec::new();
        let mut subtitle = None;
        let mut year = None;
        let mut strict = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--subtitle" => subtitle = args.next(),
                "--year" => year = args.next(),
                "--strict" => strict = true,
                _ if arg.starts_with("--subtitle=") => {
                    subtitle = arg.split_once('=').map(|(_, v)| v.to_string());
                }
                _ if arg.starts_with("--year=") => {
                    year = arg.split_once('=').map(|(_, v)| v.to_string());
                }
                _ if arg.starts_with("--") => bail!("unknown option {arg}\n\n{USAGE}"),
                _ => positional.push(arg),
            }
        }

        let title = positional.join(" ");
        match command.as_str() {
            "parse" | "resolve" if title.is_empty() => bail!("{command} needs a title\n\n{USAGE}"),
            "parse" => Ok(Command::Parse { title, subtitle }),
            "resolve" => Ok(Command::Resolve {
                title,
                year,
                strict,
            }),
            "scan" => Ok(Command::Scan),
            "watch" => Ok(Command::Watch),
            other => bail!("unknown command {other}\n\n{USAGE}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse_args(args(&["parse", "Some.Show.S01E01", "--subtitle", "第一集"])).unwrap(),
            Command::Parse {
                title: "Some.Show.S01E01".to_string(),
                subtitle: Some("第一集".to_string()),
            }
        );
        assert_eq!(
            Command::parse_args(args(&["resolve", "Interstellar", "--year=2014", "--strict"]))
                .unwrap(),
            Command::Resolve {
                title: "Interstellar".to_string(),
                year: Some("2014".to_string()),
                strict: true,
            }
        );
        assert_eq!(Command::parse_args(args(&["scan"])).unwrap(), Command::Scan);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(Command::parse_args(args(&[])).is_err());
        assert!(Command::parse_args(args(&["parse"])).is_err());
        assert!(Command::parse_args(args(&["scan", "--bogus"])).is_err());
        assert!(Command::parse_args(args(&["frobnicate"])).is_err());
    }
}
